pub mod api;
pub mod controller;

pub use api::{
    ApiError, BflClient, GenerationApi, GenerationRequest, Model, StatusResult, TaskHandle,
};
pub use controller::{Controller, ControllerState, Event, EventStream, FailureReason};
