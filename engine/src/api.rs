use std::{fmt, pin::Pin};

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

pub mod bfl;
pub use bfl::BflClient;

mod error;
pub use error::ApiError;

pub type ApiFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, ApiError>> + Send + 'a>>;

/// Talks to a remote generation service. [`BflClient`] is the real one.
pub trait GenerationApi {
    /// Starts a generation job. One outbound call, no retries.
    fn submit<'a>(
        &'a self,
        request: &'a GenerationRequest,
        api_key: &'a str,
    ) -> ApiFuture<'a, TaskHandle>;

    fn fetch_status<'a>(&'a self, handle: &'a TaskHandle) -> ApiFuture<'a, StatusResult>;
}

#[derive(
    Debug,
    Clone,
    Copy,
    Display,
    clap::ValueEnum,
    Serialize,
    Deserialize,
    Hash,
    PartialEq,
    Eq,
    EnumIter,
    Default,
)]
pub enum Model {
    #[default]
    #[strum(to_string = "FLUX.1 [dev]")]
    #[value(name = "flux-dev")]
    FluxDev,
    #[strum(to_string = "FLUX.1 [pro]")]
    #[value(name = "flux-pro")]
    FluxPro,
    #[strum(to_string = "FLUX1.1 [pro]")]
    #[value(name = "flux-pro-1.1")]
    FluxPro11,
    #[strum(to_string = "FLUX.2 [pro]")]
    #[value(name = "flux-2-pro")]
    Flux2Pro,
}

impl Model {
    /// Path segment of the submission endpoint, `/v1/<endpoint>`.
    pub fn endpoint(&self) -> &'static str {
        match self {
            Model::FluxDev => "flux-dev",
            Model::FluxPro => "flux-pro",
            Model::FluxPro11 => "flux-pro-1.1",
            Model::Flux2Pro => "flux-2-pro",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub prompt: String,
    pub width: u32,
    pub height: u32,
    pub steps: u32,
    pub prompt_upsampling: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    pub guidance: f64,
    pub safety_tolerance: u8,
}

pub const DIMENSION_RANGE: std::ops::RangeInclusive<u32> = 256..=1440;
pub const DIMENSION_STEP: u32 = 32;
pub const STEPS_RANGE: std::ops::RangeInclusive<u32> = 1..=50;
pub const GUIDANCE_RANGE: std::ops::RangeInclusive<f64> = 1.5..=5.0;
pub const SAFETY_TOLERANCE_RANGE: std::ops::RangeInclusive<u8> = 0..=6;

impl Default for GenerationRequest {
    fn default() -> Self {
        Self {
            prompt: "ein fantastisches bild".into(),
            width: 1024,
            height: 768,
            steps: 28,
            prompt_upsampling: false,
            seed: Some(42),
            guidance: 3.0,
            safety_tolerance: 2,
        }
    }
}

impl GenerationRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<(), ApiError> {
        let invalid = |msg: String| Err(ApiError::InvalidRequest(msg));

        if self.prompt.trim().is_empty() {
            return invalid("prompt must not be empty".into());
        }
        for (name, value) in [("width", self.width), ("height", self.height)] {
            if !DIMENSION_RANGE.contains(&value) || value % DIMENSION_STEP != 0 {
                return invalid(format!(
                    "{name} must be a multiple of {DIMENSION_STEP} in {DIMENSION_RANGE:?}, got {value}"
                ));
            }
        }
        if !STEPS_RANGE.contains(&self.steps) {
            return invalid(format!("steps must be in {STEPS_RANGE:?}, got {}", self.steps));
        }
        if !GUIDANCE_RANGE.contains(&self.guidance) {
            return invalid(format!(
                "guidance must be in {GUIDANCE_RANGE:?}, got {}",
                self.guidance
            ));
        }
        if !SAFETY_TOLERANCE_RANGE.contains(&self.safety_tolerance) {
            return invalid(format!(
                "safety tolerance must be in {SAFETY_TOLERANCE_RANGE:?}, got {}",
                self.safety_tolerance
            ));
        }
        Ok(())
    }
}

/// Opaque job id handed out by the service on submission.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TaskHandle(String);

impl TaskHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Status strings as the service spells them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
pub enum TaskStatus {
    Pending,
    Ready,
    #[strum(serialize = "Request Moderated")]
    RequestModerated,
    #[strum(serialize = "Content Moderated")]
    ContentModerated,
    Error,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StatusResult {
    Pending,
    Ready { image_url: String },
    RequestModerated,
    ContentModerated,
    /// `status` is the raw string the service sent, which is not always "Error".
    Error { status: String },
}

impl StatusResult {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, StatusResult::Pending)
    }

    pub fn status(&self) -> TaskStatus {
        match self {
            StatusResult::Pending => TaskStatus::Pending,
            StatusResult::Ready { .. } => TaskStatus::Ready,
            StatusResult::RequestModerated => TaskStatus::RequestModerated,
            StatusResult::ContentModerated => TaskStatus::ContentModerated,
            StatusResult::Error { .. } => TaskStatus::Error,
        }
    }
}

impl fmt::Display for StatusResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatusResult::Error { status } => f.write_str(status),
            other => write!(f, "{}", other.status()),
        }
    }
}
