use std::{
    fmt,
    pin::Pin,
    sync::{Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use async_stream::stream;
use log::{debug, info, warn};
use tokio::time::sleep;
use tokio_stream::Stream;

use crate::api::{ApiError, GenerationApi, GenerationRequest, StatusResult, TaskHandle};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);
pub const DEFAULT_MAX_POLLS: u32 = 120;

pub type EventStream<'a> = Pin<Box<dyn Stream<Item = Event> + Send + 'a>>;

/// Notifications for the front end, in the order they happen.
#[derive(Debug)]
pub enum Event {
    Submitted {
        handle: TaskHandle,
    },
    /// One per `Pending` poll
    Progress {
        handle: TaskHandle,
        status: String,
    },
    Done {
        handle: TaskHandle,
        image_url: String,
        download_link: String,
    },
    Failed {
        handle: TaskHandle,
        reason: FailureReason,
    },
    SubmissionFailed {
        error: ApiError,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum ControllerState {
    Idle,
    Submitting,
    Polling { handle: TaskHandle, polls: u32 },
    Done { handle: TaskHandle, image_url: String },
    Failed { handle: TaskHandle, reason: FailureReason },
}

#[derive(Debug, Clone, PartialEq)]
pub enum FailureReason {
    /// The service reported a terminal status other than Ready
    Status(StatusResult),
    /// Polling itself failed
    Api(String),
    TimedOut { polls: u32 },
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::Status(status) => write!(f, "{status}"),
            FailureReason::Api(message) => f.write_str(message),
            FailureReason::TimedOut { polls } => {
                write!(f, "Timed out, still pending after {polls} polls")
            }
        }
    }
}

pub fn download_link(image_url: &str) -> String {
    format!("[Download Image]({image_url})")
}

struct Slot {
    /// Bumped on every submission; a run whose epoch no longer matches has been superseded.
    epoch: u64,
    state: ControllerState,
}

fn lock_slot(slot: &Mutex<Slot>) -> MutexGuard<'_, Slot> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Owned by a run's stream. Dropping the stream before the run reached a terminal state
/// puts the controller back to `Idle`, unless a newer submission took over.
struct RunGuard<'a> {
    slot: &'a Mutex<Slot>,
    epoch: u64,
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        let mut slot = lock_slot(self.slot);
        if slot.epoch != self.epoch {
            return;
        }
        if let ControllerState::Submitting | ControllerState::Polling { .. } = slot.state {
            debug!("Event stream dropped mid-run, controller back to Idle");
            slot.state = ControllerState::Idle;
        }
    }
}

/// Drives one generation task at a time from submission to a terminal state.
///
/// Calling [`Controller::submit`] again abandons the previous task: its stream ends
/// without further events and its results never touch the controller state.
pub struct Controller<A> {
    api: A,
    poll_interval: Duration,
    max_polls: Option<u32>,
    slot: Mutex<Slot>,
}

impl<A: GenerationApi + Sync> Controller<A> {
    pub fn new(api: A) -> Self {
        Self {
            api,
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_polls: Some(DEFAULT_MAX_POLLS),
            slot: Mutex::new(Slot {
                epoch: 0,
                state: ControllerState::Idle,
            }),
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// `None` polls until the service reports a terminal status.
    pub fn with_max_polls(mut self, max_polls: Option<u32>) -> Self {
        self.max_polls = max_polls;
        self
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    pub fn state(&self) -> ControllerState {
        self.slot().state.clone()
    }

    pub fn current_handle(&self) -> Option<TaskHandle> {
        match &self.slot().state {
            ControllerState::Polling { handle, .. }
            | ControllerState::Done { handle, .. }
            | ControllerState::Failed { handle, .. } => Some(handle.clone()),
            ControllerState::Idle | ControllerState::Submitting => None,
        }
    }

    /// Starts a new task, superseding any task still in flight.
    ///
    /// The controller moves to `Submitting` right away; the returned stream has to be
    /// driven for the request to actually go out. Dropping the stream before the task
    /// finishes puts the controller back to `Idle`.
    pub fn submit(&self, request: GenerationRequest, api_key: String) -> EventStream<'_> {
        let epoch = {
            let mut slot = self.slot();
            slot.epoch += 1;
            if let ControllerState::Polling { handle, .. } = &slot.state {
                info!("Abandoning task {handle}");
            }
            slot.state = ControllerState::Submitting;
            slot.epoch
        };
        let guard = RunGuard {
            slot: &self.slot,
            epoch,
        };

        Box::pin(stream! {
            let _guard = guard;
            let submitted = match request.validate() {
                Ok(()) => self.api.submit(&request, &api_key).await,
                Err(e) => Err(e),
            };

            let handle = match submitted {
                Ok(handle) => handle,
                Err(error) => {
                    warn!("Submission failed: {error}");
                    if self.transition(epoch, ControllerState::Idle) {
                        yield Event::SubmissionFailed { error };
                    }
                    return;
                }
            };

            info!("Image generation started. Task ID: {handle}");
            if !self.transition(epoch, ControllerState::Polling { handle: handle.clone(), polls: 0 }) {
                return;
            }
            yield Event::Submitted { handle: handle.clone() };

            let mut polls = 0;
            loop {
                sleep(self.poll_interval).await;
                if !self.is_current(epoch) {
                    debug!("Task {handle} superseded, not polling");
                    return;
                }

                let fetched = self.api.fetch_status(&handle).await;
                polls += 1;

                let (next, event) = match fetched {
                    Ok(StatusResult::Pending) => {
                        if self.max_polls.is_some_and(|max| polls >= max) {
                            let reason = FailureReason::TimedOut { polls };
                            (
                                ControllerState::Failed { handle: handle.clone(), reason: reason.clone() },
                                Event::Failed { handle: handle.clone(), reason },
                            )
                        } else {
                            (
                                ControllerState::Polling { handle: handle.clone(), polls },
                                Event::Progress {
                                    handle: handle.clone(),
                                    status: StatusResult::Pending.to_string(),
                                },
                            )
                        }
                    }
                    Ok(StatusResult::Ready { image_url }) => (
                        ControllerState::Done { handle: handle.clone(), image_url: image_url.clone() },
                        Event::Done {
                            handle: handle.clone(),
                            download_link: download_link(&image_url),
                            image_url,
                        },
                    ),
                    Ok(status) => {
                        let reason = FailureReason::Status(status);
                        (
                            ControllerState::Failed { handle: handle.clone(), reason: reason.clone() },
                            Event::Failed { handle: handle.clone(), reason },
                        )
                    }
                    Err(e) => {
                        let reason = FailureReason::Api(e.to_string());
                        (
                            ControllerState::Failed { handle: handle.clone(), reason: reason.clone() },
                            Event::Failed { handle: handle.clone(), reason },
                        )
                    }
                };

                let terminal = !matches!(next, ControllerState::Polling { .. });
                if !self.transition(epoch, next) {
                    warn!("Dropping late result for superseded task {handle}");
                    return;
                }

                match &event {
                    Event::Done { image_url, .. } => info!("Task {handle} ready: {image_url}"),
                    Event::Failed { reason, .. } => warn!("Task {handle} failed: {reason}"),
                    _ => debug!("Task {handle} still pending after {polls} polls"),
                }
                yield event;

                if terminal {
                    return;
                }
            }
        })
    }

    fn slot(&self) -> MutexGuard<'_, Slot> {
        lock_slot(&self.slot)
    }

    fn is_current(&self, epoch: u64) -> bool {
        self.slot().epoch == epoch
    }

    /// Applies `next` only if the run started at `epoch` is still the current one.
    fn transition(&self, epoch: u64, next: ControllerState) -> bool {
        let mut slot = self.slot();
        if slot.epoch != epoch {
            return false;
        }
        slot.state = next;
        true
    }
}
