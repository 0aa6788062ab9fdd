use std::str::FromStr;

use serde::Deserialize;
use serde_json::Value;

use crate::api::{ApiError, StatusResult, TaskHandle, TaskStatus};

#[derive(Debug, Deserialize)]
pub struct StartResponse {
    pub id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PollResponse {
    pub status: Option<String>,
    pub result: Option<Value>,
}

pub fn parse_start_response(body: &str) -> Result<TaskHandle, ApiError> {
    let response: StartResponse = serde_json::from_str(body)
        .map_err(|e| ApiError::malformed(format!("{e}: {body}")))?;

    let id = response
        .id
        .filter(|id| !id.is_empty())
        .ok_or_else(|| ApiError::malformed(format!("Missing id field: {body}")))?;

    Ok(TaskHandle::new(id))
}

pub fn parse_poll_response(body: &str) -> Result<StatusResult, ApiError> {
    let poll: PollResponse = serde_json::from_str(body)
        .map_err(|e| ApiError::malformed(format!("{e}: {body}")))?;

    let status = poll
        .status
        .as_deref()
        .ok_or_else(|| ApiError::malformed(format!("Missing status field: {body}")))?;

    // Unknown strings ("Task not found", ...) become Error instead of failing the call.
    let Ok(known) = TaskStatus::from_str(status) else {
        return Ok(StatusResult::Error {
            status: status.to_string(),
        });
    };

    Ok(match known {
        TaskStatus::Pending => StatusResult::Pending,
        TaskStatus::Ready => {
            let image_url = poll
                .result
                .as_ref()
                .and_then(|r| r["sample"].as_str())
                .ok_or_else(|| ApiError::malformed(format!("Missing result.sample: {body}")))?;
            StatusResult::Ready {
                image_url: image_url.to_string(),
            }
        }
        TaskStatus::RequestModerated => StatusResult::RequestModerated,
        TaskStatus::ContentModerated => StatusResult::ContentModerated,
        TaskStatus::Error => StatusResult::Error {
            status: status.to_string(),
        },
    })
}
