use thiserror::Error;

/// Errors returned by a [`GenerationApi`](super::GenerationApi)
#[derive(Debug, Error)]
pub enum ApiError {
    /// Missing key, or the service refused it (401/403)
    #[error("Authentication failed: {message}")]
    Auth { message: String },

    #[error("Network failure: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Malformed response: {message}")]
    MalformedResponse { message: String },

    /// Any other non-success HTTP status
    #[error("Service error ({status}): {body}")]
    Service { status: u16, body: String },

    /// Rejected locally, nothing was sent
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl ApiError {
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedResponse {
            message: message.into(),
        }
    }

    pub fn from_status(status: reqwest::StatusCode, body: String) -> Self {
        match status.as_u16() {
            401 | 403 => Self::Auth {
                message: format!("{status} - {body}"),
            },
            code => Self::Service { status: code, body },
        }
    }
}
