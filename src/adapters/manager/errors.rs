use reqwest::StatusCode;
use thiserror::Error;

use crate::domain::errors::DomainError;

/// Errors returned by the manager HTTP API
#[derive(Error, Debug)]
pub enum ManagerApiError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    #[error("Server error ({0}): {1}")]
    ServerError(StatusCode, String),

    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Unexpected response ({0}): {1}")]
    UnexpectedStatus(StatusCode, String),
}

impl ManagerApiError {
    pub fn from_status(status: StatusCode, body: String) -> Self {
        match status.as_u16() {
            400 | 422 => Self::InvalidRequest(body),
            401 | 403 => Self::Unauthorized,
            404 => Self::NotFound(body),
            429 => Self::RateLimitExceeded,
            500..=599 => Self::ServerError(status, body),
            _ => Self::UnexpectedStatus(status, body),
        }
    }

    /// Whether the call may succeed if repeated
    pub fn is_transient(&self) -> bool {
        match self {
            Self::RateLimitExceeded | Self::ServerError(_, _) => true,
            Self::NetworkError(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            _ => false,
        }
    }
}

impl From<ManagerApiError> for DomainError {
    fn from(err: ManagerApiError) -> Self {
        DomainError::ManagerError(err.to_string())
    }
}
