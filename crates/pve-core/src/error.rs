use std::time::Duration;

use pve_model::{Upid, UpidError};
use thiserror::Error;

/// Every failure the request engine can surface.
///
/// `Clone` so one task outcome can be delivered to both the completion handle
/// and the completion callback.
#[derive(Error, Debug, Clone)]
pub enum ApiError {
    /// 429, 503 or any other 5xx; retried by the request loop.
    #[error("transient server error {status} from {url}: {body}")]
    TransientServer {
        status: u16,
        url: String,
        body: String,
    },

    #[error("request to {url} rejected with status {status}: {body}")]
    PermanentRequest {
        status: u16,
        url: String,
        body: String,
    },

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("failed to decode response: {0}")]
    Decode(String),

    #[error("network error: {0}")]
    Network(String),

    /// The server reported the tracked task finished unsuccessfully.
    #[error("task {upid} failed: {}", .exit_status.as_deref().unwrap_or("no exit status"))]
    OperationFailed {
        upid: Upid,
        exit_status: Option<String>,
    },

    #[error("task did not finish within {0:?}")]
    Timeout(Duration),

    #[error("cancelled")]
    Cancelled,

    #[error("worker pool already shut down")]
    ShutDown,

    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    /// Classify a `>= 400` response.
    pub fn from_status(status: u16, url: impl Into<String>, body: impl Into<String>) -> Self {
        let (url, body) = (url.into(), body.into());
        if is_transient_status(status) {
            ApiError::TransientServer { status, url, body }
        } else {
            ApiError::PermanentRequest { status, url, body }
        }
    }

    /// HTTP status carried by the error, if any.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            ApiError::TransientServer { status, .. } | ApiError::PermanentRequest { status, .. } => {
                Some(*status)
            }
            _ => None,
        }
    }

    /// Returns `true` if repeating the same request may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, ApiError::TransientServer { .. })
    }
}

fn is_transient_status(status: u16) -> bool {
    status == 429 || status == 503 || status >= 500
}

impl From<serde_json::Error> for ApiError {
    fn from(e: serde_json::Error) -> Self {
        ApiError::Decode(e.to_string())
    }
}

impl From<UpidError> for ApiError {
    fn from(e: UpidError) -> Self {
        ApiError::InvalidRequest(e.to_string())
    }
}
