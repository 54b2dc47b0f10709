//! Error types returned at the HTTP edge.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Stable error codes surfaced to HTTP clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Error)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Malformed JSON or missing required fields.
    #[error("INVALID_REQUEST")]
    InvalidRequest,
    /// Webhook signature did not verify.
    #[error("SIGNATURE_MISMATCH")]
    SignatureMismatch,
    /// Referenced job_id does not exist.
    #[error("JOB_NOT_FOUND")]
    JobNotFound,
}

/// JSON error body returned alongside a non-2xx HTTP status.
#[derive(Debug, Clone, Serialize, Deserialize, Error)]
#[error("{code}: {message}")]
pub struct ApiError {
    pub code: ErrorCode,
    pub message: String,
}

impl ApiError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn job_not_found(job_id: &str) -> Self {
        Self::new(ErrorCode::JobNotFound, format!("job '{job_id}' not found"))
    }
}
