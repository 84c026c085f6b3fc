use serde::{Deserialize, Serialize};
use thiserror::Error;
use super::tag::TaskTag;

#[derive(Error, Debug)]
pub enum UploadError {
    #[error("HTTP request error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Server error: status code {status_code}, message: {message}")]
    ServerError {
        status_code: u16,
        message: String,
    },

    #[error("Param error: {0}")]
    ParamError(String),

    #[error("Request construction error: {0}")]
    RequestError(String),

    #[error("Response parse error: {0}")]
    ResponseParseError(String),

    #[error("No auth token configured")]
    MissingToken,

    #[error("Invalid header value: {0}")]
    InvalidHeaderValue(#[from] reqwest::header::InvalidHeaderValue),

    #[error("Upload was cancelled")]
    Cancelled,

    #[error("Task outcome unknown after relaunch")]
    Indeterminate,

    #[error("Retry limit reached for step {0}")]
    RetryLimit(TaskTag),

    #[error("Internal error: {0}")]
    InternalError(String),

    #[error("Manager shut down")]
    ManagerShutdown,
}

impl UploadError {
    pub fn server_error(status_code: u16, message: impl Into<String>) -> Self {
        Self::ServerError {
            status_code,
            message: message.into(),
        }
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::InternalError(message.into())
    }

    /// Projects the error onto the failure taxonomy recorded in a
    /// descriptor's `last_error`.
    pub fn kind(&self) -> FailureKind {
        match self {
            UploadError::ParamError(_) => FailureKind::Validation,
            UploadError::RequestError(_)
            | UploadError::MissingToken
            | UploadError::InvalidHeaderValue(_) => FailureKind::RequestConstruction,
            UploadError::HttpError(_)
            | UploadError::IoError(_)
            | UploadError::ServerError { .. } => FailureKind::Transport,
            UploadError::JsonError(_)
            | UploadError::ResponseParseError(_) => FailureKind::ResponseParsing,
            UploadError::Cancelled => FailureKind::Cancelled,
            UploadError::Indeterminate => FailureKind::Indeterminate,
            UploadError::RetryLimit(_)
            | UploadError::InternalError(_)
            | UploadError::ManagerShutdown => FailureKind::Internal,
        }
    }
}

/// Coarse failure classification, persisted with the descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub enum FailureKind {
    Validation,
    RequestConstruction,
    Transport,
    ResponseParsing,
    Cancelled,
    Indeterminate,
    Internal,
}

/// What went wrong, and during which step. Stored on the descriptor so a
/// caller-initiated retry knows which step to re-submit.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct StepFailure {
    pub step: Option<TaskTag>,
    pub kind: FailureKind,
    pub message: String,
}

/// Error alias
pub type Result<T, E = UploadError> = std::result::Result<T, E>;
