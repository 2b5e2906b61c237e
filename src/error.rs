// Error taxonomy for the generation session and history views

use reqwest::StatusCode;
use thiserror::Error;

pub const GENERATE_FALLBACK: &str = "Failed to generate image";
pub const HISTORY_FALLBACK: &str = "Failed to load history";
pub const HEALTH_FALLBACK: &str = "Health check failed";

/// Rejected locally, before anything is sent.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Please enter a prompt")]
    EmptyPrompt,
}

/// Why a submit was refused. Nothing is sent in either case.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubmitRejected {
    #[error(transparent)]
    Invalid(#[from] ValidationError),
    #[error("A generation is already in progress")]
    InFlight,
}

/// Why a recent generation could not be shown again.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SelectRejected {
    #[error("A generation is already in progress")]
    InFlight,
    #[error("No recent generation with id {0}")]
    UnknownEntry(u64),
}

/// Failure talking to one of the remote services.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("service responded with {status}")]
    Status {
        status: StatusCode,
        detail: Option<String>,
    },
    #[error("service reported failure")]
    Rejected,
    #[error("malformed response: {0}")]
    Malformed(String),
}

impl ApiError {
    /// Collapse into the message shown to the user: the service's own
    /// `detail` when it sent one, otherwise `fallback`.
    pub fn to_service_error(&self, fallback: &str) -> ServiceError {
        match self {
            ApiError::Status {
                detail: Some(detail),
                ..
            } if !detail.trim().is_empty() => ServiceError::new(detail.clone()),
            _ => ServiceError::new(fallback),
        }
    }
}

/// Display-only error surfaced after a failed call. Never retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ServiceError {
    pub message: String,
}

impl ServiceError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Result of offering a response to a state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    Applied,
    /// A newer call was issued (or the call was abandoned); the response was dropped.
    Superseded,
}
