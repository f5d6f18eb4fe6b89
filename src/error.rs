//! Error taxonomy for the moderation client.
use thiserror::Error;

use crate::model::ResourceKind;

/// Message shown when a rejection is submitted without a reason.
pub const MISSING_REASON: &str = "Please provide a reason for rejection";

/// Client-side validation failure attached to a single form field.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }

    pub fn missing_reason() -> Self {
        Self::new("reason", MISSING_REASON)
    }
}

/// Failures from the remote resource client.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("network error: {0}")]
    Transport(String),
    #[error("request timed out")]
    Timeout,
    #[error("session expired, please sign in again")]
    Unauthorized,
    #[error("email address not verified: {0}")]
    EmailNotVerified(String),
    #[error("endpoint not available (HTTP {status})")]
    EndpointUnavailable { status: u16 },
    #[error("server error {status}: {message}")]
    Server { status: u16, message: String },
    #[error("invalid response: {0}")]
    Decode(String),
    #[error("operation not supported: {0}")]
    Unsupported(&'static str),
}

impl ApiError {
    /// Message the server supplied, if the failure carried one.
    pub fn server_message(&self) -> Option<&str> {
        match self {
            ApiError::Server { message, .. } if !message.trim().is_empty() => Some(message),
            ApiError::EmailNotVerified(message) if !message.trim().is_empty() => Some(message),
            _ => None,
        }
    }

    pub fn is_endpoint_unavailable(&self) -> bool {
        matches!(self, ApiError::EndpointUnavailable { .. })
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ApiError::Timeout
        } else if err.is_decode() {
            ApiError::Decode(err.to_string())
        } else {
            ApiError::Transport(err.to_string())
        }
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        ApiError::Decode(err.to_string())
    }
}

/// Failures surfaced by the review workflow.
#[derive(Debug, Error)]
pub enum ReviewError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("{0}")]
    MissingPrerequisite(String),
    #[error("not permitted to moderate")]
    Forbidden,
    #[error("a review for {0} is already in progress")]
    InFlight(String),
    #[error(transparent)]
    Api(#[from] ApiError),
}

impl ReviewError {
    /// Text shown to the operator: the server's own message when present,
    /// otherwise a fallback naming the attempted action.
    pub fn user_message(&self, kind: ResourceKind) -> String {
        match self {
            ReviewError::Api(err) => match err.server_message() {
                Some(message) => message.to_string(),
                None => format!("Failed to process {}: {}", kind, err),
            },
            ReviewError::Validation(err) => err.message.clone(),
            other => other.to_string(),
        }
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, ReviewError::Validation(_))
    }
}
