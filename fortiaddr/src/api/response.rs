//! Response envelopes and failure classification.

use serde::Serialize;
use thiserror::Error;

use super::auth::AccessDenied;
use crate::error::{Error, ExecError};

/// JSON envelope every operation answers with.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse<T> {
    pub success: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<usize>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            message: None,
            data: Some(data),
            count: None,
            error: None,
        }
    }

    /// Success carrying only a confirmation message.
    pub fn confirmed(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: Some(message.into()),
            data: None,
            count: None,
            error: None,
        }
    }

    /// Unsuccessful outcome that is still a normal answer, not a failure.
    pub fn unsuccessful(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: Some(message.into()),
            data: None,
            count: None,
            error: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_count(mut self, count: usize) -> Self {
        self.count = Some(count);
        self
    }
}

/// Why an operation failed, with the HTTP status a web layer should use.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Failure {
    #[error("Authentication required")]
    Unauthorized,

    #[error(transparent)]
    Forbidden(#[from] AccessDenied),

    #[error("Invalid data: {}", .details.join("; "))]
    InvalidInput { details: Vec<String> },

    #[error("No active SSH connection to the FortiGate")]
    NotConnected,

    #[error("{message}: {error}")]
    Upstream { message: String, error: String },
}

impl Failure {
    pub fn invalid(detail: impl Into<String>) -> Self {
        Failure::InvalidInput {
            details: vec![detail.into()],
        }
    }

    /// Classify a core error raised while doing `action`.
    pub fn from_error(action: &str, err: Error) -> Self {
        match err {
            Error::Translation(e) => Failure::invalid(e.to_string()),
            Error::Exec(ExecError::NotConnected) => Failure::NotConnected,
            other => Failure::Upstream {
                message: action.to_string(),
                error: other.to_string(),
            },
        }
    }

    pub fn http_status(&self) -> u16 {
        match self {
            Failure::Unauthorized => 401,
            Failure::Forbidden(_) => 403,
            Failure::InvalidInput { .. } => 400,
            Failure::NotConnected => 503,
            Failure::Upstream { .. } => 500,
        }
    }

    /// Render as the envelope the web layer sends back.
    pub fn to_response<T>(&self) -> ApiResponse<T> {
        match self {
            Failure::InvalidInput { details } => ApiResponse {
                success: false,
                message: Some("Invalid data".to_string()),
                data: None,
                count: None,
                error: Some(details.join("; ")),
            },
            Failure::Upstream { message, error } => ApiResponse {
                success: false,
                message: Some(message.clone()),
                data: None,
                count: None,
                error: Some(error.clone()),
            },
            other => ApiResponse::unsuccessful(other.to_string()),
        }
    }
}
