//! Error types for deepr-api

use thiserror::Error;

/// Result type alias using deepr-api Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur when talking to the research backend
#[derive(Error, Debug)]
pub enum Error {
    /// HTTP request failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Backend answered with a non-success status
    #[error("API error: {message} (status: {status})")]
    Api { status: u16, message: String },

    /// Server-sent events error
    #[error("SSE error: {0}")]
    Sse(String),

    /// Request was aborted by the caller
    #[error("Request aborted")]
    Aborted,

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl Error {
    /// Create an API error from a status code and message
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    /// Whether the backend reported the resource as missing
    pub fn is_not_found(&self) -> bool {
        match self {
            Error::Api { status, .. } => *status == 404,
            Error::Http(e) => e.status().is_some_and(|s| s.as_u16() == 404),
            _ => false,
        }
    }

    /// Human-readable message suitable for a synthetic `error` event
    pub fn user_message(&self) -> String {
        match self {
            Error::Api { status, message } if message.trim().is_empty() => {
                format!("Research request failed with HTTP {}", status)
            }
            Error::Api { status, message } => {
                format!("Research request failed with HTTP {}: {}", status, message.trim())
            }
            Error::Aborted => "Research was stopped".to_string(),
            other => format!("Connection to research backend failed: {}", other),
        }
    }
}
