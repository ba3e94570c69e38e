//! Error types for deepr-session

use thiserror::Error;

/// Result type alias using deepr-session Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during session operations
#[derive(Error, Debug)]
pub enum Error {
    /// An error from the backend client
    #[error(transparent)]
    Api(#[from] deepr_api::Error),

    /// The task is not in the local history cache
    #[error("Unknown research task: {0}")]
    UnknownTask(String),

    /// A settings value is out of range
    #[error("Invalid setting: {0}")]
    InvalidSetting(String),

    /// Writing an export failed
    #[error("Export failed: {0}")]
    Export(#[from] std::io::Error),

    /// Serializing a session snapshot failed
    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Check if the backend reported the resource as missing
    pub fn is_not_found(&self) -> bool {
        match self {
            Error::Api(e) => e.is_not_found(),
            Error::UnknownTask(_) => true,
            _ => false,
        }
    }
}
