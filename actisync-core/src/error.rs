//! Error types for actisync.

use thiserror::Error;

/// Errors that can occur while fetching, reconciling or writing activity events.
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Missing required config: {}", .0.join(", "))]
    MissingConfig(Vec<String>),

    #[error("Calendar not found: {0}")]
    DestinationNotFound(String),

    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    #[error("Malformed calendar event '{id}': {reason}")]
    MalformedEvent { id: String, reason: String },

    #[error("API Error ({status}): {body}")]
    Api { status: u16, body: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for SyncError {
    fn from(e: serde_json::Error) -> Self {
        SyncError::Serialization(e.to_string())
    }
}

/// Result type alias for actisync operations.
pub type SyncResult<T> = Result<T, SyncError>;
