//! Error types for the write path.

use thiserror::Error;

/// Errors from persisting or dispatching queued writes.
///
/// None of these reach the caller of `enqueue`; dispatch failures count
/// against an item's retries and storage failures are logged.
#[derive(Debug, Error)]
pub enum QueueError {
    /// Reading or writing the persisted queue failed.
    #[error("Storage error: {0}")]
    Storage(#[from] std::io::Error),

    /// The queue could not be (de)serialized.
    #[error("Failed to serialize queue: {0}")]
    Serialize(#[from] serde_json::Error),

    /// HTTP request failed.
    #[error("HTTP request failed: {0}")]
    Http(String),

    /// Server answered with a non-success status.
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// No endpoint is configured for the item's type.
    #[error("No endpoint configured for item type '{0}'")]
    UnknownType(String),

    /// Timeout waiting for response.
    #[error("Request timed out")]
    Timeout,

    /// Connection failed.
    #[error("Connection failed: {0}")]
    Connection(String),
}

impl From<reqwest::Error> for QueueError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            QueueError::Timeout
        } else if err.is_connect() {
            QueueError::Connection(err.to_string())
        } else {
            QueueError::Http(err.to_string())
        }
    }
}
