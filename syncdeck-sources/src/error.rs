//! Error types for the read path.

use thiserror::Error;

/// Errors that can occur while fetching from a data source.
///
/// These never escape [`SourceRegistry::fetch`](crate::SourceRegistry::fetch);
/// the registry folds them into a failed `FetchResponse`.
#[derive(Debug, Error)]
pub enum SourceError {
    /// No source is registered under this id.
    #[error("Data source not found: {0}")]
    NotFound(String),

    /// HTTP request failed.
    #[error("HTTP request failed: {0}")]
    Http(String),

    /// Server answered with a non-success status.
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// GraphQL response carried an `errors` array.
    #[error("GraphQL error: {0}")]
    GraphQl(String),

    /// WebSocket handshake or exchange failed.
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    /// Timeout waiting for response.
    #[error("Request timed out")]
    Timeout,

    /// Connection failed.
    #[error("Connection failed: {0}")]
    Connection(String),

    /// Failed to parse response.
    #[error("Failed to parse response: {0}")]
    Parse(String),

    /// The source configuration cannot be fetched as written.
    #[error("Invalid source configuration: {0}")]
    InvalidConfig(String),

    /// A computed source's transform failed.
    #[error(transparent)]
    Transform(#[from] TransformError),

    /// Superseded by a newer request, or the source went away.
    #[error("request cancelled")]
    Cancelled,

    /// The registry has been disposed.
    #[error("registry disposed")]
    Disposed,
}

impl From<reqwest::Error> for SourceError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            SourceError::Timeout
        } else if err.is_connect() {
            SourceError::Connection(err.to_string())
        } else if err.is_decode() {
            SourceError::Parse(err.to_string())
        } else {
            SourceError::Http(err.to_string())
        }
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for SourceError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        use tokio_tungstenite::tungstenite::Error as WsError;
        match err {
            WsError::Io(e) => SourceError::Connection(e.to_string()),
            WsError::Url(e) => SourceError::InvalidConfig(e.to_string()),
            other => SourceError::WebSocket(other.to_string()),
        }
    }
}

/// A transform rejected its input.
#[derive(Debug, Clone, Error)]
#[error("Transform failed: {0}")]
pub struct TransformError(pub String);

impl TransformError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}
