//! Error types for the signhost client

use thiserror::Error;

/// Errors that can occur when talking to a signhost daemon
#[derive(Error, Debug)]
pub enum ClientError {
    /// HTTP request failed (connect, timeout, body)
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// WebSocket error
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid URL
    #[error("invalid URL: {0}")]
    Url(#[from] url::ParseError),

    /// Daemon answered with an error status
    #[error("API error ({status}): {message}")]
    Api {
        /// HTTP status code
        status: u16,
        /// Error body from the daemon
        message: String,
    },

    /// Connection closed unexpectedly
    #[error("connection closed: {0}")]
    ConnectionClosed(String),
}

impl ClientError {
    /// Whether the daemon answered at all
    ///
    /// `false` for transport failures (refused, timed out, unreachable).
    #[must_use]
    pub fn is_api(&self) -> bool {
        matches!(self, ClientError::Api { .. })
    }
}

/// Result type for client operations
pub type Result<T> = std::result::Result<T, ClientError>;
