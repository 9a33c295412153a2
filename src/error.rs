//! Error types for the school matching client

use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the crate
///
/// Only a handful of these ever reach a caller. Per-line event parse failures
/// and per-strategy extraction failures are created, logged and dropped inside
/// the pipeline; they exist as variants so the log lines carry a uniform shape.
#[derive(Error, Debug)]
pub enum Error {
    /// HTTP request error
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Filesystem error from a storage backend
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Non-success response from the match endpoint
    #[error("API error: {0}")]
    Api(String),

    /// The response exposes no readable body
    #[error("Stream unavailable: {0}")]
    StreamUnavailable(String),

    /// The body failed after some data had already been received
    #[error("Transport error: {0}")]
    Transport(String),

    /// One SSE data line could not be decoded
    #[error("Event parse error: {0}")]
    EventParse(String),

    /// One extraction strategy produced nothing usable
    #[error("Extraction failed: {0}")]
    Extraction(String),

    /// Storage backend failure
    #[error("Storage error: {0}")]
    Storage(String),

    /// No data arrived within the inactivity window
    #[error("Stream inactivity timeout")]
    Timeout,

    /// Other errors
    #[error("Error: {0}")]
    Other(String),
}

impl Error {
    /// Create a new config error
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    /// Create a new invalid input error
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Error::InvalidInput(msg.into())
    }

    /// Create a new API error
    pub fn api(msg: impl Into<String>) -> Self {
        Error::Api(msg.into())
    }

    /// Create a new stream-unavailable error
    pub fn stream_unavailable(msg: impl Into<String>) -> Self {
        Error::StreamUnavailable(msg.into())
    }

    /// Create a new transport error
    pub fn transport(msg: impl Into<String>) -> Self {
        Error::Transport(msg.into())
    }

    /// Create a new event parse error
    pub fn event_parse(msg: impl Into<String>) -> Self {
        Error::EventParse(msg.into())
    }

    /// Create a new extraction error
    pub fn extraction(msg: impl Into<String>) -> Self {
        Error::Extraction(msg.into())
    }

    /// Create a new storage error
    pub fn storage(msg: impl Into<String>) -> Self {
        Error::Storage(msg.into())
    }

    /// Create a new other error
    pub fn other(msg: impl Into<String>) -> Self {
        Error::Other(msg.into())
    }

    /// Create a timeout error
    pub fn timeout() -> Self {
        Error::Timeout
    }
}
