//! Error types for chatline-core

use thiserror::Error;

/// Main error type for the chatline-core library
#[derive(Error, Debug)]
pub enum Error {
    /// A record carried a `class` tag outside the known set
    #[error("unknown record class: {0}")]
    UnknownVariant(String),

    /// A record was not valid JSON, not valid UTF-8, or missed a required field
    #[error("malformed record: {0}")]
    MalformedRecord(String),

    /// A replace record arrived for an item that already exists
    #[error("item {0} already exists in exchange")]
    DuplicateItem(i64),

    /// The stream was cancelled by the caller before it finished
    #[error("stream cancelled")]
    Cancelled,

    /// Transport-level failure (non-success status, broken body stream)
    #[error("transport error: {0}")]
    Transport(String),

    /// HTTP client error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error outside record decoding (payload encoding, session responses)
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Whether this error came from the wire protocol rather than from I/O.
    pub fn is_protocol(&self) -> bool {
        matches!(
            self,
            Error::UnknownVariant(_) | Error::MalformedRecord(_) | Error::DuplicateItem(_)
        )
    }
}

/// Result type alias for chatline-core
pub type Result<T> = std::result::Result<T, Error>;
