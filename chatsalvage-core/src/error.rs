//! Error types for chatsalvage-core

use thiserror::Error;

/// Main error type for the chatsalvage-core library
#[derive(Error, Debug)]
pub enum Error {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed conversation log
    #[error("parse error in {origin}: {message}")]
    Parse { origin: String, message: String },

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Conversation source or crash report not found
    #[error("not found: {0}")]
    NotFound(String),
}

impl Error {
    /// Build a parse error attributed to `origin`.
    pub fn parse(origin: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Error::Parse {
            origin: origin.into(),
            message: message.to_string(),
        }
    }

    /// Classify a serde_json failure raised while reading a conversation.
    ///
    /// I/O failures stay I/O failures; syntax, EOF and data errors become
    /// [`Error::Parse`].
    pub fn from_read(origin: impl Into<String>, err: serde_json::Error) -> Self {
        if err.is_io() {
            Error::Io(err.into())
        } else {
            Error::parse(origin, err)
        }
    }

    /// Returns true for errors a different reader might get past.
    pub fn is_parse(&self) -> bool {
        matches!(self, Error::Parse { .. })
    }
}

/// Result type alias for chatsalvage-core
pub type Result<T> = std::result::Result<T, Error>;
