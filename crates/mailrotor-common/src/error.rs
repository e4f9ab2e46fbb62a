//! Error types for mailrotor

use thiserror::Error;

/// Main error type for mailrotor
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Cache error: {0}")]
    Cache(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias for mailrotor
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Whether the error is a transient delivery problem worth retrying
    /// on another server rather than surfacing to the caller.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Transport(_))
    }
}
