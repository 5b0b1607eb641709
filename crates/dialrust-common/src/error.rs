//! Error types for DialRust

use thiserror::Error;

/// Main error type for DialRust
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(String),

    /// A uniqueness rule rejected the write
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias for DialRust
pub type Result<T> = std::result::Result<T, Error>;
