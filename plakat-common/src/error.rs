//! Common error types for plakat

use thiserror::Error;

/// Common result type for plakat operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across the plakat pipeline
#[derive(Error, Debug)]
pub enum Error {
    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid user input or request parameter
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Extracted record violates the canonical schema
    #[error("Schema error: {0}")]
    Schema(#[from] crate::models::SchemaError),

    /// Internal pipeline error
    #[error("Internal error: {0}")]
    Internal(String),
}
