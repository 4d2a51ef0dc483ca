//! Error types for runtime construction

use thiserror::Error;

/// Result type alias for runtime operations
pub type Result<T> = std::result::Result<T, RuntimeError>;

/// Errors raised while building the runtime
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// HTTP client could not be created
    #[error("HTTP client error: {0}")]
    HttpError(#[from] reqwest::Error),
}
