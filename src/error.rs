//! Error types for Ratewarden.

use thiserror::Error;

/// Main error type for Ratewarden operations.
///
/// Rejecting a request is not an error: limiters answer with `false`.
#[derive(Error, Debug)]
pub enum RatewardenError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl RatewardenError {
    /// Error for a limiter parameter that must be strictly positive.
    pub(crate) fn not_positive(parameter: &str, value: impl std::fmt::Display) -> Self {
        RatewardenError::Config(format!("{} must be greater than 0, got {}", parameter, value))
    }
}

/// Result type alias for Ratewarden operations.
pub type Result<T> = std::result::Result<T, RatewardenError>;
