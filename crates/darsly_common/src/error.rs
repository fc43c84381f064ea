// --- File: crates/darsly_common/src/error.rs ---
use std::fmt;
use thiserror::Error;

/// The base error type for all Darsly errors.
///
/// This enum provides a common set of error variants that can be used across
/// all crates. Each crate extends this by implementing
/// `From<SpecificError> for DarslyError`.
#[derive(Error, Debug)]
pub enum DarslyError {
    /// Error occurred during an HTTP request
    #[error("HTTP request failed: {0}")]
    HttpError(String),

    /// Error occurred while parsing data
    #[error("Failed to parse data: {0}")]
    ParseError(String),

    /// Error occurred due to missing or invalid configuration
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Error occurred during authentication or authorization
    #[error("Authentication error: {0}")]
    AuthError(String),

    /// Error occurred during validation
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Error occurred during database operation
    #[error("Database error: {0}")]
    DatabaseError(String),

    /// Error occurred during external service call
    #[error("External service error: {service_name} - {message}")]
    ExternalServiceError {
        service_name: String,
        message: String,
    },

    /// Error occurred due to a conflict (e.g., resource already taken)
    #[error("Conflict: {0}")]
    ConflictError(String),

    /// Error occurred due to a resource not being found
    #[error("Not found: {0}")]
    NotFoundError(String),

    /// Error occurred due to a timeout
    #[error("Timeout: {0}")]
    TimeoutError(String),

    /// Stored state contradicts a documented invariant. Never auto-healed;
    /// surfaced to operators.
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    /// Error occurred due to an internal error
    #[error("Internal error: {0}")]
    InternalError(String),
}

/// A trait for converting errors to HTTP status codes.
///
/// Implemented by error types to provide a consistent way to convert errors
/// to HTTP status codes.
pub trait HttpStatusCode {
    /// Returns the HTTP status code for this error.
    fn status_code(&self) -> u16;
}

impl HttpStatusCode for DarslyError {
    fn status_code(&self) -> u16 {
        match self {
            DarslyError::HttpError(_) => 500,
            DarslyError::ParseError(_) => 400,
            DarslyError::ConfigError(_) => 500,
            DarslyError::AuthError(_) => 401,
            DarslyError::ValidationError(_) => 400,
            DarslyError::DatabaseError(_) => 500,
            DarslyError::ExternalServiceError { .. } => 502,
            DarslyError::ConflictError(_) => 409,
            DarslyError::NotFoundError(_) => 404,
            DarslyError::TimeoutError(_) => 504,
            DarslyError::InvariantViolation(_) => 500,
            DarslyError::InternalError(_) => 500,
        }
    }
}

// Common error conversions
impl From<reqwest::Error> for DarslyError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            DarslyError::TimeoutError(err.to_string())
        } else {
            DarslyError::HttpError(err.to_string())
        }
    }
}

impl From<serde_json::Error> for DarslyError {
    fn from(err: serde_json::Error) -> Self {
        DarslyError::ParseError(err.to_string())
    }
}

impl From<std::io::Error> for DarslyError {
    fn from(err: std::io::Error) -> Self {
        DarslyError::InternalError(err.to_string())
    }
}

// Utility functions for error handling
pub fn config_error<T: fmt::Display>(message: T) -> DarslyError {
    DarslyError::ConfigError(message.to_string())
}

pub fn validation_error<T: fmt::Display>(message: T) -> DarslyError {
    DarslyError::ValidationError(message.to_string())
}

pub fn not_found<T: fmt::Display>(message: T) -> DarslyError {
    DarslyError::NotFoundError(message.to_string())
}

pub fn conflict<T: fmt::Display>(message: T) -> DarslyError {
    DarslyError::ConflictError(message.to_string())
}

pub fn external_service_error<T: fmt::Display>(service_name: &str, message: T) -> DarslyError {
    DarslyError::ExternalServiceError {
        service_name: service_name.to_string(),
        message: message.to_string(),
    }
}

pub fn internal_error<T: fmt::Display>(message: T) -> DarslyError {
    DarslyError::InternalError(message.to_string())
}
