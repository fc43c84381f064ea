// --- File: crates/darsly_common/src/lib.rs ---

// Declare modules within this crate
pub mod error; // Error handling
pub mod http; // HTTP utilities
pub mod logging; // Logging utilities
pub mod models; // Domain data structures shared across crates
pub mod services; // Service abstractions

// Re-export error types and utilities for easier access
pub use error::{
    conflict, external_service_error, internal_error, not_found, validation_error, DarslyError,
    HttpStatusCode,
};

// Re-export the shared HTTP client for easier access
pub use http::client::{create_client, HTTP_CLIENT};
