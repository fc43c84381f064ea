// --- File: crates/darsly_tamara/src/error.rs ---
use darsly_common::services::{GatewayError, GatewayOrderStatus};
use darsly_common::{external_service_error, DarslyError, HttpStatusCode};
use thiserror::Error;

/// Tamara-specific error types.
#[derive(Error, Debug)]
pub enum TamaraError {
    /// Error occurred during a Tamara API request
    #[error("Tamara API request failed: {0}")]
    RequestError(#[from] reqwest::Error),

    /// Error returned by the Tamara API
    #[error("Tamara API returned an error: Status={status}, Message='{message}'")]
    ApiError { status: u16, message: String },

    /// 409: the order is already in a state that forbids the operation
    #[error("Tamara rejected the operation: order already {prior_state:?}")]
    ConflictError { prior_state: GatewayOrderStatus },

    /// Error parsing a Tamara API response
    #[error("Failed to parse Tamara API response: {0}")]
    ParseError(#[from] serde_json::Error),

    /// Missing or incomplete Tamara configuration
    #[error("Tamara configuration missing or incomplete")]
    ConfigError,

    /// The API answered with an order status we do not know
    #[error("Unknown Tamara order status: '{0}'")]
    UnknownStatus(String),
}

/// Convert TamaraError to the provider-neutral gateway error taxonomy.
impl From<TamaraError> for GatewayError {
    fn from(err: TamaraError) -> Self {
        match err {
            // Transport failures (incl. timeouts) are retriable, never
            // silently treated as success.
            TamaraError::RequestError(e) => GatewayError::Unreachable(e.to_string()),
            TamaraError::ApiError { status, message } => GatewayError::Api { status, message },
            TamaraError::ConflictError { prior_state } => GatewayError::Conflict { prior_state },
            TamaraError::ParseError(e) => GatewayError::InvalidResponse(e.to_string()),
            TamaraError::ConfigError => {
                GatewayError::Config("Tamara configuration missing or incomplete".to_string())
            }
            TamaraError::UnknownStatus(s) => {
                GatewayError::InvalidResponse(format!("unknown order status '{}'", s))
            }
        }
    }
}

/// Convert TamaraError to DarslyError
impl From<TamaraError> for DarslyError {
    fn from(err: TamaraError) -> Self {
        match err {
            TamaraError::RequestError(e) => {
                DarslyError::HttpError(format!("Tamara request error: {}", e))
            }
            TamaraError::ApiError { status, message } => external_service_error(
                "Tamara API",
                format!("Status: {}, Message: {}", status, message),
            ),
            TamaraError::ConflictError { prior_state } => DarslyError::ConflictError(format!(
                "Tamara order already {}",
                prior_state.as_str()
            )),
            TamaraError::ParseError(e) => {
                DarslyError::ParseError(format!("Tamara response parse error: {}", e))
            }
            TamaraError::ConfigError => {
                DarslyError::ConfigError("Tamara configuration missing or incomplete".to_string())
            }
            TamaraError::UnknownStatus(s) => {
                DarslyError::ParseError(format!("Unknown Tamara order status: {}", s))
            }
        }
    }
}

impl HttpStatusCode for TamaraError {
    fn status_code(&self) -> u16 {
        match self {
            TamaraError::RequestError(_) => 502,
            TamaraError::ApiError { status, .. } => *status,
            TamaraError::ConflictError { .. } => 409,
            TamaraError::ParseError(_) => 502,
            TamaraError::ConfigError => 500,
            TamaraError::UnknownStatus(_) => 502,
        }
    }
}
