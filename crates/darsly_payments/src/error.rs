// --- File: crates/darsly_payments/src/error.rs ---
use darsly_booking::BookingError;
use darsly_common::models::{BookingStatus, PaymentStatus};
use darsly_common::services::GatewayError;
use darsly_common::{DarslyError, HttpStatusCode};
use darsly_db::DbError;
use thiserror::Error;

/// Payment-specific error types.
#[derive(Error, Debug)]
pub enum PaymentError {
    /// No payment with that id
    #[error("Payment {0} not found")]
    NotFound(String),

    /// A webhook or redirect referenced a payment we do not know
    #[error("No payment matches reference '{0}'")]
    UnknownReference(String),

    /// The acting user may not operate on this payment
    #[error("Not authorized to modify this payment")]
    Unauthorized,

    /// The booking is in a state that cannot take money
    #[error("Booking is {} and cannot be paid", .0.as_str())]
    BookingNotPayable(BookingStatus),

    /// An active payment already exists for the booking
    #[error("A payment is already in progress for this booking")]
    PaymentInProgress,

    /// No stored phone number normalizes to the gateway's required format
    #[error("No valid phone number on file for the gateway checkout")]
    InvalidPhoneNumber,

    /// The operation is not legal from the payment's current state
    #[error("Payment is {} which does not allow this operation", .current.as_str())]
    InvalidState { current: PaymentStatus },

    /// Capture or settlement attempted on an already-settled payment
    #[error("Payment is already completed")]
    AlreadyCompleted,

    /// Cancel attempted on an already-cancelled payment
    #[error("Payment is already cancelled")]
    AlreadyCancelled,

    /// Refund attempted twice
    #[error("Payment is already refunded")]
    AlreadyRefunded,

    /// Refund attempted before settlement
    #[error("Payment is not completed; there is nothing to refund")]
    NotCompleted,

    /// The gateway already captured the funds; cancellation is impossible
    #[error("Funds are already captured; use a refund instead")]
    MustRefundInstead,

    /// Student cancellation of a settled payment outside the grace window
    #[error("The cancellation window for this payment has expired")]
    CancellationWindowExpired,

    /// The gateway did not capture the funds
    #[error("Capture failed: gateway reported '{0}'")]
    CaptureFailed(String),

    /// The gateway did not refund the funds
    #[error("Refund rejected: gateway reported '{0}'")]
    RefundRejected(String),

    /// Refund amount is zero, negative, or exceeds the captured amount
    #[error("Refund amount is out of range")]
    InvalidRefundAmount,

    /// Webhook signature verification failed
    #[error("Webhook signature verification failed")]
    WebhookSignature,

    /// Gateway call failed
    #[error(transparent)]
    Gateway(#[from] GatewayError),

    /// Booking-side failure
    #[error(transparent)]
    Booking(#[from] BookingError),

    /// Underlying database failure
    #[error(transparent)]
    Database(#[from] DbError),
}

impl From<PaymentError> for DarslyError {
    fn from(err: PaymentError) -> Self {
        match &err {
            PaymentError::NotFound(_) | PaymentError::UnknownReference(_) => {
                DarslyError::NotFoundError(err.to_string())
            }
            PaymentError::Unauthorized | PaymentError::WebhookSignature => {
                DarslyError::AuthError(err.to_string())
            }
            PaymentError::InvalidPhoneNumber | PaymentError::InvalidRefundAmount => {
                DarslyError::ValidationError(err.to_string())
            }
            PaymentError::Gateway(g) => DarslyError::ExternalServiceError {
                service_name: "payment gateway".to_string(),
                message: g.to_string(),
            },
            PaymentError::Booking(b) => DarslyError::ConflictError(b.to_string()),
            PaymentError::Database(d) => DarslyError::DatabaseError(d.to_string()),
            PaymentError::CaptureFailed(_) | PaymentError::RefundRejected(_) => {
                DarslyError::ExternalServiceError {
                    service_name: "payment gateway".to_string(),
                    message: err.to_string(),
                }
            }
            _ => DarslyError::ConflictError(err.to_string()),
        }
    }
}

impl HttpStatusCode for PaymentError {
    fn status_code(&self) -> u16 {
        match self {
            PaymentError::NotFound(_) | PaymentError::UnknownReference(_) => 404,
            PaymentError::Unauthorized => 403,
            PaymentError::BookingNotPayable(_) => 409,
            PaymentError::PaymentInProgress => 409,
            PaymentError::InvalidPhoneNumber => 400,
            PaymentError::InvalidState { .. } => 409,
            PaymentError::AlreadyCompleted => 409,
            PaymentError::AlreadyCancelled => 409,
            PaymentError::AlreadyRefunded => 409,
            PaymentError::NotCompleted => 409,
            PaymentError::MustRefundInstead => 409,
            PaymentError::CancellationWindowExpired => 409,
            PaymentError::CaptureFailed(_) => 502,
            PaymentError::RefundRejected(_) => 502,
            PaymentError::InvalidRefundAmount => 400,
            PaymentError::WebhookSignature => 401,
            PaymentError::Gateway(g) => match g {
                GatewayError::Config(_) => 500,
                GatewayError::Unreachable(_) => 504,
                GatewayError::Api { .. } => 502,
                GatewayError::Conflict { .. } => 409,
                GatewayError::InvalidResponse(_) => 502,
            },
            PaymentError::Booking(b) => b.status_code(),
            PaymentError::Database(_) => 500,
        }
    }
}
