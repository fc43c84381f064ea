// --- File: crates/darsly_booking/src/error.rs ---
use darsly_common::models::BookingStatus;
use darsly_common::{DarslyError, HttpStatusCode};
use darsly_db::DbError;
use thiserror::Error;

/// Booking-specific error types.
#[derive(Error, Debug)]
pub enum BookingError {
    /// A booking needs at least one slot
    #[error("No slots selected")]
    NoSlotsSelected,

    /// The requested slots belong to more than one teacher
    #[error("Selected slots do not all belong to the same teacher")]
    MixedTeachers,

    /// A slot is restricted to a different subject
    #[error("Slot {slot_id} is not offered for the requested subject")]
    SubjectMismatch { slot_id: String },

    /// A slot is missing, already booked, or was taken concurrently
    #[error("Slot {slot_id} is not available")]
    SlotUnavailable { slot_id: String },

    /// A slot starts in the past
    #[error("Slot {slot_id} is in the past")]
    SlotInPast { slot_id: String },

    /// The acting user may not perform this transition
    #[error("Not authorized to modify this booking")]
    Unauthorized,

    /// No booking with that id
    #[error("Booking {0} not found")]
    NotFound(String),

    /// The booking already reached a terminal state
    #[error("Booking is already {}", .0.as_str())]
    AlreadyFinalized(BookingStatus),

    /// Cancellation attempted on a completed booking
    #[error("Booking is already completed")]
    AlreadyCompleted,

    /// Completion attempted before the booking was confirmed
    #[error("Booking is {} and cannot be completed", .0.as_str())]
    NotConfirmed(BookingStatus),

    /// The teacher's rate could not be resolved
    #[error("Failed to resolve teacher rate: {0}")]
    RateLookup(String),

    /// Underlying database failure
    #[error(transparent)]
    Database(#[from] DbError),
}

impl From<BookingError> for DarslyError {
    fn from(err: BookingError) -> Self {
        match err {
            BookingError::NoSlotsSelected
            | BookingError::MixedTeachers
            | BookingError::SubjectMismatch { .. }
            | BookingError::SlotInPast { .. } => DarslyError::ValidationError(err.to_string()),
            BookingError::SlotUnavailable { .. }
            | BookingError::AlreadyFinalized(_)
            | BookingError::AlreadyCompleted
            | BookingError::NotConfirmed(_) => DarslyError::ConflictError(err.to_string()),
            BookingError::Unauthorized => DarslyError::AuthError(err.to_string()),
            BookingError::NotFound(_) => DarslyError::NotFoundError(err.to_string()),
            BookingError::RateLookup(msg) => {
                DarslyError::ExternalServiceError {
                    service_name: "rate provider".to_string(),
                    message: msg,
                }
            }
            BookingError::Database(e) => DarslyError::DatabaseError(e.to_string()),
        }
    }
}

impl HttpStatusCode for BookingError {
    fn status_code(&self) -> u16 {
        match self {
            BookingError::NoSlotsSelected => 400,
            BookingError::MixedTeachers => 400,
            BookingError::SubjectMismatch { .. } => 400,
            BookingError::SlotUnavailable { .. } => 409,
            BookingError::SlotInPast { .. } => 400,
            BookingError::Unauthorized => 403,
            BookingError::NotFound(_) => 404,
            BookingError::AlreadyFinalized(_) => 409,
            BookingError::AlreadyCompleted => 409,
            BookingError::NotConfirmed(_) => 409,
            BookingError::RateLookup(_) => 502,
            BookingError::Database(_) => 500,
        }
    }
}
