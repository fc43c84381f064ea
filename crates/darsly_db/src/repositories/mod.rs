//! SQL repositories for the core aggregates.

pub mod booking;
pub mod payment;
pub mod slot;

pub use booking::SqlBookingRepository;
pub use payment::SqlPaymentRepository;
pub use slot::{ReserveError, SqlSlotRepository};
