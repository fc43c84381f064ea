//! Database integration for Darsly
//!
//! This crate provides a database client built on SQLx's `Any` driver
//! (SQLite by default, PostgreSQL/MySQL via feature flags) together with the
//! SQL repositories for the three core aggregates: slots, bookings and
//! payments.
//!
//! The repositories own every mutation of their rows. Contended writes
//! (slot reservation, payment state transitions) are conditional updates
//! checked through `rows_affected`, never read-then-write pairs.

pub mod client;
pub mod error;
pub mod repositories;

// Register the SQLite driver when the crate is loaded
#[cfg(feature = "sqlite")]
mod sqlite_driver {
    // This import ensures the SQLite driver is linked and registered
    #[allow(unused_imports)]
    use sqlx::sqlite::SqlitePoolOptions as _;
}

// Re-export the client and repositories for ease of use
pub use client::{fmt_ts, parse_opt_ts, parse_ts, DbClient, DbTransaction};
pub use error::DbError;
pub use repositories::{
    ReserveError, SqlBookingRepository, SqlPaymentRepository, SqlSlotRepository,
};

#[cfg(test)]
mod repositories_test;
