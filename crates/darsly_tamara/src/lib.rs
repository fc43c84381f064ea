// --- File: crates/darsly_tamara/src/lib.rs ---
// Declare modules within this crate
pub mod error;
pub mod logic;
pub mod phone;
pub mod service;

pub use error::TamaraError;
pub use logic::{TamaraClient, TamaraWebhookEvent};
pub use phone::{first_normalizable, normalize, NormalizedPhone, PhoneError};
