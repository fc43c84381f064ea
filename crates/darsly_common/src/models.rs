// --- File: crates/darsly_common/src/models.rs ---
//! Domain models shared across the booking and payment crates.
//!
//! Status enums are persisted as TEXT; `as_str`/`parse` are the single
//! round-trip used by the repositories so a renamed variant cannot silently
//! diverge from stored rows.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

/// Status of one bookable calendar slot.
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotStatus {
    Available,
    Booked,
}

impl SlotStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SlotStatus::Available => "available",
            SlotStatus::Booked => "booked",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "available" => Some(SlotStatus::Available),
            "booked" => Some(SlotStatus::Booked),
            _ => None,
        }
    }
}

/// Lifecycle status of a booking.
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Rejected,
    Cancelled,
    Completed,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::Rejected => "rejected",
            BookingStatus::Cancelled => "cancelled",
            BookingStatus::Completed => "completed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(BookingStatus::Pending),
            "confirmed" => Some(BookingStatus::Confirmed),
            "rejected" => Some(BookingStatus::Rejected),
            "cancelled" => Some(BookingStatus::Cancelled),
            "completed" => Some(BookingStatus::Completed),
            _ => None,
        }
    }

    /// Terminal states admit no further lifecycle transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            BookingStatus::Rejected | BookingStatus::Cancelled | BookingStatus::Completed
        )
    }
}

/// Payment side of a booking, denormalized onto the booking row.
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookingPaymentStatus {
    Pending,
    Paid,
    Failed,
}

impl BookingPaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingPaymentStatus::Pending => "pending",
            BookingPaymentStatus::Paid => "paid",
            BookingPaymentStatus::Failed => "failed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(BookingPaymentStatus::Pending),
            "paid" => Some(BookingPaymentStatus::Paid),
            "failed" => Some(BookingPaymentStatus::Failed),
            _ => None,
        }
    }
}

/// State machine of one payment attempt.
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Cancelled,
    Refunded,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Processing => "processing",
            PaymentStatus::Completed => "completed",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Cancelled => "cancelled",
            PaymentStatus::Refunded => "refunded",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(PaymentStatus::Pending),
            "processing" => Some(PaymentStatus::Processing),
            "completed" => Some(PaymentStatus::Completed),
            "failed" => Some(PaymentStatus::Failed),
            "cancelled" => Some(PaymentStatus::Cancelled),
            "refunded" => Some(PaymentStatus::Refunded),
            _ => None,
        }
    }
}

/// One bookable half-open time interval for one teacher on one date,
/// optionally restricted to a subject.
///
/// Invariant: `status == Booked` iff `booking_id` points at a non-terminal
/// booking. Exactly one booking may hold a slot at a time.
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Slot {
    pub id: String,
    pub teacher_id: String,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub subject_id: Option<String>,
    pub status: SlotStatus,
    pub booking_id: Option<String>,
}

/// A student's reservation of one or more slots with one teacher.
///
/// Invariant: `total_price == unit_price * slot_ids.len()`; all slots belong
/// to `teacher_id` and, while the booking is non-terminal, reference it back.
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Booking {
    pub id: String,
    pub teacher_id: String,
    pub student_id: String,
    /// Reserved slots, in the order they were requested.
    pub slot_ids: Vec<String>,
    pub subject_label: String,
    /// Per-slot price in minor units (fils).
    pub unit_price: i64,
    /// `unit_price * slot_ids.len()`, minor units.
    pub total_price: i64,
    pub currency: String,
    pub status: BookingStatus,
    pub payment_status: BookingPaymentStatus,
    pub created_at: DateTime<Utc>,
    pub approved_at: Option<DateTime<Utc>>,
    pub rejected_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// One attempt to collect money for exactly one booking.
///
/// Invariant: at most one payment per booking may sit in
/// processing/completed; a new attempt requires the prior one to be
/// failed or cancelled.
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payment {
    pub id: String,
    pub booking_id: String,
    pub student_id: String,
    pub teacher_id: String,
    /// Amount due in minor units (fils).
    pub amount: i64,
    pub currency: String,
    pub status: PaymentStatus,
    /// Provider-side order id; set once a checkout has been created.
    pub gateway_order_id: Option<String>,
    /// Internal idempotency reference, stable across checkout retries.
    pub reference: String,
    /// Accumulated raw gateway responses, kept opaque for support forensics.
    pub gateway_payload: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
    pub failed_at: Option<DateTime<Utc>>,
    pub refunded_at: Option<DateTime<Utc>>,
    pub failure_reason: Option<String>,
}

/// Contact details of the paying student, as the out-of-scope profile
/// service hands them to the payment flow.
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Customer {
    pub name: String,
    pub email: String,
    /// Raw stored numbers; the gateway adapter picks the first that
    /// normalizes to the provider's required format.
    #[serde(default)]
    pub phone_numbers: Vec<String>,
}
