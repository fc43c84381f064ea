// --- File: crates/darsly_common/src/services.rs ---
//! Service abstractions for external collaborators.
//!
//! This module provides trait definitions for the external services the core
//! depends on: the installment-payment gateway and the side-effect
//! dispatchers (chat rooms, notifications, reward points) invoked on booking
//! and payment transitions. The traits decouple the core state machines from
//! concrete providers and make the reconciliation logic testable with
//! scripted fakes.

use serde::{Deserialize, Serialize};
use std::error::Error as StdError;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use thiserror::Error;

/// Type alias for a boxed future that returns a Result
pub type BoxFuture<'a, T, E> = Pin<Box<dyn Future<Output = Result<T, E>> + Send + 'a>>;

/// A wrapper error type that implements std::error::Error for
/// Box<dyn std::error::Error + Send + Sync>
#[derive(Debug)]
pub struct BoxedError(pub Box<dyn StdError + Send + Sync>);

impl fmt::Display for BoxedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl StdError for BoxedError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.0.source()
    }
}

impl From<Box<dyn StdError + Send + Sync>> for BoxedError {
    fn from(err: Box<dyn StdError + Send + Sync>) -> Self {
        BoxedError(err)
    }
}

// --- Installment gateway ---

/// Normalized provider-side order status.
///
/// Every provider response status is mapped onto this enum at the adapter
/// boundary; nothing outside the adapter ever branches on raw provider text.
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GatewayOrderStatus {
    New,
    Approved,
    Authorised,
    FullyCaptured,
    PartiallyCaptured,
    Declined,
    Expired,
    Canceled,
    Refunded,
    PartiallyRefunded,
}

impl GatewayOrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            GatewayOrderStatus::New => "new",
            GatewayOrderStatus::Approved => "approved",
            GatewayOrderStatus::Authorised => "authorised",
            GatewayOrderStatus::FullyCaptured => "fully_captured",
            GatewayOrderStatus::PartiallyCaptured => "partially_captured",
            GatewayOrderStatus::Declined => "declined",
            GatewayOrderStatus::Expired => "expired",
            GatewayOrderStatus::Canceled => "canceled",
            GatewayOrderStatus::Refunded => "refunded",
            GatewayOrderStatus::PartiallyRefunded => "partially_refunded",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "new" => Some(GatewayOrderStatus::New),
            "approved" => Some(GatewayOrderStatus::Approved),
            "authorised" => Some(GatewayOrderStatus::Authorised),
            "fully_captured" => Some(GatewayOrderStatus::FullyCaptured),
            "partially_captured" => Some(GatewayOrderStatus::PartiallyCaptured),
            "declined" => Some(GatewayOrderStatus::Declined),
            "expired" => Some(GatewayOrderStatus::Expired),
            "canceled" => Some(GatewayOrderStatus::Canceled),
            "refunded" => Some(GatewayOrderStatus::Refunded),
            "partially_refunded" => Some(GatewayOrderStatus::PartiallyRefunded),
            _ => None,
        }
    }

    /// Funds have been collected (fully or partially).
    pub fn is_captured(&self) -> bool {
        matches!(
            self,
            GatewayOrderStatus::FullyCaptured | GatewayOrderStatus::PartiallyCaptured
        )
    }

    /// Funds reserved but not collected; the order can still be cancelled,
    /// though the provider may capture concurrently.
    pub fn is_cancellable(&self) -> bool {
        matches!(
            self,
            GatewayOrderStatus::New | GatewayOrderStatus::Approved | GatewayOrderStatus::Authorised
        )
    }
}

/// Errors surfaced by gateway operations.
///
/// Unlike the side-effect services, the gateway trait uses a concrete error
/// enum: the reconciler must tell configuration failures (fail fast), network
/// failures (retriable) and business conflicts (actionable guidance) apart,
/// which an opaque boxed error cannot express.
#[derive(Error, Debug)]
pub enum GatewayError {
    /// Missing or malformed credentials/config. Fail fast, never retried.
    #[error("Gateway configuration error: {0}")]
    Config(String),

    /// Network failure or timeout. Safe to retry idempotently.
    #[error("Gateway unreachable: {0}")]
    Unreachable(String),

    /// The provider rejected the request.
    #[error("Gateway API error: status={status}, message='{message}'")]
    Api { status: u16, message: String },

    /// 409: the order already moved to a state that forbids this operation.
    #[error("Gateway conflict: order already {prior_state:?}")]
    Conflict { prior_state: GatewayOrderStatus },

    /// The provider answered with a payload we could not interpret.
    #[error("Unexpected gateway response: {0}")]
    InvalidResponse(String),
}

impl GatewayError {
    /// Transient errors are safe to retry; the payment stays pending.
    pub fn is_retriable(&self) -> bool {
        matches!(self, GatewayError::Unreachable(_))
    }
}

/// A line item on the gateway checkout page, derived from one reserved slot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutLineItem {
    pub name: String,
    pub quantity: i64,
    /// Price of one unit in minor units.
    pub unit_amount: i64,
}

/// Consumer contact details the provider requires. `phone` is already
/// normalized to the provider's expected format.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutConsumer {
    pub name: String,
    pub email: String,
    pub phone: String,
}

/// A request to open a hosted checkout for one payment attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutOrder {
    /// Merchant-side idempotency reference. Stable across retries so the
    /// provider never creates a duplicate order for the same attempt.
    pub reference: String,
    pub description: String,
    /// Total in minor units; the adapter renders the provider's
    /// decimal-string form at the wire.
    pub amount: i64,
    pub currency: String,
    pub items: Vec<CheckoutLineItem>,
    pub consumer: CheckoutConsumer,
    pub success_url: String,
    pub failure_url: String,
    pub cancel_url: String,
    pub webhook_url: String,
}

/// Result of creating a checkout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutSession {
    pub gateway_order_id: String,
    pub checkout_url: String,
}

/// Result of querying an order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderSnapshot {
    pub status: GatewayOrderStatus,
}

/// Result of an authorize call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderAuthorization {
    pub status: GatewayOrderStatus,
    /// True when the provider captured in the same step (one-phase mode).
    pub auto_captured: bool,
}

/// Result of a capture call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureOutcome {
    pub status: GatewayOrderStatus,
}

/// Result of a refund call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefundOutcome {
    pub status: GatewayOrderStatus,
}

/// A trait for the external installment-payment gateway.
///
/// All calls are blocking network I/O with a timeout; callers must never hold
/// a database row lock across them. The provider's own order id makes
/// repeated calls idempotent on the gateway side.
pub trait InstallmentGateway: Send + Sync {
    /// Create a hosted checkout and return its URL and provider order id.
    fn create_checkout(&self, order: &CheckoutOrder)
        -> BoxFuture<'_, CheckoutSession, GatewayError>;

    /// Read the provider's authoritative view of an order.
    fn get_order(&self, gateway_order_id: &str) -> BoxFuture<'_, OrderSnapshot, GatewayError>;

    /// Move an approved order to authorised (funds reserved).
    fn authorize_order(
        &self,
        gateway_order_id: &str,
    ) -> BoxFuture<'_, OrderAuthorization, GatewayError>;

    /// Collect reserved funds.
    fn capture_order(
        &self,
        gateway_order_id: &str,
        amount: i64,
        currency: &str,
    ) -> BoxFuture<'_, CaptureOutcome, GatewayError>;

    /// Cancel a not-yet-captured order. Returns `GatewayError::Conflict`
    /// with the prior state when the provider refuses.
    fn cancel_order(
        &self,
        gateway_order_id: &str,
        amount: i64,
        currency: &str,
    ) -> BoxFuture<'_, OrderSnapshot, GatewayError>;

    /// Refund a captured order, fully or partially.
    fn refund_order(
        &self,
        gateway_order_id: &str,
        amount: i64,
        currency: &str,
        comment: Option<&str>,
    ) -> BoxFuture<'_, RefundOutcome, GatewayError>;

    /// Verify the signature on an incoming webhook body before any
    /// processing happens.
    fn verify_webhook_signature(&self, payload: &[u8], signature: Option<&str>) -> bool;
}

// --- Side-effect dispatchers ---

/// Creates the teacher/student chat room once a booking is settled.
pub trait ChatRoomService: Send + Sync {
    fn create_room(
        &self,
        booking_id: &str,
        teacher_id: &str,
        student_id: &str,
    ) -> BoxFuture<'_, (), BoxedError>;
}

/// A trait for notification service operations.
pub trait NotificationService: Send + Sync {
    /// Send an email notification.
    fn send_email(&self, to: &str, subject: &str, body: &str) -> BoxFuture<'_, (), BoxedError>;

    /// Send an SMS notification.
    fn send_sms(&self, to: &str, body: &str) -> BoxFuture<'_, (), BoxedError>;
}

/// Awards gamification points on settled bookings.
pub trait RewardsService: Send + Sync {
    fn award_points(
        &self,
        user_id: &str,
        points: i64,
        reason: &str,
    ) -> BoxFuture<'_, (), BoxedError>;
}

/// Per-slot price card for one teacher/subject combination.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateCard {
    /// Price of one slot in minor units.
    pub unit_amount: i64,
    pub currency: String,
    pub product_name: Option<String>,
}

/// Resolves a teacher's per-slot rate. Backed by the out-of-scope profile
/// service in production; by configuration in this repo.
pub trait RateProvider: Send + Sync {
    fn unit_price(
        &self,
        teacher_id: &str,
        subject_id: Option<&str>,
    ) -> BoxFuture<'_, RateCard, BoxedError>;
}

/// A factory for creating service instances.
///
/// The application uses this to obtain the collaborators it needs; absent
/// services (None) simply skip their side effect.
pub trait ServiceFactory: Send + Sync {
    /// Get the installment gateway instance.
    fn gateway(&self) -> Option<Arc<dyn InstallmentGateway>>;

    /// Get the chat-room service instance.
    fn chat_room_service(&self) -> Option<Arc<dyn ChatRoomService>>;

    /// Get the notification service instance.
    fn notification_service(&self) -> Option<Arc<dyn NotificationService>>;

    /// Get the rewards service instance.
    fn rewards_service(&self) -> Option<Arc<dyn RewardsService>>;

    /// Get the teacher rate provider.
    fn rate_provider(&self) -> Option<Arc<dyn RateProvider>>;
}
