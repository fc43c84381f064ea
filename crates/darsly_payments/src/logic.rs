// --- File: crates/darsly_payments/src/logic.rs ---
//! Payment state machine and gateway reconciliation.
//!
//! Every entry point that can settle money (webhook, success redirect,
//! manual capture, explicit status check) funnels into the single
//! [`PaymentFlow::reconcile`] function, which maps the gateway's
//! authoritative answer onto a tagged [`ReconciliationOutcome`]. Local state
//! writes are conditional on the state being left, so a late webhook can
//! never overwrite a newer manual capture or cancel.
//!
//! Gateway calls run outside any database transaction: a slot row lock is
//! never held across network I/O.

use crate::error::PaymentError;
use chrono::{Duration, Utc};
use darsly_booking::{BookingError, BookingLifecycle};
use darsly_common::models::{Booking, Customer, Payment, PaymentStatus};
use darsly_common::services::{
    ChatRoomService, CheckoutConsumer, CheckoutLineItem, CheckoutOrder, GatewayError,
    GatewayOrderStatus, InstallmentGateway, NotificationService, RewardsService,
};
use darsly_config::{AppConfig, PaymentConfig};
use darsly_db::{DbClient, SqlPaymentRepository};
use darsly_tamara::first_normalizable;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Result of driving a payment against the gateway's authoritative state.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ReconciliationOutcome {
    /// Funds are settled; the booking is paid.
    Completed,
    /// Funds are reserved; a manual capture is required.
    AwaitingCapture,
    /// The attempt is dead; a new payment must be prepared to retry.
    Failed { reason: String },
    /// Nothing conclusive yet; safe to reconcile again later.
    Pending,
}

/// Result of a cancellation attempt.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum CancelOutcome {
    /// Payment cancelled and the booking's slots released.
    Cancelled,
    /// The gateway reported a conflicting prior state; nothing was changed
    /// locally. `advice` is safe to show to the user.
    Conflict { advice: String },
}

/// Response handed to the client after checkout creation.
#[derive(Serialize, Debug, Clone)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct CheckoutResponse {
    pub payment_id: String,
    pub reference: String,
    pub gateway_order_id: String,
    pub checkout_url: String,
}

/// Minimal shape of a provider webhook body: just enough to find the
/// payment it talks about. Everything else is settled by asking the gateway
/// directly, never by trusting the pushed payload.
#[derive(Deserialize, Debug, Clone)]
pub struct GatewayWebhookEvent {
    pub order_reference_id: Option<String>,
    pub order_id: Option<String>,
    pub event_type: Option<String>,
}

/// Payment reconciliation service.
pub struct PaymentFlow {
    config: Arc<AppConfig>,
    payments: SqlPaymentRepository,
    bookings: Arc<BookingLifecycle>,
    gateway: Arc<dyn InstallmentGateway>,
    chat_rooms: Option<Arc<dyn ChatRoomService>>,
    notifications: Option<Arc<dyn NotificationService>>,
    rewards: Option<Arc<dyn RewardsService>>,
}

impl PaymentFlow {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        db: DbClient,
        config: Arc<AppConfig>,
        gateway: Arc<dyn InstallmentGateway>,
        bookings: Arc<BookingLifecycle>,
        chat_rooms: Option<Arc<dyn ChatRoomService>>,
        notifications: Option<Arc<dyn NotificationService>>,
        rewards: Option<Arc<dyn RewardsService>>,
    ) -> Self {
        Self {
            config,
            payments: SqlPaymentRepository::new(db),
            bookings,
            gateway,
            chat_rooms,
            notifications,
            rewards,
        }
    }

    /// Create the tables this service owns.
    pub async fn init_schema(&self) -> Result<(), PaymentError> {
        self.payments.init_schema().await?;
        Ok(())
    }

    fn payment_config(&self) -> PaymentConfig {
        self.config.payment.clone().unwrap_or_default()
    }

    /// Fetch a payment.
    pub async fn get(&self, payment_id: &str) -> Result<Payment, PaymentError> {
        self.load(payment_id).await
    }

    /// List a booking's payment attempts, newest first.
    pub async fn list_for_booking(&self, booking_id: &str) -> Result<Vec<Payment>, PaymentError> {
        Ok(self.payments.list_for_booking(booking_id).await?)
    }

    /// Prepare a new payment attempt for a booking.
    ///
    /// Sweeps abandoned attempts past their TTL first, then refuses while
    /// any active (pending/processing/completed) attempt exists. The fresh
    /// payment carries a generated reference that stays stable across
    /// checkout retries.
    pub async fn prepare_payment(
        &self,
        booking_id: &str,
        student_id: &str,
    ) -> Result<Payment, PaymentError> {
        let booking = self.load_booking(booking_id).await?;
        if booking.student_id != student_id {
            return Err(PaymentError::Unauthorized);
        }
        if booking.status.is_terminal() {
            return Err(PaymentError::BookingNotPayable(booking.status));
        }

        let ttl = Duration::minutes(self.payment_config().abandoned_ttl_minutes);
        self.payments.expire_abandoned(Utc::now() - ttl).await?;

        if self
            .payments
            .find_active_for_booking(booking_id)
            .await?
            .is_some()
        {
            return Err(PaymentError::PaymentInProgress);
        }

        let payment = Payment {
            id: Uuid::new_v4().to_string(),
            booking_id: booking.id.clone(),
            student_id: booking.student_id.clone(),
            teacher_id: booking.teacher_id.clone(),
            amount: booking.total_price,
            currency: booking.currency.clone(),
            status: PaymentStatus::Pending,
            gateway_order_id: None,
            reference: Uuid::new_v4().to_string(),
            gateway_payload: None,
            created_at: Utc::now(),
            paid_at: None,
            failed_at: None,
            refunded_at: None,
            failure_reason: None,
        };
        self.payments.insert(&payment).await?;

        info!(
            "Prepared payment {} for booking {} ({} {})",
            payment.id, booking.id, payment.amount, payment.currency
        );
        Ok(payment)
    }

    /// Build a gateway checkout for a prepared payment and return its URL.
    ///
    /// Requires a phone number that normalizes to the gateway's format.
    /// Safe to retry: the payment reference is reused, so the provider
    /// deduplicates instead of double-charging, and re-linking the same
    /// order id is a no-op.
    pub async fn create_checkout(
        &self,
        payment_id: &str,
        customer: &Customer,
    ) -> Result<CheckoutResponse, PaymentError> {
        let payment = self.load(payment_id).await?;
        if payment.status != PaymentStatus::Pending {
            return Err(match payment.status {
                PaymentStatus::Completed => PaymentError::AlreadyCompleted,
                current => PaymentError::InvalidState { current },
            });
        }

        let booking = self.load_booking(&payment.booking_id).await?;

        let tamara = self
            .config
            .tamara
            .as_ref()
            .ok_or_else(|| GatewayError::Config("tamara config missing".to_string()))
            .map_err(PaymentError::Gateway)?;
        let country_code = tamara.default_country_code.as_deref().unwrap_or("+971");

        let phone = first_normalizable(&customer.phone_numbers, country_code)
            .ok_or(PaymentError::InvalidPhoneNumber)?;

        let order = CheckoutOrder {
            reference: payment.reference.clone(),
            description: format!(
                "{} with teacher {} ({} session(s))",
                booking.subject_label,
                booking.teacher_id,
                booking.slot_ids.len()
            ),
            amount: payment.amount,
            currency: payment.currency.clone(),
            items: booking
                .slot_ids
                .iter()
                .map(|_| CheckoutLineItem {
                    name: format!("{} session", booking.subject_label),
                    quantity: 1,
                    unit_amount: booking.unit_price,
                })
                .collect(),
            consumer: CheckoutConsumer {
                name: customer.name.clone(),
                email: customer.email.clone(),
                phone: phone.into_string(),
            },
            success_url: with_reference(&tamara.success_url, &payment.reference),
            failure_url: with_reference(&tamara.failure_url, &payment.reference),
            cancel_url: with_reference(&tamara.cancel_url, &payment.reference),
            webhook_url: tamara.webhook_url.clone(),
        };

        let session = self.gateway.create_checkout(&order).await?;

        let linked = self
            .payments
            .set_gateway_order(&payment.id, &session.gateway_order_id)
            .await?;
        if !linked {
            // A concurrent retry already linked a different provider order.
            let current = self.load(&payment.id).await?;
            warn!(
                "Payment {} already linked to order {:?}, refusing order {}",
                payment.id, current.gateway_order_id, session.gateway_order_id
            );
            return Err(PaymentError::InvalidState {
                current: current.status,
            });
        }

        self.payments
            .append_gateway_payload(
                &payment.id,
                serde_json::json!({
                    "event": "checkout_created",
                    "gateway_order_id": session.gateway_order_id,
                }),
            )
            .await?;

        info!(
            "Checkout created for payment {} (order {})",
            payment.id, session.gateway_order_id
        );
        Ok(CheckoutResponse {
            payment_id: payment.id,
            reference: payment.reference,
            gateway_order_id: session.gateway_order_id,
            checkout_url: session.checkout_url,
        })
    }

    /// Synchronize local payment state with the gateway. Idempotent.
    ///
    /// The single authoritative reconciliation function: webhooks, browser
    /// redirects, manual status checks all land here.
    pub async fn reconcile(&self, payment_id: &str) -> Result<ReconciliationOutcome, PaymentError> {
        let payment = self.load(payment_id).await?;

        match payment.status {
            // Already settled: answer without a gateway round trip and
            // without re-firing side effects.
            PaymentStatus::Completed | PaymentStatus::Refunded => {
                return Ok(ReconciliationOutcome::Completed)
            }
            PaymentStatus::Failed => {
                return Ok(ReconciliationOutcome::Failed {
                    reason: payment
                        .failure_reason
                        .unwrap_or_else(|| "payment failed".to_string()),
                })
            }
            PaymentStatus::Cancelled => {
                return Ok(ReconciliationOutcome::Failed {
                    reason: "payment was cancelled".to_string(),
                })
            }
            PaymentStatus::Pending | PaymentStatus::Processing => {}
        }

        let Some(order_id) = payment.gateway_order_id.clone() else {
            // Checkout was never created; nothing to ask the gateway about.
            return Ok(ReconciliationOutcome::Pending);
        };

        let authorization = match self.gateway.authorize_order(&order_id).await {
            Ok(authorization) => authorization,
            // The order already moved past authorise on the provider side;
            // a captured prior state is a settlement signal, not a failure.
            Err(GatewayError::Conflict { prior_state }) if prior_state.is_captured() => {
                return self.settle(&payment).await;
            }
            Err(GatewayError::Conflict {
                prior_state: GatewayOrderStatus::Authorised,
            }) => {
                self.payments.mark_processing(&payment.id).await?;
                return Ok(ReconciliationOutcome::AwaitingCapture);
            }
            // Credentials problems are not retriable; surface them.
            Err(e @ GatewayError::Config(_)) => return Err(e.into()),
            Err(e) => {
                // Transient or unexpected gateway trouble: leave the payment
                // as-is, reconciliation is safe to re-invoke.
                warn!(
                    "Reconciliation of payment {} inconclusive: {}",
                    payment.id, e
                );
                return Ok(ReconciliationOutcome::Pending);
            }
        };

        self.payments
            .append_gateway_payload(
                &payment.id,
                serde_json::json!({
                    "event": "authorize",
                    "status": authorization.status.as_str(),
                    "auto_captured": authorization.auto_captured,
                }),
            )
            .await?;

        match authorization.status {
            GatewayOrderStatus::FullyCaptured | GatewayOrderStatus::PartiallyCaptured => {
                self.settle(&payment).await
            }
            GatewayOrderStatus::Authorised if authorization.auto_captured => {
                self.settle(&payment).await
            }
            GatewayOrderStatus::Authorised => {
                self.payments.mark_processing(&payment.id).await?;
                info!("Payment {} authorised, awaiting capture", payment.id);
                Ok(ReconciliationOutcome::AwaitingCapture)
            }
            GatewayOrderStatus::Declined | GatewayOrderStatus::Expired => {
                let reason = format!("gateway reported {}", authorization.status.as_str());
                self.fail(&payment, &reason).await?;
                Ok(ReconciliationOutcome::Failed { reason })
            }
            GatewayOrderStatus::Canceled => {
                // Cancelled at the gateway; slots stay reserved until an
                // explicit booking cancellation, same as a failed attempt.
                self.payments.mark_cancelled(&payment.id).await?;
                Ok(ReconciliationOutcome::Failed {
                    reason: "order cancelled at the gateway".to_string(),
                })
            }
            GatewayOrderStatus::New | GatewayOrderStatus::Approved => {
                Ok(ReconciliationOutcome::Pending)
            }
            GatewayOrderStatus::Refunded | GatewayOrderStatus::PartiallyRefunded => {
                // Refund news for a not-yet-settled local record means a
                // manual operation happened provider-side; flag it.
                error!(
                    "Payment {} is {} locally but refunded at the gateway",
                    payment.id,
                    payment.status.as_str()
                );
                Ok(ReconciliationOutcome::Pending)
            }
        }
    }

    /// Verify and process a provider webhook.
    pub async fn handle_webhook(
        &self,
        body: &[u8],
        signature: Option<&str>,
    ) -> Result<ReconciliationOutcome, PaymentError> {
        if !self.gateway.verify_webhook_signature(body, signature) {
            return Err(PaymentError::WebhookSignature);
        }

        let event: GatewayWebhookEvent = serde_json::from_slice(body)
            .map_err(|e| PaymentError::Gateway(GatewayError::InvalidResponse(e.to_string())))?;

        info!(
            "Webhook received: type={:?}, reference={:?}",
            event.event_type, event.order_reference_id
        );

        let payment = match (&event.order_reference_id, &event.order_id) {
            (Some(reference), _) => self.payments.find_by_reference(reference).await?,
            (None, Some(order_id)) => self.payments.find_by_gateway_order(order_id).await?,
            (None, None) => None,
        };

        let payment = payment.ok_or_else(|| {
            PaymentError::UnknownReference(
                event
                    .order_reference_id
                    .or(event.order_id)
                    .unwrap_or_else(|| "<missing>".to_string()),
            )
        })?;

        self.reconcile(&payment.id).await
    }

    /// Reconcile by merchant reference (browser redirect entry point).
    pub async fn reconcile_by_reference(
        &self,
        reference: &str,
    ) -> Result<ReconciliationOutcome, PaymentError> {
        let payment = self
            .payments
            .find_by_reference(reference)
            .await?
            .ok_or_else(|| PaymentError::UnknownReference(reference.to_string()))?;
        self.reconcile(&payment.id).await
    }

    /// Capture an authorised payment. Valid only from processing.
    pub async fn capture(&self, payment_id: &str) -> Result<ReconciliationOutcome, PaymentError> {
        let payment = self.load(payment_id).await?;
        match payment.status {
            PaymentStatus::Processing => {}
            PaymentStatus::Completed => return Err(PaymentError::AlreadyCompleted),
            current => return Err(PaymentError::InvalidState { current }),
        }

        let order_id = payment
            .gateway_order_id
            .clone()
            .ok_or(PaymentError::InvalidState {
                current: payment.status,
            })?;

        let outcome = match self
            .gateway
            .capture_order(&order_id, payment.amount, &payment.currency)
            .await
        {
            Ok(outcome) => outcome,
            // Already captured provider-side counts as success.
            Err(GatewayError::Conflict { prior_state }) if prior_state.is_captured() => {
                return self.settle(&payment).await;
            }
            Err(e) => return Err(e.into()),
        };

        self.payments
            .append_gateway_payload(
                &payment.id,
                serde_json::json!({
                    "event": "capture",
                    "status": outcome.status.as_str(),
                }),
            )
            .await?;

        if outcome.status.is_captured() {
            self.settle(&payment).await
        } else {
            Err(PaymentError::CaptureFailed(
                outcome.status.as_str().to_string(),
            ))
        }
    }

    /// Cancel a payment attempt.
    ///
    /// No provider order yet: purely local. Otherwise the gateway's current
    /// state decides: captured funds can only be refunded, cancellable
    /// states may still race the provider's own capture (we log and
    /// proceed), and a 409 is translated into user guidance without local
    /// mutation.
    pub async fn cancel(
        &self,
        payment_id: &str,
        acting_user_id: &str,
    ) -> Result<CancelOutcome, PaymentError> {
        let payment = self.load(payment_id).await?;

        match payment.status {
            PaymentStatus::Cancelled => return Err(PaymentError::AlreadyCancelled),
            PaymentStatus::Refunded => return Err(PaymentError::AlreadyRefunded),
            _ => {}
        }

        if payment.student_id != acting_user_id && payment.teacher_id != acting_user_id {
            return Err(PaymentError::Unauthorized);
        }

        // A student may unwind a settled payment only shortly after it
        // settled.
        if payment.status == PaymentStatus::Completed && payment.student_id == acting_user_id {
            let window = Duration::hours(self.payment_config().cancellation_window_hours);
            let paid_at = payment.paid_at.ok_or_else(|| {
                PaymentError::Database(darsly_db::DbError::Inconsistent(format!(
                    "payment {} completed without paid_at",
                    payment.id
                )))
            })?;
            if Utc::now() > paid_at + window {
                return Err(PaymentError::CancellationWindowExpired);
            }
        }

        let Some(order_id) = payment.gateway_order_id.clone() else {
            // Local-only: the gateway never heard of this attempt.
            self.payments.mark_cancelled(&payment.id).await?;
            self.release_booking(&payment, acting_user_id).await;
            info!("Payment {} cancelled locally", payment.id);
            return Ok(CancelOutcome::Cancelled);
        };

        let snapshot = self.gateway.get_order(&order_id).await?;
        if snapshot.status.is_captured() {
            return Err(PaymentError::MustRefundInstead);
        }
        if snapshot.status.is_cancellable()
            && matches!(
                snapshot.status,
                GatewayOrderStatus::Approved | GatewayOrderStatus::Authorised
            )
        {
            // The provider may capture concurrently; the 409 below catches
            // that race.
            warn!(
                "Cancelling payment {} while gateway order is {}",
                payment.id,
                snapshot.status.as_str()
            );
        }

        if snapshot.status.is_cancellable() {
            match self
                .gateway
                .cancel_order(&order_id, payment.amount, &payment.currency)
                .await
            {
                Ok(_) => {}
                Err(GatewayError::Conflict { prior_state }) => {
                    return Ok(CancelOutcome::Conflict {
                        advice: conflict_advice(prior_state),
                    });
                }
                Err(e) => return Err(e.into()),
            }
        }
        // Declined/expired/canceled orders have nothing left to cancel
        // provider-side; fall through to the local cleanup.

        self.payments.mark_cancelled(&payment.id).await?;
        self.payments
            .append_gateway_payload(
                &payment.id,
                serde_json::json!({ "event": "cancel", "by": acting_user_id }),
            )
            .await?;
        self.release_booking(&payment, acting_user_id).await;

        info!("Payment {} cancelled by {}", payment.id, acting_user_id);
        Ok(CancelOutcome::Cancelled)
    }

    /// Refund a settled payment, fully or partially.
    ///
    /// The slots stay booked: a refunded session remains marked delivered.
    pub async fn refund(
        &self,
        payment_id: &str,
        amount: Option<i64>,
        comment: Option<&str>,
    ) -> Result<Payment, PaymentError> {
        let payment = self.load(payment_id).await?;

        match payment.status {
            PaymentStatus::Refunded => return Err(PaymentError::AlreadyRefunded),
            PaymentStatus::Completed => {}
            // Gateway is not called for anything unsettled.
            _ => return Err(PaymentError::NotCompleted),
        }

        let amount = amount.unwrap_or(payment.amount);
        if amount <= 0 || amount > payment.amount {
            return Err(PaymentError::InvalidRefundAmount);
        }

        let order_id = payment
            .gateway_order_id
            .clone()
            .ok_or(PaymentError::InvalidState {
                current: payment.status,
            })?;

        let outcome = self
            .gateway
            .refund_order(&order_id, amount, &payment.currency, comment)
            .await?;

        self.payments
            .append_gateway_payload(
                &payment.id,
                serde_json::json!({
                    "event": "refund",
                    "status": outcome.status.as_str(),
                    "amount": amount,
                }),
            )
            .await?;

        if !matches!(
            outcome.status,
            GatewayOrderStatus::Refunded | GatewayOrderStatus::PartiallyRefunded
        ) {
            return Err(PaymentError::RefundRejected(
                outcome.status.as_str().to_string(),
            ));
        }

        if !self.payments.mark_refunded(&payment.id, Utc::now()).await? {
            // A concurrent refund got there first.
            return Err(PaymentError::AlreadyRefunded);
        }

        info!("Payment {} refunded ({} {})", payment.id, amount, payment.currency);
        self.load(&payment.id).await
    }

    // --- internal ---

    /// Move a payment to completed and fire settlement effects exactly once.
    async fn settle(&self, payment: &Payment) -> Result<ReconciliationOutcome, PaymentError> {
        let newly_completed = self.payments.mark_completed(&payment.id, Utc::now()).await?;
        if !newly_completed {
            // Someone else settled (or killed) this attempt concurrently.
            let current = self.load(&payment.id).await?;
            return match current.status {
                PaymentStatus::Completed | PaymentStatus::Refunded => {
                    Ok(ReconciliationOutcome::Completed)
                }
                other => Err(PaymentError::InvalidState { current: other }),
            };
        }

        info!("Payment {} completed", payment.id);

        let newly_paid = self.bookings.finalize_on_payment(&payment.booking_id).await?;
        if newly_paid {
            self.dispatch_settlement_effects(payment).await;
        }

        Ok(ReconciliationOutcome::Completed)
    }

    /// Move a payment to failed and record it on the booking. The slots are
    /// NOT released: only an explicit cancel frees them, so a retrying
    /// client cannot race a reseller.
    async fn fail(&self, payment: &Payment, reason: &str) -> Result<(), PaymentError> {
        if self.payments.mark_failed(&payment.id, Utc::now(), reason).await? {
            warn!("Payment {} failed: {}", payment.id, reason);
            if let Err(e) = self.bookings.mark_payment_failed(&payment.booking_id).await {
                // The payment row already holds the truth; booking
                // denormalization catches up on the next reconcile.
                error!(
                    "Failed to record payment failure on booking {}: {}",
                    payment.booking_id, e
                );
            }
        }
        Ok(())
    }

    /// Fire post-settlement side effects. Runs strictly after the state
    /// commit; failures are logged and never unwind payment state.
    async fn dispatch_settlement_effects(&self, payment: &Payment) {
        if let Some(chat) = &self.chat_rooms {
            if let Err(e) = chat
                .create_room(&payment.booking_id, &payment.teacher_id, &payment.student_id)
                .await
            {
                error!("Chat room creation failed for booking {}: {}", payment.booking_id, e);
            }
        }

        if let Some(notifier) = &self.notifications {
            let body = format!(
                "Your payment of {}.{:02} {} was received. Your sessions are confirmed.",
                payment.amount / 100,
                payment.amount % 100,
                payment.currency
            );
            if let Err(e) = notifier
                .send_email(&payment.student_id, "Payment received", &body)
                .await
            {
                error!("Settlement notification failed for payment {}: {}", payment.id, e);
            }
        }

        if let Some(rewards) = &self.rewards {
            // One point per whole currency unit spent.
            let points = payment.amount / 100;
            if let Err(e) = rewards
                .award_points(&payment.student_id, points, "booking settled")
                .await
            {
                error!("Points award failed for payment {}: {}", payment.id, e);
            }
        }
    }

    /// Cancel the booking (releasing its slots) after a payment cancel.
    /// Failures are logged: an already-terminal booking has nothing to
    /// release.
    async fn release_booking(&self, payment: &Payment, acting_user_id: &str) {
        match self.bookings.cancel(&payment.booking_id, acting_user_id).await {
            Ok(_) => {}
            Err(BookingError::AlreadyCompleted) | Err(BookingError::AlreadyFinalized(_)) => {
                info!(
                    "Booking {} already finalized; no slots to release",
                    payment.booking_id
                );
            }
            Err(e) => {
                error!(
                    "Slot release after cancelling payment {} failed: {}",
                    payment.id, e
                );
            }
        }
    }

    async fn load(&self, payment_id: &str) -> Result<Payment, PaymentError> {
        self.payments
            .find_by_id(payment_id)
            .await?
            .ok_or_else(|| PaymentError::NotFound(payment_id.to_string()))
    }

    async fn load_booking(&self, booking_id: &str) -> Result<Booking, PaymentError> {
        Ok(self.bookings.get(booking_id).await?)
    }
}

/// Append the payment reference to a redirect URL so the callback handlers
/// can find the payment without trusting gateway-supplied parameters alone.
fn with_reference(url: &str, reference: &str) -> String {
    if url.contains('?') {
        format!("{}&payment_ref={}", url, reference)
    } else {
        format!("{}?payment_ref={}", url, reference)
    }
}

/// Translate a cancel conflict into guidance a user can act on.
fn conflict_advice(prior_state: GatewayOrderStatus) -> String {
    match prior_state {
        GatewayOrderStatus::Authorised | GatewayOrderStatus::Approved => {
            "The payment is awaiting capture. Wait for it to settle or contact support.".to_string()
        }
        s if s.is_captured() => {
            "The payment was already captured. Request a refund instead.".to_string()
        }
        _ => "The payment could not be cancelled. Please contact support.".to_string(),
    }
}
