// --- File: crates/darsly_payments/src/routes.rs ---

use axum::{
    routing::{get, post},
    Router,
};
use darsly_config::AppConfig;
use std::sync::Arc;

use crate::handlers::{
    cancel_payment_handler, cancel_redirect_handler, capture_payment_handler,
    create_checkout_handler, failure_redirect_handler, get_payment_handler,
    list_booking_payments_handler, prepare_payment_handler, refund_payment_handler,
    success_redirect_handler, webhook_handler, PaymentsState,
};
use crate::logic::PaymentFlow;

/// Creates a router containing all routes for the payment feature.
///
/// # Arguments
/// * `config` - Shared application configuration (`Arc<AppConfig>`).
/// * `flow` - The shared payment reconciliation service.
///
/// # Returns
/// An Axum Router configured with payment routes and state.
pub fn routes(config: Arc<AppConfig>, flow: Arc<PaymentFlow>) -> Router {
    let payments_state = Arc::new(PaymentsState { config, flow });

    Router::new()
        // API endpoints called by our frontend
        .route("/payments/prepare", post(prepare_payment_handler))
        .route("/payments/{payment_id}/checkout", post(create_checkout_handler))
        .route("/payments/{payment_id}", get(get_payment_handler))
        .route("/payments/booking/{booking_id}", get(list_booking_payments_handler))
        // API endpoint called by the gateway SERVER for webhook notifications
        .route("/payments/webhook", post(webhook_handler))
        // Routes for USER BROWSER redirects (GET)
        .route("/payments/callback/success", get(success_redirect_handler))
        .route("/payments/callback/failure", get(failure_redirect_handler))
        .route("/payments/callback/cancel", get(cancel_redirect_handler))
        // Teacher/admin settlement operations
        .route("/payments/{payment_id}/capture", post(capture_payment_handler))
        .route("/payments/{payment_id}/cancel", post(cancel_payment_handler))
        .route("/payments/{payment_id}/refund", post(refund_payment_handler))
        .with_state(payments_state)
}
