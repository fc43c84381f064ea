// --- File: crates/darsly_payments/src/handlers.rs ---
use crate::error::PaymentError;
use crate::logic::{CancelOutcome, CheckoutResponse, PaymentFlow, ReconciliationOutcome};
use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::Json,
};
use darsly_common::models::{Customer, Payment};
use darsly_common::HttpStatusCode;
use darsly_config::AppConfig;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{error, info};

/// Header carrying the webhook signature.
const SIGNATURE_HEADER: &str = "tamara-signature";

// Define shared state needed by payment handlers
#[derive(Clone)]
pub struct PaymentsState {
    pub config: Arc<AppConfig>,
    pub flow: Arc<PaymentFlow>,
}

fn into_response(err: PaymentError) -> (StatusCode, String) {
    let status =
        StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    if status.is_server_error() {
        error!("Payment operation failed: {}", err);
    }
    (status, err.to_string())
}

#[derive(Deserialize, Debug)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct PreparePaymentRequest {
    pub booking_id: String,
    pub student_id: String,
}

#[derive(Deserialize, Debug)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct CreateCheckoutRequest {
    pub customer: Customer,
}

#[derive(Deserialize, Debug)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct CancelPaymentRequest {
    pub user_id: String,
}

#[derive(Deserialize, Debug)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct RefundPaymentRequest {
    /// Minor units; defaults to the full captured amount.
    pub amount: Option<i64>,
    pub comment: Option<String>,
}

#[derive(Deserialize, Debug)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct CallbackQuery {
    pub payment_ref: String,
}

/// Handler to prepare a payment attempt for a booking.
#[axum::debug_handler]
pub async fn prepare_payment_handler(
    State(state): State<Arc<PaymentsState>>,
    Json(payload): Json<PreparePaymentRequest>,
) -> Result<Json<Payment>, (StatusCode, String)> {
    state
        .flow
        .prepare_payment(&payload.booking_id, &payload.student_id)
        .await
        .map(Json)
        .map_err(into_response)
}

/// Handler to create the gateway checkout and hand back its URL.
#[axum::debug_handler]
pub async fn create_checkout_handler(
    State(state): State<Arc<PaymentsState>>,
    Path(payment_id): Path<String>,
    Json(payload): Json<CreateCheckoutRequest>,
) -> Result<Json<CheckoutResponse>, (StatusCode, String)> {
    state
        .flow
        .create_checkout(&payment_id, &payload.customer)
        .await
        .map(Json)
        .map_err(into_response)
}

/// Handler to fetch a payment.
#[axum::debug_handler]
pub async fn get_payment_handler(
    State(state): State<Arc<PaymentsState>>,
    Path(payment_id): Path<String>,
) -> Result<Json<Payment>, (StatusCode, String)> {
    state
        .flow
        .get(&payment_id)
        .await
        .map(Json)
        .map_err(into_response)
}

/// Handler to list a booking's payment attempts.
#[axum::debug_handler]
pub async fn list_booking_payments_handler(
    State(state): State<Arc<PaymentsState>>,
    Path(booking_id): Path<String>,
) -> Result<Json<Vec<Payment>>, (StatusCode, String)> {
    state
        .flow
        .list_for_booking(&booking_id)
        .await
        .map(Json)
        .map_err(into_response)
}

/// Handler for provider webhooks (server-to-server).
///
/// Verifies the signature before touching anything, then runs the standard
/// reconciliation. The body is consumed raw: signature verification must see
/// the exact bytes the provider signed.
#[axum::debug_handler]
pub async fn webhook_handler(
    State(state): State<Arc<PaymentsState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<ReconciliationOutcome>, (StatusCode, String)> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok());

    state
        .flow
        .handle_webhook(&body, signature)
        .await
        .map(Json)
        .map_err(into_response)
}

/// Handler for the browser redirect after a successful checkout.
///
/// The redirect is a hint, not a settlement signal: the gateway is queried
/// for the authoritative state.
#[axum::debug_handler]
pub async fn success_redirect_handler(
    State(state): State<Arc<PaymentsState>>,
    Query(query): Query<CallbackQuery>,
) -> Result<Json<ReconciliationOutcome>, (StatusCode, String)> {
    state
        .flow
        .reconcile_by_reference(&query.payment_ref)
        .await
        .map(Json)
        .map_err(into_response)
}

/// Handler for the browser redirect after a failed checkout.
#[axum::debug_handler]
pub async fn failure_redirect_handler(
    State(state): State<Arc<PaymentsState>>,
    Query(query): Query<CallbackQuery>,
) -> Result<Json<ReconciliationOutcome>, (StatusCode, String)> {
    state
        .flow
        .reconcile_by_reference(&query.payment_ref)
        .await
        .map(Json)
        .map_err(into_response)
}

/// Handler for the browser redirect after the user abandoned checkout.
///
/// No state change: an abandoned pending payment is swept by the TTL.
#[axum::debug_handler]
pub async fn cancel_redirect_handler(
    State(_state): State<Arc<PaymentsState>>,
    Query(query): Query<CallbackQuery>,
) -> Json<serde_json::Value> {
    info!("Checkout abandoned for reference {}", query.payment_ref);
    Json(serde_json::json!({
        "status": "checkout_cancelled",
        "message": "Checkout was cancelled. You can start a new payment at any time.",
    }))
}

/// Handler for manual capture of an authorised payment.
#[axum::debug_handler]
pub async fn capture_payment_handler(
    State(state): State<Arc<PaymentsState>>,
    Path(payment_id): Path<String>,
) -> Result<Json<ReconciliationOutcome>, (StatusCode, String)> {
    state
        .flow
        .capture(&payment_id)
        .await
        .map(Json)
        .map_err(into_response)
}

/// Handler for payment cancellation.
#[axum::debug_handler]
pub async fn cancel_payment_handler(
    State(state): State<Arc<PaymentsState>>,
    Path(payment_id): Path<String>,
    Json(payload): Json<CancelPaymentRequest>,
) -> Result<Json<CancelOutcome>, (StatusCode, String)> {
    state
        .flow
        .cancel(&payment_id, &payload.user_id)
        .await
        .map(Json)
        .map_err(into_response)
}

/// Handler for refunds of settled payments.
#[axum::debug_handler]
pub async fn refund_payment_handler(
    State(state): State<Arc<PaymentsState>>,
    Path(payment_id): Path<String>,
    Json(payload): Json<RefundPaymentRequest>,
) -> Result<Json<Payment>, (StatusCode, String)> {
    state
        .flow
        .refund(&payment_id, payload.amount, payload.comment.as_deref())
        .await
        .map(Json)
        .map_err(into_response)
}
