// File: crates/darsly_payments/src/doc.rs
#![allow(dead_code)] // Allow dead code for doc functions

#[cfg(feature = "openapi")]
use crate::handlers::{CreateCheckoutRequest, PreparePaymentRequest, RefundPaymentRequest};
#[cfg(feature = "openapi")]
use crate::logic::CheckoutResponse;
#[cfg(feature = "openapi")]
use darsly_common::models::{Customer, Payment, PaymentStatus};
#[cfg(feature = "openapi")]
use utoipa::OpenApi;

// Dummy functions carrying the handler attributes for utoipa
#[cfg(feature = "openapi")]
#[utoipa::path(
    post,
    path = "/api/payments/prepare",
    request_body = PreparePaymentRequest,
    responses(
        (status = 200, description = "Payment prepared", body = Payment),
        (status = 409, description = "A payment is already in progress for the booking"),
    ),
    tag = "Payments"
)]
fn doc_prepare_payment_handler() {}

#[cfg(feature = "openapi")]
#[utoipa::path(
    post,
    path = "/api/payments/{payment_id}/checkout",
    request_body = CreateCheckoutRequest,
    responses(
        (status = 200, description = "Checkout created", body = CheckoutResponse),
        (status = 400, description = "No valid phone number for the gateway"),
        (status = 502, description = "Gateway error"),
    ),
    tag = "Payments"
)]
fn doc_create_checkout_handler() {}

#[cfg(feature = "openapi")]
#[utoipa::path(
    post,
    path = "/api/payments/{payment_id}/refund",
    request_body = RefundPaymentRequest,
    responses(
        (status = 200, description = "Payment refunded", body = Payment),
        (status = 409, description = "Payment not completed or already refunded"),
    ),
    tag = "Payments"
)]
fn doc_refund_payment_handler() {}

#[cfg(feature = "openapi")]
#[derive(OpenApi)]
#[openapi(
    paths(
        doc_prepare_payment_handler,
        doc_create_checkout_handler,
        doc_refund_payment_handler
    ),
    components(schemas(
        PreparePaymentRequest,
        CreateCheckoutRequest,
        RefundPaymentRequest,
        CheckoutResponse,
        Payment,
        PaymentStatus,
        Customer
    )),
    tags(
        (name = "Payments", description = "Payment preparation, reconciliation and settlement API")
    )
)]
pub struct PaymentsApiDoc;
