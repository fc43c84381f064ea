// --- File: crates/darsly_tamara/src/service.rs ---
//! `InstallmentGateway` implementation backed by the Tamara API client.

use crate::logic::{map_order_status, TamaraClient};
use darsly_common::services::{
    BoxFuture, CaptureOutcome, CheckoutOrder, CheckoutSession, GatewayError, InstallmentGateway,
    OrderAuthorization, OrderSnapshot, RefundOutcome,
};

impl InstallmentGateway for TamaraClient {
    fn create_checkout(
        &self,
        order: &CheckoutOrder,
    ) -> BoxFuture<'_, CheckoutSession, GatewayError> {
        // Clone so the future only borrows self
        let order = order.clone();
        Box::pin(async move {
            let response = TamaraClient::create_checkout(self, &order).await?;
            Ok(CheckoutSession {
                gateway_order_id: response.order_id,
                checkout_url: response.checkout_url,
            })
        })
    }

    fn get_order(&self, gateway_order_id: &str) -> BoxFuture<'_, OrderSnapshot, GatewayError> {
        let gateway_order_id = gateway_order_id.to_string();
        Box::pin(async move {
            let response = TamaraClient::get_order(self, &gateway_order_id).await?;
            let status = map_order_status(&response.status)?;
            Ok(OrderSnapshot { status })
        })
    }

    fn authorize_order(
        &self,
        gateway_order_id: &str,
    ) -> BoxFuture<'_, OrderAuthorization, GatewayError> {
        let gateway_order_id = gateway_order_id.to_string();
        Box::pin(async move {
            let response = TamaraClient::authorize_order(self, &gateway_order_id).await?;
            let status = map_order_status(&response.status)?;
            // A merchant configured for one-phase settlement treats
            // authorised as captured in the same step.
            let auto_captured = response.auto_captured || self.config().auto_capture;
            Ok(OrderAuthorization {
                status,
                auto_captured,
            })
        })
    }

    fn capture_order(
        &self,
        gateway_order_id: &str,
        amount: i64,
        currency: &str,
    ) -> BoxFuture<'_, CaptureOutcome, GatewayError> {
        let gateway_order_id = gateway_order_id.to_string();
        let currency = currency.to_string();
        Box::pin(async move {
            let response =
                TamaraClient::capture_order(self, &gateway_order_id, amount, &currency).await?;
            let status = map_order_status(&response.status)?;
            Ok(CaptureOutcome { status })
        })
    }

    fn cancel_order(
        &self,
        gateway_order_id: &str,
        amount: i64,
        currency: &str,
    ) -> BoxFuture<'_, OrderSnapshot, GatewayError> {
        let gateway_order_id = gateway_order_id.to_string();
        let currency = currency.to_string();
        Box::pin(async move {
            let response =
                TamaraClient::cancel_order(self, &gateway_order_id, amount, &currency).await?;
            let status = map_order_status(&response.status)?;
            Ok(OrderSnapshot { status })
        })
    }

    fn refund_order(
        &self,
        gateway_order_id: &str,
        amount: i64,
        currency: &str,
        comment: Option<&str>,
    ) -> BoxFuture<'_, RefundOutcome, GatewayError> {
        let gateway_order_id = gateway_order_id.to_string();
        let currency = currency.to_string();
        let comment = comment.map(|c| c.to_string());
        Box::pin(async move {
            let response = TamaraClient::refund_order(
                self,
                &gateway_order_id,
                amount,
                &currency,
                comment.as_deref(),
            )
            .await?;
            let status = map_order_status(&response.status)?;
            Ok(RefundOutcome { status })
        })
    }

    fn verify_webhook_signature(&self, payload: &[u8], signature: Option<&str>) -> bool {
        TamaraClient::verify_webhook_signature(self, payload, signature)
    }
}
