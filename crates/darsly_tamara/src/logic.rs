// --- File: crates/darsly_tamara/src/logic.rs ---

use crate::error::TamaraError;
use darsly_common::services::{CheckoutOrder, GatewayOrderStatus};
use darsly_common::HTTP_CLIENT;
use darsly_config::TamaraConfig;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use tracing::{debug, error, info, warn};

type HmacSha256 = Hmac<Sha256>;

/// Env var holding the merchant API token (Bearer auth).
const API_TOKEN_VAR: &str = "TAMARA_API_TOKEN";
/// Env var holding the shared secret webhooks are signed with.
const NOTIFICATION_SECRET_VAR: &str = "TAMARA_NOTIFICATION_SECRET";

// --- Wire structures (Tamara API payloads) ---

/// Decimal-string money value as the Tamara API exchanges it.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct TamaraAmount {
    pub amount: String,
    pub currency: String,
}

impl TamaraAmount {
    /// Render minor units (fils) as the provider's decimal string,
    /// e.g. 10000 -> "100.00".
    pub fn from_minor(minor: i64, currency: &str) -> Self {
        Self {
            amount: format!("{}.{:02}", minor / 100, (minor % 100).abs()),
            currency: currency.to_string(),
        }
    }
}

#[derive(Serialize, Debug)]
struct TamaraConsumerPayload<'a> {
    first_name: &'a str,
    last_name: &'a str,
    email: &'a str,
    phone_number: &'a str,
}

#[derive(Serialize, Debug)]
struct TamaraItemPayload<'a> {
    name: &'a str,
    reference_id: String,
    quantity: i64,
    unit_price: TamaraAmount,
    total_amount: TamaraAmount,
}

#[derive(Serialize, Debug)]
struct TamaraMerchantUrls<'a> {
    success: &'a str,
    failure: &'a str,
    cancel: &'a str,
    notification: &'a str,
}

#[derive(Serialize, Debug)]
struct TamaraCheckoutPayload<'a> {
    order_reference_id: &'a str,
    total_amount: TamaraAmount,
    description: &'a str,
    country_code: &'a str,
    payment_type: &'a str,
    items: Vec<TamaraItemPayload<'a>>,
    consumer: TamaraConsumerPayload<'a>,
    merchant_url: TamaraMerchantUrls<'a>,
}

#[derive(Deserialize, Debug)]
pub struct TamaraCheckoutResponse {
    pub order_id: String,
    pub checkout_url: String,
}

#[derive(Deserialize, Debug)]
pub struct TamaraOrderResponse {
    pub order_id: Option<String>,
    pub status: String,
}

#[derive(Deserialize, Debug)]
pub struct TamaraAuthorizeResponse {
    pub order_id: Option<String>,
    pub status: String,
    /// Present when the provider captured in the same step.
    #[serde(default)]
    pub auto_captured: bool,
}

#[derive(Deserialize, Debug)]
pub struct TamaraCaptureResponse {
    pub status: String,
}

#[derive(Deserialize, Debug)]
pub struct TamaraRefundResponse {
    pub status: String,
}

/// Error body the API sends on failures; 409 bodies carry the order's
/// current state.
#[derive(Deserialize, Debug)]
struct TamaraErrorResponse {
    message: Option<String>,
    #[serde(default)]
    order_status: Option<String>,
}

/// Webhook notification body.
#[derive(Deserialize, Serialize, Debug, Clone)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct TamaraWebhookEvent {
    pub order_id: Option<String>,
    pub order_reference_id: Option<String>,
    pub event_type: Option<String>,
    #[serde(default)]
    pub data: Option<serde_json::Value>,
}

/// Map a raw provider status string onto the neutral enum.
pub fn map_order_status(raw: &str) -> Result<GatewayOrderStatus, TamaraError> {
    GatewayOrderStatus::parse(raw).ok_or_else(|| TamaraError::UnknownStatus(raw.to_string()))
}

// --- Client ---

/// Thin, stateless client for the Tamara API.
///
/// Holds the non-secret config plus the two secrets read from the
/// environment at construction, so a missing credential fails fast at
/// startup instead of on the first checkout.
#[derive(Clone)]
pub struct TamaraClient {
    config: TamaraConfig,
    api_token: String,
    notification_secret: String,
}

impl TamaraClient {
    /// Build a client from config, reading secrets from the environment.
    pub fn from_env(config: &TamaraConfig) -> Result<Self, TamaraError> {
        let api_token = std::env::var(API_TOKEN_VAR).map_err(|_| TamaraError::ConfigError)?;
        let notification_secret =
            std::env::var(NOTIFICATION_SECRET_VAR).map_err(|_| TamaraError::ConfigError)?;
        if api_token.is_empty() || notification_secret.is_empty() {
            return Err(TamaraError::ConfigError);
        }
        Ok(Self {
            config: config.clone(),
            api_token,
            notification_secret,
        })
    }

    /// Test/bench constructor with explicit secrets.
    pub fn with_secrets(
        config: TamaraConfig,
        api_token: impl Into<String>,
        notification_secret: impl Into<String>,
    ) -> Self {
        Self {
            config,
            api_token: api_token.into(),
            notification_secret: notification_secret.into(),
        }
    }

    pub fn config(&self) -> &TamaraConfig {
        &self.config
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.api_url.trim_end_matches('/'), path)
    }

    /// Send one request and decode the response, normalizing API failures.
    async fn send<T: serde::de::DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
        operation: &str,
    ) -> Result<T, TamaraError> {
        let response = request
            .header(reqwest::header::AUTHORIZATION, format!("Bearer {}", self.api_token))
            .send()
            .await?;

        let status = response.status();
        let body_text = response.text().await?;
        debug!("Tamara {} responded with status {}", operation, status);

        if status.is_success() {
            return Ok(serde_json::from_str(&body_text)?);
        }

        let parsed: Option<TamaraErrorResponse> = serde_json::from_str(&body_text).ok();
        let message = parsed
            .as_ref()
            .and_then(|e| e.message.clone())
            .unwrap_or_else(|| body_text.clone());

        if status.as_u16() == 409 {
            // The provider reports which state the order already reached;
            // callers translate that into user guidance.
            if let Some(prior_raw) = parsed.as_ref().and_then(|e| e.order_status.as_deref()) {
                if let Ok(prior_state) = map_order_status(prior_raw) {
                    warn!(
                        "Tamara {} conflict: order already {}",
                        operation,
                        prior_state.as_str()
                    );
                    return Err(TamaraError::ConflictError { prior_state });
                }
            }
        }

        error!(
            "Tamara {} failed: status={}, message='{}'",
            operation, status, message
        );
        Err(TamaraError::ApiError {
            status: status.as_u16(),
            message,
        })
    }

    /// Create a hosted checkout session for the given order.
    pub async fn create_checkout(
        &self,
        order: &CheckoutOrder,
    ) -> Result<TamaraCheckoutResponse, TamaraError> {
        let country_code = self
            .config
            .default_country_code
            .as_deref()
            .unwrap_or("+971");
        // Provider wants the ISO country, not the calling code; the market
        // config keys both off the calling code today.
        let country = if country_code == "+971" { "AE" } else { "SA" };

        let (first_name, last_name) = split_name(&order.consumer.name);

        let items = order
            .items
            .iter()
            .enumerate()
            .map(|(index, item)| TamaraItemPayload {
                name: &item.name,
                reference_id: format!("{}-{}", order.reference, index + 1),
                quantity: item.quantity,
                unit_price: TamaraAmount::from_minor(item.unit_amount, &order.currency),
                total_amount: TamaraAmount::from_minor(
                    item.unit_amount * item.quantity,
                    &order.currency,
                ),
            })
            .collect();

        let payload = TamaraCheckoutPayload {
            order_reference_id: &order.reference,
            total_amount: TamaraAmount::from_minor(order.amount, &order.currency),
            description: &order.description,
            country_code: country,
            payment_type: "PAY_BY_INSTALMENTS",
            items,
            consumer: TamaraConsumerPayload {
                first_name,
                last_name,
                email: &order.consumer.email,
                phone_number: &order.consumer.phone,
            },
            merchant_url: TamaraMerchantUrls {
                success: &order.success_url,
                failure: &order.failure_url,
                cancel: &order.cancel_url,
                notification: &order.webhook_url,
            },
        };

        info!(
            "Creating Tamara checkout for reference {} ({} {})",
            order.reference,
            TamaraAmount::from_minor(order.amount, &order.currency).amount,
            order.currency
        );

        let request = HTTP_CLIENT.post(self.url("/checkout")).json(&payload);
        self.send(request, "create_checkout").await
    }

    /// Read the provider's authoritative order state.
    pub async fn get_order(&self, order_id: &str) -> Result<TamaraOrderResponse, TamaraError> {
        let request = HTTP_CLIENT.get(self.url(&format!("/orders/{}", order_id)));
        self.send(request, "get_order").await
    }

    /// Move an approved order to authorised.
    pub async fn authorize_order(
        &self,
        order_id: &str,
    ) -> Result<TamaraAuthorizeResponse, TamaraError> {
        let request = HTTP_CLIENT
            .post(self.url(&format!("/orders/{}/authorise", order_id)))
            .json(&serde_json::json!({}));
        self.send(request, "authorize_order").await
    }

    /// Capture reserved funds.
    pub async fn capture_order(
        &self,
        order_id: &str,
        amount: i64,
        currency: &str,
    ) -> Result<TamaraCaptureResponse, TamaraError> {
        let payload = serde_json::json!({
            "order_id": order_id,
            "total_amount": TamaraAmount::from_minor(amount, currency),
        });
        let request = HTTP_CLIENT.post(self.url("/payments/capture")).json(&payload);
        self.send(request, "capture_order").await
    }

    /// Cancel a not-yet-captured order.
    pub async fn cancel_order(
        &self,
        order_id: &str,
        amount: i64,
        currency: &str,
    ) -> Result<TamaraOrderResponse, TamaraError> {
        let payload = serde_json::json!({
            "total_amount": TamaraAmount::from_minor(amount, currency),
        });
        let request = HTTP_CLIENT
            .post(self.url(&format!("/orders/{}/cancel", order_id)))
            .json(&payload);
        self.send(request, "cancel_order").await
    }

    /// Refund a captured order, fully or partially.
    pub async fn refund_order(
        &self,
        order_id: &str,
        amount: i64,
        currency: &str,
        comment: Option<&str>,
    ) -> Result<TamaraRefundResponse, TamaraError> {
        let payload = serde_json::json!({
            "total_amount": TamaraAmount::from_minor(amount, currency),
            "comment": comment.unwrap_or("merchant refund"),
        });
        let request = HTTP_CLIENT
            .post(self.url(&format!("/payments/simplified-refund/{}", order_id)))
            .json(&payload);
        self.send(request, "refund_order").await
    }

    /// Verify the HMAC-SHA256 signature on a webhook body.
    ///
    /// The comparison goes through `Mac::verify_slice`, which is
    /// constant-time.
    pub fn verify_webhook_signature(&self, payload: &[u8], signature_header: Option<&str>) -> bool {
        let Some(signature_hex) = signature_header else {
            warn!("Webhook rejected: missing signature header");
            return false;
        };

        let Ok(signature) = hex::decode(signature_hex.trim()) else {
            warn!("Webhook rejected: signature is not valid hex");
            return false;
        };

        let mut mac = HmacSha256::new_from_slice(self.notification_secret.as_bytes())
            .expect("HMAC can take key of any size");
        mac.update(payload);
        mac.verify_slice(&signature).is_ok()
    }

    /// Sign a payload the way the provider does; used by tests and the
    /// sandbox tooling.
    pub fn sign_webhook_payload(&self, payload: &[u8]) -> String {
        let mut mac = HmacSha256::new_from_slice(self.notification_secret.as_bytes())
            .expect("HMAC can take key of any size");
        mac.update(payload);
        hex::encode(mac.finalize().into_bytes())
    }
}

fn split_name(full: &str) -> (&str, &str) {
    match full.split_once(' ') {
        Some((first, last)) => (first, last),
        None => (full, full),
    }
}
