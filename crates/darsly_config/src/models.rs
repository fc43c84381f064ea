// --- File: crates/darsly_config/src/models.rs ---

use serde::{Deserialize, Serialize};

// --- General Server Config ---
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

// --- Database Config ---
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DatabaseConfig {
    pub url: String, // e.g. DATABASE_URL loaded via APP_DATABASE__URL or DATABASE_URL
}

#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct PriceTier {
    /// Subject this tier applies to; `None` makes it the teacher-wide default.
    pub subject_id: Option<String>,
    /// Price of one slot in the smallest currency unit (e.g. fils).
    pub unit_amount: i64,
    /// Optional currency code for this tier.
    pub currency: Option<String>,
    /// Optional product name shown on the gateway checkout page.
    pub product_name: Option<String>,
}

// --- Booking Config ---
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct BookingConfig {
    /// Fallback per-slot price when no tier matches.
    pub default_unit_amount: i64,
    pub default_currency: Option<String>,
    /// Price tiers keyed by subject.
    #[serde(default)]
    pub price_tiers: Vec<PriceTier>,
}

// --- Tamara Gateway Config ---
// Holds non-secret Tamara config. Secrets loaded directly from env vars:
// TAMARA_API_TOKEN, TAMARA_NOTIFICATION_SECRET.
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct TamaraConfig {
    pub api_url: String,     // Mandatory, e.g. https://api.tamara.co
    pub success_url: String, // Mandatory
    pub failure_url: String, // Mandatory
    pub cancel_url: String,  // Mandatory
    pub webhook_url: String, // Mandatory, server-to-server notification target
    pub currency: Option<String>,
    /// Country calling code used to normalize local phone numbers, e.g. "+971".
    pub default_country_code: Option<String>,
    /// When true, an authorised order is treated as captured immediately.
    #[serde(default)]
    pub auto_capture: bool,
}

// --- Payment Flow Config ---
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct PaymentConfig {
    /// Hours after settlement during which a student may still cancel.
    #[serde(default = "default_cancellation_window_hours")]
    pub cancellation_window_hours: i64,
    /// Minutes after which a pending payment with no gateway order is abandoned.
    #[serde(default = "default_abandoned_ttl_minutes")]
    pub abandoned_ttl_minutes: i64,
}

fn default_cancellation_window_hours() -> i64 {
    24
}

fn default_abandoned_ttl_minutes() -> i64 {
    30
}

impl Default for PaymentConfig {
    fn default() -> Self {
        Self {
            cancellation_window_hours: default_cancellation_window_hours(),
            abandoned_ttl_minutes: default_abandoned_ttl_minutes(),
        }
    }
}

// --- Unified App Configuration ---
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AppConfig {
    // Server config is mandatory
    pub server: ServerConfig,

    // --- Optional Feature Configurations ---
    #[serde(default)]
    pub database: Option<DatabaseConfig>,
    #[serde(default)]
    pub booking: Option<BookingConfig>,
    #[serde(default)]
    pub tamara: Option<TamaraConfig>,
    #[serde(default)]
    pub payment: Option<PaymentConfig>,
}
