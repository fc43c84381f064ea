// --- File: crates/darsly_config/src/lib.rs ---

pub mod models;

pub use models::*;

use config::{Config, ConfigError, Environment, File};
use std::sync::Once;

static DOTENV: Once = Once::new();

/// Loads `.env` once per process so repeated config loads stay cheap.
pub fn ensure_dotenv_loaded() {
    DOTENV.call_once(|| {
        let _ = dotenv::dotenv();
    });
}

/// Loads the application configuration.
///
/// Sources, later ones overriding earlier ones:
/// 1. `config/default.toml` (optional)
/// 2. `config/{RUN_ENV}.toml` (optional, RUN_ENV defaults to `development`)
/// 3. Environment variables prefixed with `APP`, `__` as separator
///    (e.g. `APP_SERVER__PORT=8086`, `APP_DATABASE__URL=sqlite://darsly.db`).
///
/// Secrets (gateway API token, webhook secret) are never part of the config
/// tree; the crates that need them read their env vars directly.
pub fn load_config() -> Result<AppConfig, ConfigError> {
    ensure_dotenv_loaded();

    let run_env = std::env::var("RUN_ENV").unwrap_or_else(|_| "development".to_string());

    let config = Config::builder()
        .set_default("server.host", "127.0.0.1")?
        .set_default("server.port", 8086)?
        .add_source(File::with_name("config/default").required(false))
        .add_source(File::with_name(&format!("config/{}", run_env)).required(false))
        .add_source(Environment::with_prefix("APP").separator("__"))
        .build()?;

    config.try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_config_uses_defaults_when_no_files_present() {
        let config = load_config().expect("default config should load");
        assert!(!config.server.host.is_empty());
        assert!(config.server.port > 0);
    }

    #[test]
    fn payment_config_defaults() {
        let payment = PaymentConfig::default();
        assert_eq!(payment.cancellation_window_hours, 24);
        assert_eq!(payment.abandoned_ttl_minutes, 30);
    }
}
