//! Application configuration module
//!
//! Configuration is read from environment variables using the `config` and
//! `dotenvy` crates. Variables carry the `BILLING_LEDGER` prefix and nested
//! values are separated by double underscores.
//!
//! # Example
//!
//! ```no_run
//! use billing_ledger::config::AppConfig;
//!
//! let config = AppConfig::load().expect("Failed to load configuration");
//! config.validate().expect("Invalid configuration");
//!
//! println!("Gateway test mode: {}", config.payment.is_test_mode());
//! ```

mod database;
mod error;
mod payment;
mod reconciliation;
mod runtime;

pub use database::DatabaseConfig;
pub use error::{ConfigError, ValidationError};
pub use payment::PaymentConfig;
pub use reconciliation::ReconciliationConfig;
pub use runtime::{Environment, LogFormat, RuntimeConfig};

use secrecy::ExposeSecret;
use serde::Deserialize;

use crate::application::handlers::BillingSettings;
use crate::domain::billing::WebhookVerifier;

/// Root application configuration
///
/// Load using [`AppConfig::load()`] which reads from environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Environment and logging
    #[serde(default)]
    pub runtime: RuntimeConfig,

    /// Database configuration (PostgreSQL connection)
    pub database: DatabaseConfig,

    /// Payment gateway configuration
    pub payment: PaymentConfig,

    /// Webhook reconciliation and retention
    #[serde(default)]
    pub reconciliation: ReconciliationConfig,
}

impl AppConfig {
    /// Load configuration from environment variables
    ///
    /// This function:
    /// 1. Loads `.env` file if present (for development)
    /// 2. Reads environment variables with `BILLING_LEDGER` prefix
    /// 3. Uses `__` (double underscore) to separate nested values
    /// 4. Deserializes into typed configuration structs
    ///
    /// # Environment Variable Format
    ///
    /// - `BILLING_LEDGER__DATABASE__URL=...` -> `database.url = ...`
    /// - `BILLING_LEDGER__PAYMENT__GATEWAY_API_KEY=...` -> `payment.gateway_api_key = ...`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing or a value
    /// cannot be parsed into its expected type.
    pub fn load() -> Result<Self, ConfigError> {
        // Load .env file if present (development)
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(
                config::Environment::default()
                    .prefix("BILLING_LEDGER")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()?;

        Ok(config)
    }

    /// Validate all configuration values
    ///
    /// # Errors
    ///
    /// Returns `ValidationError` for the first invalid section.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.runtime.validate()?;
        self.database.validate()?;
        self.payment.validate()?;
        self.reconciliation.validate()?;
        Ok(())
    }

    /// Check if running in production environment
    pub fn is_production(&self) -> bool {
        self.runtime.is_production()
    }

    /// Knobs handed to the billing handlers.
    pub fn billing_settings(&self) -> BillingSettings {
        BillingSettings {
            default_currency: self.payment.default_currency.clone(),
            gateway_timeout: self.payment.timeout(),
            refund_window_days: self.payment.refund_window_days,
            invoice_retention_days: self.reconciliation.invoice_retention_days,
            invoice_lookup_retry_delay: self.reconciliation.invoice_lookup_retry_delay(),
        }
    }

    pub fn webhook_verifier(&self) -> WebhookVerifier {
        WebhookVerifier::with_tolerance(
            self.payment.webhook_secret.expose_secret().as_str(),
            self.reconciliation.webhook_tolerance_secs,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::Mutex;
    use std::time::Duration;

    // Mutex to ensure tests don't run in parallel (env vars are global)
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    const REQUIRED: [(&str, &str); 3] = [
        ("BILLING_LEDGER__DATABASE__URL", "postgresql://test@localhost/billing"),
        ("BILLING_LEDGER__PAYMENT__GATEWAY_API_KEY", "sk_test_xxx"),
        ("BILLING_LEDGER__PAYMENT__WEBHOOK_SECRET", "whsec_xxx"),
    ];

    const OPTIONAL: [&str; 4] = [
        "BILLING_LEDGER__RUNTIME__ENVIRONMENT",
        "BILLING_LEDGER__RUNTIME__LOG_FORMAT",
        "BILLING_LEDGER__PAYMENT__REFUND_WINDOW_DAYS",
        "BILLING_LEDGER__RECONCILIATION__INVOICE_LOOKUP_RETRY_MS",
    ];

    fn set_minimal_env() {
        for (key, value) in REQUIRED {
            env::set_var(key, value);
        }
    }

    fn clear_env() {
        for (key, _) in REQUIRED {
            env::remove_var(key);
        }
        for key in OPTIONAL {
            env::remove_var(key);
        }
    }

    #[test]
    fn test_load_from_environment() {
        let _guard = ENV_MUTEX.lock().unwrap();
        set_minimal_env();
        let result = AppConfig::load();
        clear_env();

        assert!(result.is_ok(), "Failed to load config: {:?}", result.err());
        let config = result.unwrap();
        assert_eq!(
            config.database.url.expose_secret(),
            "postgresql://test@localhost/billing"
        );
        assert!(config.payment.is_test_mode());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_defaults_apply_to_optional_sections() {
        let _guard = ENV_MUTEX.lock().unwrap();
        set_minimal_env();
        let result = AppConfig::load();
        clear_env();

        let config = result.unwrap();
        assert_eq!(config.runtime.environment, Environment::Development);
        assert_eq!(config.runtime.log_format, LogFormat::Pretty);
        assert_eq!(config.reconciliation.invoice_retention_days, 10);
        assert_eq!(config.payment.default_currency, "usd");
    }

    #[test]
    fn test_overrides_flow_into_billing_settings() {
        let _guard = ENV_MUTEX.lock().unwrap();
        set_minimal_env();
        env::set_var("BILLING_LEDGER__PAYMENT__REFUND_WINDOW_DAYS", "14");
        env::set_var("BILLING_LEDGER__RECONCILIATION__INVOICE_LOOKUP_RETRY_MS", "50");
        let result = AppConfig::load();
        clear_env();

        let settings = result.unwrap().billing_settings();
        assert_eq!(settings.refund_window_days, 14);
        assert_eq!(settings.invoice_lookup_retry_delay, Duration::from_millis(50));
        assert_eq!(settings.gateway_timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_is_production() {
        let _guard = ENV_MUTEX.lock().unwrap();
        set_minimal_env();
        env::set_var("BILLING_LEDGER__RUNTIME__ENVIRONMENT", "production");
        env::set_var("BILLING_LEDGER__RUNTIME__LOG_FORMAT", "json");
        let result = AppConfig::load();
        clear_env();

        let config = result.unwrap();
        assert!(config.is_production());
        assert_eq!(config.runtime.log_format, LogFormat::Json);
    }

    #[test]
    fn test_missing_gateway_key_fails_to_load() {
        let _guard = ENV_MUTEX.lock().unwrap();
        set_minimal_env();
        env::remove_var("BILLING_LEDGER__PAYMENT__GATEWAY_API_KEY");
        let result = AppConfig::load();
        clear_env();

        assert!(result.is_err());
    }
}
