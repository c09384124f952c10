//! Payment gateway configuration

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::time::Duration;

use super::error::ValidationError;
use crate::adapters::stripe::StripeConfig;
use crate::application::handlers::DEFAULT_REFUND_WINDOW_DAYS;

/// Payment gateway configuration (Stripe-compatible API)
#[derive(Debug, Clone, Deserialize)]
pub struct PaymentConfig {
    /// Secret API key
    pub gateway_api_key: SecretString,

    /// Webhook signing secret
    pub webhook_secret: SecretString,

    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Upper bound on every gateway call, in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Currency used when a checkout does not name one
    #[serde(default = "default_currency")]
    pub default_currency: String,

    #[serde(default = "default_refund_window_days")]
    pub refund_window_days: i64,
}

impl PaymentConfig {
    pub fn new(gateway_api_key: impl Into<String>, webhook_secret: impl Into<String>) -> Self {
        Self {
            gateway_api_key: SecretString::new(gateway_api_key.into()),
            webhook_secret: SecretString::new(webhook_secret.into()),
            base_url: default_base_url(),
            timeout_secs: default_timeout(),
            default_currency: default_currency(),
            refund_window_days: default_refund_window_days(),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Check if using gateway test mode
    pub fn is_test_mode(&self) -> bool {
        self.gateway_api_key.expose_secret().starts_with("sk_test_")
    }

    pub fn stripe_config(&self) -> StripeConfig {
        StripeConfig::new(self.gateway_api_key.clone())
            .with_base_url(self.base_url.trim_end_matches('/'))
            .with_request_timeout(self.timeout())
    }

    /// Validate payment configuration
    ///
    /// Live keys must talk to the gateway over HTTPS.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let api_key = self.gateway_api_key.expose_secret();
        let webhook_secret = self.webhook_secret.expose_secret();
        if api_key.is_empty() {
            return Err(ValidationError::MissingRequired("PAYMENT__GATEWAY_API_KEY"));
        }
        if webhook_secret.is_empty() {
            return Err(ValidationError::MissingRequired("PAYMENT__WEBHOOK_SECRET"));
        }
        if !api_key.starts_with("sk_") {
            return Err(ValidationError::InvalidGatewayKey);
        }
        if !webhook_secret.starts_with("whsec_") {
            return Err(ValidationError::InvalidWebhookSecret);
        }
        if !self.is_test_mode() && !self.base_url.starts_with("https://") {
            return Err(ValidationError::GatewayUrlMustBeHttps);
        }
        if self.timeout_secs == 0 || self.timeout_secs > 120 {
            return Err(ValidationError::InvalidTimeout);
        }
        if self.default_currency.len() != 3
            || !self.default_currency.chars().all(|c| c.is_ascii_lowercase())
        {
            return Err(ValidationError::InvalidCurrency);
        }
        if self.refund_window_days < 1 {
            return Err(ValidationError::InvalidRetention("refund_window_days"));
        }
        Ok(())
    }
}

fn default_base_url() -> String {
    "https://api.stripe.com".to_string()
}

fn default_timeout() -> u64 {
    10
}

fn default_currency() -> String {
    "usd".to_string()
}

fn default_refund_window_days() -> i64 {
    DEFAULT_REFUND_WINDOW_DAYS
}
