//! Webhook reconciliation and retention configuration

use serde::Deserialize;
use std::time::Duration;

use super::error::ValidationError;
use crate::domain::billing::{DEFAULT_TOLERANCE_SECS, INVOICE_REFERENCE_RETENTION_DAYS};

#[derive(Debug, Clone, Deserialize)]
pub struct ReconciliationConfig {
    /// Accepted clock skew for webhook signature timestamps
    #[serde(default = "default_webhook_tolerance")]
    pub webhook_tolerance_secs: i64,

    /// Pause before retrying an invoice cross-reference lookup
    #[serde(default = "default_invoice_lookup_retry_ms")]
    pub invoice_lookup_retry_ms: u64,

    /// Days an invoice cross-reference is kept
    #[serde(default = "default_invoice_retention")]
    pub invoice_retention_days: i64,

    /// Days a handled webhook record is kept
    #[serde(default = "default_webhook_record_retention")]
    pub webhook_record_retention_days: i64,
}

impl ReconciliationConfig {
    pub fn invoice_lookup_retry_delay(&self) -> Duration {
        Duration::from_millis(self.invoice_lookup_retry_ms)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.webhook_tolerance_secs < 1 || self.webhook_tolerance_secs > 3600 {
            return Err(ValidationError::InvalidWebhookTolerance);
        }
        if self.invoice_retention_days < 1 {
            return Err(ValidationError::InvalidRetention("invoice_retention_days"));
        }
        // Records must outlive the gateway's redelivery window (3 days)
        if self.webhook_record_retention_days < 3 {
            return Err(ValidationError::InvalidRetention(
                "webhook_record_retention_days",
            ));
        }
        Ok(())
    }
}

impl Default for ReconciliationConfig {
    fn default() -> Self {
        Self {
            webhook_tolerance_secs: default_webhook_tolerance(),
            invoice_lookup_retry_ms: default_invoice_lookup_retry_ms(),
            invoice_retention_days: default_invoice_retention(),
            webhook_record_retention_days: default_webhook_record_retention(),
        }
    }
}

fn default_webhook_tolerance() -> i64 {
    DEFAULT_TOLERANCE_SECS
}

fn default_invoice_lookup_retry_ms() -> u64 {
    2000
}

fn default_invoice_retention() -> i64 {
    INVOICE_REFERENCE_RETENTION_DAYS
}

fn default_webhook_record_retention() -> i64 {
    30
}
