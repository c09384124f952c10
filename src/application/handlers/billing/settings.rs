//! Runtime knobs shared by the billing handlers.

use std::time::Duration;

use crate::domain::billing::INVOICE_REFERENCE_RETENTION_DAYS;

/// Default purchaser refund window.
pub const DEFAULT_REFUND_WINDOW_DAYS: i64 = 30;

/// How many gateway subscriptions cancellation scans to backfill a missing id.
pub const SUBSCRIPTION_SCAN_LIMIT: u32 = 10;

#[derive(Debug, Clone)]
pub struct BillingSettings {
    /// Currency used when a request does not name one.
    pub default_currency: String,
    /// Upper bound on every gateway call.
    pub gateway_timeout: Duration,
    pub refund_window_days: i64,
    pub invoice_retention_days: i64,
    /// Pause before the single retry of an invoice cross-reference lookup.
    pub invoice_lookup_retry_delay: Duration,
}

impl Default for BillingSettings {
    fn default() -> Self {
        Self {
            default_currency: "usd".to_string(),
            gateway_timeout: Duration::from_secs(10),
            refund_window_days: DEFAULT_REFUND_WINDOW_DAYS,
            invoice_retention_days: INVOICE_REFERENCE_RETENTION_DAYS,
            invoice_lookup_retry_delay: Duration::from_secs(2),
        }
    }
}

impl BillingSettings {
    pub fn with_gateway_timeout(mut self, timeout: Duration) -> Self {
        self.gateway_timeout = timeout;
        self
    }

    pub fn with_invoice_lookup_retry_delay(mut self, delay: Duration) -> Self {
        self.invoice_lookup_retry_delay = delay;
        self
    }
}
