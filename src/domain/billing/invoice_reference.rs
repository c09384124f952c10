//! Short-lived invoice to subscription cross-reference.

use serde::{Deserialize, Serialize};

use crate::domain::foundation::Timestamp;

/// Days an invoice cross-reference is kept before pruning.
pub const INVOICE_REFERENCE_RETENTION_DAYS: i64 = 10;

/// Captured from `invoice.created` so that `invoice.payment_succeeded`
/// can find its subscription.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceCrossReference {
    pub invoice_id: String,
    pub subscription_id: String,
    pub customer_id: Option<String>,
    pub gateway_plan_id: Option<String>,
    pub created_at: Timestamp,
}

impl InvoiceCrossReference {
    pub fn new(invoice_id: impl Into<String>, subscription_id: impl Into<String>) -> Self {
        Self {
            invoice_id: invoice_id.into(),
            subscription_id: subscription_id.into(),
            customer_id: None,
            gateway_plan_id: None,
            created_at: Timestamp::now(),
        }
    }

    pub fn with_customer(mut self, customer_id: Option<String>) -> Self {
        self.customer_id = customer_id;
        self
    }

    pub fn with_plan(mut self, gateway_plan_id: Option<String>) -> Self {
        self.gateway_plan_id = gateway_plan_id;
        self
    }

    pub fn with_created_at(mut self, created_at: Timestamp) -> Self {
        self.created_at = created_at;
        self
    }
}

/// Oldest creation time a reference may have and still be kept.
pub fn retention_cutoff(now: Timestamp, retention_days: i64) -> Timestamp {
    now.minus_days(retention_days)
}
