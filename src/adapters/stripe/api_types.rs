//! Stripe REST response bodies.
//!
//! Only the fields the ledger reads are modeled; everything else in the
//! Stripe JSON is ignored.

use serde::Deserialize;

use crate::domain::billing::PaymentDetails;
use crate::ports::{Charge, Customer, PaymentError, PaymentErrorCode, Refund, Subscription, SubscriptionStatus, UpcomingInvoice};

// ════════════════════════════════════════════════════════════════════════════════
// Resources
// ════════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Deserialize)]
pub struct StripeCustomer {
    pub id: String,
    pub email: Option<String>,
    #[serde(default)]
    pub created: i64,
}

impl From<StripeCustomer> for Customer {
    fn from(c: StripeCustomer) -> Self {
        Customer {
            id: c.id,
            email: c.email,
            created_at: c.created,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StripeCharge {
    pub id: String,
    #[serde(default)]
    pub customer: Option<String>,
    pub amount: i64,
    pub currency: String,
    #[serde(default)]
    pub created: i64,
    #[serde(default)]
    pub failure_message: Option<String>,
    #[serde(default)]
    pub outcome: Option<StripeChargeOutcome>,
    #[serde(default)]
    pub payment_method_details: Option<StripePaymentMethodDetails>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StripeChargeOutcome {
    pub network_status: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StripePaymentMethodDetails {
    pub card: Option<StripeCard>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StripeCard {
    pub brand: Option<String>,
    pub last4: Option<String>,
    pub exp_month: Option<i32>,
    pub exp_year: Option<i32>,
}

impl StripeCharge {
    pub fn into_charge(self, fallback_customer: &str) -> Charge {
        let card = self
            .payment_method_details
            .and_then(|details| details.card);
        let details = PaymentDetails {
            brand: card.as_ref().and_then(|c| c.brand.clone()),
            last4: card.as_ref().and_then(|c| c.last4.clone()),
            exp_month: card.as_ref().and_then(|c| c.exp_month),
            exp_year: card.as_ref().and_then(|c| c.exp_year),
            network_status: self.outcome.and_then(|o| o.network_status),
            failure_message: self.failure_message,
        };
        Charge {
            id: self.id,
            customer_id: self
                .customer
                .unwrap_or_else(|| fallback_customer.to_string()),
            amount_cents: self.amount,
            currency: self.currency,
            created_at: self.created,
            details,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StripeSubscription {
    pub id: String,
    pub customer: String,
    pub status: SubscriptionStatus,
    #[serde(default)]
    pub created: i64,
    pub canceled_at: Option<i64>,
    pub ended_at: Option<i64>,
    #[serde(default)]
    pub plan: Option<StripePlanRef>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StripePlanRef {
    pub id: String,
}

impl From<StripeSubscription> for Subscription {
    fn from(s: StripeSubscription) -> Self {
        Subscription {
            id: s.id,
            customer_id: s.customer,
            plan_id: s.plan.map(|p| p.id),
            status: s.status,
            created_at: s.created,
            canceled_at: s.canceled_at,
            ended_at: s.ended_at,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StripeList<T> {
    pub data: Vec<T>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StripeUpcomingInvoice {
    pub amount_due: i64,
    pub period_start: i64,
    pub period_end: i64,
}

impl From<StripeUpcomingInvoice> for UpcomingInvoice {
    fn from(i: StripeUpcomingInvoice) -> Self {
        UpcomingInvoice {
            amount_due_cents: i.amount_due,
            period_start: i.period_start,
            period_end: i.period_end,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StripeRefund {
    pub id: String,
    pub charge: String,
    pub amount: i64,
    pub status: String,
}

impl From<StripeRefund> for Refund {
    fn from(r: StripeRefund) -> Self {
        Refund {
            id: r.id,
            charge_id: r.charge,
            amount_cents: r.amount,
            status: r.status,
        }
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// Errors
// ════════════════════════════════════════════════════════════════════════════════

/// Error envelope: `{"error": {...}}`.
#[derive(Debug, Clone, Deserialize)]
pub struct StripeErrorBody {
    pub error: StripeApiError,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StripeApiError {
    #[serde(rename = "type", default)]
    pub error_type: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub decline_code: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Stripe error code for a plan id that is already taken.
pub const RESOURCE_ALREADY_EXISTS: &str = "resource_already_exists";

/// Stripe error code for a second refund of the same charge.
pub const CHARGE_ALREADY_REFUNDED: &str = "charge_already_refunded";

/// Stripe error type of a declined card, whatever the HTTP status.
pub const CARD_ERROR: &str = "card_error";

/// Map a non-2xx Stripe response to a `PaymentError`.
///
/// Status drives the category, except that a `card_error` body is always a
/// decline; otherwise the body only adds detail.
pub fn map_error_response(status: u16, body: &str) -> PaymentError {
    let api_error = serde_json::from_str::<StripeErrorBody>(body)
        .map(|b| b.error)
        .unwrap_or_default();
    let message = api_error
        .message
        .clone()
        .unwrap_or_else(|| format!("Stripe API error (HTTP {})", status));

    let is_card_error = api_error.error_type.as_deref() == Some(CARD_ERROR);

    let mut error = match status {
        _ if is_card_error || status == 402 => {
            let decline = api_error
                .decline_code
                .clone()
                .or_else(|| api_error.code.clone())
                .unwrap_or_else(|| "generic_decline".to_string());
            PaymentError::card_declined(decline, message).with_http_status(status)
        }
        400 if api_error.code.as_deref() == Some(CHARGE_ALREADY_REFUNDED) => {
            PaymentError::new(PaymentErrorCode::AlreadyRefunded, message).with_http_status(400)
        }
        400 => PaymentError::invalid_request(message),
        401 | 403 => PaymentError::authentication(message).with_http_status(status),
        404 => PaymentError::new(PaymentErrorCode::NotFound, message).with_http_status(404),
        429 => {
            PaymentError::new(PaymentErrorCode::RateLimitExceeded, message).with_http_status(429)
        }
        500..=599 => PaymentError::new(PaymentErrorCode::ProviderError, message)
            .with_http_status(status),
        _ => PaymentError::new(PaymentErrorCode::Unknown, message).with_http_status(status),
    };

    if let Some(code) = api_error.code {
        error = error.with_provider_code(code);
    }
    error
}
