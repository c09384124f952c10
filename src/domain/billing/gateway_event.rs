//! Gateway webhook events and the typed objects they carry.
//!
//! Only the fields reconciliation needs are decoded. Optional fields
//! default instead of failing the whole decode.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::ledger_entry::PaymentDetails;
use super::plan_type::PlanType;
use super::webhook_errors::WebhookError;
use crate::domain::foundation::{OrganizationId, PurchaserId, Timestamp};

/// Webhook envelope.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GatewayEvent {
    /// Unique identifier for the event (evt_xxx format).
    pub id: String,

    #[serde(rename = "type")]
    pub event_type: String,

    /// Unix timestamp the gateway created the event at.
    #[serde(default)]
    pub created: i64,

    pub data: GatewayEventData,

    #[serde(default)]
    pub livemode: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GatewayEventData {
    /// Polymorphic object, decoded per event type.
    pub object: serde_json::Value,
}

impl GatewayEvent {
    pub fn parsed_type(&self) -> GatewayEventType {
        GatewayEventType::from_str(&self.event_type)
    }

    /// Decodes the data object as the type matching the event.
    pub fn object<T: serde::de::DeserializeOwned>(&self) -> Result<T, WebhookError> {
        serde_json::from_value(self.data.object.clone())
            .map_err(|e| WebhookError::ParseError(format!("{}: {}", self.event_type, e)))
    }
}

/// Event types reconciliation acts on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayEventType {
    ChargeSucceeded,
    ChargeRefunded,
    SubscriptionDeleted,
    SubscriptionUpdated,
    InvoiceCreated,
    InvoicePaymentSucceeded,
    Unknown,
}

impl GatewayEventType {
    pub fn from_str(s: &str) -> Self {
        match s {
            "charge.succeeded" => Self::ChargeSucceeded,
            "charge.refunded" => Self::ChargeRefunded,
            "customer.subscription.deleted" => Self::SubscriptionDeleted,
            "customer.subscription.updated" => Self::SubscriptionUpdated,
            "invoice.created" => Self::InvoiceCreated,
            "invoice.payment_succeeded" => Self::InvoicePaymentSucceeded,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ChargeSucceeded => "charge.succeeded",
            Self::ChargeRefunded => "charge.refunded",
            Self::SubscriptionDeleted => "customer.subscription.deleted",
            Self::SubscriptionUpdated => "customer.subscription.updated",
            Self::InvoiceCreated => "invoice.created",
            Self::InvoicePaymentSucceeded => "invoice.payment_succeeded",
            Self::Unknown => "unknown",
        }
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// Event objects
// ════════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ChargeObject {
    pub id: String,
    #[serde(default)]
    pub amount: i64,
    #[serde(default)]
    pub amount_refunded: i64,
    #[serde(default)]
    pub currency: String,
    #[serde(default)]
    pub customer: Option<String>,
    #[serde(default)]
    pub invoice: Option<String>,
    #[serde(default)]
    pub paid: bool,
    #[serde(default)]
    pub refunded: bool,
    #[serde(default)]
    pub created: i64,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    #[serde(default)]
    pub failure_message: Option<String>,
    #[serde(default)]
    pub outcome: Option<ChargeOutcome>,
    #[serde(default)]
    pub payment_method_details: Option<PaymentMethodDetails>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ChargeOutcome {
    #[serde(default)]
    pub network_status: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct PaymentMethodDetails {
    #[serde(default)]
    pub card: Option<CardDetails>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct CardDetails {
    #[serde(default)]
    pub brand: Option<String>,
    #[serde(default)]
    pub last4: Option<String>,
    #[serde(default)]
    pub exp_month: Option<i32>,
    #[serde(default)]
    pub exp_year: Option<i32>,
}

impl ChargeObject {
    pub fn payment_details(&self) -> PaymentDetails {
        let card = self
            .payment_method_details
            .as_ref()
            .and_then(|details| details.card.clone())
            .unwrap_or_default();
        PaymentDetails {
            brand: card.brand,
            last4: card.last4,
            exp_month: card.exp_month,
            exp_year: card.exp_year,
            network_status: self.outcome.as_ref().and_then(|o| o.network_status.clone()),
            failure_message: self.failure_message.clone(),
        }
    }

    pub fn created_at(&self) -> Timestamp {
        Timestamp::from_unix_secs(self.created)
            .filter(|_| self.created > 0)
            .unwrap_or_else(Timestamp::now)
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct SubscriptionObject {
    pub id: String,
    #[serde(default)]
    pub customer: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub canceled_at: Option<i64>,
    #[serde(default)]
    pub ended_at: Option<i64>,
    #[serde(default)]
    pub plan: Option<PlanObject>,
}

impl SubscriptionObject {
    /// Only a canceled or ended subscription changes local state.
    pub fn is_terminating(&self) -> bool {
        self.canceled_at.is_some() || self.ended_at.is_some()
    }

    pub fn canceled_at(&self) -> Option<Timestamp> {
        self.canceled_at.and_then(Timestamp::from_unix_secs)
    }

    pub fn ended_at(&self) -> Option<Timestamp> {
        self.ended_at.and_then(Timestamp::from_unix_secs)
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct PlanObject {
    pub id: String,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct InvoiceObject {
    pub id: String,
    #[serde(default)]
    pub subscription: Option<String>,
    #[serde(default)]
    pub customer: Option<String>,
    #[serde(default)]
    pub created: i64,
    #[serde(default)]
    pub status_transitions: Option<InvoiceStatusTransitions>,
    #[serde(default)]
    pub lines: InvoiceLines,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct InvoiceStatusTransitions {
    #[serde(default)]
    pub paid_at: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct InvoiceLines {
    #[serde(default)]
    pub data: Vec<InvoiceLine>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct InvoiceLine {
    #[serde(default)]
    pub plan: Option<PlanObject>,
}

impl InvoiceObject {
    /// Plan of the first invoice line, if any.
    pub fn plan_id(&self) -> Option<String> {
        self.lines
            .data
            .iter()
            .find_map(|line| line.plan.as_ref().map(|plan| plan.id.clone()))
    }

    pub fn paid_at(&self) -> Timestamp {
        self.status_transitions
            .as_ref()
            .and_then(|t| t.paid_at)
            .and_then(Timestamp::from_unix_secs)
            .unwrap_or_else(Timestamp::now)
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// Checkout metadata
// ════════════════════════════════════════════════════════════════════════════════

const ORIGIN_KEY: &str = "origin";
const CHECKOUT_ORIGIN: &str = "checkout";
const PURCHASER_KEY: &str = "purchaser_id";
const ORGANIZATION_KEY: &str = "organization_id";
const PLAN_TYPE_KEY: &str = "plan_type";
const COUPON_KEY: &str = "coupon_code";

/// Metadata attached to every gateway object created at checkout.
///
/// A charge carrying it was already journaled by checkout, or must be
/// backfilled from it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutMetadata {
    pub purchaser_id: PurchaserId,
    pub organization_id: Option<OrganizationId>,
    pub plan_type: Option<PlanType>,
    pub coupon_code: Option<String>,
}

impl CheckoutMetadata {
    pub fn to_map(&self) -> HashMap<String, String> {
        let mut map = HashMap::from([
            (ORIGIN_KEY.to_string(), CHECKOUT_ORIGIN.to_string()),
            (PURCHASER_KEY.to_string(), self.purchaser_id.to_string()),
        ]);
        if let Some(org) = &self.organization_id {
            map.insert(ORGANIZATION_KEY.to_string(), org.to_string());
        }
        if let Some(plan_type) = self.plan_type {
            map.insert(PLAN_TYPE_KEY.to_string(), plan_type.to_string());
        }
        if let Some(coupon) = &self.coupon_code {
            map.insert(COUPON_KEY.to_string(), coupon.clone());
        }
        map
    }

    /// Reads checkout metadata back. `None` when the object did not come from checkout.
    pub fn from_map(map: &HashMap<String, String>) -> Option<Self> {
        if map.get(ORIGIN_KEY).map(String::as_str) != Some(CHECKOUT_ORIGIN) {
            return None;
        }
        let purchaser_id = PurchaserId::new(map.get(PURCHASER_KEY)?.clone()).ok()?;
        Some(Self {
            purchaser_id,
            organization_id: map
                .get(ORGANIZATION_KEY)
                .and_then(|org| OrganizationId::new(org.clone()).ok()),
            plan_type: map.get(PLAN_TYPE_KEY).and_then(|p| p.parse().ok()),
            coupon_code: map.get(COUPON_KEY).cloned(),
        })
    }

    /// True when the map marks a checkout-originated object, even if malformed.
    pub fn is_checkout_originated(map: &HashMap<String, String>) -> bool {
        map.get(ORIGIN_KEY).map(String::as_str) == Some(CHECKOUT_ORIGIN)
    }
}
