//! Billing domain: pricing catalog, customer links, subscription plans,
//! the ledger, and gateway webhook events.

mod catalog;
mod customer_link;
pub mod decline;
mod errors;
mod feature_tier;
mod gateway_event;
mod invoice_reference;
mod ledger_entry;
mod outcome;
mod plan_type;
mod subscription_plan;
mod webhook_errors;
mod webhook_verifier;

pub use catalog::{effective_coupon_code, PlanDefinition, PriceResolution, PriceStatus};
pub use customer_link::CustomerLink;
pub use errors::BillingError;
pub use feature_tier::{FeatureBitmap, FeatureTier};
pub use gateway_event::{
    CardDetails, ChargeObject, ChargeOutcome, CheckoutMetadata, GatewayEvent, GatewayEventData,
    GatewayEventType, InvoiceLine, InvoiceLines, InvoiceObject, InvoiceStatusTransitions,
    PaymentMethodDetails, PlanObject, SubscriptionObject,
};
pub use invoice_reference::{
    retention_cutoff, InvoiceCrossReference, INVOICE_REFERENCE_RETENTION_DAYS,
};
pub use ledger_entry::{EntryParty, EntryStatus, LedgerEntry, PaymentDetails, RecordKind};
pub use outcome::{
    CancelResult, CancelStatus, CheckoutResult, CheckoutStatus, OutcomeTag, RefundResult,
    RefundStatus, CANCEL_RETRY_MESSAGE,
};
pub use plan_type::{BillingInterval, PlanType};
pub use subscription_plan::{
    organization_gateway_plan_id, personal_gateway_plan_id, SubscriptionKey, SubscriptionPlan,
};
pub use webhook_errors::WebhookError;
pub use webhook_verifier::{sign_payload, SignatureHeader, WebhookVerifier, DEFAULT_TOLERANCE_SECS};
