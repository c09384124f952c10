//! Billing handlers.
//!
//! Command and query handlers for the billing ledger:
//!
//! ## Commands
//! - Checkout of organization plans, recurring contributions and one-time charges
//! - Reconciling gateway webhook events
//! - Cancelling subscriptions
//! - Requesting refunds
//! - Moving billing data between purchasers or between organizations
//! - Pruning the invoice cache
//!
//! ## Queries
//! - Payment history with refund eligibility
//! - An organization's active plan
//!
//! `PricingCatalog` and `CustomerRegistry` are shared services the
//! handlers compose.

mod cancel_subscription;
mod checkout;
mod customer_registry;
mod gateway_call;
mod get_active_plan;
mod invoice_cache;
mod move_organization_data;
mod move_purchaser_data;
mod payment_history;
mod pricing_catalog;
mod reconcile_webhook;
mod request_refund;
mod settings;

// Shared services
pub use customer_registry::{CustomerHandle, CustomerRegistry};
pub use pricing_catalog::PricingCatalog;
pub use settings::{BillingSettings, DEFAULT_REFUND_WINDOW_DAYS, SUBSCRIPTION_SCAN_LIMIT};

// Commands
pub use cancel_subscription::{CancelSubscriptionCommand, CancelSubscriptionHandler};
pub use checkout::{CheckoutCommand, CheckoutHandler};
pub use invoice_cache::PruneInvoiceCacheHandler;
pub use move_organization_data::{
    MoveOrganizationDataCommand, MoveOrganizationDataHandler, MoveOrganizationDataResult,
};
pub use move_purchaser_data::{
    MovePurchaserDataCommand, MovePurchaserDataHandler, MovePurchaserDataResult,
};
pub use reconcile_webhook::{ReconcileWebhookCommand, ReconcileWebhookHandler};
pub use request_refund::{RequestRefundCommand, RequestRefundHandler};

// Queries
pub use get_active_plan::{ActivePlanView, GetActivePlanHandler, GetActivePlanQuery};
pub use payment_history::{GetPaymentHistoryHandler, GetPaymentHistoryQuery, PaymentHistoryItem};
