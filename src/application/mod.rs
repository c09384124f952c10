//! Application layer - Commands, Queries, and Handlers.
//!
//! This layer orchestrates domain operations and coordinates between ports.
//! Command handlers fold failures into structured results; query handlers
//! return `BillingError` directly.

pub mod handlers;
mod ledger;

pub use ledger::{BillingLedger, BillingPorts};

pub use handlers::{
    // Shared services
    BillingSettings, CustomerHandle, CustomerRegistry, PricingCatalog,
    // Commands
    CancelSubscriptionCommand, CancelSubscriptionHandler,
    CheckoutCommand, CheckoutHandler,
    MoveOrganizationDataCommand, MoveOrganizationDataHandler, MoveOrganizationDataResult,
    MovePurchaserDataCommand, MovePurchaserDataHandler, MovePurchaserDataResult,
    PruneInvoiceCacheHandler,
    ReconcileWebhookCommand, ReconcileWebhookHandler,
    RequestRefundCommand, RequestRefundHandler,
    // Queries
    ActivePlanView, GetActivePlanHandler, GetActivePlanQuery,
    GetPaymentHistoryHandler, GetPaymentHistoryQuery, PaymentHistoryItem,
};
