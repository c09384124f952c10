//! Ports - Interfaces for external dependencies.
//!
//! Following hexagonal architecture, ports define the contracts between
//! the domain and the outside world. Adapters implement these ports.
//!
//! ## Gateway Ports
//!
//! - `PaymentGateway` - Customers, charges, subscriptions, refunds
//! - `OrganizationFeatures` - Feature tier entitlement updates
//!
//! ## Storage Ports
//!
//! - `CustomerLinkRepository` - Purchaser to gateway customer links
//! - `PlanCatalogRepository` - Append-only pricing catalog
//! - `SubscriptionPlanRepository` - Recurring commitments
//! - `LedgerRepository` - Money journal
//! - `InvoiceReferenceRepository` - Invoice to subscription cache
//! - `WebhookEventRepository` - Handled webhook audit log

mod customer_link_repository;
mod invoice_reference_repository;
mod ledger_repository;
mod organization_features;
mod payment_gateway;
mod plan_catalog_repository;
mod subscription_plan_repository;
mod webhook_event_repository;

pub use customer_link_repository::CustomerLinkRepository;
pub use invoice_reference_repository::InvoiceReferenceRepository;
pub use ledger_repository::{LedgerRepository, SetupLookup};
pub use organization_features::OrganizationFeatures;
pub use payment_gateway::{
    Charge, CreateChargeRequest, CreateCustomerRequest, CreateSubscriptionRequest, Customer,
    PaymentError, PaymentErrorCode, PaymentGateway, Refund, Subscription, SubscriptionStatus,
    UpcomingInvoice,
};
pub use plan_catalog_repository::PlanCatalogRepository;
pub use subscription_plan_repository::{OrganizationPlanMove, SubscriptionPlanRepository};
pub use webhook_event_repository::{
    SaveResult, WebhookEventRecord, WebhookEventRepository, WebhookResult,
};
