//! In-memory adapters.
//!
//! Every store enforces the same uniqueness rules as the Postgres schema,
//! so orchestration tests exercise the real conflict paths.

mod customer_links;
mod invoice_references;
mod ledger;
mod organization_features;
mod plan_catalog;
mod subscription_plans;
mod webhook_events;

pub use customer_links::InMemoryCustomerLinkRepository;
pub use invoice_references::InMemoryInvoiceReferenceRepository;
pub use ledger::InMemoryLedgerRepository;
pub use organization_features::RecordingOrganizationFeatures;
pub use plan_catalog::InMemoryPlanCatalogRepository;
pub use subscription_plans::InMemorySubscriptionPlanRepository;
pub use webhook_events::InMemoryWebhookEventRepository;
