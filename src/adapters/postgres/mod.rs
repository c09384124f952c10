//! PostgreSQL adapters - Database implementations for repository ports.
//!
//! Every insert that guards an invariant uses `ON CONFLICT DO NOTHING` and
//! reports `SaveResult::AlreadyExists`; callers re-read the winning row.

mod customer_link_repository;
mod invoice_reference_repository;
mod ledger_repository;
mod organization_features;
mod plan_catalog_repository;
mod subscription_plan_repository;
mod webhook_event_repository;

pub use customer_link_repository::PostgresCustomerLinkRepository;
pub use invoice_reference_repository::PostgresInvoiceReferenceRepository;
pub use ledger_repository::PostgresLedgerRepository;
pub use organization_features::PostgresOrganizationFeatures;
pub use plan_catalog_repository::PostgresPlanCatalogRepository;
pub use subscription_plan_repository::PostgresSubscriptionPlanRepository;
pub use webhook_event_repository::PostgresWebhookEventRepository;

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use sqlx::migrate::{MigrateError, Migrator};
use sqlx::PgPool;

use crate::domain::foundation::{DomainError, ErrorCode, Timestamp};

pub static MIGRATOR: Lazy<Migrator> = Lazy::new(|| sqlx::migrate!("./migrations"));

/// Applies pending schema migrations.
pub async fn run_migrations(pool: &PgPool) -> Result<(), MigrateError> {
    MIGRATOR.run(pool).await
}

fn db_error(operation: &str, err: sqlx::Error) -> DomainError {
    DomainError::database(format!("Failed to {}: {}", operation, err))
}

fn invalid_column(column: &str, err: impl std::fmt::Display) -> DomainError {
    DomainError::new(
        ErrorCode::DatabaseError,
        format!("Invalid {} value: {}", column, err),
    )
}

fn optional_datetime(ts: Option<Timestamp>) -> Option<DateTime<Utc>> {
    ts.map(Timestamp::into_datetime)
}
