//! PostgreSQL implementation of InvoiceReferenceRepository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use super::db_error;
use crate::domain::billing::InvoiceCrossReference;
use crate::domain::foundation::{DomainError, Timestamp};
use crate::ports::{InvoiceReferenceRepository, SaveResult};

pub struct PostgresInvoiceReferenceRepository {
    pool: PgPool,
}

impl PostgresInvoiceReferenceRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct InvoiceReferenceRow {
    invoice_id: String,
    subscription_id: String,
    customer_id: Option<String>,
    gateway_plan_id: Option<String>,
    created_at: DateTime<Utc>,
}

impl From<InvoiceReferenceRow> for InvoiceCrossReference {
    fn from(row: InvoiceReferenceRow) -> Self {
        InvoiceCrossReference::new(row.invoice_id, row.subscription_id)
            .with_customer(row.customer_id)
            .with_plan(row.gateway_plan_id)
            .with_created_at(Timestamp::from_datetime(row.created_at))
    }
}

#[async_trait]
impl InvoiceReferenceRepository for PostgresInvoiceReferenceRepository {
    async fn record(&self, reference: &InvoiceCrossReference) -> Result<SaveResult, DomainError> {
        let result = sqlx::query(
            r#"
            INSERT INTO invoice_cross_references (
                invoice_id, subscription_id, customer_id, gateway_plan_id, created_at
            ) VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (invoice_id) DO NOTHING
            "#,
        )
        .bind(&reference.invoice_id)
        .bind(&reference.subscription_id)
        .bind(&reference.customer_id)
        .bind(&reference.gateway_plan_id)
        .bind(reference.created_at.as_datetime())
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("record invoice reference", e))?;

        Ok(if result.rows_affected() == 0 {
            SaveResult::AlreadyExists
        } else {
            SaveResult::Inserted
        })
    }

    async fn find(&self, invoice_id: &str) -> Result<Option<InvoiceCrossReference>, DomainError> {
        let row: Option<InvoiceReferenceRow> = sqlx::query_as(
            r#"
            SELECT invoice_id, subscription_id, customer_id, gateway_plan_id, created_at
            FROM invoice_cross_references
            WHERE invoice_id = $1
            "#,
        )
        .bind(invoice_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("find invoice reference", e))?;

        Ok(row.map(InvoiceCrossReference::from))
    }

    async fn prune_before(&self, cutoff: Timestamp) -> Result<u64, DomainError> {
        let result = sqlx::query("DELETE FROM invoice_cross_references WHERE created_at < $1")
            .bind(cutoff.as_datetime())
            .execute(&self.pool)
            .await
            .map_err(|e| db_error("prune invoice references", e))?;

        Ok(result.rows_affected())
    }
}
