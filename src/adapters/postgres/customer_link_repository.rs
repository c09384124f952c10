//! PostgreSQL implementation of CustomerLinkRepository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use super::{db_error, invalid_column};
use crate::domain::billing::CustomerLink;
use crate::domain::foundation::{DomainError, PurchaserId, Timestamp};
use crate::ports::{CustomerLinkRepository, SaveResult};

pub struct PostgresCustomerLinkRepository {
    pool: PgPool,
}

impl PostgresCustomerLinkRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct CustomerLinkRow {
    purchaser_id: String,
    external_customer_id: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<CustomerLinkRow> for CustomerLink {
    type Error = DomainError;

    fn try_from(row: CustomerLinkRow) -> Result<Self, Self::Error> {
        let purchaser_id = PurchaserId::new(row.purchaser_id)
            .map_err(|e| invalid_column("purchaser_id", e))?;
        CustomerLink::reconstitute(
            purchaser_id,
            row.external_customer_id,
            Timestamp::from_datetime(row.created_at),
        )
        .map_err(|e| invalid_column("external_customer_id", e))
    }
}

#[async_trait]
impl CustomerLinkRepository for PostgresCustomerLinkRepository {
    async fn find_by_purchaser(
        &self,
        purchaser_id: &PurchaserId,
    ) -> Result<Option<CustomerLink>, DomainError> {
        let row: Option<CustomerLinkRow> = sqlx::query_as(
            r#"
            SELECT purchaser_id, external_customer_id, created_at
            FROM customer_links
            WHERE purchaser_id = $1
            "#,
        )
        .bind(purchaser_id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("find customer link", e))?;

        row.map(CustomerLink::try_from).transpose()
    }

    async fn find_by_external_customer_id(
        &self,
        external_customer_id: &str,
    ) -> Result<Option<CustomerLink>, DomainError> {
        let row: Option<CustomerLinkRow> = sqlx::query_as(
            r#"
            SELECT purchaser_id, external_customer_id, created_at
            FROM customer_links
            WHERE external_customer_id = $1
            "#,
        )
        .bind(external_customer_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("find customer link by customer id", e))?;

        row.map(CustomerLink::try_from).transpose()
    }

    async fn insert(&self, link: &CustomerLink) -> Result<SaveResult, DomainError> {
        let result = sqlx::query(
            r#"
            INSERT INTO customer_links (purchaser_id, external_customer_id, created_at)
            VALUES ($1, $2, $3)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(link.purchaser_id().as_str())
        .bind(link.external_customer_id())
        .bind(link.created_at().as_datetime())
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("insert customer link", e))?;

        Ok(if result.rows_affected() == 0 {
            SaveResult::AlreadyExists
        } else {
            SaveResult::Inserted
        })
    }

    async fn reassign(&self, from: &PurchaserId, to: &PurchaserId) -> Result<bool, DomainError> {
        let result = sqlx::query(
            r#"
            UPDATE customer_links SET purchaser_id = $2
            WHERE purchaser_id = $1
              AND NOT EXISTS (SELECT 1 FROM customer_links WHERE purchaser_id = $2)
            "#,
        )
        .bind(from.as_str())
        .bind(to.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("reassign customer link", e))?;

        Ok(result.rows_affected() > 0)
    }
}
