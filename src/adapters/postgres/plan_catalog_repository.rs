//! PostgreSQL implementation of PlanCatalogRepository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use super::{db_error, invalid_column};
use crate::domain::billing::{FeatureBitmap, PlanDefinition, PlanType};
use crate::domain::foundation::{CatalogRowId, DomainError, ErrorCode, Timestamp};
use crate::ports::PlanCatalogRepository;

pub struct PostgresPlanCatalogRepository {
    pool: PgPool,
}

impl PostgresPlanCatalogRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct PlanDefinitionRow {
    id: Uuid,
    plan_type: String,
    coupon_code: String,
    coupon_applied_message: String,
    hidden_plan_comment: String,
    monthly_price_cents: i64,
    annual_price_cents: i64,
    feature_bitmap: i32,
    redemptions: i64,
    created_at: DateTime<Utc>,
    expires_at: Option<DateTime<Utc>>,
    archived: bool,
}

impl TryFrom<PlanDefinitionRow> for PlanDefinition {
    type Error = DomainError;

    fn try_from(row: PlanDefinitionRow) -> Result<Self, Self::Error> {
        Ok(PlanDefinition {
            id: CatalogRowId::from_uuid(row.id),
            plan_type: row
                .plan_type
                .parse::<PlanType>()
                .map_err(|e| invalid_column("plan_type", e))?,
            coupon_code: row.coupon_code,
            coupon_applied_message: row.coupon_applied_message,
            hidden_plan_comment: row.hidden_plan_comment,
            monthly_price_cents: row.monthly_price_cents,
            annual_price_cents: row.annual_price_cents,
            features: FeatureBitmap::from_bits(row.feature_bitmap as u32),
            redemptions: row.redemptions,
            created_at: Timestamp::from_datetime(row.created_at),
            expires_at: row.expires_at.map(Timestamp::from_datetime),
            archived: row.archived,
        })
    }
}

const SELECT_COLUMNS: &str = r#"
    SELECT id, plan_type, coupon_code, coupon_applied_message, hidden_plan_comment,
           monthly_price_cents, annual_price_cents, feature_bitmap, redemptions,
           created_at, expires_at, archived
    FROM plan_definitions
"#;

#[async_trait]
impl PlanCatalogRepository for PostgresPlanCatalogRepository {
    async fn insert(&self, row: &PlanDefinition) -> Result<(), DomainError> {
        sqlx::query(
            r#"
            INSERT INTO plan_definitions (
                id, plan_type, coupon_code, coupon_applied_message, hidden_plan_comment,
                monthly_price_cents, annual_price_cents, feature_bitmap, redemptions,
                created_at, expires_at, archived
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(row.id.as_uuid())
        .bind(row.plan_type.as_str())
        .bind(&row.coupon_code)
        .bind(&row.coupon_applied_message)
        .bind(&row.hidden_plan_comment)
        .bind(row.monthly_price_cents)
        .bind(row.annual_price_cents)
        .bind(row.features.bits() as i32)
        .bind(row.redemptions)
        .bind(row.created_at.as_datetime())
        .bind(row.expires_at.as_ref().map(|t| *t.as_datetime()))
        .bind(row.archived)
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("insert plan definition", e))?;

        Ok(())
    }

    async fn find_by_id(&self, id: CatalogRowId) -> Result<Option<PlanDefinition>, DomainError> {
        let row: Option<PlanDefinitionRow> =
            sqlx::query_as(&format!("{} WHERE id = $1", SELECT_COLUMNS))
                .bind(id.as_uuid())
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| db_error("find plan definition", e))?;

        row.map(PlanDefinition::try_from).transpose()
    }

    async fn find_newest(
        &self,
        plan_type: PlanType,
        coupon_code: &str,
    ) -> Result<Option<PlanDefinition>, DomainError> {
        let row: Option<PlanDefinitionRow> = sqlx::query_as(&format!(
            "{} WHERE plan_type = $1 AND coupon_code = $2 AND NOT archived \
             ORDER BY created_at DESC LIMIT 1",
            SELECT_COLUMNS
        ))
        .bind(plan_type.as_str())
        .bind(coupon_code)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("find newest plan definition", e))?;

        row.map(PlanDefinition::try_from).transpose()
    }

    async fn increment_redemptions(&self, id: CatalogRowId) -> Result<(), DomainError> {
        sqlx::query("UPDATE plan_definitions SET redemptions = redemptions + 1 WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&self.pool)
            .await
            .map_err(|e| db_error("increment redemptions", e))?;
        Ok(())
    }

    async fn archive(&self, id: CatalogRowId) -> Result<(), DomainError> {
        let result = sqlx::query("UPDATE plan_definitions SET archived = TRUE WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&self.pool)
            .await
            .map_err(|e| db_error("archive plan definition", e))?;

        if result.rows_affected() == 0 {
            return Err(DomainError::new(
                ErrorCode::CatalogRowNotFound,
                "Plan definition not found",
            )
            .with_detail("catalog_row_id", id.to_string()));
        }
        Ok(())
    }
}
