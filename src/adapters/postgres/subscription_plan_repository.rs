//! PostgreSQL implementation of SubscriptionPlanRepository.
//!
//! The partial unique index `subscription_plans_active_key` holds at most one
//! active row per (owner, plan key, organization flag).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use super::{db_error, invalid_column, optional_datetime};
use crate::domain::billing::{BillingInterval, PlanType, SubscriptionKey, SubscriptionPlan};
use crate::domain::foundation::{
    DomainError, ErrorCode, OrganizationId, PurchaserId, SubscriptionPlanId, Timestamp,
};
use crate::ports::{OrganizationPlanMove, SaveResult, SubscriptionPlanRepository};

pub struct PostgresSubscriptionPlanRepository {
    pool: PgPool,
}

impl PostgresSubscriptionPlanRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct SubscriptionPlanRow {
    id: Uuid,
    purchaser_id: String,
    organization_id: Option<String>,
    plan_type: Option<String>,
    coupon_code: String,
    gateway_plan_id: String,
    base_price_cents: i64,
    currency: String,
    billing_interval: String,
    external_subscription_id: Option<String>,
    is_active: bool,
    paid_without_gateway: bool,
    created_at: DateTime<Utc>,
    last_charged_at: Option<DateTime<Utc>>,
    canceled_at: Option<DateTime<Utc>>,
    ended_at: Option<DateTime<Utc>>,
}

impl TryFrom<SubscriptionPlanRow> for SubscriptionPlan {
    type Error = DomainError;

    fn try_from(row: SubscriptionPlanRow) -> Result<Self, Self::Error> {
        Ok(SubscriptionPlan {
            id: SubscriptionPlanId::from_uuid(row.id),
            purchaser_id: PurchaserId::new(row.purchaser_id)
                .map_err(|e| invalid_column("purchaser_id", e))?,
            organization_id: row
                .organization_id
                .map(OrganizationId::new)
                .transpose()
                .map_err(|e| invalid_column("organization_id", e))?,
            plan_type: row
                .plan_type
                .map(|p| p.parse::<PlanType>())
                .transpose()
                .map_err(|e| invalid_column("plan_type", e))?,
            coupon_code: row.coupon_code,
            gateway_plan_id: row.gateway_plan_id,
            base_price_cents: row.base_price_cents,
            currency: row.currency,
            billing_interval: row
                .billing_interval
                .parse::<BillingInterval>()
                .map_err(|e| invalid_column("billing_interval", e))?,
            external_subscription_id: row.external_subscription_id,
            is_active: row.is_active,
            paid_without_gateway: row.paid_without_gateway,
            created_at: Timestamp::from_datetime(row.created_at),
            last_charged_at: row.last_charged_at.map(Timestamp::from_datetime),
            canceled_at: row.canceled_at.map(Timestamp::from_datetime),
            ended_at: row.ended_at.map(Timestamp::from_datetime),
        })
    }
}

const SELECT_COLUMNS: &str = r#"
    SELECT id, purchaser_id, organization_id, plan_type, coupon_code, gateway_plan_id,
           base_price_cents, currency, billing_interval, external_subscription_id,
           is_active, paid_without_gateway, created_at, last_charged_at, canceled_at, ended_at
    FROM subscription_plans
"#;

impl PostgresSubscriptionPlanRepository {
    async fn fetch_one(
        &self,
        sql: String,
        bind: Vec<String>,
        bind_flag: Option<bool>,
    ) -> Result<Option<SubscriptionPlan>, DomainError> {
        let mut query = sqlx::query_as::<_, SubscriptionPlanRow>(&sql);
        for value in &bind {
            query = query.bind(value);
        }
        if let Some(flag) = bind_flag {
            query = query.bind(flag);
        }
        let row = query
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| db_error("find subscription plan", e))?;
        row.map(SubscriptionPlan::try_from).transpose()
    }
}

#[async_trait]
impl SubscriptionPlanRepository for PostgresSubscriptionPlanRepository {
    async fn insert(&self, plan: &SubscriptionPlan) -> Result<SaveResult, DomainError> {
        let key = plan.key();
        let result = sqlx::query(
            r#"
            INSERT INTO subscription_plans (
                id, purchaser_id, organization_id, plan_type, coupon_code, gateway_plan_id,
                base_price_cents, currency, billing_interval, external_subscription_id,
                is_active, paid_without_gateway, owner_key, plan_key, is_organization_plan,
                created_at, last_charged_at, canceled_at, ended_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(plan.id.as_uuid())
        .bind(plan.purchaser_id.as_str())
        .bind(plan.organization_id.as_ref().map(|o| o.as_str()))
        .bind(plan.plan_type.map(|p| p.as_str()))
        .bind(&plan.coupon_code)
        .bind(&plan.gateway_plan_id)
        .bind(plan.base_price_cents)
        .bind(&plan.currency)
        .bind(plan.billing_interval.as_str())
        .bind(&plan.external_subscription_id)
        .bind(plan.is_active)
        .bind(plan.paid_without_gateway)
        .bind(&key.owner)
        .bind(&key.plan_key)
        .bind(key.is_organization_plan)
        .bind(plan.created_at.as_datetime())
        .bind(optional_datetime(plan.last_charged_at))
        .bind(optional_datetime(plan.canceled_at))
        .bind(optional_datetime(plan.ended_at))
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("insert subscription plan", e))?;

        Ok(if result.rows_affected() == 0 {
            SaveResult::AlreadyExists
        } else {
            SaveResult::Inserted
        })
    }

    async fn find_by_id(
        &self,
        id: SubscriptionPlanId,
    ) -> Result<Option<SubscriptionPlan>, DomainError> {
        let row: Option<SubscriptionPlanRow> =
            sqlx::query_as(&format!("{} WHERE id = $1", SELECT_COLUMNS))
                .bind(id.as_uuid())
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| db_error("find subscription plan", e))?;

        row.map(SubscriptionPlan::try_from).transpose()
    }

    async fn find_active(
        &self,
        key: &SubscriptionKey,
    ) -> Result<Option<SubscriptionPlan>, DomainError> {
        self.fetch_one(
            format!(
                "{} WHERE owner_key = $1 AND plan_key = $2 AND is_organization_plan = $3 \
                 AND is_active LIMIT 1",
                SELECT_COLUMNS
            ),
            vec![key.owner.clone(), key.plan_key.clone()],
            Some(key.is_organization_plan),
        )
        .await
    }

    async fn find_latest(
        &self,
        key: &SubscriptionKey,
    ) -> Result<Option<SubscriptionPlan>, DomainError> {
        self.fetch_one(
            format!(
                "{} WHERE owner_key = $1 AND plan_key = $2 AND is_organization_plan = $3 \
                 ORDER BY created_at DESC LIMIT 1",
                SELECT_COLUMNS
            ),
            vec![key.owner.clone(), key.plan_key.clone()],
            Some(key.is_organization_plan),
        )
        .await
    }

    async fn find_by_external_subscription_id(
        &self,
        external_subscription_id: &str,
    ) -> Result<Option<SubscriptionPlan>, DomainError> {
        self.fetch_one(
            format!("{} WHERE external_subscription_id = $1", SELECT_COLUMNS),
            vec![external_subscription_id.to_string()],
            None,
        )
        .await
    }

    async fn update(&self, plan: &SubscriptionPlan) -> Result<(), DomainError> {
        let result = sqlx::query(
            r#"
            UPDATE subscription_plans SET
                external_subscription_id = COALESCE(external_subscription_id, $2),
                is_active = is_active AND $3,
                last_charged_at = $4,
                canceled_at = $5,
                ended_at = $6
            WHERE id = $1
            "#,
        )
        .bind(plan.id.as_uuid())
        .bind(&plan.external_subscription_id)
        .bind(plan.is_active)
        .bind(optional_datetime(plan.last_charged_at))
        .bind(optional_datetime(plan.canceled_at))
        .bind(optional_datetime(plan.ended_at))
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("update subscription plan", e))?;

        if result.rows_affected() == 0 {
            return Err(DomainError::new(
                ErrorCode::SubscriptionPlanNotFound,
                "Subscription plan not found",
            )
            .with_detail("subscription_plan_id", plan.id.to_string()));
        }
        Ok(())
    }

    async fn delete_pending(&self, id: SubscriptionPlanId) -> Result<bool, DomainError> {
        let result = sqlx::query(
            "DELETE FROM subscription_plans WHERE id = $1 AND external_subscription_id IS NULL",
        )
        .bind(id.as_uuid())
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("delete pending subscription plan", e))?;

        Ok(result.rows_affected() > 0)
    }

    async fn reassign_purchaser(
        &self,
        from: &PurchaserId,
        to: &PurchaserId,
    ) -> Result<u64, DomainError> {
        // Personal plans are keyed by purchaser, so their owner key moves too.
        let result = sqlx::query(
            r#"
            UPDATE subscription_plans SET
                purchaser_id = $2,
                owner_key = CASE WHEN is_organization_plan THEN owner_key ELSE $2 END
            WHERE purchaser_id = $1
            "#,
        )
        .bind(from.as_str())
        .bind(to.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("reassign subscription plans", e))?;

        Ok(result.rows_affected())
    }

    async fn reassign_organization(
        &self,
        from: &OrganizationId,
        to: &OrganizationId,
    ) -> Result<OrganizationPlanMove, DomainError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| db_error("begin organization move", e))?;

        // Organization plans are keyed by organization, so the owner key moves too.
        let moved = sqlx::query(
            r#"
            UPDATE subscription_plans AS p SET
                organization_id = $2,
                owner_key = CASE WHEN p.is_organization_plan THEN $2 ELSE p.owner_key END
            WHERE p.organization_id = $1
              AND NOT (p.is_active AND EXISTS (
                  SELECT 1 FROM subscription_plans t
                  WHERE t.organization_id = $2 AND t.is_active AND t.plan_key = p.plan_key
                    AND t.is_organization_plan = p.is_organization_plan
              ))
            "#,
        )
        .bind(from.as_str())
        .bind(to.as_str())
        .execute(&mut *tx)
        .await
        .map_err(|e| db_error("reassign subscription plans to organization", e))?
        .rows_affected();

        let kept_active: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM subscription_plans WHERE organization_id = $1 AND is_active",
        )
        .bind(from.as_str())
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| db_error("count plans left on organization", e))?;

        tx.commit()
            .await
            .map_err(|e| db_error("commit organization move", e))?;

        Ok(OrganizationPlanMove {
            moved,
            kept_active: u64::try_from(kept_active).unwrap_or_default(),
        })
    }
}
