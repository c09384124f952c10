//! PostgreSQL implementation of OrganizationFeatures.
//!
//! Writes the tier into `organization_feature_tiers`, which the
//! organization service reads for entitlement checks.

use async_trait::async_trait;
use sqlx::PgPool;

use super::db_error;
use crate::domain::billing::FeatureTier;
use crate::domain::foundation::{DomainError, OrganizationId};
use crate::ports::OrganizationFeatures;

pub struct PostgresOrganizationFeatures {
    pool: PgPool,
}

impl PostgresOrganizationFeatures {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OrganizationFeatures for PostgresOrganizationFeatures {
    async fn set_feature_tier(
        &self,
        organization_id: &OrganizationId,
        tier: FeatureTier,
    ) -> Result<(), DomainError> {
        sqlx::query(
            r#"
            INSERT INTO organization_feature_tiers (organization_id, feature_tier, updated_at)
            VALUES ($1, $2, NOW())
            ON CONFLICT (organization_id) DO UPDATE SET
                feature_tier = EXCLUDED.feature_tier,
                updated_at = EXCLUDED.updated_at
            WHERE organization_feature_tiers.feature_tier <> EXCLUDED.feature_tier
            "#,
        )
        .bind(organization_id.as_str())
        .bind(tier.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("set feature tier", e))?;

        Ok(())
    }
}
