//! In-memory pricing catalog.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::billing::{PlanDefinition, PlanType};
use crate::domain::foundation::{CatalogRowId, DomainError, ErrorCode};
use crate::ports::PlanCatalogRepository;

#[derive(Debug, Clone, Default)]
pub struct InMemoryPlanCatalogRepository {
    rows: Arc<RwLock<Vec<PlanDefinition>>>,
}

impl InMemoryPlanCatalogRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

fn row_not_found(id: CatalogRowId) -> DomainError {
    DomainError::new(ErrorCode::CatalogRowNotFound, "Plan definition not found")
        .with_detail("catalog_row_id", id.to_string())
}

#[async_trait]
impl PlanCatalogRepository for InMemoryPlanCatalogRepository {
    async fn insert(&self, row: &PlanDefinition) -> Result<(), DomainError> {
        let mut rows = self.rows.write().await;
        if rows.iter().any(|r| r.id == row.id) {
            return Err(DomainError::new(
                ErrorCode::DuplicateRecord,
                "Plan definition already exists",
            ));
        }
        rows.push(row.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: CatalogRowId) -> Result<Option<PlanDefinition>, DomainError> {
        Ok(self.rows.read().await.iter().find(|r| r.id == id).cloned())
    }

    async fn find_newest(
        &self,
        plan_type: PlanType,
        coupon_code: &str,
    ) -> Result<Option<PlanDefinition>, DomainError> {
        let rows = self.rows.read().await;
        // max_by_key keeps the last maximum, so ties go to the later insert
        Ok(rows
            .iter()
            .filter(|r| r.plan_type == plan_type && r.coupon_code == coupon_code && !r.archived)
            .max_by_key(|r| r.created_at)
            .cloned())
    }

    async fn increment_redemptions(&self, id: CatalogRowId) -> Result<(), DomainError> {
        let mut rows = self.rows.write().await;
        let row = rows
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| row_not_found(id))?;
        row.redemptions += 1;
        Ok(())
    }

    async fn archive(&self, id: CatalogRowId) -> Result<(), DomainError> {
        let mut rows = self.rows.write().await;
        let row = rows
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| row_not_found(id))?;
        row.archived = true;
        Ok(())
    }
}
