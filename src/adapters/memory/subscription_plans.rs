//! In-memory subscription plan store.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::billing::{SubscriptionKey, SubscriptionPlan};
use crate::domain::foundation::{
    DomainError, ErrorCode, OrganizationId, PurchaserId, SubscriptionPlanId,
};
use crate::ports::{OrganizationPlanMove, SaveResult, SubscriptionPlanRepository};

/// At most one active plan per key, checked under the write lock.
#[derive(Debug, Clone, Default)]
pub struct InMemorySubscriptionPlanRepository {
    plans: Arc<RwLock<Vec<SubscriptionPlan>>>,
}

impl InMemorySubscriptionPlanRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn all(&self) -> Vec<SubscriptionPlan> {
        self.plans.read().await.clone()
    }

    pub async fn active_count(&self, key: &SubscriptionKey) -> usize {
        self.plans
            .read()
            .await
            .iter()
            .filter(|p| p.is_active && &p.key() == key)
            .count()
    }
}

#[async_trait]
impl SubscriptionPlanRepository for InMemorySubscriptionPlanRepository {
    async fn insert(&self, plan: &SubscriptionPlan) -> Result<SaveResult, DomainError> {
        let mut plans = self.plans.write().await;
        let key = plan.key();
        let conflict = plans
            .iter()
            .any(|p| p.id == plan.id || (plan.is_active && p.is_active && p.key() == key));
        if conflict {
            return Ok(SaveResult::AlreadyExists);
        }
        plans.push(plan.clone());
        Ok(SaveResult::Inserted)
    }

    async fn find_by_id(
        &self,
        id: SubscriptionPlanId,
    ) -> Result<Option<SubscriptionPlan>, DomainError> {
        Ok(self.plans.read().await.iter().find(|p| p.id == id).cloned())
    }

    async fn find_active(
        &self,
        key: &SubscriptionKey,
    ) -> Result<Option<SubscriptionPlan>, DomainError> {
        Ok(self
            .plans
            .read()
            .await
            .iter()
            .find(|p| p.is_active && &p.key() == key)
            .cloned())
    }

    async fn find_latest(
        &self,
        key: &SubscriptionKey,
    ) -> Result<Option<SubscriptionPlan>, DomainError> {
        Ok(self
            .plans
            .read()
            .await
            .iter()
            .filter(|p| &p.key() == key)
            .max_by_key(|p| p.created_at)
            .cloned())
    }

    async fn find_by_external_subscription_id(
        &self,
        external_subscription_id: &str,
    ) -> Result<Option<SubscriptionPlan>, DomainError> {
        Ok(self
            .plans
            .read()
            .await
            .iter()
            .find(|p| p.external_subscription_id.as_deref() == Some(external_subscription_id))
            .cloned())
    }

    async fn update(&self, plan: &SubscriptionPlan) -> Result<(), DomainError> {
        let mut plans = self.plans.write().await;
        let stored = plans.iter_mut().find(|p| p.id == plan.id).ok_or_else(|| {
            DomainError::new(
                ErrorCode::SubscriptionPlanNotFound,
                "Subscription plan not found",
            )
            .with_detail("subscription_plan_id", plan.id.to_string())
        })?;

        let mut merged = plan.clone();
        if stored.external_subscription_id.is_some() {
            merged.external_subscription_id = stored.external_subscription_id.clone();
        }
        if !stored.is_active {
            merged.is_active = false;
        }
        *stored = merged;
        Ok(())
    }

    async fn delete_pending(&self, id: SubscriptionPlanId) -> Result<bool, DomainError> {
        let mut plans = self.plans.write().await;
        let before = plans.len();
        plans.retain(|p| !(p.id == id && p.external_subscription_id.is_none()));
        Ok(plans.len() < before)
    }

    async fn reassign_purchaser(
        &self,
        from: &PurchaserId,
        to: &PurchaserId,
    ) -> Result<u64, DomainError> {
        let mut plans = self.plans.write().await;
        let mut moved = 0;
        for plan in plans.iter_mut().filter(|p| &p.purchaser_id == from) {
            plan.purchaser_id = to.clone();
            moved += 1;
        }
        Ok(moved)
    }

    async fn reassign_organization(
        &self,
        from: &OrganizationId,
        to: &OrganizationId,
    ) -> Result<OrganizationPlanMove, DomainError> {
        let mut plans = self.plans.write().await;
        let taken: Vec<_> = plans
            .iter()
            .filter(|p| p.is_active && p.organization_id.as_ref() == Some(to))
            .filter_map(|p| p.plan_type)
            .collect();

        let mut outcome = OrganizationPlanMove::default();
        for plan in plans
            .iter_mut()
            .filter(|p| p.organization_id.as_ref() == Some(from))
        {
            if plan.is_active && plan.plan_type.map_or(false, |t| taken.contains(&t)) {
                outcome.kept_active += 1;
                continue;
            }
            plan.organization_id = Some(to.clone());
            outcome.moved += 1;
        }
        Ok(outcome)
    }
}
