//! SubscriptionPlanRepository port - recurring commitments.

use async_trait::async_trait;

use super::SaveResult;
use crate::domain::billing::{SubscriptionKey, SubscriptionPlan};
use crate::domain::foundation::{DomainError, OrganizationId, PurchaserId, SubscriptionPlanId};

/// Port for subscription plan persistence.
///
/// Storage enforces a unique index on the active key, so two concurrent
/// checkouts can never both hold an active plan for the same key.
#[async_trait]
pub trait SubscriptionPlanRepository: Send + Sync {
    /// Inserts the plan with `ON CONFLICT DO NOTHING` on the active key.
    async fn insert(&self, plan: &SubscriptionPlan) -> Result<SaveResult, DomainError>;

    async fn find_by_id(
        &self,
        id: SubscriptionPlanId,
    ) -> Result<Option<SubscriptionPlan>, DomainError>;

    async fn find_active(
        &self,
        key: &SubscriptionKey,
    ) -> Result<Option<SubscriptionPlan>, DomainError>;

    /// Newest plan for the key in any state.
    async fn find_latest(
        &self,
        key: &SubscriptionKey,
    ) -> Result<Option<SubscriptionPlan>, DomainError>;

    async fn find_by_external_subscription_id(
        &self,
        external_subscription_id: &str,
    ) -> Result<Option<SubscriptionPlan>, DomainError>;

    /// Persists mutable fields.
    ///
    /// Storage never clears an attached subscription id and never flips an
    /// inactive row back to active, whatever the caller passes.
    async fn update(&self, plan: &SubscriptionPlan) -> Result<(), DomainError>;

    /// Removes a plan that never got a gateway subscription.
    ///
    /// Returns `false` if the row is gone or already linked.
    async fn delete_pending(&self, id: SubscriptionPlanId) -> Result<bool, DomainError>;

    async fn reassign_purchaser(
        &self,
        from: &PurchaserId,
        to: &PurchaserId,
    ) -> Result<u64, DomainError>;

    /// Moves the `from` organization's plans, and their organization key, to `to`.
    ///
    /// An active plan stays where it is when `to` already has an active plan
    /// of the same type.
    async fn reassign_organization(
        &self,
        from: &OrganizationId,
        to: &OrganizationId,
    ) -> Result<OrganizationPlanMove, DomainError>;
}

/// Outcome of moving plans between organizations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OrganizationPlanMove {
    pub moved: u64,
    /// Active plans left behind because the target already holds that plan type.
    pub kept_active: u64,
}
