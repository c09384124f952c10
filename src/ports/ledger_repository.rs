//! LedgerRepository port - the append-only money journal.

use async_trait::async_trait;

use super::SaveResult;
use crate::domain::billing::LedgerEntry;
use crate::domain::foundation::{DomainError, OrganizationId, PurchaserId};

/// Key used to find the setup entry a recurring charge belongs to.
///
/// An entry matches on either the purchaser or the gateway customer, so
/// setups moved onto another purchaser by a merge are still found through
/// the customer that keeps being billed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetupLookup {
    pub purchaser_id: PurchaserId,
    pub external_customer_id: String,
    /// `None` matches entries for any organization, or none.
    pub organization_id: Option<OrganizationId>,
    pub amount_cents: i64,
}

/// Port for ledger persistence.
///
/// Storage enforces a unique index on `external_charge_id` for PAYMENT_*
/// entries. Every "latest" lookup orders by `created_at` descending.
#[async_trait]
pub trait LedgerRepository: Send + Sync {
    /// Appends with `ON CONFLICT DO NOTHING` on the charge id.
    ///
    /// `AlreadyExists` means the charge was already journaled.
    async fn append(&self, entry: &LedgerEntry) -> Result<SaveResult, DomainError>;

    async fn find_payment_by_charge_id(
        &self,
        external_charge_id: &str,
    ) -> Result<Option<LedgerEntry>, DomainError>;

    /// Newest SUBSCRIPTION_SETUP entry for the subscription.
    async fn find_setup_by_subscription_id(
        &self,
        external_subscription_id: &str,
    ) -> Result<Option<LedgerEntry>, DomainError>;

    /// Newest SUBSCRIPTION_SETUP entry matching the lookup.
    async fn find_latest_setup(
        &self,
        lookup: &SetupLookup,
    ) -> Result<Option<LedgerEntry>, DomainError>;

    /// All entries for a subscription, oldest first.
    async fn list_by_subscription_id(
        &self,
        external_subscription_id: &str,
    ) -> Result<Vec<LedgerEntry>, DomainError>;

    /// All entries of a purchaser, newest first.
    async fn list_for_purchaser(
        &self,
        purchaser_id: &PurchaserId,
    ) -> Result<Vec<LedgerEntry>, DomainError>;

    /// Persists annotation fields (status, refunds, cancellation stamps, note).
    async fn update(&self, entry: &LedgerEntry) -> Result<(), DomainError>;

    async fn reassign_purchaser(
        &self,
        from: &PurchaserId,
        to: &PurchaserId,
    ) -> Result<u64, DomainError>;

    /// Points every entry of the `from` organization at `to`.
    async fn reassign_organization(
        &self,
        from: &OrganizationId,
        to: &OrganizationId,
    ) -> Result<u64, DomainError>;
}
