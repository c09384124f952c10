//! PlanCatalogRepository port - append-only priced plan rows.

use async_trait::async_trait;

use crate::domain::billing::{PlanDefinition, PlanType};
use crate::domain::foundation::{CatalogRowId, DomainError};

/// Port for the pricing catalog.
///
/// Rows are never edited except for `redemptions` and `archived`.
#[async_trait]
pub trait PlanCatalogRepository: Send + Sync {
    async fn insert(&self, row: &PlanDefinition) -> Result<(), DomainError>;

    async fn find_by_id(&self, id: CatalogRowId) -> Result<Option<PlanDefinition>, DomainError>;

    /// Newest non-archived row for the pair, by `created_at` descending.
    ///
    /// Expiry is not filtered here; an expired newest row must hide older rows.
    async fn find_newest(
        &self,
        plan_type: PlanType,
        coupon_code: &str,
    ) -> Result<Option<PlanDefinition>, DomainError>;

    /// Atomically adds one to the row's redemption counter.
    async fn increment_redemptions(&self, id: CatalogRowId) -> Result<(), DomainError>;

    /// Hides the row from price resolution.
    ///
    /// # Errors
    ///
    /// Returns `CatalogRowNotFound` if no row has this id.
    async fn archive(&self, id: CatalogRowId) -> Result<(), DomainError>;
}
