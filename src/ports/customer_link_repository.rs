//! CustomerLinkRepository port - purchaser to gateway customer mapping.

use async_trait::async_trait;

use super::SaveResult;
use crate::domain::billing::CustomerLink;
use crate::domain::foundation::{DomainError, PurchaserId};

/// Port for customer link persistence.
///
/// Both `purchaser_id` and `external_customer_id` are unique in storage.
/// Links are never updated.
#[async_trait]
pub trait CustomerLinkRepository: Send + Sync {
    async fn find_by_purchaser(
        &self,
        purchaser_id: &PurchaserId,
    ) -> Result<Option<CustomerLink>, DomainError>;

    async fn find_by_external_customer_id(
        &self,
        external_customer_id: &str,
    ) -> Result<Option<CustomerLink>, DomainError>;

    /// Inserts the link with `ON CONFLICT DO NOTHING` semantics.
    ///
    /// `AlreadyExists` means another request linked this purchaser first;
    /// callers re-read to get the winning link.
    async fn insert(&self, link: &CustomerLink) -> Result<SaveResult, DomainError>;

    /// Moves a link to another purchaser, only if the target has none.
    ///
    /// Returns `true` if the link moved.
    async fn reassign(&self, from: &PurchaserId, to: &PurchaserId) -> Result<bool, DomainError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn customer_link_repository_is_object_safe() {
        fn _accepts_dyn(_repo: &dyn CustomerLinkRepository) {}
    }
}
