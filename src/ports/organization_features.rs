//! OrganizationFeatures port - entitlement updates on the organization side.

use async_trait::async_trait;

use crate::domain::billing::FeatureTier;
use crate::domain::foundation::{DomainError, OrganizationId};

/// Port to the organization collaborator that owns feature entitlements.
#[async_trait]
pub trait OrganizationFeatures: Send + Sync {
    /// Sets the organization's feature tier. Setting the current tier again is a no-op.
    async fn set_feature_tier(
        &self,
        organization_id: &OrganizationId,
        tier: FeatureTier,
    ) -> Result<(), DomainError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn organization_features_is_object_safe() {
        fn _accepts_dyn(_features: &dyn OrganizationFeatures) {}
    }
}
