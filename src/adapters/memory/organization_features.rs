//! Organization feature tier recorder.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::billing::FeatureTier;
use crate::domain::foundation::{DomainError, ErrorCode, OrganizationId};
use crate::ports::OrganizationFeatures;

/// Keeps the last tier set per organization; can be told to fail.
#[derive(Debug, Clone, Default)]
pub struct RecordingOrganizationFeatures {
    tiers: Arc<RwLock<HashMap<OrganizationId, FeatureTier>>>,
    fail: Arc<AtomicBool>,
}

impl RecordingOrganizationFeatures {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.fail.store(failing, Ordering::SeqCst);
    }

    pub async fn tier_of(&self, organization_id: &OrganizationId) -> Option<FeatureTier> {
        self.tiers.read().await.get(organization_id).copied()
    }
}

#[async_trait]
impl OrganizationFeatures for RecordingOrganizationFeatures {
    async fn set_feature_tier(
        &self,
        organization_id: &OrganizationId,
        tier: FeatureTier,
    ) -> Result<(), DomainError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(DomainError::new(
                ErrorCode::InternalError,
                "Organization service unavailable",
            ));
        }
        self.tiers
            .write()
            .await
            .insert(organization_id.clone(), tier);
        Ok(())
    }
}
