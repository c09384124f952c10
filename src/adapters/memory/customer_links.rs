//! In-memory customer link store.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::billing::CustomerLink;
use crate::domain::foundation::{DomainError, PurchaserId};
use crate::ports::{CustomerLinkRepository, SaveResult};

/// Unique on both purchaser id and external customer id.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCustomerLinkRepository {
    links: Arc<RwLock<Vec<CustomerLink>>>,
}

impl InMemoryCustomerLinkRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.links.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.links.read().await.is_empty()
    }
}

#[async_trait]
impl CustomerLinkRepository for InMemoryCustomerLinkRepository {
    async fn find_by_purchaser(
        &self,
        purchaser_id: &PurchaserId,
    ) -> Result<Option<CustomerLink>, DomainError> {
        let links = self.links.read().await;
        Ok(links
            .iter()
            .find(|l| l.purchaser_id() == purchaser_id)
            .cloned())
    }

    async fn find_by_external_customer_id(
        &self,
        external_customer_id: &str,
    ) -> Result<Option<CustomerLink>, DomainError> {
        let links = self.links.read().await;
        Ok(links
            .iter()
            .find(|l| l.external_customer_id() == external_customer_id)
            .cloned())
    }

    async fn insert(&self, link: &CustomerLink) -> Result<SaveResult, DomainError> {
        let mut links = self.links.write().await;
        let conflict = links.iter().any(|l| {
            l.purchaser_id() == link.purchaser_id()
                || l.external_customer_id() == link.external_customer_id()
        });
        if conflict {
            return Ok(SaveResult::AlreadyExists);
        }
        links.push(link.clone());
        Ok(SaveResult::Inserted)
    }

    async fn reassign(&self, from: &PurchaserId, to: &PurchaserId) -> Result<bool, DomainError> {
        let mut links = self.links.write().await;
        if links.iter().any(|l| l.purchaser_id() == to) {
            return Ok(false);
        }
        let Some(position) = links.iter().position(|l| l.purchaser_id() == from) else {
            return Ok(false);
        };
        let old = links.remove(position);
        let moved = CustomerLink::reconstitute(
            to.clone(),
            old.external_customer_id(),
            old.created_at(),
        )?;
        links.push(moved);
        Ok(true)
    }
}
