//! In-memory invoice cross-reference cache.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::billing::InvoiceCrossReference;
use crate::domain::foundation::{DomainError, Timestamp};
use crate::ports::{InvoiceReferenceRepository, SaveResult};

#[derive(Debug, Clone, Default)]
pub struct InMemoryInvoiceReferenceRepository {
    references: Arc<RwLock<HashMap<String, InvoiceCrossReference>>>,
}

impl InMemoryInvoiceReferenceRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.references.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.references.read().await.is_empty()
    }
}

#[async_trait]
impl InvoiceReferenceRepository for InMemoryInvoiceReferenceRepository {
    async fn record(&self, reference: &InvoiceCrossReference) -> Result<SaveResult, DomainError> {
        let mut references = self.references.write().await;
        if references.contains_key(&reference.invoice_id) {
            return Ok(SaveResult::AlreadyExists);
        }
        references.insert(reference.invoice_id.clone(), reference.clone());
        Ok(SaveResult::Inserted)
    }

    async fn find(&self, invoice_id: &str) -> Result<Option<InvoiceCrossReference>, DomainError> {
        Ok(self.references.read().await.get(invoice_id).cloned())
    }

    async fn prune_before(&self, cutoff: Timestamp) -> Result<u64, DomainError> {
        let mut references = self.references.write().await;
        let before = references.len();
        references.retain(|_, r| !r.created_at.is_before(&cutoff));
        Ok((before - references.len()) as u64)
    }
}
