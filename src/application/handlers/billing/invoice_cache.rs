//! PruneInvoiceCacheHandler - Drops expired invoice cross-references.

use std::sync::Arc;

use crate::domain::billing::retention_cutoff;
use crate::domain::foundation::{DomainError, Timestamp};
use crate::ports::InvoiceReferenceRepository;

/// Removes cross-references older than the retention window.
///
/// The reconciler prunes on every invoice write; the binary also runs this
/// once at startup so a quiet period does not leave stale rows behind.
pub struct PruneInvoiceCacheHandler {
    invoices: Arc<dyn InvoiceReferenceRepository>,
    retention_days: i64,
}

impl PruneInvoiceCacheHandler {
    pub fn new(invoices: Arc<dyn InvoiceReferenceRepository>, retention_days: i64) -> Self {
        Self {
            invoices,
            retention_days,
        }
    }

    pub async fn handle(&self) -> Result<u64, DomainError> {
        self.handle_at(Timestamp::now()).await
    }

    pub async fn handle_at(&self, now: Timestamp) -> Result<u64, DomainError> {
        let cutoff = retention_cutoff(now, self.retention_days);
        let pruned = self.invoices.prune_before(cutoff).await?;
        tracing::info!(pruned, retention_days = self.retention_days, "Invoice cache pruned");
        Ok(pruned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::InMemoryInvoiceReferenceRepository;
    use crate::domain::billing::InvoiceCrossReference;

    #[tokio::test]
    async fn prunes_only_rows_past_retention() {
        let invoices = InMemoryInvoiceReferenceRepository::new();
        let now = Timestamp::now();
        invoices
            .record(&InvoiceCrossReference::new("in_old", "sub_1").with_created_at(now.minus_days(11)))
            .await
            .unwrap();
        invoices
            .record(&InvoiceCrossReference::new("in_recent", "sub_1").with_created_at(now.minus_days(9)))
            .await
            .unwrap();
        let handler = PruneInvoiceCacheHandler::new(Arc::new(invoices.clone()), 10);

        let pruned = handler.handle_at(now).await.unwrap();

        assert_eq!(pruned, 1);
        assert_eq!(invoices.len().await, 1);
        assert!(invoices.find("in_recent").await.unwrap().is_some());
    }
}
