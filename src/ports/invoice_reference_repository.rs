//! InvoiceReferenceRepository port - ephemeral invoice cross-references.

use async_trait::async_trait;

use super::SaveResult;
use crate::domain::billing::InvoiceCrossReference;
use crate::domain::foundation::{DomainError, Timestamp};

#[async_trait]
pub trait InvoiceReferenceRepository: Send + Sync {
    /// Records the reference; a repeated invoice id is left untouched.
    async fn record(&self, reference: &InvoiceCrossReference) -> Result<SaveResult, DomainError>;

    async fn find(&self, invoice_id: &str) -> Result<Option<InvoiceCrossReference>, DomainError>;

    /// Deletes references created before the cutoff, returning how many.
    async fn prune_before(&self, cutoff: Timestamp) -> Result<u64, DomainError>;
}
