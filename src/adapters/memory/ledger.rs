//! In-memory ledger.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::billing::{LedgerEntry, RecordKind};
use crate::domain::foundation::{DomainError, ErrorCode, OrganizationId, PurchaserId};
use crate::ports::{LedgerRepository, SaveResult, SetupLookup};

/// Append order is kept; "newest" means greatest `created_at`, later append on ties.
#[derive(Debug, Clone, Default)]
pub struct InMemoryLedgerRepository {
    entries: Arc<RwLock<Vec<LedgerEntry>>>,
}

impl InMemoryLedgerRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn all(&self) -> Vec<LedgerEntry> {
        self.entries.read().await.clone()
    }

    pub async fn count_by_charge_id(&self, external_charge_id: &str) -> usize {
        self.entries
            .read()
            .await
            .iter()
            .filter(|e| e.external_charge_id.as_deref() == Some(external_charge_id))
            .count()
    }
}

#[async_trait]
impl LedgerRepository for InMemoryLedgerRepository {
    async fn append(&self, entry: &LedgerEntry) -> Result<SaveResult, DomainError> {
        let mut entries = self.entries.write().await;
        let conflict = entries.iter().any(|e| {
            e.id == entry.id
                || (entry.is_payment()
                    && e.is_payment()
                    && entry.external_charge_id.is_some()
                    && e.external_charge_id == entry.external_charge_id)
        });
        if conflict {
            return Ok(SaveResult::AlreadyExists);
        }
        entries.push(entry.clone());
        Ok(SaveResult::Inserted)
    }

    async fn find_payment_by_charge_id(
        &self,
        external_charge_id: &str,
    ) -> Result<Option<LedgerEntry>, DomainError> {
        Ok(self
            .entries
            .read()
            .await
            .iter()
            .find(|e| e.is_payment() && e.external_charge_id.as_deref() == Some(external_charge_id))
            .cloned())
    }

    async fn find_setup_by_subscription_id(
        &self,
        external_subscription_id: &str,
    ) -> Result<Option<LedgerEntry>, DomainError> {
        Ok(self
            .entries
            .read()
            .await
            .iter()
            .filter(|e| {
                e.record_kind == RecordKind::SubscriptionSetup
                    && e.external_subscription_id.as_deref() == Some(external_subscription_id)
            })
            .max_by_key(|e| e.created_at)
            .cloned())
    }

    async fn find_latest_setup(
        &self,
        lookup: &SetupLookup,
    ) -> Result<Option<LedgerEntry>, DomainError> {
        Ok(self
            .entries
            .read()
            .await
            .iter()
            .filter(|e| {
                e.record_kind == RecordKind::SubscriptionSetup
                    && (e.purchaser_id == lookup.purchaser_id
                        || e.external_customer_id == lookup.external_customer_id)
                    && e.amount_cents == lookup.amount_cents
                    && lookup
                        .organization_id
                        .as_ref()
                        .map_or(true, |org| e.organization_id.as_ref() == Some(org))
            })
            .max_by_key(|e| e.created_at)
            .cloned())
    }

    async fn list_by_subscription_id(
        &self,
        external_subscription_id: &str,
    ) -> Result<Vec<LedgerEntry>, DomainError> {
        let mut found: Vec<_> = self
            .entries
            .read()
            .await
            .iter()
            .filter(|e| e.external_subscription_id.as_deref() == Some(external_subscription_id))
            .cloned()
            .collect();
        found.sort_by_key(|e| e.created_at);
        Ok(found)
    }

    async fn list_for_purchaser(
        &self,
        purchaser_id: &PurchaserId,
    ) -> Result<Vec<LedgerEntry>, DomainError> {
        let mut found: Vec<_> = self
            .entries
            .read()
            .await
            .iter()
            .filter(|e| &e.purchaser_id == purchaser_id)
            .cloned()
            .collect();
        found.reverse();
        found.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(found)
    }

    async fn update(&self, entry: &LedgerEntry) -> Result<(), DomainError> {
        let mut entries = self.entries.write().await;
        let stored = entries.iter_mut().find(|e| e.id == entry.id).ok_or_else(|| {
            DomainError::new(ErrorCode::LedgerEntryNotFound, "Ledger entry not found")
                .with_detail("ledger_entry_id", entry.id.to_string())
        })?;
        stored.status = entry.status;
        stored.refunded_amount_cents = entry.refunded_amount_cents;
        stored.refund_requested_at = entry.refund_requested_at;
        stored.canceled_at = entry.canceled_at;
        stored.ended_at = entry.ended_at;
        stored.note = entry.note.clone();
        Ok(())
    }

    async fn reassign_purchaser(
        &self,
        from: &PurchaserId,
        to: &PurchaserId,
    ) -> Result<u64, DomainError> {
        let mut entries = self.entries.write().await;
        let mut moved = 0;
        for entry in entries.iter_mut().filter(|e| &e.purchaser_id == from) {
            entry.purchaser_id = to.clone();
            moved += 1;
        }
        Ok(moved)
    }

    async fn reassign_organization(
        &self,
        from: &OrganizationId,
        to: &OrganizationId,
    ) -> Result<u64, DomainError> {
        let mut entries = self.entries.write().await;
        let mut moved = 0;
        for entry in entries
            .iter_mut()
            .filter(|e| e.organization_id.as_ref() == Some(from))
        {
            entry.organization_id = Some(to.clone());
            moved += 1;
        }
        Ok(moved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::billing::{EntryParty, PaymentDetails};
    use crate::domain::foundation::Timestamp;

    fn party() -> EntryParty {
        EntryParty {
            purchaser_id: PurchaserId::new("U1").unwrap(),
            external_customer_id: "cus_1".to_string(),
            organization_id: None,
            plan_type: None,
            coupon_code: None,
        }
    }

    #[tokio::test]
    async fn second_payment_for_charge_is_rejected() {
        let repo = InMemoryLedgerRepository::new();
        let first =
            LedgerEntry::payment_from_checkout(party(), "ch_1", 2000, "usd", PaymentDetails::default());
        let second =
            LedgerEntry::payment_from_checkout(party(), "ch_1", 2000, "usd", PaymentDetails::default());

        assert_eq!(repo.append(&first).await.unwrap(), SaveResult::Inserted);
        assert_eq!(repo.append(&second).await.unwrap(), SaveResult::AlreadyExists);
        assert_eq!(repo.count_by_charge_id("ch_1").await, 1);
    }

    #[tokio::test]
    async fn latest_setup_prefers_newest() {
        let repo = InMemoryLedgerRepository::new();
        let now = Timestamp::now();
        let older = LedgerEntry::subscription_setup(party(), "sub_1", 500, "usd", now.minus_days(40));
        let newer = LedgerEntry::subscription_setup(party(), "sub_2", 500, "usd", now);
        repo.append(&newer).await.unwrap();
        repo.append(&older).await.unwrap();

        let found = repo
            .find_latest_setup(&SetupLookup {
                purchaser_id: PurchaserId::new("U1").unwrap(),
                external_customer_id: "cus_1".to_string(),
                organization_id: None,
                amount_cents: 500,
            })
            .await
            .unwrap()
            .unwrap();

        assert_eq!(found.external_subscription_id.as_deref(), Some("sub_2"));
    }

    #[tokio::test]
    async fn latest_setup_follows_the_customer_after_a_merge() {
        let repo = InMemoryLedgerRepository::new();
        repo.append(&LedgerEntry::subscription_setup(party(), "sub_1", 500, "usd", Timestamp::now()))
            .await
            .unwrap();
        repo.reassign_purchaser(&PurchaserId::new("U1").unwrap(), &PurchaserId::new("U2").unwrap())
            .await
            .unwrap();

        let found = repo
            .find_latest_setup(&SetupLookup {
                purchaser_id: PurchaserId::new("U1").unwrap(),
                external_customer_id: "cus_1".to_string(),
                organization_id: None,
                amount_cents: 500,
            })
            .await
            .unwrap()
            .unwrap();

        assert_eq!(found.purchaser_id.as_str(), "U2");
        assert_eq!(found.external_subscription_id.as_deref(), Some("sub_1"));
    }

    #[tokio::test]
    async fn purchaser_listing_is_newest_first() {
        let repo = InMemoryLedgerRepository::new();
        let now = Timestamp::now();
        let old = LedgerEntry::payment_from_checkout(party(), "ch_1", 100, "usd", PaymentDetails::default())
            .with_created_at(now.minus_days(3));
        let new = LedgerEntry::payment_from_checkout(party(), "ch_2", 200, "usd", PaymentDetails::default())
            .with_created_at(now);
        repo.append(&old).await.unwrap();
        repo.append(&new).await.unwrap();

        let listed = repo
            .list_for_purchaser(&PurchaserId::new("U1").unwrap())
            .await
            .unwrap();

        let charges: Vec<_> = listed.iter().filter_map(|e| e.external_charge_id.as_deref()).collect();
        assert_eq!(charges, vec!["ch_2", "ch_1"]);
    }
}
