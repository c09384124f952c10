//! GetPaymentHistoryHandler - Query handler for a purchaser's ledger.

use std::sync::Arc;

use serde::Serialize;

use crate::domain::billing::{BillingError, LedgerEntry};
use crate::domain::foundation::{PurchaserId, Timestamp};
use crate::ports::LedgerRepository;

/// Query for a purchaser's payment history.
#[derive(Debug, Clone)]
pub struct GetPaymentHistoryQuery {
    pub purchaser_id: String,
}

/// One ledger entry as shown to its purchaser.
#[derive(Debug, Clone, Serialize)]
pub struct PaymentHistoryItem {
    pub entry: LedgerEntry,
    /// Whether a refund may still be requested for this entry.
    pub refundable: bool,
}

pub struct GetPaymentHistoryHandler {
    ledger: Arc<dyn LedgerRepository>,
    refund_window_days: i64,
}

impl GetPaymentHistoryHandler {
    pub fn new(ledger: Arc<dyn LedgerRepository>, refund_window_days: i64) -> Self {
        Self {
            ledger,
            refund_window_days,
        }
    }

    /// Returns every entry of the purchaser, newest first.
    pub async fn handle(
        &self,
        query: GetPaymentHistoryQuery,
    ) -> Result<Vec<PaymentHistoryItem>, BillingError> {
        let purchaser_id = PurchaserId::new(query.purchaser_id)?;
        let now = Timestamp::now();

        let entries = self.ledger.list_for_purchaser(&purchaser_id).await?;
        Ok(entries
            .into_iter()
            .map(|entry| PaymentHistoryItem {
                refundable: entry.is_refundable_at(now, self.refund_window_days),
                entry,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::InMemoryLedgerRepository;
    use crate::domain::billing::{EntryParty, PaymentDetails, RecordKind};

    fn party() -> EntryParty {
        EntryParty {
            purchaser_id: PurchaserId::new("U1").unwrap(),
            external_customer_id: "cus_1".to_string(),
            organization_id: None,
            plan_type: None,
            coupon_code: None,
        }
    }

    fn payment(charge_id: &str, age_days: i64) -> LedgerEntry {
        LedgerEntry::payment_from_checkout(party(), charge_id, 1000, "usd", PaymentDetails::default())
            .with_created_at(Timestamp::now().minus_days(age_days))
    }

    #[tokio::test]
    async fn history_is_newest_first_with_refund_window() {
        let ledger = InMemoryLedgerRepository::new();
        ledger.append(&payment("ch_old", 45)).await.unwrap();
        ledger.append(&payment("ch_new", 2)).await.unwrap();
        ledger
            .append(&LedgerEntry::subscription_setup(
                party(),
                "sub_1",
                500,
                "usd",
                Timestamp::now().minus_days(10),
            ))
            .await
            .unwrap();
        let handler = GetPaymentHistoryHandler::new(Arc::new(ledger), 30);

        let history = handler
            .handle(GetPaymentHistoryQuery {
                purchaser_id: "U1".to_string(),
            })
            .await
            .unwrap();

        let charges: Vec<_> = history
            .iter()
            .map(|item| (item.entry.external_charge_id.as_deref(), item.refundable))
            .collect();
        assert_eq!(
            charges,
            vec![(Some("ch_new"), true), (None, false), (Some("ch_old"), false)]
        );
        assert_eq!(history[1].entry.record_kind, RecordKind::SubscriptionSetup);
    }

    #[tokio::test]
    async fn refunded_payment_is_not_refundable() {
        let ledger = InMemoryLedgerRepository::new();
        let mut entry = payment("ch_1", 1);
        ledger.append(&entry).await.unwrap();
        entry.apply_refund(1000, Timestamp::now());
        ledger.update(&entry).await.unwrap();
        let handler = GetPaymentHistoryHandler::new(Arc::new(ledger), 30);

        let history = handler
            .handle(GetPaymentHistoryQuery {
                purchaser_id: "U1".to_string(),
            })
            .await
            .unwrap();

        assert_eq!(history.len(), 1);
        assert!(!history[0].refundable);
    }

    #[tokio::test]
    async fn blank_purchaser_is_a_validation_error() {
        let handler = GetPaymentHistoryHandler::new(Arc::new(InMemoryLedgerRepository::new()), 30);

        let err = handler
            .handle(GetPaymentHistoryQuery {
                purchaser_id: String::new(),
            })
            .await
            .unwrap_err();

        assert!(matches!(err, BillingError::Validation { .. }));
    }
}
