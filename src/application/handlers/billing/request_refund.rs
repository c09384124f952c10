//! RequestRefundHandler - Purchaser-initiated refund of a recent payment.

use std::sync::Arc;

use super::gateway_call::bounded;
use super::settings::BillingSettings;
use crate::domain::billing::{
    decline, BillingError, EntryStatus, LedgerEntry, RefundResult, RefundStatus,
};
use crate::domain::foundation::{PurchaserId, Timestamp};
use crate::ports::{LedgerRepository, PaymentErrorCode, PaymentGateway};

const NOT_FOUND_MESSAGE: &str = "We could not find that payment.";
const NOT_REFUNDABLE_MESSAGE: &str = "This payment is no longer eligible for a refund.";

/// Command to refund one payment.
#[derive(Debug, Clone)]
pub struct RequestRefundCommand {
    pub purchaser_id: String,
    pub charge_id: String,
}

pub struct RequestRefundHandler {
    ledger: Arc<dyn LedgerRepository>,
    gateway: Arc<dyn PaymentGateway>,
    settings: BillingSettings,
}

impl RequestRefundHandler {
    pub fn new(
        ledger: Arc<dyn LedgerRepository>,
        gateway: Arc<dyn PaymentGateway>,
        settings: BillingSettings,
    ) -> Self {
        Self {
            ledger,
            gateway,
            settings,
        }
    }

    #[tracing::instrument(skip(self, cmd), fields(purchaser_id = %cmd.purchaser_id, charge_id = %cmd.charge_id))]
    pub async fn handle(&self, cmd: RequestRefundCommand) -> RefundResult {
        let Ok(purchaser_id) = PurchaserId::new(cmd.purchaser_id) else {
            return RefundResult::failed(
                RefundStatus::MissingIdentity,
                "Please sign in to request a refund.",
            );
        };

        match self.refund(&purchaser_id, &cmd.charge_id, Timestamp::now()).await {
            Ok(result) => {
                tracing::info!(status = %result.status, "Refund request handled");
                result
            }
            Err(err) => {
                tracing::warn!(error = %err, "Refund request failed");
                RefundResult::failed(RefundStatus::RefundRequestFailed, err.purchaser_message())
            }
        }
    }

    async fn refund(
        &self,
        purchaser_id: &PurchaserId,
        charge_id: &str,
        now: Timestamp,
    ) -> Result<RefundResult, BillingError> {
        // 1. Only the purchaser's own payments are visible
        let Some(mut entry) = self
            .ledger
            .find_payment_by_charge_id(charge_id)
            .await?
            .filter(|e| &e.purchaser_id == purchaser_id)
        else {
            return Ok(RefundResult::failed(RefundStatus::NotFound, NOT_FOUND_MESSAGE));
        };

        // 2. Local state answers repeats without the gateway
        match entry.status {
            EntryStatus::Refunded => {
                return Ok(RefundResult::new(
                    RefundStatus::AlreadyRefunded,
                    entry.refunded_amount_cents,
                ))
            }
            EntryStatus::RefundPending => {
                return Ok(RefundResult::new(
                    RefundStatus::RefundPending,
                    entry.refunded_amount_cents,
                ))
            }
            EntryStatus::Succeeded => {}
        }

        if !entry.is_refundable_at(now, self.settings.refund_window_days) {
            return Ok(RefundResult::failed(
                RefundStatus::NotRefundable,
                NOT_REFUNDABLE_MESSAGE,
            ));
        }

        // 3. Ask the gateway
        let refunded = bounded(
            self.settings.gateway_timeout,
            "create_refund",
            self.gateway.create_refund(charge_id),
        )
        .await;

        match refunded {
            Ok(refund) => {
                entry.mark_refund_pending(refund.amount_cents, now);
                self.save(&entry).await;
                let mut result = RefundResult::new(RefundStatus::RefundPending, refund.amount_cents);
                result.refund_id = Some(refund.id);
                Ok(result)
            }
            Err(err) if err.code == PaymentErrorCode::AlreadyRefunded => {
                // Refunded outside this flow; the refund webhook may not have arrived yet.
                entry.apply_refund(entry.amount_cents, now);
                self.save(&entry).await;
                Ok(RefundResult::new(
                    RefundStatus::AlreadyRefunded,
                    entry.refunded_amount_cents,
                ))
            }
            Err(err) if err.code == PaymentErrorCode::CardDeclined => Ok(RefundResult::failed(
                RefundStatus::RefundRequestFailed,
                decline::GENERIC_FAILURE_MESSAGE,
            )),
            Err(err) => Err(err.into()),
        }
    }

    async fn save(&self, entry: &LedgerEntry) {
        if let Err(err) = self.ledger.update(entry).await {
            // The refund webhook brings the entry up to date.
            tracing::error!(
                ledger_entry_id = %entry.id,
                error = %err,
                "Failed to record refund on ledger entry"
            );
        }
    }
}
