//! MovePurchaserDataHandler - Merges one purchaser's billing data into another.

use std::sync::Arc;

use crate::domain::billing::BillingError;
use crate::domain::foundation::PurchaserId;
use crate::ports::{CustomerLinkRepository, LedgerRepository, SubscriptionPlanRepository};

/// Command to move billing data between purchaser accounts.
#[derive(Debug, Clone)]
pub struct MovePurchaserDataCommand {
    pub from_purchaser_id: String,
    pub to_purchaser_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MovePurchaserDataResult {
    pub ledger_entries_moved: u64,
    pub subscription_plans_moved: u64,
    /// False when the target already had its own gateway customer.
    pub customer_link_moved: bool,
}

pub struct MovePurchaserDataHandler {
    links: Arc<dyn CustomerLinkRepository>,
    plans: Arc<dyn SubscriptionPlanRepository>,
    ledger: Arc<dyn LedgerRepository>,
}

impl MovePurchaserDataHandler {
    pub fn new(
        links: Arc<dyn CustomerLinkRepository>,
        plans: Arc<dyn SubscriptionPlanRepository>,
        ledger: Arc<dyn LedgerRepository>,
    ) -> Self {
        Self {
            links,
            plans,
            ledger,
        }
    }

    pub async fn handle(
        &self,
        cmd: MovePurchaserDataCommand,
    ) -> Result<MovePurchaserDataResult, BillingError> {
        let from = PurchaserId::new(cmd.from_purchaser_id)?;
        let to = PurchaserId::new(cmd.to_purchaser_id)?;
        if from == to {
            return Err(BillingError::validation(
                "to_purchaser_id",
                "Cannot move billing data onto the same purchaser",
            ));
        }

        let ledger_entries_moved = self.ledger.reassign_purchaser(&from, &to).await?;
        let subscription_plans_moved = self.plans.reassign_purchaser(&from, &to).await?;
        let customer_link_moved = self.links.reassign(&from, &to).await?;

        tracing::info!(
            from_purchaser_id = %from,
            to_purchaser_id = %to,
            ledger_entries_moved,
            subscription_plans_moved,
            customer_link_moved,
            "Purchaser billing data moved"
        );

        Ok(MovePurchaserDataResult {
            ledger_entries_moved,
            subscription_plans_moved,
            customer_link_moved,
        })
    }
}
