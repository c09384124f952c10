//! MoveOrganizationDataHandler - Re-points an organization's billing data at another.

use std::sync::Arc;

use crate::domain::billing::BillingError;
use crate::domain::foundation::OrganizationId;
use crate::ports::{LedgerRepository, SubscriptionPlanRepository};

/// Command to move billing data between organizations.
#[derive(Debug, Clone)]
pub struct MoveOrganizationDataCommand {
    pub from_organization_id: String,
    pub to_organization_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoveOrganizationDataResult {
    pub ledger_entries_moved: u64,
    pub subscription_plans_moved: u64,
    /// Active plans left on the source because the target already holds that plan type.
    pub active_plans_kept: u64,
}

pub struct MoveOrganizationDataHandler {
    plans: Arc<dyn SubscriptionPlanRepository>,
    ledger: Arc<dyn LedgerRepository>,
}

impl MoveOrganizationDataHandler {
    pub fn new(
        plans: Arc<dyn SubscriptionPlanRepository>,
        ledger: Arc<dyn LedgerRepository>,
    ) -> Self {
        Self { plans, ledger }
    }

    pub async fn handle(
        &self,
        cmd: MoveOrganizationDataCommand,
    ) -> Result<MoveOrganizationDataResult, BillingError> {
        let from = OrganizationId::new(cmd.from_organization_id)?;
        let to = OrganizationId::new(cmd.to_organization_id)?;
        if from == to {
            return Err(BillingError::validation(
                "to_organization_id",
                "Cannot move billing data onto the same organization",
            ));
        }

        let ledger_entries_moved = self.ledger.reassign_organization(&from, &to).await?;
        let plans = self.plans.reassign_organization(&from, &to).await?;

        if plans.kept_active > 0 {
            tracing::warn!(
                from_organization_id = %from,
                to_organization_id = %to,
                active_plans_kept = plans.kept_active,
                "Target organization already has an active plan of the same type"
            );
        }
        tracing::info!(
            from_organization_id = %from,
            to_organization_id = %to,
            ledger_entries_moved,
            subscription_plans_moved = plans.moved,
            "Organization billing data moved"
        );

        Ok(MoveOrganizationDataResult {
            ledger_entries_moved,
            subscription_plans_moved: plans.moved,
            active_plans_kept: plans.kept_active,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::{InMemoryLedgerRepository, InMemorySubscriptionPlanRepository};
    use crate::domain::billing::{EntryParty, LedgerEntry, PlanType, SubscriptionKey, SubscriptionPlan};
    use crate::domain::foundation::{PurchaserId, Timestamp};

    fn org(id: &str) -> OrganizationId {
        OrganizationId::new(id).unwrap()
    }

    fn command(from: &str, to: &str) -> MoveOrganizationDataCommand {
        MoveOrganizationDataCommand {
            from_organization_id: from.to_string(),
            to_organization_id: to.to_string(),
        }
    }

    fn org_plan(organization: &str) -> SubscriptionPlan {
        SubscriptionPlan::for_organization(
            PurchaserId::new("U1").unwrap(),
            org(organization),
            PlanType::ProfessionalMonthly,
            "DEFAULT-PROFESSIONAL_MONTHLY",
            15000,
            "usd",
        )
    }

    struct Fixture {
        handler: MoveOrganizationDataHandler,
        plans: InMemorySubscriptionPlanRepository,
        ledger: InMemoryLedgerRepository,
    }

    async fn fixture() -> Fixture {
        let plans = InMemorySubscriptionPlanRepository::new();
        let ledger = InMemoryLedgerRepository::new();

        let mut plan = org_plan("ORG1");
        plan.attach_external_subscription("sub_1").unwrap();
        plans.insert(&plan).await.unwrap();
        ledger
            .append(&LedgerEntry::subscription_setup(
                EntryParty {
                    purchaser_id: PurchaserId::new("U1").unwrap(),
                    external_customer_id: "cus_1".to_string(),
                    organization_id: Some(org("ORG1")),
                    plan_type: Some(PlanType::ProfessionalMonthly),
                    coupon_code: None,
                },
                "sub_1",
                15000,
                "usd",
                Timestamp::now(),
            ))
            .await
            .unwrap();

        let handler =
            MoveOrganizationDataHandler::new(Arc::new(plans.clone()), Arc::new(ledger.clone()));
        Fixture {
            handler,
            plans,
            ledger,
        }
    }

    #[tokio::test]
    async fn moves_plans_and_entries_to_the_new_organization() {
        let f = fixture().await;

        let result = f.handler.handle(command("ORG1", "ORG2")).await.unwrap();

        assert_eq!(
            result,
            MoveOrganizationDataResult {
                ledger_entries_moved: 1,
                subscription_plans_moved: 1,
                active_plans_kept: 0,
            }
        );
        let key = SubscriptionKey::organization(&org("ORG2"), PlanType::ProfessionalMonthly);
        let plan = f.plans.find_active(&key).await.unwrap().unwrap();
        assert_eq!(plan.external_subscription_id.as_deref(), Some("sub_1"));
        let setup = f.ledger.find_setup_by_subscription_id("sub_1").await.unwrap().unwrap();
        assert_eq!(setup.organization_id, Some(org("ORG2")));
    }

    #[tokio::test]
    async fn target_keeps_its_own_active_plan() {
        let f = fixture().await;
        f.plans.insert(&org_plan("ORG2")).await.unwrap();

        let result = f.handler.handle(command("ORG1", "ORG2")).await.unwrap();

        assert_eq!(result.subscription_plans_moved, 0);
        assert_eq!(result.active_plans_kept, 1);
        assert_eq!(result.ledger_entries_moved, 1);
        let source = SubscriptionKey::organization(&org("ORG1"), PlanType::ProfessionalMonthly);
        assert!(f.plans.find_active(&source).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn missing_or_identical_ids_are_rejected() {
        let f = fixture().await;

        let missing = f.handler.handle(command("", "ORG2")).await.unwrap_err();
        let identical = f.handler.handle(command("ORG1", "ORG1")).await.unwrap_err();

        assert!(matches!(missing, BillingError::Validation { .. }));
        assert!(matches!(identical, BillingError::Validation { .. }));
        assert_eq!(f.ledger.all().await[0].organization_id, Some(org("ORG1")));
    }
}
