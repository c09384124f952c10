//! CancelSubscriptionHandler - Purchaser-initiated cancellation.
//!
//! Cancellation is terminal: once a plan is inactive, every further
//! request reports `PREVIOUSLY_CANCELED` without calling the gateway.

use std::sync::Arc;

use super::gateway_call::bounded;
use super::settings::{BillingSettings, SUBSCRIPTION_SCAN_LIMIT};
use crate::domain::billing::{
    BillingError, CancelResult, CancelStatus, FeatureTier, OutcomeTag, PlanType, SubscriptionKey,
    SubscriptionPlan,
};
use crate::domain::foundation::{OrganizationId, PurchaserId, Timestamp};
use crate::ports::{
    CustomerLinkRepository, LedgerRepository, OrganizationFeatures, PaymentGateway,
    SubscriptionPlanRepository,
};

/// Command to cancel a recurring commitment.
///
/// The plan is located by `external_subscription_id` when given, else by
/// organization and plan type, else by the personal gateway plan key.
#[derive(Debug, Clone, Default)]
pub struct CancelSubscriptionCommand {
    pub purchaser_id: String,
    pub organization_id: Option<String>,
    pub plan_type: Option<String>,
    pub personal_plan_key: Option<String>,
    pub external_subscription_id: Option<String>,
}

pub struct CancelSubscriptionHandler {
    plans: Arc<dyn SubscriptionPlanRepository>,
    ledger: Arc<dyn LedgerRepository>,
    links: Arc<dyn CustomerLinkRepository>,
    gateway: Arc<dyn PaymentGateway>,
    organizations: Arc<dyn OrganizationFeatures>,
    settings: BillingSettings,
}

impl CancelSubscriptionHandler {
    pub fn new(
        plans: Arc<dyn SubscriptionPlanRepository>,
        ledger: Arc<dyn LedgerRepository>,
        links: Arc<dyn CustomerLinkRepository>,
        gateway: Arc<dyn PaymentGateway>,
        organizations: Arc<dyn OrganizationFeatures>,
        settings: BillingSettings,
    ) -> Self {
        Self {
            plans,
            ledger,
            links,
            gateway,
            organizations,
            settings,
        }
    }

    #[tracing::instrument(skip(self, cmd), fields(purchaser_id = %cmd.purchaser_id))]
    pub async fn handle(&self, cmd: CancelSubscriptionCommand) -> CancelResult {
        let Ok(purchaser_id) = PurchaserId::new(cmd.purchaser_id.clone()) else {
            return CancelResult::new(CancelStatus::MissingIdentity);
        };

        // 1. Locate the plan
        let plan = match self.locate(&purchaser_id, &cmd).await {
            Ok(Some(plan)) => plan,
            Ok(None) => {
                tracing::info!("No subscription plan to cancel");
                return CancelResult::new(CancelStatus::NotFound);
            }
            Err(err) => {
                tracing::error!(error = %err, "Failed to look up subscription plan");
                return CancelResult::failed(CancelStatus::CancelRequestFailed);
            }
        };

        // 2. Terminal state short-circuits
        if !plan.is_active {
            let mut result = CancelResult::new(CancelStatus::PreviouslyCanceled);
            result.external_subscription_id = plan.external_subscription_id.clone();
            result.canceled_at = plan.canceled_at;
            result.ended_at = plan.ended_at;
            return result;
        }

        // 3. Cancel at the gateway, then locally
        match self.cancel(plan).await {
            Ok(result) => {
                tracing::info!(
                    subscription_id = ?result.external_subscription_id,
                    "Subscription canceled"
                );
                result
            }
            Err(err) => {
                tracing::warn!(error = %err, "Subscription cancellation failed");
                CancelResult::failed(CancelStatus::CancelRequestFailed)
            }
        }
    }

    async fn locate(
        &self,
        purchaser_id: &PurchaserId,
        cmd: &CancelSubscriptionCommand,
    ) -> Result<Option<SubscriptionPlan>, BillingError> {
        let plan = if let Some(subscription_id) = cmd.external_subscription_id.as_deref() {
            self.plans
                .find_by_external_subscription_id(subscription_id)
                .await?
        } else if let Some(organization_id) = cmd.organization_id.clone() {
            let organization_id = OrganizationId::new(organization_id)?;
            let plan_type: PlanType = cmd
                .plan_type
                .as_deref()
                .ok_or_else(|| BillingError::validation("plan_type", "Plan type is required"))?
                .parse()?;
            self.plans
                .find_latest(&SubscriptionKey::organization(&organization_id, plan_type))
                .await?
        } else if let Some(plan_key) = cmd.personal_plan_key.as_deref() {
            self.plans
                .find_latest(&SubscriptionKey::personal(purchaser_id, plan_key))
                .await?
        } else {
            None
        };

        // Personal plans are only visible to their purchaser.
        Ok(plan.filter(|p| p.is_organization_plan() || &p.purchaser_id == purchaser_id))
    }

    async fn cancel(&self, mut plan: SubscriptionPlan) -> Result<CancelResult, BillingError> {
        let mut tags = Vec::new();

        let (canceled_at, ended_at) = if plan.paid_without_gateway {
            tags.push(OutcomeTag::GatewayCallSkipped);
            (Some(Timestamp::now()), None)
        } else {
            let subscription_id = match plan.external_subscription_id.clone() {
                Some(id) => id,
                None => {
                    let id = self.backfill_subscription_id(&plan).await?;
                    plan.attach_external_subscription(&id)?;
                    tags.push(OutcomeTag::SubscriptionIdBackfilled);
                    id
                }
            };
            let canceled = bounded(
                self.settings.gateway_timeout,
                "cancel_subscription",
                self.gateway.cancel_subscription(&subscription_id),
            )
            .await?;
            (
                canceled
                    .canceled_at
                    .and_then(Timestamp::from_unix_secs)
                    .or_else(|| Some(Timestamp::now())),
                canceled.ended_at.and_then(Timestamp::from_unix_secs),
            )
        };

        plan.deactivate(canceled_at, ended_at)?;
        if let Err(err) = self.plans.update(&plan).await {
            // The subscription-ended webhook deactivates it on delivery.
            tracing::error!(
                subscription_plan_id = %plan.id,
                error = %err,
                "Failed to persist canceled plan"
            );
        }

        if let Some(subscription_id) = &plan.external_subscription_id {
            match self.stamp_setup(subscription_id, &plan).await {
                Ok(true) => tags.push(OutcomeTag::LedgerStamped),
                Ok(false) => {}
                Err(err) => tracing::error!(
                    subscription_id = %subscription_id,
                    error = %err,
                    "Failed to stamp setup entry with cancellation"
                ),
            }
        }

        if let Some(organization_id) = &plan.organization_id {
            match self
                .organizations
                .set_feature_tier(organization_id, FeatureTier::Free)
                .await
            {
                Ok(()) => tags.push(OutcomeTag::FeatureTierUpdated),
                Err(err) => {
                    tracing::error!(
                        organization_id = %organization_id,
                        error = %err,
                        "Failed to demote organization after cancellation"
                    );
                    tags.push(OutcomeTag::FeatureTierUpdateFailed);
                }
            }
        }

        let mut result = CancelResult::new(CancelStatus::Canceled);
        result.external_subscription_id = plan.external_subscription_id.clone();
        result.canceled_at = plan.canceled_at;
        result.ended_at = plan.ended_at;
        result.tags = tags;
        Ok(result)
    }

    /// Finds the gateway subscription for a plan whose id was never linked.
    async fn backfill_subscription_id(&self, plan: &SubscriptionPlan) -> Result<String, BillingError> {
        let link = self
            .links
            .find_by_purchaser(&plan.purchaser_id)
            .await?
            .ok_or_else(|| {
                BillingError::ReconciliationConflict(format!(
                    "No gateway customer for purchaser {}",
                    plan.purchaser_id
                ))
            })?;

        let subscriptions = bounded(
            self.settings.gateway_timeout,
            "list_subscriptions",
            self.gateway
                .list_subscriptions(link.external_customer_id(), SUBSCRIPTION_SCAN_LIMIT),
        )
        .await?;

        let found = subscriptions
            .into_iter()
            .find(|s| {
                !s.status.is_terminated() && s.plan_id.as_deref() == Some(plan.gateway_plan_id.as_str())
            })
            .ok_or_else(|| {
                BillingError::ReconciliationConflict(format!(
                    "No gateway subscription found for plan {}",
                    plan.gateway_plan_id
                ))
            })?;

        tracing::info!(
            subscription_plan_id = %plan.id,
            subscription_id = %found.id,
            "Backfilled missing gateway subscription id"
        );
        Ok(found.id)
    }

    async fn stamp_setup(
        &self,
        subscription_id: &str,
        plan: &SubscriptionPlan,
    ) -> Result<bool, BillingError> {
        let Some(mut setup) = self.ledger.find_setup_by_subscription_id(subscription_id).await?
        else {
            return Ok(false);
        };
        if !setup.stamp_cancellation(plan.canceled_at, plan.ended_at) {
            return Ok(false);
        }
        self.ledger.update(&setup).await?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::{
        InMemoryCustomerLinkRepository, InMemoryLedgerRepository,
        InMemorySubscriptionPlanRepository, RecordingOrganizationFeatures,
    };
    use crate::adapters::stripe::MockPaymentGateway;
    use crate::domain::billing::{CustomerLink, EntryParty, LedgerEntry, CANCEL_RETRY_MESSAGE};
    use crate::ports::{PaymentError, Subscription, SubscriptionStatus};

    struct Fixture {
        handler: CancelSubscriptionHandler,
        plans: InMemorySubscriptionPlanRepository,
        ledger: InMemoryLedgerRepository,
        links: InMemoryCustomerLinkRepository,
        gateway: MockPaymentGateway,
        organizations: RecordingOrganizationFeatures,
    }

    fn fixture() -> Fixture {
        let plans = InMemorySubscriptionPlanRepository::new();
        let ledger = InMemoryLedgerRepository::new();
        let links = InMemoryCustomerLinkRepository::new();
        let gateway = MockPaymentGateway::new();
        let organizations = RecordingOrganizationFeatures::new();
        let handler = CancelSubscriptionHandler::new(
            Arc::new(plans.clone()),
            Arc::new(ledger.clone()),
            Arc::new(links.clone()),
            Arc::new(gateway.clone()),
            Arc::new(organizations.clone()),
            BillingSettings::default(),
        );
        Fixture {
            handler,
            plans,
            ledger,
            links,
            gateway,
            organizations,
        }
    }

    fn purchaser() -> PurchaserId {
        PurchaserId::new("U1").unwrap()
    }

    fn org() -> OrganizationId {
        OrganizationId::new("ORG1").unwrap()
    }

    fn org_plan(plan_type: PlanType) -> SubscriptionPlan {
        SubscriptionPlan::for_organization(purchaser(), org(), plan_type, "DEFAULT", 5000, "usd")
    }

    fn gateway_subscription(id: &str, plan_id: &str) -> Subscription {
        Subscription {
            id: id.to_string(),
            customer_id: "cus_1".to_string(),
            plan_id: Some(plan_id.to_string()),
            status: SubscriptionStatus::Active,
            created_at: 1_700_000_000,
            canceled_at: None,
            ended_at: None,
        }
    }

    fn by_org() -> CancelSubscriptionCommand {
        CancelSubscriptionCommand {
            purchaser_id: "U1".to_string(),
            organization_id: Some("ORG1".to_string()),
            plan_type: Some("PROFESSIONAL_MONTHLY".to_string()),
            ..Default::default()
        }
    }

    async fn seed_linked_plan(f: &Fixture) -> SubscriptionPlan {
        let mut plan = org_plan(PlanType::ProfessionalMonthly);
        plan.attach_external_subscription("sub_1").unwrap();
        f.plans.insert(&plan).await.unwrap();
        f.gateway
            .add_subscription(gateway_subscription("sub_1", &plan.gateway_plan_id));
        f.ledger
            .append(&LedgerEntry::subscription_setup(
                EntryParty {
                    purchaser_id: purchaser(),
                    external_customer_id: "cus_1".to_string(),
                    organization_id: Some(org()),
                    plan_type: Some(PlanType::ProfessionalMonthly),
                    coupon_code: None,
                },
                "sub_1",
                5000,
                "usd",
                Timestamp::now(),
            ))
            .await
            .unwrap();
        plan
    }

    #[tokio::test]
    async fn cancels_at_gateway_and_stamps_everything() {
        let f = fixture();
        seed_linked_plan(&f).await;

        let result = f.handler.handle(by_org()).await;

        assert_eq!(result.status, CancelStatus::Canceled);
        assert!(result.success);
        assert!(result.canceled_at.is_some());
        assert!(result.has_tag(OutcomeTag::LedgerStamped));
        assert!(result.has_tag(OutcomeTag::FeatureTierUpdated));
        assert_eq!(f.organizations.tier_of(&org()).await, Some(FeatureTier::Free));
        let setup = f.ledger.find_setup_by_subscription_id("sub_1").await.unwrap().unwrap();
        assert!(setup.canceled_at.is_some());
    }

    #[tokio::test]
    async fn second_cancel_is_previously_canceled_without_gateway_call() {
        let f = fixture();
        seed_linked_plan(&f).await;

        let first = f.handler.handle(by_org()).await;
        f.gateway.clear_calls();
        let second = f.handler.handle(by_org()).await;

        assert_eq!(first.status, CancelStatus::Canceled);
        assert_eq!(second.status, CancelStatus::PreviouslyCanceled);
        assert!(second.success);
        assert_eq!(second.canceled_at, first.canceled_at);
        assert!(!f.gateway.was_called("cancel_subscription"));
    }

    #[tokio::test]
    async fn missing_subscription_id_is_backfilled_from_gateway() {
        let f = fixture();
        let plan = org_plan(PlanType::ProfessionalMonthly);
        f.plans.insert(&plan).await.unwrap();
        f.links
            .insert(&CustomerLink::new(purchaser(), "cus_1").unwrap())
            .await
            .unwrap();
        f.gateway
            .add_subscription(gateway_subscription("sub_other", "SOMETHING-ELSE"));
        f.gateway
            .add_subscription(gateway_subscription("sub_9", &plan.gateway_plan_id));

        let result = f.handler.handle(by_org()).await;

        assert_eq!(result.status, CancelStatus::Canceled);
        assert!(result.has_tag(OutcomeTag::SubscriptionIdBackfilled));
        assert_eq!(result.external_subscription_id.as_deref(), Some("sub_9"));
        let stored = f.plans.find_by_id(plan.id).await.unwrap().unwrap();
        assert_eq!(stored.external_subscription_id.as_deref(), Some("sub_9"));
        assert!(!stored.is_active);
    }

    #[tokio::test]
    async fn plan_paid_outside_gateway_skips_gateway() {
        let f = fixture();
        let mut cmd = by_org();
        cmd.plan_type = Some("ENTERPRISE_PAID_WITHOUT_GATEWAY".to_string());
        f.plans
            .insert(&org_plan(PlanType::EnterprisePaidWithoutGateway))
            .await
            .unwrap();

        let result = f.handler.handle(cmd).await;

        assert_eq!(result.status, CancelStatus::Canceled);
        assert!(result.has_tag(OutcomeTag::GatewayCallSkipped));
        assert!(f.gateway.calls().is_empty());
    }

    #[tokio::test]
    async fn gateway_failure_leaves_plan_active() {
        let f = fixture();
        let plan = seed_linked_plan(&f).await;
        f.gateway
            .set_method_error("cancel_subscription", PaymentError::network("reset"));

        let result = f.handler.handle(by_org()).await;

        assert_eq!(result.status, CancelStatus::CancelRequestFailed);
        assert_eq!(result.purchaser_message.as_deref(), Some(CANCEL_RETRY_MESSAGE));
        assert!(f.plans.find_by_id(plan.id).await.unwrap().unwrap().is_active);
    }

    #[tokio::test]
    async fn personal_plan_of_someone_else_is_not_found() {
        let f = fixture();
        let mut plan = SubscriptionPlan::for_personal_donation(purchaser(), 500, "usd");
        plan.attach_external_subscription("sub_5").unwrap();
        f.plans.insert(&plan).await.unwrap();

        let result = f
            .handler
            .handle(CancelSubscriptionCommand {
                purchaser_id: "U2".to_string(),
                external_subscription_id: Some("sub_5".to_string()),
                ..Default::default()
            })
            .await;

        assert_eq!(result.status, CancelStatus::NotFound);
        assert!(!f.gateway.was_called("cancel_subscription"));
    }

    #[tokio::test]
    async fn blank_purchaser_is_missing_identity() {
        let f = fixture();

        let result = f.handler.handle(CancelSubscriptionCommand::default()).await;

        assert_eq!(result.status, CancelStatus::MissingIdentity);
        assert!(!result.success);
    }
}
