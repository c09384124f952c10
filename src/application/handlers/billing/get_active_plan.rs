//! GetActivePlanHandler - Query handler for an organization's current plan.

use std::sync::Arc;

use serde::Serialize;

use super::gateway_call::bounded;
use super::settings::BillingSettings;
use crate::domain::billing::{BillingError, FeatureTier, PlanType, SubscriptionKey, SubscriptionPlan};
use crate::domain::foundation::OrganizationId;
use crate::ports::{PaymentGateway, SubscriptionPlanRepository, UpcomingInvoice};

/// Query for an organization's active plan.
#[derive(Debug, Clone)]
pub struct GetActivePlanQuery {
    pub organization_id: String,
}

/// What an organization is currently entitled to.
#[derive(Debug, Clone, Serialize)]
pub struct ActivePlanView {
    /// `None` when the organization is on the free tier.
    pub plan: Option<SubscriptionPlan>,
    pub plan_type: PlanType,
    pub feature_tier: FeatureTier,
    /// Best-effort preview from the gateway.
    pub upcoming_invoice: Option<UpcomingInvoice>,
}

pub struct GetActivePlanHandler {
    plans: Arc<dyn SubscriptionPlanRepository>,
    gateway: Arc<dyn PaymentGateway>,
    settings: BillingSettings,
}

impl GetActivePlanHandler {
    pub fn new(
        plans: Arc<dyn SubscriptionPlanRepository>,
        gateway: Arc<dyn PaymentGateway>,
        settings: BillingSettings,
    ) -> Self {
        Self {
            plans,
            gateway,
            settings,
        }
    }

    pub async fn handle(&self, query: GetActivePlanQuery) -> Result<ActivePlanView, BillingError> {
        let organization_id = OrganizationId::new(query.organization_id)?;

        // Highest tier wins if more than one plan is active.
        let mut active = None;
        for plan_type in PlanType::ALL.iter().rev().filter(|p| **p != PlanType::Free) {
            let key = SubscriptionKey::organization(&organization_id, *plan_type);
            if let Some(plan) = self.plans.find_active(&key).await? {
                active = Some(plan);
                break;
            }
        }

        let Some(plan) = active else {
            return Ok(ActivePlanView {
                plan: None,
                plan_type: PlanType::Free,
                feature_tier: FeatureTier::Free,
                upcoming_invoice: None,
            });
        };

        let plan_type = plan.plan_type.unwrap_or(PlanType::Free);
        let upcoming_invoice = self.upcoming_invoice(&plan).await;
        Ok(ActivePlanView {
            plan_type,
            feature_tier: plan_type.feature_tier(),
            upcoming_invoice,
            plan: Some(plan),
        })
    }

    async fn upcoming_invoice(&self, plan: &SubscriptionPlan) -> Option<UpcomingInvoice> {
        if plan.paid_without_gateway {
            return None;
        }
        let subscription_id = plan.external_subscription_id.as_deref()?;
        match bounded(
            self.settings.gateway_timeout,
            "retrieve_upcoming_invoice",
            self.gateway.retrieve_upcoming_invoice(subscription_id),
        )
        .await
        {
            Ok(invoice) => Some(invoice),
            Err(err) => {
                tracing::warn!(
                    subscription_id = %subscription_id,
                    error = %err,
                    "Upcoming invoice unavailable"
                );
                None
            }
        }
    }
}
