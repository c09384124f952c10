//! A purchaser's recurring commitment, organization plan or monthly donation.

use serde::{Deserialize, Serialize};

use super::plan_type::{BillingInterval, PlanType};
use crate::domain::foundation::{
    DomainError, ErrorCode, OrganizationId, PurchaserId, SubscriptionPlanId, Timestamp,
};

/// Store-level uniqueness key: at most one active plan per key.
///
/// Organization plans are keyed by organization and plan type, personal
/// recurring donations by purchaser and gateway plan id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubscriptionKey {
    pub owner: String,
    pub plan_key: String,
    pub is_organization_plan: bool,
}

impl SubscriptionKey {
    pub fn organization(organization_id: &OrganizationId, plan_type: PlanType) -> Self {
        Self {
            owner: organization_id.as_str().to_string(),
            plan_key: plan_type.as_str().to_string(),
            is_organization_plan: true,
        }
    }

    pub fn personal(purchaser_id: &PurchaserId, gateway_plan_id: &str) -> Self {
        Self {
            owner: purchaser_id.as_str().to_string(),
            plan_key: gateway_plan_id.to_string(),
            is_organization_plan: false,
        }
    }
}

/// Gateway plan id of a personal monthly donation of the given amount.
pub fn personal_gateway_plan_id(purchaser_id: &PurchaserId, amount_cents: i64) -> String {
    format!("{}-monthly-{}", purchaser_id, amount_cents)
}

/// Gateway plan id of an organization plan priced by a coupon.
///
/// Gateway plans are immutable, so the price is part of the id and a
/// repriced catalog row gets a plan of its own.
pub fn organization_gateway_plan_id(
    plan_type: PlanType,
    coupon_code: &str,
    base_price_cents: i64,
) -> String {
    format!("{}-{}-{}", plan_type, coupon_code, base_price_cents)
}

/// Recurring commitment instance.
///
/// `is_active` flips true to false exactly once; renewing after a cancel
/// creates a new row. `external_subscription_id` is write-once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionPlan {
    pub id: SubscriptionPlanId,
    pub purchaser_id: PurchaserId,
    pub organization_id: Option<OrganizationId>,
    /// `None` for personal donations, which are not catalog plans.
    pub plan_type: Option<PlanType>,
    pub coupon_code: String,
    pub gateway_plan_id: String,
    pub base_price_cents: i64,
    pub currency: String,
    pub billing_interval: BillingInterval,
    pub external_subscription_id: Option<String>,
    pub is_active: bool,
    pub paid_without_gateway: bool,
    pub created_at: Timestamp,
    pub last_charged_at: Option<Timestamp>,
    pub canceled_at: Option<Timestamp>,
    pub ended_at: Option<Timestamp>,
}

impl SubscriptionPlan {
    /// Creates a pending organization plan; the gateway subscription id is attached later.
    pub fn for_organization(
        purchaser_id: PurchaserId,
        organization_id: OrganizationId,
        plan_type: PlanType,
        coupon_code: impl Into<String>,
        base_price_cents: i64,
        currency: impl Into<String>,
    ) -> Self {
        let coupon_code = coupon_code.into();
        Self {
            id: SubscriptionPlanId::new(),
            purchaser_id,
            organization_id: Some(organization_id),
            plan_type: Some(plan_type),
            gateway_plan_id: organization_gateway_plan_id(plan_type, &coupon_code, base_price_cents),
            coupon_code,
            base_price_cents,
            currency: currency.into(),
            billing_interval: plan_type.billing_interval(),
            external_subscription_id: None,
            is_active: true,
            paid_without_gateway: plan_type.is_paid_without_gateway(),
            created_at: Timestamp::now(),
            last_charged_at: None,
            canceled_at: None,
            ended_at: None,
        }
    }

    /// Creates a pending personal monthly donation plan.
    pub fn for_personal_donation(
        purchaser_id: PurchaserId,
        amount_cents: i64,
        currency: impl Into<String>,
    ) -> Self {
        Self {
            id: SubscriptionPlanId::new(),
            gateway_plan_id: personal_gateway_plan_id(&purchaser_id, amount_cents),
            purchaser_id,
            organization_id: None,
            plan_type: None,
            coupon_code: String::new(),
            base_price_cents: amount_cents,
            currency: currency.into(),
            billing_interval: BillingInterval::Month,
            external_subscription_id: None,
            is_active: true,
            paid_without_gateway: false,
            created_at: Timestamp::now(),
            last_charged_at: None,
            canceled_at: None,
            ended_at: None,
        }
    }

    pub fn is_organization_plan(&self) -> bool {
        self.organization_id.is_some()
    }

    pub fn key(&self) -> SubscriptionKey {
        match (&self.organization_id, self.plan_type) {
            (Some(org), Some(plan_type)) => SubscriptionKey::organization(org, plan_type),
            _ => SubscriptionKey::personal(&self.purchaser_id, &self.gateway_plan_id),
        }
    }

    /// Attaches the gateway subscription id.
    ///
    /// Returns `Ok(true)` when newly set and `Ok(false)` when the same id was
    /// already present.
    ///
    /// # Errors
    ///
    /// Returns `InvalidStateTransition` if a different id is already attached.
    pub fn attach_external_subscription(
        &mut self,
        external_subscription_id: &str,
    ) -> Result<bool, DomainError> {
        match &self.external_subscription_id {
            None => {
                self.external_subscription_id = Some(external_subscription_id.to_string());
                Ok(true)
            }
            Some(existing) if existing == external_subscription_id => Ok(false),
            Some(existing) => Err(DomainError::new(
                ErrorCode::InvalidStateTransition,
                "Subscription plan is already linked to another gateway subscription",
            )
            .with_detail("existing", existing.clone())
            .with_detail("attempted", external_subscription_id)),
        }
    }

    /// Ends the plan. Timestamps already present are kept.
    ///
    /// # Errors
    ///
    /// Returns `InvalidStateTransition` if the plan is already inactive.
    pub fn deactivate(
        &mut self,
        canceled_at: Option<Timestamp>,
        ended_at: Option<Timestamp>,
    ) -> Result<(), DomainError> {
        if !self.is_active {
            return Err(DomainError::new(
                ErrorCode::InvalidStateTransition,
                "Subscription plan is already inactive",
            )
            .with_detail("subscription_plan_id", self.id.to_string()));
        }
        self.is_active = false;
        self.canceled_at = self.canceled_at.or(canceled_at).or_else(|| Some(Timestamp::now()));
        self.ended_at = self.ended_at.or(ended_at);
        Ok(())
    }

    /// Records a successful recurring charge. Older timestamps never replace newer ones.
    pub fn record_charge(&mut self, charged_at: Timestamp) -> bool {
        match self.last_charged_at {
            Some(previous) if !charged_at.is_after(&previous) => false,
            _ => {
                self.last_charged_at = Some(charged_at);
                true
            }
        }
    }
}
