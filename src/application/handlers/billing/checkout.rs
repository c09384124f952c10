//! CheckoutHandler - synchronous purchase entry point.
//!
//! Validates the request, re-prices organization plans from the catalog,
//! obtains the gateway customer, then either starts a subscription or
//! charges once. Exactly one ledger entry is written per successful
//! checkout. Failures are folded into `CheckoutResult`, never returned.

use std::sync::Arc;

use super::customer_registry::CustomerRegistry;
use super::gateway_call::bounded;
use super::pricing_catalog::PricingCatalog;
use super::settings::BillingSettings;
use crate::domain::billing::{
    BillingError, CheckoutMetadata, CheckoutResult, CheckoutStatus, EntryParty, LedgerEntry,
    OutcomeTag, PlanType, PriceStatus, SubscriptionKey, SubscriptionPlan,
};
use crate::domain::foundation::{OrganizationId, PurchaserId, Timestamp};
use crate::ports::{
    CreateChargeRequest, CreateSubscriptionRequest, LedgerRepository, OrganizationFeatures,
    PaymentGateway, SaveResult, SubscriptionPlanRepository,
};

/// Command to purchase a plan or make a contribution.
#[derive(Debug, Clone, Default)]
pub struct CheckoutCommand {
    pub purchaser_id: String,
    pub email: Option<String>,
    /// Ignored for organization plans, which are priced from the catalog.
    pub amount_cents: i64,
    pub is_recurring: bool,
    pub is_organization_plan: bool,
    pub coupon_code: Option<String>,
    pub plan_type: Option<String>,
    pub beneficiary_org_id: Option<String>,
    pub currency: Option<String>,
}

/// What a validated checkout will do.
#[derive(Debug, Clone)]
enum Purchase {
    OrganizationPlan {
        organization_id: OrganizationId,
        plan_type: PlanType,
        coupon_code: String,
    },
    RecurringDonation {
        amount_cents: i64,
    },
    OneTimeCharge {
        amount_cents: i64,
    },
}

#[derive(Debug, Clone)]
struct ValidatedCheckout {
    purchaser_id: PurchaserId,
    email: Option<String>,
    currency: String,
    purchase: Purchase,
}

pub struct CheckoutHandler {
    pricing: Arc<PricingCatalog>,
    customers: Arc<CustomerRegistry>,
    plans: Arc<dyn SubscriptionPlanRepository>,
    ledger: Arc<dyn LedgerRepository>,
    gateway: Arc<dyn PaymentGateway>,
    organizations: Arc<dyn OrganizationFeatures>,
    settings: BillingSettings,
}

impl CheckoutHandler {
    pub fn new(
        pricing: Arc<PricingCatalog>,
        customers: Arc<CustomerRegistry>,
        plans: Arc<dyn SubscriptionPlanRepository>,
        ledger: Arc<dyn LedgerRepository>,
        gateway: Arc<dyn PaymentGateway>,
        organizations: Arc<dyn OrganizationFeatures>,
        settings: BillingSettings,
    ) -> Self {
        Self {
            pricing,
            customers,
            plans,
            ledger,
            gateway,
            organizations,
            settings,
        }
    }

    #[tracing::instrument(skip(self, cmd), fields(purchaser_id = %cmd.purchaser_id))]
    pub async fn handle(&self, cmd: CheckoutCommand) -> CheckoutResult {
        let checkout = match self.validate(cmd) {
            Ok(checkout) => checkout,
            Err(rejected) => {
                tracing::info!(status = %rejected.status, "Checkout rejected");
                return rejected;
            }
        };

        let result = match &checkout.purchase {
            Purchase::OrganizationPlan {
                organization_id,
                plan_type,
                coupon_code,
            } => {
                self.purchase_organization_plan(&checkout, organization_id, *plan_type, coupon_code)
                    .await
            }
            Purchase::RecurringDonation { amount_cents } => {
                self.start_recurring_donation(&checkout, *amount_cents).await
            }
            Purchase::OneTimeCharge { amount_cents } => {
                self.charge_once(&checkout, *amount_cents).await
            }
        };

        match result {
            Ok(result) => {
                tracing::info!(status = %result.status, amount_cents = result.amount_cents, "Checkout completed");
                result
            }
            Err(err) => {
                if err.is_retryable() {
                    tracing::warn!(error = %err, "Checkout failed");
                } else {
                    tracing::info!(error = %err, "Checkout declined");
                }
                CheckoutResult::from_error(&err)
            }
        }
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Validation
    // ════════════════════════════════════════════════════════════════════════════

    fn validate(&self, cmd: CheckoutCommand) -> Result<ValidatedCheckout, CheckoutResult> {
        let purchaser_id = PurchaserId::new(cmd.purchaser_id).map_err(|_| {
            CheckoutResult::failed(
                CheckoutStatus::MissingIdentity,
                "Please sign in before making a payment.",
            )
        })?;

        let purchase = if cmd.is_organization_plan {
            let organization_id = cmd
                .beneficiary_org_id
                .map(OrganizationId::new)
                .transpose()
                .ok()
                .flatten()
                .ok_or_else(|| {
                    CheckoutResult::failed(
                        CheckoutStatus::MissingIdentity,
                        "Please choose the organization this plan is for.",
                    )
                })?;
            let plan_type = cmd
                .plan_type
                .as_deref()
                .and_then(|p| p.parse::<PlanType>().ok())
                .filter(PlanType::is_purchasable)
                .ok_or_else(|| {
                    CheckoutResult::failed(
                        CheckoutStatus::InvalidPlanType,
                        "This plan cannot be purchased.",
                    )
                })?;
            Purchase::OrganizationPlan {
                organization_id,
                plan_type,
                coupon_code: cmd.coupon_code.unwrap_or_default(),
            }
        } else {
            if cmd.amount_cents <= 0 {
                return Err(CheckoutResult::failed(
                    CheckoutStatus::InvalidAmount,
                    "Please enter an amount greater than zero.",
                ));
            }
            if cmd.is_recurring {
                Purchase::RecurringDonation {
                    amount_cents: cmd.amount_cents,
                }
            } else {
                Purchase::OneTimeCharge {
                    amount_cents: cmd.amount_cents,
                }
            }
        };

        Ok(ValidatedCheckout {
            purchaser_id,
            email: cmd.email.filter(|e| !e.trim().is_empty()),
            currency: cmd
                .currency
                .filter(|c| !c.trim().is_empty())
                .map(|c| c.to_ascii_lowercase())
                .unwrap_or_else(|| self.settings.default_currency.clone()),
            purchase,
        })
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Branches
    // ════════════════════════════════════════════════════════════════════════════

    async fn purchase_organization_plan(
        &self,
        checkout: &ValidatedCheckout,
        organization_id: &OrganizationId,
        plan_type: PlanType,
        coupon_code: &str,
    ) -> Result<CheckoutResult, BillingError> {
        let key = SubscriptionKey::organization(organization_id, plan_type);
        if let Some(existing) = self.plans.find_active(&key).await? {
            return Ok(already_subscribed(&existing, None));
        }

        let resolution = self.pricing.resolve_price(plan_type, coupon_code, true).await?;
        if !resolution.is_priced() {
            return Ok(CheckoutResult::failed(
                CheckoutStatus::PriceNotFound,
                "This plan is not available right now.",
            ));
        }

        let mut tags = vec![OutcomeTag::RedemptionCounted];
        if resolution.status == PriceStatus::DefaultFallback {
            tags.push(OutcomeTag::DefaultPriceApplied);
        }

        let customer = self
            .customers
            .get_or_create_customer(&checkout.purchaser_id, checkout.email.as_deref())
            .await?;
        if customer.created {
            tags.push(OutcomeTag::CustomerCreated);
        }

        let plan = SubscriptionPlan::for_organization(
            checkout.purchaser_id.clone(),
            organization_id.clone(),
            plan_type,
            resolution.coupon_code.clone(),
            resolution.price_cents,
            checkout.currency.clone(),
        );
        let party = EntryParty {
            purchaser_id: checkout.purchaser_id.clone(),
            external_customer_id: customer.external_customer_id.clone(),
            organization_id: Some(organization_id.clone()),
            plan_type: Some(plan_type),
            coupon_code: Some(resolution.coupon_code.clone()),
        };
        let metadata = CheckoutMetadata {
            purchaser_id: checkout.purchaser_id.clone(),
            organization_id: Some(organization_id.clone()),
            plan_type: Some(plan_type),
            coupon_code: Some(resolution.coupon_code.clone()),
        };

        let mut result = match self
            .subscribe(plan, party, metadata, &customer.external_customer_id, plan_type.as_str())
            .await?
        {
            Subscribed::Created(result) => result,
            Subscribed::Existing(result) => return Ok(result),
        };
        tags.append(&mut result.tags);
        result.tags = tags;

        match self
            .organizations
            .set_feature_tier(organization_id, plan_type.feature_tier())
            .await
        {
            Ok(()) => result.tags.push(OutcomeTag::FeatureTierUpdated),
            Err(err) => {
                tracing::error!(
                    organization_id = %organization_id,
                    error = %err,
                    "Failed to update organization feature tier after purchase"
                );
                result.tags.push(OutcomeTag::FeatureTierUpdateFailed);
            }
        }

        Ok(result)
    }

    async fn start_recurring_donation(
        &self,
        checkout: &ValidatedCheckout,
        amount_cents: i64,
    ) -> Result<CheckoutResult, BillingError> {
        let plan = SubscriptionPlan::for_personal_donation(
            checkout.purchaser_id.clone(),
            amount_cents,
            checkout.currency.clone(),
        );
        if let Some(existing) = self.plans.find_active(&plan.key()).await? {
            return Ok(already_subscribed(&existing, None));
        }

        let customer = self
            .customers
            .get_or_create_customer(&checkout.purchaser_id, checkout.email.as_deref())
            .await?;
        let party = EntryParty {
            purchaser_id: checkout.purchaser_id.clone(),
            external_customer_id: customer.external_customer_id.clone(),
            organization_id: None,
            plan_type: None,
            coupon_code: None,
        };
        let metadata = CheckoutMetadata {
            purchaser_id: checkout.purchaser_id.clone(),
            organization_id: None,
            plan_type: None,
            coupon_code: None,
        };

        let mut result = match self
            .subscribe(plan, party, metadata, &customer.external_customer_id, "Monthly contribution")
            .await?
        {
            Subscribed::Created(result) => result,
            Subscribed::Existing(result) => return Ok(result),
        };
        if customer.created {
            result.tags.insert(0, OutcomeTag::CustomerCreated);
        }
        Ok(result)
    }

    async fn charge_once(
        &self,
        checkout: &ValidatedCheckout,
        amount_cents: i64,
    ) -> Result<CheckoutResult, BillingError> {
        let customer = self
            .customers
            .get_or_create_customer(&checkout.purchaser_id, checkout.email.as_deref())
            .await?;
        let metadata = CheckoutMetadata {
            purchaser_id: checkout.purchaser_id.clone(),
            organization_id: None,
            plan_type: None,
            coupon_code: None,
        };

        let charge = bounded(
            self.settings.gateway_timeout,
            "create_charge",
            self.gateway.create_charge(CreateChargeRequest {
                customer_id: customer.external_customer_id.clone(),
                amount_cents,
                currency: checkout.currency.clone(),
                description: "One-time contribution".to_string(),
                metadata: metadata.to_map(),
                idempotency_key: None,
            }),
        )
        .await?;

        let party = EntryParty {
            purchaser_id: checkout.purchaser_id.clone(),
            external_customer_id: customer.external_customer_id.clone(),
            organization_id: None,
            plan_type: None,
            coupon_code: None,
        };
        let entry = LedgerEntry::payment_from_checkout(
            party,
            charge.id.clone(),
            charge.amount_cents,
            charge.currency.clone(),
            charge.details.clone(),
        );

        let mut result = CheckoutResult::completed(CheckoutStatus::Charged, charge.amount_cents);
        result.charge_id = Some(charge.id);
        result.customer_id = Some(customer.external_customer_id);
        if customer.created {
            result.tags.push(OutcomeTag::CustomerCreated);
        }
        if let Some(tag) = self.journal(&entry).await {
            result.tags.push(tag);
        }
        Ok(result)
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Shared steps
    // ════════════════════════════════════════════════════════════════════════════

    /// Inserts the pending plan, starts the gateway subscription, links it,
    /// and journals the setup entry.
    async fn subscribe(
        &self,
        mut plan: SubscriptionPlan,
        party: EntryParty,
        metadata: CheckoutMetadata,
        customer_id: &str,
        product_name: &str,
    ) -> Result<Subscribed, BillingError> {
        if self.plans.insert(&plan).await? == SaveResult::AlreadyExists {
            let existing = self.plans.find_active(&plan.key()).await?.ok_or_else(|| {
                BillingError::ReconciliationConflict(
                    "Active subscription plan conflicted but cannot be read back".to_string(),
                )
            })?;
            return Ok(Subscribed::Existing(already_subscribed(
                &existing,
                Some(customer_id),
            )));
        }

        let created = bounded(
            self.settings.gateway_timeout,
            "create_subscription",
            self.gateway.create_subscription(CreateSubscriptionRequest {
                customer_id: customer_id.to_string(),
                plan_id: plan.gateway_plan_id.clone(),
                amount_cents: plan.base_price_cents,
                currency: plan.currency.clone(),
                interval: plan.billing_interval,
                product_name: product_name.to_string(),
                metadata: metadata.to_map(),
                idempotency_key: Some(format!("subscription-{}", plan.id)),
            }),
        )
        .await;

        let subscription = match created {
            Ok(subscription) => subscription,
            Err(err) => {
                match self.plans.delete_pending(plan.id).await {
                    Ok(_) => {}
                    Err(cleanup) => tracing::error!(
                        subscription_plan_id = %plan.id,
                        error = %cleanup,
                        "Failed to remove unbacked subscription plan"
                    ),
                }
                return Err(err.into());
            }
        };

        plan.attach_external_subscription(&subscription.id)?;
        if let Err(err) = self.plans.update(&plan).await {
            // Cancellation can still find the subscription by scanning the gateway.
            tracing::error!(
                subscription_plan_id = %plan.id,
                subscription_id = %subscription.id,
                error = %err,
                "Failed to link gateway subscription to plan"
            );
        }

        let entry = LedgerEntry::subscription_setup(
            party,
            subscription.id.clone(),
            plan.base_price_cents,
            plan.currency.clone(),
            Timestamp::now(),
        );

        let mut result =
            CheckoutResult::completed(CheckoutStatus::SubscriptionCreated, plan.base_price_cents);
        result.subscription_id = Some(subscription.id);
        result.customer_id = Some(customer_id.to_string());
        if let Some(tag) = self.journal(&entry).await {
            result.tags.push(tag);
        }
        Ok(Subscribed::Created(result))
    }

    /// Appends the entry; a failure after the gateway succeeded only tags the result.
    async fn journal(&self, entry: &LedgerEntry) -> Option<OutcomeTag> {
        match self.ledger.append(entry).await {
            Ok(SaveResult::Inserted) => None,
            Ok(SaveResult::AlreadyExists) => {
                tracing::info!(
                    charge_id = ?entry.external_charge_id,
                    "Ledger entry already recorded by reconciliation"
                );
                Some(OutcomeTag::LedgerAlreadyRecorded)
            }
            Err(err) => {
                tracing::error!(
                    record_kind = %entry.record_kind,
                    charge_id = ?entry.external_charge_id,
                    subscription_id = ?entry.external_subscription_id,
                    error = %err,
                    "Ledger write failed after gateway success"
                );
                Some(OutcomeTag::LedgerWriteFailed)
            }
        }
    }
}

enum Subscribed {
    Created(CheckoutResult),
    Existing(CheckoutResult),
}

fn already_subscribed(existing: &SubscriptionPlan, customer_id: Option<&str>) -> CheckoutResult {
    tracing::info!(
        subscription_plan_id = %existing.id,
        subscription_id = ?existing.external_subscription_id,
        "Active subscription already exists"
    );
    let mut result =
        CheckoutResult::completed(CheckoutStatus::AlreadySubscribed, existing.base_price_cents);
    result.subscription_id = existing.external_subscription_id.clone();
    result.customer_id = customer_id.map(str::to_string);
    result
}
