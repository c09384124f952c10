//! ReconcileWebhookHandler - Folds gateway webhook events into the ledger.
//!
//! Every event type is handled idempotently and in any order relative to
//! checkout: a duplicate delivery, or an event describing something the
//! checkout already journaled, is a successful no-op.

use std::sync::Arc;

use super::customer_registry::CustomerRegistry;
use super::settings::BillingSettings;
use crate::domain::billing::{
    retention_cutoff, ChargeObject, CheckoutMetadata, EntryParty, FeatureTier, GatewayEvent,
    GatewayEventType, InvoiceCrossReference, InvoiceObject, LedgerEntry, SubscriptionObject,
    WebhookError, WebhookVerifier,
};
use crate::domain::foundation::Timestamp;
use crate::ports::{
    InvoiceReferenceRepository, LedgerRepository, OrganizationFeatures, SaveResult, SetupLookup,
    SubscriptionPlanRepository, WebhookEventRecord, WebhookEventRepository, WebhookResult,
};

/// Command to reconcile one webhook delivery.
#[derive(Debug, Clone)]
pub struct ReconcileWebhookCommand {
    /// Raw request body, exactly as signed.
    pub payload: Vec<u8>,
    /// Value of the gateway signature header.
    pub signature: String,
}

pub struct ReconcileWebhookHandler {
    verifier: WebhookVerifier,
    customers: Arc<CustomerRegistry>,
    plans: Arc<dyn SubscriptionPlanRepository>,
    ledger: Arc<dyn LedgerRepository>,
    invoices: Arc<dyn InvoiceReferenceRepository>,
    events: Arc<dyn WebhookEventRepository>,
    organizations: Arc<dyn OrganizationFeatures>,
    settings: BillingSettings,
}

impl ReconcileWebhookHandler {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        verifier: WebhookVerifier,
        customers: Arc<CustomerRegistry>,
        plans: Arc<dyn SubscriptionPlanRepository>,
        ledger: Arc<dyn LedgerRepository>,
        invoices: Arc<dyn InvoiceReferenceRepository>,
        events: Arc<dyn WebhookEventRepository>,
        organizations: Arc<dyn OrganizationFeatures>,
        settings: BillingSettings,
    ) -> Self {
        Self {
            verifier,
            customers,
            plans,
            ledger,
            invoices,
            events,
            organizations,
            settings,
        }
    }

    pub async fn handle(&self, cmd: ReconcileWebhookCommand) -> Result<WebhookResult, WebhookError> {
        // 1. Verify signature before touching the payload
        let event = self.verifier.verify_and_parse(&cmd.payload, &cmd.signature)?;

        // 2. Skip events already handled to a final result
        if let Some(previous) = self.events.find_by_event_id(&event.id).await? {
            if previous.is_final() {
                tracing::info!(
                    event_id = %event.id,
                    event_type = %event.event_type,
                    "Webhook event already handled"
                );
                return Ok(WebhookResult::AlreadyRecorded);
            }
        }

        // 3. Dispatch by event type
        let outcome = self.dispatch(&event).await;

        // 4. Record the outcome for audit and replay
        let payload = serde_json::to_value(&event).unwrap_or(serde_json::Value::Null);
        let record = match &outcome {
            Ok(result) => {
                tracing::info!(
                    event_id = %event.id,
                    event_type = %event.event_type,
                    result = result.as_str(),
                    "Webhook event reconciled"
                );
                WebhookEventRecord::handled(&event.id, &event.event_type, *result, payload)
            }
            Err(err) => {
                if err.is_retryable() {
                    tracing::warn!(event_id = %event.id, event_type = %event.event_type, error = %err, "Webhook reconciliation failed, gateway will retry");
                } else {
                    tracing::error!(event_id = %event.id, event_type = %event.event_type, error = %err, "Webhook event rejected");
                }
                WebhookEventRecord::failed(&event.id, &event.event_type, err.to_string(), payload)
            }
        };
        if let Err(err) = self.events.save(record).await {
            tracing::error!(event_id = %event.id, error = %err, "Failed to record webhook event");
        }

        outcome
    }

    async fn dispatch(&self, event: &GatewayEvent) -> Result<WebhookResult, WebhookError> {
        match event.parsed_type() {
            GatewayEventType::ChargeSucceeded => self.on_charge_succeeded(event.object()?).await,
            GatewayEventType::ChargeRefunded => self.on_charge_refunded(event.object()?).await,
            GatewayEventType::SubscriptionDeleted | GatewayEventType::SubscriptionUpdated => {
                self.on_subscription_changed(event.object()?).await
            }
            GatewayEventType::InvoiceCreated => self.on_invoice_created(event.object()?).await,
            GatewayEventType::InvoicePaymentSucceeded => {
                self.on_invoice_paid(event.object()?).await
            }
            GatewayEventType::Unknown => {
                tracing::debug!(event_type = %event.event_type, "Ignoring unhandled webhook event type");
                Ok(WebhookResult::Ignored)
            }
        }
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Charges
    // ════════════════════════════════════════════════════════════════════════════

    async fn on_charge_succeeded(&self, charge: ChargeObject) -> Result<WebhookResult, WebhookError> {
        if self.ledger.find_payment_by_charge_id(&charge.id).await?.is_some() {
            return Ok(WebhookResult::AlreadyRecorded);
        }
        let customer_id = charge
            .customer
            .clone()
            .ok_or(WebhookError::MissingField("customer"))?;

        if CheckoutMetadata::is_checkout_originated(&charge.metadata) {
            // Checkout did not journal this charge; backfill from the metadata it stamped.
            let metadata = CheckoutMetadata::from_map(&charge.metadata)
                .ok_or(WebhookError::MissingField("metadata.purchaser_id"))?;
            let party = EntryParty {
                purchaser_id: metadata.purchaser_id,
                external_customer_id: customer_id,
                organization_id: metadata.organization_id,
                plan_type: metadata.plan_type,
                coupon_code: metadata.coupon_code,
            };
            let entry = LedgerEntry::payment_from_checkout(
                party,
                charge.id.clone(),
                charge.amount,
                charge.currency.clone(),
                charge.payment_details(),
            )
            .with_created_at(charge.created_at());
            tracing::info!(charge_id = %charge.id, "Backfilling checkout payment from webhook");
            return self.append(&entry).await;
        }

        // Automatic recurring charge
        let purchaser_id = self
            .customers
            .find_purchaser(&customer_id)
            .await?
            .ok_or_else(|| {
                WebhookError::ReconciliationConflict(format!(
                    "No purchaser linked to customer {}",
                    customer_id
                ))
            })?;

        let mut setup = None;
        let mut organization_id = None;
        if let Some(invoice_id) = &charge.invoice {
            if let Some(reference) = self.invoices.find(invoice_id).await? {
                setup = self
                    .ledger
                    .find_setup_by_subscription_id(&reference.subscription_id)
                    .await?;
                if setup.is_none() {
                    // Narrow the amount match to the plan's organization.
                    organization_id = self
                        .plans
                        .find_by_external_subscription_id(&reference.subscription_id)
                        .await?
                        .and_then(|plan| plan.organization_id);
                }
            }
        }
        if setup.is_none() {
            setup = self
                .ledger
                .find_latest_setup(&SetupLookup {
                    purchaser_id: purchaser_id.clone(),
                    external_customer_id: customer_id.clone(),
                    organization_id,
                    amount_cents: charge.amount,
                })
                .await?;
        }
        let setup = setup.ok_or_else(|| {
            WebhookError::ReconciliationConflict(format!(
                "No subscription setup for purchaser {} at {} cents",
                purchaser_id, charge.amount
            ))
        })?;

        let entry = LedgerEntry::auto_recurring_payment(
            setup.party(),
            charge.id.clone(),
            setup.external_subscription_id.clone(),
            charge.amount,
            charge.currency.clone(),
            charge.payment_details(),
        )
        .with_created_at(charge.created_at());
        self.append(&entry).await
    }

    async fn on_charge_refunded(&self, charge: ChargeObject) -> Result<WebhookResult, WebhookError> {
        let mut entry = self
            .ledger
            .find_payment_by_charge_id(&charge.id)
            .await?
            .ok_or_else(|| {
                WebhookError::ReconciliationConflict(format!(
                    "No ledger entry for refunded charge {}",
                    charge.id
                ))
            })?;

        let refunded = if charge.amount_refunded > 0 {
            charge.amount_refunded
        } else {
            entry.amount_cents
        };
        if !entry.apply_refund(refunded, Timestamp::now()) {
            return Ok(WebhookResult::AlreadyRecorded);
        }
        self.ledger.update(&entry).await?;

        tracing::info!(
            charge_id = %charge.id,
            refunded_amount_cents = refunded,
            "Refund recorded"
        );
        Ok(WebhookResult::Processed)
    }

    async fn append(&self, entry: &LedgerEntry) -> Result<WebhookResult, WebhookError> {
        match self.ledger.append(entry).await? {
            SaveResult::Inserted => Ok(WebhookResult::Processed),
            SaveResult::AlreadyExists => Ok(WebhookResult::AlreadyRecorded),
        }
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Subscriptions
    // ════════════════════════════════════════════════════════════════════════════

    async fn on_subscription_changed(
        &self,
        subscription: SubscriptionObject,
    ) -> Result<WebhookResult, WebhookError> {
        if !subscription.is_terminating() {
            return Ok(WebhookResult::Ignored);
        }

        let mut plan = self
            .plans
            .find_by_external_subscription_id(&subscription.id)
            .await?
            .ok_or_else(|| {
                WebhookError::ReconciliationConflict(format!(
                    "No subscription plan for {}",
                    subscription.id
                ))
            })?;
        if !plan.is_active {
            return Ok(WebhookResult::AlreadyRecorded);
        }

        plan.deactivate(subscription.canceled_at(), subscription.ended_at())?;
        self.plans.update(&plan).await?;

        if let Some(mut setup) = self
            .ledger
            .find_setup_by_subscription_id(&subscription.id)
            .await?
        {
            if setup.stamp_cancellation(plan.canceled_at, plan.ended_at) {
                self.ledger.update(&setup).await?;
            }
        }

        if let Some(organization_id) = &plan.organization_id {
            if let Err(err) = self
                .organizations
                .set_feature_tier(organization_id, FeatureTier::Free)
                .await
            {
                tracing::error!(
                    organization_id = %organization_id,
                    error = %err,
                    "Failed to demote organization after subscription ended"
                );
            }
        }

        tracing::info!(
            subscription_id = %subscription.id,
            subscription_plan_id = %plan.id,
            "Subscription ended"
        );
        Ok(WebhookResult::Processed)
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Invoices
    // ════════════════════════════════════════════════════════════════════════════

    async fn on_invoice_created(&self, invoice: InvoiceObject) -> Result<WebhookResult, WebhookError> {
        let Some(subscription_id) = invoice.subscription.clone() else {
            return Ok(WebhookResult::Ignored);
        };

        let reference = InvoiceCrossReference::new(invoice.id.clone(), subscription_id)
            .with_customer(invoice.customer.clone())
            .with_plan(invoice.plan_id());
        let saved = self.invoices.record(&reference).await?;

        let cutoff = retention_cutoff(Timestamp::now(), self.settings.invoice_retention_days);
        let pruned = self.invoices.prune_before(cutoff).await?;
        if pruned > 0 {
            tracing::debug!(pruned, "Pruned expired invoice references");
        }

        Ok(match saved {
            SaveResult::Inserted => WebhookResult::Processed,
            SaveResult::AlreadyExists => WebhookResult::AlreadyRecorded,
        })
    }

    async fn on_invoice_paid(&self, invoice: InvoiceObject) -> Result<WebhookResult, WebhookError> {
        let mut reference = self.invoices.find(&invoice.id).await?;
        if reference.is_none() {
            // invoice.created may still be in flight
            tokio::time::sleep(self.settings.invoice_lookup_retry_delay).await;
            reference = self.invoices.find(&invoice.id).await?;
        }

        let Some(subscription_id) = reference
            .map(|r| r.subscription_id)
            .or_else(|| invoice.subscription.clone())
        else {
            tracing::warn!(invoice_id = %invoice.id, "No subscription known for paid invoice");
            return Ok(WebhookResult::Ignored);
        };

        let Some(mut plan) = self
            .plans
            .find_by_external_subscription_id(&subscription_id)
            .await?
        else {
            tracing::warn!(
                invoice_id = %invoice.id,
                subscription_id = %subscription_id,
                "No subscription plan for paid invoice"
            );
            return Ok(WebhookResult::Ignored);
        };

        if !plan.record_charge(invoice.paid_at()) {
            return Ok(WebhookResult::AlreadyRecorded);
        }
        self.plans.update(&plan).await?;
        Ok(WebhookResult::Processed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::{
        InMemoryCustomerLinkRepository, InMemoryInvoiceReferenceRepository,
        InMemoryLedgerRepository, InMemorySubscriptionPlanRepository,
        InMemoryWebhookEventRepository, RecordingOrganizationFeatures,
    };
    use crate::adapters::stripe::MockPaymentGateway;
    use crate::domain::billing::{sign_payload, CustomerLink, EntryStatus, PlanType, RecordKind, SubscriptionPlan};
    use crate::domain::foundation::{OrganizationId, PurchaserId};
    use crate::ports::CustomerLinkRepository;
    use serde_json::json;
    use std::time::Duration;

    const SECRET: &str = "whsec_reconcile_test";

    struct Fixture {
        handler: ReconcileWebhookHandler,
        links: InMemoryCustomerLinkRepository,
        plans: InMemorySubscriptionPlanRepository,
        ledger: InMemoryLedgerRepository,
        invoices: InMemoryInvoiceReferenceRepository,
        events: InMemoryWebhookEventRepository,
        organizations: RecordingOrganizationFeatures,
    }

    fn fixture() -> Fixture {
        fixture_with_retry_delay(Duration::from_millis(5))
    }

    fn fixture_with_retry_delay(retry_delay: Duration) -> Fixture {
        let links = InMemoryCustomerLinkRepository::new();
        let plans = InMemorySubscriptionPlanRepository::new();
        let ledger = InMemoryLedgerRepository::new();
        let invoices = InMemoryInvoiceReferenceRepository::new();
        let events = InMemoryWebhookEventRepository::new();
        let organizations = RecordingOrganizationFeatures::new();
        let settings = BillingSettings::default().with_invoice_lookup_retry_delay(retry_delay);

        let handler = ReconcileWebhookHandler::new(
            WebhookVerifier::new(SECRET),
            Arc::new(CustomerRegistry::new(
                Arc::new(links.clone()),
                Arc::new(MockPaymentGateway::new()),
                settings.gateway_timeout,
            )),
            Arc::new(plans.clone()),
            Arc::new(ledger.clone()),
            Arc::new(invoices.clone()),
            Arc::new(events.clone()),
            Arc::new(organizations.clone()),
            settings,
        );

        Fixture {
            handler,
            links,
            plans,
            ledger,
            invoices,
            events,
            organizations,
        }
    }

    fn signed(event_id: &str, event_type: &str, object: serde_json::Value) -> ReconcileWebhookCommand {
        let payload = json!({
            "id": event_id,
            "type": event_type,
            "created": chrono::Utc::now().timestamp(),
            "data": { "object": object },
        })
        .to_string();
        let signature = sign_payload(SECRET, chrono::Utc::now().timestamp(), &payload);
        ReconcileWebhookCommand {
            payload: payload.into_bytes(),
            signature,
        }
    }

    fn purchaser() -> PurchaserId {
        PurchaserId::new("U1").unwrap()
    }

    async fn seed_monthly_donation(f: &Fixture, subscription_id: &str) -> SubscriptionPlan {
        f.links
            .insert(&CustomerLink::new(purchaser(), "cus_1").unwrap())
            .await
            .unwrap();
        let mut plan = SubscriptionPlan::for_personal_donation(purchaser(), 500, "usd");
        plan.attach_external_subscription(subscription_id).unwrap();
        f.plans.insert(&plan).await.unwrap();
        let setup = LedgerEntry::subscription_setup(
            EntryParty {
                purchaser_id: purchaser(),
                external_customer_id: "cus_1".to_string(),
                organization_id: None,
                plan_type: None,
                coupon_code: None,
            },
            subscription_id,
            500,
            "usd",
            Timestamp::now(),
        );
        f.ledger.append(&setup).await.unwrap();
        plan
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Verification and replay
    // ════════════════════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn bad_signature_is_rejected_before_parsing() {
        let f = fixture();
        let mut cmd = signed("evt_1", "charge.succeeded", json!({"id": "ch_1"}));
        cmd.signature = sign_payload("whsec_other", chrono::Utc::now().timestamp(), "{}");

        let err = f.handler.handle(cmd).await.unwrap_err();

        assert!(matches!(err, WebhookError::InvalidSignature));
        assert_eq!(err.status_code(), http::StatusCode::UNAUTHORIZED);
        assert!(f.events.is_empty().await);
    }

    #[tokio::test]
    async fn replayed_event_is_already_recorded() {
        let f = fixture();
        let cmd = signed("evt_1", "charge.succeeded", json!({"id": "ch_9", "customer": "cus_9", "amount": 100, "metadata": {"origin": "checkout", "purchaser_id": "U9"}}));

        let first = f.handler.handle(cmd.clone()).await.unwrap();
        let second = f.handler.handle(cmd).await.unwrap();

        assert_eq!(first, WebhookResult::Processed);
        assert_eq!(second, WebhookResult::AlreadyRecorded);
        assert_eq!(f.ledger.count_by_charge_id("ch_9").await, 1);
    }

    #[tokio::test]
    async fn unknown_event_type_is_ignored() {
        let f = fixture();

        let result = f
            .handler
            .handle(signed("evt_1", "customer.created", json!({"id": "cus_1"})))
            .await
            .unwrap();

        assert_eq!(result, WebhookResult::Ignored);
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Charges
    // ════════════════════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn checkout_charge_is_backfilled_from_metadata() {
        let f = fixture();
        let charge = json!({
            "id": "ch_1",
            "customer": "cus_1",
            "amount": 2000,
            "currency": "usd",
            "metadata": {"origin": "checkout", "purchaser_id": "U1"},
            "payment_method_details": {"card": {"brand": "visa", "last4": "4242"}},
        });

        let result = f
            .handler
            .handle(signed("evt_1", "charge.succeeded", charge))
            .await
            .unwrap();

        assert_eq!(result, WebhookResult::Processed);
        let entries = f.ledger.all().await;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].record_kind, RecordKind::PaymentFromCheckout);
        assert_eq!(entries[0].details.last4.as_deref(), Some("4242"));
    }

    #[tokio::test]
    async fn recurring_charge_links_to_setup_via_invoice() {
        let f = fixture();
        seed_monthly_donation(&f, "sub_1").await;
        f.invoices
            .record(&InvoiceCrossReference::new("in_1", "sub_1"))
            .await
            .unwrap();

        let result = f
            .handler
            .handle(signed(
                "evt_2",
                "charge.succeeded",
                json!({"id": "ch_2", "customer": "cus_1", "amount": 500, "currency": "usd", "invoice": "in_1"}),
            ))
            .await
            .unwrap();

        assert_eq!(result, WebhookResult::Processed);
        let payments: Vec<_> = f
            .ledger
            .all()
            .await
            .into_iter()
            .filter(|e| e.record_kind == RecordKind::PaymentAutoRecurring)
            .collect();
        assert_eq!(payments.len(), 1);
        assert_eq!(payments[0].external_subscription_id.as_deref(), Some("sub_1"));
        assert_eq!(payments[0].purchaser_id, purchaser());
    }

    #[tokio::test]
    async fn amount_match_is_narrowed_to_the_invoiced_organization() {
        let f = fixture();
        f.links
            .insert(&CustomerLink::new(purchaser(), "cus_1").unwrap())
            .await
            .unwrap();
        let org_setup = |org: &str, subscription_id: &str, age_days: i64| {
            LedgerEntry::subscription_setup(
                EntryParty {
                    purchaser_id: purchaser(),
                    external_customer_id: "cus_1".to_string(),
                    organization_id: Some(OrganizationId::new(org).unwrap()),
                    plan_type: Some(PlanType::ProfessionalMonthly),
                    coupon_code: None,
                },
                subscription_id,
                12500,
                "usd",
                Timestamp::now().minus_days(age_days),
            )
        };
        f.ledger.append(&org_setup("ORG1", "sub_first", 40)).await.unwrap();
        f.ledger.append(&org_setup("ORG2", "sub_other", 1)).await.unwrap();
        // The ORG1 plan was re-linked to a subscription with no setup of its own.
        let mut plan = SubscriptionPlan::for_organization(
            purchaser(),
            OrganizationId::new("ORG1").unwrap(),
            PlanType::ProfessionalMonthly,
            "",
            12500,
            "usd",
        );
        plan.attach_external_subscription("sub_relinked").unwrap();
        f.plans.insert(&plan).await.unwrap();
        f.invoices
            .record(&InvoiceCrossReference::new("in_1", "sub_relinked"))
            .await
            .unwrap();

        let result = f
            .handler
            .handle(signed(
                "evt_1",
                "charge.succeeded",
                json!({"id": "ch_1", "customer": "cus_1", "amount": 12500, "currency": "usd", "invoice": "in_1"}),
            ))
            .await
            .unwrap();

        assert_eq!(result, WebhookResult::Processed);
        let entry = f.ledger.find_payment_by_charge_id("ch_1").await.unwrap().unwrap();
        assert_eq!(entry.organization_id.as_ref().map(|o| o.as_str()), Some("ORG1"));
        assert_eq!(entry.external_subscription_id.as_deref(), Some("sub_first"));
    }

    #[tokio::test]
    async fn recurring_charge_for_unknown_customer_is_retryable_conflict() {
        let f = fixture();

        let err = f
            .handler
            .handle(signed(
                "evt_3",
                "charge.succeeded",
                json!({"id": "ch_3", "customer": "cus_unknown", "amount": 500}),
            ))
            .await
            .unwrap_err();

        assert!(err.is_retryable());
        assert_eq!(err.status_code(), http::StatusCode::INTERNAL_SERVER_ERROR);
        let record = f.events.find_by_event_id("evt_3").await.unwrap().unwrap();
        assert_eq!(record.result, WebhookResult::Failed);
    }

    #[tokio::test]
    async fn refund_event_is_idempotent() {
        let f = fixture();
        f.handler
            .handle(signed(
                "evt_1",
                "charge.succeeded",
                json!({"id": "ch_1", "customer": "cus_1", "amount": 2000, "metadata": {"origin": "checkout", "purchaser_id": "U1"}}),
            ))
            .await
            .unwrap();

        let refunded = json!({"id": "ch_1", "amount": 2000, "amount_refunded": 2000, "refunded": true});
        let first = f
            .handler
            .handle(signed("evt_2", "charge.refunded", refunded.clone()))
            .await
            .unwrap();
        let second = f
            .handler
            .handle(signed("evt_3", "charge.refunded", refunded))
            .await
            .unwrap();

        assert_eq!(first, WebhookResult::Processed);
        assert_eq!(second, WebhookResult::AlreadyRecorded);
        let entry = f.ledger.find_payment_by_charge_id("ch_1").await.unwrap().unwrap();
        assert_eq!(entry.status, EntryStatus::Refunded);
        assert_eq!(entry.refunded_amount_cents, 2000);
    }

    #[tokio::test]
    async fn late_partial_refund_event_keeps_the_larger_refund() {
        let f = fixture();
        f.handler
            .handle(signed(
                "evt_1",
                "charge.succeeded",
                json!({"id": "ch_1", "customer": "cus_1", "amount": 2000, "metadata": {"origin": "checkout", "purchaser_id": "U1"}}),
            ))
            .await
            .unwrap();

        let full = f
            .handler
            .handle(signed("evt_3", "charge.refunded", json!({"id": "ch_1", "amount": 2000, "amount_refunded": 2000, "refunded": true})))
            .await
            .unwrap();
        let partial = f
            .handler
            .handle(signed("evt_2", "charge.refunded", json!({"id": "ch_1", "amount": 2000, "amount_refunded": 1000})))
            .await
            .unwrap();

        assert_eq!(full, WebhookResult::Processed);
        assert_eq!(partial, WebhookResult::AlreadyRecorded);
        let entry = f.ledger.find_payment_by_charge_id("ch_1").await.unwrap().unwrap();
        assert_eq!(entry.status, EntryStatus::Refunded);
        assert_eq!(entry.refunded_amount_cents, 2000);
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Subscriptions and invoices
    // ════════════════════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn subscription_deleted_deactivates_and_demotes() {
        let f = fixture();
        let organization_id = OrganizationId::new("ORG1").unwrap();
        let mut plan = SubscriptionPlan::for_organization(
            purchaser(),
            organization_id.clone(),
            PlanType::ProfessionalMonthly,
            "DEFAULT-PROFESSIONAL_MONTHLY",
            5000,
            "usd",
        );
        plan.attach_external_subscription("sub_7").unwrap();
        f.plans.insert(&plan).await.unwrap();
        let canceled_at = chrono::Utc::now().timestamp() - 60;

        let deleted = json!({"id": "sub_7", "status": "canceled", "canceled_at": canceled_at, "ended_at": canceled_at});
        let first = f
            .handler
            .handle(signed("evt_1", "customer.subscription.deleted", deleted.clone()))
            .await
            .unwrap();
        let again = f
            .handler
            .handle(signed("evt_2", "customer.subscription.deleted", deleted))
            .await
            .unwrap();

        assert_eq!(first, WebhookResult::Processed);
        assert_eq!(again, WebhookResult::AlreadyRecorded);
        let stored = f.plans.find_by_id(plan.id).await.unwrap().unwrap();
        assert!(!stored.is_active);
        assert_eq!(stored.canceled_at.map(|t| t.as_unix_secs()), Some(canceled_at));
        assert_eq!(f.organizations.tier_of(&organization_id).await, Some(FeatureTier::Free));
    }

    #[tokio::test]
    async fn subscription_update_without_end_is_ignored() {
        let f = fixture();

        let result = f
            .handler
            .handle(signed("evt_1", "customer.subscription.updated", json!({"id": "sub_1", "status": "active"})))
            .await
            .unwrap();

        assert_eq!(result, WebhookResult::Ignored);
    }

    #[tokio::test]
    async fn invoice_paid_updates_last_charge_via_reference() {
        let f = fixture();
        let plan = seed_monthly_donation(&f, "sub_1").await;
        let paid_at = chrono::Utc::now().timestamp() - 10;

        f.handler
            .handle(signed("evt_1", "invoice.created", json!({"id": "in_1", "subscription": "sub_1", "customer": "cus_1"})))
            .await
            .unwrap();
        let result = f
            .handler
            .handle(signed(
                "evt_2",
                "invoice.payment_succeeded",
                json!({"id": "in_1", "status_transitions": {"paid_at": paid_at}}),
            ))
            .await
            .unwrap();

        assert_eq!(result, WebhookResult::Processed);
        let stored = f.plans.find_by_id(plan.id).await.unwrap().unwrap();
        assert_eq!(stored.last_charged_at.map(|t| t.as_unix_secs()), Some(paid_at));
    }

    #[tokio::test]
    async fn invoice_reference_recorded_during_retry_delay_is_used() {
        let f = fixture_with_retry_delay(Duration::from_millis(300));
        let plan = seed_monthly_donation(&f, "sub_1").await;
        let paid_at = chrono::Utc::now().timestamp() - 10;

        // invoice.payment_succeeded overtakes invoice.created and carries no subscription.
        let (paid, created) = tokio::join!(
            f.handler.handle(signed(
                "evt_paid",
                "invoice.payment_succeeded",
                json!({"id": "in_1", "status_transitions": {"paid_at": paid_at}}),
            )),
            async {
                tokio::time::sleep(Duration::from_millis(30)).await;
                f.handler
                    .handle(signed("evt_created", "invoice.created", json!({"id": "in_1", "subscription": "sub_1"})))
                    .await
            },
        );

        assert_eq!(created.unwrap(), WebhookResult::Processed);
        assert_eq!(paid.unwrap(), WebhookResult::Processed);
        let stored = f.plans.find_by_id(plan.id).await.unwrap().unwrap();
        assert_eq!(stored.last_charged_at.map(|t| t.as_unix_secs()), Some(paid_at));
    }

    #[tokio::test]
    async fn invoice_paid_without_reference_gives_up_after_one_retry() {
        let f = fixture();

        let result = f
            .handler
            .handle(signed("evt_1", "invoice.payment_succeeded", json!({"id": "in_missing"})))
            .await
            .unwrap();

        assert_eq!(result, WebhookResult::Ignored);
    }

    #[tokio::test]
    async fn invoice_created_prunes_expired_references() {
        let f = fixture();
        f.invoices
            .record(
                &InvoiceCrossReference::new("in_old", "sub_old")
                    .with_created_at(Timestamp::now().minus_days(30)),
            )
            .await
            .unwrap();

        f.handler
            .handle(signed("evt_1", "invoice.created", json!({"id": "in_new", "subscription": "sub_1"})))
            .await
            .unwrap();

        assert!(f.invoices.find("in_old").await.unwrap().is_none());
        assert!(f.invoices.find("in_new").await.unwrap().is_some());
    }
}
