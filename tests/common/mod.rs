//! Shared harness for billing integration tests.
//!
//! Wires a full `BillingLedger` onto in-memory stores and the mock gateway,
//! keeping concrete handles to every store for assertions.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use billing_ledger::adapters::memory::{
    InMemoryCustomerLinkRepository, InMemoryInvoiceReferenceRepository, InMemoryLedgerRepository,
    InMemoryPlanCatalogRepository, InMemorySubscriptionPlanRepository,
    InMemoryWebhookEventRepository, RecordingOrganizationFeatures,
};
use billing_ledger::adapters::stripe::MockPaymentGateway;
use billing_ledger::application::{
    BillingLedger, BillingPorts, BillingSettings, CheckoutCommand, ReconcileWebhookCommand,
};
use billing_ledger::domain::billing::{sign_payload, PlanDefinition, PlanType, WebhookVerifier};
use serde_json::json;

pub const WEBHOOK_SECRET: &str = "whsec_integration";

pub struct Harness {
    pub ledger: BillingLedger,
    pub gateway: MockPaymentGateway,
    pub links: InMemoryCustomerLinkRepository,
    pub catalog: InMemoryPlanCatalogRepository,
    pub plans: InMemorySubscriptionPlanRepository,
    pub entries: InMemoryLedgerRepository,
    pub invoices: InMemoryInvoiceReferenceRepository,
    pub events: InMemoryWebhookEventRepository,
    pub organizations: RecordingOrganizationFeatures,
}

impl Harness {
    pub fn new() -> Self {
        let gateway = MockPaymentGateway::new();
        let links = InMemoryCustomerLinkRepository::new();
        let catalog = InMemoryPlanCatalogRepository::new();
        let plans = InMemorySubscriptionPlanRepository::new();
        let entries = InMemoryLedgerRepository::new();
        let invoices = InMemoryInvoiceReferenceRepository::new();
        let events = InMemoryWebhookEventRepository::new();
        let organizations = RecordingOrganizationFeatures::new();

        let ports = BillingPorts {
            links: Arc::new(links.clone()),
            catalog: Arc::new(catalog.clone()),
            plans: Arc::new(plans.clone()),
            ledger: Arc::new(entries.clone()),
            invoices: Arc::new(invoices.clone()),
            events: Arc::new(events.clone()),
            organizations: Arc::new(organizations.clone()),
            gateway: Arc::new(gateway.clone()),
        };
        let settings = BillingSettings::default()
            .with_gateway_timeout(Duration::from_secs(2))
            .with_invoice_lookup_retry_delay(Duration::from_millis(5));

        Self {
            ledger: BillingLedger::new(ports, WebhookVerifier::new(WEBHOOK_SECRET), settings),
            gateway,
            links,
            catalog,
            plans,
            entries,
            invoices,
            events,
            organizations,
        }
    }

    /// Seeds the default row of a plan type plus an optional coupon row.
    pub async fn seed_price(&self, plan_type: PlanType, coupon: &str, monthly: i64, annual: i64) {
        let row = PlanDefinition::new(plan_type, coupon, monthly, annual).unwrap();
        self.ledger.pricing.add_plan_definition(row).await.unwrap();
    }

    /// Seeds the published professional prices and the 25OFF coupon.
    pub async fn seed_professional_catalog(&self) {
        self.seed_price(PlanType::ProfessionalMonthly, "", 15000, 150000)
            .await;
        self.seed_price(PlanType::ProfessionalMonthly, "25OFF", 12500, 125000)
            .await;
    }
}

pub fn one_time_checkout(purchaser_id: &str, amount_cents: i64) -> CheckoutCommand {
    CheckoutCommand {
        purchaser_id: purchaser_id.to_string(),
        amount_cents,
        is_recurring: false,
        coupon_code: Some(String::new()),
        plan_type: Some(String::new()),
        ..Default::default()
    }
}

pub fn organization_checkout(
    purchaser_id: &str,
    organization_id: &str,
    plan_type: &str,
    coupon: &str,
) -> CheckoutCommand {
    CheckoutCommand {
        purchaser_id: purchaser_id.to_string(),
        is_organization_plan: true,
        is_recurring: true,
        plan_type: Some(plan_type.to_string()),
        coupon_code: Some(coupon.to_string()),
        beneficiary_org_id: Some(organization_id.to_string()),
        amount_cents: 1,
        ..Default::default()
    }
}

/// Builds a webhook delivery signed with the harness secret.
pub fn signed_event(
    event_id: &str,
    event_type: &str,
    object: serde_json::Value,
) -> ReconcileWebhookCommand {
    let now = chrono::Utc::now().timestamp();
    let payload = json!({
        "id": event_id,
        "type": event_type,
        "created": now,
        "data": { "object": object },
    })
    .to_string();
    ReconcileWebhookCommand {
        signature: sign_payload(WEBHOOK_SECRET, now, &payload),
        payload: payload.into_bytes(),
    }
}
