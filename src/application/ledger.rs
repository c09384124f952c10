//! BillingLedger - wires every billing handler onto one set of ports.

use std::sync::Arc;

use sqlx::PgPool;

use super::handlers::{
    BillingSettings, CancelSubscriptionHandler, CheckoutHandler, CustomerRegistry,
    GetActivePlanHandler, GetPaymentHistoryHandler, MoveOrganizationDataHandler,
    MovePurchaserDataHandler, PricingCatalog,
    PruneInvoiceCacheHandler, ReconcileWebhookHandler, RequestRefundHandler,
};
use crate::adapters::memory::{
    InMemoryCustomerLinkRepository, InMemoryInvoiceReferenceRepository, InMemoryLedgerRepository,
    InMemoryPlanCatalogRepository, InMemorySubscriptionPlanRepository,
    InMemoryWebhookEventRepository, RecordingOrganizationFeatures,
};
use crate::adapters::postgres::{
    PostgresCustomerLinkRepository, PostgresInvoiceReferenceRepository, PostgresLedgerRepository,
    PostgresOrganizationFeatures, PostgresPlanCatalogRepository,
    PostgresSubscriptionPlanRepository, PostgresWebhookEventRepository,
};
use crate::domain::billing::WebhookVerifier;
use crate::ports::{
    CustomerLinkRepository, InvoiceReferenceRepository, LedgerRepository, OrganizationFeatures,
    PaymentGateway, PlanCatalogRepository, SubscriptionPlanRepository, WebhookEventRepository,
};

/// The ports a ledger runs against.
#[derive(Clone)]
pub struct BillingPorts {
    pub links: Arc<dyn CustomerLinkRepository>,
    pub catalog: Arc<dyn PlanCatalogRepository>,
    pub plans: Arc<dyn SubscriptionPlanRepository>,
    pub ledger: Arc<dyn LedgerRepository>,
    pub invoices: Arc<dyn InvoiceReferenceRepository>,
    pub events: Arc<dyn WebhookEventRepository>,
    pub organizations: Arc<dyn OrganizationFeatures>,
    pub gateway: Arc<dyn PaymentGateway>,
}

impl BillingPorts {
    /// Postgres-backed stores around the given gateway.
    pub fn postgres(pool: PgPool, gateway: Arc<dyn PaymentGateway>) -> Self {
        Self {
            links: Arc::new(PostgresCustomerLinkRepository::new(pool.clone())),
            catalog: Arc::new(PostgresPlanCatalogRepository::new(pool.clone())),
            plans: Arc::new(PostgresSubscriptionPlanRepository::new(pool.clone())),
            ledger: Arc::new(PostgresLedgerRepository::new(pool.clone())),
            invoices: Arc::new(PostgresInvoiceReferenceRepository::new(pool.clone())),
            events: Arc::new(PostgresWebhookEventRepository::new(pool.clone())),
            organizations: Arc::new(PostgresOrganizationFeatures::new(pool)),
            gateway,
        }
    }

    /// Fresh in-memory stores around the given gateway.
    pub fn in_memory(gateway: Arc<dyn PaymentGateway>) -> Self {
        Self {
            links: Arc::new(InMemoryCustomerLinkRepository::new()),
            catalog: Arc::new(InMemoryPlanCatalogRepository::new()),
            plans: Arc::new(InMemorySubscriptionPlanRepository::new()),
            ledger: Arc::new(InMemoryLedgerRepository::new()),
            invoices: Arc::new(InMemoryInvoiceReferenceRepository::new()),
            events: Arc::new(InMemoryWebhookEventRepository::new()),
            organizations: Arc::new(RecordingOrganizationFeatures::new()),
            gateway,
        }
    }
}

/// Every billing operation, sharing one pricing catalog and customer registry.
pub struct BillingLedger {
    pub ports: BillingPorts,
    pub pricing: Arc<PricingCatalog>,
    pub customers: Arc<CustomerRegistry>,
    pub checkout: CheckoutHandler,
    pub reconcile_webhook: ReconcileWebhookHandler,
    pub cancel_subscription: CancelSubscriptionHandler,
    pub request_refund: RequestRefundHandler,
    pub move_purchaser_data: MovePurchaserDataHandler,
    pub move_organization_data: MoveOrganizationDataHandler,
    pub prune_invoice_cache: PruneInvoiceCacheHandler,
    pub payment_history: GetPaymentHistoryHandler,
    pub active_plan: GetActivePlanHandler,
}

impl BillingLedger {
    pub fn new(ports: BillingPorts, verifier: WebhookVerifier, settings: BillingSettings) -> Self {
        let pricing = Arc::new(PricingCatalog::new(ports.catalog.clone()));
        let customers = Arc::new(CustomerRegistry::new(
            ports.links.clone(),
            ports.gateway.clone(),
            settings.gateway_timeout,
        ));

        let checkout = CheckoutHandler::new(
            pricing.clone(),
            customers.clone(),
            ports.plans.clone(),
            ports.ledger.clone(),
            ports.gateway.clone(),
            ports.organizations.clone(),
            settings.clone(),
        );
        let reconcile_webhook = ReconcileWebhookHandler::new(
            verifier,
            customers.clone(),
            ports.plans.clone(),
            ports.ledger.clone(),
            ports.invoices.clone(),
            ports.events.clone(),
            ports.organizations.clone(),
            settings.clone(),
        );
        let cancel_subscription = CancelSubscriptionHandler::new(
            ports.plans.clone(),
            ports.ledger.clone(),
            ports.links.clone(),
            ports.gateway.clone(),
            ports.organizations.clone(),
            settings.clone(),
        );
        let request_refund = RequestRefundHandler::new(
            ports.ledger.clone(),
            ports.gateway.clone(),
            settings.clone(),
        );
        let move_purchaser_data = MovePurchaserDataHandler::new(
            ports.links.clone(),
            ports.plans.clone(),
            ports.ledger.clone(),
        );
        let move_organization_data =
            MoveOrganizationDataHandler::new(ports.plans.clone(), ports.ledger.clone());
        let prune_invoice_cache =
            PruneInvoiceCacheHandler::new(ports.invoices.clone(), settings.invoice_retention_days);
        let payment_history =
            GetPaymentHistoryHandler::new(ports.ledger.clone(), settings.refund_window_days);
        let active_plan =
            GetActivePlanHandler::new(ports.plans.clone(), ports.gateway.clone(), settings);

        Self {
            ports,
            pricing,
            customers,
            checkout,
            reconcile_webhook,
            cancel_subscription,
            request_refund,
            move_purchaser_data,
            move_organization_data,
            prune_invoice_cache,
            payment_history,
            active_plan,
        }
    }
}
