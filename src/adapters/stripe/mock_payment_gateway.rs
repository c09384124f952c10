//! Mock payment gateway for testing.
//!
//! Configurable in-process implementation of `PaymentGateway` for unit
//! and integration tests. Supports:
//! - Deterministic ids (`cus_1`, `ch_1`, `sub_1`, `re_1`, ...)
//! - Error injection, per method or for the next call
//! - Call tracking
//! - A yield point in every call so concurrent tests interleave

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;

use crate::domain::billing::PaymentDetails;
use crate::ports::{
    Charge, CreateChargeRequest, CreateCustomerRequest, CreateSubscriptionRequest, Customer,
    PaymentError, PaymentGateway, Refund, Subscription, SubscriptionStatus, UpcomingInvoice,
};

/// Mock payment gateway for testing.
///
/// Clones share state, so a test can keep a handle for assertions after
/// handing one to a handler.
#[derive(Default)]
pub struct MockPaymentGateway {
    inner: Arc<Mutex<MockState>>,
}

#[derive(Default)]
struct MockState {
    counters: HashMap<&'static str, u32>,
    customers: HashMap<String, Customer>,
    charges: HashMap<String, Charge>,
    /// Insertion order doubles as creation order.
    subscriptions: Vec<Subscription>,
    refunded_charges: HashMap<String, Refund>,
    next_error: Option<PaymentError>,
    method_errors: HashMap<String, PaymentError>,
    call_log: Vec<MethodCall>,
}

/// Recorded method call for assertions.
#[derive(Debug, Clone)]
pub struct MethodCall {
    pub method: String,
    pub args: Vec<String>,
}

impl MockState {
    fn next_id(&mut self, prefix: &'static str) -> String {
        let counter = self.counters.entry(prefix).or_insert(0);
        *counter += 1;
        format!("{}_{}", prefix, counter)
    }
}

impl MockPaymentGateway {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Configuration Methods
    // ════════════════════════════════════════════════════════════════════════════

    /// Add a subscription the gateway already knows about.
    pub fn add_subscription(&self, subscription: Subscription) {
        self.state().subscriptions.push(subscription);
    }

    /// Set an error to return on the next call to any method.
    pub fn set_error(&self, error: PaymentError) {
        self.state().next_error = Some(error);
    }

    /// Set an error for every call of a specific method.
    pub fn set_method_error(&self, method: &str, error: PaymentError) {
        self.state().method_errors.insert(method.to_string(), error);
    }

    pub fn clear_errors(&self) {
        let mut state = self.state();
        state.next_error = None;
        state.method_errors.clear();
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Call Tracking
    // ════════════════════════════════════════════════════════════════════════════

    pub fn calls(&self) -> Vec<MethodCall> {
        self.state().call_log.clone()
    }

    pub fn was_called(&self, method: &str) -> bool {
        self.state().call_log.iter().any(|c| c.method == method)
    }

    pub fn call_count(&self, method: &str) -> usize {
        self.state()
            .call_log
            .iter()
            .filter(|c| c.method == method)
            .count()
    }

    pub fn clear_calls(&self) {
        self.state().call_log.clear();
    }

    pub fn subscription(&self, subscription_id: &str) -> Option<Subscription> {
        self.state()
            .subscriptions
            .iter()
            .find(|s| s.id == subscription_id)
            .cloned()
    }

    pub fn charge(&self, charge_id: &str) -> Option<Charge> {
        self.state().charges.get(charge_id).cloned()
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Internal Helpers
    // ════════════════════════════════════════════════════════════════════════════

    async fn enter(&self, method: &str, args: Vec<String>) -> Result<(), PaymentError> {
        self.state().call_log.push(MethodCall {
            method: method.to_string(),
            args,
        });
        tokio::task::yield_now().await;

        let mut state = self.state();
        if let Some(error) = state.method_errors.get(method) {
            return Err(error.clone());
        }
        if let Some(error) = state.next_error.take() {
            return Err(error);
        }
        Ok(())
    }
}

impl Clone for MockPaymentGateway {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

fn now_secs() -> i64 {
    chrono::Utc::now().timestamp()
}

#[async_trait]
impl PaymentGateway for MockPaymentGateway {
    async fn create_customer(
        &self,
        request: CreateCustomerRequest,
    ) -> Result<Customer, PaymentError> {
        self.enter(
            "create_customer",
            vec![
                request.purchaser_id.to_string(),
                request.email.clone().unwrap_or_default(),
            ],
        )
        .await?;

        let mut state = self.state();
        let customer = Customer {
            id: state.next_id("cus"),
            email: request.email,
            created_at: now_secs(),
        };
        state.customers.insert(customer.id.clone(), customer.clone());
        Ok(customer)
    }

    async fn create_charge(&self, request: CreateChargeRequest) -> Result<Charge, PaymentError> {
        self.enter(
            "create_charge",
            vec![
                request.customer_id.clone(),
                request.amount_cents.to_string(),
                request.currency.clone(),
            ],
        )
        .await?;

        let mut state = self.state();
        let charge = Charge {
            id: state.next_id("ch"),
            customer_id: request.customer_id,
            amount_cents: request.amount_cents,
            currency: request.currency,
            created_at: now_secs(),
            details: PaymentDetails {
                brand: Some("visa".to_string()),
                last4: Some("4242".to_string()),
                exp_month: Some(12),
                exp_year: Some(2030),
                network_status: Some("approved_by_network".to_string()),
                failure_message: None,
            },
        };
        state.charges.insert(charge.id.clone(), charge.clone());
        Ok(charge)
    }

    async fn create_subscription(
        &self,
        request: CreateSubscriptionRequest,
    ) -> Result<Subscription, PaymentError> {
        self.enter(
            "create_subscription",
            vec![
                request.customer_id.clone(),
                request.plan_id.clone(),
                request.amount_cents.to_string(),
            ],
        )
        .await?;

        let mut state = self.state();
        let subscription = Subscription {
            id: state.next_id("sub"),
            customer_id: request.customer_id,
            plan_id: Some(request.plan_id),
            status: SubscriptionStatus::Active,
            created_at: now_secs(),
            canceled_at: None,
            ended_at: None,
        };
        state.subscriptions.push(subscription.clone());
        Ok(subscription)
    }

    async fn cancel_subscription(
        &self,
        subscription_id: &str,
    ) -> Result<Subscription, PaymentError> {
        self.enter("cancel_subscription", vec![subscription_id.to_string()])
            .await?;

        let mut state = self.state();
        let subscription = state
            .subscriptions
            .iter_mut()
            .find(|s| s.id == subscription_id)
            .ok_or_else(|| PaymentError::not_found("Subscription"))?;

        if subscription.status == SubscriptionStatus::Canceled {
            return Err(PaymentError::invalid_request(format!(
                "Subscription {} is already canceled",
                subscription_id
            )));
        }

        let now = now_secs();
        subscription.status = SubscriptionStatus::Canceled;
        subscription.canceled_at = Some(now);
        subscription.ended_at = Some(now);
        Ok(subscription.clone())
    }

    async fn list_subscriptions(
        &self,
        customer_id: &str,
        limit: u32,
    ) -> Result<Vec<Subscription>, PaymentError> {
        self.enter(
            "list_subscriptions",
            vec![customer_id.to_string(), limit.to_string()],
        )
        .await?;

        let state = self.state();
        Ok(state
            .subscriptions
            .iter()
            .rev()
            .filter(|s| s.customer_id == customer_id)
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn retrieve_upcoming_invoice(
        &self,
        subscription_id: &str,
    ) -> Result<UpcomingInvoice, PaymentError> {
        self.enter("retrieve_upcoming_invoice", vec![subscription_id.to_string()])
            .await?;

        let state = self.state();
        let subscription = state
            .subscriptions
            .iter()
            .find(|s| s.id == subscription_id && !s.status.is_terminated())
            .ok_or_else(|| PaymentError::not_found("Upcoming invoice"))?;

        let period_start = subscription.created_at;
        Ok(UpcomingInvoice {
            amount_due_cents: 0,
            period_start,
            period_end: period_start + 30 * 24 * 60 * 60,
        })
    }

    async fn create_refund(&self, charge_id: &str) -> Result<Refund, PaymentError> {
        self.enter("create_refund", vec![charge_id.to_string()]).await?;

        let mut state = self.state();
        if state.refunded_charges.contains_key(charge_id) {
            return Err(PaymentError::already_refunded(charge_id));
        }
        let amount_cents = state
            .charges
            .get(charge_id)
            .map(|c| c.amount_cents)
            .ok_or_else(|| PaymentError::not_found("Charge"))?;

        let refund = Refund {
            id: state.next_id("re"),
            charge_id: charge_id.to_string(),
            amount_cents,
            status: "pending".to_string(),
        };
        state
            .refunded_charges
            .insert(charge_id.to_string(), refund.clone());
        Ok(refund)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::billing::BillingInterval;
    use crate::domain::foundation::PurchaserId;

    fn charge_request(customer_id: &str, amount_cents: i64) -> CreateChargeRequest {
        CreateChargeRequest {
            customer_id: customer_id.to_string(),
            amount_cents,
            currency: "usd".to_string(),
            description: "Donation".to_string(),
            metadata: HashMap::new(),
            idempotency_key: None,
        }
    }

    fn subscription_request(customer_id: &str) -> CreateSubscriptionRequest {
        CreateSubscriptionRequest {
            customer_id: customer_id.to_string(),
            plan_id: "PROFESSIONAL_MONTHLY-25OFF-12500".to_string(),
            amount_cents: 12500,
            currency: "usd".to_string(),
            interval: BillingInterval::Month,
            product_name: "Professional".to_string(),
            metadata: HashMap::new(),
            idempotency_key: None,
        }
    }

    #[tokio::test]
    async fn ids_are_sequential_per_prefix() {
        let gateway = MockPaymentGateway::new();
        let customer = gateway
            .create_customer(CreateCustomerRequest {
                purchaser_id: PurchaserId::new("U1").unwrap(),
                email: None,
                idempotency_key: None,
            })
            .await
            .unwrap();
        let first = gateway.create_charge(charge_request(&customer.id, 100)).await.unwrap();
        let second = gateway.create_charge(charge_request(&customer.id, 200)).await.unwrap();

        assert_eq!(customer.id, "cus_1");
        assert_eq!(first.id, "ch_1");
        assert_eq!(second.id, "ch_2");
    }

    #[tokio::test]
    async fn method_error_is_returned_and_call_still_logged() {
        let gateway = MockPaymentGateway::new();
        gateway.set_method_error(
            "create_charge",
            PaymentError::card_declined("insufficient_funds", "declined"),
        );

        let result = gateway.create_charge(charge_request("cus_1", 100)).await;

        assert!(result.is_err());
        assert_eq!(gateway.call_count("create_charge"), 1);
    }

    #[tokio::test]
    async fn next_error_is_consumed_once() {
        let gateway = MockPaymentGateway::new();
        gateway.set_error(PaymentError::network("connection reset"));

        assert!(gateway.create_charge(charge_request("cus_1", 100)).await.is_err());
        assert!(gateway.create_charge(charge_request("cus_1", 100)).await.is_ok());
    }

    #[tokio::test]
    async fn cancel_twice_is_rejected() {
        let gateway = MockPaymentGateway::new();
        let subscription = gateway
            .create_subscription(subscription_request("cus_1"))
            .await
            .unwrap();

        let canceled = gateway.cancel_subscription(&subscription.id).await.unwrap();
        assert_eq!(canceled.status, SubscriptionStatus::Canceled);
        assert!(canceled.canceled_at.is_some());
        assert!(gateway.cancel_subscription(&subscription.id).await.is_err());
    }

    #[tokio::test]
    async fn list_subscriptions_is_newest_first_and_limited() {
        let gateway = MockPaymentGateway::new();
        for _ in 0..3 {
            gateway.create_subscription(subscription_request("cus_1")).await.unwrap();
        }
        gateway.create_subscription(subscription_request("cus_2")).await.unwrap();

        let listed = gateway.list_subscriptions("cus_1", 2).await.unwrap();

        let ids: Vec<_> = listed.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["sub_3", "sub_2"]);
    }

    #[tokio::test]
    async fn second_refund_reports_already_refunded() {
        let gateway = MockPaymentGateway::new();
        let charge = gateway.create_charge(charge_request("cus_1", 2000)).await.unwrap();

        let refund = gateway.create_refund(&charge.id).await.unwrap();
        assert_eq!(refund.amount_cents, 2000);

        let err = gateway.create_refund(&charge.id).await.unwrap_err();
        assert_eq!(err.code, crate::ports::PaymentErrorCode::AlreadyRefunded);
    }
}
