//! Stripe payment gateway adapter.
//!
//! Implements `PaymentGateway` over the Stripe REST API using form-encoded
//! requests and basic auth with the secret key.
//!
//! # Configuration
//!
//! ```ignore
//! let config = StripeConfig::new(api_key).with_request_timeout(Duration::from_secs(10));
//! let gateway = StripePaymentGateway::new(config)?;
//! ```

use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;

use crate::ports::{
    Charge, CreateChargeRequest, CreateCustomerRequest, CreateSubscriptionRequest, Customer,
    PaymentError, PaymentGateway, Refund, Subscription, UpcomingInvoice,
};

use super::api_types::{
    map_error_response, StripeCharge, StripeCustomer, StripeList, StripeRefund,
    StripeSubscription, StripeUpcomingInvoice, RESOURCE_ALREADY_EXISTS,
};

const DEFAULT_API_BASE_URL: &str = "https://api.stripe.com";

/// Stripe API configuration.
#[derive(Clone)]
pub struct StripeConfig {
    /// Secret API key (sk_live_... or sk_test_...).
    api_key: SecretString,

    api_base_url: String,

    request_timeout: Duration,
}

impl StripeConfig {
    pub fn new(api_key: SecretString) -> Self {
        Self {
            api_key,
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            request_timeout: Duration::from_secs(10),
        }
    }

    /// Set a custom API base URL (for testing against a local stub).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = url.into();
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

/// Stripe payment gateway.
pub struct StripePaymentGateway {
    config: StripeConfig,
    http_client: reqwest::Client,
}

impl StripePaymentGateway {
    pub fn new(config: StripeConfig) -> Result<Self, PaymentError> {
        let http_client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| PaymentError::network(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            config,
            http_client,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.api_base_url, path)
    }

    async fn post_form<T: DeserializeOwned>(
        &self,
        operation: &'static str,
        path: &str,
        params: &[(String, String)],
        idempotency_key: Option<&str>,
    ) -> Result<T, PaymentError> {
        let mut request = self
            .http_client
            .post(self.url(path))
            .basic_auth(self.config.api_key.expose_secret(), Option::<&str>::None)
            .form(params);
        if let Some(key) = idempotency_key {
            request = request.header("Idempotency-Key", key);
        }
        self.send(operation, request).await
    }

    async fn get<T: DeserializeOwned>(
        &self,
        operation: &'static str,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, PaymentError> {
        let request = self
            .http_client
            .get(self.url(path))
            .basic_auth(self.config.api_key.expose_secret(), Option::<&str>::None)
            .query(query);
        self.send(operation, request).await
    }

    async fn delete<T: DeserializeOwned>(
        &self,
        operation: &'static str,
        path: &str,
    ) -> Result<T, PaymentError> {
        let request = self
            .http_client
            .delete(self.url(path))
            .basic_auth(self.config.api_key.expose_secret(), Option::<&str>::None);
        self.send(operation, request).await
    }

    async fn send<T: DeserializeOwned>(
        &self,
        operation: &'static str,
        request: reqwest::RequestBuilder,
    ) -> Result<T, PaymentError> {
        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                PaymentError::timeout(operation)
            } else {
                PaymentError::network(format!("{} failed: {}", operation, e))
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let error = map_error_response(status.as_u16(), &body);
            tracing::warn!(
                operation,
                http_status = status.as_u16(),
                code = %error.code,
                provider_code = ?error.provider_code,
                "Stripe request failed"
            );
            return Err(error);
        }

        response.json::<T>().await.map_err(|e| {
            PaymentError::new(
                crate::ports::PaymentErrorCode::ProviderError,
                format!("Failed to parse Stripe response for {}: {}", operation, e),
            )
        })
    }

    /// Create the recurring plan if Stripe does not know it yet.
    async fn ensure_plan(&self, request: &CreateSubscriptionRequest) -> Result<(), PaymentError> {
        let params = vec![
            ("id".to_string(), request.plan_id.clone()),
            ("amount".to_string(), request.amount_cents.to_string()),
            ("currency".to_string(), request.currency.clone()),
            ("interval".to_string(), request.interval.as_str().to_string()),
            ("product[name]".to_string(), request.product_name.clone()),
        ];
        match self
            .post_form::<serde_json::Value>("create_plan", "/v1/plans", &params, None)
            .await
        {
            Ok(_) => Ok(()),
            Err(e) if e.provider_code.as_deref() == Some(RESOURCE_ALREADY_EXISTS) => {
                tracing::debug!(plan_id = %request.plan_id, "Stripe plan already exists");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}

fn metadata_params(
    metadata: &std::collections::HashMap<String, String>,
) -> impl Iterator<Item = (String, String)> + '_ {
    metadata
        .iter()
        .map(|(k, v)| (format!("metadata[{}]", k), v.clone()))
}

#[async_trait]
impl PaymentGateway for StripePaymentGateway {
    async fn create_customer(
        &self,
        request: CreateCustomerRequest,
    ) -> Result<Customer, PaymentError> {
        let mut params = vec![(
            "metadata[purchaser_id]".to_string(),
            request.purchaser_id.to_string(),
        )];
        if let Some(email) = &request.email {
            params.push(("email".to_string(), email.clone()));
        }

        let customer: StripeCustomer = self
            .post_form(
                "create_customer",
                "/v1/customers",
                &params,
                request.idempotency_key.as_deref(),
            )
            .await?;
        Ok(customer.into())
    }

    async fn create_charge(&self, request: CreateChargeRequest) -> Result<Charge, PaymentError> {
        let mut params = vec![
            ("customer".to_string(), request.customer_id.clone()),
            ("amount".to_string(), request.amount_cents.to_string()),
            ("currency".to_string(), request.currency.clone()),
            ("description".to_string(), request.description.clone()),
        ];
        params.extend(metadata_params(&request.metadata));

        let charge: StripeCharge = self
            .post_form(
                "create_charge",
                "/v1/charges",
                &params,
                request.idempotency_key.as_deref(),
            )
            .await?;
        Ok(charge.into_charge(&request.customer_id))
    }

    async fn create_subscription(
        &self,
        request: CreateSubscriptionRequest,
    ) -> Result<Subscription, PaymentError> {
        self.ensure_plan(&request).await?;

        let mut params = vec![
            ("customer".to_string(), request.customer_id.clone()),
            ("items[0][plan]".to_string(), request.plan_id.clone()),
        ];
        params.extend(metadata_params(&request.metadata));

        let subscription: StripeSubscription = self
            .post_form(
                "create_subscription",
                "/v1/subscriptions",
                &params,
                request.idempotency_key.as_deref(),
            )
            .await?;
        Ok(subscription.into())
    }

    async fn cancel_subscription(
        &self,
        subscription_id: &str,
    ) -> Result<Subscription, PaymentError> {
        let subscription: StripeSubscription = self
            .delete(
                "cancel_subscription",
                &format!("/v1/subscriptions/{}", subscription_id),
            )
            .await?;
        Ok(subscription.into())
    }

    async fn list_subscriptions(
        &self,
        customer_id: &str,
        limit: u32,
    ) -> Result<Vec<Subscription>, PaymentError> {
        let list: StripeList<StripeSubscription> = self
            .get(
                "list_subscriptions",
                "/v1/subscriptions",
                &[
                    ("customer", customer_id.to_string()),
                    ("limit", limit.to_string()),
                    ("status", "all".to_string()),
                ],
            )
            .await?;
        Ok(list.data.into_iter().map(Subscription::from).collect())
    }

    async fn retrieve_upcoming_invoice(
        &self,
        subscription_id: &str,
    ) -> Result<UpcomingInvoice, PaymentError> {
        let invoice: StripeUpcomingInvoice = self
            .get(
                "retrieve_upcoming_invoice",
                "/v1/invoices/upcoming",
                &[("subscription", subscription_id.to_string())],
            )
            .await?;
        Ok(invoice.into())
    }

    async fn create_refund(&self, charge_id: &str) -> Result<Refund, PaymentError> {
        let refund: StripeRefund = self
            .post_form(
                "create_refund",
                "/v1/refunds",
                &[("charge".to_string(), charge_id.to_string())],
                Some(&format!("refund-{}", charge_id)),
            )
            .await?;
        Ok(refund.into())
    }
}
