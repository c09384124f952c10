//! Payment gateway port.
//!
//! Defines the contract for the external gateway (e.g., Stripe) that
//! holds customers, charges cards and runs recurring subscriptions.
//!
//! # Design
//!
//! - **Gateway agnostic**: typed requests and responses, no provider JSON
//! - **Idempotency keys**: every create call carries one so retries are safe
//! - **Errors carry HTTP status**: decline translation depends on it

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::billing::{BillingError, BillingInterval, PaymentDetails};
use crate::domain::foundation::PurchaserId;

/// Port for payment gateway integrations.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Create a customer in the gateway.
    async fn create_customer(
        &self,
        request: CreateCustomerRequest,
    ) -> Result<Customer, PaymentError>;

    /// Charge a customer once.
    async fn create_charge(&self, request: CreateChargeRequest) -> Result<Charge, PaymentError>;

    /// Start a recurring subscription, creating its plan if needed.
    async fn create_subscription(
        &self,
        request: CreateSubscriptionRequest,
    ) -> Result<Subscription, PaymentError>;

    /// Cancel a subscription immediately.
    async fn cancel_subscription(&self, subscription_id: &str)
        -> Result<Subscription, PaymentError>;

    /// List a customer's subscriptions, newest first.
    async fn list_subscriptions(
        &self,
        customer_id: &str,
        limit: u32,
    ) -> Result<Vec<Subscription>, PaymentError>;

    /// Preview the next invoice of a subscription.
    async fn retrieve_upcoming_invoice(
        &self,
        subscription_id: &str,
    ) -> Result<UpcomingInvoice, PaymentError>;

    /// Refund a charge in full.
    async fn create_refund(&self, charge_id: &str) -> Result<Refund, PaymentError>;
}

/// Request to create a customer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateCustomerRequest {
    /// Local purchaser, stored as gateway metadata.
    pub purchaser_id: PurchaserId,
    pub email: Option<String>,
    pub idempotency_key: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    pub id: String,
    pub email: Option<String>,
    /// Unix timestamp.
    pub created_at: i64,
}

/// Request to charge a customer once.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateChargeRequest {
    pub customer_id: String,
    pub amount_cents: i64,
    pub currency: String,
    pub description: String,
    pub metadata: HashMap<String, String>,
    pub idempotency_key: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Charge {
    pub id: String,
    pub customer_id: String,
    pub amount_cents: i64,
    pub currency: String,
    /// Unix timestamp.
    pub created_at: i64,
    pub details: PaymentDetails,
}

/// Request to start a subscription on a (possibly new) gateway plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateSubscriptionRequest {
    pub customer_id: String,
    pub plan_id: String,
    /// Plan price, used when the gateway plan must be created.
    pub amount_cents: i64,
    pub currency: String,
    pub interval: BillingInterval,
    pub product_name: String,
    pub metadata: HashMap<String, String>,
    pub idempotency_key: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    pub id: String,
    pub customer_id: String,
    pub plan_id: Option<String>,
    pub status: SubscriptionStatus,
    /// Unix timestamp.
    pub created_at: i64,
    pub canceled_at: Option<i64>,
    pub ended_at: Option<i64>,
}

/// Subscription status from the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Active,
    PastDue,
    Unpaid,
    Canceled,
    Incomplete,
    IncompleteExpired,
    Trialing,
    #[serde(other)]
    Unknown,
}

impl SubscriptionStatus {
    pub fn is_terminated(&self) -> bool {
        matches!(
            self,
            SubscriptionStatus::Canceled | SubscriptionStatus::IncompleteExpired
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpcomingInvoice {
    pub amount_due_cents: i64,
    /// Unix timestamps.
    pub period_start: i64,
    pub period_end: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Refund {
    pub id: String,
    pub charge_id: String,
    pub amount_cents: i64,
    pub status: String,
}

/// Errors from gateway operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentError {
    pub code: PaymentErrorCode,
    pub message: String,
    /// Gateway's own error code (e.g. `charge_already_refunded`).
    pub provider_code: Option<String>,
    /// Card decline reason, when the gateway reports one.
    pub decline_code: Option<String>,
    pub http_status: Option<u16>,
    pub retryable: bool,
}

impl PaymentError {
    pub fn new(code: PaymentErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            provider_code: None,
            decline_code: None,
            http_status: None,
            retryable: code.is_retryable(),
        }
    }

    pub fn with_provider_code(mut self, code: impl Into<String>) -> Self {
        self.provider_code = Some(code.into());
        self
    }

    pub fn with_decline_code(mut self, code: impl Into<String>) -> Self {
        self.decline_code = Some(code.into());
        self
    }

    pub fn with_http_status(mut self, status: u16) -> Self {
        self.http_status = Some(status);
        self
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(PaymentErrorCode::NetworkError, message)
    }

    pub fn timeout(operation: &str) -> Self {
        Self::new(
            PaymentErrorCode::Timeout,
            format!("{} timed out", operation),
        )
    }

    pub fn authentication(message: impl Into<String>) -> Self {
        Self::new(PaymentErrorCode::AuthenticationError, message).with_http_status(401)
    }

    /// Card decline; always reported with the card-error status.
    pub fn card_declined(decline_code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(PaymentErrorCode::CardDeclined, message)
            .with_decline_code(decline_code)
            .with_http_status(402)
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(PaymentErrorCode::InvalidRequest, message).with_http_status(400)
    }

    pub fn already_refunded(charge_id: &str) -> Self {
        Self::new(
            PaymentErrorCode::AlreadyRefunded,
            format!("Charge {} has already been refunded", charge_id),
        )
        .with_provider_code("charge_already_refunded")
        .with_http_status(400)
    }

    pub fn not_found(resource: &str) -> Self {
        Self::new(PaymentErrorCode::NotFound, format!("{} not found", resource))
            .with_http_status(404)
    }
}

impl std::fmt::Display for PaymentError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for PaymentError {}

impl From<PaymentError> for BillingError {
    fn from(err: PaymentError) -> Self {
        match err.code {
            PaymentErrorCode::NetworkError
            | PaymentErrorCode::Timeout
            | PaymentErrorCode::RateLimitExceeded
            | PaymentErrorCode::ProviderError => BillingError::GatewayTransient(err.message),
            PaymentErrorCode::CardDeclined
            | PaymentErrorCode::InvalidRequest
            | PaymentErrorCode::AlreadyRefunded => BillingError::GatewayDecline {
                decline_code: err.decline_code,
                http_status: err.http_status,
                raw_message: err.message,
            },
            PaymentErrorCode::AuthenticationError
            | PaymentErrorCode::NotFound
            | PaymentErrorCode::Unknown => BillingError::Infrastructure(err.to_string()),
        }
    }
}

/// Payment error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentErrorCode {
    NetworkError,
    Timeout,
    AuthenticationError,
    CardDeclined,
    InvalidRequest,
    AlreadyRefunded,
    NotFound,
    RateLimitExceeded,
    /// Gateway 5xx.
    ProviderError,
    Unknown,
}

impl PaymentErrorCode {
    /// Check if this error type is typically retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            PaymentErrorCode::NetworkError
                | PaymentErrorCode::Timeout
                | PaymentErrorCode::RateLimitExceeded
                | PaymentErrorCode::ProviderError
        )
    }
}

impl std::fmt::Display for PaymentErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PaymentErrorCode::NetworkError => "network_error",
            PaymentErrorCode::Timeout => "timeout",
            PaymentErrorCode::AuthenticationError => "authentication_error",
            PaymentErrorCode::CardDeclined => "card_declined",
            PaymentErrorCode::InvalidRequest => "invalid_request",
            PaymentErrorCode::AlreadyRefunded => "already_refunded",
            PaymentErrorCode::NotFound => "not_found",
            PaymentErrorCode::RateLimitExceeded => "rate_limit_exceeded",
            PaymentErrorCode::ProviderError => "provider_error",
            PaymentErrorCode::Unknown => "unknown",
        };
        write!(f, "{}", s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payment_gateway_is_object_safe() {
        fn _accepts_dyn(_gateway: &dyn PaymentGateway) {}
    }

    #[test]
    fn payment_error_retryable() {
        assert!(PaymentErrorCode::NetworkError.is_retryable());
        assert!(PaymentErrorCode::Timeout.is_retryable());
        assert!(PaymentErrorCode::RateLimitExceeded.is_retryable());

        assert!(!PaymentErrorCode::CardDeclined.is_retryable());
        assert!(!PaymentErrorCode::AlreadyRefunded.is_retryable());
    }

    #[test]
    fn card_decline_maps_to_gateway_decline() {
        let err: BillingError =
            PaymentError::card_declined("insufficient_funds", "Your card has insufficient funds.").into();

        match err {
            BillingError::GatewayDecline {
                decline_code,
                http_status,
                ..
            } => {
                assert_eq!(decline_code.as_deref(), Some("insufficient_funds"));
                assert_eq!(http_status, Some(402));
            }
            other => panic!("Expected GatewayDecline, got {:?}", other),
        }
    }

    #[test]
    fn network_error_maps_to_transient() {
        let err: BillingError = PaymentError::timeout("create_charge").into();
        assert!(matches!(err, BillingError::GatewayTransient(_)));
    }

    #[test]
    fn unknown_status_decodes_to_unknown() {
        let status: SubscriptionStatus = serde_json::from_str("\"paused\"").unwrap();
        assert_eq!(status, SubscriptionStatus::Unknown);
        assert!(SubscriptionStatus::Canceled.is_terminated());
    }

    #[test]
    fn payment_error_display() {
        let err = PaymentError::card_declined("generic_decline", "Your card was declined");
        assert!(err.to_string().contains("card_declined"));
        assert!(err.to_string().contains("Your card was declined"));
    }
}
