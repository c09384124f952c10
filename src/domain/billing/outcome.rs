//! Structured results returned by the synchronous entry points.
//!
//! Checkout, cancellation and refund requests never raise to their
//! caller; every path ends in one of these results.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::errors::BillingError;
use crate::domain::foundation::Timestamp;

/// Side effects and degradations worth surfacing next to the main outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OutcomeTag {
    CustomerCreated,
    RedemptionCounted,
    DefaultPriceApplied,
    FeatureTierUpdated,
    FeatureTierUpdateFailed,
    LedgerWriteFailed,
    LedgerAlreadyRecorded,
    SubscriptionIdBackfilled,
    LedgerStamped,
    GatewayCallSkipped,
}

macro_rules! status_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "SCREAMING_SNAKE_CASE")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.as_str())
            }
        }
    };
}

status_enum!(
    /// Outcome of a checkout request.
    CheckoutStatus {
        Charged => "CHARGED",
        SubscriptionCreated => "SUBSCRIPTION_CREATED",
        AlreadySubscribed => "ALREADY_SUBSCRIBED",
        MissingIdentity => "MISSING_IDENTITY",
        InvalidAmount => "INVALID_AMOUNT",
        InvalidPlanType => "INVALID_PLAN_TYPE",
        PriceNotFound => "PRICE_NOT_FOUND",
        Declined => "DECLINED",
        GatewayUnavailable => "GATEWAY_UNAVAILABLE",
        Failed => "FAILED",
    }
);

status_enum!(
    /// Outcome of a cancellation request.
    CancelStatus {
        Canceled => "CANCELED",
        PreviouslyCanceled => "PREVIOUSLY_CANCELED",
        MissingIdentity => "MISSING_IDENTITY",
        NotFound => "NOT_FOUND",
        CancelRequestFailed => "CANCEL_REQUEST_FAILED",
    }
);

status_enum!(
    /// Outcome of a purchaser refund request.
    RefundStatus {
        RefundPending => "REFUND_PENDING",
        AlreadyRefunded => "ALREADY_REFUNDED",
        MissingIdentity => "MISSING_IDENTITY",
        NotFound => "NOT_FOUND",
        NotRefundable => "NOT_REFUNDABLE",
        RefundRequestFailed => "REFUND_REQUEST_FAILED",
    }
);

impl CheckoutStatus {
    pub fn is_success(&self) -> bool {
        matches!(
            self,
            CheckoutStatus::Charged
                | CheckoutStatus::SubscriptionCreated
                | CheckoutStatus::AlreadySubscribed
        )
    }

    /// Status a failed checkout reports for an error.
    pub fn for_error(err: &BillingError) -> Self {
        match err {
            BillingError::Validation { .. } => CheckoutStatus::MissingIdentity,
            BillingError::GatewayDecline { .. } => CheckoutStatus::Declined,
            BillingError::GatewayTransient(_) => CheckoutStatus::GatewayUnavailable,
            BillingError::ReconciliationConflict(_) | BillingError::Infrastructure(_) => {
                CheckoutStatus::Failed
            }
        }
    }
}

/// Result of a checkout request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckoutResult {
    pub success: bool,
    pub status: CheckoutStatus,
    pub charge_id: Option<String>,
    pub subscription_id: Option<String>,
    pub customer_id: Option<String>,
    /// Amount actually charged or subscribed, after catalog re-pricing.
    pub amount_cents: i64,
    pub purchaser_message: Option<String>,
    pub tags: Vec<OutcomeTag>,
}

impl CheckoutResult {
    pub fn completed(status: CheckoutStatus, amount_cents: i64) -> Self {
        Self {
            success: status.is_success(),
            status,
            charge_id: None,
            subscription_id: None,
            customer_id: None,
            amount_cents,
            purchaser_message: None,
            tags: Vec::new(),
        }
    }

    pub fn failed(status: CheckoutStatus, purchaser_message: impl Into<String>) -> Self {
        Self {
            success: false,
            status,
            charge_id: None,
            subscription_id: None,
            customer_id: None,
            amount_cents: 0,
            purchaser_message: Some(purchaser_message.into()),
            tags: Vec::new(),
        }
    }

    pub fn from_error(err: &BillingError) -> Self {
        Self::failed(CheckoutStatus::for_error(err), err.purchaser_message())
    }

    pub fn has_tag(&self, tag: OutcomeTag) -> bool {
        self.tags.contains(&tag)
    }
}

/// Shown for any cancellation the gateway did not confirm.
pub const CANCEL_RETRY_MESSAGE: &str =
    "We could not cancel your subscription right now. Please try again later.";

/// Result of a cancellation request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CancelResult {
    pub success: bool,
    pub status: CancelStatus,
    pub external_subscription_id: Option<String>,
    pub canceled_at: Option<Timestamp>,
    pub ended_at: Option<Timestamp>,
    pub purchaser_message: Option<String>,
    pub tags: Vec<OutcomeTag>,
}

impl CancelResult {
    pub fn new(status: CancelStatus) -> Self {
        Self {
            success: matches!(status, CancelStatus::Canceled | CancelStatus::PreviouslyCanceled),
            status,
            external_subscription_id: None,
            canceled_at: None,
            ended_at: None,
            purchaser_message: None,
            tags: Vec::new(),
        }
    }

    pub fn failed(status: CancelStatus) -> Self {
        let mut result = Self::new(status);
        result.success = false;
        result.purchaser_message = Some(CANCEL_RETRY_MESSAGE.to_string());
        result
    }

    pub fn has_tag(&self, tag: OutcomeTag) -> bool {
        self.tags.contains(&tag)
    }
}

/// Result of a refund request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefundResult {
    pub success: bool,
    pub status: RefundStatus,
    pub refund_id: Option<String>,
    pub refunded_amount_cents: i64,
    pub purchaser_message: Option<String>,
}

impl RefundResult {
    pub fn new(status: RefundStatus, refunded_amount_cents: i64) -> Self {
        Self {
            success: matches!(status, RefundStatus::RefundPending | RefundStatus::AlreadyRefunded),
            status,
            refund_id: None,
            refunded_amount_cents,
            purchaser_message: None,
        }
    }

    pub fn failed(status: RefundStatus, purchaser_message: impl Into<String>) -> Self {
        Self {
            success: false,
            status,
            refund_id: None,
            refunded_amount_cents: 0,
            purchaser_message: Some(purchaser_message.into()),
        }
    }
}
