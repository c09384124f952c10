//! Billing error taxonomy.
//!
//! Orchestrators never surface these to callers; they are folded into
//! the structured results in `outcome`.

use thiserror::Error;

use super::decline;
use crate::domain::foundation::{DomainError, ValidationError};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BillingError {
    /// Input rejected before any gateway call.
    #[error("Validation failed for '{field}': {message}")]
    Validation { field: String, message: String },

    /// Card or bank declined. Never retried automatically.
    #[error("Gateway declined: {raw_message}")]
    GatewayDecline {
        decline_code: Option<String>,
        http_status: Option<u16>,
        raw_message: String,
    },

    /// Network failure, timeout or gateway 5xx. Safe to retry the whole request.
    #[error("Gateway unavailable: {0}")]
    GatewayTransient(String),

    /// A referenced record does not exist locally (yet).
    #[error("Reconciliation conflict: {0}")]
    ReconciliationConflict(String),

    #[error("Infrastructure error: {0}")]
    Infrastructure(String),
}

impl BillingError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        BillingError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Message safe to show the purchaser.
    pub fn purchaser_message(&self) -> String {
        match self {
            BillingError::Validation { message, .. } => message.clone(),
            BillingError::GatewayDecline {
                decline_code,
                http_status,
                raw_message,
            } => decline::purchaser_message(*http_status, decline_code.as_deref(), raw_message)
                .to_string(),
            _ => decline::GENERIC_FAILURE_MESSAGE.to_string(),
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            BillingError::GatewayTransient(_)
                | BillingError::ReconciliationConflict(_)
                | BillingError::Infrastructure(_)
        )
    }
}

impl From<DomainError> for BillingError {
    fn from(err: DomainError) -> Self {
        BillingError::Infrastructure(err.to_string())
    }
}

impl From<ValidationError> for BillingError {
    fn from(err: ValidationError) -> Self {
        let field = match &err {
            ValidationError::EmptyField { field }
            | ValidationError::InvalidFormat { field, .. } => field.clone(),
        };
        BillingError::Validation {
            field,
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decline_uses_translated_message() {
        let err = BillingError::GatewayDecline {
            decline_code: Some("invalid_cvc".to_string()),
            http_status: Some(402),
            raw_message: "Your card's security code is incorrect.".to_string(),
        };
        assert_eq!(
            err.purchaser_message(),
            "Your CVC number is incorrect. Please enter the correct number and try again."
        );
        assert!(!err.is_retryable());
    }

    #[test]
    fn transient_errors_hide_internal_details() {
        let err = BillingError::GatewayTransient("connection reset by peer".to_string());
        assert_eq!(err.purchaser_message(), decline::GENERIC_FAILURE_MESSAGE);
        assert!(err.is_retryable());
    }

    #[test]
    fn validation_error_keeps_field_name() {
        let err: BillingError = ValidationError::empty_field("purchaser_id").into();
        assert!(matches!(err, BillingError::Validation { ref field, .. } if field == "purchaser_id"));
    }
}
