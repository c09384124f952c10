//! Stripe payment gateway adapter.
//!
//! - `StripePaymentGateway` talks to the Stripe REST API
//! - `MockPaymentGateway` is an in-process stand-in for tests
//!
//! Webhook signature verification lives in the domain
//! (`domain::billing::WebhookVerifier`) since it needs no I/O.

mod api_types;
mod mock_payment_gateway;
mod stripe_gateway;

pub use api_types::map_error_response;
pub use mock_payment_gateway::{MethodCall, MockPaymentGateway};
pub use stripe_gateway::{StripeConfig, StripePaymentGateway};
