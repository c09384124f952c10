//! Domain layer containing business logic and domain types.
//!
//! # Module Organization
//!
//! - `foundation` - Shared domain primitives (IDs, timestamps, errors)
//! - `billing` - Pricing catalog, subscriptions, ledger and gateway events

pub mod billing;
pub mod foundation;
