//! Billing Ledger - subscriptions, one-time charges and refunds against a
//! payment gateway.
//!
//! Checkout writes to a local journal as it goes; gateway webhooks are then
//! reconciled into the same journal so that every charge, refund and
//! cancellation is recorded exactly once, whichever path sees it first.

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;
