//! Adapters - Implementations of port interfaces.
//!
//! Adapters connect the domain to external systems:
//! - `postgres` - sqlx-backed repositories and migrations
//! - `stripe` - Stripe REST gateway plus a mock for tests
//! - `memory` - In-memory repositories for tests and local runs

pub mod memory;
pub mod postgres;
pub mod stripe;
