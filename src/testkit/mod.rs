//! Shared test utilities available to both unit and integration tests.
//!
//! Enabled via `#[cfg(test)]` (unit tests) or the `testkit` feature
//! (integration tests).
//!
//! # Modules
//!
//! - [`client`]: mock producer/consumer clients with call counters, failure
//!   injection and cancellation-aware blocking, plus a connector that always
//!   fails.
//! - [`worker`]: a scriptable [`Worker`](crate::worker::Worker) and factory for
//!   exercising pool lifecycle without a client.
//! - [`config`]: canonical test configurations.

pub mod client;
pub mod config;
pub mod worker;
