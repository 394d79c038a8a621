//! Decentralized prosumer electricity market with auction clearing.

pub mod agents;
pub mod config;
pub mod devices;
pub mod error;
/// Curves, clearing, threshold learning and the round protocol.
pub mod market;
/// Scheduler-facing engine, clock and reporting.
pub mod sim;

#[cfg(feature = "api")]
pub mod api;
