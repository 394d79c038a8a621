//! Error types for the market core and scenario configuration.

use thiserror::Error;

use crate::market::protocol::{RoundId, RoundPhase};

/// Errors raised by the coordinator and the curve codec.
///
/// None of these are fatal to a run: the engine logs them and the affected
/// participant is skipped for the current round only.
#[derive(Error, Debug)]
pub enum MarketError {
    #[error("curve from {participant} does not match the reference price grid")]
    GridMismatch { participant: String },

    #[error("malformed curve: {0}")]
    MalformedCurve(String),

    #[error("curve payload codec: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("stale round: expected {expected}, got {got}")]
    StaleRound { expected: RoundId, got: RoundId },

    #[error("unknown participant: {0}")]
    UnknownParticipant(String),

    #[error("coordinator is not collecting proposals (phase {phase})")]
    NotCollecting { phase: RoundPhase },

    #[error("coordinator is not awaiting acknowledgements (phase {phase})")]
    NotSettling { phase: RoundPhase },

    #[error("no round in flight")]
    NoRoundInFlight,
}

/// Configuration error with field path and constraint description.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("config error: {field}: {message}")]
pub struct ConfigError {
    /// Dotted field path (e.g., `"market.grid_points"`).
    pub field: String,
    /// Human-readable constraint description.
    pub message: String,
}

impl ConfigError {
    pub(crate) fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}
