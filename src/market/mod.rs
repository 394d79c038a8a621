//! Auction market core: curves, synthesis, threshold learning, clearing and
//! the round protocol.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Clearing engine: aggregation and price discovery.
pub mod clearing;
/// Price grid and price-quantity curves, including the wire format.
pub mod curve;
/// Rolling price history and buy/sell threshold derivation.
pub mod learner;
/// Round lifecycle state machine run by the coordinator.
pub mod protocol;
/// Sigmoid and linear bid-curve synthesis.
pub mod synth;

pub use clearing::{ClearingResult, CrossingRule};
pub use curve::{PriceGrid, PriceQuantityCurve};
pub use learner::{PriceHistory, ThresholdLearner, Thresholds};
pub use protocol::{Coordinator, Message, RoundId, RoundPhase};

/// Unique identity of a market participant.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParticipantId(String);

impl ParticipantId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ParticipantId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}
