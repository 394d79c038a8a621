use tracing::{debug, warn};

use crate::agents::{Bidder, Commitment, ParticipantStep};
use crate::market::synth::{Anchor, line_curve};
use crate::market::{ParticipantId, PriceGrid, RoundId};

/// The grid utility: bids the line through two `(price, quantity)` anchors.
///
/// With the default anchors it buys below the low anchor price and sells
/// increasingly more as the price rises.
#[derive(Debug, Clone)]
pub struct Utility {
    id: ParticipantId,
    latency_secs: u64,
    low: Anchor,
    high: Anchor,
    commitment: Commitment,
}

impl Utility {
    pub fn new(id: ParticipantId, latency_secs: u64, low: Anchor, high: Anchor) -> Self {
        Self {
            id,
            latency_secs,
            low,
            high,
            commitment: Commitment::Pending,
        }
    }
}

impl Bidder for Utility {
    fn id(&self) -> &ParticipantId {
        &self.id
    }

    fn latency_secs(&self) -> u64 {
        self.latency_secs
    }

    fn propose(&mut self, _now: u64, round: RoundId, grid: &PriceGrid) -> Option<Vec<u8>> {
        self.commitment = Commitment::Pending;
        match line_curve(grid, self.low, self.high).to_payload() {
            Ok(bytes) => {
                debug!(participant = %self.id, round = %round, "utility proposal");
                Some(bytes)
            }
            Err(e) => {
                warn!(participant = %self.id, error = %e, "failed to encode proposal");
                None
            }
        }
    }

    fn on_accept(&mut self, _round: RoundId, price: f64) {
        self.commitment = Commitment::Accepted(price);
    }

    fn on_reject(&mut self, _round: RoundId) {
        self.commitment = Commitment::Rejected;
    }

    fn commitment(&self) -> Commitment {
        self.commitment
    }

    fn step(&mut self, _now: u64) -> ParticipantStep {
        ParticipantStep::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::PriceQuantityCurve;

    #[test]
    fn proposes_line_curve() {
        let grid = PriceGrid::from_prices(vec![1.0, 3.0, 5.0]);
        let mut u = Utility::new(
            ParticipantId::from("utility"),
            0,
            Anchor::new(1.0, 0.0),
            Anchor::new(5.0, -50.0),
        );
        let bytes = u.propose(0, RoundId(1), &grid).unwrap();
        let curve = PriceQuantityCurve::from_payload(&bytes).unwrap();
        assert_eq!(curve.values(), &[0.0, -25.0, -50.0]);
        assert_eq!(u.commitment(), Commitment::Pending);

        u.on_accept(RoundId(1), 2.5);
        assert_eq!(u.commitment(), Commitment::Accepted(2.5));
    }
}
