//! Shared test fixtures for integration tests.

#![allow(dead_code)]

use prosumer_market::agents::{Bidder, Commitment, ParticipantStep};
use prosumer_market::config::ScenarioConfig;
use prosumer_market::market::protocol::CoordinatorConfig;
use prosumer_market::market::{ParticipantId, PriceGrid, PriceQuantityCurve, RoundId};
use prosumer_market::sim::engine::Engine;
use prosumer_market::sim::types::{MarketSchedule, SimConfig};

/// Four-point grid `[0, 1, 2, 3]` used by the hand-checked clearing cases.
pub fn small_grid() -> PriceGrid {
    PriceGrid::from_prices(vec![0.0, 1.0, 2.0, 3.0])
}

/// Curve over `small_grid()`.
pub fn curve(values: &[f64]) -> PriceQuantityCurve {
    PriceQuantityCurve::new(small_grid().prices().to_vec(), values.to_vec())
        .expect("curve matches grid")
}

/// Bidder that always proposes the same curve.
pub struct FixedBidder {
    id: ParticipantId,
    latency_secs: u64,
    values: Vec<f64>,
    commitment: Commitment,
}

impl FixedBidder {
    pub fn boxed(id: &str, latency_secs: u64, values: &[f64]) -> Box<dyn Bidder> {
        Box::new(Self {
            id: ParticipantId::from(id),
            latency_secs,
            values: values.to_vec(),
            commitment: Commitment::Pending,
        })
    }
}

impl Bidder for FixedBidder {
    fn id(&self) -> &ParticipantId {
        &self.id
    }

    fn latency_secs(&self) -> u64 {
        self.latency_secs
    }

    fn propose(&mut self, _now: u64, _round: RoundId, grid: &PriceGrid) -> Option<Vec<u8>> {
        PriceQuantityCurve::new(grid.prices().to_vec(), self.values.clone())
            .and_then(|c| c.to_payload())
            .ok()
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

/// Engine over `small_grid()` with hourly steps and rounds from t = 0.
pub fn small_engine(bidders: Vec<Box<dyn Bidder>>) -> Engine {
    let mut engine = Engine::new(
        SimConfig::new(3600, 4 * 3600, 42),
        MarketSchedule::new(0, 3600),
        small_grid(),
        CoordinatorConfig {
            round_timeout_secs: 600,
            settle_timeout_secs: 600,
            ..CoordinatorConfig::default()
        },
    );
    for b in bidders {
        engine.add_bidder(b);
    }
    engine
}

/// Baseline scenario shortened to two days with rounds from the start.
pub fn short_baseline() -> ScenarioConfig {
    let mut cfg = ScenarioConfig::baseline();
    cfg.simulation.duration_secs = 2 * 86_400;
    cfg.market.market_start_secs = 0;
    cfg
}
