//! Shared simulation context: current time, round archive and market price.

use crate::market::learner::PriceHistory;
use crate::market::protocol::RoundRecord;

/// State the engine accumulates across ticks.
#[derive(Debug, Clone, Default)]
pub struct SimulationContext {
    /// Timestamp of the most recent tick.
    pub now: u64,
    /// Latest clearing price, 0.0 until the first round clears.
    pub clear_price: f64,
    /// Recent clearing prices.
    pub history: PriceHistory,
    /// Closed and superseded rounds, oldest first.
    pub rounds: Vec<RoundRecord>,
}

impl SimulationContext {
    /// Publishes a newly cleared price.
    pub fn record_price(&mut self, price: f64) {
        if self.history.push(price) {
            self.clear_price = price;
        }
    }

    pub fn archive(&mut self, record: RoundRecord) {
        self.rounds.push(record);
    }
}
