//! Rolling price history and adaptive buy/sell thresholds.

use std::collections::VecDeque;

use serde::Serialize;

/// Number of cleared prices retained.
pub const HISTORY_WINDOW: usize = 50;
/// Below this many samples thresholds fall back to the mean.
pub const TRIM_MIN_SAMPLES: usize = 20;
/// Samples dropped from each end before taking trimmed extremes.
pub const TRIM_EACH_END: usize = 5;

/// Bounded FIFO of recently cleared prices.
#[derive(Debug, Clone, Serialize)]
pub struct PriceHistory {
    prices: VecDeque<f64>,
    capacity: usize,
}

impl Default for PriceHistory {
    fn default() -> Self {
        Self::with_capacity(HISTORY_WINDOW)
    }
}

impl PriceHistory {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            prices: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
        }
    }

    /// Appends a price, evicting the oldest once full.
    ///
    /// Non-finite prices are ignored; returns whether the price was kept.
    pub fn push(&mut self, price: f64) -> bool {
        if !price.is_finite() {
            return false;
        }
        if self.prices.len() == self.capacity {
            self.prices.pop_front();
        }
        self.prices.push_back(price);
        true
    }

    pub fn len(&self) -> usize {
        self.prices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prices.is_empty()
    }

    pub fn latest(&self) -> Option<f64> {
        self.prices.back().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = f64> + '_ {
        self.prices.iter().copied()
    }

    pub fn mean(&self) -> Option<f64> {
        if self.prices.is_empty() {
            return None;
        }
        Some(self.prices.iter().sum::<f64>() / self.prices.len() as f64)
    }
}

/// Storage decision boundaries derived from the price history.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct Thresholds {
    /// Prices strictly below this trigger charging.
    pub buy_below: f64,
    /// Prices strictly above this trigger discharging.
    pub sell_above: f64,
}

impl Thresholds {
    /// `true` when `buy_below > sell_above`, which happens only for a
    /// negative mean in the short-history branch.
    pub fn is_inverted(&self) -> bool {
        self.buy_below > self.sell_above
    }
}

/// Recomputes [`Thresholds`] from the full window on every new price.
///
/// # Examples
///
/// ```
/// use prosumer_market::market::ThresholdLearner;
///
/// let mut learner = ThresholdLearner::default();
/// learner.update(2.0);
/// let t = learner.update(4.0);
/// assert_eq!(t.buy_below, 3.0);
/// assert_eq!(t.sell_above, 4.5);
/// ```
#[derive(Debug, Clone, Default)]
pub struct ThresholdLearner {
    history: PriceHistory,
    thresholds: Thresholds,
}

impl ThresholdLearner {
    pub fn update(&mut self, price: f64) -> Thresholds {
        if self.history.push(price) {
            self.thresholds = derive_thresholds(&self.history);
        }
        self.thresholds
    }

    /// Latest thresholds; `{0, 0}` until the first finite price.
    pub fn thresholds(&self) -> Thresholds {
        self.thresholds
    }

    pub fn history(&self) -> &PriceHistory {
        &self.history
    }
}

fn derive_thresholds(history: &PriceHistory) -> Thresholds {
    if history.len() < TRIM_MIN_SAMPLES {
        let buy_below = history.mean().unwrap_or(0.0);
        return Thresholds {
            buy_below,
            sell_above: 1.5 * buy_below,
        };
    }

    let mut sorted: Vec<f64> = history.iter().collect();
    sorted.sort_by(f64::total_cmp);
    let trimmed = &sorted[TRIM_EACH_END..sorted.len() - TRIM_EACH_END];
    Thresholds {
        buy_below: trimmed[0],
        sell_above: trimmed[trimmed.len() - 1],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn history_is_bounded_fifo() {
        let mut h = PriceHistory::default();
        for i in 0..60 {
            h.push(i as f64);
        }
        assert_eq!(h.len(), HISTORY_WINDOW);
        assert_eq!(h.iter().next(), Some(10.0));
        assert_eq!(h.latest(), Some(59.0));
    }

    #[test]
    fn non_finite_prices_are_ignored() {
        let mut l = ThresholdLearner::default();
        l.update(2.0);
        let t = l.update(f64::NAN);
        assert_eq!(l.history().len(), 1);
        assert_eq!(t.buy_below, 2.0);
        l.update(f64::INFINITY);
        assert_eq!(l.history().len(), 1);
    }

    #[test]
    fn single_sample_uses_mean() {
        let mut l = ThresholdLearner::default();
        let t = l.update(2.0);
        assert_eq!(t.buy_below, 2.0);
        assert_eq!(t.sell_above, 3.0);
    }

    #[test]
    fn short_history_mean_branch() {
        let mut l = ThresholdLearner::default();
        let mut t = Thresholds::default();
        for p in 1..=19 {
            t = l.update(p as f64);
        }
        assert_eq!(t.buy_below, 10.0);
        assert_eq!(t.sell_above, 15.0);
    }

    #[test]
    fn trimmed_branch_at_twenty_samples() {
        let mut l = ThresholdLearner::default();
        let mut t = Thresholds::default();
        // Feed in shuffled order; trimming sorts a copy.
        for p in [20, 3, 17, 1, 9, 14, 6, 11, 2, 19, 8, 15, 4, 13, 7, 18, 5, 12, 10, 16] {
            t = l.update(p as f64);
        }
        assert_eq!(t.buy_below, 6.0);
        assert_eq!(t.sell_above, 15.0);
    }

    #[test]
    fn trimmed_branch_follows_window() {
        let mut l = ThresholdLearner::default();
        let mut t = Thresholds::default();
        for p in 0..100 {
            t = l.update(p as f64);
        }
        // Window holds 50..=99; drop 5 at each end.
        assert_eq!(t.buy_below, 55.0);
        assert_eq!(t.sell_above, 94.0);
    }

    #[test]
    fn negative_mean_inverts_thresholds() {
        let mut l = ThresholdLearner::default();
        let t = l.update(-2.0);
        assert_eq!(t.buy_below, -2.0);
        assert_eq!(t.sell_above, -3.0);
        assert!(t.is_inverted());
    }

    #[test]
    fn fresh_learner_reports_zero() {
        let l = ThresholdLearner::default();
        assert_eq!(l.thresholds(), Thresholds::default());
        assert!(!l.thresholds().is_inverted());
    }
}
