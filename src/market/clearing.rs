//! Aggregation of conforming bids and clearing-price discovery.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::MarketError;

use super::ParticipantId;
use super::curve::{PriceGrid, PriceQuantityCurve};

/// How a price is picked inside the grid interval bracketing the crossing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CrossingRule {
    /// Centre of the bracketing interval.
    #[default]
    Midpoint,
    /// Zero of the line through the two bracketing samples.
    Linear,
}

/// Outcome of clearing one round.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct ClearingResult {
    /// Clearing price, `None` when supply and demand never cross.
    pub price: Option<f64>,
    pub matched: BTreeSet<ParticipantId>,
    pub unmatched: BTreeSet<ParticipantId>,
}

/// Sums every curve whose grid matches `grid`.
///
/// Returns the aggregate and the participants whose curve was left out.
pub fn aggregate(
    grid: &PriceGrid,
    proposals: &BTreeMap<ParticipantId, PriceQuantityCurve>,
) -> (PriceQuantityCurve, BTreeSet<ParticipantId>) {
    let mut total = PriceQuantityCurve::zero(grid);
    let mut rejected = BTreeSet::new();
    for (id, curve) in proposals {
        if !grid.matches(curve.grid()) {
            let e = MarketError::GridMismatch {
                participant: id.to_string(),
            };
            warn!(error = %e, samples = curve.grid().len(), "curve left out of aggregate");
            rejected.insert(id.clone());
            continue;
        }
        total.add_assign(curve);
    }
    (total, rejected)
}

/// Finds the first sign change of `values`, scanning from the lowest price.
///
/// Zero samples are skipped when looking for the opposite sign, but the
/// bracket is always `[i, i + 1]` where `i` is the last non-zero sample
/// before the change.
pub fn find_crossing(prices: &[f64], values: &[f64], rule: CrossingRule) -> Option<f64> {
    let n = prices.len().min(values.len());
    let mut prev: Option<usize> = None;
    for (j, &v) in values.iter().enumerate().take(n) {
        if v == 0.0 {
            continue;
        }
        if let Some(i) = prev {
            if values[i].signum() != v.signum() {
                return Some(bracket_price(prices, values, i, rule));
            }
        }
        prev = Some(j);
    }
    None
}

fn bracket_price(prices: &[f64], values: &[f64], i: usize, rule: CrossingRule) -> f64 {
    let (t0, t1) = (prices[i], prices[i + 1]);
    match rule {
        CrossingRule::Midpoint => (t0 + t1) / 2.0,
        CrossingRule::Linear => {
            let (a, b) = (values[i], values[i + 1]);
            t0 + (t1 - t0) * a / (a - b)
        }
    }
}

/// Aggregates conforming proposals and discovers the clearing price.
///
/// Non-conforming curves end up in `unmatched` without touching the
/// aggregate. With no crossing every participant is unmatched.
///
/// # Examples
///
/// ```
/// use std::collections::BTreeMap;
/// use prosumer_market::market::{PriceGrid, PriceQuantityCurve, ParticipantId, CrossingRule};
/// use prosumer_market::market::clearing::clear;
///
/// let grid = PriceGrid::from_prices(vec![0.0, 1.0, 2.0, 3.0]);
/// let curve = PriceQuantityCurve::new(grid.prices().to_vec(), vec![-3.0, -1.0, 1.0, 3.0]).unwrap();
/// let proposals = BTreeMap::from([(ParticipantId::from("a"), curve)]);
/// let result = clear(&grid, &proposals, CrossingRule::Midpoint);
/// assert_eq!(result.price, Some(1.5));
/// ```
pub fn clear(
    grid: &PriceGrid,
    proposals: &BTreeMap<ParticipantId, PriceQuantityCurve>,
    rule: CrossingRule,
) -> ClearingResult {
    let (total, mut unmatched) = aggregate(grid, proposals);
    let price = find_crossing(grid.prices(), total.values(), rule);

    let conforming: BTreeSet<ParticipantId> = proposals
        .keys()
        .filter(|id| !unmatched.contains(*id))
        .cloned()
        .collect();
    let matched = match price {
        Some(_) => conforming,
        None => {
            unmatched.extend(conforming);
            BTreeSet::new()
        }
    };

    ClearingResult {
        price,
        matched,
        unmatched,
    }
}
