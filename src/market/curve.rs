//! Price grid and discretized price-quantity curves.

use serde::{Deserialize, Serialize};

use crate::error::MarketError;

/// The global price domain `[min, max]` sampled at evenly spaced points.
///
/// Every curve exchanged in a round is evaluated on the same grid so that
/// curves can be summed pointwise.
///
/// # Examples
///
/// ```
/// use prosumer_market::market::PriceGrid;
///
/// let grid = PriceGrid::linspace(0.0, 3.0, 4);
/// assert_eq!(grid.prices(), &[0.0, 1.0, 2.0, 3.0]);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PriceGrid {
    prices: Vec<f64>,
}

impl PriceGrid {
    /// Creates `points` evenly spaced prices from `min` to `max` inclusive.
    ///
    /// Fewer than two points degenerates to a single price at `min`.
    pub fn linspace(min: f64, max: f64, points: usize) -> Self {
        if points < 2 {
            return Self { prices: vec![min] };
        }
        let step = (max - min) / (points - 1) as f64;
        let prices = (0..points)
            .map(|i| if i == points - 1 { max } else { min + step * i as f64 })
            .collect();
        Self { prices }
    }

    /// Wraps explicit grid prices (used for hand-built scenarios and tests).
    pub fn from_prices(prices: Vec<f64>) -> Self {
        Self { prices }
    }

    pub fn prices(&self) -> &[f64] {
        &self.prices
    }

    pub fn len(&self) -> usize {
        self.prices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prices.is_empty()
    }

    /// Returns `true` when `other` is sample-for-sample identical to this grid.
    pub fn matches(&self, other: &[f64]) -> bool {
        self.prices.len() == other.len()
            && self.prices.iter().zip(other).all(|(a, b)| a == b)
    }
}

/// A bid: quantity demanded (positive) or offered (negative) at each grid price.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceQuantityCurve {
    grid: Vec<f64>,
    values: Vec<f64>,
}

impl PriceQuantityCurve {
    /// Builds a curve from matching grid and value vectors.
    ///
    /// # Errors
    ///
    /// Returns `MarketError::MalformedCurve` if the lengths differ or any
    /// sample is not finite.
    pub fn new(grid: Vec<f64>, values: Vec<f64>) -> Result<Self, MarketError> {
        let curve = Self { grid, values };
        curve.check()?;
        Ok(curve)
    }

    /// An identically-zero curve over `grid`.
    pub fn zero(grid: &PriceGrid) -> Self {
        Self {
            grid: grid.prices().to_vec(),
            values: vec![0.0; grid.len()],
        }
    }

    /// Evaluates `f(price)` at every grid point.
    pub fn from_fn(grid: &PriceGrid, f: impl Fn(f64) -> f64) -> Self {
        Self {
            grid: grid.prices().to_vec(),
            values: grid.prices().iter().map(|&t| f(t)).collect(),
        }
    }

    pub fn grid(&self) -> &[f64] {
        &self.grid
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Adds `other` pointwise into `self`. Both must share the same grid;
    /// callers conformance-check before summing.
    pub fn add_assign(&mut self, other: &PriceQuantityCurve) {
        for (a, b) in self.values.iter_mut().zip(&other.values) {
            *a += b;
        }
    }

    /// Serializes to the opaque wire payload `{"grid":[..],"values":[..]}`.
    ///
    /// # Errors
    ///
    /// Returns `MarketError::Codec` if serialization fails.
    pub fn to_payload(&self) -> Result<Vec<u8>, MarketError> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Parses a wire payload and checks it is well formed.
    ///
    /// # Errors
    ///
    /// Returns `MarketError::Codec` for undecodable bytes and
    /// `MarketError::MalformedCurve` for inconsistent contents.
    pub fn from_payload(bytes: &[u8]) -> Result<Self, MarketError> {
        let curve: Self = serde_json::from_slice(bytes)?;
        curve.check()?;
        Ok(curve)
    }

    fn check(&self) -> Result<(), MarketError> {
        if self.grid.len() != self.values.len() {
            return Err(MarketError::MalformedCurve(format!(
                "grid has {} samples but values has {}",
                self.grid.len(),
                self.values.len()
            )));
        }
        if self.grid.is_empty() {
            return Err(MarketError::MalformedCurve("empty curve".into()));
        }
        if let Some(i) = self
            .grid
            .iter()
            .chain(&self.values)
            .position(|v| !v.is_finite())
        {
            return Err(MarketError::MalformedCurve(format!(
                "non-finite sample at position {i}"
            )));
        }
        Ok(())
    }
}
