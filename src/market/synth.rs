//! Bid-curve synthesis: logistic demand/offer curves for prosumer device
//! classes and the two-anchor line used by the utility.

use std::cmp::Ordering;

use rand::{Rng, rngs::StdRng};
use serde::{Deserialize, Serialize};

use crate::devices::DeviceClass;

use super::curve::{PriceGrid, PriceQuantityCurve};

/// Default logistic steepness `k`.
pub const DEFAULT_STEEPNESS: f64 = 6.0;

/// Standard logistic function `1 / (1 + e^-x)`.
pub fn logistic(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

/// Shape of one sigmoid bid.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SigmoidParams {
    /// Price at which the curve is halfway between its bounds.
    pub midpoint: f64,
    /// Quantity approached at expensive prices.
    pub y_min: f64,
    /// Quantity approached at cheap prices.
    pub y_max: f64,
    /// Logistic steepness `k`.
    pub steepness: f64,
}

/// Evaluates a sigmoid bid on every grid price.
///
/// The curve sits at `y_max` for cheap prices and falls monotonically to
/// `y_min` for expensive ones. Demand classes use positive bounds, generation
/// classes negative bounds.
pub fn sigmoid_curve(grid: &PriceGrid, p: &SigmoidParams) -> PriceQuantityCurve {
    PriceQuantityCurve::from_fn(grid, |t| {
        let x = p.steepness * (t - p.midpoint);
        p.y_max * logistic(-x) + p.y_min * logistic(x)
    })
}

/// A `(price, quantity)` point a line curve passes through.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Anchor {
    pub price: f64,
    pub quantity: f64,
}

impl Anchor {
    pub const fn new(price: f64, quantity: f64) -> Self {
        Self { price, quantity }
    }
}

/// Evaluates the line through `low` and `high` on every grid price.
///
/// Anchors with equal prices give a flat curve at their mean quantity.
pub fn line_curve(grid: &PriceGrid, low: Anchor, high: Anchor) -> PriceQuantityCurve {
    let dp = high.price - low.price;
    if dp == 0.0 {
        let mean = (low.quantity + high.quantity) / 2.0;
        return PriceQuantityCurve::from_fn(grid, |_| mean);
    }
    let slope = (high.quantity - low.quantity) / dp;
    PriceQuantityCurve::from_fn(grid, |t| low.quantity + slope * (t - low.price))
}

/// Source of sigmoid parameters.
///
/// Implemented for seeded RNGs and for [`MidpointSource`], which always picks
/// the centre of the range and keeps curve tests deterministic.
pub trait ParamSource {
    /// Draws a value in `[low, high)`. Returns `low` for an empty range.
    fn uniform(&mut self, low: f64, high: f64) -> f64;
}

impl ParamSource for StdRng {
    fn uniform(&mut self, low: f64, high: f64) -> f64 {
        if low.partial_cmp(&high) != Some(Ordering::Less) {
            return low;
        }
        self.random_range(low..high)
    }
}

/// Deterministic source that returns the midpoint of every range.
#[derive(Debug, Clone, Copy, Default)]
pub struct MidpointSource;

impl ParamSource for MidpointSource {
    fn uniform(&mut self, low: f64, high: f64) -> f64 {
        if low.partial_cmp(&high) != Some(Ordering::Less) {
            return low;
        }
        (low + high) / 2.0
    }
}

/// Parameter ranges from which a device class draws its sigmoid each round.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CurveProfile {
    /// `[low, high]` range for the midpoint price.
    pub midpoint: [f64; 2],
    /// `[low, high]` range for `y_min`.
    pub y_min: [f64; 2],
    /// `[low, high]` range for `y_max`.
    pub y_max: [f64; 2],
    pub steepness: f64,
}

impl Default for CurveProfile {
    fn default() -> Self {
        Self::demand()
    }
}

impl CurveProfile {
    /// Consumption profile: 3-5 units at cheap prices, 1-2 at expensive ones.
    pub const fn demand() -> Self {
        Self {
            midpoint: [0.5, 4.5],
            y_min: [1.0, 2.0],
            y_max: [3.0, 5.0],
            steepness: DEFAULT_STEEPNESS,
        }
    }

    /// Generation profile: offers 1-2 units at cheap prices, 3-5 at expensive ones.
    pub const fn generation() -> Self {
        Self {
            midpoint: [0.5, 4.5],
            y_min: [-5.0, -3.0],
            y_max: [-2.0, -1.0],
            steepness: DEFAULT_STEEPNESS,
        }
    }

    /// Built-in profile for a device class.
    pub const fn for_class(class: DeviceClass) -> Self {
        match class {
            DeviceClass::StochasticGen | DeviceClass::FreelyControlGen => Self::generation(),
            DeviceClass::UserActionDevice
            | DeviceClass::StorageDevice
            | DeviceClass::ShiftableLoad
            | DeviceClass::BufferingDevice => Self::demand(),
        }
    }

    /// Draws concrete sigmoid parameters from the configured ranges.
    pub fn sample(&self, source: &mut impl ParamSource) -> SigmoidParams {
        SigmoidParams {
            midpoint: source.uniform(self.midpoint[0], self.midpoint[1]),
            y_min: source.uniform(self.y_min[0], self.y_min[1]),
            y_max: source.uniform(self.y_max[0], self.y_max[1]),
            steepness: self.steepness,
        }
    }
}

/// Sums one freshly sampled sigmoid per profile.
///
/// An empty profile set yields the identically-zero curve.
pub fn composite_curve<'a>(
    grid: &PriceGrid,
    profiles: impl IntoIterator<Item = &'a CurveProfile>,
    source: &mut impl ParamSource,
) -> PriceQuantityCurve {
    let mut total = PriceQuantityCurve::zero(grid);
    for profile in profiles {
        let params = profile.sample(source);
        total.add_assign(&sigmoid_curve(grid, &params));
    }
    total
}
