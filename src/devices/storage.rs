use serde::Serialize;

use crate::devices::types::{
    Command, Device, DeviceContext, DeviceOutput, MarketSignal, StepTimer, clamp_or_low,
};
use crate::market::learner::{ThresholdLearner, Thresholds};

/// Operating state of a [`Storage`] device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageState {
    Loading,
    Waiting,
    Unloading,
}

/// A battery that trades against learned price thresholds.
///
/// Each cleared price is fed to a [`ThresholdLearner`]; prices strictly
/// below the buy threshold charge the battery, prices strictly above the
/// sell threshold discharge it.
///
/// Energy moves at a fixed nominal power. A step that would leave the
/// `[min_backup_kwh, max_capacity_kwh]` band moves nothing.
///
/// # Power Flow Convention
/// - Positive power: charging (load)
/// - Negative power: discharging (generation)
#[derive(Debug, Clone)]
pub struct Storage {
    /// Charge/discharge power magnitude in kilowatts.
    pub nominal_power_kw: f64,

    /// Usable capacity in kilowatt-hours.
    pub max_capacity_kwh: f64,

    /// Energy that is never discharged, in kilowatt-hours.
    pub min_backup_kwh: f64,

    stored_kwh: f64,
    state: StorageState,
    learner: ThresholdLearner,
    timer: StepTimer,
}

impl Storage {
    /// Creates a storage device.
    ///
    /// # Arguments
    ///
    /// * `nominal_power_kw` - Charge/discharge power (clamped to >= 0)
    /// * `max_capacity_kwh` - Capacity (clamped to >= 0)
    /// * `min_backup_kwh` - Reserve (clamped to `[0, max_capacity_kwh]`)
    /// * `initial_kwh` - Starting energy (clamped to the reserve/capacity band)
    /// * `nominal_step_secs` - Interval assumed for the first step
    pub fn new(
        nominal_power_kw: f64,
        max_capacity_kwh: f64,
        min_backup_kwh: f64,
        initial_kwh: f64,
        nominal_step_secs: u64,
    ) -> Self {
        let max_capacity_kwh = max_capacity_kwh.max(0.0);
        let min_backup_kwh = clamp_or_low(min_backup_kwh, 0.0, max_capacity_kwh);
        Self {
            nominal_power_kw: nominal_power_kw.max(0.0),
            max_capacity_kwh,
            min_backup_kwh,
            stored_kwh: clamp_or_low(initial_kwh, min_backup_kwh, max_capacity_kwh),
            state: StorageState::Waiting,
            learner: ThresholdLearner::default(),
            timer: StepTimer::new(nominal_step_secs),
        }
    }

    pub fn stored_kwh(&self) -> f64 {
        self.stored_kwh
    }

    pub fn state(&self) -> StorageState {
        self.state
    }

    pub fn thresholds(&self) -> Thresholds {
        self.learner.thresholds()
    }

    /// Whether one nominal charging step still fits below capacity while
    /// the learned thresholds allow trading.
    pub fn can_charge(&self) -> bool {
        let energy_kwh = self.nominal_power_kw * self.timer.nominal_hours();
        self.nominal_power_kw > 0.0
            && !self.thresholds().is_inverted()
            && self.stored_kwh + energy_kwh <= self.max_capacity_kwh
    }

    fn decide(&mut self, price: f64) {
        let t = self.learner.update(price);
        self.state = if t.is_inverted() || !price.is_finite() {
            StorageState::Waiting
        } else if price < t.buy_below {
            StorageState::Loading
        } else if price > t.sell_above {
            StorageState::Unloading
        } else {
            StorageState::Waiting
        };
    }
}

impl Device for Storage {
    fn step(&mut self, context: &DeviceContext) -> DeviceOutput {
        match context.signal {
            MarketSignal::Price(p) => self.decide(p),
            MarketSignal::Command(Command::Charge) => self.state = StorageState::Loading,
            MarketSignal::Command(Command::Hold) => self.state = StorageState::Waiting,
            MarketSignal::Command(Command::Discharge) => self.state = StorageState::Unloading,
            MarketSignal::Command(_) | MarketSignal::Idle => {}
        }

        let dt_hours = self.timer.elapsed_hours(context.timestamp);
        let energy_kwh = self.nominal_power_kw * dt_hours;

        let power_kw = match self.state {
            StorageState::Loading if self.stored_kwh + energy_kwh <= self.max_capacity_kwh => {
                self.stored_kwh += energy_kwh;
                self.nominal_power_kw
            }
            StorageState::Unloading if self.stored_kwh - energy_kwh >= self.min_backup_kwh => {
                self.stored_kwh -= energy_kwh;
                -self.nominal_power_kw
            }
            _ => 0.0,
        };

        DeviceOutput::new(power_kw, self.stored_kwh)
    }

    fn device_type(&self) -> &'static str {
        "Storage"
    }
}
