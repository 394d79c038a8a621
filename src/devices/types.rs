//! Common types and traits for market-driven devices.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Device classes a participant may declare in its device configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceClass {
    /// Weather-driven generation such as rooftop PV.
    StochasticGen,
    /// Dispatchable fuel generator.
    FreelyControlGen,
    /// Load with a movable daily run.
    ShiftableLoad,
    /// Thermal or other buffering load.
    BufferingDevice,
    /// Load driven directly by occupant actions.
    UserActionDevice,
    /// Battery storage.
    StorageDevice,
}

impl DeviceClass {
    pub const ALL: [DeviceClass; 6] = [
        DeviceClass::StochasticGen,
        DeviceClass::FreelyControlGen,
        DeviceClass::ShiftableLoad,
        DeviceClass::BufferingDevice,
        DeviceClass::UserActionDevice,
        DeviceClass::StorageDevice,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceClass::StochasticGen => "stochastic_gen",
            DeviceClass::FreelyControlGen => "freely_control_gen",
            DeviceClass::ShiftableLoad => "shiftable_load",
            DeviceClass::BufferingDevice => "buffering_device",
            DeviceClass::UserActionDevice => "user_action_device",
            DeviceClass::StorageDevice => "storage_device",
        }
    }

    /// Whether the class has its own bidding state machine, as opposed to
    /// only contributing a curve and an externally measured power.
    pub fn is_dispatchable(&self) -> bool {
        matches!(
            self,
            DeviceClass::StorageDevice | DeviceClass::FreelyControlGen | DeviceClass::ShiftableLoad
        )
    }
}

impl fmt::Display for DeviceClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// External commands accepted by devices. Inapplicable commands are ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    On,
    Off,
    Charge,
    Hold,
    Discharge,
}

/// What the market tells a device on this step.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum MarketSignal {
    #[default]
    Idle,
    /// A freshly cleared price.
    Price(f64),
    Command(Command),
}

/// Contextual information passed to devices on each step.
///
/// # Fields
/// * `timestamp` - Simulation time in seconds
/// * `signal` - Market input for this step
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DeviceContext {
    pub timestamp: u64,
    pub signal: MarketSignal,
}

impl DeviceContext {
    /// Creates a context with no market input.
    pub fn new(timestamp: u64) -> Self {
        Self {
            timestamp,
            signal: MarketSignal::Idle,
        }
    }

    pub fn with_price(timestamp: u64, price: f64) -> Self {
        Self {
            timestamp,
            signal: MarketSignal::Price(price),
        }
    }

    pub fn with_command(timestamp: u64, command: Command) -> Self {
        Self {
            timestamp,
            signal: MarketSignal::Command(command),
        }
    }
}

/// Result of one device step.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct DeviceOutput {
    /// Positive = consumption, negative = generation (kW).
    pub power_kw: f64,
    /// Device-specific auxiliary value: stored kWh, marginal cost or
    /// remaining run hours.
    pub aux: f64,
}

impl DeviceOutput {
    pub fn new(power_kw: f64, aux: f64) -> Self {
        Self { power_kw, aux }
    }
}

/// Trait defining a device that reacts to market signals.
pub trait Device {
    /// Advances the device to `context.timestamp` and returns its output.
    ///
    /// Never panics; out-of-range inputs are clamped or ignored.
    fn step(&mut self, context: &DeviceContext) -> DeviceOutput;

    /// Returns a human-readable type name for the device.
    fn device_type(&self) -> &'static str;
}

/// Clamps `value` into `[low, high]`, mapping NaN to `low`.
pub(crate) fn clamp_or_low(value: f64, low: f64, high: f64) -> f64 {
    if value.is_nan() {
        low
    } else {
        value.clamp(low, high)
    }
}

/// Tracks time elapsed between a device's own steps.
///
/// The first step counts as one nominal interval. Timestamps that go
/// backwards count as zero elapsed time.
#[derive(Debug, Clone)]
pub struct StepTimer {
    last: Option<u64>,
    nominal_secs: u64,
}

impl StepTimer {
    pub fn new(nominal_secs: u64) -> Self {
        Self {
            last: None,
            nominal_secs,
        }
    }

    /// Length of one nominal interval in hours.
    pub fn nominal_hours(&self) -> f64 {
        self.nominal_secs as f64 / 3600.0
    }

    /// Elapsed hours since the previous call.
    pub fn elapsed_hours(&mut self, timestamp: u64) -> f64 {
        let secs = match self.last {
            Some(prev) => timestamp.saturating_sub(prev),
            None => self.nominal_secs,
        };
        self.last = Some(self.last.map_or(timestamp, |prev| prev.max(timestamp)));
        secs as f64 / 3600.0
    }
}
