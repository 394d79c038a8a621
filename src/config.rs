//! TOML-based scenario configuration and preset definitions.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::devices::DeviceClass;
use crate::error::ConfigError;
use crate::market::clearing::CrossingRule;
use crate::market::synth::{Anchor, CurveProfile};

/// Top-level scenario configuration parsed from TOML.
///
/// All fields have defaults matching the baseline scenario. Load from
/// TOML with [`ScenarioConfig::from_toml_file`] or use
/// [`ScenarioConfig::baseline`] for the built-in default.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScenarioConfig {
    /// Simulation timing and global parameters.
    #[serde(default)]
    pub simulation: SimulationConfig,
    /// Price grid, round schedule and clearing rule.
    #[serde(default)]
    pub market: MarketConfig,
    /// Utility bidder.
    #[serde(default)]
    pub utility: UtilityConfig,
    /// Prosumer households.
    #[serde(default = "default_participants")]
    pub participants: Vec<ParticipantConfig>,
    /// Parameters shared by all dispatchable devices of a class.
    #[serde(default)]
    pub devices: DevicesConfig,
    /// Curve profile overrides per device class.
    #[serde(default)]
    pub curves: BTreeMap<DeviceClass, CurveProfile>,
}

/// Simulation timing and global parameters.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SimulationConfig {
    /// Scheduler increment in seconds (must be > 0).
    pub step_size_secs: u64,
    /// Length of the run in seconds (must be > 0).
    pub duration_secs: u64,
    /// Master random seed.
    pub seed: u64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            step_size_secs: 3600,
            duration_secs: 8 * 86_400,
            seed: 42,
        }
    }
}

/// Price grid, round schedule and clearing rule.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MarketConfig {
    /// Lowest grid price.
    pub price_min: f64,
    /// Highest grid price.
    pub price_max: f64,
    /// Number of grid samples (must be >= 2).
    pub grid_points: usize,
    /// First round opens at this time.
    pub market_start_secs: u64,
    /// Seconds between round openings.
    pub round_interval_secs: u64,
    /// Proposal deadline after the CFP.
    pub round_timeout_secs: u64,
    /// Acknowledgement deadline after the decision.
    pub settle_timeout_secs: u64,
    /// How the price is picked inside the crossing interval.
    pub crossing_rule: CrossingRule,
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self {
            price_min: 0.0,
            price_max: 5.0,
            grid_points: 50,
            market_start_secs: 7 * 86_400,
            round_interval_secs: 3600,
            round_timeout_secs: 600,
            settle_timeout_secs: 600,
            crossing_rule: CrossingRule::Midpoint,
        }
    }
}

/// Utility bidder parameters.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct UtilityConfig {
    pub id: String,
    pub latency_secs: u64,
    /// Anchor at the cheap end of the line.
    pub low: Anchor,
    /// Anchor at the expensive end of the line.
    pub high: Anchor,
}

impl Default for UtilityConfig {
    fn default() -> Self {
        Self {
            id: "utility".to_string(),
            latency_secs: 0,
            low: Anchor::new(1.0, 0.0),
            high: Anchor::new(5.0, -50.0),
        }
    }
}

/// Nominal power of one declared device class.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeviceSpec {
    pub value: f64,
}

/// One prosumer household.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ParticipantConfig {
    pub id: String,
    #[serde(default)]
    pub latency_secs: u64,
    /// Device class name → nominal power.
    #[serde(default)]
    pub devices: BTreeMap<DeviceClass, DeviceSpec>,
}

impl ParticipantConfig {
    fn new(id: &str, latency_secs: u64, devices: &[(DeviceClass, f64)]) -> Self {
        Self {
            id: id.to_string(),
            latency_secs,
            devices: devices
                .iter()
                .map(|(class, value)| (*class, DeviceSpec { value: *value }))
                .collect(),
        }
    }
}

fn default_participants() -> Vec<ParticipantConfig> {
    vec![
        ParticipantConfig::new(
            "house-1",
            0,
            &[
                (DeviceClass::UserActionDevice, 2.0),
                (DeviceClass::StochasticGen, 3.0),
                (DeviceClass::StorageDevice, 2.0),
            ],
        ),
        ParticipantConfig::new(
            "house-2",
            0,
            &[
                (DeviceClass::UserActionDevice, 1.5),
                (DeviceClass::ShiftableLoad, 1.0),
                (DeviceClass::FreelyControlGen, 4.0),
            ],
        ),
        ParticipantConfig::new(
            "house-3",
            0,
            &[
                (DeviceClass::BufferingDevice, 1.0),
                (DeviceClass::StochasticGen, 2.0),
            ],
        ),
    ]
}

/// Parameters shared by all dispatchable devices of a class.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DevicesConfig {
    pub storage: StorageConfig,
    pub generator: GeneratorConfig,
    pub shiftable: ShiftableConfig,
}

/// Battery storage parameters (power comes from each participant's device entry).
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StorageConfig {
    /// Usable capacity (kWh).
    pub max_capacity_kwh: f64,
    /// Reserve never discharged (kWh).
    pub min_backup_kwh: f64,
    /// Energy at the start of the run (kWh).
    pub initial_kwh: f64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            max_capacity_kwh: 10.0,
            min_backup_kwh: 1.0,
            initial_kwh: 5.0,
        }
    }
}

/// Dispatchable generator parameters (power comes from the device entry).
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GeneratorConfig {
    /// Price per unit of fuel.
    pub fuel_price: f64,
    /// kWh produced per unit of fuel (must be > 0).
    pub fuel_rate: f64,
    /// Running cost per hour.
    pub maintenance_rate: f64,
    /// One-off cost per start.
    pub startup_cost: f64,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            fuel_price: 1.2,
            fuel_rate: 3.0,
            maintenance_rate: 0.2,
            startup_cost: 0.5,
        }
    }
}

/// Shiftable load parameters (power comes from the device entry).
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ShiftableConfig {
    /// Length of the daily run (hours).
    pub run_hours: f64,
    /// Earliest start (hour of day).
    pub window_start_h: f64,
    /// Latest start (hour of day).
    pub window_end_h: f64,
}

impl Default for ShiftableConfig {
    fn default() -> Self {
        Self {
            run_hours: 2.0,
            window_start_h: 9.0,
            window_end_h: 17.0,
        }
    }
}

impl ScenarioConfig {
    /// Returns the baseline scenario: three households and the utility,
    /// hourly rounds after a one-week warm-up.
    pub fn baseline() -> Self {
        Self {
            simulation: SimulationConfig::default(),
            market: MarketConfig::default(),
            utility: UtilityConfig::default(),
            participants: default_participants(),
            devices: DevicesConfig::default(),
            curves: BTreeMap::new(),
        }
    }

    /// Returns the oversupply preset: generation-heavy households and a
    /// utility that sells at every price, so no round finds an equilibrium.
    pub fn oversupply() -> Self {
        Self {
            simulation: SimulationConfig {
                duration_secs: 2 * 86_400,
                ..SimulationConfig::default()
            },
            market: MarketConfig {
                market_start_secs: 0,
                ..MarketConfig::default()
            },
            utility: UtilityConfig {
                low: Anchor::new(0.0, -15.0),
                high: Anchor::new(5.0, -40.0),
                ..UtilityConfig::default()
            },
            participants: vec![
                ParticipantConfig::new(
                    "solar-1",
                    0,
                    &[
                        (DeviceClass::StochasticGen, 5.0),
                        (DeviceClass::StorageDevice, 3.0),
                    ],
                ),
                ParticipantConfig::new(
                    "solar-2",
                    0,
                    &[
                        (DeviceClass::StochasticGen, 4.0),
                        (DeviceClass::FreelyControlGen, 2.0),
                    ],
                ),
                ParticipantConfig::new("flat-1", 0, &[(DeviceClass::UserActionDevice, 1.0)]),
            ],
            devices: DevicesConfig::default(),
            curves: BTreeMap::new(),
        }
    }

    /// Returns the slow-link preset: fine-grained steps and one household
    /// whose latency exceeds the proposal deadline.
    pub fn slow_link() -> Self {
        let mut participants = default_participants();
        if let Some(p) = participants.last_mut() {
            p.latency_secs = 900;
        }
        Self {
            simulation: SimulationConfig {
                step_size_secs: 300,
                duration_secs: 86_400,
                ..SimulationConfig::default()
            },
            market: MarketConfig {
                market_start_secs: 0,
                ..MarketConfig::default()
            },
            utility: UtilityConfig {
                latency_secs: 60,
                ..UtilityConfig::default()
            },
            participants,
            devices: DevicesConfig::default(),
            curves: BTreeMap::new(),
        }
    }

    /// Available preset names.
    pub const PRESETS: &[&str] = &["baseline", "oversupply", "slow_link"];

    /// Loads a scenario from a named preset.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the preset name is unknown.
    pub fn from_preset(name: &str) -> Result<Self, ConfigError> {
        match name {
            "baseline" => Ok(Self::baseline()),
            "oversupply" => Ok(Self::oversupply()),
            "slow_link" => Ok(Self::slow_link()),
            _ => Err(ConfigError::new(
                "preset",
                format!(
                    "unknown preset \"{name}\", available: {}",
                    Self::PRESETS.join(", ")
                ),
            )),
        }
    }

    /// Parses a scenario from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the file cannot be read or the TOML is invalid.
    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|e| {
            ConfigError::new("scenario", format!("cannot read \"{}\": {e}", path.display()))
        })?;
        Self::from_toml_str(&content)
    }

    /// Parses a scenario from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the TOML is invalid or contains unknown fields.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        toml::from_str(s).map_err(|e| ConfigError::new("toml", e.to_string()))
    }

    /// Validates all fields and returns a list of errors.
    ///
    /// Returns an empty vector if configuration is valid.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();

        let s = &self.simulation;
        if s.step_size_secs == 0 {
            errors.push(ConfigError::new("simulation.step_size_secs", "must be > 0"));
        }
        if s.duration_secs == 0 {
            errors.push(ConfigError::new("simulation.duration_secs", "must be > 0"));
        }

        let m = &self.market;
        if !m.price_min.is_finite() || !m.price_max.is_finite() {
            errors.push(ConfigError::new("market.price_min", "price bounds must be finite"));
        } else if m.price_min >= m.price_max {
            errors.push(ConfigError::new("market.price_min", "must be < market.price_max"));
        }
        if m.grid_points < 2 {
            errors.push(ConfigError::new("market.grid_points", "must be >= 2"));
        }
        if m.round_interval_secs == 0 {
            errors.push(ConfigError::new("market.round_interval_secs", "must be > 0"));
        }
        if m.round_timeout_secs == 0 {
            errors.push(ConfigError::new("market.round_timeout_secs", "must be > 0"));
        }

        let u = &self.utility;
        if u.id.is_empty() {
            errors.push(ConfigError::new("utility.id", "must not be empty"));
        }
        for (name, a) in [("utility.low", u.low), ("utility.high", u.high)] {
            if !a.price.is_finite() || !a.quantity.is_finite() {
                errors.push(ConfigError::new(name, "anchor must be finite"));
            }
        }

        let mut seen = BTreeSet::from([u.id.as_str()]);
        for (i, p) in self.participants.iter().enumerate() {
            if p.id.is_empty() {
                errors.push(ConfigError::new(format!("participants[{i}].id"), "must not be empty"));
            } else if !seen.insert(p.id.as_str()) {
                errors.push(ConfigError::new(
                    format!("participants[{i}].id"),
                    format!("duplicate participant id \"{}\"", p.id),
                ));
            }
            for (class, spec) in &p.devices {
                if !spec.value.is_finite() || spec.value < 0.0 {
                    errors.push(ConfigError::new(
                        format!("participants[{i}].devices.{class}.value"),
                        "must be finite and >= 0",
                    ));
                }
            }
        }

        let st = &self.devices.storage;
        if !st.max_capacity_kwh.is_finite() || st.max_capacity_kwh < 0.0 {
            errors.push(ConfigError::new("devices.storage.max_capacity_kwh", "must be >= 0"));
        }
        if !(0.0..=st.max_capacity_kwh).contains(&st.min_backup_kwh) {
            errors.push(ConfigError::new(
                "devices.storage.min_backup_kwh",
                "must be in [0, devices.storage.max_capacity_kwh]",
            ));
        }
        if !(st.min_backup_kwh..=st.max_capacity_kwh).contains(&st.initial_kwh) {
            errors.push(ConfigError::new(
                "devices.storage.initial_kwh",
                "must be in [min_backup_kwh, max_capacity_kwh]",
            ));
        }

        let g = &self.devices.generator;
        if !g.fuel_rate.is_finite() || g.fuel_rate <= 0.0 {
            errors.push(ConfigError::new("devices.generator.fuel_rate", "must be > 0"));
        }
        for (name, v) in [
            ("devices.generator.fuel_price", g.fuel_price),
            ("devices.generator.maintenance_rate", g.maintenance_rate),
            ("devices.generator.startup_cost", g.startup_cost),
        ] {
            if !v.is_finite() || v < 0.0 {
                errors.push(ConfigError::new(name, "must be >= 0"));
            }
        }

        let sh = &self.devices.shiftable;
        if !(0.0..=24.0).contains(&sh.run_hours) {
            errors.push(ConfigError::new("devices.shiftable.run_hours", "must be in [0, 24]"));
        }
        if !(0.0..=24.0).contains(&sh.window_start_h) {
            errors.push(ConfigError::new("devices.shiftable.window_start_h", "must be in [0, 24]"));
        }
        if !(sh.window_start_h..=24.0).contains(&sh.window_end_h) {
            errors.push(ConfigError::new(
                "devices.shiftable.window_end_h",
                "must be in [window_start_h, 24]",
            ));
        }

        for (class, c) in &self.curves {
            for (name, range) in [("midpoint", c.midpoint), ("y_min", c.y_min), ("y_max", c.y_max)] {
                if !range[0].is_finite() || !range[1].is_finite() || range[0] > range[1] {
                    errors.push(ConfigError::new(
                        format!("curves.{class}.{name}"),
                        "must be a finite [low, high] pair with low <= high",
                    ));
                }
            }
            if !(c.steepness.is_finite() && c.steepness > 0.0) {
                errors.push(ConfigError::new(format!("curves.{class}.steepness"), "must be > 0"));
            }
        }

        errors
    }
}
