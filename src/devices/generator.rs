use serde::Serialize;

use crate::devices::types::{Command, Device, DeviceContext, DeviceOutput, MarketSignal};

/// Smallest fuel rate accepted; keeps the cost finite.
const MIN_FUEL_RATE: f64 = 1e-3;

/// On/off state of a [`Generator`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GeneratorState {
    Off,
    On,
}

/// A dispatchable fuel generator switched by external commands.
///
/// While running it produces its nominal power and reports the marginal cost
/// of the upcoming interval:
///
/// `(power * fuel_price / fuel_rate + maintenance_rate) * interval_hours`
///
/// plus `startup_cost` on the step that switches it on. While off it
/// quotes the cost of starting for the next interval, so a caller can
/// weigh that against the expected revenue.
///
/// # Power Flow Convention
/// Returns **negative** values (generation) while on.
#[derive(Debug, Clone)]
pub struct Generator {
    /// Output power in kilowatts.
    pub power_kw: f64,
    /// Price per unit of fuel.
    pub fuel_price: f64,
    /// Energy per unit of fuel (kWh per unit).
    pub fuel_rate: f64,
    /// Running cost per hour regardless of output.
    pub maintenance_rate: f64,
    /// One-off cost of a start from Off.
    pub startup_cost: f64,
    interval_hours: f64,
    state: GeneratorState,
}

impl Generator {
    /// Creates a generator in the `Off` state.
    ///
    /// Negative parameters are clamped to zero; `fuel_rate` is clamped to a
    /// small positive floor.
    pub fn new(
        power_kw: f64,
        fuel_price: f64,
        fuel_rate: f64,
        maintenance_rate: f64,
        startup_cost: f64,
        interval_secs: u64,
    ) -> Self {
        Self {
            power_kw: power_kw.max(0.0),
            fuel_price: fuel_price.max(0.0),
            fuel_rate: fuel_rate.max(MIN_FUEL_RATE),
            maintenance_rate: maintenance_rate.max(0.0),
            startup_cost: startup_cost.max(0.0),
            interval_hours: interval_secs as f64 / 3600.0,
            state: GeneratorState::Off,
        }
    }

    pub fn state(&self) -> GeneratorState {
        self.state
    }

    pub fn interval_hours(&self) -> f64 {
        self.interval_hours
    }

    /// Cost of running through the next interval, including a startup if
    /// the generator is currently off.
    pub fn marginal_cost(&self) -> f64 {
        self.cost_from(self.state)
    }

    fn cost_from(&self, previous: GeneratorState) -> f64 {
        let running = (self.power_kw * self.fuel_price / self.fuel_rate + self.maintenance_rate)
            * self.interval_hours;
        match previous {
            GeneratorState::Off => running + self.startup_cost,
            GeneratorState::On => running,
        }
    }

    /// Revenue of running through the next interval at `price` per kWh.
    pub fn revenue_at(&self, price: f64) -> f64 {
        price * self.power_kw * self.interval_hours
    }
}

impl Device for Generator {
    fn step(&mut self, context: &DeviceContext) -> DeviceOutput {
        let previous = self.state;
        match context.signal {
            MarketSignal::Command(Command::On) => self.state = GeneratorState::On,
            MarketSignal::Command(Command::Off) => self.state = GeneratorState::Off,
            MarketSignal::Command(_) | MarketSignal::Price(_) | MarketSignal::Idle => {}
        }

        match self.state {
            GeneratorState::Off => DeviceOutput::new(0.0, self.marginal_cost()),
            GeneratorState::On => DeviceOutput::new(-self.power_kw, self.cost_from(previous)),
        }
    }

    fn device_type(&self) -> &'static str {
        "Generator"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn generator() -> Generator {
        // 10 kW, fuel 2.0/unit at 5 kWh/unit, maintenance 1.0/h, startup 3.0, 1 h interval
        Generator::new(10.0, 2.0, 5.0, 1.0, 3.0, 3600)
    }

    #[test]
    fn test_off_by_default() {
        let mut g = generator();
        let out = g.step(&DeviceContext::new(0));
        assert_eq!(out.power_kw, 0.0);
        assert_eq!(g.state(), GeneratorState::Off);
    }

    #[test]
    fn test_startup_cost_only_on_first_step() {
        let mut g = generator();
        let out = g.step(&DeviceContext::with_command(0, Command::On));
        assert_eq!(out.power_kw, -10.0);
        assert!((out.aux - 8.0).abs() < 1e-12); // (10*2/5 + 1) * 1 + 3

        let out = g.step(&DeviceContext::new(3600));
        assert!((out.aux - 5.0).abs() < 1e-12);

        let out = g.step(&DeviceContext::with_command(7200, Command::On));
        assert!((out.aux - 5.0).abs() < 1e-12);
    }

    #[test]
    fn test_off_command_stops() {
        let mut g = generator();
        g.step(&DeviceContext::with_command(0, Command::On));
        let out = g.step(&DeviceContext::with_command(3600, Command::Off));
        assert_eq!(out.power_kw, 0.0);
        assert_eq!(g.state(), GeneratorState::Off);
    }

    #[test]
    fn test_off_generator_quotes_start_cost() {
        let mut g = generator();
        let out = g.step(&DeviceContext::with_command(0, Command::Off));
        assert_eq!(out.power_kw, 0.0);
        assert!((out.aux - 8.0).abs() < 1e-12); // running 5 + startup 3
        assert_eq!(out.aux, g.marginal_cost());

        g.step(&DeviceContext::with_command(3600, Command::On));
        let out = g.step(&DeviceContext::with_command(7200, Command::Off));
        assert!((out.aux - 8.0).abs() < 1e-12);
    }

    #[test]
    fn test_restart_pays_startup_again() {
        let mut g = generator();
        g.step(&DeviceContext::with_command(0, Command::On));
        g.step(&DeviceContext::with_command(3600, Command::Off));
        let out = g.step(&DeviceContext::with_command(7200, Command::On));
        assert!((out.aux - 8.0).abs() < 1e-12);
    }

    #[test]
    fn test_storage_commands_ignored() {
        let mut g = generator();
        g.step(&DeviceContext::with_command(0, Command::Charge));
        assert_eq!(g.state(), GeneratorState::Off);
    }

    #[test]
    fn test_marginal_cost_quote() {
        let mut g = generator();
        assert!((g.marginal_cost() - 8.0).abs() < 1e-12);
        g.step(&DeviceContext::with_command(0, Command::On));
        assert!((g.marginal_cost() - 5.0).abs() < 1e-12);
        assert!((g.revenue_at(0.5) - 5.0).abs() < 1e-12);
    }

    #[test]
    fn test_zero_fuel_rate_clamped() {
        let g = Generator::new(1.0, 1.0, 0.0, 0.0, 0.0, 3600);
        assert!(g.marginal_cost().is_finite());
    }
}
