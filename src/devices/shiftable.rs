use rand::{Rng, SeedableRng, rngs::StdRng};
use serde::Serialize;

use crate::devices::types::{
    Command, Device, DeviceContext, DeviceOutput, MarketSignal, StepTimer, clamp_or_low,
};

const SECS_PER_DAY: u64 = 86_400;
const HOURS_PER_DAY: f64 = 24.0;
/// Last second of the day; a start hour must be reachable by a step.
const LATEST_START_H: f64 = (SECS_PER_DAY - 1) as f64 / 3600.0;

/// On/off state of a [`ShiftableLoad`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ShiftableState {
    Off,
    On,
}

/// A load that runs once per day for a fixed duration.
///
/// Each simulated day a start time is sampled from the configured window.
/// The run begins at the first step at or after that time, or earlier on an
/// `On` command while the window is open. Once started it runs until its
/// remaining duration, decremented by the time elapsed between its own
/// steps, is used up. `Off` commands during a run are ignored.
///
/// A run belongs to the day it started on, so a run that crosses midnight
/// does not use up the next day's run.
///
/// # Power Flow Convention
/// Returns **positive** values (consumption) while running.
#[derive(Debug, Clone)]
pub struct ShiftableLoad {
    /// Consumption while running, in kilowatts.
    pub power_kw: f64,
    /// Length of the daily run in hours.
    pub run_hours: f64,
    /// Earliest start, hours after midnight.
    pub window_start_h: f64,
    /// Latest start, hours after midnight.
    pub window_end_h: f64,

    sampled_day: Option<u64>,
    start_h: f64,
    run_day: Option<u64>,
    remaining_h: f64,
    state: ShiftableState,
    timer: StepTimer,
    rng: StdRng,
}

impl ShiftableLoad {
    /// Creates a shiftable load.
    ///
    /// # Arguments
    ///
    /// * `power_kw` - Consumption while running (clamped to >= 0)
    /// * `run_hours` - Duration of the daily run (clamped to `[0, 24]`)
    /// * `window_start_h` - Earliest start hour (clamped to `[0, 24)`)
    /// * `window_end_h` - Latest start hour (clamped to `[window_start_h, 24)`)
    /// * `nominal_step_secs` - Interval assumed for the first step
    /// * `seed` - Random seed for reproducible start times
    pub fn new(
        power_kw: f64,
        run_hours: f64,
        window_start_h: f64,
        window_end_h: f64,
        nominal_step_secs: u64,
        seed: u64,
    ) -> Self {
        let window_start_h = clamp_or_low(window_start_h, 0.0, LATEST_START_H);
        Self {
            power_kw: power_kw.max(0.0),
            run_hours: clamp_or_low(run_hours, 0.0, HOURS_PER_DAY),
            window_start_h,
            window_end_h: clamp_or_low(window_end_h, window_start_h, LATEST_START_H),
            sampled_day: None,
            start_h: window_start_h,
            run_day: None,
            remaining_h: 0.0,
            state: ShiftableState::Off,
            timer: StepTimer::new(nominal_step_secs),
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn state(&self) -> ShiftableState {
        self.state
    }

    /// Start hour sampled for the current day.
    pub fn start_hour(&self) -> f64 {
        self.start_h
    }

    /// Whether the load still has to run on `day`: it is running now, or
    /// its run for that day has not started yet.
    pub fn pending_on(&self, day: u64) -> bool {
        self.run_hours > 0.0
            && (self.state == ShiftableState::On || self.run_day.is_none_or(|d| d < day))
    }

    fn sample_start_for_day(&mut self, day: u64) {
        self.start_h = if self.window_start_h < self.window_end_h {
            self.rng.random_range(self.window_start_h..=self.window_end_h)
        } else {
            self.window_start_h
        };
        self.sampled_day = Some(day);
    }

    fn window_open(&self, hour: f64) -> bool {
        hour >= self.window_start_h && hour <= self.window_end_h
    }
}

impl Device for ShiftableLoad {
    fn step(&mut self, context: &DeviceContext) -> DeviceOutput {
        let dt_hours = self.timer.elapsed_hours(context.timestamp);
        let day = context.timestamp / SECS_PER_DAY;
        let hour = (context.timestamp % SECS_PER_DAY) as f64 / 3600.0;

        if self.sampled_day.is_none_or(|d| d < day) {
            self.sample_start_for_day(day);
        }

        if self.state == ShiftableState::On {
            self.remaining_h -= dt_hours;
            if self.remaining_h <= 0.0 {
                self.remaining_h = 0.0;
                self.state = ShiftableState::Off;
            }
        }

        if self.state == ShiftableState::Off && self.pending_on(day) {
            let early = context.signal == MarketSignal::Command(Command::On) && self.window_open(hour);
            if hour >= self.start_h || early {
                self.state = ShiftableState::On;
                self.remaining_h = self.run_hours;
                self.run_day = Some(day);
            }
        }

        match self.state {
            ShiftableState::On => DeviceOutput::new(self.power_kw, self.remaining_h),
            ShiftableState::Off => DeviceOutput::new(0.0, 0.0),
        }
    }

    fn device_type(&self) -> &'static str {
        "ShiftableLoad"
    }
}
