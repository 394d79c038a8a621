//! Core simulation types: timing configuration, market schedule and tick records.

use std::fmt;

use serde::Serialize;

use crate::market::{RoundId, RoundPhase};

/// Centralized simulation timing.
///
/// # Examples
///
/// ```
/// use prosumer_market::sim::types::SimConfig;
///
/// let cfg = SimConfig::new(3600, 86_400, 42);
/// assert_eq!(cfg.step_hours, 1.0);
/// assert_eq!(cfg.total_steps(), 24);
/// ```
#[derive(Debug, Clone, Serialize)]
pub struct SimConfig {
    /// Scheduler increment in seconds.
    pub step_size_secs: u64,
    /// Length of the run in seconds.
    pub duration_secs: u64,
    /// Duration of one step in hours, derived from `step_size_secs`.
    pub step_hours: f64,
    /// Master random seed for reproducibility.
    pub seed: u64,
}

impl SimConfig {
    /// Creates a new simulation configuration.
    ///
    /// A zero step size is raised to one second.
    pub fn new(step_size_secs: u64, duration_secs: u64, seed: u64) -> Self {
        let step_size_secs = step_size_secs.max(1);
        Self {
            step_size_secs,
            duration_secs,
            step_hours: step_size_secs as f64 / 3600.0,
            seed,
        }
    }

    /// Number of scheduler steps needed to cover the run.
    pub fn total_steps(&self) -> u64 {
        self.duration_secs.div_ceil(self.step_size_secs)
    }
}

/// When negotiation rounds open.
///
/// Nothing happens before `start_secs`; afterwards a round opens every
/// `interval_secs`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MarketSchedule {
    pub start_secs: u64,
    pub interval_secs: u64,
}

impl MarketSchedule {
    pub fn new(start_secs: u64, interval_secs: u64) -> Self {
        Self {
            start_secs,
            interval_secs: interval_secs.max(1),
        }
    }

    /// First opening time strictly after `after`.
    pub fn next_after(&self, after: u64) -> u64 {
        if after < self.start_secs {
            return self.start_secs;
        }
        let elapsed = after - self.start_secs;
        self.start_secs + (elapsed / self.interval_secs + 1) * self.interval_secs
    }
}

/// Complete record of one engine tick.
#[derive(Debug, Clone, Serialize)]
pub struct TickResult {
    /// Simulation time in seconds.
    pub timestamp: u64,
    /// Coordinator phase after the tick.
    pub phase: RoundPhase,
    /// Round in flight after the tick, if any.
    pub round: Option<RoundId>,
    /// Latest clearing price (0.0 before the first cleared round).
    pub clear_price: f64,
    /// Whether a round was cleared during this tick.
    pub cleared: bool,
    /// Sum of participant net power (kW; positive = consumption).
    pub net_power_kw: f64,
    /// Generator operating cost incurred this tick.
    pub operating_cost: f64,
}

impl fmt::Display for TickResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let round = self.round.map_or_else(|| "-".to_string(), |r| r.to_string());
        write!(
            f,
            "t={:>8}s ({:>6.1}h) | phase={:<10} round={:<5} | price={:>6.3}{} | \
             net={:>7.2} kW  cost={:.2}",
            self.timestamp,
            self.timestamp as f64 / 3600.0,
            self.phase,
            round,
            self.clear_price,
            if self.cleared { "*" } else { " " },
            self.net_power_kw,
            self.operating_cost,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sim_config_basic() {
        let cfg = SimConfig::new(900, 86_400, 7);
        assert_eq!(cfg.step_hours, 0.25);
        assert_eq!(cfg.total_steps(), 96);
        assert_eq!(cfg.seed, 7);
    }

    #[test]
    fn sim_config_partial_last_step() {
        let cfg = SimConfig::new(3600, 5400, 0);
        assert_eq!(cfg.total_steps(), 2);
    }

    #[test]
    fn sim_config_zero_step_raised() {
        let cfg = SimConfig::new(0, 10, 0);
        assert_eq!(cfg.step_size_secs, 1);
        assert_eq!(cfg.total_steps(), 10);
    }

    #[test]
    fn schedule_waits_for_start() {
        let s = MarketSchedule::new(604_800, 3600);
        assert_eq!(s.next_after(0), 604_800);
        assert_eq!(s.next_after(604_800), 608_400);
        assert_eq!(s.next_after(605_000), 608_400);
    }

    #[test]
    fn tick_display_does_not_panic() {
        let t = TickResult {
            timestamp: 3600,
            phase: RoundPhase::Settling,
            round: Some(RoundId(2)),
            clear_price: 1.25,
            cleared: true,
            net_power_kw: -0.4,
            operating_cost: 0.0,
        };
        let s = format!("{t}");
        assert!(s.contains("#2"));
        assert!(s.contains("1.250*"));
    }
}
