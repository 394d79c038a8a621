/// Simulation clock for timestamp management.
pub mod clock;
/// Shared state accumulated across ticks.
pub mod context;
pub mod engine;
/// Post-hoc market statistics.
pub mod report;
pub mod types;
