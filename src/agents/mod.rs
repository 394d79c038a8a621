//! Market participants: prosumer households and the utility.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::market::{ParticipantId, PriceGrid, RoundId};

/// Household owning devices and bidding their aggregate curve.
pub mod prosumer;
/// Grid utility bidding a two-anchor line.
pub mod utility;

pub use prosumer::Prosumer;
pub use utility::Utility;

/// Outcome of a participant's latest proposal.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
#[serde(rename_all = "snake_case", tag = "status", content = "price")]
pub enum Commitment {
    #[default]
    Pending,
    Accepted(f64),
    Rejected,
}

/// What a participant did during one simulation tick.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct ParticipantStep {
    /// Net power, positive = consumption (kW).
    pub net_power_kw: f64,
    /// Operating cost incurred by dispatchable generation this tick.
    pub operating_cost: f64,
}

/// A participant in the negotiation protocol.
///
/// The engine delivers protocol messages through these callbacks and steps
/// each participant's devices once per tick.
pub trait Bidder {
    fn id(&self) -> &ParticipantId;

    /// One-way message delay to and from the coordinator, in seconds.
    fn latency_secs(&self) -> u64 {
        0
    }

    /// Answers a call for proposals delivered at `now` with a serialized
    /// curve, or `None` to stay silent this round.
    fn propose(&mut self, now: u64, round: RoundId, grid: &PriceGrid) -> Option<Vec<u8>>;

    fn on_accept(&mut self, round: RoundId, price: f64);

    fn on_reject(&mut self, round: RoundId);

    fn commitment(&self) -> Commitment;

    /// Stores the latest externally measured device powers.
    fn observe(&mut self, _readings: &BTreeMap<String, f64>) {}

    /// Advances owned devices to `now`.
    fn step(&mut self, now: u64) -> ParticipantStep;
}
