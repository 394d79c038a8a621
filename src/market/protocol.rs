//! Coordinator side of the negotiation round.
//!
//! A round walks `Idle -> CfpSent -> Collecting -> Clearing -> Settling -> Idle`.
//! The coordinator never blocks: it is driven by [`Coordinator::poll`] with the
//! current simulation time and by the inbound proposal/ack entry points.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::MarketError;

use super::ParticipantId;
use super::clearing::{self, ClearingResult, CrossingRule};
use super::curve::{PriceGrid, PriceQuantityCurve};

/// Monotonically increasing round identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoundId(pub u64);

impl fmt::Display for RoundId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Lifecycle phase of the current round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoundPhase {
    #[default]
    Idle,
    CfpSent,
    Collecting,
    Clearing,
    Settling,
}

impl fmt::Display for RoundPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RoundPhase::Idle => "idle",
            RoundPhase::CfpSent => "cfp_sent",
            RoundPhase::Collecting => "collecting",
            RoundPhase::Clearing => "clearing",
            RoundPhase::Settling => "settling",
        };
        f.write_str(s)
    }
}

/// Messages exchanged between the coordinator and participants.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    CallForProposals { round: RoundId },
    Propose { round: RoundId, from: ParticipantId, payload: Vec<u8> },
    /// Price is carried as its decimal string encoding.
    Accept { round: RoundId, price: String },
    /// Carries no payload.
    Reject { round: RoundId },
    Ack { round: RoundId, from: ParticipantId },
}

impl Message {
    pub fn round(&self) -> RoundId {
        match self {
            Message::CallForProposals { round }
            | Message::Propose { round, .. }
            | Message::Accept { round, .. }
            | Message::Reject { round }
            | Message::Ack { round, .. } => *round,
        }
    }
}

/// A coordinator message addressed to one participant.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    pub to: ParticipantId,
    pub message: Message,
}

/// Timing and pricing knobs for the coordinator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoordinatorConfig {
    /// Seconds after the CFP at which silent participants time out.
    pub round_timeout_secs: u64,
    /// Seconds after the decision at which missing acks are given up on.
    pub settle_timeout_secs: u64,
    pub crossing_rule: CrossingRule,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            round_timeout_secs: 60,
            settle_timeout_secs: 60,
            crossing_rule: CrossingRule::Midpoint,
        }
    }
}

/// Summary of a finished (or superseded) round.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoundRecord {
    pub round: RoundId,
    pub opened_at: u64,
    pub cleared_at: Option<u64>,
    pub closed_at: u64,
    /// `None` when the round was superseded before clearing.
    pub result: Option<ClearingResult>,
    pub timed_out: BTreeSet<ParticipantId>,
    pub malformed: BTreeSet<ParticipantId>,
    pub unacknowledged: BTreeSet<ParticipantId>,
    pub superseded: bool,
}

impl RoundRecord {
    pub fn price(&self) -> Option<f64> {
        self.result.as_ref().and_then(|r| r.price)
    }
}

/// Output of one [`Coordinator::poll`] call.
#[derive(Debug, Default)]
pub struct PollOutcome {
    /// Decisions to deliver.
    pub outbound: Vec<Envelope>,
    /// Set when this poll cleared the round.
    pub cleared: Option<(RoundId, ClearingResult)>,
}

#[derive(Debug)]
struct RoundState {
    id: RoundId,
    opened_at: u64,
    deadline: u64,
    proposals: BTreeMap<ParticipantId, Vec<u8>>,
    cleared_at: Option<u64>,
    settle_deadline: u64,
    awaiting_ack: BTreeSet<ParticipantId>,
    result: Option<ClearingResult>,
    timed_out: BTreeSet<ParticipantId>,
    malformed: BTreeSet<ParticipantId>,
}

impl RoundState {
    fn into_record(self, closed_at: u64, superseded: bool) -> RoundRecord {
        RoundRecord {
            round: self.id,
            opened_at: self.opened_at,
            cleared_at: self.cleared_at,
            closed_at,
            result: self.result,
            timed_out: self.timed_out,
            malformed: self.malformed,
            unacknowledged: self.awaiting_ack,
            superseded,
        }
    }
}

/// Runs negotiation rounds against a fixed set of registered participants.
#[derive(Debug)]
pub struct Coordinator {
    grid: PriceGrid,
    config: CoordinatorConfig,
    participants: BTreeSet<ParticipantId>,
    phase: RoundPhase,
    last_round: u64,
    round: Option<RoundState>,
    finished: Vec<RoundRecord>,
}

impl Coordinator {
    pub fn new(grid: PriceGrid, config: CoordinatorConfig) -> Self {
        Self {
            grid,
            config,
            participants: BTreeSet::new(),
            phase: RoundPhase::Idle,
            last_round: 0,
            round: None,
            finished: Vec::new(),
        }
    }

    /// Adds a participant to every subsequent round. Returns `false` if it
    /// was already registered.
    pub fn register(&mut self, id: ParticipantId) -> bool {
        self.participants.insert(id)
    }

    pub fn participants(&self) -> &BTreeSet<ParticipantId> {
        &self.participants
    }

    pub fn grid(&self) -> &PriceGrid {
        &self.grid
    }

    pub fn phase(&self) -> RoundPhase {
        self.phase
    }

    pub fn current_round(&self) -> Option<RoundId> {
        self.round.as_ref().map(|r| r.id)
    }

    /// Starts a new round and returns the CFP for every participant.
    ///
    /// A round still in flight is superseded and its responses discarded.
    pub fn open_round(&mut self, now: u64) -> Vec<Envelope> {
        if let Some(stale) = self.round.take() {
            warn!(round = %stale.id, phase = %self.phase, "superseding round still in flight");
            self.finished.push(stale.into_record(now, true));
        }

        self.last_round += 1;
        let id = RoundId(self.last_round);
        self.round = Some(RoundState {
            id,
            opened_at: now,
            deadline: now.saturating_add(self.config.round_timeout_secs),
            proposals: BTreeMap::new(),
            cleared_at: None,
            settle_deadline: 0,
            awaiting_ack: BTreeSet::new(),
            result: None,
            timed_out: BTreeSet::new(),
            malformed: BTreeSet::new(),
        });
        self.phase = RoundPhase::CfpSent;
        info!(round = %id, participants = self.participants.len(), "call for proposals");

        self.participants
            .iter()
            .map(|p| Envelope {
                to: p.clone(),
                message: Message::CallForProposals { round: id },
            })
            .collect()
    }

    /// Records a participant's curve payload for the current round.
    ///
    /// A second proposal from the same participant replaces the first.
    ///
    /// # Errors
    ///
    /// Fails for unknown participants, a mismatched round id, or when the
    /// round is no longer collecting.
    pub fn receive_proposal(
        &mut self,
        round: RoundId,
        from: &ParticipantId,
        payload: Vec<u8>,
    ) -> Result<(), MarketError> {
        if !self.participants.contains(from) {
            return Err(MarketError::UnknownParticipant(from.to_string()));
        }
        let phase = self.phase;
        let state = self.round.as_mut().ok_or(MarketError::NoRoundInFlight)?;
        if state.id != round {
            return Err(MarketError::StaleRound {
                expected: state.id,
                got: round,
            });
        }
        if !matches!(phase, RoundPhase::CfpSent | RoundPhase::Collecting) {
            return Err(MarketError::NotCollecting { phase });
        }

        if state.proposals.insert(from.clone(), payload).is_some() {
            debug!(round = %round, participant = %from, "proposal replaced");
        } else {
            debug!(round = %round, participant = %from, "proposal received");
        }
        self.phase = RoundPhase::Collecting;
        Ok(())
    }

    /// Records a participant's acknowledgement of the decision.
    ///
    /// # Errors
    ///
    /// Fails for unknown participants, a mismatched round id, or when the
    /// round is not settling.
    pub fn receive_ack(&mut self, round: RoundId, from: &ParticipantId) -> Result<(), MarketError> {
        if !self.participants.contains(from) {
            return Err(MarketError::UnknownParticipant(from.to_string()));
        }
        let phase = self.phase;
        let state = self.round.as_mut().ok_or(MarketError::NoRoundInFlight)?;
        if state.id != round {
            return Err(MarketError::StaleRound {
                expected: state.id,
                got: round,
            });
        }
        if phase != RoundPhase::Settling {
            return Err(MarketError::NotSettling { phase });
        }
        if state.awaiting_ack.remove(from) {
            debug!(round = %round, participant = %from, "ack received");
        }
        Ok(())
    }

    /// Advances the round according to the time and responses seen so far.
    pub fn poll(&mut self, now: u64) -> PollOutcome {
        let mut outcome = PollOutcome::default();

        if self.phase == RoundPhase::CfpSent {
            self.phase = RoundPhase::Collecting;
        }

        if self.phase == RoundPhase::Collecting {
            let Some(state) = self.round.as_mut() else {
                self.phase = RoundPhase::Idle;
                return outcome;
            };
            let all_in = self
                .participants
                .iter()
                .all(|p| state.proposals.contains_key(p));
            if all_in || now >= state.deadline {
                state.timed_out = self
                    .participants
                    .iter()
                    .filter(|p| !state.proposals.contains_key(*p))
                    .cloned()
                    .collect();
                if !state.timed_out.is_empty() {
                    warn!(round = %state.id, silent = state.timed_out.len(), "proposal deadline passed");
                }
                self.phase = RoundPhase::Clearing;
            }
        }

        if self.phase == RoundPhase::Clearing {
            let (cleared, outbound) = self.settle_decisions(now);
            outcome.outbound = outbound;
            outcome.cleared = cleared;
            self.phase = RoundPhase::Settling;
        }

        if self.phase == RoundPhase::Settling {
            let done = match self.round.as_ref() {
                Some(state) => state.awaiting_ack.is_empty() || now >= state.settle_deadline,
                None => true,
            };
            if done {
                self.close_round(now);
            }
        }

        outcome
    }

    /// Drains records of rounds closed or superseded since the last call.
    pub fn take_finished(&mut self) -> Vec<RoundRecord> {
        std::mem::take(&mut self.finished)
    }

    fn settle_decisions(&mut self, now: u64) -> (Option<(RoundId, ClearingResult)>, Vec<Envelope>) {
        let Some(state) = self.round.as_mut() else {
            return (None, Vec::new());
        };

        let mut curves = BTreeMap::new();
        for (id, payload) in std::mem::take(&mut state.proposals) {
            match PriceQuantityCurve::from_payload(&payload) {
                Ok(curve) => {
                    curves.insert(id, curve);
                }
                Err(e) => {
                    warn!(round = %state.id, participant = %id, error = %e, "rejecting malformed proposal");
                    state.malformed.insert(id);
                }
            }
        }

        let mut result = clearing::clear(&self.grid, &curves, self.config.crossing_rule);
        result.unmatched.extend(state.malformed.iter().cloned());

        match result.price {
            Some(price) => info!(
                round = %state.id,
                price,
                matched = result.matched.len(),
                unmatched = result.unmatched.len(),
                "round cleared"
            ),
            None => info!(round = %state.id, bids = curves.len(), "no equilibrium"),
        }

        let mut outbound = Vec::with_capacity(result.matched.len() + result.unmatched.len());
        if let Some(price) = result.price {
            for p in &result.matched {
                outbound.push(Envelope {
                    to: p.clone(),
                    message: Message::Accept {
                        round: state.id,
                        price: price.to_string(),
                    },
                });
            }
        }
        for p in &result.unmatched {
            outbound.push(Envelope {
                to: p.clone(),
                message: Message::Reject { round: state.id },
            });
        }

        state.awaiting_ack = outbound.iter().map(|e| e.to.clone()).collect();
        state.cleared_at = Some(now);
        state.settle_deadline = now.saturating_add(self.config.settle_timeout_secs);
        state.result = Some(result.clone());
        (Some((state.id, result)), outbound)
    }

    fn close_round(&mut self, now: u64) {
        if let Some(state) = self.round.take() {
            if !state.awaiting_ack.is_empty() {
                warn!(round = %state.id, missing = state.awaiting_ack.len(), "settlement deadline passed");
            }
            debug!(round = %state.id, "round closed");
            self.finished.push(state.into_record(now, false));
        }
        self.phase = RoundPhase::Idle;
    }
}
