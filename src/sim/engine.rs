//! Simulation engine that drives the coordinator, routes protocol messages
//! and steps every participant.

use std::collections::{BTreeMap, VecDeque};

use tracing::{debug, info, warn};

use crate::agents::{Bidder, Commitment, Prosumer, Utility};
use crate::config::ScenarioConfig;
use crate::devices::{DeviceClass, DeviceKind, Generator, ShiftableLoad, Storage};
use crate::market::protocol::{CoordinatorConfig, Envelope, RoundRecord};
use crate::market::{Coordinator, Message, ParticipantId, PriceGrid};

use super::clock::Clock;
use super::context::SimulationContext;
use super::types::{MarketSchedule, SimConfig, TickResult};

/// Measured device powers: entity id → attribute name → value.
pub type ExternalInputs = BTreeMap<String, BTreeMap<String, f64>>;

/// Seed offset between consecutive participants.
const SEED_STRIDE: u64 = 1000;

#[derive(Debug, Clone, PartialEq)]
enum Address {
    Coordinator,
    Participant(ParticipantId),
}

/// A message in flight, delivered once the clock reaches `deliver_at`.
#[derive(Debug, Clone)]
struct Queued {
    deliver_at: u64,
    to: Address,
    message: Message,
}

/// Simulation engine owning the coordinator, all bidders and the event queue.
///
/// Holds bidders as trait objects since the participant set comes from
/// configuration.
pub struct Engine {
    config: SimConfig,
    schedule: MarketSchedule,
    coordinator: Coordinator,
    bidders: Vec<Box<dyn Bidder>>,
    index: BTreeMap<ParticipantId, usize>,
    queue: VecDeque<Queued>,
    context: SimulationContext,
    next_round_at: u64,
    latest: Option<TickResult>,
}

impl Engine {
    /// Creates an engine with no participants.
    ///
    /// # Arguments
    ///
    /// * `config` - Simulation timing
    /// * `schedule` - When rounds open
    /// * `grid` - Price grid every curve must be sampled on
    /// * `coordinator` - Round deadlines and crossing rule
    pub fn new(
        config: SimConfig,
        schedule: MarketSchedule,
        grid: PriceGrid,
        coordinator: CoordinatorConfig,
    ) -> Self {
        Self {
            config,
            schedule,
            coordinator: Coordinator::new(grid, coordinator),
            bidders: Vec::new(),
            index: BTreeMap::new(),
            queue: VecDeque::new(),
            context: SimulationContext::default(),
            next_round_at: schedule.start_secs,
            latest: None,
        }
    }

    /// Builds the utility and all prosumer households described by `scenario`.
    ///
    /// The scenario is expected to have passed [`ScenarioConfig::validate`].
    pub fn from_config(scenario: &ScenarioConfig) -> Self {
        let sim = &scenario.simulation;
        let market = &scenario.market;

        let mut engine = Self::new(
            SimConfig::new(sim.step_size_secs, sim.duration_secs, sim.seed),
            MarketSchedule::new(market.market_start_secs, market.round_interval_secs),
            PriceGrid::linspace(market.price_min, market.price_max, market.grid_points),
            CoordinatorConfig {
                round_timeout_secs: market.round_timeout_secs,
                settle_timeout_secs: market.settle_timeout_secs,
                crossing_rule: market.crossing_rule,
            },
        );

        let u = &scenario.utility;
        engine.add_bidder(Box::new(Utility::new(
            ParticipantId::new(u.id.as_str()),
            u.latency_secs,
            u.low,
            u.high,
        )));

        for (i, p) in scenario.participants.iter().enumerate() {
            let seed = sim.seed.wrapping_add(SEED_STRIDE * (i as u64 + 1));
            let classes: BTreeMap<DeviceClass, f64> = p
                .devices
                .iter()
                .map(|(class, spec)| (*class, spec.value))
                .collect();
            let devices = build_devices(scenario, &classes, seed);
            engine.add_bidder(Box::new(Prosumer::new(
                ParticipantId::new(p.id.as_str()),
                p.latency_secs,
                classes,
                scenario.curves.clone(),
                devices,
                seed,
            )));
        }

        engine
    }

    /// Registers a bidder with the coordinator.
    ///
    /// Returns `false` and drops the bidder if its id is already taken.
    pub fn add_bidder(&mut self, bidder: Box<dyn Bidder>) -> bool {
        let id = bidder.id().clone();
        if self.index.contains_key(&id) {
            warn!(participant = %id, "duplicate participant id, skipping");
            return false;
        }
        self.coordinator.register(id.clone());
        self.index.insert(id, self.bidders.len());
        self.bidders.push(bidder);
        true
    }

    /// Advances the market to `timestamp` and returns the tick record.
    ///
    /// # Arguments
    ///
    /// * `timestamp` - Current simulation time in seconds
    /// * `inputs` - Measured device powers keyed by participant id
    pub fn advance(&mut self, timestamp: u64, inputs: &ExternalInputs) -> TickResult {
        self.context.now = timestamp;

        // 1. Route measured device powers
        for (entity, readings) in inputs {
            match self.index.get(&ParticipantId::new(entity.as_str())) {
                Some(&i) => self.bidders[i].observe(readings),
                None => debug!(entity = %entity, "readings for unknown participant ignored"),
            }
        }

        // 2. Deliver pending traffic for the round in flight
        let mut cleared = self.pump(timestamp);

        // 3. Open a round when one is due
        if timestamp >= self.next_round_at {
            let cfps = self.coordinator.open_round(timestamp);
            for envelope in cfps {
                self.send_to_participant(timestamp, envelope);
            }
            self.next_round_at = self.schedule.next_after(timestamp);
        }

        // 4. Deliver traffic for the new round
        cleared |= self.pump(timestamp);

        // 5. Archive finished rounds
        for record in self.coordinator.take_finished() {
            debug!(
                round = %record.round,
                price = ?record.price(),
                timed_out = record.timed_out.len(),
                superseded = record.superseded,
                "round archived"
            );
            self.context.archive(record);
        }

        // 6. Step participants
        let mut net_power_kw = 0.0;
        let mut operating_cost = 0.0;
        for bidder in &mut self.bidders {
            let out = bidder.step(timestamp);
            net_power_kw += out.net_power_kw;
            operating_cost += out.operating_cost;
        }

        // 7. Build result
        let result = TickResult {
            timestamp,
            phase: self.coordinator.phase(),
            round: self.coordinator.current_round(),
            clear_price: self.context.clear_price,
            cleared,
            net_power_kw,
            operating_cost,
        };
        self.latest = Some(result.clone());
        result
    }

    /// Scheduler entry point: advances to `timestamp` and returns the next
    /// time the engine wants to be called.
    pub fn step(&mut self, timestamp: u64, inputs: &ExternalInputs) -> u64 {
        self.advance(timestamp, inputs);
        timestamp.saturating_add(self.config.step_size_secs)
    }

    /// Runs the whole configured window without external readings.
    pub fn run(&mut self) -> Vec<TickResult> {
        let inputs = ExternalInputs::new();
        let mut results = Vec::with_capacity(self.config.total_steps() as usize);
        let mut clock = Clock::new(0, self.config.duration_secs, self.config.step_size_secs);
        while let Some(t) = clock.tick() {
            results.push(self.advance(t, &inputs));
        }
        info!(
            ticks = results.len(),
            rounds = self.context.rounds.len(),
            clear_price = self.context.clear_price,
            "run complete"
        );
        results
    }

    /// Latest clearing price, 0.0 before the first cleared round.
    pub fn clear_price(&self) -> f64 {
        self.context.clear_price
    }

    /// Looks up a scheduler-facing output attribute.
    pub fn get_attr(&self, name: &str) -> Option<f64> {
        match name {
            "clear_price" => Some(self.context.clear_price),
            _ => None,
        }
    }

    pub fn commitment(&self, id: &ParticipantId) -> Option<Commitment> {
        self.index.get(id).map(|&i| self.bidders[i].commitment())
    }

    pub fn participants(&self) -> impl Iterator<Item = &ParticipantId> {
        self.index.keys()
    }

    pub fn context(&self) -> &SimulationContext {
        &self.context
    }

    pub fn rounds(&self) -> &[RoundRecord] {
        &self.context.rounds
    }

    pub fn coordinator(&self) -> &Coordinator {
        &self.coordinator
    }

    pub fn latest(&self) -> Option<&TickResult> {
        self.latest.as_ref()
    }

    /// Returns a reference to the simulation configuration.
    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    /// Delivers due messages and polls the coordinator until neither
    /// produces anything new. Returns whether a price was cleared.
    fn pump(&mut self, now: u64) -> bool {
        let mut cleared = false;
        loop {
            let delivered = self.deliver_due(now);

            let outcome = self.coordinator.poll(now);
            let sent = !outcome.outbound.is_empty();
            for envelope in outcome.outbound {
                self.send_to_participant(now, envelope);
            }
            if let Some(price) = outcome.cleared.and_then(|(_, result)| result.price) {
                self.context.record_price(price);
                cleared = true;
            }

            if delivered == 0 && !sent {
                return cleared;
            }
        }
    }

    fn deliver_due(&mut self, now: u64) -> usize {
        let (due, pending): (VecDeque<Queued>, VecDeque<Queued>) = self
            .queue
            .drain(..)
            .partition(|q| q.deliver_at <= now);
        self.queue = pending;

        let count = due.len();
        for q in due {
            match q.to {
                Address::Coordinator => self.deliver_to_coordinator(q.message),
                Address::Participant(id) => self.deliver_to_participant(now, &id, q.message),
            }
        }
        count
    }

    fn deliver_to_coordinator(&mut self, message: Message) {
        let result = match message {
            Message::Propose {
                round,
                from,
                payload,
            } => self.coordinator.receive_proposal(round, &from, payload),
            Message::Ack { round, from } => self.coordinator.receive_ack(round, &from),
            other => {
                debug!(round = %other.round(), "coordinator ignores {other:?}");
                Ok(())
            }
        };
        if let Err(e) = result {
            debug!(error = %e, "message discarded");
        }
    }

    fn deliver_to_participant(&mut self, now: u64, id: &ParticipantId, message: Message) {
        let Some(&i) = self.index.get(id) else {
            debug!(participant = %id, "message for unknown participant dropped");
            return;
        };
        let bidder = &mut self.bidders[i];
        let reply_at = now.saturating_add(bidder.latency_secs());

        let reply = match message {
            Message::CallForProposals { round } => bidder
                .propose(now, round, self.coordinator.grid())
                .map(|payload| Message::Propose {
                    round,
                    from: id.clone(),
                    payload,
                }),
            Message::Accept { round, price } => {
                match price.parse::<f64>() {
                    Ok(p) if p.is_finite() => bidder.on_accept(round, p),
                    _ => {
                        warn!(participant = %id, round = %round, price = %price, "unparseable accept price, treating as reject");
                        bidder.on_reject(round);
                    }
                }
                Some(Message::Ack {
                    round,
                    from: id.clone(),
                })
            }
            Message::Reject { round } => {
                bidder.on_reject(round);
                Some(Message::Ack {
                    round,
                    from: id.clone(),
                })
            }
            other => {
                debug!(participant = %id, "participant ignores {other:?}");
                None
            }
        };

        if let Some(message) = reply {
            self.queue.push_back(Queued {
                deliver_at: reply_at,
                to: Address::Coordinator,
                message,
            });
        }
    }

    fn send_to_participant(&mut self, now: u64, envelope: Envelope) {
        let latency = self
            .index
            .get(&envelope.to)
            .map_or(0, |&i| self.bidders[i].latency_secs());
        self.queue.push_back(Queued {
            deliver_at: now.saturating_add(latency),
            to: Address::Participant(envelope.to),
            message: envelope.message,
        });
    }
}

/// Instantiates the dispatchable devices for a household's declared classes.
fn build_devices(
    scenario: &ScenarioConfig,
    classes: &BTreeMap<DeviceClass, f64>,
    seed: u64,
) -> Vec<DeviceKind> {
    let step = scenario.simulation.step_size_secs;
    let d = &scenario.devices;

    classes
        .iter()
        .filter(|(class, kw)| class.is_dispatchable() && kw.is_finite() && **kw > 0.0)
        .filter_map(|(class, &kw)| match class {
            DeviceClass::StorageDevice => Some(DeviceKind::Storage(Storage::new(
                kw,
                d.storage.max_capacity_kwh,
                d.storage.min_backup_kwh,
                d.storage.initial_kwh,
                step,
            ))),
            DeviceClass::FreelyControlGen => Some(DeviceKind::Generator(Generator::new(
                kw,
                d.generator.fuel_price,
                d.generator.fuel_rate,
                d.generator.maintenance_rate,
                d.generator.startup_cost,
                scenario.market.round_interval_secs,
            ))),
            DeviceClass::ShiftableLoad => Some(DeviceKind::Shiftable(ShiftableLoad::new(
                kw,
                d.shiftable.run_hours,
                d.shiftable.window_start_h,
                d.shiftable.window_end_h,
                step,
                seed.wrapping_add(1),
            ))),
            _ => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::ParticipantStep;
    use crate::market::{PriceQuantityCurve, RoundId, RoundPhase};

    /// Bids a fixed curve, optionally garbage.
    struct Fixed {
        id: ParticipantId,
        latency: u64,
        values: Vec<f64>,
        garbage: bool,
        commitment: Commitment,
    }

    impl Fixed {
        fn boxed(id: &str, latency: u64, values: &[f64]) -> Box<dyn Bidder> {
            Box::new(Self {
                id: ParticipantId::from(id),
                latency,
                values: values.to_vec(),
                garbage: false,
                commitment: Commitment::Pending,
            })
        }
    }

    impl Bidder for Fixed {
        fn id(&self) -> &ParticipantId {
            &self.id
        }

        fn latency_secs(&self) -> u64 {
            self.latency
        }

        fn propose(&mut self, _now: u64, _round: RoundId, grid: &PriceGrid) -> Option<Vec<u8>> {
            if self.garbage {
                return Some(b"{\"grid\":".to_vec());
            }
            PriceQuantityCurve::new(grid.prices().to_vec(), self.values.clone())
                .and_then(|c| c.to_payload())
                .ok()
        }

        fn on_accept(&mut self, _round: RoundId, price: f64) {
            self.commitment = Commitment::Accepted(price);
        }

        fn on_reject(&mut self, _round: RoundId) {
            self.commitment = Commitment::Rejected;
        }

        fn commitment(&self) -> Commitment {
            self.commitment
        }

        fn step(&mut self, _now: u64) -> ParticipantStep {
            ParticipantStep::default()
        }
    }

    fn engine(step: u64, start: u64) -> Engine {
        Engine::new(
            SimConfig::new(step, 86_400, 1),
            MarketSchedule::new(start, 3600),
            PriceGrid::from_prices(vec![0.0, 1.0, 2.0, 3.0]),
            CoordinatorConfig {
                round_timeout_secs: 600,
                settle_timeout_secs: 600,
                ..CoordinatorConfig::default()
            },
        )
    }

    #[test]
    fn zero_latency_round_clears_in_one_tick() {
        let mut e = engine(3600, 0);
        e.add_bidder(Fixed::boxed("a", 0, &[2.0, 1.0, 0.0, -1.0]));
        e.add_bidder(Fixed::boxed("b", 0, &[-1.0, -2.0, -3.0, -4.0]));

        let tick = e.advance(0, &ExternalInputs::new());
        assert!(tick.cleared);
        assert_eq!(tick.clear_price, 0.5);
        assert_eq!(tick.phase, RoundPhase::Idle);
        assert_eq!(e.clear_price(), 0.5);
        assert_eq!(e.get_attr("clear_price"), Some(0.5));
        assert_eq!(e.get_attr("voltage"), None);
        assert_eq!(e.commitment(&ParticipantId::from("a")), Some(Commitment::Accepted(0.5)));
        assert_eq!(e.rounds().len(), 1);
    }

    #[test]
    fn no_rounds_before_market_start() {
        let mut e = engine(3600, 7200);
        e.add_bidder(Fixed::boxed("a", 0, &[-3.0, -1.0, 1.0, 3.0]));
        let tick = e.advance(0, &ExternalInputs::new());
        assert_eq!(tick.round, None);
        assert_eq!(e.clear_price(), 0.0);
        assert_eq!(e.step(3600, &ExternalInputs::new()), 7200);
        assert!(e.rounds().is_empty());
        assert!(e.advance(7200, &ExternalInputs::new()).cleared);
    }

    #[test]
    fn latency_delays_clearing() {
        let mut e = engine(300, 0);
        e.add_bidder(Fixed::boxed("a", 0, &[-3.0, -1.0, 1.0, 3.0]));
        e.add_bidder(Fixed::boxed("slow", 300, &[0.0, 0.0, 0.0, 0.0]));

        let tick = e.advance(0, &ExternalInputs::new());
        assert!(!tick.cleared);
        assert_eq!(tick.phase, RoundPhase::Collecting);

        // CFP arrives at 300, proposal reaches the coordinator at 600
        assert!(!e.advance(300, &ExternalInputs::new()).cleared);
        let tick = e.advance(600, &ExternalInputs::new());
        assert!(tick.cleared);
        assert_eq!(tick.clear_price, 1.5);
        assert_eq!(tick.phase, RoundPhase::Settling);

        // accept reaches slow at 900, its ack lands at 1200
        assert_eq!(e.advance(900, &ExternalInputs::new()).phase, RoundPhase::Settling);
        assert_eq!(e.advance(1200, &ExternalInputs::new()).phase, RoundPhase::Idle);
        assert!(e.rounds()[0].unacknowledged.is_empty());
    }

    #[test]
    fn silent_participant_times_out() {
        let mut e = engine(300, 0);
        e.add_bidder(Fixed::boxed("a", 0, &[-3.0, -1.0, 1.0, 3.0]));
        e.add_bidder(Fixed::boxed("slow", 900, &[0.0, 0.0, 0.0, 0.0]));

        e.advance(0, &ExternalInputs::new());
        e.advance(300, &ExternalInputs::new());
        let tick = e.advance(600, &ExternalInputs::new());
        assert!(tick.cleared);
        assert_eq!(tick.clear_price, 1.5);

        let mut t = 900;
        while e.rounds().is_empty() && t < 3600 {
            e.advance(t, &ExternalInputs::new());
            t += 300;
        }
        let record = &e.rounds()[0];
        assert!(record.timed_out.contains(&ParticipantId::from("slow")));
        assert_eq!(record.price(), Some(1.5));
    }

    #[test]
    fn malformed_payload_is_rejected() {
        let mut e = engine(3600, 0);
        e.add_bidder(Fixed::boxed("a", 0, &[-3.0, -1.0, 1.0, 3.0]));
        e.add_bidder(Box::new(Fixed {
            id: ParticipantId::from("bad"),
            latency: 0,
            values: Vec::new(),
            garbage: true,
            commitment: Commitment::Pending,
        }));

        e.advance(0, &ExternalInputs::new());
        assert_eq!(e.commitment(&ParticipantId::from("bad")), Some(Commitment::Rejected));
        assert_eq!(e.commitment(&ParticipantId::from("a")), Some(Commitment::Accepted(1.5)));
        assert!(e.rounds()[0].malformed.contains(&ParticipantId::from("bad")));
    }

    #[test]
    fn no_equilibrium_keeps_previous_price() {
        let mut e = engine(3600, 0);
        e.add_bidder(Fixed::boxed("a", 0, &[-3.0, -1.0, 1.0, 3.0]));
        e.advance(0, &ExternalInputs::new());
        assert_eq!(e.clear_price(), 1.5);

        let mut e2 = engine(3600, 0);
        e2.add_bidder(Fixed::boxed("a", 0, &[1.0, 1.0, 1.0, 1.0]));
        let tick = e2.advance(0, &ExternalInputs::new());
        assert!(!tick.cleared);
        assert_eq!(e2.clear_price(), 0.0);
        assert_eq!(e2.commitment(&ParticipantId::from("a")), Some(Commitment::Rejected));
        assert_eq!(e2.rounds()[0].price(), None);
    }

    #[test]
    fn duplicate_bidder_is_skipped() {
        let mut e = engine(3600, 0);
        assert!(e.add_bidder(Fixed::boxed("a", 0, &[0.0; 4])));
        assert!(!e.add_bidder(Fixed::boxed("a", 0, &[0.0; 4])));
        assert_eq!(e.participants().count(), 1);
    }

    #[test]
    fn from_config_builds_all_participants() {
        let scenario = ScenarioConfig::baseline();
        let e = Engine::from_config(&scenario);
        let ids: Vec<&str> = e.participants().map(|p| p.as_str()).collect();
        assert_eq!(ids, vec!["house-1", "house-2", "house-3", "utility"]);
        assert_eq!(e.coordinator().participants().len(), 4);
        assert_eq!(e.coordinator().grid().len(), 50);
    }

    #[test]
    fn readings_reach_participants() {
        let mut scenario = ScenarioConfig::baseline();
        scenario.participants.truncate(1);
        scenario.participants[0].devices.clear();
        let mut e = Engine::from_config(&scenario);

        let inputs = ExternalInputs::from([
            (
                "house-1".to_string(),
                BTreeMap::from([("user_action_device".to_string(), 2.5)]),
            ),
            ("nobody".to_string(), BTreeMap::from([("x".to_string(), 9.0)])),
        ]);
        let tick = e.advance(0, &inputs);
        assert_eq!(tick.net_power_kw, 2.5);
    }
}
