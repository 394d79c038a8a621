use std::collections::BTreeMap;

use rand::{SeedableRng, rngs::StdRng};
use tracing::{debug, warn};

use crate::agents::{Bidder, Commitment, ParticipantStep};
use crate::devices::{Command, Device, DeviceClass, DeviceContext, DeviceKind, GeneratorState};
use crate::market::synth::{CurveProfile, composite_curve};
use crate::market::{ParticipantId, PriceGrid, RoundId};

const SECS_PER_DAY: u64 = 86_400;

/// Decision received since the last device step.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Decision {
    Accepted(f64),
    Rejected,
}

/// A household that bids one sigmoid per owned device class.
///
/// Curve parameters are redrawn every round from the class profiles. A
/// dispatchable class only bids while its device can act on the outcome:
/// storage with charging headroom, a shiftable load whose daily run is
/// still due, a generator whose best-case revenue covers its cost.
/// Dispatchable devices react to the round's decision on the next step:
/// storage learns from the cleared price, generators run when the price
/// covers their marginal cost.
#[derive(Debug)]
pub struct Prosumer {
    id: ParticipantId,
    latency_secs: u64,
    /// Nominal power per declared device class.
    classes: BTreeMap<DeviceClass, f64>,
    profiles: BTreeMap<DeviceClass, CurveProfile>,
    devices: Vec<DeviceKind>,
    readings: BTreeMap<String, f64>,
    pending: Option<Decision>,
    commitment: Commitment,
    rng: StdRng,
}

impl Prosumer {
    /// Creates a prosumer.
    ///
    /// # Arguments
    ///
    /// * `id` - Unique participant id
    /// * `latency_secs` - One-way message delay to the coordinator
    /// * `classes` - Declared device classes with their nominal power
    /// * `profiles` - Curve profile overrides; missing classes use the built-in table
    /// * `devices` - Dispatchable devices owned by this household
    /// * `seed` - Random seed for curve parameter draws
    pub fn new(
        id: ParticipantId,
        latency_secs: u64,
        classes: BTreeMap<DeviceClass, f64>,
        profiles: BTreeMap<DeviceClass, CurveProfile>,
        devices: Vec<DeviceKind>,
        seed: u64,
    ) -> Self {
        Self {
            id,
            latency_secs,
            classes,
            profiles,
            devices,
            readings: BTreeMap::new(),
            pending: None,
            commitment: Commitment::Pending,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn devices(&self) -> &[DeviceKind] {
        &self.devices
    }

    /// Classes that contribute a curve at `now`: declared with non-zero
    /// finite power, and not held back by their device's operating state.
    pub fn active_classes<'a>(
        &'a self,
        now: u64,
        grid: &'a PriceGrid,
    ) -> impl Iterator<Item = DeviceClass> + 'a {
        self.classes
            .iter()
            .filter(|(_, kw)| kw.is_finite() && **kw != 0.0)
            .map(|(class, _)| *class)
            .filter(move |class| self.class_bids(*class, now, grid))
    }

    fn class_bids(&self, class: DeviceClass, now: u64, grid: &PriceGrid) -> bool {
        let best_price = grid.prices().iter().copied().fold(f64::NEG_INFINITY, f64::max);
        self.devices
            .iter()
            .filter(|d| d.class() == class)
            .all(|device| match device {
                DeviceKind::Storage(s) => s.can_charge(),
                DeviceKind::Shiftable(l) => l.pending_on(now / SECS_PER_DAY),
                DeviceKind::Generator(g) => g.revenue_at(best_price) >= g.marginal_cost(),
            })
    }

    fn context_for(device: &DeviceKind, now: u64, decision: Option<Decision>) -> DeviceContext {
        match (device, decision) {
            (DeviceKind::Storage(_), Some(Decision::Accepted(price))) => {
                DeviceContext::with_price(now, price)
            }
            (DeviceKind::Generator(g), Some(Decision::Accepted(price))) => {
                let command = if g.revenue_at(price) >= g.marginal_cost() {
                    Command::On
                } else {
                    Command::Off
                };
                DeviceContext::with_command(now, command)
            }
            (DeviceKind::Generator(_), Some(Decision::Rejected)) => {
                DeviceContext::with_command(now, Command::Off)
            }
            _ => DeviceContext::new(now),
        }
    }
}

impl Bidder for Prosumer {
    fn id(&self) -> &ParticipantId {
        &self.id
    }

    fn latency_secs(&self) -> u64 {
        self.latency_secs
    }

    fn propose(&mut self, now: u64, round: RoundId, grid: &PriceGrid) -> Option<Vec<u8>> {
        self.commitment = Commitment::Pending;
        let profiles: Vec<CurveProfile> = self
            .active_classes(now, grid)
            .map(|class| {
                self.profiles
                    .get(&class)
                    .copied()
                    .unwrap_or(CurveProfile::for_class(class))
            })
            .collect();
        let curve = composite_curve(grid, &profiles, &mut self.rng);

        match curve.to_payload() {
            Ok(bytes) => {
                debug!(participant = %self.id, round = %round, classes = profiles.len(), "proposal");
                Some(bytes)
            }
            Err(e) => {
                warn!(participant = %self.id, error = %e, "failed to encode proposal");
                None
            }
        }
    }

    fn on_accept(&mut self, _round: RoundId, price: f64) {
        self.commitment = Commitment::Accepted(price);
        self.pending = Some(Decision::Accepted(price));
    }

    fn on_reject(&mut self, _round: RoundId) {
        self.commitment = Commitment::Rejected;
        self.pending = Some(Decision::Rejected);
    }

    fn commitment(&self) -> Commitment {
        self.commitment
    }

    fn observe(&mut self, readings: &BTreeMap<String, f64>) {
        for (name, value) in readings {
            if value.is_finite() {
                self.readings.insert(name.clone(), *value);
            }
        }
    }

    fn step(&mut self, now: u64) -> ParticipantStep {
        let decision = self.pending.take();
        let mut out = ParticipantStep {
            net_power_kw: self.readings.values().sum(),
            operating_cost: 0.0,
        };

        for device in &mut self.devices {
            let context = Self::context_for(device, now, decision);
            let result = device.step(&context);
            out.net_power_kw += result.power_kw;
            // An idle generator's aux is a quote, not a cost.
            if matches!(device, DeviceKind::Generator(g) if g.state() == GeneratorState::On) {
                out.operating_cost += result.aux;
            }
        }
        out
    }
}
