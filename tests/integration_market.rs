//! End-to-end market rounds over hand-checked curves.

mod common;

use std::collections::BTreeMap;

use prosumer_market::agents::Commitment;
use prosumer_market::devices::{Command, Device, DeviceContext, Storage};
use prosumer_market::market::clearing::clear;
use prosumer_market::market::{CrossingRule, ParticipantId, PriceQuantityCurve, RoundPhase};
use prosumer_market::sim::engine::ExternalInputs;

fn id(s: &str) -> ParticipantId {
    ParticipantId::from(s)
}

#[test]
fn single_increasing_curve_clears_at_midpoint() {
    let proposals = BTreeMap::from([(id("a"), common::curve(&[-3.0, -1.0, 1.0, 3.0]))]);
    let result = clear(&common::small_grid(), &proposals, CrossingRule::Midpoint);
    assert_eq!(result.price, Some(1.5));
    assert!(result.matched.contains(&id("a")));
}

#[test]
fn one_sided_curves_have_no_equilibrium() {
    for values in [[1.0, 2.0, 3.0, 4.0], [-4.0, -3.0, -2.0, -1.0]] {
        let proposals = BTreeMap::from([(id("a"), common::curve(&values))]);
        let result = clear(&common::small_grid(), &proposals, CrossingRule::Midpoint);
        assert_eq!(result.price, None);
        assert!(result.matched.is_empty());
        assert!(result.unmatched.contains(&id("a")));
    }
}

#[test]
fn three_participant_round_through_engine() {
    // aggregate [2, 0, -3, -3] crosses in [0, 1]
    let mut engine = common::small_engine(vec![
        common::FixedBidder::boxed("a", 0, &[3.0, 1.0, -1.0, -1.0]),
        common::FixedBidder::boxed("b", 0, &[-2.0, -2.0, -2.0, -2.0]),
        common::FixedBidder::boxed("c", 0, &[1.0, 1.0, 0.0, 0.0]),
    ]);

    let tick = engine.advance(0, &ExternalInputs::new());
    assert!(tick.cleared);
    assert_eq!(tick.clear_price, 0.5);
    assert_eq!(tick.phase, RoundPhase::Idle);
    for p in ["a", "b", "c"] {
        assert_eq!(engine.commitment(&id(p)), Some(Commitment::Accepted(0.5)));
    }

    let record = &engine.rounds()[0];
    assert_eq!(record.price(), Some(0.5));
    assert!(record.timed_out.is_empty());
    assert!(record.unacknowledged.is_empty());
}

#[test]
fn clear_price_persists_until_next_successful_round() {
    let mut engine = common::small_engine(vec![common::FixedBidder::boxed(
        "a",
        0,
        &[-3.0, -1.0, 1.0, 3.0],
    )]);
    assert_eq!(engine.clear_price(), 0.0);

    let results = engine.run();
    assert_eq!(results.len(), 4);
    assert!(results.iter().all(|r| r.clear_price == 1.5));
    assert_eq!(engine.rounds().len(), 4);
    assert_eq!(engine.context().history.len(), 4);
}

#[test]
fn late_proposal_is_discarded_after_timeout() {
    let mut engine = common::small_engine(vec![
        common::FixedBidder::boxed("a", 0, &[-3.0, -1.0, 1.0, 3.0]),
        // would flip the aggregate sign everywhere if it made the deadline
        common::FixedBidder::boxed("late", 1800, &[10.0, 10.0, 10.0, 10.0]),
    ]);

    let first = engine.advance(0, &ExternalInputs::new());
    assert!(!first.cleared);

    // deadline at 600, next tick is at 3600: round 1 clears with "a" only,
    // then round 2 opens
    let second = engine.advance(3600, &ExternalInputs::new());
    assert!(second.cleared);
    assert_eq!(second.clear_price, 1.5);

    let record = &engine.rounds()[0];
    assert!(record.timed_out.contains(&id("late")));
    assert_eq!(engine.commitment(&id("late")), Some(Commitment::Pending));
}

#[test]
fn curve_payload_round_trip_is_byte_exact() {
    let curve = PriceQuantityCurve::new(vec![0.0, 0.1, 0.2], vec![1.0 / 3.0, -2.5e-7, 0.0])
        .expect("lengths match");
    let bytes = curve.to_payload().expect("encodes");
    let decoded = PriceQuantityCurve::from_payload(&bytes).expect("decodes");
    assert_eq!(decoded, curve);
    assert_eq!(decoded.to_payload().expect("encodes"), bytes);
}

#[test]
fn full_storage_commanded_to_load_draws_nothing() {
    let mut storage = Storage::new(2.0, 10.0, 1.0, 10.0, 3600);
    let out = storage.step(&DeviceContext::with_command(0, Command::Charge));
    assert_eq!(out.power_kw, 0.0);
    assert_eq!(storage.stored_kwh(), 10.0);
}
