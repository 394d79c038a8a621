//! Integration tests for the baseline neighbourhood.

mod common;

use prosumer_market::config::ScenarioConfig;
use prosumer_market::sim::engine::{Engine, ExternalInputs};
use prosumer_market::sim::report::MarketReport;

#[test]
fn full_run_produces_correct_tick_count() {
    let mut engine = Engine::from_config(&common::short_baseline());
    let results = engine.run();
    assert_eq!(results.len(), 48);
    assert_eq!(engine.config().total_steps(), 48);
}

#[test]
fn every_baseline_round_clears_inside_the_grid() {
    let mut engine = Engine::from_config(&common::short_baseline());
    let results = engine.run();

    assert!(results.iter().all(|r| r.cleared));
    assert_eq!(engine.rounds().len(), 48);
    for record in engine.rounds() {
        let price = record.price().expect("baseline rounds clear");
        assert!((0.0..=5.0).contains(&price), "price {price} outside grid");
        assert_eq!(record.result.as_ref().map(|r| r.matched.len()), Some(4));
    }

    let report = MarketReport::from_rounds(engine.rounds());
    assert_eq!(report.cleared, 48);
    assert_eq!(report.failed, 0);
    assert!(report.min_price <= report.mean_price && report.mean_price <= report.max_price);
}

#[test]
fn market_waits_for_warm_up_week() {
    let mut engine = Engine::from_config(&ScenarioConfig::baseline());
    let results = engine.run();
    let week = 7 * 24;

    assert_eq!(results.len(), 8 * 24);
    assert!(results[..week].iter().all(|r| r.round.is_none() && r.clear_price == 0.0));
    assert!(results[week].cleared);
    assert_eq!(engine.rounds().len(), 24);
    assert_eq!(engine.rounds()[0].opened_at, 604_800);
}

#[test]
fn determinism_two_identical_runs_produce_identical_results() {
    let mut engine1 = Engine::from_config(&common::short_baseline());
    let mut engine2 = Engine::from_config(&common::short_baseline());

    let results1 = engine1.run();
    let results2 = engine2.run();

    assert_eq!(results1.len(), results2.len());
    for (r1, r2) in results1.iter().zip(results2.iter()) {
        assert_eq!(r1.clear_price, r2.clear_price);
        assert_eq!(r1.net_power_kw, r2.net_power_kw);
        assert_eq!(r1.operating_cost, r2.operating_cost);
    }
}

#[test]
fn different_seeds_produce_different_prices() {
    let mut other = common::short_baseline();
    other.simulation.seed = 7;

    let prices = |cfg: &ScenarioConfig| -> Vec<f64> {
        let mut engine = Engine::from_config(cfg);
        engine.run().iter().map(|r| r.clear_price).collect()
    };
    assert_ne!(prices(&common::short_baseline()), prices(&other));
}

#[test]
fn scheduler_step_returns_next_timestamp() {
    let mut engine = Engine::from_config(&common::short_baseline());
    let inputs = ExternalInputs::new();
    let mut t = 0;
    for _ in 0..3 {
        t = engine.step(t, &inputs);
    }
    assert_eq!(t, 3 * 3600);
    assert_eq!(engine.rounds().len(), 3);
    assert_eq!(engine.get_attr("clear_price"), Some(engine.clear_price()));
    assert!(engine.clear_price() > 0.0);
}
