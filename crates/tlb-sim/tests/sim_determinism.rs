//! Fabric simulation integration tests.
//!
//! Runs the full engine under the discrete-event fabric and checks
//! reproducibility, packet accounting, and that congested paths are avoided.

use std::time::Duration;
use tlb_core::{PathTier, RunMode, TlbConfig};
use tlb_sim::{failure_recovery_scenario, leaf_spine_scenario, Fabric, FabricConfig, SimReport};

fn run(seed: u64, n_paths: usize, hot: usize, engine: TlbConfig) -> SimReport {
    let scenario = leaf_spine_scenario(seed, n_paths, hot, Duration::from_millis(20));
    Fabric::new(FabricConfig::new(seed, scenario), engine).run()
}

// ────────────────────────────────────────────────────────────────
// 1. Same seed, same report
// ────────────────────────────────────────────────────────────────

#[test]
fn same_seed_reproduces_report() {
    let a = serde_json::to_value(run(17, 4, 1, TlbConfig::default())).unwrap();
    let b = serde_json::to_value(run(17, 4, 1, TlbConfig::default())).unwrap();
    assert_eq!(a, b);
}

#[test]
fn every_run_mode_completes() {
    for mode in [
        RunMode::CounterMin,
        RunMode::RttMin,
        RunMode::RateMin,
        RunMode::Random,
        RunMode::RttThenCounter,
        RunMode::RttThenRate,
    ] {
        let cfg = TlbConfig {
            run_mode: mode,
            ..TlbConfig::default()
        };
        let report = run(5, 4, 1, cfg);
        assert!(
            report.flows_completed > 0,
            "{} completed no flows",
            mode.as_str()
        );
        assert_eq!(report.engine.counters.counter_underflows, 0, "{}", mode.as_str());
    }
}

// ────────────────────────────────────────────────────────────────
// 2. Accounting
// ────────────────────────────────────────────────────────────────

#[test]
fn packets_are_accounted_per_path() {
    let report = run(3, 4, 1, TlbConfig::default());
    let per_path: u64 = report.paths.iter().map(|p| p.packets).sum();
    assert_eq!(per_path, report.packets_sent);
    assert!(report.flows_started >= report.flows_completed);
    assert_eq!(report.packets_lost, 0, "scenario paths are lossless");
    assert!(report.paths.iter().all(|p| p.final_tier.is_some()));
}

// ────────────────────────────────────────────────────────────────
// 3. Congestion avoidance
// ────────────────────────────────────────────────────────────────

/// The persistently marked path carries less traffic than the busiest
/// clean path.
#[test]
fn hot_path_is_avoided() {
    let report = run(11, 4, 1, TlbConfig::default());
    let hot = report.paths[0].packets;
    let busiest_clean = report.paths[1..].iter().map(|p| p.packets).max().unwrap_or(0);
    assert!(
        hot < busiest_clean,
        "hot path carried {hot} packets, busiest clean path {busiest_clean}"
    );
    assert!(report.engine.counters.path_changes > 0);
}

// ────────────────────────────────────────────────────────────────
// 4. Failure and recovery
// ────────────────────────────────────────────────────────────────

/// A path that drops everything for 5ms loses packets, pushes its flows
/// elsewhere, and is usable again once the hard window has passed.
#[test]
fn failed_path_is_left_and_later_recovers() {
    let scenario = failure_recovery_scenario(
        13,
        4,
        0,
        Duration::from_millis(5),
        Duration::from_millis(10),
        Duration::from_millis(40),
    );
    let report = Fabric::new(FabricConfig::new(13, scenario), TlbConfig::default()).run();

    let failed = &report.paths[0];
    assert!(failed.lost > 0, "outage produced no loss");
    assert!(failed.lost < failed.packets);
    assert_eq!(
        report.paths.iter().map(|p| p.lost).sum::<u64>(),
        report.packets_lost
    );
    assert!(report.engine.counters.path_changes > 0);
    assert_ne!(failed.final_tier, Some(PathTier::Fail));
    assert_eq!(report.engine.counters.counter_underflows, 0);
}
