//! Discrete-event simulation toolkit for the TLB engine.
//!
//! Provides deterministic path-condition scenarios and a single-rack fabric
//! that drives [`tlb_core::TlbEngine`] through a simulated clock, so
//! load-balancing behaviour can be compared across configurations and seeds.

pub mod fabric;
pub mod scenario;

pub use fabric::{Fabric, FabricConfig, PathReport, SimReport};
pub use scenario::{
    Outage, PathCondition, PathScenarioConfig, Scenario, ScenarioConfig, ScenarioFrame,
};

use std::time::Duration;

/// `n_paths` clean paths with staggered base RTTs, the first `hot` of them
/// persistently congested.
pub fn leaf_spine_scenario(
    seed: u64,
    n_paths: usize,
    hot: usize,
    duration: Duration,
) -> ScenarioConfig {
    let paths = (0..n_paths)
        .map(|i| {
            let base = 80.0 + 10.0 * i as f64;
            if i < hot {
                PathScenarioConfig::hot(base)
            } else {
                PathScenarioConfig::clean(base)
            }
        })
        .collect();
    ScenarioConfig {
        seed,
        duration,
        step: Duration::from_millis(1),
        paths,
        outages: Vec::new(),
    }
}

/// `n_paths` clean paths, with `failed` dropping every packet between
/// `from` and `until`.
pub fn failure_recovery_scenario(
    seed: u64,
    n_paths: usize,
    failed: usize,
    from: Duration,
    until: Duration,
    duration: Duration,
) -> ScenarioConfig {
    let mut cfg = leaf_spine_scenario(seed, n_paths, 0, duration);
    cfg.outages.push(Outage {
        path: failed,
        from,
        until,
    });
    cfg
}
