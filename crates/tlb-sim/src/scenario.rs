use rand::rngs::StdRng;
use rand::RngExt as _;
use rand::SeedableRng;
use serde::Serialize;
use std::time::Duration;

/// Configuration for a deterministic path-condition scenario.
#[derive(Debug, Clone)]
pub struct ScenarioConfig {
    pub seed: u64,
    pub duration: Duration,
    pub step: Duration,
    pub paths: Vec<PathScenarioConfig>,
    pub outages: Vec<Outage>,
}

/// A window during which one path drops every packet.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Outage {
    pub path: usize,
    pub from: Duration,
    pub until: Duration,
}

impl Outage {
    pub fn covers(&self, path: usize, t: Duration) -> bool {
        self.path == path && t >= self.from && t < self.until
    }
}

/// Per-path bounds and step sizes for scenario generation.
#[derive(Debug, Clone)]
pub struct PathScenarioConfig {
    pub base_rtt_us: f64,
    pub max_extra_rtt_us: f64,
    pub rtt_step_us: f64,
    pub max_ecn_prob: f64,
    pub ecn_step: f64,
    pub max_loss_prob: f64,
    pub loss_step: f64,
}

impl PathScenarioConfig {
    /// A healthy path: RTT wanders a little above `base_rtt_us`, light marking.
    pub fn clean(base_rtt_us: f64) -> Self {
        Self {
            base_rtt_us,
            max_extra_rtt_us: 40.0,
            rtt_step_us: 5.0,
            max_ecn_prob: 0.05,
            ecn_step: 0.01,
            max_loss_prob: 0.0,
            loss_step: 0.0,
        }
    }

    /// A persistently congested path: nearly every packet is ECN-marked.
    pub fn hot(base_rtt_us: f64) -> Self {
        Self {
            base_rtt_us,
            max_extra_rtt_us: 200.0,
            rtt_step_us: 20.0,
            max_ecn_prob: 0.9,
            ecn_step: 0.0,
            max_loss_prob: 0.0,
            loss_step: 0.0,
        }
    }
}

/// Conditions on one path for the duration of a frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PathCondition {
    pub rtt_us: f64,
    pub ecn_prob: f64,
    pub loss_prob: f64,
}

/// A single time-step of conditions across all paths.
#[derive(Debug, Clone, PartialEq)]
pub struct ScenarioFrame {
    pub t: Duration,
    pub conditions: Vec<PathCondition>,
}

/// Deterministic random-walk scenario generator.
///
/// Given a seed, produces reproducible sequences of [`ScenarioFrame`]s in
/// which each path's RTT, ECN-marking probability and loss probability evolve
/// via random-walk steps clamped to configured bounds.
#[derive(Debug)]
pub struct Scenario {
    cfg: ScenarioConfig,
    rng: StdRng,
    states: Vec<PathCondition>,
}

impl Scenario {
    pub fn new(cfg: ScenarioConfig) -> Self {
        let mut rng = StdRng::seed_from_u64(cfg.seed);
        let states = cfg
            .paths
            .iter()
            .map(|p| PathCondition {
                rtt_us: p.base_rtt_us + rng.random::<f64>() * p.max_extra_rtt_us * 0.2,
                ecn_prob: if p.ecn_step == 0.0 {
                    p.max_ecn_prob
                } else {
                    rng.random::<f64>() * p.max_ecn_prob
                },
                loss_prob: rng.random::<f64>() * p.max_loss_prob * 0.2,
            })
            .collect();

        Self { cfg, rng, states }
    }

    pub fn frames(&mut self) -> Vec<ScenarioFrame> {
        let mut frames = Vec::new();
        let total_steps =
            (self.cfg.duration.as_secs_f64() / self.cfg.step.as_secs_f64()).ceil() as u64;

        for step_idx in 0..=total_steps {
            let t = self.cfg.step * step_idx as u32;
            let mut conditions = Vec::with_capacity(self.cfg.paths.len());

            for idx in 0..self.cfg.paths.len() {
                let path_cfg = self.cfg.paths[idx].clone();
                let rtt_delta = rand_signed(&mut self.rng, path_cfg.rtt_step_us);
                let ecn_delta = rand_signed(&mut self.rng, path_cfg.ecn_step);
                let loss_delta = rand_signed(&mut self.rng, path_cfg.loss_step);

                let state = &mut self.states[idx];
                state.rtt_us = (state.rtt_us + rtt_delta).clamp(
                    path_cfg.base_rtt_us,
                    path_cfg.base_rtt_us + path_cfg.max_extra_rtt_us,
                );
                state.ecn_prob = (state.ecn_prob + ecn_delta).clamp(0.0, path_cfg.max_ecn_prob);
                state.loss_prob =
                    (state.loss_prob + loss_delta).clamp(0.0, path_cfg.max_loss_prob);

                let down = self.cfg.outages.iter().any(|o| o.covers(idx, t));
                conditions.push(if down {
                    PathCondition {
                        loss_prob: 1.0,
                        ..*state
                    }
                } else {
                    *state
                });
            }

            frames.push(ScenarioFrame { t, conditions });
        }

        frames
    }
}

fn rand_signed(rng: &mut StdRng, max_step: f64) -> f64 {
    if max_step <= 0.0 {
        return 0.0;
    }
    let mag = rng.random::<f64>() * max_step;
    if rng.random::<bool>() { mag } else { -mag }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg(seed: u64) -> ScenarioConfig {
        ScenarioConfig {
            seed,
            duration: Duration::from_millis(10),
            step: Duration::from_millis(1),
            paths: vec![
                PathScenarioConfig::clean(80.0),
                PathScenarioConfig::clean(100.0),
                PathScenarioConfig::hot(90.0),
            ],
            outages: Vec::new(),
        }
    }

    #[test]
    fn scenario_is_deterministic_for_seed() {
        let a = Scenario::new(cfg(42)).frames();
        let b = Scenario::new(cfg(42)).frames();
        assert_eq!(a, b);
        assert_eq!(a.len(), 11);
    }

    #[test]
    fn conditions_stay_within_bounds() {
        let c = cfg(7);
        for frame in Scenario::new(c.clone()).frames() {
            for (cond, bounds) in frame.conditions.iter().zip(&c.paths) {
                assert!(cond.rtt_us >= bounds.base_rtt_us);
                assert!(cond.rtt_us <= bounds.base_rtt_us + bounds.max_extra_rtt_us);
                assert!((0.0..=bounds.max_ecn_prob).contains(&cond.ecn_prob));
                assert!((0.0..=bounds.max_loss_prob).contains(&cond.loss_prob));
            }
        }
    }

    #[test]
    fn hot_path_keeps_its_marking_rate() {
        for frame in Scenario::new(cfg(3)).frames() {
            assert_eq!(frame.conditions[2].ecn_prob, 0.9);
        }
    }

    #[test]
    fn outage_drops_everything_then_recovers() {
        let mut c = cfg(9);
        c.outages.push(Outage {
            path: 1,
            from: Duration::from_millis(3),
            until: Duration::from_millis(6),
        });
        let frames = Scenario::new(c).frames();
        for frame in &frames {
            let down = frame.t >= Duration::from_millis(3) && frame.t < Duration::from_millis(6);
            assert_eq!(frame.conditions[1].loss_prob == 1.0, down, "t={:?}", frame.t);
            assert_eq!(frame.conditions[0].loss_prob, 0.0);
        }
        // the walk itself is untouched by the outage
        let plain = Scenario::new(cfg(9)).frames();
        assert_eq!(frames[4].conditions[1].rtt_us, plain[4].conditions[1].rtt_us);
    }
}
