//! Per-flow assignment and the rerouting policy that acts on it.

use crate::config::RerouteConfig;
use crate::path::PathTier;
use crate::time::SimTime;
use crate::topology::{FlowId, GroupId, PathId};
use std::collections::HashMap;
use std::time::Duration;

/// Why a reroute evaluation was started.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RerouteTrigger {
    /// Failure response: very-high retransmissions or a timeout on this flow.
    Failure,
    /// The current path has decayed to Bad (or worse).
    PathDegraded,
    /// The flow has been idle long enough for a flowlet boundary.
    FlowletGap,
}

impl RerouteTrigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            RerouteTrigger::Failure => "failure",
            RerouteTrigger::PathDegraded => "path_degraded",
            RerouteTrigger::FlowletGap => "flowlet_gap",
        }
    }
}

#[derive(Debug, Clone)]
pub struct FlowRecord {
    pub path: PathId,
    pub group: GroupId,
    pub src_group: Option<GroupId>,
    pub bytes_sent: u64,
    pub bytes_acked: u64,
    pub bytes_ecn: u64,
    pub bytes_retransmitted: u64,
    pub retransmissions: u32,
    pub timeouts: u32,
    pub last_active: SimTime,
    pub last_reroute_attempt: Option<SimTime>,
    /// Set by `flow_finish`; the path counter has already been released.
    pub finished: bool,
    pub path_changes: u32,
    pause_until: Option<SimTime>,
}

impl FlowRecord {
    pub fn new(path: PathId, group: GroupId, now: SimTime) -> Self {
        Self {
            path,
            group,
            src_group: None,
            bytes_sent: 0,
            bytes_acked: 0,
            bytes_ecn: 0,
            bytes_retransmitted: 0,
            retransmissions: 0,
            timeouts: 0,
            last_active: now,
            last_reroute_attempt: None,
            finished: false,
            path_changes: 0,
            pause_until: None,
        }
    }

    pub fn idle_for(&self, now: SimTime) -> Duration {
        now.saturating_since(self.last_active)
    }

    /// Moves the flow to `path`, clearing the counters that described its
    /// experience on the old one.
    pub fn move_to(&mut self, path: PathId, now: SimTime, hold_off: Duration) {
        self.path = path;
        self.bytes_sent = 0;
        self.bytes_acked = 0;
        self.bytes_ecn = 0;
        self.bytes_retransmitted = 0;
        self.retransmissions = 0;
        self.timeouts = 0;
        self.path_changes += 1;
        self.pause_until = if hold_off.is_zero() {
            None
        } else {
            Some(now + hold_off)
        };
    }

    /// Remaining hold-off after the last path change.
    pub fn pause_remaining(&self, now: SimTime) -> Duration {
        self.pause_until
            .map(|until| until.saturating_since(now))
            .unwrap_or(Duration::ZERO)
    }

    /// Whether this flow's own failure counters have crossed a very-high threshold.
    pub fn has_failed(&self, cfg: &RerouteConfig) -> bool {
        self.retransmissions >= cfg.retrans_very_high || self.timeouts > 0
    }

    pub fn reroute_trigger(
        &self,
        now: SimTime,
        tier: PathTier,
        cfg: &RerouteConfig,
    ) -> Option<RerouteTrigger> {
        if cfg.respond_to_failure && self.has_failed(cfg) {
            Some(RerouteTrigger::Failure)
        } else if tier >= PathTier::Bad {
            Some(RerouteTrigger::PathDegraded)
        } else if self.idle_for(now) > cfg.flowlet_timeout {
            Some(RerouteTrigger::FlowletGap)
        } else {
            None
        }
    }

    /// Byte threshold, rate ceiling and cooldown that every evaluation must pass.
    pub fn passes_gates(
        &self,
        now: SimTime,
        quantized_rate: u32,
        rate_ceiling: f64,
        cfg: &RerouteConfig,
    ) -> bool {
        if self.bytes_sent < cfg.min_bytes_before_reroute {
            return false;
        }
        if quantized_rate as f64 >= rate_ceiling {
            return false;
        }
        match self.last_reroute_attempt {
            Some(at) => now.saturating_since(at) >= cfg.cooldown,
            None => true,
        }
    }
}

#[derive(Debug, Default)]
pub struct FlowStore {
    flows: HashMap<FlowId, FlowRecord>,
}

impl FlowStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: FlowId) -> Option<&FlowRecord> {
        self.flows.get(&id)
    }

    pub fn get_mut(&mut self, id: FlowId) -> Option<&mut FlowRecord> {
        self.flows.get_mut(&id)
    }

    pub fn insert(&mut self, id: FlowId, record: FlowRecord) -> Option<FlowRecord> {
        self.flows.insert(id, record)
    }

    pub fn len(&self) -> usize {
        self.flows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flows.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (FlowId, &FlowRecord)> {
        self.flows.iter().map(|(k, v)| (*k, v))
    }

    /// Removes and returns every flow idle for at least `die_time`.
    pub fn expire(&mut self, now: SimTime, die_time: Duration) -> Vec<(FlowId, FlowRecord)> {
        let dead: Vec<FlowId> = self
            .flows
            .iter()
            .filter(|(_, f)| f.idle_for(now) >= die_time)
            .map(|(id, _)| *id)
            .collect();
        dead.into_iter()
            .filter_map(|id| self.flows.remove(&id).map(|f| (id, f)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> RerouteConfig {
        RerouteConfig {
            min_bytes_before_reroute: 1_000,
            cooldown: Duration::from_micros(50),
            flowlet_timeout: Duration::from_micros(500),
            ..RerouteConfig::default()
        }
    }

    #[test]
    fn flowlet_gap_triggers_after_timeout() {
        let f = FlowRecord::new(0, 1, SimTime::ZERO);
        let c = cfg();
        assert_eq!(f.reroute_trigger(SimTime::from_micros(500), PathTier::Good, &c), None);
        assert_eq!(
            f.reroute_trigger(SimTime::from_micros(501), PathTier::Good, &c),
            Some(RerouteTrigger::FlowletGap)
        );
    }

    #[test]
    fn degraded_path_triggers_immediately() {
        let f = FlowRecord::new(0, 1, SimTime::ZERO);
        assert_eq!(
            f.reroute_trigger(SimTime::ZERO, PathTier::Bad, &cfg()),
            Some(RerouteTrigger::PathDegraded)
        );
        assert_eq!(
            f.reroute_trigger(SimTime::ZERO, PathTier::Fail, &cfg()),
            Some(RerouteTrigger::PathDegraded)
        );
    }

    #[test]
    fn failure_trigger_needs_failure_response() {
        let mut f = FlowRecord::new(0, 1, SimTime::ZERO);
        f.timeouts = 1;
        let mut c = cfg();
        assert_eq!(f.reroute_trigger(SimTime::ZERO, PathTier::Good, &c), None);
        c.respond_to_failure = true;
        assert_eq!(
            f.reroute_trigger(SimTime::ZERO, PathTier::Good, &c),
            Some(RerouteTrigger::Failure)
        );
    }

    #[test]
    fn gates_require_bytes_rate_and_cooldown() {
        let c = cfg();
        let mut f = FlowRecord::new(0, 1, SimTime::ZERO);
        assert!(!f.passes_gates(SimTime::ZERO, 0, 40.0, &c));

        f.bytes_sent = 1_000;
        assert!(f.passes_gates(SimTime::ZERO, 0, 40.0, &c));
        assert!(!f.passes_gates(SimTime::ZERO, 40, 40.0, &c));

        f.last_reroute_attempt = Some(SimTime::from_micros(100));
        assert!(!f.passes_gates(SimTime::from_micros(149), 0, 40.0, &c));
        assert!(f.passes_gates(SimTime::from_micros(150), 0, 40.0, &c));
    }

    #[test]
    fn move_resets_path_counters_and_sets_pause() {
        let mut f = FlowRecord::new(0, 1, SimTime::ZERO);
        f.bytes_sent = 5_000;
        f.retransmissions = 4;
        f.move_to(2, SimTime::from_micros(10), Duration::from_micros(30));
        assert_eq!(f.path, 2);
        assert_eq!(f.bytes_sent, 0);
        assert_eq!(f.retransmissions, 0);
        assert_eq!(f.path_changes, 1);
        assert_eq!(f.pause_remaining(SimTime::from_micros(20)), Duration::from_micros(20));
        assert_eq!(f.pause_remaining(SimTime::from_micros(50)), Duration::ZERO);
    }

    #[test]
    fn expire_removes_idle_flows() {
        let mut store = FlowStore::new();
        store.insert(1, FlowRecord::new(0, 1, SimTime::ZERO));
        store.insert(2, FlowRecord::new(0, 1, SimTime::from_micros(900)));
        let dead = store.expire(SimTime::from_millis(1), Duration::from_micros(500));
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].0, 1);
        assert_eq!(store.len(), 1);
    }
}
