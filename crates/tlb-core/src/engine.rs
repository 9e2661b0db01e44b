//! The load-balancing engine.
//!
//! [`TlbEngine`] owns every table (topology, path records, flow records,
//! acklets) and the two aging tasks. It is single-owner: every operation
//! takes `&mut self` plus the caller's notion of `now`, and the aging tasks
//! run inline whenever a call observes that their deadline has passed. Hosts
//! that want to share an engine across threads wrap it in
//! [`crate::runtime::TlbRuntime`].

use crate::acklet::{AckletState, AckletStore};
use crate::aging::{AgingScheduler, AgingTask};
use crate::config::TlbConfig;
use crate::error::TlbError;
use crate::events::{Observers, PathChangedEvent, PathSelectedEvent};
use crate::flow::{FlowRecord, FlowStore, RerouteTrigger};
use crate::path::{
    Candidate, Classifier, Dre, PathRecord, PathSnapshot, PathStore, PathTier, Selector, TieBreak,
};
use crate::time::SimTime;
use crate::topology::{FlowId, GroupId, PathId, Topology};
use rand::rngs::StdRng;
use rand::{RngExt, SeedableRng};
use serde::Serialize;
use std::net::IpAddr;
use std::time::Duration;
use tracing::{debug, info, trace, warn};

/// Monotonic counters of engine decisions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DecisionCounters {
    pub selections: u64,
    pub random_fallbacks: u64,
    pub reroute_evaluations: u64,
    pub reroutes_damped: u64,
    pub path_changes: u64,
    pub lookup_failures: u64,
    pub stale_updates: u64,
    pub flows_expired: u64,
    pub counter_underflows: u64,
}

/// Point-in-time view of the engine tables.
#[derive(Debug, Clone, Serialize)]
pub struct EngineStats {
    pub now_ns: u64,
    pub flows: usize,
    pub active_flows: usize,
    pub path_records: usize,
    pub acklets: usize,
    pub counters: DecisionCounters,
}

/// Per-path view used by metrics export.
#[derive(Debug, Clone, Serialize)]
pub struct PathStat {
    pub group: GroupId,
    pub path: PathId,
    pub bytes_observed: u64,
    pub ecn_bytes: u64,
    pub snapshot: PathSnapshot,
    pub congested: bool,
}

pub struct TlbEngine {
    config: TlbConfig,
    topology: Topology,
    paths: PathStore,
    flows: FlowStore,
    acklets: AckletStore,
    classifier: Classifier,
    selector: Selector,
    dre: Dre,
    aging: AgingScheduler,
    observers: Observers,
    rng: StdRng,
    now: SimTime,
    counters: DecisionCounters,
}

impl TlbEngine {
    pub fn new(config: TlbConfig) -> Self {
        let dre = Dre::new(&config.dre);
        let classifier = Classifier::new(config.classifier.clone(), dre);
        let selector = Selector::new(
            TieBreak::from_mode(config.run_mode, config.classifier.quantify_rtt_base),
            config.reroute.better_path_rtt,
        );
        let aging = AgingScheduler::new(config.dre.period, config.aging.check_period);
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::seed_from_u64(rand::rng().random::<u64>()),
        };
        info!(
            run_mode = config.run_mode.as_str(),
            seed = ?config.seed,
            reroute = config.reroute.enabled,
            "tlb engine created"
        );
        Self {
            config,
            topology: Topology::new(),
            paths: PathStore::new(),
            flows: FlowStore::new(),
            acklets: AckletStore::new(),
            classifier,
            selector,
            dre,
            aging,
            observers: Observers::default(),
            rng,
            now: SimTime::ZERO,
            counters: DecisionCounters::default(),
        }
    }

    pub fn config(&self) -> &TlbConfig {
        &self.config
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    pub fn now(&self) -> SimTime {
        self.now
    }

    // ─── Topology ───────────────────────────────────────────────────────

    pub fn add_address_with_group(&mut self, addr: IpAddr, group: GroupId) {
        self.topology.add_address_with_group(addr, group);
    }

    pub fn add_available_path(&mut self, group: GroupId, path: PathId) {
        self.topology.add_available_path(group, path);
    }

    pub fn get_available_paths(&self, addr: IpAddr) -> Result<Vec<PathId>, TlbError> {
        self.topology.get_available_paths(addr).map(|p| p.to_vec())
    }

    // ─── Observers ──────────────────────────────────────────────────────

    pub fn on_path_selected(&mut self, f: impl FnMut(&PathSelectedEvent) + Send + 'static) {
        self.observers.set_path_selected(f);
    }

    pub fn on_path_changed(&mut self, f: impl FnMut(&PathChangedEvent) + Send + 'static) {
        self.observers.set_path_changed(f);
    }

    // ─── Clock ──────────────────────────────────────────────────────────

    /// Runs every aging task due at or before `now`.
    pub fn advance(&mut self, now: SimTime) {
        self.tick(now);
    }

    /// Deadline of the next aging task, if any are armed.
    pub fn next_deadline(&mut self) -> Option<SimTime> {
        self.aging.next_deadline()
    }

    /// Cancels the aging tasks. Table state is kept for inspection.
    pub fn shutdown(&mut self) {
        if !self.aging.is_stopped() {
            self.aging.cancel_all();
            debug!(now = %self.now, "tlb engine aging stopped");
        }
    }

    fn tick(&mut self, now: SimTime) -> SimTime {
        let now = if now < self.now {
            trace!(now = %now, last = %self.now, "clock went backwards; holding");
            self.now
        } else {
            now
        };
        self.now = now;
        while let Some((at, task)) = self.aging.next_due(now) {
            match task {
                AgingTask::DreDecay => self.paths.decay_all(&self.dre),
                AgingTask::HealthCheck => self.health_check(at),
            }
            self.aging.reschedule(task, at);
        }
        self.aging.ensure_started(now);
        now
    }

    fn health_check(&mut self, at: SimTime) {
        self.paths
            .age_all(at, &self.config.aging, &self.config.smoothing);

        for (flow, record) in self.flows.expire(at, self.config.aging.flow_die_time) {
            if !record.finished {
                self.release(flow, record.group, record.path);
            }
            self.counters.flows_expired += 1;
            debug!(flow, path = record.path, finished = record.finished, "flow expired");
        }

        let acklet_idle = self
            .config
            .aging
            .flow_die_time
            .max(self.config.acklet.black_hole * 2);
        let dropped = self.acklets.expire(at, acklet_idle);
        if dropped > 0 {
            trace!(dropped, "acklets expired");
        }
    }

    // ─── Classification ─────────────────────────────────────────────────

    /// Classifies one path from its current record.
    pub fn classify(&self, group: GroupId, path: PathId) -> PathSnapshot {
        self.classifier.classify(self.paths.get(group, path))
    }

    /// Snapshots of every admissible path toward `group`.
    pub fn parallel_snapshots(&self, group: GroupId) -> Result<Vec<Candidate>, TlbError> {
        let paths = self.topology.paths_for_group(group)?;
        Ok(self.snapshots(group, paths))
    }

    fn snapshots(&self, group: GroupId, paths: &[PathId]) -> Vec<Candidate> {
        paths.iter().map(|&p| (p, self.classify(group, p))).collect()
    }

    fn resolve(&mut self, addr: IpAddr) -> Result<(GroupId, Vec<PathId>), TlbError> {
        let result = self.topology.group_of(addr).and_then(|group| {
            self.topology
                .paths_for_group(group)
                .map(|paths| (group, paths.to_vec()))
        });
        if let Err(e) = &result {
            self.counters.lookup_failures += 1;
            warn!(%addr, error = %e, "destination lookup failed");
        }
        result
    }

    fn resolve_path(&mut self, addr: IpAddr, path: PathId) -> Result<GroupId, TlbError> {
        let (group, paths) = self.resolve(addr)?;
        if !paths.contains(&path) {
            self.counters.lookup_failures += 1;
            warn!(%addr, group, path, "path not admissible toward destination");
            return Err(TlbError::UnknownPath { group, path });
        }
        Ok(group)
    }

    // ─── Flow counters ──────────────────────────────────────────────────

    fn assign(&mut self, group: GroupId, path: PathId) {
        let now = self.now;
        self.paths.get_or_create(group, path, now).assign_flow();
    }

    fn release(&mut self, flow: FlowId, group: GroupId, path: PathId) {
        let released = self
            .paths
            .get_mut(group, path)
            .map(PathRecord::release_flow)
            .unwrap_or(false);
        if !released {
            self.counters.counter_underflows += 1;
            warn!(flow, group, path, "flow counter underflow");
        }
    }

    /// Starts tracking `flow` on `path` and bumps the path's counter.
    fn track(&mut self, flow: FlowId, src_group: Option<GroupId>, group: GroupId, path: PathId) {
        let mut record = FlowRecord::new(path, group, self.now);
        record.src_group = src_group;
        if let Some(prev) = self.flows.insert(flow, record) {
            if !prev.finished {
                self.release(flow, prev.group, prev.path);
            }
        }
        self.assign(group, path);
    }

    // ─── Forward path ───────────────────────────────────────────────────

    /// Path for the next packet of `flow` from `src` to `dst`.
    pub fn get_path(
        &mut self,
        flow: FlowId,
        src: IpAddr,
        dst: IpAddr,
        now: SimTime,
    ) -> Result<PathId, TlbError> {
        let now = self.tick(now);
        let src_group = self.topology.group_of(src).ok();
        let (group, paths) = self.resolve(dst)?;

        let current = self
            .flows
            .get(flow)
            .filter(|f| !f.finished)
            .map(|f| (f.group, f.path));

        match current {
            Some((g, p)) if g == group && paths.contains(&p) => {
                let path = self
                    .evaluate_reroute(flow, &paths, now, None)
                    .unwrap_or(p);
                Ok(path)
            }
            Some((g, p)) => {
                debug!(flow, group = g, path = p, "assignment no longer admissible");
                self.release(flow, g, p);
                let parallel = self.snapshots(group, &paths);
                let selection = self
                    .selector
                    .select_new(&parallel, &mut self.rng)
                    .ok_or(TlbError::ExhaustedCandidates { group })?;
                self.assign(group, selection.path);
                let hold_off = self.hold_off(g, p, &parallel, selection.path);
                if let Some(f) = self.flows.get_mut(flow) {
                    f.group = group;
                    f.src_group = src_group;
                    f.move_to(selection.path, now, hold_off);
                }
                self.note_selection(selection.random_fallback);
                self.emit_changed(flow, group, p, selection.path, selection.random_fallback, parallel);
                Ok(selection.path)
            }
            None => self.select_for_new_flow(flow, src_group, group, &paths),
        }
    }

    fn select_for_new_flow(
        &mut self,
        flow: FlowId,
        src_group: Option<GroupId>,
        group: GroupId,
        paths: &[PathId],
    ) -> Result<PathId, TlbError> {
        let parallel = self.snapshots(group, paths);
        let Some(selection) = self.selector.select_new(&parallel, &mut self.rng) else {
            warn!(flow, group, "no candidate path");
            return Err(TlbError::ExhaustedCandidates { group });
        };
        self.track(flow, src_group, group, selection.path);
        self.note_selection(selection.random_fallback);
        debug!(
            flow,
            group,
            path = selection.path,
            tier = selection.tier.as_str(),
            random_fallback = selection.random_fallback,
            "path selected"
        );

        if self.observers.wants_path_selected() {
            let snapshot = self.classify(group, selection.path);
            self.observers.emit_path_selected(&PathSelectedEvent {
                flow,
                src_group,
                dst_group: group,
                path: selection.path,
                random_fallback: selection.random_fallback,
                snapshot,
                parallel,
            });
        }
        Ok(selection.path)
    }

    fn note_selection(&mut self, random_fallback: bool) {
        self.counters.selections += 1;
        if random_fallback {
            self.counters.random_fallbacks += 1;
            info!("every path degraded; random fallback");
        }
    }

    /// Runs the reroute policy for an established flow. Returns the new path
    /// when the flow moved.
    fn evaluate_reroute(
        &mut self,
        flow: FlowId,
        paths: &[PathId],
        now: SimTime,
        forced: Option<RerouteTrigger>,
    ) -> Option<PathId> {
        if !self.config.reroute.enabled {
            return None;
        }
        let (group, old) = self.flows.get(flow).map(|f| (f.group, f.path))?;
        let current = self.classify(group, old);

        let record = self.flows.get(flow)?;
        let trigger =
            forced.or_else(|| record.reroute_trigger(now, current.tier, &self.config.reroute))?;
        let ceiling = self.config.dre.multiply * self.dre.buckets() as f64;
        if !record.passes_gates(now, current.quantized_rate, ceiling, &self.config.reroute) {
            trace!(flow, trigger = trigger.as_str(), "reroute gated");
            return None;
        }

        self.counters.reroute_evaluations += 1;
        if let Some(f) = self.flows.get_mut(flow) {
            f.last_reroute_attempt = Some(now);
        }
        let roll = self.rng.random_range(0..100u32);
        if roll >= self.config.reroute.path_change_poss {
            self.counters.reroutes_damped += 1;
            trace!(flow, roll, "reroute damped");
            return None;
        }

        let parallel = self.snapshots(group, paths);
        let new = self
            .selector
            .select_reroute(&(old, current), &parallel, &mut self.rng)?;

        self.release(flow, group, old);
        self.assign(group, new);
        let hold_off = self.hold_off(group, old, &parallel, new);
        if let Some(f) = self.flows.get_mut(flow) {
            f.move_to(new, now, hold_off);
        }
        self.counters.path_changes += 1;
        info!(
            flow,
            group,
            old_path = old,
            new_path = new,
            trigger = trigger.as_str(),
            old_tier = current.tier.as_str(),
            "flow rerouted"
        );
        self.emit_changed(flow, group, old, new, false, parallel);
        Some(new)
    }

    /// How long a moved flow should hold off so it does not overtake its own
    /// packets still queued on the slower old path.
    fn hold_off(&self, group: GroupId, old: PathId, parallel: &[Candidate], new: PathId) -> Duration {
        let rtt_of = |p: PathId| {
            parallel
                .iter()
                .find(|(id, _)| *id == p)
                .map(|(_, s)| s.rtt_us)
                .unwrap_or_else(|| self.classify(group, p).rtt_us)
        };
        let delta_us = rtt_of(old) - rtt_of(new);
        if delta_us.is_finite() && delta_us > 0.0 {
            Duration::from_nanos((delta_us * 1_000.0).round() as u64)
        } else {
            Duration::ZERO
        }
    }

    fn emit_changed(
        &mut self,
        flow: FlowId,
        group: GroupId,
        old_path: PathId,
        new_path: PathId,
        random_fallback: bool,
        parallel: Vec<Candidate>,
    ) {
        if !self.observers.wants_path_changed() {
            return;
        }
        let src_group = self.flows.get(flow).and_then(|f| f.src_group);
        self.observers.emit_path_changed(&PathChangedEvent {
            flow,
            src_group,
            dst_group: group,
            new_path,
            old_path,
            random_fallback,
            parallel,
        });
    }

    /// Remaining hold-off for `flow` after its last path change.
    pub fn get_pause_time(&self, flow: FlowId, now: SimTime) -> Duration {
        self.flows
            .get(flow)
            .map(|f| f.pause_remaining(now))
            .unwrap_or(Duration::ZERO)
    }

    // ─── Reverse path ───────────────────────────────────────────────────

    /// Path for the next ACK of `flow`.
    pub fn get_ack_path(
        &mut self,
        flow: FlowId,
        src: IpAddr,
        dst: IpAddr,
        now: SimTime,
    ) -> Result<PathId, TlbError> {
        let now = self.tick(now);
        let (group, paths) = self.resolve(dst)?;

        let path = match self.acklets.state(flow, now, &self.config.acklet) {
            AckletState::Fresh(p) if paths.contains(&p) => p,
            AckletState::BlackHole(p) => {
                let others: Vec<PathId> = paths.iter().copied().filter(|&q| q != p).collect();
                let pick = if others.is_empty() {
                    paths[self.rng.random_range(0..paths.len())]
                } else {
                    others[self.rng.random_range(0..others.len())]
                };
                info!(flow, old_path = p, new_path = pick, "acklet moved off suspected black hole");
                pick
            }
            _ => {
                let parallel = self.snapshots(group, &paths);
                self.selector
                    .select_new(&parallel, &mut self.rng)
                    .map(|s| s.path)
                    .ok_or(TlbError::ExhaustedCandidates { group })?
            }
        };
        self.acklets.pin(flow, path, now);
        trace!(flow, %src, path, "acklet path");
        Ok(path)
    }

    // ─── Transport feedback ─────────────────────────────────────────────

    /// Looks up `flow` for a feedback event on `path`, creating a record for
    /// an unseen flow. Stale reports are rejected.
    fn feedback_flow(
        &mut self,
        flow: FlowId,
        group: GroupId,
        path: PathId,
        revive: bool,
    ) -> Result<bool, TlbError> {
        let Some(f) = self.flows.get(flow) else {
            self.track(flow, None, group, path);
            return Ok(true);
        };
        if f.finished {
            if revive {
                let src_group = f.src_group;
                self.track(flow, src_group, group, path);
            }
            return Ok(revive);
        }
        if f.path != path || f.group != group {
            let current = f.path;
            self.counters.stale_updates += 1;
            debug!(flow, reported = path, current, "stale path report");
            return Err(TlbError::StaleAssignment { flow, path });
        }
        Ok(true)
    }

    pub fn flow_send(
        &mut self,
        flow: FlowId,
        dst: IpAddr,
        path: PathId,
        bytes: u64,
        is_retransmission: bool,
        now: SimTime,
    ) -> Result<(), TlbError> {
        let now = self.tick(now);
        let group = self.resolve_path(dst, path)?;
        self.feedback_flow(flow, group, path, true)?;

        {
            let record = self.paths.get_or_create(group, path, now);
            self.dre.record_send(&mut record.dre_raw, bytes);
        }

        let reroute = &self.config.reroute;
        let mut failed = false;
        if let Some(f) = self.flows.get_mut(flow) {
            f.bytes_sent = f.bytes_sent.saturating_add(bytes);
            f.last_active = now;
            if is_retransmission {
                f.bytes_retransmitted = f.bytes_retransmitted.saturating_add(bytes);
                f.retransmissions += 1;
                let (high, very_high) = (
                    f.retransmissions >= reroute.retrans_high,
                    f.retransmissions >= reroute.retrans_very_high,
                );
                let record = self.paths.get_or_create(group, path, now);
                if high {
                    record.mark_retransmission(now);
                }
                if very_high {
                    record.mark_high_retransmission(now);
                    failed = true;
                }
            }
        }

        if failed {
            debug!(flow, path, "retransmissions crossed the very-high threshold");
            self.respond_to_failure(flow, group, now);
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    pub fn flow_recv(
        &mut self,
        flow: FlowId,
        path: PathId,
        dst: IpAddr,
        bytes: u64,
        ecn: bool,
        rtt: Duration,
        now: SimTime,
    ) -> Result<(), TlbError> {
        let now = self.tick(now);
        let group = self.resolve_path(dst, path)?;
        let live = self.feedback_flow(flow, group, path, false)?;

        self.paths
            .get_or_create(group, path, now)
            .merge_sample(bytes, ecn, rtt, &self.config.smoothing);

        if live {
            if let Some(f) = self.flows.get_mut(flow) {
                f.bytes_acked = f.bytes_acked.saturating_add(bytes);
                if ecn {
                    f.bytes_ecn = f.bytes_ecn.saturating_add(bytes);
                }
                f.last_active = now;
            }
        }
        Ok(())
    }

    pub fn flow_timeout(
        &mut self,
        flow: FlowId,
        dst: IpAddr,
        path: PathId,
        now: SimTime,
    ) -> Result<(), TlbError> {
        let now = self.tick(now);
        let group = self.resolve_path(dst, path)?;
        let Some(f) = self.flows.get_mut(flow) else {
            debug!(flow, "timeout for unknown flow");
            return Err(TlbError::UnknownFlow { flow });
        };
        if f.finished {
            return Ok(());
        }
        if f.path != path || f.group != group {
            self.counters.stale_updates += 1;
            return Err(TlbError::StaleAssignment { flow, path });
        }
        f.timeouts += 1;
        let very = f.timeouts >= self.config.reroute.timeout_very_high;

        let record = self.paths.get_or_create(group, path, now);
        record.mark_timeout();
        if very {
            record.mark_very_timeout(now);
        }
        debug!(flow, path, very, "flow timeout");

        self.respond_to_failure(flow, group, now);
        Ok(())
    }

    fn respond_to_failure(&mut self, flow: FlowId, group: GroupId, now: SimTime) {
        if !self.config.reroute.respond_to_failure {
            return;
        }
        let paths = match self.topology.paths_for_group(group) {
            Ok(p) => p.to_vec(),
            Err(_) => return,
        };
        self.evaluate_reroute(flow, &paths, now, Some(RerouteTrigger::Failure));
    }

    /// Marks `flow` finished and releases its current path. Idempotent.
    pub fn flow_finish(&mut self, flow: FlowId, dst: IpAddr, now: SimTime) -> Result<(), TlbError> {
        let now = self.tick(now);
        let Some(f) = self.flows.get_mut(flow) else {
            debug!(flow, %dst, "finish for unknown flow");
            return Err(TlbError::UnknownFlow { flow });
        };
        if f.finished {
            return Ok(());
        }
        f.finished = true;
        f.last_active = now;
        let (group, path) = (f.group, f.path);
        self.release(flow, group, path);
        debug!(flow, group, path, "flow finished");
        Ok(())
    }

    // ─── Probes ─────────────────────────────────────────────────────────

    /// Ensures a record exists for the probed path.
    pub fn probe_send(&mut self, dst: IpAddr, path: PathId, now: SimTime) -> Result<(), TlbError> {
        let now = self.tick(now);
        let group = self.resolve_path(dst, path)?;
        self.paths.get_or_create(group, path, now);
        Ok(())
    }

    pub fn probe_recv(
        &mut self,
        path: PathId,
        dst: IpAddr,
        size: u64,
        ecn: bool,
        rtt: Duration,
        now: SimTime,
    ) -> Result<(), TlbError> {
        let now = self.tick(now);
        let group = self.resolve_path(dst, path)?;
        self.paths
            .get_or_create(group, path, now)
            .merge_sample(size, ecn, rtt, &self.config.smoothing);
        Ok(())
    }

    pub fn probe_timeout(&mut self, path: PathId, dst: IpAddr, now: SimTime) -> Result<(), TlbError> {
        let now = self.tick(now);
        let group = self.resolve_path(dst, path)?;
        self.paths
            .get_or_create(group, path, now)
            .mark_probing_timeout(now);
        info!(group, path, "probe lost; path marked failed");
        Ok(())
    }

    // ─── Direct health updates ──────────────────────────────────────────

    pub fn mark_retransmission(&mut self, group: GroupId, path: PathId, now: SimTime) {
        let now = self.tick(now);
        self.paths.get_or_create(group, path, now).mark_retransmission(now);
    }

    pub fn mark_high_retransmission(&mut self, group: GroupId, path: PathId, now: SimTime) {
        let now = self.tick(now);
        self.paths
            .get_or_create(group, path, now)
            .mark_high_retransmission(now);
    }

    pub fn mark_timeout(&mut self, group: GroupId, path: PathId, now: SimTime) {
        let now = self.tick(now);
        self.paths.get_or_create(group, path, now).mark_timeout();
    }

    pub fn mark_very_timeout(&mut self, group: GroupId, path: PathId, now: SimTime) {
        let now = self.tick(now);
        self.paths.get_or_create(group, path, now).mark_very_timeout(now);
    }

    pub fn mark_probing_timeout(&mut self, group: GroupId, path: PathId, now: SimTime) {
        let now = self.tick(now);
        self.paths
            .get_or_create(group, path, now)
            .mark_probing_timeout(now);
    }

    // ─── Inspection ─────────────────────────────────────────────────────

    pub fn flow(&self, flow: FlowId) -> Option<&FlowRecord> {
        self.flows.get(flow)
    }

    pub fn flows(&self) -> impl Iterator<Item = (FlowId, &FlowRecord)> {
        self.flows.iter()
    }

    pub fn path_record(&self, group: GroupId, path: PathId) -> Option<&PathRecord> {
        self.paths.get(group, path)
    }

    pub fn acklet_path(&self, flow: FlowId) -> Option<PathId> {
        self.acklets.get(flow).map(|a| a.path)
    }

    pub fn aging_pending(&self) -> usize {
        self.aging.pending()
    }

    pub fn counters(&self) -> DecisionCounters {
        self.counters
    }

    pub fn stats(&self) -> EngineStats {
        EngineStats {
            now_ns: self.now.as_nanos(),
            flows: self.flows.len(),
            active_flows: self.flows.iter().filter(|(_, f)| !f.finished).count(),
            path_records: self.paths.len(),
            acklets: self.acklets.len(),
            counters: self.counters,
        }
    }

    /// Every path record with its current classification, sorted by key.
    pub fn path_stats(&self) -> Vec<PathStat> {
        let ecn_high = self.config.classifier.ecn_high;
        let mut stats: Vec<PathStat> = self
            .paths
            .iter()
            .map(|((group, path), record)| {
                let snapshot = self.classifier.classify(Some(record));
                PathStat {
                    group,
                    path,
                    bytes_observed: record.size,
                    ecn_bytes: record.ecn_size,
                    congested: snapshot.is_congested(ecn_high),
                    snapshot,
                }
            })
            .collect();
        stats.sort_by_key(|s| (s.group, s.path));
        stats
    }

    /// Count of paths per tier toward `group`, in tier order.
    pub fn tier_histogram(&self, group: GroupId) -> [usize; 4] {
        let mut hist = [0usize; 4];
        if let Ok(paths) = self.topology.paths_for_group(group) {
            for &p in paths {
                let idx = match self.classify(group, p).tier {
                    PathTier::Good => 0,
                    PathTier::Grey => 1,
                    PathTier::Bad => 2,
                    PathTier::Fail => 3,
                };
                hist[idx] += 1;
            }
        }
        hist
    }
}

impl Drop for TlbEngine {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for TlbEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TlbEngine")
            .field("now", &self.now)
            .field("flows", &self.flows.len())
            .field("path_records", &self.paths.len())
            .field("acklets", &self.acklets.len())
            .field("observers", &self.observers)
            .finish()
    }
}
