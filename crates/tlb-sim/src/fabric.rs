//! Discrete-event leaf-to-leaf fabric.
//!
//! A single source rack sends a fixed population of flows toward one
//! destination rack over N parallel paths. Path conditions come from a
//! [`Scenario`]; every packet asks the engine for a path, and ACKs, ECN marks
//! and losses are fed back after the path's current RTT. Probes run on every
//! path at a fixed interval.

use crate::scenario::{PathCondition, Scenario, ScenarioConfig};
use rand::rngs::StdRng;
use rand::RngExt as _;
use rand::SeedableRng;
use serde::Serialize;
use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;
use tlb_core::timer::TimerQueue;
use tlb_core::{EngineStats, FlowId, PathId, PathTier, SimTime, TlbConfig, TlbEngine};
use tracing::{debug, info};

const SRC: IpAddr = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1));
const DST: IpAddr = IpAddr::V4(Ipv4Addr::new(10, 0, 1, 1));
const SRC_GROUP: u32 = 0;
const DST_GROUP: u32 = 1;
const PROBE_BYTES: u64 = 64;

#[derive(Debug, Clone)]
pub struct FabricConfig {
    pub seed: u64,
    pub duration: Duration,
    /// Concurrent flows; a finished flow is replaced by a new one.
    pub flows: usize,
    pub packets_per_flow: u32,
    pub packet_bytes: u64,
    pub send_interval: Duration,
    /// Every this many packets a flow goes quiet for `idle_gap`.
    pub burst_packets: u32,
    pub idle_gap: Duration,
    pub probe_interval: Duration,
    /// Loss is detected this many RTTs after the send.
    pub timeout_rtts: u32,
    pub scenario: ScenarioConfig,
}

impl FabricConfig {
    pub fn new(seed: u64, scenario: ScenarioConfig) -> Self {
        Self {
            seed,
            duration: scenario.duration,
            flows: 8,
            packets_per_flow: 200,
            packet_bytes: 1_500,
            send_interval: Duration::from_micros(10),
            burst_packets: 32,
            idle_gap: Duration::from_micros(600),
            probe_interval: Duration::from_micros(200),
            timeout_rtts: 3,
            scenario,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Event {
    Send(FlowId),
    Ack {
        flow: FlowId,
        path: PathId,
        ecn: bool,
        rtt: Duration,
    },
    Lost {
        flow: FlowId,
        path: PathId,
    },
    Probe(PathId),
    ProbeReply {
        path: PathId,
        ecn: bool,
        rtt: Duration,
    },
    ProbeLost(PathId),
    Frame(usize),
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct PathReport {
    pub path: PathId,
    pub packets: u64,
    pub bytes: u64,
    pub ecn_marked: u64,
    pub lost: u64,
    pub final_tier: Option<PathTier>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SimReport {
    pub seed: u64,
    pub duration_us: u64,
    pub flows_started: u64,
    pub flows_completed: u64,
    pub packets_sent: u64,
    pub packets_lost: u64,
    pub retransmissions: u64,
    pub paused_sends: u64,
    pub rejected_feedback: u64,
    pub paths: Vec<PathReport>,
    pub engine: EngineStats,
}

#[derive(Debug, Clone, Default)]
struct FlowState {
    remaining: u32,
    sent_in_burst: u32,
    retransmit_next: bool,
}

pub struct Fabric {
    cfg: FabricConfig,
    engine: TlbEngine,
    events: TimerQueue<Event>,
    current: Vec<PathCondition>,
    timeline: Vec<(Duration, Vec<PathCondition>)>,
    flows: HashMap<FlowId, FlowState>,
    next_flow: FlowId,
    rng: StdRng,
    paths: Vec<PathReport>,
    report: Counters,
}

#[derive(Debug, Default)]
struct Counters {
    flows_started: u64,
    flows_completed: u64,
    packets_sent: u64,
    packets_lost: u64,
    retransmissions: u64,
    paused_sends: u64,
    rejected_feedback: u64,
}

impl Fabric {
    pub fn new(cfg: FabricConfig, mut engine_cfg: TlbConfig) -> Self {
        if engine_cfg.seed.is_none() {
            engine_cfg.seed = Some(cfg.seed);
        }
        let mut engine = TlbEngine::new(engine_cfg);
        engine.add_address_with_group(SRC, SRC_GROUP);
        engine.add_address_with_group(DST, DST_GROUP);

        let n_paths = cfg.scenario.paths.len();
        for p in 0..n_paths as PathId {
            engine.add_available_path(DST_GROUP, p);
        }

        let timeline: Vec<(Duration, Vec<PathCondition>)> = Scenario::new(cfg.scenario.clone())
            .frames()
            .into_iter()
            .map(|f| (f.t, f.conditions))
            .collect();
        let current = timeline
            .first()
            .map(|(_, c)| c.clone())
            .unwrap_or_default();
        let paths = (0..n_paths as PathId)
            .map(|path| PathReport {
                path,
                ..PathReport::default()
            })
            .collect();

        Self {
            rng: StdRng::seed_from_u64(cfg.seed ^ 0x5EED),
            cfg,
            engine,
            events: TimerQueue::new(),
            current,
            timeline,
            flows: HashMap::new(),
            next_flow: 1,
            paths,
            report: Counters::default(),
        }
    }

    pub fn engine(&self) -> &TlbEngine {
        &self.engine
    }

    fn start_flow(&mut self, at: SimTime) {
        let id = self.next_flow;
        self.next_flow += 1;
        self.flows.insert(
            id,
            FlowState {
                remaining: self.cfg.packets_per_flow,
                ..FlowState::default()
            },
        );
        self.report.flows_started += 1;
        self.events.schedule(at, Event::Send(id));
    }

    fn condition(&self, path: PathId) -> PathCondition {
        self.current
            .get(path as usize)
            .copied()
            .unwrap_or(PathCondition {
                rtt_us: 100.0,
                ecn_prob: 0.0,
                loss_prob: 0.0,
            })
    }

    fn rtt_of(cond: &PathCondition) -> Duration {
        Duration::from_nanos((cond.rtt_us * 1_000.0).round() as u64)
    }

    /// Runs the simulation to completion and returns the report.
    pub fn run(&mut self) -> SimReport {
        let end = SimTime::from_duration(self.cfg.duration);

        for (idx, (t, _)) in self.timeline.iter().enumerate().skip(1) {
            self.events
                .schedule(SimTime::from_duration(*t), Event::Frame(idx));
        }
        for p in 0..self.paths.len() as PathId {
            self.events.schedule(SimTime::ZERO, Event::Probe(p));
        }
        for i in 0..self.cfg.flows {
            // stagger flow starts by one send interval each
            let at = SimTime::ZERO + self.cfg.send_interval.mul_f64(i as f64);
            self.start_flow(at);
        }

        while let Some(at) = self.events.next_deadline() {
            if at > end {
                break;
            }
            while let Some((t, _, event)) = self.events.pop_due(at) {
                self.handle(t, event);
            }
        }
        self.engine.advance(end);

        info!(
            seed = self.cfg.seed,
            flows = self.report.flows_completed,
            packets = self.report.packets_sent,
            path_changes = self.engine.counters().path_changes,
            "simulation finished"
        );

        for stat in self.engine.path_stats() {
            if stat.group == DST_GROUP {
                if let Some(p) = self.paths.get_mut(stat.path as usize) {
                    p.final_tier = Some(stat.snapshot.tier);
                }
            }
        }

        SimReport {
            seed: self.cfg.seed,
            duration_us: self.cfg.duration.as_micros() as u64,
            flows_started: self.report.flows_started,
            flows_completed: self.report.flows_completed,
            packets_sent: self.report.packets_sent,
            packets_lost: self.report.packets_lost,
            retransmissions: self.report.retransmissions,
            paused_sends: self.report.paused_sends,
            rejected_feedback: self.report.rejected_feedback,
            engine: self.engine.stats(),
            paths: self.paths.clone(),
        }
    }

    fn handle(&mut self, now: SimTime, event: Event) {
        match event {
            Event::Frame(idx) => {
                if let Some((_, conditions)) = self.timeline.get(idx) {
                    self.current = conditions.clone();
                }
            }
            Event::Send(flow) => self.send(flow, now),
            Event::Ack {
                flow,
                path,
                ecn,
                rtt,
            } => {
                let bytes = self.cfg.packet_bytes;
                if self
                    .engine
                    .flow_recv(flow, path, DST, bytes, ecn, rtt, now)
                    .is_err()
                {
                    self.report.rejected_feedback += 1;
                }
            }
            Event::Lost { flow, path } => {
                if self.engine.flow_timeout(flow, DST, path, now).is_err() {
                    self.report.rejected_feedback += 1;
                }
            }
            Event::Probe(path) => {
                let _ = self.engine.probe_send(DST, path, now);
                let cond = self.condition(path);
                let rtt = Self::rtt_of(&cond);
                let lost = self.rng.random::<f64>() < cond.loss_prob;
                let reply = if lost {
                    Event::ProbeLost(path)
                } else {
                    Event::ProbeReply {
                        path,
                        ecn: self.rng.random::<f64>() < cond.ecn_prob,
                        rtt,
                    }
                };
                let wait = if lost {
                    rtt * self.cfg.timeout_rtts
                } else {
                    rtt
                };
                self.events.schedule(now + wait, reply);
                self.events
                    .schedule(now + self.cfg.probe_interval, Event::Probe(path));
            }
            Event::ProbeReply { path, ecn, rtt } => {
                let _ = self.engine.probe_recv(path, DST, PROBE_BYTES, ecn, rtt, now);
            }
            Event::ProbeLost(path) => {
                let _ = self.engine.probe_timeout(path, DST, now);
            }
        }
    }

    fn send(&mut self, flow: FlowId, now: SimTime) {
        let Some(state) = self.flows.get(&flow).cloned() else {
            return;
        };

        let path = match self.engine.get_path(flow, SRC, DST, now) {
            Ok(p) => p,
            Err(e) => {
                debug!(flow, error = %e, "no path; retrying later");
                self.events
                    .schedule(now + self.cfg.send_interval, Event::Send(flow));
                return;
            }
        };

        let pause = self.engine.get_pause_time(flow, now);
        if !pause.is_zero() {
            self.report.paused_sends += 1;
            self.events.schedule(now + pause, Event::Send(flow));
            return;
        }

        let bytes = self.cfg.packet_bytes;
        let retx = state.retransmit_next;
        if self
            .engine
            .flow_send(flow, DST, path, bytes, retx, now)
            .is_err()
        {
            self.report.rejected_feedback += 1;
        }
        self.report.packets_sent += 1;
        if retx {
            self.report.retransmissions += 1;
        }

        let cond = self.condition(path);
        let rtt = Self::rtt_of(&cond);
        let lost = self.rng.random::<f64>() < cond.loss_prob;
        let ecn = !lost && self.rng.random::<f64>() < cond.ecn_prob;

        if let Some(report) = self.paths.get_mut(path as usize) {
            report.packets += 1;
            report.bytes += bytes;
            report.ecn_marked += u64::from(ecn);
            report.lost += u64::from(lost);
        }

        if lost {
            self.report.packets_lost += 1;
            self.events
                .schedule(now + rtt * self.cfg.timeout_rtts, Event::Lost { flow, path });
        } else {
            self.events.schedule(
                now + rtt,
                Event::Ack {
                    flow,
                    path,
                    ecn,
                    rtt,
                },
            );
        }

        let mut next = state;
        next.retransmit_next = lost;
        if !lost {
            next.remaining = next.remaining.saturating_sub(1);
        }
        next.sent_in_burst += 1;

        if next.remaining == 0 {
            self.flows.remove(&flow);
            let _ = self.engine.flow_finish(flow, DST, now);
            self.report.flows_completed += 1;
            self.start_flow(now + self.cfg.send_interval);
            return;
        }

        let gap = if self.cfg.burst_packets > 0 && next.sent_in_burst >= self.cfg.burst_packets {
            next.sent_in_burst = 0;
            self.cfg.send_interval + self.cfg.idle_gap
        } else {
            self.cfg.send_interval
        };
        self.flows.insert(flow, next);
        self.events.schedule(now + gap, Event::Send(flow));
    }
}
