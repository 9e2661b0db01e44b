use crate::config::TlbConfig;
use crate::engine::{EngineStats, PathStat, TlbEngine};
use crate::events::PathChangedEvent;
use crate::metrics::render_prometheus;
use crate::path::PathSnapshot;
use crate::time::SimTime;
use crate::topology::{FlowId, GroupId, PathId};
use anyhow::Context;
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use quanta::Instant;
use std::net::IpAddr;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;
use tracing::{debug, warn};

const CONTROL_CAPACITY: usize = 4096;
const EVENT_CAPACITY: usize = 1024;
const MAX_IDLE_WAIT: Duration = Duration::from_millis(10);
const STATS_INTERVAL: Duration = Duration::from_millis(100);

type Query = Box<dyn FnOnce(&mut TlbEngine, SimTime) + Send>;

/// Messages to the worker thread. Feedback events are fire-and-forget;
/// anything that needs an answer goes through `Query` with its own reply
/// channel.
enum RuntimeMessage {
    AddAddress(IpAddr, GroupId),
    AddPath(GroupId, PathId),
    FlowSend {
        flow: FlowId,
        dst: IpAddr,
        path: PathId,
        bytes: u64,
        retransmission: bool,
    },
    FlowRecv {
        flow: FlowId,
        path: PathId,
        dst: IpAddr,
        bytes: u64,
        ecn: bool,
        rtt: Duration,
    },
    FlowTimeout {
        flow: FlowId,
        dst: IpAddr,
        path: PathId,
    },
    FlowFinish {
        flow: FlowId,
        dst: IpAddr,
    },
    ProbeSend {
        path: PathId,
        dst: IpAddr,
    },
    ProbeRecv {
        path: PathId,
        dst: IpAddr,
        size: u64,
        ecn: bool,
        rtt: Duration,
    },
    ProbeTimeout {
        path: PathId,
        dst: IpAddr,
    },
    Mark(HealthMark, GroupId, PathId),
    Query(Query),
    Shutdown,
}

/// Sticky health flag to raise on a path record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthMark {
    Retransmission,
    HighRetransmission,
    Timeout,
    VeryTimeout,
    ProbingTimeout,
}

#[derive(Debug, Clone)]
struct StatsSnapshot {
    engine: EngineStats,
    paths: Vec<PathStat>,
}

/// Thread-safe handle to a [`TlbEngine`] running on its own worker thread.
///
/// The worker owns the engine, maps wall-clock time onto [`SimTime`] with a
/// `quanta` clock, and wakes up on its own to run the aging tasks when no
/// messages arrive. Dropping the runtime shuts the worker down.
pub struct TlbRuntime {
    tx: Sender<RuntimeMessage>,
    stats: Arc<Mutex<Option<StatsSnapshot>>>,
    handle: Option<thread::JoinHandle<()>>,
}

impl TlbRuntime {
    pub fn new(config: TlbConfig) -> anyhow::Result<Self> {
        let (tx, rx) = bounded(CONTROL_CAPACITY);
        let stats = Arc::new(Mutex::new(None));
        let stats_clone = stats.clone();

        let handle = thread::Builder::new()
            .name("tlb-worker".into())
            .spawn(move || runtime_worker(rx, TlbEngine::new(config), stats_clone))
            .context("failed to spawn tlb runtime worker")?;

        Ok(Self {
            tx,
            stats,
            handle: Some(handle),
        })
    }

    fn post(&self, msg: RuntimeMessage) -> anyhow::Result<()> {
        self.tx
            .send(msg)
            .map_err(|_| anyhow::anyhow!("tlb runtime worker has exited"))
    }

    /// Runs `f` on the worker against the engine and waits for its result.
    pub fn query<R, F>(&self, f: F) -> anyhow::Result<R>
    where
        R: Send + 'static,
        F: FnOnce(&mut TlbEngine, SimTime) -> R + Send + 'static,
    {
        let (reply_tx, reply_rx) = bounded(1);
        self.post(RuntimeMessage::Query(Box::new(move |engine, now| {
            let _ = reply_tx.send(f(engine, now));
        })))?;
        reply_rx
            .recv()
            .map_err(|_| anyhow::anyhow!("tlb runtime worker dropped the reply"))
    }

    pub fn add_address_with_group(&self, addr: IpAddr, group: GroupId) -> anyhow::Result<()> {
        self.post(RuntimeMessage::AddAddress(addr, group))
    }

    pub fn add_available_path(&self, group: GroupId, path: PathId) -> anyhow::Result<()> {
        self.post(RuntimeMessage::AddPath(group, path))
    }

    pub fn get_path(&self, flow: FlowId, src: IpAddr, dst: IpAddr) -> anyhow::Result<PathId> {
        Ok(self.query(move |e, now| e.get_path(flow, src, dst, now))??)
    }

    pub fn get_ack_path(&self, flow: FlowId, src: IpAddr, dst: IpAddr) -> anyhow::Result<PathId> {
        Ok(self.query(move |e, now| e.get_ack_path(flow, src, dst, now))??)
    }

    pub fn get_pause_time(&self, flow: FlowId) -> anyhow::Result<Duration> {
        self.query(move |e, now| e.get_pause_time(flow, now))
    }

    pub fn flow_send(
        &self,
        flow: FlowId,
        dst: IpAddr,
        path: PathId,
        bytes: u64,
        retransmission: bool,
    ) -> anyhow::Result<()> {
        self.post(RuntimeMessage::FlowSend {
            flow,
            dst,
            path,
            bytes,
            retransmission,
        })
    }

    pub fn flow_recv(
        &self,
        flow: FlowId,
        path: PathId,
        dst: IpAddr,
        bytes: u64,
        ecn: bool,
        rtt: Duration,
    ) -> anyhow::Result<()> {
        self.post(RuntimeMessage::FlowRecv {
            flow,
            path,
            dst,
            bytes,
            ecn,
            rtt,
        })
    }

    pub fn flow_timeout(&self, flow: FlowId, dst: IpAddr, path: PathId) -> anyhow::Result<()> {
        self.post(RuntimeMessage::FlowTimeout { flow, dst, path })
    }

    pub fn flow_finish(&self, flow: FlowId, dst: IpAddr) -> anyhow::Result<()> {
        self.post(RuntimeMessage::FlowFinish { flow, dst })
    }

    pub fn probe_send(&self, path: PathId, dst: IpAddr) -> anyhow::Result<()> {
        self.post(RuntimeMessage::ProbeSend { path, dst })
    }

    pub fn probe_recv(
        &self,
        path: PathId,
        dst: IpAddr,
        size: u64,
        ecn: bool,
        rtt: Duration,
    ) -> anyhow::Result<()> {
        self.post(RuntimeMessage::ProbeRecv {
            path,
            dst,
            size,
            ecn,
            rtt,
        })
    }

    pub fn probe_timeout(&self, path: PathId, dst: IpAddr) -> anyhow::Result<()> {
        self.post(RuntimeMessage::ProbeTimeout { path, dst })
    }

    pub fn mark(&self, mark: HealthMark, group: GroupId, path: PathId) -> anyhow::Result<()> {
        self.post(RuntimeMessage::Mark(mark, group, path))
    }

    pub fn mark_retransmission(&self, group: GroupId, path: PathId) -> anyhow::Result<()> {
        self.mark(HealthMark::Retransmission, group, path)
    }

    pub fn mark_high_retransmission(&self, group: GroupId, path: PathId) -> anyhow::Result<()> {
        self.mark(HealthMark::HighRetransmission, group, path)
    }

    pub fn mark_timeout(&self, group: GroupId, path: PathId) -> anyhow::Result<()> {
        self.mark(HealthMark::Timeout, group, path)
    }

    pub fn mark_very_timeout(&self, group: GroupId, path: PathId) -> anyhow::Result<()> {
        self.mark(HealthMark::VeryTimeout, group, path)
    }

    pub fn mark_probing_timeout(&self, group: GroupId, path: PathId) -> anyhow::Result<()> {
        self.mark(HealthMark::ProbingTimeout, group, path)
    }

    pub fn classify(&self, group: GroupId, path: PathId) -> anyhow::Result<PathSnapshot> {
        self.query(move |e, _| e.classify(group, path))
    }

    pub fn get_available_paths(&self, addr: IpAddr) -> anyhow::Result<Vec<PathId>> {
        Ok(self.query(move |e, _| e.get_available_paths(addr))??)
    }

    /// Streams path-change events. Events are dropped when the receiver
    /// falls more than a bounded backlog behind.
    pub fn subscribe_path_changes(&self) -> anyhow::Result<Receiver<PathChangedEvent>> {
        let (event_tx, event_rx) = bounded(EVENT_CAPACITY);
        self.query(move |e, _| {
            e.on_path_changed(move |ev| {
                let _ = event_tx.try_send(ev.clone());
            })
        })?;
        Ok(event_rx)
    }

    /// Latest engine stats published by the worker.
    pub fn stats(&self) -> Option<EngineStats> {
        self.stats
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .map(|s| s.engine.clone())
    }

    /// Prometheus text for the latest published snapshot.
    pub fn metrics_text(&self) -> Option<String> {
        self.stats
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .map(|s| render_prometheus(&s.engine, &s.paths))
    }

    /// Stops the worker thread. Idempotent.
    pub fn shutdown(&mut self) {
        let _ = self.tx.send(RuntimeMessage::Shutdown);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for TlbRuntime {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn runtime_worker(
    rx: Receiver<RuntimeMessage>,
    mut engine: TlbEngine,
    stats: Arc<Mutex<Option<StatsSnapshot>>>,
) {
    let start = Instant::now();
    let clock = || SimTime::from_duration(start.elapsed());
    let mut last_stats = Instant::now();

    loop {
        let now = clock();
        let wait = engine
            .next_deadline()
            .map(|at| at.saturating_since(now))
            .unwrap_or(MAX_IDLE_WAIT)
            .min(MAX_IDLE_WAIT);

        match rx.recv_timeout(wait) {
            Ok(RuntimeMessage::Shutdown) => break,
            Ok(msg) => handle_message(&mut engine, msg, clock()),
            Err(RecvTimeoutError::Timeout) => engine.advance(clock()),
            Err(RecvTimeoutError::Disconnected) => break,
        }

        if last_stats.elapsed() >= STATS_INTERVAL {
            let snapshot = StatsSnapshot {
                engine: engine.stats(),
                paths: engine.path_stats(),
            };
            if let Ok(mut s) = stats.lock() {
                *s = Some(snapshot);
            }
            last_stats = Instant::now();
        }
    }

    engine.shutdown();
    debug!("tlb runtime worker exited");
}

fn handle_message(engine: &mut TlbEngine, msg: RuntimeMessage, now: SimTime) {
    let result = match msg {
        RuntimeMessage::AddAddress(addr, group) => {
            engine.add_address_with_group(addr, group);
            Ok(())
        }
        RuntimeMessage::AddPath(group, path) => {
            engine.add_available_path(group, path);
            Ok(())
        }
        RuntimeMessage::FlowSend {
            flow,
            dst,
            path,
            bytes,
            retransmission,
        } => engine.flow_send(flow, dst, path, bytes, retransmission, now),
        RuntimeMessage::FlowRecv {
            flow,
            path,
            dst,
            bytes,
            ecn,
            rtt,
        } => engine.flow_recv(flow, path, dst, bytes, ecn, rtt, now),
        RuntimeMessage::FlowTimeout { flow, dst, path } => engine.flow_timeout(flow, dst, path, now),
        RuntimeMessage::FlowFinish { flow, dst } => engine.flow_finish(flow, dst, now),
        RuntimeMessage::ProbeSend { path, dst } => engine.probe_send(dst, path, now),
        RuntimeMessage::ProbeRecv {
            path,
            dst,
            size,
            ecn,
            rtt,
        } => engine.probe_recv(path, dst, size, ecn, rtt, now),
        RuntimeMessage::ProbeTimeout { path, dst } => engine.probe_timeout(path, dst, now),
        RuntimeMessage::Mark(mark, group, path) => {
            match mark {
                HealthMark::Retransmission => engine.mark_retransmission(group, path, now),
                HealthMark::HighRetransmission => {
                    engine.mark_high_retransmission(group, path, now)
                }
                HealthMark::Timeout => engine.mark_timeout(group, path, now),
                HealthMark::VeryTimeout => engine.mark_very_timeout(group, path, now),
                HealthMark::ProbingTimeout => engine.mark_probing_timeout(group, path, now),
            }
            Ok(())
        }
        RuntimeMessage::Query(f) => {
            f(engine, now);
            Ok(())
        }
        RuntimeMessage::Shutdown => Ok(()),
    };
    if let Err(e) = result {
        if !e.is_stale() {
            warn!(error = %e, "tlb runtime event rejected");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path::PathTier;
    use std::net::Ipv4Addr;

    const SRC: IpAddr = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1));
    const DST: IpAddr = IpAddr::V4(Ipv4Addr::new(10, 0, 1, 1));

    fn runtime() -> TlbRuntime {
        let rt = TlbRuntime::new(TlbConfig {
            seed: Some(3),
            ..TlbConfig::default()
        })
        .unwrap();
        rt.add_address_with_group(SRC, 0).unwrap();
        rt.add_address_with_group(DST, 1).unwrap();
        rt.add_available_path(1, 4).unwrap();
        rt.add_available_path(1, 5).unwrap();
        rt
    }

    #[test]
    fn get_path_round_trips_through_worker() {
        let rt = runtime();
        let p = rt.get_path(1, SRC, DST).unwrap();
        assert!(p == 4 || p == 5, "unexpected path {p}");
        // same flow, no gap, stays put
        assert_eq!(rt.get_path(1, SRC, DST).unwrap(), p);
    }

    #[test]
    fn lookup_failure_surfaces_as_error() {
        let rt = runtime();
        let unknown = IpAddr::V4(Ipv4Addr::new(172, 16, 0, 1));
        assert!(rt.get_path(1, SRC, unknown).is_err());
    }

    #[test]
    fn fire_and_forget_events_are_applied_in_order() {
        let rt = runtime();
        let p = rt.get_path(9, SRC, DST).unwrap();
        rt.flow_send(9, DST, p, 1_500, false).unwrap();
        rt.flow_send(9, DST, p, 1_500, false).unwrap();
        let sent = rt
            .query(|e, _| e.flow(9).map(|f| f.bytes_sent))
            .unwrap();
        assert_eq!(sent, Some(3_000));
    }

    #[test]
    fn shutdown_is_idempotent() {
        let mut rt = runtime();
        rt.shutdown();
        rt.shutdown();
        assert!(rt.get_path(1, SRC, DST).is_err());
    }

    #[test]
    fn probe_send_primes_unused_paths() {
        let rt = runtime();
        rt.probe_send(4, DST).unwrap();
        rt.probe_send(5, DST).unwrap();
        let primed = rt
            .query(|e, _| (e.path_record(1, 4).is_some(), e.path_record(1, 5).is_some()))
            .unwrap();
        assert_eq!(primed, (true, true));
        assert_eq!(rt.classify(1, 4).unwrap().tier, PathTier::Good);
        assert_eq!(rt.get_available_paths(DST).unwrap(), vec![4, 5]);
    }

    #[test]
    fn marks_are_forwarded_to_the_engine() {
        let rt = runtime();
        rt.mark_retransmission(1, 4).unwrap();
        assert_eq!(rt.classify(1, 4).unwrap().tier, PathTier::Bad);
        rt.mark_probing_timeout(1, 5).unwrap();
        assert_eq!(rt.classify(1, 5).unwrap().tier, PathTier::Fail);

        // the only non-failed path takes the new flow
        assert_eq!(rt.get_path(2, SRC, DST).unwrap(), 4);
    }
}
