//! Property-based tests for the per-path flow counter.
//!
//! Random sequences of transport events must keep every path's counter equal
//! to the number of unfinished flows currently assigned to it, and must never
//! underflow a counter.

use proptest::prelude::*;
use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

use tlb_core::config::{AgingConfig, RerouteConfig, TlbConfig};
use tlb_core::{SimTime, TlbEngine};

const SRC: IpAddr = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1));
const DST: IpAddr = IpAddr::V4(Ipv4Addr::new(10, 0, 1, 1));
const GROUP: u32 = 1;
const PATHS: [u32; 3] = [0, 1, 2];

#[derive(Debug, Clone)]
enum Op {
    GetPath(u64),
    Send { flow: u64, bytes: u64, retx: bool },
    Ack { flow: u64, ecn: bool, rtt_us: u64 },
    Timeout(u64),
    Finish(u64),
    ProbeLoss(u32),
    Wait(u64),
}

fn op() -> impl Strategy<Value = Op> {
    let flow = 0u64..6;
    prop_oneof![
        4 => flow.clone().prop_map(Op::GetPath),
        4 => (flow.clone(), 100u64..20_000, any::<bool>())
            .prop_map(|(flow, bytes, retx)| Op::Send { flow, bytes, retx }),
        3 => (flow.clone(), any::<bool>(), 50u64..800)
            .prop_map(|(flow, ecn, rtt_us)| Op::Ack { flow, ecn, rtt_us }),
        1 => flow.clone().prop_map(Op::Timeout),
        1 => flow.prop_map(Op::Finish),
        1 => (0u32..3).prop_map(Op::ProbeLoss),
        3 => (1u64..3_000).prop_map(Op::Wait),
    ]
}

fn engine(seed: u64) -> TlbEngine {
    let config = TlbConfig {
        seed: Some(seed),
        reroute: RerouteConfig {
            min_bytes_before_reroute: 4_000,
            path_change_poss: 100,
            respond_to_failure: true,
            cooldown: Duration::from_micros(20),
            ..RerouteConfig::default()
        },
        aging: AgingConfig {
            flow_die_time: Duration::from_millis(5),
            ..AgingConfig::default()
        },
        ..TlbConfig::default()
    };
    let mut e = TlbEngine::new(config);
    e.add_address_with_group(SRC, 0);
    e.add_address_with_group(DST, GROUP);
    for p in PATHS {
        e.add_available_path(GROUP, p);
    }
    e
}

fn current_path(e: &TlbEngine, flow: u64) -> u32 {
    e.flow(flow).map(|f| f.path).unwrap_or(flow as u32 % 3)
}

fn apply(e: &mut TlbEngine, op: &Op, now: &mut SimTime) {
    *now += Duration::from_micros(1);
    let t = *now;
    // Rejections (stale paths, unknown flows) are valid outcomes here.
    let _ = match *op {
        Op::GetPath(flow) => e.get_path(flow, SRC, DST, t).map(|_| ()),
        Op::Send { flow, bytes, retx } => {
            let p = current_path(e, flow);
            e.flow_send(flow, DST, p, bytes, retx, t)
        }
        Op::Ack { flow, ecn, rtt_us } => {
            let p = current_path(e, flow);
            e.flow_recv(flow, p, DST, 1_500, ecn, Duration::from_micros(rtt_us), t)
        }
        Op::Timeout(flow) => {
            let p = current_path(e, flow);
            e.flow_timeout(flow, DST, p, t)
        }
        Op::Finish(flow) => e.flow_finish(flow, DST, t),
        Op::ProbeLoss(path) => e.probe_timeout(path, DST, t),
        Op::Wait(us) => {
            *now += Duration::from_micros(us);
            e.advance(*now);
            Ok(())
        }
    };
}

fn live_flows_on(e: &TlbEngine, path: u32) -> u32 {
    e.flows()
        .filter(|(_, f)| !f.finished && f.group == GROUP && f.path == path)
        .count() as u32
}

proptest! {
    #[test]
    fn counter_matches_live_flows(seed in any::<u64>(), ops in prop::collection::vec(op(), 1..200)) {
        let mut e = engine(seed);
        let mut now = SimTime::ZERO;
        for op in &ops {
            apply(&mut e, op, &mut now);
            for p in PATHS {
                prop_assert_eq!(
                    e.classify(GROUP, p).flow_counter,
                    live_flows_on(&e, p),
                    "path {} after {:?}", p, op
                );
            }
        }
        prop_assert_eq!(e.counters().counter_underflows, 0);
    }

    #[test]
    fn finish_is_idempotent(seed in any::<u64>(), repeats in 1usize..5) {
        let mut e = engine(seed);
        let p = e.get_path(1, SRC, DST, SimTime::ZERO).unwrap();
        for i in 0..repeats {
            e.flow_finish(1, DST, SimTime::from_micros(i as u64 + 1)).unwrap();
        }
        prop_assert_eq!(e.classify(GROUP, p).flow_counter, 0);
        prop_assert_eq!(e.counters().counter_underflows, 0);
    }
}
