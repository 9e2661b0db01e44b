//! # Metrics Export
//!
//! Renders engine and per-path state in Prometheus text exposition format,
//! plus a JSON snapshot for offline tooling.

use crate::engine::{EngineStats, PathStat};
use crate::path::PathTier;
use std::fmt::Write;

fn header(out: &mut String, name: &str, help: &str, kind: &str) {
    let _ = writeln!(out, "# HELP {name} {help}");
    let _ = writeln!(out, "# TYPE {name} {kind}");
}

fn tier_to_u8(tier: PathTier) -> u8 {
    match tier {
        PathTier::Good => 0,
        PathTier::Grey => 1,
        PathTier::Bad => 2,
        PathTier::Fail => 3,
    }
}

/// Render engine counters and per-path gauges.
pub fn render_prometheus(stats: &EngineStats, paths: &[PathStat]) -> String {
    let mut out = String::with_capacity(2048);

    // ── Per-path gauges ─────────────────────────────────────────

    header(
        &mut out,
        "tlb_path_tier",
        "Path health tier encoded as integer (0=good..3=fail).",
        "gauge",
    );
    for p in paths {
        let _ = writeln!(
            out,
            "tlb_path_tier{{group=\"{}\",path=\"{}\",tier=\"{}\"}} {}",
            p.group,
            p.path,
            p.snapshot.tier.as_str(),
            tier_to_u8(p.snapshot.tier)
        );
    }

    header(
        &mut out,
        "tlb_path_rtt_us",
        "Path RTT estimate in microseconds.",
        "gauge",
    );
    for p in paths {
        let _ = writeln!(
            out,
            "tlb_path_rtt_us{{group=\"{}\",path=\"{}\"}} {:.3}",
            p.group, p.path, p.snapshot.rtt_us
        );
    }

    header(
        &mut out,
        "tlb_path_ecn_fraction",
        "ECN-marked fraction of bytes in the current window (0.0-1.0).",
        "gauge",
    );
    for p in paths {
        let _ = writeln!(
            out,
            "tlb_path_ecn_fraction{{group=\"{}\",path=\"{}\"}} {:.6}",
            p.group, p.path, p.snapshot.ecn_fraction
        );
    }

    header(
        &mut out,
        "tlb_path_flows",
        "Active flows assigned to the path.",
        "gauge",
    );
    for p in paths {
        let _ = writeln!(
            out,
            "tlb_path_flows{{group=\"{}\",path=\"{}\"}} {}",
            p.group, p.path, p.snapshot.flow_counter
        );
    }

    header(
        &mut out,
        "tlb_path_rate_bucket",
        "Quantized DRE send rate.",
        "gauge",
    );
    for p in paths {
        let _ = writeln!(
            out,
            "tlb_path_rate_bucket{{group=\"{}\",path=\"{}\"}} {}",
            p.group, p.path, p.snapshot.quantized_rate
        );
    }

    header(
        &mut out,
        "tlb_path_congested",
        "Whether the ECN fraction is at or above the congestion threshold.",
        "gauge",
    );
    for p in paths {
        let _ = writeln!(
            out,
            "tlb_path_congested{{group=\"{}\",path=\"{}\"}} {}",
            p.group,
            p.path,
            u8::from(p.congested)
        );
    }

    // ── Engine totals ───────────────────────────────────────────

    header(&mut out, "tlb_flows", "Tracked flow records.", "gauge");
    let _ = writeln!(out, "tlb_flows {}", stats.flows);
    header(&mut out, "tlb_flows_active", "Flows not yet finished.", "gauge");
    let _ = writeln!(out, "tlb_flows_active {}", stats.active_flows);
    header(&mut out, "tlb_acklets", "Tracked acklet records.", "gauge");
    let _ = writeln!(out, "tlb_acklets {}", stats.acklets);

    let c = &stats.counters;
    for (name, help, value) in [
        ("tlb_selections_total", "New-flow path selections.", c.selections),
        ("tlb_random_fallbacks_total", "Selections that fell back to a random path.", c.random_fallbacks),
        ("tlb_reroute_evaluations_total", "Reroute evaluations that passed the gates.", c.reroute_evaluations),
        ("tlb_reroutes_damped_total", "Reroute evaluations skipped by damping.", c.reroutes_damped),
        ("tlb_path_changes_total", "Flows moved to a different path.", c.path_changes),
        ("tlb_lookup_failures_total", "Destination or path lookups that failed.", c.lookup_failures),
        ("tlb_stale_updates_total", "Feedback events naming a path the flow left.", c.stale_updates),
        ("tlb_flows_expired_total", "Flow records reclaimed by aging.", c.flows_expired),
    ] {
        header(&mut out, name, help, "counter");
        let _ = writeln!(out, "{name} {value}");
    }

    out
}

/// JSON snapshot: `{"engine": {...}, "paths": [...]}`.
pub fn to_json(stats: &EngineStats, paths: &[PathStat]) -> String {
    serde_json::json!({
        "engine": stats,
        "paths": paths,
    })
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::DecisionCounters;
    use crate::path::PathSnapshot;

    fn sample() -> (EngineStats, Vec<PathStat>) {
        let stats = EngineStats {
            now_ns: 1_000,
            flows: 3,
            active_flows: 2,
            path_records: 2,
            acklets: 1,
            counters: DecisionCounters {
                selections: 3,
                path_changes: 1,
                ..DecisionCounters::default()
            },
        };
        let snap = |tier, rtt_us, ecn_fraction| PathSnapshot {
            tier,
            rtt_us,
            ecn_fraction,
            ecn_sampled: true,
            flow_counter: 1,
            quantized_rate: 2,
        };
        let paths = vec![
            PathStat {
                group: 1,
                path: 0,
                bytes_observed: 20_000,
                ecn_bytes: 0,
                snapshot: snap(PathTier::Good, 80.0, 0.0),
                congested: false,
            },
            PathStat {
                group: 1,
                path: 1,
                bytes_observed: 20_000,
                ecn_bytes: 12_000,
                snapshot: snap(PathTier::Bad, 90.0, 0.6),
                congested: true,
            },
        ];
        (stats, paths)
    }

    #[test]
    fn renders_path_gauges_and_counters() {
        let (stats, paths) = sample();
        let text = render_prometheus(&stats, &paths);
        assert!(text.contains("# TYPE tlb_path_tier gauge"));
        assert!(text.contains("tlb_path_tier{group=\"1\",path=\"1\",tier=\"bad\"} 2"));
        assert!(text.contains("tlb_path_rtt_us{group=\"1\",path=\"0\"} 80.000"));
        assert!(text.contains("tlb_path_congested{group=\"1\",path=\"1\"} 1"));
        assert!(text.contains("tlb_flows_active 2"));
        assert!(text.contains("# TYPE tlb_path_changes_total counter"));
        assert!(text.contains("tlb_path_changes_total 1"));
    }

    #[test]
    fn json_snapshot_round_trips_through_serde() {
        let (stats, paths) = sample();
        let v: serde_json::Value = serde_json::from_str(&to_json(&stats, &paths)).unwrap();
        assert_eq!(v["engine"]["flows"], 3);
        assert_eq!(v["paths"][1]["snapshot"]["tier"], "bad");
        assert_eq!(v["paths"].as_array().map(|a| a.len()), Some(2));
    }
}
