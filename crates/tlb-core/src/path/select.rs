//! Tiered path search.
//!
//! Good first, then Grey paths clearly better than a reference, then Bad paths
//! clearly better than it. The tie-break strategy only orders paths within a
//! tier; the tier order is the same for every strategy.

use crate::config::RunMode;
use crate::path::classify::{PathSnapshot, PathTier};
use crate::topology::PathId;
use rand::rngs::StdRng;
use rand::RngExt;
use std::time::Duration;

pub type Candidate = (PathId, PathSnapshot);

/// Orders candidates within a tier. Lower rank wins; equal ranks are broken
/// uniformly at random.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TieBreak {
    CounterMin,
    RttMin,
    RateMin,
    Random,
    RttThenCounter { bucket_ns: u64 },
    RttThenRate { bucket_ns: u64 },
}

impl TieBreak {
    pub fn from_mode(mode: RunMode, rtt_bucket: Duration) -> Self {
        let bucket_ns = (rtt_bucket.as_nanos() as u64).max(1);
        match mode {
            RunMode::CounterMin => TieBreak::CounterMin,
            RunMode::RttMin => TieBreak::RttMin,
            RunMode::RateMin => TieBreak::RateMin,
            RunMode::Random => TieBreak::Random,
            RunMode::RttThenCounter => TieBreak::RttThenCounter { bucket_ns },
            RunMode::RttThenRate => TieBreak::RttThenRate { bucket_ns },
        }
    }

    pub fn rank(&self, snap: &PathSnapshot) -> (u64, u64) {
        // f64 -> u64 saturates, so an infinite RTT ranks last
        let rtt_ns = (snap.rtt_us * 1_000.0).round() as u64;
        match *self {
            TieBreak::CounterMin => (snap.flow_counter as u64, 0),
            TieBreak::RttMin => (rtt_ns, 0),
            TieBreak::RateMin => (snap.quantized_rate as u64, 0),
            TieBreak::Random => (0, 0),
            TieBreak::RttThenCounter { bucket_ns } => {
                (rtt_ns / bucket_ns, snap.flow_counter as u64)
            }
            TieBreak::RttThenRate { bucket_ns } => {
                (rtt_ns / bucket_ns, snap.quantized_rate as u64)
            }
        }
    }

    /// Best-ranked candidate, uniform among ties.
    pub fn pick<'a, I>(&self, candidates: I, rng: &mut StdRng) -> Option<PathId>
    where
        I: IntoIterator<Item = &'a Candidate>,
    {
        self.pick_preferring(candidates, None, rng)
    }

    /// Like [`TieBreak::pick`], but `keep` wins whenever it is among the best.
    pub fn pick_preferring<'a, I>(
        &self,
        candidates: I,
        keep: Option<PathId>,
        rng: &mut StdRng,
    ) -> Option<PathId>
    where
        I: IntoIterator<Item = &'a Candidate>,
    {
        let mut best: Option<(u64, u64)> = None;
        let mut tied: Vec<PathId> = Vec::new();
        for (id, snap) in candidates {
            let rank = self.rank(snap);
            match best {
                Some(b) if rank > b => {}
                Some(b) if rank == b => tied.push(*id),
                _ => {
                    best = Some(rank);
                    tied.clear();
                    tied.push(*id);
                }
            }
        }
        if let Some(k) = keep.filter(|k| tied.contains(k)) {
            return Some(k);
        }
        match tied.len() {
            0 => None,
            1 => Some(tied[0]),
            n => Some(tied[rng.random_range(0..n)]),
        }
    }
}

/// Result of a new-flow selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Selection {
    pub path: PathId,
    pub tier: PathTier,
    pub random_fallback: bool,
}

#[derive(Debug, Clone)]
pub struct Selector {
    tie_break: TieBreak,
    better_rtt_us: f64,
}

impl Selector {
    pub fn new(tie_break: TieBreak, better_path_rtt: Duration) -> Self {
        Self {
            tie_break,
            better_rtt_us: better_path_rtt.as_secs_f64() * 1e6,
        }
    }

    pub fn tie_break(&self) -> TieBreak {
        self.tie_break
    }

    /// Whether `cand` is clearly better than `reference`.
    pub fn is_better(&self, cand: &PathSnapshot, reference: &PathSnapshot) -> bool {
        if reference.tier == PathTier::Fail {
            return cand.tier != PathTier::Fail;
        }
        reference.rtt_us - cand.rtt_us >= self.better_rtt_us
    }

    fn best_better_in_tier(
        &self,
        tier: PathTier,
        parallel: &[Candidate],
        reference: &PathSnapshot,
        exclude: Option<PathId>,
        rng: &mut StdRng,
    ) -> Option<PathId> {
        let eligible: Vec<&Candidate> = parallel
            .iter()
            .filter(|(id, s)| {
                s.tier == tier && Some(*id) != exclude && self.is_better(s, reference)
            })
            .collect();
        self.tie_break.pick(eligible, rng)
    }

    fn best_good(&self, parallel: &[Candidate], rng: &mut StdRng) -> Option<PathId> {
        self.tie_break
            .pick(parallel.iter().filter(|(_, s)| s.tier == PathTier::Good), rng)
    }

    /// Selection for a flow with no usable assignment. Returns `None` only when
    /// `parallel` is empty.
    pub fn select_new(&self, parallel: &[Candidate], rng: &mut StdRng) -> Option<Selection> {
        if parallel.is_empty() {
            return None;
        }
        let tier_of = |id: PathId| {
            parallel
                .iter()
                .find(|(p, _)| *p == id)
                .map(|(_, s)| s.tier)
                .unwrap_or(PathTier::Grey)
        };

        if let Some(path) = self.best_good(parallel, rng) {
            return Some(Selection {
                path,
                tier: PathTier::Good,
                random_fallback: false,
            });
        }

        let baseline = PathSnapshot::worst();
        for tier in [PathTier::Grey, PathTier::Bad] {
            if let Some(path) = self.best_better_in_tier(tier, parallel, &baseline, None, rng) {
                return Some(Selection {
                    path,
                    tier,
                    random_fallback: false,
                });
            }
        }

        let path = parallel[rng.random_range(0..parallel.len())].0;
        Some(Selection {
            path,
            tier: tier_of(path),
            random_fallback: true,
        })
    }

    /// Selection for an established flow. `None` keeps the current path.
    ///
    /// The current path is ranked without the flow's own share of its
    /// counter, and it keeps the flow whenever it ties the best Good path.
    pub fn select_reroute(
        &self,
        current: &Candidate,
        parallel: &[Candidate],
        rng: &mut StdRng,
    ) -> Option<PathId> {
        let (current_id, current_snap) = current;

        let own_excluded: Vec<Candidate> = parallel
            .iter()
            .map(|&(id, mut snap)| {
                if id == *current_id {
                    snap.flow_counter = snap.flow_counter.saturating_sub(1);
                }
                (id, snap)
            })
            .collect();

        let pick = self
            .tie_break
            .pick_preferring(
                own_excluded.iter().filter(|(_, s)| s.tier == PathTier::Good),
                Some(*current_id),
                rng,
            )
            .or_else(|| {
                [PathTier::Grey, PathTier::Bad].into_iter().find_map(|tier| {
                    self.best_better_in_tier(tier, parallel, current_snap, Some(*current_id), rng)
                })
            });

        pick.filter(|p| p != current_id)
    }
}
