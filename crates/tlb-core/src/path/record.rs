use crate::config::{AgingConfig, SmoothingConfig};
use crate::path::dre::Dre;
use crate::path::rtt::RttEstimate;
use crate::time::SimTime;
use crate::topology::{GroupId, PathId};
use std::collections::HashMap;
use std::time::Duration;

/// Aggregated health of one path toward one destination group.
///
/// Three clocks age independently:
/// - the soft stamp opens the current size/ECN window (also owns `is_timeout`),
/// - the hard stamp is the last time a hard failure flag was raised,
/// - the RTT stamp opens the current RTT window.
#[derive(Debug, Clone)]
pub struct PathRecord {
    pub size: u64,
    pub ecn_size: u64,
    pub rtt: RttEstimate,
    pub dre_raw: f64,
    pub is_retransmission: bool,
    pub is_high_retransmission: bool,
    pub is_timeout: bool,
    pub is_very_timeout: bool,
    pub is_probing_timeout: bool,
    flow_counter: u32,
    soft_stamp: SimTime,
    hard_stamp: SimTime,
    rtt_stamp: SimTime,
}

/// What an aging pass cleared on one record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AgeOutcome {
    pub soft_reset: bool,
    pub hard_reset: bool,
    pub rtt_expired: bool,
}

impl PathRecord {
    /// Fresh record with optimistic defaults: no samples, no flags.
    pub fn new(now: SimTime) -> Self {
        Self {
            size: 0,
            ecn_size: 0,
            rtt: RttEstimate::new(),
            dre_raw: 0.0,
            is_retransmission: false,
            is_high_retransmission: false,
            is_timeout: false,
            is_very_timeout: false,
            is_probing_timeout: false,
            flow_counter: 0,
            soft_stamp: now,
            hard_stamp: now,
            rtt_stamp: now,
        }
    }

    pub fn merge_sample(
        &mut self,
        bytes: u64,
        ecn: bool,
        rtt: Duration,
        smoothing: &SmoothingConfig,
    ) {
        self.size = self.size.saturating_add(bytes);
        if ecn {
            self.ecn_size = self.ecn_size.saturating_add(bytes);
        }
        self.rtt.update(rtt.as_secs_f64() * 1e6, smoothing);
    }

    /// ECN-marked fraction, or `None` while fewer than `sample_min` bytes were seen.
    pub fn ecn_fraction(&self, sample_min: u64) -> Option<f64> {
        if self.size == 0 || self.size < sample_min {
            return None;
        }
        Some(self.ecn_size as f64 / self.size as f64)
    }

    pub fn flow_counter(&self) -> u32 {
        self.flow_counter
    }

    pub fn assign_flow(&mut self) {
        self.flow_counter += 1;
    }

    /// Releases one flow. Returns false (and leaves the counter at zero) on underflow.
    pub fn release_flow(&mut self) -> bool {
        match self.flow_counter.checked_sub(1) {
            Some(n) => {
                self.flow_counter = n;
                true
            }
            None => false,
        }
    }

    pub fn mark_retransmission(&mut self, now: SimTime) {
        self.is_retransmission = true;
        self.hard_stamp = now;
    }

    pub fn mark_high_retransmission(&mut self, now: SimTime) {
        self.is_high_retransmission = true;
        self.hard_stamp = now;
    }

    pub fn mark_timeout(&mut self) {
        self.is_timeout = true;
    }

    pub fn mark_very_timeout(&mut self, now: SimTime) {
        self.is_very_timeout = true;
        self.hard_stamp = now;
    }

    pub fn mark_probing_timeout(&mut self, now: SimTime) {
        self.is_probing_timeout = true;
        self.hard_stamp = now;
    }

    pub fn has_hard_flag(&self) -> bool {
        self.is_retransmission
            || self.is_high_retransmission
            || self.is_very_timeout
            || self.is_probing_timeout
    }

    pub fn age(
        &mut self,
        now: SimTime,
        aging: &AgingConfig,
        smoothing: &SmoothingConfig,
    ) -> AgeOutcome {
        let mut outcome = AgeOutcome::default();

        if now.saturating_since(self.soft_stamp) >= aging.soft_window {
            self.size = 0;
            self.ecn_size = 0;
            self.is_timeout = false;
            self.soft_stamp = now;
            outcome.soft_reset = true;
        }

        if self.has_hard_flag() && now.saturating_since(self.hard_stamp) >= aging.hard_window {
            self.is_retransmission = false;
            self.is_high_retransmission = false;
            self.is_very_timeout = false;
            self.is_probing_timeout = false;
            self.hard_stamp = now;
            outcome.hard_reset = true;
        }

        if now.saturating_since(self.rtt_stamp) >= aging.hard_window {
            self.rtt.expire(smoothing);
            self.rtt_stamp = now;
            outcome.rtt_expired = true;
        }

        outcome
    }
}

/// All path records owned by the engine, keyed by (group, path).
#[derive(Debug, Default)]
pub struct PathStore {
    records: HashMap<(GroupId, PathId), PathRecord>,
}

impl PathStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, group: GroupId, path: PathId) -> Option<&PathRecord> {
        self.records.get(&(group, path))
    }

    pub fn get_mut(&mut self, group: GroupId, path: PathId) -> Option<&mut PathRecord> {
        self.records.get_mut(&(group, path))
    }

    pub fn get_or_create(&mut self, group: GroupId, path: PathId, now: SimTime) -> &mut PathRecord {
        self.records.entry((group, path)).or_insert_with(|| {
            tracing::trace!(group, path, "path record created");
            PathRecord::new(now)
        })
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = ((GroupId, PathId), &PathRecord)> {
        self.records.iter().map(|(k, v)| (*k, v))
    }

    pub fn decay_all(&mut self, dre: &Dre) {
        for record in self.records.values_mut() {
            dre.decay(&mut record.dre_raw);
        }
    }

    pub fn age_all(&mut self, now: SimTime, aging: &AgingConfig, smoothing: &SmoothingConfig) {
        for (&(group, path), record) in self.records.iter_mut() {
            let outcome = record.age(now, aging, smoothing);
            if outcome.hard_reset {
                tracing::debug!(group, path, "path failure flags cleared");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn aging() -> AgingConfig {
        AgingConfig {
            soft_window: Duration::from_micros(100),
            hard_window: Duration::from_micros(1_000),
            check_period: Duration::from_micros(10),
            flow_die_time: Duration::from_millis(10),
        }
    }

    #[test]
    fn ecn_fraction_needs_sample_floor() {
        let smoothing = SmoothingConfig::default();
        let mut r = PathRecord::new(SimTime::ZERO);
        assert_eq!(r.ecn_fraction(1_000), None);

        r.merge_sample(999, true, Duration::from_micros(100), &smoothing);
        assert_eq!(r.ecn_fraction(1_000), None);

        r.merge_sample(1, false, Duration::from_micros(100), &smoothing);
        let f = r.ecn_fraction(1_000).unwrap();
        assert!((f - 0.999).abs() < 1e-9);
    }

    #[test]
    fn counter_never_goes_negative() {
        let mut r = PathRecord::new(SimTime::ZERO);
        r.assign_flow();
        assert!(r.release_flow());
        assert!(!r.release_flow());
        assert_eq!(r.flow_counter(), 0);
    }

    #[test]
    fn soft_window_resets_counters_and_timeout_only() {
        let smoothing = SmoothingConfig::default();
        let mut r = PathRecord::new(SimTime::ZERO);
        r.merge_sample(5_000, true, Duration::from_micros(120), &smoothing);
        r.mark_timeout();
        r.mark_very_timeout(SimTime::from_micros(50));

        let out = r.age(SimTime::from_micros(100), &aging(), &smoothing);
        assert!(out.soft_reset);
        assert!(!out.hard_reset);
        assert_eq!(r.size, 0);
        assert_eq!(r.ecn_size, 0);
        assert!(!r.is_timeout);
        assert!(r.is_very_timeout);
        assert!(r.rtt.is_sampled());
    }

    #[test]
    fn hard_window_counts_from_last_flag() {
        let smoothing = SmoothingConfig::default();
        let mut r = PathRecord::new(SimTime::ZERO);
        r.mark_retransmission(SimTime::from_micros(500));
        r.mark_probing_timeout(SimTime::from_micros(900));

        let out = r.age(SimTime::from_micros(1_200), &aging(), &smoothing);
        assert!(!out.hard_reset);
        assert!(r.is_retransmission && r.is_probing_timeout);

        let out = r.age(SimTime::from_micros(1_900), &aging(), &smoothing);
        assert!(out.hard_reset);
        assert!(!r.has_hard_flag());
    }

    #[test]
    fn store_decays_every_record() {
        let dre = Dre::new(&crate::config::DreConfig::default());
        let mut store = PathStore::new();
        store.get_or_create(1, 0, SimTime::ZERO).dre_raw = 100.0;
        store.get_or_create(1, 1, SimTime::ZERO).dre_raw = 10.0;
        store.decay_all(&dre);
        assert!((store.get(1, 0).unwrap().dre_raw - 80.0).abs() < 1e-9);
        assert!((store.get(1, 1).unwrap().dre_raw - 8.0).abs() < 1e-9);
    }
}
