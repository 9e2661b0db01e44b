use crate::config::ClassifierConfig;
use crate::path::dre::Dre;
use crate::path::record::PathRecord;
use serde::Serialize;

/// Health tier of a path, best first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PathTier {
    Good,
    Grey,
    Bad,
    Fail,
}

impl PathTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            PathTier::Good => "good",
            PathTier::Grey => "grey",
            PathTier::Bad => "bad",
            PathTier::Fail => "fail",
        }
    }
}

/// Classification result, recomputed on every call and never cached.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PathSnapshot {
    pub tier: PathTier,
    pub rtt_us: f64,
    pub ecn_fraction: f64,
    /// Whether `ecn_fraction` came from at least the sample floor of bytes.
    pub ecn_sampled: bool,
    pub flow_counter: u32,
    pub quantized_rate: u32,
}

impl PathSnapshot {
    /// A baseline any real Grey or Bad path beats on every metric.
    pub fn worst() -> Self {
        Self {
            tier: PathTier::Bad,
            rtt_us: f64::INFINITY,
            ecn_fraction: 1.0,
            ecn_sampled: true,
            flow_counter: u32::MAX,
            quantized_rate: u32::MAX,
        }
    }

    pub fn is_congested(&self, ecn_high: f64) -> bool {
        self.ecn_sampled && self.ecn_fraction >= ecn_high
    }
}

/// Pure path-record → tier function.
#[derive(Debug, Clone)]
pub struct Classifier {
    config: ClassifierConfig,
    dre: Dre,
}

impl Classifier {
    pub fn new(config: ClassifierConfig, dre: Dre) -> Self {
        Self { config, dre }
    }

    pub fn config(&self) -> &ClassifierConfig {
        &self.config
    }

    fn floor_us(&self) -> f64 {
        self.config.rtt_floor.as_secs_f64() * 1e6
    }

    fn high_us(&self) -> f64 {
        self.config.rtt_high.as_secs_f64() * 1e6
    }

    /// Snapshot for a path that has no record yet.
    pub fn unknown(&self) -> PathSnapshot {
        PathSnapshot {
            tier: PathTier::Grey,
            rtt_us: self.floor_us(),
            ecn_fraction: 0.0,
            ecn_sampled: false,
            flow_counter: 0,
            quantized_rate: 0,
        }
    }

    pub fn classify(&self, record: Option<&PathRecord>) -> PathSnapshot {
        let Some(r) = record else {
            return self.unknown();
        };

        let c = &self.config;
        let rtt_us = r.rtt.value_or(self.floor_us());
        let ecn = r.ecn_fraction(c.ecn_sample_min);
        let ecn_fraction = ecn.unwrap_or(0.0);

        let mut score = c.rtt_weight * rtt_us;
        if ecn.is_some() {
            score += c.ecn_weight * ecn_fraction;
        }
        let good_bound = c.rtt_weight * self.floor_us() + c.ecn_weight * c.ecn_low;
        let bad_bound = c.rtt_weight * self.high_us() + c.ecn_weight * c.ecn_low;

        let tier = if r.is_high_retransmission || r.is_very_timeout || r.is_probing_timeout {
            PathTier::Fail
        } else if score < good_bound
            && !r.is_retransmission
            && !r.is_timeout
            && !r.is_probing_timeout
        {
            PathTier::Good
        } else if score >= bad_bound || r.is_timeout || r.is_retransmission {
            PathTier::Bad
        } else {
            PathTier::Grey
        };

        PathSnapshot {
            tier,
            rtt_us,
            ecn_fraction,
            ecn_sampled: ecn.is_some(),
            flow_counter: r.flow_counter(),
            quantized_rate: self.dre.quantize(r.dre_raw),
        }
    }
}
