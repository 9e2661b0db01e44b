use std::time::Duration;

use serde::Deserialize;

use crate::path::dre::MAX_Q_BITS;

pub const CONFIG_VERSION: u32 = 1;

/// Tie-break strategy among equally-tiered candidate paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    /// Fewest concurrent flows.
    #[default]
    CounterMin,
    /// Lowest minimum RTT.
    RttMin,
    /// Lowest quantized DRE rate.
    RateMin,
    /// Uniform among all candidates.
    Random,
    /// Lowest RTT bucket, then fewest flows.
    RttThenCounter,
    /// Lowest RTT bucket, then lowest quantized rate.
    RttThenRate,
}

impl RunMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunMode::CounterMin => "counter_min",
            RunMode::RttMin => "rtt_min",
            RunMode::RateMin => "rate_min",
            RunMode::Random => "random",
            RunMode::RttThenCounter => "rtt_then_counter",
            RunMode::RttThenRate => "rtt_then_rate",
        }
    }
}

// ─── TOML input ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TlbConfigInput {
    pub version: u32,
    pub run_mode: Option<RunMode>,
    pub seed: Option<u64>,
    pub classifier: ClassifierConfigInput,
    pub reroute: RerouteConfigInput,
    pub aging: AgingConfigInput,
    pub smoothing: SmoothingConfigInput,
    pub acklet: AckletConfigInput,
    pub dre: DreConfigInput,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ClassifierConfigInput {
    pub rtt_floor_us: Option<u64>,
    pub rtt_high_us: Option<u64>,
    pub rtt_weight: Option<f64>,
    pub ecn_weight: Option<f64>,
    pub ecn_sample_min: Option<u64>,
    pub ecn_low: Option<f64>,
    pub ecn_high: Option<f64>,
    pub quantify_rtt_base_us: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RerouteConfigInput {
    pub enabled: Option<bool>,
    pub min_bytes_before_reroute: Option<u64>,
    pub respond_to_failure: Option<bool>,
    pub retrans_high: Option<u32>,
    pub retrans_very_high: Option<u32>,
    pub timeout_very_high: Option<u32>,
    pub better_path_rtt_us: Option<u64>,
    pub path_change_poss: Option<u32>,
    pub cooldown_us: Option<u64>,
    pub flowlet_timeout_us: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AgingConfigInput {
    pub soft_window_us: Option<u64>,
    pub hard_window_us: Option<u64>,
    pub check_period_us: Option<u64>,
    pub flow_die_time_us: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SmoothingConfigInput {
    pub enabled: Option<bool>,
    pub alpha: Option<f64>,
    pub beta: Option<f64>,
    pub relax: Option<f64>,
    pub desired_rtt_us: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AckletConfigInput {
    pub timeout_us: Option<u64>,
    pub black_hole_us: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DreConfigInput {
    pub period_us: Option<u64>,
    pub alpha: Option<f64>,
    pub capacity_bps: Option<f64>,
    pub q_bits: Option<u32>,
    pub multiply: Option<f64>,
}

// ─── Resolved configuration ─────────────────────────────────────────────────

/// Thresholds used by the path classifier.
#[derive(Debug, Clone)]
pub struct ClassifierConfig {
    /// RTT at or below which a path can be Good; also the optimistic default.
    pub rtt_floor: Duration,
    /// RTT at or above which a path is Bad.
    pub rtt_high: Duration,
    /// Score weight per microsecond of RTT.
    pub rtt_weight: f64,
    /// Score weight of the ECN fraction.
    pub ecn_weight: f64,
    /// Minimum sampled bytes before the ECN fraction is trusted.
    pub ecn_sample_min: u64,
    pub ecn_low: f64,
    pub ecn_high: f64,
    /// Bucket width for the RTT-then-* tie-break modes.
    pub quantify_rtt_base: Duration,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            rtt_floor: Duration::from_micros(100),
            rtt_high: Duration::from_micros(400),
            rtt_weight: 1.0,
            ecn_weight: 500.0,
            ecn_sample_min: 14_000,
            ecn_low: 0.1,
            ecn_high: 0.5,
            quantify_rtt_base: Duration::from_micros(10),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RerouteConfig {
    pub enabled: bool,
    /// Bytes a flow must have sent on its current path before it may move (S).
    pub min_bytes_before_reroute: u64,
    pub respond_to_failure: bool,
    pub retrans_high: u32,
    pub retrans_very_high: u32,
    pub timeout_very_high: u32,
    /// RTT improvement a Grey/Bad candidate needs over the current path.
    pub better_path_rtt: Duration,
    /// Percent chance (0..=100) that an eligible reroute attempt proceeds.
    pub path_change_poss: u32,
    pub cooldown: Duration,
    pub flowlet_timeout: Duration,
}

impl Default for RerouteConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_bytes_before_reroute: 64_000,
            respond_to_failure: false,
            retrans_high: 3,
            retrans_very_high: 10,
            timeout_very_high: 2,
            better_path_rtt: Duration::from_micros(100),
            path_change_poss: 50,
            cooldown: Duration::from_micros(50),
            flowlet_timeout: Duration::from_micros(500),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AgingConfig {
    pub soft_window: Duration,
    pub hard_window: Duration,
    pub check_period: Duration,
    pub flow_die_time: Duration,
}

impl Default for AgingConfig {
    fn default() -> Self {
        Self {
            soft_window: Duration::from_millis(1),
            hard_window: Duration::from_millis(10),
            check_period: Duration::from_micros(100),
            flow_die_time: Duration::from_millis(100),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SmoothingConfig {
    pub enabled: bool,
    /// Blend weight for samples below the current estimate.
    pub alpha: f64,
    /// Blend weight for samples above the current estimate.
    pub beta: f64,
    /// Fraction of the gap to `desired_rtt` closed on each RTT-window expiry.
    pub relax: f64,
    pub desired_rtt: Duration,
}

impl Default for SmoothingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            alpha: 0.5,
            beta: 0.1,
            relax: 0.5,
            desired_rtt: ClassifierConfig::default().rtt_floor,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AckletConfig {
    pub timeout: Duration,
    pub black_hole: Duration,
}

impl Default for AckletConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_micros(500),
            black_hole: Duration::from_millis(5),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DreConfig {
    pub period: Duration,
    pub alpha: f64,
    pub capacity_bps: f64,
    pub q_bits: u32,
    pub multiply: f64,
}

impl Default for DreConfig {
    fn default() -> Self {
        Self {
            period: Duration::from_micros(30),
            alpha: 0.2,
            capacity_bps: 10_000_000_000.0,
            q_bits: 3,
            multiply: 5.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TlbConfig {
    pub version: u32,
    pub run_mode: RunMode,
    /// Seed for the engine RNG; `None` draws one at construction.
    pub seed: Option<u64>,
    pub classifier: ClassifierConfig,
    pub reroute: RerouteConfig,
    pub aging: AgingConfig,
    pub smoothing: SmoothingConfig,
    pub acklet: AckletConfig,
    pub dre: DreConfig,
}

impl Default for TlbConfig {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            run_mode: RunMode::default(),
            seed: None,
            classifier: ClassifierConfig::default(),
            reroute: RerouteConfig::default(),
            aging: AgingConfig::default(),
            smoothing: SmoothingConfig::default(),
            acklet: AckletConfig::default(),
            dre: DreConfig::default(),
        }
    }
}

fn micros_or(value: Option<u64>, default: Duration) -> Duration {
    value.map(Duration::from_micros).unwrap_or(default)
}

fn unit_fraction(value: Option<f64>, default: f64, name: &str) -> Result<f64, String> {
    let v = value.unwrap_or(default);
    if !(v.is_finite() && v > 0.0 && v <= 1.0) {
        return Err(format!("{} must be in (0, 1], got {}", name, v));
    }
    Ok(v)
}

impl TlbConfigInput {
    pub fn resolve(self) -> Result<TlbConfig, String> {
        let version = if self.version == 0 {
            CONFIG_VERSION
        } else {
            self.version
        };
        if version != CONFIG_VERSION {
            return Err(format!("Unsupported config version {}", version));
        }

        let cd = ClassifierConfig::default();
        let c = self.classifier;
        let classifier = ClassifierConfig {
            rtt_floor: micros_or(c.rtt_floor_us, cd.rtt_floor),
            rtt_high: micros_or(c.rtt_high_us, cd.rtt_high),
            rtt_weight: c.rtt_weight.unwrap_or(cd.rtt_weight).max(0.0),
            ecn_weight: c.ecn_weight.unwrap_or(cd.ecn_weight).max(0.0),
            ecn_sample_min: c.ecn_sample_min.unwrap_or(cd.ecn_sample_min),
            ecn_low: c.ecn_low.unwrap_or(cd.ecn_low).clamp(0.0, 1.0),
            ecn_high: c.ecn_high.unwrap_or(cd.ecn_high).max(0.0),
            quantify_rtt_base: micros_or(c.quantify_rtt_base_us, cd.quantify_rtt_base)
                .max(Duration::from_nanos(1)),
        };
        if classifier.rtt_high < classifier.rtt_floor {
            return Err(format!(
                "rtt_high ({:?}) must not be below rtt_floor ({:?})",
                classifier.rtt_high, classifier.rtt_floor
            ));
        }

        let rd = RerouteConfig::default();
        let r = self.reroute;
        let reroute = RerouteConfig {
            enabled: r.enabled.unwrap_or(rd.enabled),
            min_bytes_before_reroute: r
                .min_bytes_before_reroute
                .unwrap_or(rd.min_bytes_before_reroute),
            respond_to_failure: r.respond_to_failure.unwrap_or(rd.respond_to_failure),
            retrans_high: r.retrans_high.unwrap_or(rd.retrans_high).max(1),
            retrans_very_high: r.retrans_very_high.unwrap_or(rd.retrans_very_high).max(1),
            timeout_very_high: r.timeout_very_high.unwrap_or(rd.timeout_very_high).max(1),
            better_path_rtt: micros_or(r.better_path_rtt_us, rd.better_path_rtt),
            path_change_poss: r.path_change_poss.unwrap_or(rd.path_change_poss).min(100),
            cooldown: micros_or(r.cooldown_us, rd.cooldown),
            flowlet_timeout: micros_or(r.flowlet_timeout_us, rd.flowlet_timeout),
        };

        let ad = AgingConfig::default();
        let a = self.aging;
        let aging = AgingConfig {
            soft_window: micros_or(a.soft_window_us, ad.soft_window),
            hard_window: micros_or(a.hard_window_us, ad.hard_window),
            check_period: micros_or(a.check_period_us, ad.check_period)
                .max(Duration::from_micros(1)),
            flow_die_time: micros_or(a.flow_die_time_us, ad.flow_die_time),
        };

        let s = self.smoothing;
        let smoothing = SmoothingConfig {
            enabled: s.enabled.unwrap_or(false),
            alpha: unit_fraction(s.alpha, SmoothingConfig::default().alpha, "smoothing.alpha")?,
            beta: unit_fraction(s.beta, SmoothingConfig::default().beta, "smoothing.beta")?,
            relax: unit_fraction(s.relax, SmoothingConfig::default().relax, "smoothing.relax")?,
            desired_rtt: micros_or(s.desired_rtt_us, classifier.rtt_floor),
        };

        let timeout = micros_or(self.acklet.timeout_us, AckletConfig::default().timeout);
        let acklet = AckletConfig {
            timeout,
            black_hole: micros_or(self.acklet.black_hole_us, timeout * 10).max(timeout),
        };

        let dd = DreConfig::default();
        let d = self.dre;
        let dre = DreConfig {
            period: micros_or(d.period_us, dd.period).max(Duration::from_micros(1)),
            alpha: unit_fraction(d.alpha, dd.alpha, "dre.alpha")?,
            capacity_bps: d.capacity_bps.unwrap_or(dd.capacity_bps).max(1.0),
            q_bits: d.q_bits.unwrap_or(dd.q_bits).min(MAX_Q_BITS),
            multiply: d.multiply.unwrap_or(dd.multiply).max(0.0),
        };

        Ok(TlbConfig {
            version,
            run_mode: self.run_mode.unwrap_or_default(),
            seed: self.seed,
            classifier,
            reroute,
            aging,
            smoothing,
            acklet,
            dre,
        })
    }
}

impl TlbConfig {
    pub fn from_toml_str(input: &str) -> Result<Self, String> {
        if input.trim().is_empty() {
            return Ok(TlbConfig::default());
        }
        let parsed: TlbConfigInput =
            toml::from_str(input).map_err(|e| format!("Invalid config TOML: {}", e))?;
        parsed.resolve()
    }
}
