/// Largest accepted Q; `2^Q` must fit a `u32` bucket index.
pub const MAX_Q_BITS: u32 = 16;

/// Decaying rate estimator.
///
/// Each path carries a raw byte counter. Sends add to it, and every DRE
/// period it is multiplied by `1 - alpha`. In steady state at rate `R`
/// bytes/s the counter settles at `R * period / alpha`, so dividing by the
/// capacity over the same horizon gives a utilization estimate which is then
/// quantized into `2^Q` coarse buckets for tie-breaking.
#[derive(Debug, Clone, Copy)]
pub struct Dre {
    alpha: f64,
    capacity_bps: f64,
    period_s: f64,
    q_bits: u32,
}

impl Dre {
    pub fn new(config: &crate::config::DreConfig) -> Self {
        Self {
            alpha: config.alpha,
            capacity_bps: config.capacity_bps,
            period_s: config.period.as_secs_f64(),
            q_bits: config.q_bits.min(MAX_Q_BITS),
        }
    }

    pub fn record_send(&self, raw: &mut f64, bytes: u64) {
        *raw += bytes as f64;
    }

    pub fn decay(&self, raw: &mut f64) {
        *raw *= 1.0 - self.alpha;
    }

    /// Number of quantization buckets (`2^Q`).
    pub fn buckets(&self) -> u32 {
        1u32 << self.q_bits
    }

    /// Maps a raw counter to its bucket. Not clamped: an over-subscribed path
    /// reports more than `2^Q`.
    pub fn quantize(&self, raw: f64) -> u32 {
        let horizon_bits = self.capacity_bps * self.period_s / self.alpha;
        if horizon_bits <= 0.0 || raw <= 0.0 {
            return 0;
        }
        let scaled = raw * 8.0 / horizon_bits * self.buckets() as f64;
        scaled.floor().min(u32::MAX as f64) as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DreConfig;
    use std::time::Duration;

    fn dre() -> Dre {
        // horizon = 1e9 bps * 100us / 0.5 = 200_000 bits = 25_000 bytes
        Dre::new(&DreConfig {
            period: Duration::from_micros(100),
            alpha: 0.5,
            capacity_bps: 1_000_000_000.0,
            q_bits: 3,
            multiply: 5.0,
        })
    }

    #[test]
    fn quantize_scales_to_buckets() {
        let d = dre();
        assert_eq!(d.buckets(), 8);
        assert_eq!(d.quantize(0.0), 0);
        // half the horizon -> bucket 4
        assert_eq!(d.quantize(12_500.0), 4);
        // just below one bucket floors to zero
        assert_eq!(d.quantize(3_124.0), 0);
        // over capacity is not clamped
        assert_eq!(d.quantize(50_000.0), 16);
    }

    #[test]
    fn decay_is_geometric() {
        let d = dre();
        let mut raw = 0.0;
        d.record_send(&mut raw, 1_000);
        d.decay(&mut raw);
        assert!((raw - 500.0).abs() < f64::EPSILON);
        d.decay(&mut raw);
        assert!((raw - 250.0).abs() < f64::EPSILON);
    }

    #[test]
    fn steady_state_matches_utilization() {
        let d = dre();
        // 50% of 1 Gbps for one period = 6_250 bytes per period
        let mut raw = 0.0;
        for _ in 0..200 {
            d.record_send(&mut raw, 6_250);
            d.decay(&mut raw);
        }
        // settles at 6_250 * (1 - a) / a = 6_250 after decay, which is the
        // 25% bucket; the pre-decay value is 12_500, the 50% bucket
        assert!((raw - 6_250.0).abs() < 1.0);
        assert_eq!(d.quantize(12_500.0), 4);
        assert!(d.quantize(raw) <= 2);
    }

    #[test]
    fn oversized_q_bits_are_clamped() {
        let d = Dre::new(&DreConfig {
            q_bits: 40,
            ..DreConfig::default()
        });
        assert_eq!(d.buckets(), 1 << MAX_Q_BITS);
        assert_eq!(d.quantize(0.0), 0);
    }
}
