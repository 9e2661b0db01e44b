use crate::config::SmoothingConfig;

/// Per-path minimum-RTT estimate, in microseconds.
///
/// Without smoothing this is a plain running minimum over the current RTT
/// window. With smoothing it is an asymmetric EWMA: samples below the estimate
/// are blended with `alpha`, samples above it with the smaller `beta`, so a
/// rising RTT is believed more slowly than a falling one.
///
/// NaN or infinite samples are ignored.
#[derive(Debug, Clone, Default)]
pub struct RttEstimate {
    value_us: f64,
    sampled: bool,
}

impl RttEstimate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, sample_us: f64, smoothing: &SmoothingConfig) {
        if sample_us.is_nan() || sample_us.is_infinite() || sample_us < 0.0 {
            return;
        }
        if !self.sampled {
            self.value_us = sample_us;
            self.sampled = true;
            return;
        }
        if !smoothing.enabled {
            self.value_us = self.value_us.min(sample_us);
            return;
        }
        let weight = if sample_us < self.value_us {
            smoothing.alpha
        } else {
            smoothing.beta
        };
        self.value_us = self.value_us * (1.0 - weight) + sample_us * weight;
    }

    /// RTT-window expiry. A running minimum forgets its history; a smoothed
    /// estimate closes `relax` of its gap to the desired RTT.
    pub fn expire(&mut self, smoothing: &SmoothingConfig) {
        if !self.sampled {
            return;
        }
        if smoothing.enabled {
            let desired = smoothing.desired_rtt.as_secs_f64() * 1e6;
            self.value_us = desired + (self.value_us - desired) * (1.0 - smoothing.relax);
        } else {
            self.sampled = false;
            self.value_us = 0.0;
        }
    }

    pub fn is_sampled(&self) -> bool {
        self.sampled
    }

    /// The estimate, or `floor_us` while unsampled.
    pub fn value_or(&self, floor_us: f64) -> f64 {
        if self.sampled {
            self.value_us
        } else {
            floor_us
        }
    }
}
