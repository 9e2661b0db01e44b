use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, AddAssign};
use std::time::Duration;

/// Simulated instant, in nanoseconds since the start of the event clock.
///
/// The engine never reads a wall clock. Every operation is handed the current
/// `SimTime` by its caller, and the aging tasks fire at scheduled `SimTime`s.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct SimTime(u64);

impl SimTime {
    pub const ZERO: SimTime = SimTime(0);

    pub const fn from_nanos(nanos: u64) -> Self {
        SimTime(nanos)
    }

    pub const fn from_micros(micros: u64) -> Self {
        SimTime(micros * 1_000)
    }

    pub const fn from_millis(millis: u64) -> Self {
        SimTime(millis * 1_000_000)
    }

    pub fn from_duration(d: Duration) -> Self {
        SimTime(d.as_nanos().min(u64::MAX as u128) as u64)
    }

    pub const fn as_nanos(self) -> u64 {
        self.0
    }

    pub fn as_duration(self) -> Duration {
        Duration::from_nanos(self.0)
    }

    /// Time elapsed since `earlier`, zero if `earlier` is in the future.
    pub fn saturating_since(self, earlier: SimTime) -> Duration {
        Duration::from_nanos(self.0.saturating_sub(earlier.0))
    }
}

impl Add<Duration> for SimTime {
    type Output = SimTime;

    fn add(self, rhs: Duration) -> SimTime {
        let nanos = rhs.as_nanos().min(u64::MAX as u128) as u64;
        SimTime(self.0.saturating_add(nanos))
    }
}

impl AddAssign<Duration> for SimTime {
    fn add_assign(&mut self, rhs: Duration) {
        *self = *self + rhs;
    }
}

impl fmt::Display for SimTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.3}us", self.0 as f64 / 1_000.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn saturating_since_never_underflows() {
        let a = SimTime::from_micros(10);
        let b = SimTime::from_micros(25);
        assert_eq!(b.saturating_since(a), Duration::from_micros(15));
        assert_eq!(a.saturating_since(b), Duration::ZERO);
    }

    #[test]
    fn add_duration() {
        let mut t = SimTime::from_millis(1);
        t += Duration::from_micros(500);
        assert_eq!(t, SimTime::from_micros(1_500));
        assert_eq!(t.as_duration(), Duration::from_micros(1_500));
    }
}
