//! Signed microsecond timestamps used for all positions and durations.

use std::fmt::{Display, Formatter};
use std::ops::{Add, AddAssign, Neg, Sub, SubAssign};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// A media timestamp or duration in microseconds.
///
/// Positions may go negative transiently (a clock position minus a stream
/// offset), so the backing value is signed. [`MediaTime::MIN`] doubles as
/// the "never" sentinel for write tags and last-render times.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct MediaTime(i64);

impl MediaTime {
    pub const ZERO: MediaTime = MediaTime(0);
    pub const MIN: MediaTime = MediaTime(i64::MIN);
    pub const MAX: MediaTime = MediaTime(i64::MAX);

    pub const fn from_micros(micros: i64) -> Self {
        Self(micros)
    }

    pub const fn from_millis(millis: i64) -> Self {
        Self(millis * 1_000)
    }

    pub const fn from_secs(secs: i64) -> Self {
        Self(secs * 1_000_000)
    }

    pub fn from_secs_f64(secs: f64) -> Self {
        Self((secs * 1_000_000.0) as i64)
    }

    pub fn from_duration(duration: Duration) -> Self {
        Self(duration.as_micros().min(i64::MAX as u128) as i64)
    }

    pub const fn as_micros(self) -> i64 {
        self.0
    }

    pub const fn as_millis(self) -> i64 {
        self.0 / 1_000
    }

    pub fn as_secs_f64(self) -> f64 {
        self.0 as f64 / 1_000_000.0
    }

    /// Convert to a `Duration`, clamping negative values to zero.
    pub fn to_duration(self) -> Duration {
        Duration::from_micros(self.0.max(0) as u64)
    }

    pub const fn is_negative(self) -> bool {
        self.0 < 0
    }

    /// Scale by a clock speed ratio.
    pub fn scaled_by(self, ratio: f64) -> Self {
        Self((self.0 as f64 * ratio) as i64)
    }

    pub fn clamp(self, low: MediaTime, high: MediaTime) -> Self {
        Self(self.0.clamp(low.0, high.0))
    }
}

impl Add for MediaTime {
    type Output = MediaTime;

    fn add(self, rhs: MediaTime) -> MediaTime {
        MediaTime(self.0.saturating_add(rhs.0))
    }
}

impl AddAssign for MediaTime {
    fn add_assign(&mut self, rhs: MediaTime) {
        *self = *self + rhs;
    }
}

impl Sub for MediaTime {
    type Output = MediaTime;

    fn sub(self, rhs: MediaTime) -> MediaTime {
        MediaTime(self.0.saturating_sub(rhs.0))
    }
}

impl SubAssign for MediaTime {
    fn sub_assign(&mut self, rhs: MediaTime) {
        *self = *self - rhs;
    }
}

impl Neg for MediaTime {
    type Output = MediaTime;

    fn neg(self) -> MediaTime {
        MediaTime(self.0.saturating_neg())
    }
}

impl Display for MediaTime {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.3}s", self.as_secs_f64())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arithmetic_saturates_at_sentinels() {
        assert_eq!(MediaTime::MIN + MediaTime::from_micros(-1), MediaTime::MIN);
        assert_eq!(MediaTime::MAX + MediaTime::from_micros(1), MediaTime::MAX);
    }

    #[test]
    fn converts_between_units() {
        let t = MediaTime::from_millis(1_500);
        assert_eq!(t.as_micros(), 1_500_000);
        assert_eq!(t.as_secs_f64(), 1.5);
        assert_eq!(t.to_duration(), Duration::from_millis(1_500));
        assert_eq!(MediaTime::from_micros(-5).to_duration(), Duration::ZERO);
    }

    #[test]
    fn scales_by_speed_ratio() {
        let t = MediaTime::from_millis(100);
        assert_eq!(t.scaled_by(2.0), MediaTime::from_millis(200));
        assert_eq!(t.scaled_by(0.5), MediaTime::from_millis(50));
    }
}
