use std::time::{SystemTime, UNIX_EPOCH};

/// Point in time as seconds since the unix epoch (UTC).
#[derive(Copy, Clone, Debug, PartialEq, PartialOrd)]
pub struct Time(pub f64);

impl Time {
    pub fn now() -> Self {
        let seconds = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0);
        Time(seconds)
    }

    pub fn seconds(self) -> f64 {
        self.0
    }

    pub fn plus_seconds(self, seconds: f64) -> Self {
        Time(self.0 + seconds)
    }

    pub fn minus_seconds(self, seconds: f64) -> Self {
        Time(self.0 - seconds)
    }

    /// Linear interpolation between `self` and `other`; `fraction` is clamped to `[0, 1]`.
    pub fn lerp(self, other: Time, fraction: f64) -> Self {
        let f = fraction.clamp(0.0, 1.0);
        Time(self.0 + (other.0 - self.0) * f)
    }
}
