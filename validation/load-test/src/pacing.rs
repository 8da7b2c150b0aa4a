//! Think-time between tasks.

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{SetupError, SetupResult};

/// Uniform random wait in `[min, max]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pacing {
    min: Duration,
    max: Duration,
}

impl Pacing {
    pub fn new(min: Duration, max: Duration) -> SetupResult<Self> {
        if min > max {
            return Err(SetupError::InvalidPacing {
                profile: "custom".to_string(),
                min_ms: min.as_millis() as u64,
                max_ms: max.as_millis() as u64,
            });
        }
        Ok(Self { min, max })
    }

    /// Always wait exactly `wait`.
    pub fn fixed(wait: Duration) -> Self {
        Self {
            min: wait,
            max: wait,
        }
    }

    /// Browsing users: 1-3 seconds of think time.
    pub fn normal() -> Self {
        Self {
            min: Duration::from_secs(1),
            max: Duration::from_secs(3),
        }
    }

    /// Aggressive users: 0.5-1 second.
    pub fn stress() -> Self {
        Self {
            min: Duration::from_millis(500),
            max: Duration::from_secs(1),
        }
    }

    pub fn min(&self) -> Duration {
        self.min
    }

    pub fn max(&self) -> Duration {
        self.max
    }

    /// Draw the next inter-task wait.
    pub fn next_wait<R: Rng + ?Sized>(&self, rng: &mut R) -> Duration {
        if self.min == self.max {
            return self.min;
        }
        let min = self.min.as_micros() as u64;
        let max = self.max.as_micros() as u64;
        Duration::from_micros(rng.gen_range(min..=max))
    }
}

/// Pacing bounds as written in a scenario file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PacingBounds {
    pub min_ms: u64,
    pub max_ms: u64,
}

impl PacingBounds {
    pub fn to_pacing(self, profile: &str) -> SetupResult<Pacing> {
        if self.min_ms > self.max_ms {
            return Err(SetupError::InvalidPacing {
                profile: profile.to_string(),
                min_ms: self.min_ms,
                max_ms: self.max_ms,
            });
        }
        Ok(Pacing {
            min: Duration::from_millis(self.min_ms),
            max: Duration::from_millis(self.max_ms),
        })
    }
}

impl From<Pacing> for PacingBounds {
    fn from(p: Pacing) -> Self {
        Self {
            min_ms: p.min.as_millis() as u64,
            max_ms: p.max.as_millis() as u64,
        }
    }
}
