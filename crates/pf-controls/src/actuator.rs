//! Rate-limited position tracking for valve actuators.

use pf_core::{ensure_positive, step_toward};
use serde::{Deserialize, Serialize};

use crate::error::ControlResult;

/// Bounded-rate motion of a position in `[0, 1]`.
///
/// Each update moves `actual` toward `target` by at most `rate * elapsed`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RateLimit {
    /// Maximum change per second (1/s).
    pub rate: f64,
}

impl RateLimit {
    pub fn new(rate: f64) -> ControlResult<Self> {
        let rate = ensure_positive(rate, "valve rate")?;
        Ok(Self { rate })
    }

    pub fn step(&self, actual: f64, target: f64, elapsed: f64) -> f64 {
        let target = target.clamp(0.0, 1.0);
        step_toward(actual.clamp(0.0, 1.0), target, self.rate * elapsed.max(0.0))
    }
}
