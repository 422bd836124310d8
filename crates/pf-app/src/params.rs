//! Run parameters and tick arithmetic.

use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};

pub const DURATION_RANGE_S: (f64, f64) = (1.0, 3600.0);
pub const DT_RANGE_S: (f64, f64) = (0.1, 60.0);

/// Slack so that e.g. 60 / 0.1 counts 600 ticks, not 601.
const TICK_EPS: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RunParams {
    pub duration_s: f64,
    pub dt_s: f64,
}

impl RunParams {
    pub fn new(duration_s: f64, dt_s: f64) -> AppResult<Self> {
        let params = Self { duration_s, dt_s };
        params.validate()?;
        Ok(params)
    }

    pub fn validate(&self) -> AppResult<()> {
        let within = |v: f64, (lo, hi): (f64, f64)| v.is_finite() && v >= lo && v <= hi;
        if !within(self.duration_s, DURATION_RANGE_S) {
            return Err(AppError::InvalidParameters(format!(
                "duration {} s outside [{}, {}]",
                self.duration_s, DURATION_RANGE_S.0, DURATION_RANGE_S.1
            )));
        }
        if !within(self.dt_s, DT_RANGE_S) {
            return Err(AppError::InvalidParameters(format!(
                "dt {} s outside [{}, {}]",
                self.dt_s, DT_RANGE_S.0, DT_RANGE_S.1
            )));
        }
        Ok(())
    }

    /// `ceil(duration / dt)`.
    pub fn total_ticks(&self) -> u64 {
        (self.duration_s / self.dt_s - TICK_EPS).ceil().max(1.0) as u64
    }

    pub fn sim_time(&self, tick: u64) -> f64 {
        tick as f64 * self.dt_s
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn tick_counts() {
        assert_eq!(RunParams::new(60.0, 1.0).unwrap().total_ticks(), 60);
        assert_eq!(RunParams::new(60.0, 0.1).unwrap().total_ticks(), 600);
        assert_eq!(RunParams::new(10.0, 3.0).unwrap().total_ticks(), 4);
        assert_eq!(RunParams::new(1.0, 60.0).unwrap().total_ticks(), 1);
        assert_eq!(RunParams::new(3600.0, 0.1).unwrap().total_ticks(), 36_000);
    }

    #[test]
    fn bounds_are_inclusive() {
        assert!(RunParams::new(1.0, 0.1).is_ok());
        assert!(RunParams::new(3600.0, 60.0).is_ok());
        for (d, dt) in [
            (0.5, 1.0),
            (3600.5, 1.0),
            (60.0, 0.05),
            (60.0, 61.0),
            (f64::NAN, 1.0),
            (60.0, f64::INFINITY),
        ] {
            assert!(
                matches!(RunParams::new(d, dt), Err(AppError::InvalidParameters(_))),
                "accepted duration={d} dt={dt}"
            );
        }
    }

    proptest! {
        #[test]
        fn last_tick_is_before_duration(d in 1.0f64..3600.0, dt in 0.1f64..60.0) {
            let p = RunParams::new(d, dt).unwrap();
            let n = p.total_ticks();
            prop_assert!(n >= 1);
            prop_assert!(p.sim_time(n - 1) < d + 1e-6);
            prop_assert!(p.sim_time(n) >= d - 1e-6);
        }
    }
}
