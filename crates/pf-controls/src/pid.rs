//! PID controller with output bias and anti-windup.
//!
//! Output is `bias + P + I + D`, clamped to `[out_min, out_max]`. While the
//! output is saturated the integral is not accumulated.

use serde::{Deserialize, Serialize};

use crate::config::PidGains;
use crate::error::{ControlError, ControlResult};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PIDController {
    pub kp: f64,
    /// Integral time constant (seconds).
    pub ti: f64,
    /// Derivative time constant (seconds).
    pub td: f64,
    /// Derivative filter time constant (seconds).
    pub td_filter: f64,
    pub out_min: f64,
    pub out_max: f64,
}

impl PIDController {
    pub fn new(gains: PidGains, out_min: f64, out_max: f64) -> ControlResult<Self> {
        let PidGains { kp, ti_s, td_s } = gains;
        if !kp.is_finite() || kp < 0.0 {
            return Err(ControlError::InvalidArg {
                what: "kp must be finite and non-negative",
            });
        }
        if !(ti_s.is_finite() && ti_s > 0.0) {
            return Err(ControlError::InvalidArg {
                what: "ti must be positive",
            });
        }
        if !td_s.is_finite() || td_s < 0.0 {
            return Err(ControlError::InvalidArg {
                what: "td must be non-negative",
            });
        }
        if !(out_min < out_max) {
            return Err(ControlError::InvalidArg {
                what: "out_min must be less than out_max",
            });
        }
        Ok(Self {
            kp,
            ti: ti_s,
            td: td_s,
            td_filter: (0.1 * td_s).max(1e-3),
            out_min,
            out_max,
        })
    }

    /// One sampled update. `dt` is the time since the previous scan.
    pub fn update(
        &self,
        state: &PIDControllerState,
        pv: f64,
        sp: f64,
        bias: f64,
        dt: f64,
    ) -> (PIDControllerState, f64) {
        let error = sp - pv;
        let p_term = self.kp * error;

        let ki = self.kp / self.ti;
        let new_integral = state.integral + error * dt;
        let i_term = ki * new_integral;

        let (filtered_error, d_term) = if self.td > 0.0 && dt > 0.0 {
            let alpha = self.td_filter / (self.td_filter + dt);
            let filtered = alpha * state.filtered_error + (1.0 - alpha) * error;
            let d = self.kp * self.td * (filtered - state.filtered_error) / dt;
            (filtered, d)
        } else {
            (error, 0.0)
        };

        let output_raw = bias + p_term + i_term + d_term;
        let output = output_raw.clamp(self.out_min, self.out_max);

        // Anti-windup: hold the integral while saturated.
        let integral = if output == output_raw {
            new_integral
        } else {
            state.integral
        };

        (
            PIDControllerState {
                integral,
                filtered_error,
            },
            output,
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PIDControllerState {
    pub integral: f64,
    pub filtered_error: f64,
}

impl PIDControllerState {
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn gains(kp: f64, ti_s: f64) -> PidGains {
        PidGains { kp, ti_s, td_s: 0.0 }
    }

    #[test]
    fn zero_error_returns_bias() {
        let pid = PIDController::new(gains(1.0, 10.0), 0.0, 150.0).unwrap();
        let (state, out) = pid.update(&PIDControllerState::default(), 70.0, 70.0, 70.0, 1.0);
        assert_eq!(out, 70.0);
        assert_eq!(state.integral, 0.0);
    }

    #[test]
    fn integral_accumulates_on_persistent_error() {
        let pid = PIDController::new(gains(0.1, 5.0), -10.0, 10.0).unwrap();
        let mut state = PIDControllerState::default();
        for _ in 0..10 {
            state = pid.update(&state, 0.0, 1.0, 0.0, 1.0).0;
        }
        assert!((state.integral - 10.0).abs() < 1e-12);
    }

    #[test]
    fn saturation_holds_integral() {
        let pid = PIDController::new(gains(10.0, 1.0), 0.0, 1.0).unwrap();
        let start = PIDControllerState {
            integral: 0.2,
            filtered_error: 0.0,
        };
        let (state, out) = pid.update(&start, 0.0, 5.0, 0.5, 1.0);
        assert_eq!(out, 1.0);
        assert_eq!(state.integral, 0.2);
    }

    #[test]
    fn derivative_opposes_rising_pv() {
        let g = PidGains {
            kp: 1.0,
            ti_s: 1.0e6,
            td_s: 2.0,
        };
        let pid = PIDController::new(g, -100.0, 100.0).unwrap();
        let state = PIDControllerState::default();
        let (_, steady) = pid.update(&state, 0.0, 0.0, 0.0, 1.0);
        let (_, rising) = pid.update(&state, 1.0, 0.0, 0.0, 1.0);
        assert_eq!(steady, 0.0);
        assert!(rising < -1.0);
    }

    #[test]
    fn invalid_params() {
        assert!(PIDController::new(gains(1.0, 0.0), 0.0, 1.0).is_err());
        assert!(PIDController::new(gains(-1.0, 1.0), 0.0, 1.0).is_err());
        assert!(PIDController::new(gains(1.0, 1.0), 1.0, 1.0).is_err());
        let g = PidGains {
            kp: 1.0,
            ti_s: 1.0,
            td_s: -1.0,
        };
        assert!(PIDController::new(g, 0.0, 1.0).is_err());
    }

    proptest! {
        #[test]
        fn output_stays_within_limits(
            pv in -1.0e3..1.0e3f64,
            sp in -1.0e3..1.0e3f64,
            bias in -10.0..10.0f64,
            integral in -1.0e3..1.0e3f64,
            dt in 0.1..60.0f64,
        ) {
            let pid = PIDController::new(PidGains { kp: 0.3, ti_s: 20.0, td_s: 1.0 }, -5.0, 5.0).unwrap();
            let state = PIDControllerState { integral, filtered_error: 0.0 };
            let (_, out) = pid.update(&state, pv, sp, bias, dt);
            prop_assert!((-5.0..=5.0).contains(&out));
        }
    }
}
