use crate::PfError;

/// Floating point type used throughout the system.
pub type Real = f64;

pub fn ensure_finite(v: Real, what: &'static str) -> Result<Real, PfError> {
    if v.is_finite() {
        Ok(v)
    } else {
        Err(PfError::NonFinite { what, value: v })
    }
}

/// Require a strictly positive, finite value.
pub fn ensure_positive(v: Real, what: &'static str) -> Result<Real, PfError> {
    let v = ensure_finite(v, what)?;
    if v > 0.0 {
        Ok(v)
    } else {
        Err(PfError::NotPositive { what, value: v })
    }
}

/// Move `current` toward `target` by at most `max_step` (max_step >= 0).
pub fn step_toward(current: Real, target: Real, max_step: Real) -> Real {
    let delta = (target - current).clamp(-max_step, max_step);
    current + delta
}
