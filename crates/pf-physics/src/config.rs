//! Physics model coefficients.

use pf_core::units::constants::P_STD_PA;
use serde::{Deserialize, Serialize};

use crate::error::{PhysicsError, PhysicsResult};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhysicsConfig {
    /// Pipe conductance coefficient: `C = coeff · d⁴ / L` in (m³/s)/Pa.
    pub conductance_coeff: f64,
    /// Compressibility constant (Pa): node capacitance is `volume / compressibility`.
    pub compressibility_pa: f64,
    /// First-order relaxation time of pipe flow toward its target (s).
    pub flow_tau_s: f64,
    /// Largest flow change per second of simulated time (m³/s²).
    pub flow_rate_limit: f64,
    /// Upper bound on an internal sub-step (s).
    pub max_substep_s: f64,
    /// Relaxation time of a source toward its regulator pressure (s).
    pub source_tau_s: f64,
    /// Sink draw is fully available at or above this pressure (bar).
    pub min_delivery_pressure_bar: f64,
    pub ambient_temperature_c: f64,
    /// Fractional temperature loss toward ambient per second.
    pub thermal_loss_per_s: f64,
    /// Compression heating (K/s) per unit of `boost_ratio - 1` at full speed.
    pub compression_heating_k_per_s: f64,
    /// Heating (K/s) at a unit heat-exchange duty.
    pub heat_exchange_k_per_s: f64,
    /// Spin-up/spin-down time constant of compressor speed (s).
    pub compressor_spin_tau_s: f64,
}

impl Default for PhysicsConfig {
    fn default() -> Self {
        Self {
            conductance_coeff: 1.0,
            compressibility_pa: P_STD_PA,
            flow_tau_s: 2.0,
            flow_rate_limit: 1.0,
            max_substep_s: 1.0,
            source_tau_s: 5.0,
            min_delivery_pressure_bar: 5.0,
            ambient_temperature_c: 15.0,
            thermal_loss_per_s: 0.01,
            compression_heating_k_per_s: 0.5,
            heat_exchange_k_per_s: 0.2,
            compressor_spin_tau_s: 3.0,
        }
    }
}

impl PhysicsConfig {
    pub fn validate(&self) -> PhysicsResult<()> {
        let positive = [
            (self.conductance_coeff, "conductance_coeff must be positive"),
            (self.compressibility_pa, "compressibility_pa must be positive"),
            (self.flow_tau_s, "flow_tau_s must be positive"),
            (self.flow_rate_limit, "flow_rate_limit must be positive"),
            (self.max_substep_s, "max_substep_s must be positive"),
            (self.source_tau_s, "source_tau_s must be positive"),
            (
                self.min_delivery_pressure_bar,
                "min_delivery_pressure_bar must be positive",
            ),
            (self.compressor_spin_tau_s, "compressor_spin_tau_s must be positive"),
        ];
        for (value, what) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(PhysicsError::InvalidConfig { what });
            }
        }
        let non_negative = [
            (self.thermal_loss_per_s, "thermal_loss_per_s must be non-negative"),
            (
                self.compression_heating_k_per_s,
                "compression_heating_k_per_s must be non-negative",
            ),
            (
                self.heat_exchange_k_per_s,
                "heat_exchange_k_per_s must be non-negative",
            ),
        ];
        for (value, what) in non_negative {
            if !(value.is_finite() && value >= 0.0) {
                return Err(PhysicsError::InvalidConfig { what });
            }
        }
        if !self.ambient_temperature_c.is_finite() {
            return Err(PhysicsError::InvalidConfig {
                what: "ambient_temperature_c must be finite",
            });
        }
        Ok(())
    }
}
