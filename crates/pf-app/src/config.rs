//! Run configuration: everything tunable about a simulation besides the
//! network itself.

use pf_alarms::AlarmPolicy;
use pf_controls::{ControllersConfig, SensorConfig};
use pf_physics::PhysicsConfig;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};

/// How ticks are paced against the wall clock.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum Pacing {
    /// Run ticks back to back.
    #[default]
    Unpaced,
    /// One tick of `dt` simulated seconds per `dt / speedup` wall seconds.
    RealTime { speedup: f64 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    pub physics: PhysicsConfig,
    pub sensors: SensorConfig,
    pub controllers: ControllersConfig,
    pub alarms: AlarmPolicy,
    pub pacing: Pacing,
    /// Seed of the sensor noise generator.
    pub seed: u64,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            physics: PhysicsConfig::default(),
            sensors: SensorConfig::default(),
            controllers: ControllersConfig::default(),
            alarms: AlarmPolicy::default(),
            pacing: Pacing::default(),
            seed: 42,
        }
    }
}

impl SimConfig {
    pub fn validate(&self) -> AppResult<()> {
        self.physics
            .validate()
            .map_err(|e| AppError::Config(e.to_string()))?;
        if let Pacing::RealTime { speedup } = self.pacing
            && !(speedup.is_finite() && speedup > 0.0)
        {
            return Err(AppError::Config(format!(
                "pacing speedup must be positive, got {speedup}"
            )));
        }
        let noise = self.sensors.noise;
        for (value, what) in [
            (noise.pressure_bar, "pressure"),
            (noise.temperature_c, "temperature"),
            (noise.flow_m3h, "flow"),
        ] {
            if !(value.is_finite() && value >= 0.0) {
                return Err(AppError::Config(format!(
                    "{what} noise must be non-negative, got {value}"
                )));
            }
        }
        Ok(())
    }
}
