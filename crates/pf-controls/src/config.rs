//! Controller configuration.
//!
//! Every field has a default so a scenario only states what it changes.

use serde::{Deserialize, Serialize};

use crate::controllers::{
    CompressorManagementConfig, EmergencyShutdownConfig, FlowRegulationConfig,
    LeakDetectionConfig, PressureControlConfig, SafetyMonitoringConfig,
    TemperatureControlConfig, ValveControlConfig,
};

/// PID tuning: gain, integral time and derivative time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PidGains {
    pub kp: f64,
    pub ti_s: f64,
    #[serde(default)]
    pub td_s: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllersConfig {
    pub pressure: PressureControlConfig,
    pub flow: FlowRegulationConfig,
    pub compressor: CompressorManagementConfig,
    pub valve: ValveControlConfig,
    pub safety: SafetyMonitoringConfig,
    pub leak: LeakDetectionConfig,
    pub temperature: TemperatureControlConfig,
    pub esd: EmergencyShutdownConfig,
}
