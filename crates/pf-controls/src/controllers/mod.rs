//! The eight controller kinds.

mod compressor;
mod esd;
mod flow;
mod leak;
mod pressure;
mod safety;
mod temperature;
mod valve;

pub use compressor::{CompressorManagement, CompressorManagementConfig, UnitStatus};
pub use esd::{EmergencyShutdown, EmergencyShutdownConfig, EsdState};
pub use flow::{FlowRegulation, FlowRegulationConfig};
pub use leak::{LeakDetection, LeakDetectionConfig};
pub use pressure::{PressureControl, PressureControlConfig, RegulatedSource};
pub use safety::{SafetyMonitoring, SafetyMonitoringConfig};
pub use temperature::{TemperatureControl, TemperatureControlConfig};
pub use valve::{ValveControl, ValveControlConfig};
