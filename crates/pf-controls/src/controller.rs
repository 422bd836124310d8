//! The common controller contract and the tagged enum over the eight kinds.

use std::fmt;

use pf_alarms::AlarmAssertion;
use pf_network::NetworkTopology;
use pf_physics::{Command, CommandSet, NetworkState, PhysicsModel};
use serde::{Deserialize, Serialize};

use crate::command::OperatorCommand;
use crate::controllers::{
    CompressorManagement, EmergencyShutdown, FlowRegulation, LeakDetection, PressureControl,
    SafetyMonitoring, TemperatureControl, ValveControl,
};
use crate::error::ControlResult;
use crate::sensor::SensorFrame;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControllerKind {
    PressureControl,
    FlowRegulation,
    CompressorManagement,
    ValveControl,
    SafetyMonitoring,
    LeakDetection,
    TemperatureControl,
    EmergencyShutdown,
}

impl ControllerKind {
    pub const ALL: [ControllerKind; 8] = [
        ControllerKind::PressureControl,
        ControllerKind::FlowRegulation,
        ControllerKind::CompressorManagement,
        ControllerKind::ValveControl,
        ControllerKind::SafetyMonitoring,
        ControllerKind::LeakDetection,
        ControllerKind::TemperatureControl,
        ControllerKind::EmergencyShutdown,
    ];

    /// Stable controller id used for alarms and status.
    pub fn id(self) -> &'static str {
        match self {
            ControllerKind::PressureControl => "pressure_control",
            ControllerKind::FlowRegulation => "flow_regulation",
            ControllerKind::CompressorManagement => "compressor_management",
            ControllerKind::ValveControl => "valve_control",
            ControllerKind::SafetyMonitoring => "safety_monitoring",
            ControllerKind::LeakDetection => "leak_detection",
            ControllerKind::TemperatureControl => "temperature_control",
            ControllerKind::EmergencyShutdown => "emergency_shutdown",
        }
    }

    /// Write priority on a shared actuator; the greater value wins.
    ///
    /// Tier first (Emergency Shutdown, then Safety Monitoring, then all
    /// others); among the others the earlier kind in `ALL` wins.
    pub fn priority(self) -> (u8, u8) {
        let tier = match self {
            ControllerKind::EmergencyShutdown => 2,
            ControllerKind::SafetyMonitoring => 1,
            _ => 0,
        };
        let rank = Self::ALL.len() as u8 - self as u8;
        (tier, rank)
    }
}

impl fmt::Display for ControllerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

/// Everything a controller may read during a scan.
///
/// All controllers scanned in one tick see the same input; none of them can
/// observe another's output from the same tick.
#[derive(Debug, Clone, Copy)]
pub struct ScanInput<'a> {
    pub t: f64,
    pub model: &'a PhysicsModel,
    pub state: &'a NetworkState,
    pub sensors: &'a SensorFrame,
    /// Merged commands applied during the previous tick.
    pub applied: &'a CommandSet,
    /// Safety interlock asserted at the end of the previous tick.
    pub interlock: bool,
    /// Emergency Shutdown was not Normal at the end of the previous tick.
    pub shutdown_active: bool,
    /// Operator commands addressed to this controller.
    pub operator: &'a [OperatorCommand],
}

impl ScanInput<'_> {
    pub fn topology(&self) -> &NetworkTopology {
        self.model.topology()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScanOutput {
    pub commands: Vec<Command>,
    /// Conditions currently true; the alarm manager clears the rest.
    pub alarms: Vec<AlarmAssertion>,
    pub interlock: bool,
}

/// Tagged union over the eight controller kinds.
#[derive(Debug, Clone)]
pub enum Controller {
    PressureControl(PressureControl),
    FlowRegulation(FlowRegulation),
    CompressorManagement(CompressorManagement),
    ValveControl(ValveControl),
    SafetyMonitoring(SafetyMonitoring),
    LeakDetection(LeakDetection),
    TemperatureControl(TemperatureControl),
    EmergencyShutdown(EmergencyShutdown),
}

impl Controller {
    pub fn kind(&self) -> ControllerKind {
        match self {
            Controller::PressureControl(_) => ControllerKind::PressureControl,
            Controller::FlowRegulation(_) => ControllerKind::FlowRegulation,
            Controller::CompressorManagement(_) => ControllerKind::CompressorManagement,
            Controller::ValveControl(_) => ControllerKind::ValveControl,
            Controller::SafetyMonitoring(_) => ControllerKind::SafetyMonitoring,
            Controller::LeakDetection(_) => ControllerKind::LeakDetection,
            Controller::TemperatureControl(_) => ControllerKind::TemperatureControl,
            Controller::EmergencyShutdown(_) => ControllerKind::EmergencyShutdown,
        }
    }

    /// Run one scan. `elapsed` is the time since the previous scan.
    pub fn step(&mut self, elapsed: f64, input: &ScanInput<'_>) -> ControlResult<ScanOutput> {
        match self {
            Controller::PressureControl(c) => c.step(elapsed, input),
            Controller::FlowRegulation(c) => c.step(elapsed, input),
            Controller::CompressorManagement(c) => c.step(elapsed, input),
            Controller::ValveControl(c) => c.step(elapsed, input),
            Controller::SafetyMonitoring(c) => c.step(elapsed, input),
            Controller::LeakDetection(c) => c.step(elapsed, input),
            Controller::TemperatureControl(c) => c.step(elapsed, input),
            Controller::EmergencyShutdown(c) => c.step(elapsed, input),
        }
    }

    /// Whether the controller needs a scan this tick even if not due.
    pub fn wants_scan(&self, input: &ScanInput<'_>) -> bool {
        match self {
            Controller::EmergencyShutdown(c) => c.wants_scan(input),
            _ => false,
        }
    }

    /// Short machine-state label for status views.
    pub fn state_label(&self) -> String {
        match self {
            Controller::CompressorManagement(c) => c.state_label(),
            Controller::EmergencyShutdown(c) => c.state().to_string(),
            _ => "active".to_string(),
        }
    }

    /// One-line human summary of the controller's memory.
    pub fn memory_summary(&self) -> String {
        match self {
            Controller::PressureControl(c) => c.summary(),
            Controller::FlowRegulation(c) => c.summary(),
            Controller::CompressorManagement(c) => c.summary(),
            Controller::ValveControl(c) => c.summary(),
            Controller::SafetyMonitoring(c) => c.summary(),
            Controller::LeakDetection(c) => c.summary(),
            Controller::TemperatureControl(c) => c.summary(),
            Controller::EmergencyShutdown(c) => c.summary(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_tiers() {
        let esd = ControllerKind::EmergencyShutdown.priority();
        let safety = ControllerKind::SafetyMonitoring.priority();
        for kind in ControllerKind::ALL {
            if kind != ControllerKind::EmergencyShutdown {
                assert!(esd > kind.priority());
            }
            if !matches!(
                kind,
                ControllerKind::EmergencyShutdown | ControllerKind::SafetyMonitoring
            ) {
                assert!(safety > kind.priority());
            }
        }
    }

    #[test]
    fn priorities_are_distinct() {
        let mut p: Vec<_> = ControllerKind::ALL.iter().map(|k| k.priority()).collect();
        p.sort();
        p.dedup();
        assert_eq!(p.len(), 8);
    }

    #[test]
    fn ids_are_snake_case() {
        assert_eq!(ControllerKind::LeakDetection.id(), "leak_detection");
        assert_eq!(ControllerKind::EmergencyShutdown.to_string(), "emergency_shutdown");
    }
}
