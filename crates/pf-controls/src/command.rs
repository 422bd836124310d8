//! Operator commands delivered to controllers between ticks.

use pf_network::NetworkTopology;
use serde::{Deserialize, Serialize};

use crate::controller::ControllerKind;
use crate::error::{ControlError, ControlResult};

/// A command issued by an operator. Entities are referenced by name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OperatorCommand {
    /// Trip Emergency Shutdown.
    EmergencyShutdown,
    /// Reset a latched Emergency Shutdown back to Normal.
    Reset,
    /// Set the target position of a pipe valve.
    SetValve { pipe: String, position: f64 },
    /// Clear a compressor Fault.
    ResetCompressor { unit: String },
    /// Change a regulated source pressure setpoint.
    SetPressureSetpoint { source: String, pressure_bar: f64 },
    /// Change a temperature-control target.
    SetTemperatureTarget { node: String, target_c: f64 },
}

impl OperatorCommand {
    /// Controller that consumes this command.
    pub fn target(&self) -> ControllerKind {
        match self {
            OperatorCommand::EmergencyShutdown | OperatorCommand::Reset => {
                ControllerKind::EmergencyShutdown
            }
            OperatorCommand::SetValve { .. } => ControllerKind::ValveControl,
            OperatorCommand::ResetCompressor { .. } => ControllerKind::CompressorManagement,
            OperatorCommand::SetPressureSetpoint { .. } => ControllerKind::PressureControl,
            OperatorCommand::SetTemperatureTarget { .. } => ControllerKind::TemperatureControl,
        }
    }

    /// Check names and values against the topology before delivery.
    pub fn validate(&self, topology: &NetworkTopology) -> ControlResult<()> {
        let finite = |value: f64, what: &str| {
            if value.is_finite() {
                Ok(())
            } else {
                Err(ControlError::NonFinite {
                    what: what.to_string(),
                    value,
                })
            }
        };
        match self {
            OperatorCommand::EmergencyShutdown | OperatorCommand::Reset => Ok(()),
            OperatorCommand::SetValve { pipe, position } => {
                resolve_pipe(topology, pipe)?;
                finite(*position, "valve position")?;
                if !(0.0..=1.0).contains(position) {
                    return Err(ControlError::InvalidConfig {
                        what: format!("valve position {position} outside [0, 1]"),
                    });
                }
                Ok(())
            }
            OperatorCommand::ResetCompressor { unit } => {
                let node = resolve_node(topology, unit)?;
                if topology.compressors().any(|c| c.id == node) {
                    Ok(())
                } else {
                    Err(ControlError::UnknownEntity {
                        kind: "compressor",
                        name: unit.clone(),
                    })
                }
            }
            OperatorCommand::SetPressureSetpoint {
                source,
                pressure_bar,
            } => {
                let node = resolve_node(topology, source)?;
                if !topology.sources().any(|s| s.id == node) {
                    return Err(ControlError::UnknownEntity {
                        kind: "source",
                        name: source.clone(),
                    });
                }
                finite(*pressure_bar, "pressure setpoint")
            }
            OperatorCommand::SetTemperatureTarget { node, target_c } => {
                resolve_node(topology, node)?;
                finite(*target_c, "temperature target")
            }
        }
    }
}

pub(crate) fn resolve_node(
    topology: &NetworkTopology,
    name: &str,
) -> ControlResult<pf_core::NodeId> {
    topology
        .node_by_name(name)
        .map(|n| n.id)
        .ok_or_else(|| ControlError::UnknownEntity {
            kind: "node",
            name: name.to_string(),
        })
}

pub(crate) fn resolve_pipe(
    topology: &NetworkTopology,
    name: &str,
) -> ControlResult<pf_core::PipeId> {
    topology
        .pipe_by_name(name)
        .map(|p| p.id)
        .ok_or_else(|| ControlError::UnknownEntity {
            kind: "pipe",
            name: name.to_string(),
        })
}
