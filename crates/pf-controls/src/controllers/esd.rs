//! Emergency Shutdown: Normal -> Tripped -> Latched -> Normal.
//!
//! Trips on the safety interlock or an operator command. While Tripped or
//! Latched every pipe and sink valve is commanded closed and every
//! compressor to Stopping. Tripped becomes Latched once the plant is at
//! rest; only a Reset while Latched returns to Normal.

use std::fmt;

use pf_alarms::{AlarmAssertion, Severity};
use pf_network::{NetworkTopology, NodeRole};
use pf_physics::{Command, CompressorMode};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::command::OperatorCommand;
use crate::controller::{ScanInput, ScanOutput};
use crate::error::ControlResult;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmergencyShutdownConfig {
    pub scan_interval_s: f64,
    /// Compressor speed fraction below which a unit counts as stopped.
    pub rest_speed: f64,
    /// Valve position below which a valve counts as closed.
    pub closed_position: f64,
}

impl Default for EmergencyShutdownConfig {
    fn default() -> Self {
        Self {
            scan_interval_s: 1.0,
            rest_speed: 0.05,
            closed_position: 1e-3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EsdState {
    Normal,
    Tripped,
    Latched,
}

impl fmt::Display for EsdState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            EsdState::Normal => "normal",
            EsdState::Tripped => "tripped",
            EsdState::Latched => "latched",
        })
    }
}

#[derive(Debug, Clone)]
pub struct EmergencyShutdown {
    config: EmergencyShutdownConfig,
    state: EsdState,
    tripped_at: Option<f64>,
    cause: Option<String>,
}

impl EmergencyShutdown {
    pub fn new(config: &EmergencyShutdownConfig) -> Self {
        Self {
            config: config.clone(),
            state: EsdState::Normal,
            tripped_at: None,
            cause: None,
        }
    }

    pub fn state(&self) -> EsdState {
        self.state
    }

    pub fn wants_scan(&self, input: &ScanInput<'_>) -> bool {
        self.state == EsdState::Normal && input.interlock
    }

    fn trip(&mut self, t: f64, cause: &str) {
        warn!(t, cause, "emergency shutdown tripped");
        self.state = EsdState::Tripped;
        self.tripped_at = Some(t);
        self.cause = Some(cause.to_string());
    }

    fn at_rest(&self, input: &ScanInput<'_>) -> bool {
        let topology = input.topology();
        let state = input.state;
        let compressors_stopped = topology.compressors().all(|c| {
            state
                .nodes
                .get(c.id.slot())
                .is_none_or(|n| n.speed < self.config.rest_speed)
        });
        let pipes_closed = state
            .pipes
            .iter()
            .all(|p| p.valve_position <= self.config.closed_position);
        let sinks_closed = topology.sinks().all(|s| {
            state
                .nodes
                .get(s.id.slot())
                .is_none_or(|n| n.valve_position <= self.config.closed_position)
        });
        compressors_stopped && pipes_closed && sinks_closed
    }

    pub fn step(&mut self, _elapsed: f64, input: &ScanInput<'_>) -> ControlResult<ScanOutput> {
        let t = input.t;
        for cmd in input.operator {
            match (cmd, self.state) {
                (OperatorCommand::EmergencyShutdown, EsdState::Normal) => self.trip(t, "operator"),
                (OperatorCommand::Reset, EsdState::Latched) => {
                    info!(t, "emergency shutdown reset");
                    self.state = EsdState::Normal;
                    self.tripped_at = None;
                    self.cause = None;
                }
                (OperatorCommand::Reset, EsdState::Tripped) => {
                    debug!(t, "reset ignored while tripped");
                }
                _ => {}
            }
        }

        match self.state {
            EsdState::Normal if input.interlock => self.trip(t, "safety interlock"),
            EsdState::Tripped if self.at_rest(input) => {
                info!(t, "emergency shutdown latched");
                self.state = EsdState::Latched;
            }
            _ => {}
        }

        let mut out = ScanOutput::default();
        if self.state != EsdState::Normal {
            out.commands = shutdown_commands(input.topology());
            out.alarms.push(AlarmAssertion::new(
                "EMERGENCY_SHUTDOWN",
                Severity::Critical,
                format!(
                    "emergency shutdown {} ({})",
                    self.state,
                    self.cause.as_deref().unwrap_or("unknown")
                ),
            ));
        }
        Ok(out)
    }

    pub fn summary(&self) -> String {
        match (self.tripped_at, &self.cause) {
            (Some(at), Some(cause)) => format!("{} since t={at} by {cause}", self.state),
            _ => self.state.to_string(),
        }
    }
}

/// Close every valve and stop every compressor.
fn shutdown_commands(topology: &NetworkTopology) -> Vec<Command> {
    let mut commands: Vec<Command> = topology
        .pipes()
        .iter()
        .map(|p| Command::PipeValve {
            pipe: p.id,
            position: 0.0,
        })
        .collect();
    for node in topology.nodes() {
        match node.role {
            NodeRole::Sink { .. } => commands.push(Command::SinkValve {
                sink: node.id,
                position: 0.0,
            }),
            NodeRole::Compressor { boost_ratio } => commands.push(Command::Compressor {
                unit: node.id,
                mode: CompressorMode::Stopping,
                ratio: boost_ratio,
            }),
            _ => {}
        }
    }
    commands
}
