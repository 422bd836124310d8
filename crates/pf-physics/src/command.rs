//! Actuator commands applied to the physical network.

use std::collections::BTreeMap;

use pf_core::{NodeId, PipeId};
use serde::{Deserialize, Serialize};

/// Operating mode of a compressor unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum CompressorMode {
    #[default]
    Idle,
    Starting,
    Running,
    Stopping,
    Fault,
}

impl CompressorMode {
    /// Whether the drive is energised (speed target of 1).
    pub fn is_driven(self) -> bool {
        matches!(self, CompressorMode::Starting | CompressorMode::Running)
    }
}

/// A physical actuator a controller can write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ActuatorId {
    PipeValve(PipeId),
    SinkValve(NodeId),
    SourcePressure(NodeId),
    Compressor(NodeId),
    HeatExchange(NodeId),
}

/// A single actuator command.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Command {
    /// Pipe valve position in [0, 1].
    PipeValve { pipe: PipeId, position: f64 },
    /// Sink delivery valve position in [0, 1].
    SinkValve { sink: NodeId, position: f64 },
    /// Regulator pressure for a source (Pa).
    SourcePressure { source: NodeId, pressure_pa: f64 },
    /// Compressor mode and boost ratio.
    Compressor {
        unit: NodeId,
        mode: CompressorMode,
        ratio: f64,
    },
    /// Heat-exchange duty in [-1, 1] (negative cools).
    HeatExchange { node: NodeId, duty: f64 },
}

impl Command {
    pub fn actuator(&self) -> ActuatorId {
        match *self {
            Command::PipeValve { pipe, .. } => ActuatorId::PipeValve(pipe),
            Command::SinkValve { sink, .. } => ActuatorId::SinkValve(sink),
            Command::SourcePressure { source, .. } => ActuatorId::SourcePressure(source),
            Command::Compressor { unit, .. } => ActuatorId::Compressor(unit),
            Command::HeatExchange { node, .. } => ActuatorId::HeatExchange(node),
        }
    }

    /// Numeric payload of the command.
    pub fn value(&self) -> f64 {
        match *self {
            Command::PipeValve { position, .. } | Command::SinkValve { position, .. } => position,
            Command::SourcePressure { pressure_pa, .. } => pressure_pa,
            Command::Compressor { ratio, .. } => ratio,
            Command::HeatExchange { duty, .. } => duty,
        }
    }

    pub fn is_finite(&self) -> bool {
        self.value().is_finite()
    }
}

/// The set of commands applied during one tick, at most one per actuator.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommandSet {
    commands: BTreeMap<ActuatorId, Command>,
}

impl CommandSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the command for its actuator.
    pub fn set(&mut self, command: Command) {
        self.commands.insert(command.actuator(), command);
    }

    pub fn get(&self, actuator: ActuatorId) -> Option<&Command> {
        self.commands.get(&actuator)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Command> + '_ {
        self.commands.values()
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn pipe_valve(&self, pipe: PipeId) -> Option<f64> {
        match self.get(ActuatorId::PipeValve(pipe)) {
            Some(Command::PipeValve { position, .. }) => Some(*position),
            _ => None,
        }
    }

    pub fn sink_valve(&self, sink: NodeId) -> Option<f64> {
        match self.get(ActuatorId::SinkValve(sink)) {
            Some(Command::SinkValve { position, .. }) => Some(*position),
            _ => None,
        }
    }

    pub fn source_pressure(&self, source: NodeId) -> Option<f64> {
        match self.get(ActuatorId::SourcePressure(source)) {
            Some(Command::SourcePressure { pressure_pa, .. }) => Some(*pressure_pa),
            _ => None,
        }
    }

    pub fn compressor(&self, unit: NodeId) -> Option<(CompressorMode, f64)> {
        match self.get(ActuatorId::Compressor(unit)) {
            Some(Command::Compressor { mode, ratio, .. }) => Some((*mode, *ratio)),
            _ => None,
        }
    }

    pub fn heat_exchange(&self, node: NodeId) -> Option<f64> {
        match self.get(ActuatorId::HeatExchange(node)) {
            Some(Command::HeatExchange { duty, .. }) => Some(*duty),
            _ => None,
        }
    }
}

impl FromIterator<Command> for CommandSet {
    fn from_iter<T: IntoIterator<Item = Command>>(iter: T) -> Self {
        let mut set = CommandSet::new();
        for command in iter {
            set.set(command);
        }
        set
    }
}
