//! Controller scheduling, fault isolation and priority merge.

use pf_alarms::{AlarmAssertion, Severity};
use pf_network::NetworkTopology;
use pf_physics::{Command, CommandSet, NetworkState, PhysicsModel};
use tracing::{debug, error, warn};

use crate::command::OperatorCommand;
use crate::config::ControllersConfig;
use crate::controller::{Controller, ControllerKind, ScanInput};
use crate::controllers::{
    CompressorManagement, EmergencyShutdown, EsdState, FlowRegulation, LeakDetection,
    PressureControl, SafetyMonitoring, TemperatureControl, ValveControl,
};
use crate::error::{ControlError, ControlResult};
use crate::scan::ScanClock;

pub const CONTROLLER_FAULT: &str = "CONTROLLER_FAULT";

/// One controller with its clock, held outputs and fault flag.
#[derive(Debug, Clone)]
pub struct ControllerSlot {
    controller: Controller,
    clock: ScanClock,
    held: Vec<Command>,
    interlock: bool,
    faulted: Option<String>,
}

impl ControllerSlot {
    fn new(controller: Controller, interval: f64) -> ControlResult<Self> {
        Ok(Self {
            controller,
            clock: ScanClock::new(interval)?,
            held: Vec::new(),
            interlock: false,
            faulted: None,
        })
    }

    pub fn kind(&self) -> ControllerKind {
        self.controller.kind()
    }

    pub fn controller(&self) -> &Controller {
        &self.controller
    }

    pub fn state_label(&self) -> String {
        if self.faulted.is_some() {
            "fault".to_string()
        } else {
            self.controller.state_label()
        }
    }

    pub fn summary(&self) -> String {
        match &self.faulted {
            Some(reason) => format!("faulted: {reason}"),
            None => self.controller.memory_summary(),
        }
    }

    pub fn last_scan(&self) -> Option<f64> {
        self.clock.last_scan()
    }

    pub fn scan_interval(&self) -> f64 {
        self.clock.interval()
    }

    pub fn held(&self) -> &[Command] {
        &self.held
    }

    pub fn faulted(&self) -> Option<&str> {
        self.faulted.as_deref()
    }

    fn fault(&mut self, t: f64, reason: String) -> AlarmAssertion {
        error!(controller = %self.kind(), t, %reason, "controller fault");
        self.held.clear();
        self.interlock = false;
        let message = format!("{} faulted: {reason}", self.kind());
        self.faulted = Some(reason);
        AlarmAssertion::new(CONTROLLER_FAULT, Severity::Critical, message)
    }
}

/// Per-tick inputs shared by every controller.
#[derive(Debug, Clone, Copy)]
pub struct TickInput<'a> {
    pub t: f64,
    pub model: &'a PhysicsModel,
    pub state: &'a NetworkState,
    pub sensors: &'a crate::sensor::SensorFrame,
    /// Operator commands drained this tick, in arrival order.
    pub operator: &'a [OperatorCommand],
}

/// Alarm conditions asserted by one scanned controller.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanRecord {
    pub kind: ControllerKind,
    pub alarms: Vec<AlarmAssertion>,
}

/// Result of one tick of the runtime.
#[derive(Debug, Clone, PartialEq)]
pub struct TickControl {
    /// Merged commands to apply over the next physics step.
    pub commands: CommandSet,
    /// Controllers scanned this tick.
    pub scans: Vec<ScanRecord>,
    pub interlock: bool,
}

#[derive(Debug, Clone)]
pub struct ControllerRuntime {
    slots: Vec<ControllerSlot>,
    applied: CommandSet,
    interlock: bool,
    shutdown_active: bool,
}

impl ControllerRuntime {
    pub fn new(topology: &NetworkTopology, config: &ControllersConfig) -> ControlResult<Self> {
        let slots = vec![
            ControllerSlot::new(
                Controller::PressureControl(PressureControl::new(topology, &config.pressure)?),
                config.pressure.scan_interval_s,
            )?,
            ControllerSlot::new(
                Controller::FlowRegulation(FlowRegulation::new(topology, &config.flow)?),
                config.flow.scan_interval_s,
            )?,
            ControllerSlot::new(
                Controller::CompressorManagement(CompressorManagement::new(
                    topology,
                    &config.compressor,
                )?),
                config.compressor.scan_interval_s,
            )?,
            ControllerSlot::new(
                Controller::ValveControl(ValveControl::new(topology, &config.valve)?),
                config.valve.scan_interval_s,
            )?,
            ControllerSlot::new(
                Controller::SafetyMonitoring(SafetyMonitoring::new(&config.safety)?),
                config.safety.scan_interval_s,
            )?,
            ControllerSlot::new(
                Controller::LeakDetection(LeakDetection::new(topology, &config.leak)?),
                config.leak.scan_interval_s,
            )?,
            ControllerSlot::new(
                Controller::TemperatureControl(TemperatureControl::new(
                    topology,
                    &config.temperature,
                )?),
                config.temperature.scan_interval_s,
            )?,
            ControllerSlot::new(
                Controller::EmergencyShutdown(EmergencyShutdown::new(&config.esd)),
                config.esd.scan_interval_s,
            )?,
        ];
        Ok(Self {
            slots,
            applied: CommandSet::new(),
            interlock: false,
            shutdown_active: false,
        })
    }

    pub fn slots(&self) -> &[ControllerSlot] {
        &self.slots
    }

    pub fn slot(&self, kind: ControllerKind) -> Option<&ControllerSlot> {
        self.slots.iter().find(|s| s.kind() == kind)
    }

    /// Commands merged during the last tick.
    pub fn applied(&self) -> &CommandSet {
        &self.applied
    }

    pub fn interlock(&self) -> bool {
        self.interlock
    }

    pub fn shutdown_active(&self) -> bool {
        self.shutdown_active
    }

    /// Scan due controllers and merge every held command.
    ///
    /// Each scanned controller sees the previous tick's merged commands and
    /// interlock, never the output of another controller from this tick.
    pub fn tick(&mut self, input: &TickInput<'_>) -> TickControl {
        let t = input.t;
        let mut scans = Vec::new();

        for slot in &mut self.slots {
            let kind = slot.kind();
            let operator: Vec<OperatorCommand> = input
                .operator
                .iter()
                .filter(|c| c.target() == kind)
                .cloned()
                .collect();

            if slot.faulted.is_some() {
                if !operator.is_empty() {
                    warn!(controller = %kind, count = operator.len(), "operator commands dropped for faulted controller");
                }
                continue;
            }

            let scan_input = ScanInput {
                t,
                model: input.model,
                state: input.state,
                sensors: input.sensors,
                applied: &self.applied,
                interlock: self.interlock,
                shutdown_active: self.shutdown_active,
                operator: &operator,
            };
            let due = slot.clock.is_due(t)
                || !operator.is_empty()
                || slot.controller.wants_scan(&scan_input);
            if !due {
                continue;
            }

            let elapsed = slot.clock.mark_scanned(t);
            let alarms = match slot.controller.step(elapsed, &scan_input) {
                Ok(out) => match out.commands.iter().find(|c| !c.is_finite()) {
                    Some(bad) => vec![slot.fault(
                        t,
                        ControlError::NonFinite {
                            what: format!("{:?} command", bad.actuator()),
                            value: bad.value(),
                        }
                        .to_string(),
                    )],
                    None => {
                        slot.held = out.commands;
                        slot.interlock = out.interlock;
                        out.alarms
                    }
                },
                Err(e) => vec![slot.fault(t, e.to_string())],
            };
            debug!(controller = %kind, t, held = slot.held.len(), "scanned");
            scans.push(ScanRecord { kind, alarms });
        }

        let commands = merge(&self.slots);
        self.interlock = self.slots.iter().any(|s| s.interlock);
        self.shutdown_active = self.slots.iter().any(|s| match &s.controller {
            Controller::EmergencyShutdown(esd) => esd.state() != EsdState::Normal,
            _ => false,
        });
        self.applied = commands.clone();

        TickControl {
            commands,
            scans,
            interlock: self.interlock,
        }
    }
}

/// Keep the highest-priority writer per actuator.
fn merge(slots: &[ControllerSlot]) -> CommandSet {
    let mut ordered: Vec<&ControllerSlot> = slots.iter().collect();
    ordered.sort_by_key(|s| s.kind().priority());
    let mut set = CommandSet::new();
    for slot in ordered {
        for command in &slot.held {
            set.set(*command);
        }
    }
    set
}
