//! Compressor Management: per-unit sequencing state machine.
//!
//! ```text
//! Idle -> Starting -> Running -> Stopping -> Idle
//!            |
//!            +-- start timeout (xN) --> Fault --(operator reset)--> Idle
//! ```

use pf_alarms::{AlarmAssertion, Severity};
use pf_core::NodeId;
use pf_core::units::m3ps_to_m3ph;
use pf_network::{NetworkTopology, NodeRole};
use pf_physics::{Command, CompressorMode};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::command::{OperatorCommand, resolve_node};
use crate::controller::{ScanInput, ScanOutput};
use crate::error::{ControlError, ControlResult};

/// Speed fraction at which a start counts as successful.
const RUNNING_SPEED: f64 = 0.95;
/// Speed fraction below which a stopping unit is considered at rest.
const STOPPED_SPEED: f64 = 0.05;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompressorManagementConfig {
    pub scan_interval_s: f64,
    /// Deliverable flow of one running unit (m³/h).
    pub unit_capacity_m3h: f64,
    pub min_run_time_s: f64,
    /// Minimum rest between stopping and the next start.
    pub cooldown_s: f64,
    pub start_timeout_s: f64,
    pub max_start_failures: u32,
    /// Request one extra unit while the lowest sink pressure is below this.
    pub low_pressure_bar: f64,
    /// Release the extra unit once the lowest sink pressure exceeds this.
    pub high_pressure_bar: f64,
}

impl Default for CompressorManagementConfig {
    fn default() -> Self {
        Self {
            scan_interval_s: 2.0,
            unit_capacity_m3h: 500.0,
            min_run_time_s: 120.0,
            cooldown_s: 60.0,
            start_timeout_s: 30.0,
            max_start_failures: 3,
            low_pressure_bar: 30.0,
            high_pressure_bar: 50.0,
        }
    }
}

/// Externally visible status of one unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitStatus {
    pub name: String,
    pub mode: CompressorMode,
    pub failures: u32,
    pub last_start_at: Option<f64>,
}

#[derive(Debug, Clone)]
struct Unit {
    node: NodeId,
    name: String,
    ratio: f64,
    mode: CompressorMode,
    entered_at: f64,
    last_start_at: Option<f64>,
    stopped_at: Option<f64>,
    failures: u32,
}

impl Unit {
    fn enter(&mut self, mode: CompressorMode, t: f64) {
        info!(unit = %self.name, from = ?self.mode, to = ?mode, t, "compressor transition");
        self.mode = mode;
        self.entered_at = t;
    }

    fn may_start(&self, t: f64, cooldown: f64) -> bool {
        let rested = self.stopped_at.is_none_or(|s| t - s >= cooldown);
        let spaced = self.last_start_at.is_none_or(|s| t - s >= cooldown);
        rested && spaced
    }
}

#[derive(Debug, Clone)]
pub struct CompressorManagement {
    config: CompressorManagementConfig,
    units: Vec<Unit>,
    extra_unit: bool,
    needed: usize,
}

impl CompressorManagement {
    pub fn new(
        topology: &NetworkTopology,
        config: &CompressorManagementConfig,
    ) -> ControlResult<Self> {
        let positive = [
            (config.unit_capacity_m3h, "unit_capacity_m3h"),
            (config.start_timeout_s, "start_timeout_s"),
        ];
        for (value, what) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(ControlError::InvalidConfig {
                    what: format!("{what} must be positive"),
                });
            }
        }
        if config.min_run_time_s < 0.0 || config.cooldown_s < 0.0 {
            return Err(ControlError::InvalidConfig {
                what: "min_run_time_s and cooldown_s must be non-negative".into(),
            });
        }
        if config.low_pressure_bar > config.high_pressure_bar {
            return Err(ControlError::InvalidConfig {
                what: "low_pressure_bar must not exceed high_pressure_bar".into(),
            });
        }

        let units = topology
            .compressors()
            .filter_map(|node| match node.role {
                NodeRole::Compressor { boost_ratio } => Some(Unit {
                    node: node.id,
                    name: node.name.clone(),
                    ratio: boost_ratio,
                    mode: CompressorMode::Idle,
                    entered_at: 0.0,
                    last_start_at: None,
                    stopped_at: None,
                    failures: 0,
                }),
                _ => None,
            })
            .collect();
        Ok(Self {
            config: config.clone(),
            units,
            extra_unit: false,
            needed: 0,
        })
    }

    pub fn units(&self) -> Vec<UnitStatus> {
        self.units
            .iter()
            .map(|u| UnitStatus {
                name: u.name.clone(),
                mode: u.mode,
                failures: u.failures,
                last_start_at: u.last_start_at,
            })
            .collect()
    }

    pub fn mode(&self, unit: NodeId) -> Option<CompressorMode> {
        self.units.iter().find(|u| u.node == unit).map(|u| u.mode)
    }

    fn units_needed(&mut self, input: &ScanInput<'_>) -> usize {
        let demand_m3h = m3ps_to_m3ph(input.state.total_demand_m3ps());
        let base = (demand_m3h / self.config.unit_capacity_m3h).ceil().max(0.0) as usize;

        let lowest = input
            .topology()
            .sinks()
            .filter_map(|s| input.sensors.node_pressure_bar(s.id))
            .fold(f64::INFINITY, f64::min);
        if lowest < self.config.low_pressure_bar {
            self.extra_unit = true;
        } else if lowest > self.config.high_pressure_bar {
            self.extra_unit = false;
        }

        let available = self
            .units
            .iter()
            .filter(|u| u.mode != CompressorMode::Fault)
            .count();
        (base + usize::from(self.extra_unit)).min(available)
    }

    pub fn step(&mut self, _elapsed: f64, input: &ScanInput<'_>) -> ControlResult<ScanOutput> {
        let t = input.t;
        for cmd in input.operator {
            if let OperatorCommand::ResetCompressor { unit } = cmd {
                let id = resolve_node(input.topology(), unit)?;
                if let Some(u) = self
                    .units
                    .iter_mut()
                    .find(|u| u.node == id && u.mode == CompressorMode::Fault)
                {
                    u.enter(CompressorMode::Idle, t);
                    u.failures = 0;
                    u.stopped_at = Some(t);
                }
            }
        }

        self.needed = self.units_needed(input);
        let starts_allowed = !input.interlock && !input.shutdown_active;
        let cfg = &self.config;

        let mut out = ScanOutput::default();
        let mut remaining = self.needed;
        for u in &mut self.units {
            let wanted = u.mode != CompressorMode::Fault && remaining > 0;
            if wanted {
                remaining -= 1;
            }
            let speed = input.state.nodes.get(u.node.slot()).map_or(0.0, |n| n.speed);

            // A higher-priority writer forced this unit to stop.
            let overridden = matches!(
                input.applied.compressor(u.node),
                Some((CompressorMode::Stopping, _))
            );
            if overridden && matches!(u.mode, CompressorMode::Starting | CompressorMode::Running) {
                u.enter(CompressorMode::Stopping, t);
            }

            match u.mode {
                CompressorMode::Idle => {
                    if wanted && starts_allowed && u.may_start(t, cfg.cooldown_s) {
                        u.enter(CompressorMode::Starting, t);
                        u.last_start_at = Some(t);
                    }
                }
                CompressorMode::Starting => {
                    if speed >= RUNNING_SPEED {
                        u.enter(CompressorMode::Running, t);
                        u.failures = 0;
                    } else if !wanted || !starts_allowed {
                        u.enter(CompressorMode::Stopping, t);
                    } else if t - u.entered_at >= cfg.start_timeout_s {
                        u.failures += 1;
                        if u.failures >= cfg.max_start_failures {
                            warn!(unit = %u.name, failures = u.failures, "compressor start failed, faulting");
                            u.enter(CompressorMode::Fault, t);
                        } else {
                            warn!(unit = %u.name, failures = u.failures, "compressor start timed out");
                            u.enter(CompressorMode::Stopping, t);
                        }
                    }
                }
                CompressorMode::Running => {
                    if !wanted && t - u.entered_at >= cfg.min_run_time_s {
                        u.enter(CompressorMode::Stopping, t);
                    }
                }
                CompressorMode::Stopping => {
                    if speed < STOPPED_SPEED {
                        u.enter(CompressorMode::Idle, t);
                        u.stopped_at = Some(t);
                    }
                }
                CompressorMode::Fault => {}
            }

            if u.mode == CompressorMode::Fault {
                out.alarms.push(AlarmAssertion::new(
                    format!("COMPRESSOR_FAULT:{}", u.name),
                    Severity::High,
                    format!("compressor {} failed to start {} times", u.name, u.failures),
                ));
            }
            out.commands.push(Command::Compressor {
                unit: u.node,
                mode: u.mode,
                ratio: u.ratio,
            });
        }
        Ok(out)
    }

    pub fn state_label(&self) -> String {
        let running = self
            .units
            .iter()
            .filter(|u| u.mode == CompressorMode::Running)
            .count();
        format!("{running}/{} running", self.units.len())
    }

    pub fn summary(&self) -> String {
        let units = self
            .units
            .iter()
            .map(|u| format!("{}={:?}", u.name, u.mode))
            .collect::<Vec<_>>()
            .join(",");
        format!("needed={} extra={} [{units}]", self.needed, self.extra_unit)
    }
}
