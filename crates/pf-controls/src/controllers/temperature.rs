//! Temperature Control: bang-bang outside the band, PI trim inside it.

use pf_alarms::{AlarmAssertion, Severity};
use pf_core::NodeId;
use pf_network::NetworkTopology;
use pf_physics::Command;
use serde::{Deserialize, Serialize};

use crate::command::{OperatorCommand, resolve_node};
use crate::config::PidGains;
use crate::controller::{ScanInput, ScanOutput};
use crate::error::{ControlError, ControlResult};
use crate::pid::{PIDController, PIDControllerState};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TemperatureControlConfig {
    pub scan_interval_s: f64,
    /// Controlled nodes by name; empty controls every compressor.
    pub nodes: Vec<String>,
    pub target_c: f64,
    /// Half-width of the band in which the PI trim is active.
    pub band_c: f64,
    /// Distance beyond the band at which `TEMPERATURE_EXCURSION` is asserted.
    pub excursion_margin_c: f64,
    /// Gains in duty per °C of error.
    pub gains: PidGains,
}

impl Default for TemperatureControlConfig {
    fn default() -> Self {
        Self {
            scan_interval_s: 5.0,
            nodes: Vec::new(),
            target_c: 15.0,
            band_c: 10.0,
            excursion_margin_c: 5.0,
            gains: PidGains {
                kp: 0.1,
                ti_s: 120.0,
                td_s: 0.0,
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
enum Regime {
    Trim,
    Heating,
    Cooling,
}

#[derive(Debug, Clone)]
struct ThermalLoop {
    node: NodeId,
    name: String,
    target_c: f64,
    pid: PIDControllerState,
    regime: Regime,
    duty: f64,
}

#[derive(Debug, Clone)]
pub struct TemperatureControl {
    pid: PIDController,
    band_c: f64,
    margin_c: f64,
    default_target_c: f64,
    loops: Vec<ThermalLoop>,
}

impl TemperatureControl {
    pub fn new(
        topology: &NetworkTopology,
        config: &TemperatureControlConfig,
    ) -> ControlResult<Self> {
        if !(config.band_c.is_finite() && config.band_c > 0.0) || config.excursion_margin_c < 0.0 {
            return Err(ControlError::InvalidConfig {
                what: "band_c must be positive and excursion_margin_c non-negative".into(),
            });
        }
        let pid = PIDController::new(config.gains, -1.0, 1.0)?;
        let nodes: Vec<(NodeId, String)> = if config.nodes.is_empty() {
            topology
                .compressors()
                .map(|n| (n.id, n.name.clone()))
                .collect()
        } else {
            config
                .nodes
                .iter()
                .map(|name| resolve_node(topology, name).map(|id| (id, name.clone())))
                .collect::<ControlResult<_>>()?
        };
        let mut tc = Self {
            pid,
            band_c: config.band_c,
            margin_c: config.excursion_margin_c,
            default_target_c: config.target_c,
            loops: Vec::new(),
        };
        for (id, name) in nodes {
            tc.add_loop(id, name, config.target_c);
        }
        Ok(tc)
    }

    fn add_loop(&mut self, node: NodeId, name: String, target_c: f64) {
        self.loops.push(ThermalLoop {
            node,
            name,
            target_c,
            pid: PIDControllerState::default(),
            regime: Regime::Trim,
            duty: 0.0,
        });
    }

    pub fn duty(&self, node: NodeId) -> Option<f64> {
        self.loops.iter().find(|l| l.node == node).map(|l| l.duty)
    }

    pub fn step(&mut self, elapsed: f64, input: &ScanInput<'_>) -> ControlResult<ScanOutput> {
        for cmd in input.operator {
            if let OperatorCommand::SetTemperatureTarget { node, target_c } = cmd {
                let id = resolve_node(input.topology(), node)?;
                match self.loops.iter().position(|l| l.node == id) {
                    Some(i) => self.loops[i].target_c = *target_c,
                    None => self.add_loop(id, node.clone(), *target_c),
                }
            }
        }

        let mut out = ScanOutput::default();
        for l in &mut self.loops {
            if let Some(temp) = input.sensors.node_temperature_c(l.node) {
                let low = l.target_c - self.band_c;
                let high = l.target_c + self.band_c;
                if temp > high {
                    l.regime = Regime::Cooling;
                    l.duty = -1.0;
                    l.pid.reset();
                } else if temp < low {
                    l.regime = Regime::Heating;
                    l.duty = 1.0;
                    l.pid.reset();
                } else {
                    l.regime = Regime::Trim;
                    let (pid, duty) = self.pid.update(&l.pid, temp, l.target_c, 0.0, elapsed);
                    l.pid = pid;
                    l.duty = duty;
                }

                if temp > high + self.margin_c || temp < low - self.margin_c {
                    out.alarms.push(AlarmAssertion::new(
                        format!("TEMPERATURE_EXCURSION:{}", l.name),
                        Severity::Medium,
                        format!(
                            "{} at {temp:.1} degC outside {low:.1}..{high:.1} degC",
                            l.name
                        ),
                    ));
                }
            }
            out.commands.push(Command::HeatExchange {
                node: l.node,
                duty: l.duty,
            });
        }
        Ok(out)
    }

    pub fn summary(&self) -> String {
        if self.loops.is_empty() {
            return format!("no controlled nodes (target {:.1} degC)", self.default_target_c);
        }
        self.loops
            .iter()
            .map(|l| format!("{} {:?} duty={:.2}", l.name, l.regime, l.duty))
            .collect::<Vec<_>>()
            .join("; ")
    }
}
