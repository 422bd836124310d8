//! Pressure Control: PID on regulated source pressures.

use pf_alarms::{AlarmAssertion, Severity};
use pf_core::NodeId;
use pf_core::units::{bar_to_pa, pa_to_bar};
use pf_network::{NetworkTopology, NodeRole};
use pf_physics::Command;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::command::{OperatorCommand, resolve_node};
use crate::config::PidGains;
use crate::controller::{ScanInput, ScanOutput};
use crate::error::{ControlError, ControlResult};
use crate::pid::{PIDController, PIDControllerState};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegulatedSource {
    pub source: String,
    pub setpoint_bar: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PressureControlConfig {
    pub scan_interval_s: f64,
    pub gains: PidGains,
    pub min_pressure_bar: f64,
    pub max_pressure_bar: f64,
    pub high_pressure_bar: f64,
    /// Regulated sources; empty regulates every source at its supply pressure.
    pub sources: Vec<RegulatedSource>,
}

impl Default for PressureControlConfig {
    fn default() -> Self {
        Self {
            scan_interval_s: 2.0,
            gains: PidGains {
                kp: 0.5,
                ti_s: 30.0,
                td_s: 0.0,
            },
            min_pressure_bar: 1.0,
            max_pressure_bar: 150.0,
            high_pressure_bar: 110.0,
            sources: Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
struct SourceLoop {
    node: NodeId,
    name: String,
    setpoint_bar: f64,
    pid: PIDControllerState,
    command_bar: f64,
}

#[derive(Debug, Clone)]
pub struct PressureControl {
    pid: PIDController,
    high_pressure_bar: f64,
    loops: Vec<SourceLoop>,
}

impl PressureControl {
    pub fn new(topology: &NetworkTopology, config: &PressureControlConfig) -> ControlResult<Self> {
        let pid = PIDController::new(
            config.gains,
            config.min_pressure_bar,
            config.max_pressure_bar,
        )?;

        let loops = if config.sources.is_empty() {
            topology
                .sources()
                .filter_map(|node| match node.role {
                    NodeRole::Source { supply_pressure_pa } => {
                        Some((node.id, node.name.clone(), pa_to_bar(supply_pressure_pa)))
                    }
                    _ => None,
                })
                .collect::<Vec<_>>()
        } else {
            config
                .sources
                .iter()
                .map(|r| {
                    let id = resolve_node(topology, &r.source)?;
                    if !topology.sources().any(|s| s.id == id) {
                        return Err(ControlError::UnknownEntity {
                            kind: "source",
                            name: r.source.clone(),
                        });
                    }
                    Ok((id, r.source.clone(), r.setpoint_bar))
                })
                .collect::<ControlResult<Vec<_>>>()?
        };

        Ok(Self {
            pid,
            high_pressure_bar: config.high_pressure_bar,
            loops: loops
                .into_iter()
                .map(|(node, name, setpoint_bar)| SourceLoop {
                    node,
                    name,
                    setpoint_bar,
                    pid: PIDControllerState::default(),
                    command_bar: setpoint_bar,
                })
                .collect(),
        })
    }

    pub fn setpoint_bar(&self, source: NodeId) -> Option<f64> {
        self.loops
            .iter()
            .find(|l| l.node == source)
            .map(|l| l.setpoint_bar)
    }

    pub fn step(&mut self, elapsed: f64, input: &ScanInput<'_>) -> ControlResult<ScanOutput> {
        for cmd in input.operator {
            if let OperatorCommand::SetPressureSetpoint {
                source,
                pressure_bar,
            } = cmd
            {
                let id = resolve_node(input.topology(), source)?;
                if let Some(l) = self.loops.iter_mut().find(|l| l.node == id) {
                    info!(source = %l.name, from = l.setpoint_bar, to = pressure_bar, "pressure setpoint changed");
                    l.setpoint_bar = *pressure_bar;
                }
            }
        }

        let mut out = ScanOutput::default();
        for l in &mut self.loops {
            if let Some(pv) = input.sensors.node_pressure_bar(l.node) {
                let (pid, command) =
                    self.pid
                        .update(&l.pid, pv, l.setpoint_bar, l.setpoint_bar, elapsed);
                l.pid = pid;
                l.command_bar = command;
                if pv > self.high_pressure_bar {
                    out.alarms.push(AlarmAssertion::new(
                        format!("HIGH_PRESSURE:{}", l.name),
                        Severity::High,
                        format!(
                            "source {} at {pv:.2} bar above {:.2} bar",
                            l.name, self.high_pressure_bar
                        ),
                    ));
                }
            }
            out.commands.push(Command::SourcePressure {
                source: l.node,
                pressure_pa: bar_to_pa(l.command_bar),
            });
        }
        Ok(out)
    }

    pub fn summary(&self) -> String {
        self.loops
            .iter()
            .map(|l| format!("{} sp={:.2} out={:.2} bar", l.name, l.setpoint_bar, l.command_bar))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controllers::testkit::{Fixture, station_line};

    #[test]
    fn holds_setpoint_at_steady_pressure() {
        let fx = Fixture::new(station_line());
        let mut pc = PressureControl::new(fx.model.topology(), &PressureControlConfig::default())
            .unwrap();
        let out = pc.step(2.0, &fx.input(0.0, &[])).unwrap();
        let s = fx.node("S");
        assert_eq!(
            out.commands,
            vec![Command::SourcePressure {
                source: s,
                pressure_pa: bar_to_pa(60.0)
            }]
        );
        assert!(out.alarms.is_empty());
    }

    #[test]
    fn raises_output_when_pressure_sags() {
        let mut fx = Fixture::new(station_line());
        let s = fx.node("S");
        fx.state.nodes[s.slot()].pressure_pa = bar_to_pa(55.0);
        fx.resample(0.0);
        let mut pc = PressureControl::new(fx.model.topology(), &PressureControlConfig::default())
            .unwrap();
        let out = pc.step(2.0, &fx.input(0.0, &[])).unwrap();
        match out.commands[0] {
            Command::SourcePressure { pressure_pa, .. } => assert!(pa_to_bar(pressure_pa) > 60.0),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn operator_setpoint_and_high_alarm() {
        let mut fx = Fixture::new(station_line());
        let s = fx.node("S");
        fx.state.nodes[s.slot()].pressure_pa = bar_to_pa(115.0);
        fx.resample(0.0);
        let mut pc = PressureControl::new(fx.model.topology(), &PressureControlConfig::default())
            .unwrap();
        let cmd = [OperatorCommand::SetPressureSetpoint {
            source: "S".into(),
            pressure_bar: 70.0,
        }];
        let out = pc.step(2.0, &fx.input(0.0, &cmd)).unwrap();
        assert_eq!(pc.setpoint_bar(s), Some(70.0));
        assert_eq!(out.alarms.len(), 1);
        assert_eq!(out.alarms[0].code, "HIGH_PRESSURE:S");
    }

    #[test]
    fn rejects_non_source_regulation() {
        let topology = station_line();
        let config = PressureControlConfig {
            sources: vec![RegulatedSource {
                source: "J".into(),
                setpoint_bar: 50.0,
            }],
            ..PressureControlConfig::default()
        };
        assert!(matches!(
            PressureControl::new(&topology, &config),
            Err(ControlError::UnknownEntity { kind: "source", .. })
        ));
    }
}
