//! Flow Regulation: PID on sink delivery, driving the sink valve.

use pf_alarms::{AlarmAssertion, Severity};
use pf_core::NodeId;
use pf_core::units::m3ps_to_m3ph;
use pf_network::{NetworkTopology, NodeRole};
use pf_physics::Command;
use serde::{Deserialize, Serialize};

use crate::config::PidGains;
use crate::controller::{ScanInput, ScanOutput};
use crate::error::ControlResult;
use crate::pid::{PIDController, PIDControllerState};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlowRegulationConfig {
    pub scan_interval_s: f64,
    /// Gains in valve fraction per m³/h of error.
    pub gains: PidGains,
    pub deviation_tolerance_m3h: f64,
    /// Consecutive scans beyond tolerance before `FLOW_DEVIATION` is asserted.
    pub deviation_scans: u32,
}

impl Default for FlowRegulationConfig {
    fn default() -> Self {
        Self {
            scan_interval_s: 2.0,
            gains: PidGains {
                kp: 0.005,
                ti_s: 20.0,
                td_s: 0.0,
            },
            deviation_tolerance_m3h: 10.0,
            deviation_scans: 3,
        }
    }
}

#[derive(Debug, Clone)]
struct SinkLoop {
    node: NodeId,
    name: String,
    max_draw_m3h: f64,
    pid: PIDControllerState,
    valve: f64,
    deviation_count: u32,
}

#[derive(Debug, Clone)]
pub struct FlowRegulation {
    pid: PIDController,
    tolerance_m3h: f64,
    deviation_scans: u32,
    loops: Vec<SinkLoop>,
}

impl FlowRegulation {
    pub fn new(topology: &NetworkTopology, config: &FlowRegulationConfig) -> ControlResult<Self> {
        let pid = PIDController::new(config.gains, 0.0, 1.0)?;
        let loops = topology
            .sinks()
            .filter_map(|node| match node.role {
                NodeRole::Sink {
                    demand_m3ps,
                    max_draw_m3ps,
                } => Some(SinkLoop {
                    node: node.id,
                    name: node.name.clone(),
                    max_draw_m3h: m3ps_to_m3ph(max_draw_m3ps),
                    pid: PIDControllerState::default(),
                    valve: (demand_m3ps / max_draw_m3ps).clamp(0.0, 1.0),
                    deviation_count: 0,
                }),
                _ => None,
            })
            .collect();
        Ok(Self {
            pid,
            tolerance_m3h: config.deviation_tolerance_m3h,
            deviation_scans: config.deviation_scans.max(1),
            loops,
        })
    }

    pub fn valve(&self, sink: NodeId) -> Option<f64> {
        self.loops.iter().find(|l| l.node == sink).map(|l| l.valve)
    }

    pub fn step(&mut self, elapsed: f64, input: &ScanInput<'_>) -> ControlResult<ScanOutput> {
        let mut out = ScanOutput::default();
        for l in &mut self.loops {
            let demand_m3h = input
                .state
                .nodes
                .get(l.node.slot())
                .map_or(0.0, |n| m3ps_to_m3ph(n.demand_m3ps));
            if let Some(pv) = input.sensors.node_flow_m3h(l.node) {
                let bias = (demand_m3h / l.max_draw_m3h).clamp(0.0, 1.0);
                let (pid, valve) = self.pid.update(&l.pid, pv, demand_m3h, bias, elapsed);
                l.pid = pid;
                l.valve = valve;

                let deviation = (demand_m3h - pv).abs();
                if deviation > self.tolerance_m3h {
                    l.deviation_count += 1;
                } else {
                    l.deviation_count = 0;
                }
                if l.deviation_count >= self.deviation_scans {
                    out.alarms.push(AlarmAssertion::new(
                        format!("FLOW_DEVIATION:{}", l.name),
                        Severity::Medium,
                        format!(
                            "sink {} delivering {pv:.1} m3/h against demand {demand_m3h:.1} m3/h",
                            l.name
                        ),
                    ));
                }
            }
            out.commands.push(Command::SinkValve {
                sink: l.node,
                position: l.valve,
            });
        }
        Ok(out)
    }

    pub fn summary(&self) -> String {
        self.loops
            .iter()
            .map(|l| format!("{} valve={:.3}", l.name, l.valve))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controllers::testkit::{Fixture, station_line};

    #[test]
    fn steady_delivery_keeps_bias_valve() {
        let mut fx = Fixture::new(station_line());
        let d = fx.node("D");
        fx.state.nodes[d.slot()].draw_m3ps = 50.0 / 3600.0;
        fx.resample(0.0);
        let mut fr = FlowRegulation::new(fx.model.topology(), &FlowRegulationConfig::default())
            .unwrap();
        let out = fr.step(2.0, &fx.input(0.0, &[])).unwrap();
        match out.commands[0] {
            Command::SinkValve { sink, position } => {
                assert_eq!(sink, d);
                assert!((position - 0.5).abs() < 1e-9);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(out.alarms.is_empty());
    }

    #[test]
    fn demand_step_opens_valve() {
        let mut fx = Fixture::new(station_line());
        let d = fx.node("D");
        fx.state.nodes[d.slot()].draw_m3ps = 50.0 / 3600.0;
        fx.state.nodes[d.slot()].demand_m3ps = 80.0 / 3600.0;
        fx.resample(0.0);
        let mut fr = FlowRegulation::new(fx.model.topology(), &FlowRegulationConfig::default())
            .unwrap();
        fr.step(2.0, &fx.input(0.0, &[])).unwrap();
        assert!(fr.valve(d).unwrap() > 0.8);
    }

    #[test]
    fn persistent_shortfall_asserts_deviation() {
        let mut fx = Fixture::new(station_line());
        let d = fx.node("D");
        fx.state.nodes[d.slot()].draw_m3ps = 0.0;
        fx.resample(0.0);
        let config = FlowRegulationConfig {
            deviation_scans: 2,
            ..FlowRegulationConfig::default()
        };
        let mut fr = FlowRegulation::new(fx.model.topology(), &config).unwrap();
        assert!(fr.step(2.0, &fx.input(0.0, &[])).unwrap().alarms.is_empty());
        let out = fr.step(2.0, &fx.input(2.0, &[])).unwrap();
        assert_eq!(out.alarms[0].code, "FLOW_DEVIATION:D");
        assert_eq!(out.alarms[0].severity, Severity::Medium);
    }
}
