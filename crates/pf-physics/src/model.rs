//! Sub-stepped semi-implicit network model.

use std::sync::Arc;

use pf_core::units::{bar_to_pa, degc_to_k};
use pf_core::{NodeId, PipeId};
use pf_network::{NetworkTopology, NodeRole};
use tracing::trace;

use crate::command::{CommandSet, CompressorMode};
use crate::config::PhysicsConfig;
use crate::error::{PhysicsError, PhysicsResult};
use crate::state::NetworkState;

/// Hard cap on internal sub-steps per tick.
const MAX_SUBSTEPS: usize = 100_000;

/// Pipeline physics over an immutable topology.
///
/// Each `advance` splits `dt` into `n = ceil(dt / stable_dt)` sub-steps.
/// Within a sub-step pipe flows relax toward their pressure-driven targets
/// first, then node pressures integrate the imbalance using the new flows.
#[derive(Debug, Clone)]
pub struct PhysicsModel {
    topology: Arc<NetworkTopology>,
    config: PhysicsConfig,
    /// Per pipe, (m³/s)/Pa at a fully open valve.
    conductance: Vec<f64>,
    /// Per node linepack capacitance, m³/Pa.
    capacitance: Vec<f64>,
    stable_dt: f64,
    ambient_k: f64,
}

impl PhysicsModel {
    pub fn new(topology: Arc<NetworkTopology>, config: PhysicsConfig) -> PhysicsResult<Self> {
        config.validate()?;

        let conductance: Vec<f64> = topology
            .pipes()
            .iter()
            .map(|p| config.conductance_coeff * p.diameter_m.powi(4) / p.length_m)
            .collect();
        let capacitance: Vec<f64> = topology
            .nodes()
            .iter()
            .map(|n| topology.node_volume_m3(n.id) / config.compressibility_pa)
            .collect();

        let mut max_stiffness = 0.0_f64;
        for node in topology.nodes() {
            if matches!(node.role, NodeRole::Source { .. }) {
                continue;
            }
            let cap = capacitance[node.id.slot()];
            if cap <= 0.0 {
                continue;
            }
            let total: f64 = topology
                .node_pipes(node.id)
                .iter()
                .map(|pid| conductance[pid.slot()])
                .sum();
            max_stiffness = max_stiffness.max(total / cap);
        }

        let mut stable_dt = config.max_substep_s.min(0.5 * config.flow_tau_s);
        if max_stiffness > 0.0 {
            stable_dt = stable_dt.min(0.25 / max_stiffness);
        }

        let ambient_k = degc_to_k(config.ambient_temperature_c);
        Ok(Self {
            topology,
            config,
            conductance,
            capacitance,
            stable_dt,
            ambient_k,
        })
    }

    pub fn topology(&self) -> &NetworkTopology {
        &self.topology
    }

    pub fn config(&self) -> &PhysicsConfig {
        &self.config
    }

    pub fn conductance(&self, pipe: PipeId) -> f64 {
        self.conductance.get(pipe.slot()).copied().unwrap_or(0.0)
    }

    pub fn capacitance(&self, node: NodeId) -> f64 {
        self.capacitance.get(node.slot()).copied().unwrap_or(0.0)
    }

    /// Largest sub-step that keeps the explicit update stable.
    pub fn stable_dt(&self) -> f64 {
        self.stable_dt
    }

    pub fn substeps(&self, dt: f64) -> usize {
        ((dt / self.stable_dt - 1e-9).ceil() as usize).clamp(1, MAX_SUBSTEPS)
    }

    /// Advance `state` by `dt` seconds under `commands`.
    pub fn advance(
        &self,
        state: &NetworkState,
        commands: &CommandSet,
        dt: f64,
    ) -> PhysicsResult<NetworkState> {
        if !(dt.is_finite() && dt > 0.0) {
            return Err(PhysicsError::InvalidStep { dt });
        }
        let n = self.substeps(dt);
        let h = dt / n as f64;
        trace!(dt, substeps = n, "advancing physics");

        let mut next = state.clone();
        self.apply_commands(&mut next, commands);
        let mut inflow = vec![0.0; next.nodes.len()];
        let mut boost = vec![1.0; next.nodes.len()];
        for _ in 0..n {
            self.substep(&mut next, commands, h, &mut inflow, &mut boost);
            self.check(&next)?;
        }
        Ok(next)
    }

    /// Latch actuator commands into the state; unset actuators hold position.
    fn apply_commands(&self, state: &mut NetworkState, commands: &CommandSet) {
        for pipe in self.topology.pipes() {
            if let Some(pos) = commands.pipe_valve(pipe.id) {
                state.pipes[pipe.id.slot()].valve_position = pos.clamp(0.0, 1.0);
            }
        }
        for node in self.topology.nodes() {
            let ns = &mut state.nodes[node.id.slot()];
            match node.role {
                NodeRole::Sink { .. } => {
                    if let Some(pos) = commands.sink_valve(node.id) {
                        ns.valve_position = pos.clamp(0.0, 1.0);
                    }
                }
                NodeRole::Compressor { boost_ratio } => {
                    let (mode, ratio) = commands
                        .compressor(node.id)
                        .unwrap_or((CompressorMode::Idle, boost_ratio));
                    ns.compressor_mode = mode;
                    ns.boost_applied = ratio.max(1.0);
                }
                _ => {}
            }
            ns.heat_duty = commands.heat_exchange(node.id).unwrap_or(0.0).clamp(-1.0, 1.0);
        }
    }

    fn substep(
        &self,
        state: &mut NetworkState,
        commands: &CommandSet,
        h: f64,
        inflow: &mut [f64],
        boost: &mut [f64],
    ) {
        let cfg = &self.config;

        // Boost presented on the discharge side of running compressors.
        for (i, ns) in state.nodes.iter().enumerate() {
            boost[i] = if ns.compressor_mode == CompressorMode::Running {
                1.0 + (ns.boost_applied - 1.0) * ns.speed
            } else {
                1.0
            };
        }

        // 1) Pipe flows relax toward their targets using start-of-step pressures.
        let relax = 1.0 - (-h / cfg.flow_tau_s).exp();
        let max_dq = cfg.flow_rate_limit * h;
        inflow.iter_mut().for_each(|v| *v = 0.0);
        for pipe in self.topology.pipes() {
            let (a, b) = (pipe.from.slot(), pipe.to.slot());
            let p_from = state.nodes[a].pressure_pa * boost[a];
            let p_to = state.nodes[b].pressure_pa;
            let ps = &mut state.pipes[pipe.id.slot()];
            let target = ps.valve_position * self.conductance[pipe.id.slot()] * (p_from - p_to);
            let dq = ((target - ps.flow_m3ps) * relax).clamp(-max_dq, max_dq);
            ps.flow_m3ps += dq;
            inflow[b] += ps.flow_m3ps;
            inflow[a] -= ps.flow_m3ps;
        }

        // 2) Node pressures, draws, compressor speed and temperature.
        let p_delivery = bar_to_pa(cfg.min_delivery_pressure_bar);
        let source_relax = 1.0 - (-h / cfg.source_tau_s).exp();
        let spin_relax = 1.0 - (-h / cfg.compressor_spin_tau_s).exp();
        let thermal_relax = 1.0 - (-cfg.thermal_loss_per_s * h).exp();
        for node in self.topology.nodes() {
            let i = node.id.slot();
            let cap = self.capacitance[i];
            let ns = &mut state.nodes[i];
            let p_old = ns.pressure_pa;

            match node.role {
                NodeRole::Source { supply_pressure_pa } => {
                    let target = commands
                        .source_pressure(node.id)
                        .unwrap_or(supply_pressure_pa)
                        .max(0.0);
                    ns.pressure_pa = p_old + (target - p_old) * source_relax;
                    ns.supply_m3ps = ns.leak_m3ps - inflow[i];
                    ns.net_flow_m3ps = 0.0;
                    ns.pressure_rate_pa_s = (ns.pressure_pa - p_old) / h;
                }
                _ => {
                    ns.draw_m3ps = match node.role {
                        NodeRole::Sink { max_draw_m3ps, .. } => {
                            let availability = (p_old / p_delivery).clamp(0.0, 1.0);
                            ns.valve_position * max_draw_m3ps * availability
                        }
                        _ => 0.0,
                    };
                    let imbalance = inflow[i] - ns.draw_m3ps - ns.leak_m3ps;
                    ns.net_flow_m3ps = imbalance;
                    if cap > 0.0 {
                        ns.pressure_rate_pa_s = imbalance / cap;
                        ns.pressure_pa = p_old + ns.pressure_rate_pa_s * h;
                    } else {
                        ns.pressure_rate_pa_s = 0.0;
                    }
                }
            }

            if matches!(node.role, NodeRole::Compressor { .. }) {
                let driven = ns.compressor_mode.is_driven() && !ns.start_fault;
                let target = if driven { 1.0 } else { 0.0 };
                ns.speed += (target - ns.speed) * spin_relax;
            }

            let mut heating = cfg.heat_exchange_k_per_s * ns.heat_duty;
            if boost[i] > 1.0 {
                heating += cfg.compression_heating_k_per_s * (boost[i] - 1.0);
            }
            ns.temperature_k += (self.ambient_k - ns.temperature_k) * thermal_relax + heating * h;
        }
    }

    /// Report the first non-finite or physically invalid value.
    fn check(&self, state: &NetworkState) -> PhysicsResult<()> {
        for node in self.topology.nodes() {
            let ns = &state.nodes[node.id.slot()];
            let checks = [
                ("pressure", ns.pressure_pa),
                ("temperature", ns.temperature_k),
                ("net flow", ns.net_flow_m3ps),
                ("supply", ns.supply_m3ps),
            ];
            for (what, value) in checks {
                if !value.is_finite() {
                    return Err(divergence(what, &node.name, value));
                }
            }
            if ns.pressure_pa < 0.0 {
                return Err(divergence("negative pressure", &node.name, ns.pressure_pa));
            }
            if ns.temperature_k <= 0.0 {
                return Err(divergence(
                    "non-positive temperature",
                    &node.name,
                    ns.temperature_k,
                ));
            }
        }
        for pipe in self.topology.pipes() {
            let flow = state.pipes[pipe.id.slot()].flow_m3ps;
            if !flow.is_finite() {
                return Err(divergence("flow", &pipe.name, flow));
            }
        }
        Ok(())
    }
}

fn divergence(what: &'static str, entity: &str, value: f64) -> PhysicsError {
    PhysicsError::Divergence {
        what,
        entity: entity.to_string(),
        value,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::Command;
    use pf_core::units::{bar, m, m3ph, pa_to_bar};
    use pf_network::TopologyBuilder;

    fn line() -> (Arc<NetworkTopology>, NodeId, NodeId) {
        let mut b = TopologyBuilder::new();
        let s = b.add_source("S", bar(100.0));
        let d = b.add_sink("D", m3ph(50.0), m3ph(100.0));
        b.add_pipe("P", s, d, m(500.0), m(0.3));
        (Arc::new(b.build().unwrap()), s, d)
    }

    #[test]
    fn stable_dt_bounded_by_config() {
        let (topology, _, _) = line();
        let model = PhysicsModel::new(topology, PhysicsConfig::default()).unwrap();
        assert!(model.stable_dt() <= 1.0);
        assert!(model.stable_dt() > 0.0);
        assert_eq!(model.substeps(model.stable_dt() * 10.0), 10);
    }

    #[test]
    fn rejects_bad_step() {
        let (topology, _, _) = line();
        let model = PhysicsModel::new(topology.clone(), PhysicsConfig::default()).unwrap();
        let state = NetworkState::initial(&topology);
        for dt in [0.0, -1.0, f64::NAN] {
            assert!(matches!(
                model.advance(&state, &CommandSet::new(), dt),
                Err(PhysicsError::InvalidStep { .. })
            ));
        }
    }

    #[test]
    fn rejects_invalid_config() {
        let (topology, _, _) = line();
        let config = PhysicsConfig {
            flow_tau_s: 0.0,
            ..PhysicsConfig::default()
        };
        assert!(PhysicsModel::new(topology, config).is_err());
    }

    #[test]
    fn line_settles_near_supply() {
        let (topology, s, d) = line();
        let model = PhysicsModel::new(topology.clone(), PhysicsConfig::default()).unwrap();
        let mut state = NetworkState::initial(&topology);
        for _ in 0..120 {
            state = model.advance(&state, &CommandSet::new(), 1.0).unwrap();
        }
        let sink = &state.nodes[d.slot()];
        let p = pa_to_bar(sink.pressure_pa);
        assert!(p < 100.0 && p > 99.0, "sink pressure {p}");
        assert!((sink.draw_m3ps - 50.0 / 3600.0).abs() < 1e-9);
        assert!((state.nodes[s.slot()].supply_m3ps - sink.draw_m3ps).abs() < 1e-6);
        assert!(sink.net_flow_m3ps.abs() < 1e-6);
    }

    #[test]
    fn sink_valve_command_scales_draw() {
        let (topology, _, d) = line();
        let model = PhysicsModel::new(topology.clone(), PhysicsConfig::default()).unwrap();
        let state = NetworkState::initial(&topology);
        let commands: CommandSet = [Command::SinkValve {
            sink: d,
            position: 1.0,
        }]
        .into_iter()
        .collect();
        let next = model.advance(&state, &commands, 1.0).unwrap();
        assert_eq!(next.nodes[d.slot()].valve_position, 1.0);
        assert!((next.nodes[d.slot()].draw_m3ps - 100.0 / 3600.0).abs() < 1e-9);
    }

    #[test]
    fn huge_leak_diverges() {
        let (topology, _, d) = line();
        let model = PhysicsModel::new(topology.clone(), PhysicsConfig::default()).unwrap();
        let mut state = NetworkState::initial(&topology);
        state.nodes[d.slot()].leak_m3ps = 1.0e3;
        let err = model.advance(&state, &CommandSet::new(), 1.0).unwrap_err();
        assert!(matches!(err, PhysicsError::Divergence { .. }), "{err:?}");
    }

    #[test]
    fn heat_exchange_warms_node() {
        let (topology, _, d) = line();
        let model = PhysicsModel::new(topology.clone(), PhysicsConfig::default()).unwrap();
        let mut state = NetworkState::initial(&topology);
        let commands: CommandSet = [Command::HeatExchange { node: d, duty: 1.0 }]
            .into_iter()
            .collect();
        let t0 = state.nodes[d.slot()].temperature_k;
        for _ in 0..60 {
            state = model.advance(&state, &commands, 1.0).unwrap();
        }
        assert!(state.nodes[d.slot()].temperature_k > t0 + 5.0);
    }
}
