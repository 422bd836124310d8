//! Plain per-tick physical state.

use pf_network::{NetworkTopology, NodeRole};

use crate::command::CompressorMode;

/// Physical state of one node (SI units).
#[derive(Debug, Clone, PartialEq)]
pub struct NodeState {
    pub pressure_pa: f64,
    pub temperature_k: f64,
    /// Imbalance `inflow - outflow - draw - leak` (m³/s); zero at sources.
    pub net_flow_m3ps: f64,
    /// Pressure change rate of the last sub-step (Pa/s).
    pub pressure_rate_pa_s: f64,
    /// Injection at a source (m³/s).
    pub supply_m3ps: f64,
    /// Withdrawal at a sink (m³/s).
    pub draw_m3ps: f64,
    /// Current nominal demand of a sink (m³/s).
    pub demand_m3ps: f64,
    /// Unmetered loss injected by a perturbation (m³/s).
    pub leak_m3ps: f64,
    /// Sink delivery valve position in [0, 1].
    pub valve_position: f64,
    /// Compressor speed fraction in [0, 1].
    pub speed: f64,
    /// Mode the compressor was last driven in.
    pub compressor_mode: CompressorMode,
    /// Boost ratio presented by the compressor over the last tick.
    pub boost_applied: f64,
    /// Compressor fails to spin up while set.
    pub start_fault: bool,
    /// Heat-exchange duty applied over the last tick.
    pub heat_duty: f64,
}

/// Physical state of one pipe.
#[derive(Debug, Clone, PartialEq)]
pub struct PipeState {
    /// Flow (m³/s); positive runs `from → to`.
    pub flow_m3ps: f64,
    pub valve_position: f64,
}

/// Complete physical state of the network, indexed by node/pipe slot.
#[derive(Debug, Clone, PartialEq)]
pub struct NetworkState {
    pub nodes: Vec<NodeState>,
    pub pipes: Vec<PipeState>,
}

impl NetworkState {
    /// Starting state: initial pressures/temperatures, zero pipe flow, pipe
    /// valves open, sinks drawing their demand with valves at `demand / max_draw`.
    pub fn initial(topology: &NetworkTopology) -> Self {
        let nodes = topology
            .nodes()
            .iter()
            .map(|node| {
                let (demand, valve) = match node.role {
                    NodeRole::Sink {
                        demand_m3ps,
                        max_draw_m3ps,
                    } => (demand_m3ps, (demand_m3ps / max_draw_m3ps).clamp(0.0, 1.0)),
                    _ => (0.0, 0.0),
                };
                NodeState {
                    pressure_pa: node.initial_pressure_pa,
                    temperature_k: node.initial_temperature_k,
                    net_flow_m3ps: 0.0,
                    pressure_rate_pa_s: 0.0,
                    supply_m3ps: 0.0,
                    draw_m3ps: demand,
                    demand_m3ps: demand,
                    leak_m3ps: 0.0,
                    valve_position: valve,
                    speed: 0.0,
                    compressor_mode: CompressorMode::Idle,
                    boost_applied: 1.0,
                    start_fault: false,
                    heat_duty: 0.0,
                }
            })
            .collect();
        let pipes = topology
            .pipes()
            .iter()
            .map(|_| PipeState {
                flow_m3ps: 0.0,
                valve_position: 1.0,
            })
            .collect();
        Self { nodes, pipes }
    }

    pub fn total_supply_m3ps(&self) -> f64 {
        self.nodes.iter().map(|n| n.supply_m3ps).sum()
    }

    pub fn total_draw_m3ps(&self) -> f64 {
        self.nodes.iter().map(|n| n.draw_m3ps).sum()
    }

    pub fn total_demand_m3ps(&self) -> f64 {
        self.nodes.iter().map(|n| n.demand_m3ps).sum()
    }
}
