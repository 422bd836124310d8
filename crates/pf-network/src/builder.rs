//! Incremental topology builder.

use std::collections::HashMap;

use pf_core::units::{Length, Pressure, Temperature, VolumeRate};
use pf_core::units::constants::T_AMBIENT_K;
use pf_core::{NodeId, PipeId};
use uom::si::length::meter;
use uom::si::pressure::pascal;
use uom::si::thermodynamic_temperature::kelvin;
use uom::si::volume_rate::cubic_meter_per_second;

use crate::error::TopologyResult;
use crate::topology::{NetworkTopology, Node, NodeRole, Pipe};
use crate::validate;

/// Builder for constructing a topology incrementally.
///
/// Pipes reference nodes by id; `build()` validates every reference and
/// freezes the result into an immutable `NetworkTopology`.
#[derive(Debug, Default)]
pub struct TopologyBuilder {
    nodes: Vec<Node>,
    pipes: Vec<Pipe>,
    initial_pressures: HashMap<NodeId, f64>,
}

impl TopologyBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node with an explicit role; role attributes are in SI units.
    pub fn add_node(&mut self, name: impl Into<String>, role: NodeRole) -> NodeId {
        let id = NodeId::from_index(self.nodes.len() as u32);
        self.nodes.push(Node {
            id,
            name: name.into(),
            role,
            initial_pressure_pa: f64::NAN,
            initial_temperature_k: T_AMBIENT_K,
        });
        id
    }

    pub fn add_source(&mut self, name: impl Into<String>, supply_pressure: Pressure) -> NodeId {
        self.add_node(
            name,
            NodeRole::Source {
                supply_pressure_pa: supply_pressure.get::<pascal>(),
            },
        )
    }

    pub fn add_junction(&mut self, name: impl Into<String>) -> NodeId {
        self.add_node(name, NodeRole::Junction)
    }

    pub fn add_compressor(&mut self, name: impl Into<String>, boost_ratio: f64) -> NodeId {
        self.add_node(name, NodeRole::Compressor { boost_ratio })
    }

    pub fn add_sink(
        &mut self,
        name: impl Into<String>,
        demand: VolumeRate,
        max_draw: VolumeRate,
    ) -> NodeId {
        self.add_node(
            name,
            NodeRole::Sink {
                demand_m3ps: demand.get::<cubic_meter_per_second>(),
                max_draw_m3ps: max_draw.get::<cubic_meter_per_second>(),
            },
        )
    }

    /// Add a pipe; positive flow runs `from → to`.
    pub fn add_pipe(
        &mut self,
        name: impl Into<String>,
        from: NodeId,
        to: NodeId,
        length: Length,
        diameter: Length,
    ) -> PipeId {
        let id = PipeId::from_index(self.pipes.len() as u32);
        self.pipes.push(Pipe {
            id,
            name: name.into(),
            from,
            to,
            length_m: length.get::<meter>(),
            diameter_m: diameter.get::<meter>(),
        });
        id
    }

    /// Override the starting pressure of a node.
    ///
    /// Nodes without an override start at the highest source supply pressure.
    pub fn set_initial_pressure(&mut self, node: NodeId, pressure: Pressure) {
        self.initial_pressures.insert(node, pressure.get::<pascal>());
    }

    pub fn set_initial_temperature(&mut self, node: NodeId, temperature: Temperature) {
        if let Some(n) = self.nodes.get_mut(node.slot()) {
            n.initial_temperature_k = temperature.get::<kelvin>();
        }
    }

    /// Validate and freeze the topology.
    pub fn build(mut self) -> TopologyResult<NetworkTopology> {
        validate::validate_structure(&self.nodes, &self.pipes)?;

        let default_pressure = self
            .nodes
            .iter()
            .filter_map(|n| match n.role {
                NodeRole::Source { supply_pressure_pa } => Some(supply_pressure_pa),
                _ => None,
            })
            .fold(0.0_f64, f64::max);
        for node in &mut self.nodes {
            node.initial_pressure_pa = self
                .initial_pressures
                .get(&node.id)
                .copied()
                .unwrap_or(default_pressure);
        }
        validate::validate_initial_state(&self.nodes)?;

        let (node_pipe_offsets, node_pipes) = Self::build_adjacency(&self.nodes, &self.pipes);
        let node_names = self.nodes.iter().map(|n| (n.name.clone(), n.id)).collect();
        let pipe_names = self.pipes.iter().map(|p| (p.name.clone(), p.id)).collect();

        Ok(NetworkTopology {
            nodes: self.nodes,
            pipes: self.pipes,
            node_pipe_offsets,
            node_pipes,
            node_names,
            pipe_names,
        })
    }

    /// Build compact adjacency lists: for each node, its incident pipes.
    fn build_adjacency(nodes: &[Node], pipes: &[Pipe]) -> (Vec<usize>, Vec<PipeId>) {
        let mut per_node: Vec<Vec<PipeId>> = vec![Vec::new(); nodes.len()];
        for pipe in pipes {
            per_node[pipe.from.slot()].push(pipe.id);
            per_node[pipe.to.slot()].push(pipe.id);
        }

        let mut offsets = Vec::with_capacity(nodes.len() + 1);
        let mut flat = Vec::with_capacity(pipes.len() * 2);
        offsets.push(0);
        for list in per_node {
            flat.extend(list);
            offsets.push(flat.len());
        }
        (offsets, flat)
    }
}
