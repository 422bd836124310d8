//! Core topology data structures.

use std::collections::HashMap;

use pf_core::{NodeId, PipeId};
use serde::{Deserialize, Serialize};

/// Kind of a network node; fixed at load time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Source,
    Junction,
    Compressor,
    Sink,
}

/// Kind-specific static attributes of a node (SI units).
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NodeRole {
    /// Pressure-regulated supply point.
    Source { supply_pressure_pa: f64 },
    Junction,
    /// Compressor station; `boost_ratio` is the discharge/suction ratio at full speed.
    Compressor { boost_ratio: f64 },
    /// Delivery point drawing `demand_m3ps` nominally, at most `max_draw_m3ps`.
    Sink {
        demand_m3ps: f64,
        max_draw_m3ps: f64,
    },
}

impl NodeRole {
    pub fn kind(&self) -> NodeKind {
        match self {
            NodeRole::Source { .. } => NodeKind::Source,
            NodeRole::Junction => NodeKind::Junction,
            NodeRole::Compressor { .. } => NodeKind::Compressor,
            NodeRole::Sink { .. } => NodeKind::Sink,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub id: NodeId,
    pub name: String,
    pub role: NodeRole,
    pub initial_pressure_pa: f64,
    pub initial_temperature_k: f64,
}

impl Node {
    pub fn kind(&self) -> NodeKind {
        self.role.kind()
    }
}

/// Undirected pipe between two nodes.
///
/// `from`/`to` only fix the sign convention of the flow: positive flow
/// runs from `from` to `to`.
#[derive(Debug, Clone, PartialEq)]
pub struct Pipe {
    pub id: PipeId,
    pub name: String,
    pub from: NodeId,
    pub to: NodeId,
    pub length_m: f64,
    pub diameter_m: f64,
}

impl Pipe {
    /// Geometric volume (m³).
    pub fn volume_m3(&self) -> f64 {
        std::f64::consts::PI * self.diameter_m * self.diameter_m / 4.0 * self.length_m
    }

    /// The endpoint opposite `node`, if `node` is an endpoint.
    pub fn other_end(&self, node: NodeId) -> Option<NodeId> {
        if node == self.from {
            Some(self.to)
        } else if node == self.to {
            Some(self.from)
        } else {
            None
        }
    }
}

/// Validated, immutable network graph.
///
/// Node→pipe adjacency is stored compactly: node i's pipes are
/// `node_pipes[node_pipe_offsets[i]..node_pipe_offsets[i + 1]]`.
#[derive(Debug, Clone)]
pub struct NetworkTopology {
    pub(crate) nodes: Vec<Node>,
    pub(crate) pipes: Vec<Pipe>,
    pub(crate) node_pipe_offsets: Vec<usize>,
    pub(crate) node_pipes: Vec<PipeId>,
    pub(crate) node_names: HashMap<String, NodeId>,
    pub(crate) pipe_names: HashMap<String, PipeId>,
}

impl NetworkTopology {
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn pipes(&self) -> &[Pipe] {
        &self.pipes
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.slot())
    }

    pub fn pipe(&self, id: PipeId) -> Option<&Pipe> {
        self.pipes.get(id.slot())
    }

    pub fn node_by_name(&self, name: &str) -> Option<&Node> {
        self.node_names.get(name).and_then(|id| self.node(*id))
    }

    pub fn pipe_by_name(&self, name: &str) -> Option<&Pipe> {
        self.pipe_names.get(name).and_then(|id| self.pipe(*id))
    }

    /// Pipes incident to a node (sorted by pipe id).
    pub fn node_pipes(&self, node: NodeId) -> &[PipeId] {
        let idx = node.slot();
        if idx >= self.nodes.len() {
            return &[];
        }
        &self.node_pipes[self.node_pipe_offsets[idx]..self.node_pipe_offsets[idx + 1]]
    }

    /// Nodes directly connected to `node` by a pipe.
    pub fn neighbors(&self, node: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.node_pipes(node)
            .iter()
            .filter_map(move |pid| self.pipe(*pid).and_then(|p| p.other_end(node)))
    }

    pub fn nodes_of_kind(&self, kind: NodeKind) -> impl Iterator<Item = &Node> + '_ {
        self.nodes.iter().filter(move |n| n.kind() == kind)
    }

    pub fn sources(&self) -> impl Iterator<Item = &Node> + '_ {
        self.nodes_of_kind(NodeKind::Source)
    }

    pub fn sinks(&self) -> impl Iterator<Item = &Node> + '_ {
        self.nodes_of_kind(NodeKind::Sink)
    }

    pub fn compressors(&self) -> impl Iterator<Item = &Node> + '_ {
        self.nodes_of_kind(NodeKind::Compressor)
    }

    /// Gas volume lumped at a node: half the volume of every incident pipe.
    pub fn node_volume_m3(&self, node: NodeId) -> f64 {
        self.node_pipes(node)
            .iter()
            .filter_map(|pid| self.pipe(*pid))
            .map(|p| 0.5 * p.volume_m3())
            .sum()
    }
}
