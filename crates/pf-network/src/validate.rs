//! Topology validation logic.

use std::collections::HashSet;

use crate::error::{TopologyError, TopologyResult};
use crate::topology::{Node, NodeKind, NodeRole, Pipe};

/// Validate structure: at least one source and sink, unique names, every
/// pipe referencing existing distinct nodes, positive finite attributes.
pub(crate) fn validate_structure(nodes: &[Node], pipes: &[Pipe]) -> TopologyResult<()> {
    let mut names = HashSet::new();
    for node in nodes {
        if !names.insert(node.name.as_str()) {
            return Err(TopologyError::DuplicateName {
                name: node.name.clone(),
            });
        }
        validate_role(node)?;
    }

    let mut pipe_names = HashSet::new();
    for pipe in pipes {
        if !pipe_names.insert(pipe.name.as_str()) {
            return Err(TopologyError::DuplicateName {
                name: pipe.name.clone(),
            });
        }
        for end in [pipe.from, pipe.to] {
            if end.slot() >= nodes.len() {
                return Err(TopologyError::DanglingPipe {
                    pipe: pipe.name.clone(),
                    node: end.to_string(),
                });
            }
        }
        if pipe.from == pipe.to {
            return Err(TopologyError::SelfLoop {
                pipe: pipe.name.clone(),
                node: nodes[pipe.from.slot()].name.clone(),
            });
        }
        if !(pipe.length_m.is_finite() && pipe.length_m > 0.0) {
            return Err(invalid(&pipe.name, "length must be positive"));
        }
        if !(pipe.diameter_m.is_finite() && pipe.diameter_m > 0.0) {
            return Err(invalid(&pipe.name, "diameter must be positive"));
        }
    }

    if !nodes.iter().any(|n| n.kind() == NodeKind::Source) {
        return Err(TopologyError::MissingSource);
    }
    if !nodes.iter().any(|n| n.kind() == NodeKind::Sink) {
        return Err(TopologyError::MissingSink);
    }

    Ok(())
}

fn validate_role(node: &Node) -> TopologyResult<()> {
    match node.role {
        NodeRole::Source { supply_pressure_pa } => {
            if !(supply_pressure_pa.is_finite() && supply_pressure_pa > 0.0) {
                return Err(invalid(&node.name, "supply pressure must be positive"));
            }
        }
        NodeRole::Junction => {}
        NodeRole::Compressor { boost_ratio } => {
            if !(boost_ratio.is_finite() && boost_ratio >= 1.0) {
                return Err(invalid(&node.name, "boost ratio must be >= 1"));
            }
        }
        NodeRole::Sink {
            demand_m3ps,
            max_draw_m3ps,
        } => {
            if !(demand_m3ps.is_finite() && demand_m3ps >= 0.0) {
                return Err(invalid(&node.name, "demand must be non-negative"));
            }
            if !(max_draw_m3ps.is_finite() && max_draw_m3ps > 0.0) {
                return Err(invalid(&node.name, "max draw must be positive"));
            }
        }
    }
    Ok(())
}

/// Validate the resolved starting state of every node.
pub(crate) fn validate_initial_state(nodes: &[Node]) -> TopologyResult<()> {
    for node in nodes {
        if !(node.initial_pressure_pa.is_finite() && node.initial_pressure_pa >= 0.0) {
            return Err(invalid(&node.name, "initial pressure must be non-negative"));
        }
        if !(node.initial_temperature_k.is_finite() && node.initial_temperature_k > 0.0) {
            return Err(invalid(&node.name, "initial temperature must be positive"));
        }
    }
    Ok(())
}

fn invalid(entity: &str, what: &'static str) -> TopologyError {
    TopologyError::InvalidAttribute {
        entity: entity.to_string(),
        what,
    }
}
