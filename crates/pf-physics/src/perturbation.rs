//! Scheduled external perturbations of the physical network.

use pf_core::units::m3ph_to_m3ps;
use pf_network::{NetworkTopology, NodeKind};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{PhysicsError, PhysicsResult};
use crate::state::NetworkState;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PerturbationEvent {
    /// Change the nominal demand of a sink.
    DemandStep { sink: String, demand_m3h: f64 },
    /// Start (or, with zero rate, stop) an unmetered loss at a node.
    Leak { node: String, rate_m3h: f64 },
    /// Make a compressor fail (or stop failing) to spin up.
    StartFault { compressor: String, active: bool },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Perturbation {
    /// Simulation time at which the event takes effect (s).
    pub at_s: f64,
    #[serde(flatten)]
    pub event: PerturbationEvent,
}

impl PerturbationEvent {
    fn node_slot(
        topology: &NetworkTopology,
        name: &str,
        kind: Option<NodeKind>,
        label: &'static str,
    ) -> PhysicsResult<usize> {
        topology
            .node_by_name(name)
            .filter(|n| kind.is_none_or(|k| n.kind() == k))
            .map(|n| n.id.slot())
            .ok_or_else(|| PhysicsError::UnknownEntity {
                kind: label,
                name: name.to_string(),
            })
    }

    /// Check that every referenced entity exists with the right kind.
    pub fn validate(&self, topology: &NetworkTopology) -> PhysicsResult<()> {
        match self {
            PerturbationEvent::DemandStep { sink, .. } => {
                Self::node_slot(topology, sink, Some(NodeKind::Sink), "sink").map(|_| ())
            }
            PerturbationEvent::Leak { node, .. } => {
                Self::node_slot(topology, node, None, "node").map(|_| ())
            }
            PerturbationEvent::StartFault { compressor, .. } => Self::node_slot(
                topology,
                compressor,
                Some(NodeKind::Compressor),
                "compressor",
            )
            .map(|_| ()),
        }
    }

    pub fn apply(&self, topology: &NetworkTopology, state: &mut NetworkState) -> PhysicsResult<()> {
        match self {
            PerturbationEvent::DemandStep { sink, demand_m3h } => {
                let slot = Self::node_slot(topology, sink, Some(NodeKind::Sink), "sink")?;
                state.nodes[slot].demand_m3ps = m3ph_to_m3ps(demand_m3h.max(0.0));
            }
            PerturbationEvent::Leak { node, rate_m3h } => {
                let slot = Self::node_slot(topology, node, None, "node")?;
                state.nodes[slot].leak_m3ps = m3ph_to_m3ps(rate_m3h.max(0.0));
            }
            PerturbationEvent::StartFault { compressor, active } => {
                let slot = Self::node_slot(
                    topology,
                    compressor,
                    Some(NodeKind::Compressor),
                    "compressor",
                )?;
                state.nodes[slot].start_fault = *active;
            }
        }
        Ok(())
    }
}

/// Time-ordered perturbations consumed as simulation time advances.
#[derive(Debug, Clone, Default)]
pub struct PerturbationSchedule {
    events: Vec<Perturbation>,
    cursor: usize,
}

impl PerturbationSchedule {
    pub fn new(mut events: Vec<Perturbation>) -> Self {
        events.sort_by(|a, b| a.at_s.total_cmp(&b.at_s));
        Self { events, cursor: 0 }
    }

    pub fn validate(&self, topology: &NetworkTopology) -> PhysicsResult<()> {
        self.events
            .iter()
            .try_for_each(|p| p.event.validate(topology))
    }

    pub fn remaining(&self) -> usize {
        self.events.len() - self.cursor
    }

    /// Apply every event scheduled at or before `t`; returns how many fired.
    pub fn apply_due(
        &mut self,
        t: f64,
        topology: &NetworkTopology,
        state: &mut NetworkState,
    ) -> PhysicsResult<usize> {
        let mut fired = 0;
        while let Some(next) = self.events.get(self.cursor) {
            if next.at_s > t + 1e-9 {
                break;
            }
            next.event.apply(topology, state)?;
            info!(at_s = next.at_s, sim_time = t, event = ?next.event, "perturbation applied");
            self.cursor += 1;
            fired += 1;
        }
        Ok(fired)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pf_core::units::{bar, m, m3ph};
    use pf_network::TopologyBuilder;

    fn topology() -> NetworkTopology {
        let mut b = TopologyBuilder::new();
        let s = b.add_source("S", bar(50.0));
        let d = b.add_sink("D", m3ph(30.0), m3ph(120.0));
        b.add_pipe("P", s, d, m(500.0), m(0.3));
        b.build().unwrap()
    }

    #[test]
    fn applies_in_time_order() {
        let topology = topology();
        let mut state = NetworkState::initial(&topology);
        let mut schedule = PerturbationSchedule::new(vec![
            Perturbation {
                at_s: 20.0,
                event: PerturbationEvent::DemandStep {
                    sink: "D".into(),
                    demand_m3h: 90.0,
                },
            },
            Perturbation {
                at_s: 10.0,
                event: PerturbationEvent::Leak {
                    node: "D".into(),
                    rate_m3h: 3.6,
                },
            },
        ]);
        assert!(schedule.validate(&topology).is_ok());

        assert_eq!(schedule.apply_due(5.0, &topology, &mut state).unwrap(), 0);
        assert_eq!(schedule.apply_due(10.0, &topology, &mut state).unwrap(), 1);
        assert!((state.nodes[1].leak_m3ps - 0.001).abs() < 1e-12);
        assert_eq!(schedule.apply_due(30.0, &topology, &mut state).unwrap(), 1);
        assert!((state.nodes[1].demand_m3ps - 0.025).abs() < 1e-12);
        assert_eq!(schedule.remaining(), 0);
    }

    #[test]
    fn wrong_kind_is_rejected() {
        let topology = topology();
        let event = PerturbationEvent::DemandStep {
            sink: "S".into(),
            demand_m3h: 1.0,
        };
        assert!(matches!(
            event.validate(&topology),
            Err(PhysicsError::UnknownEntity { kind: "sink", .. })
        ));
    }

    #[test]
    fn yaml_round_trip_shape() {
        let yaml = "- { at_s: 30, type: demand_step, sink: D, demand_m3h: 80 }\n";
        let parsed: Vec<Perturbation> = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(parsed[0].at_s, 30.0);
        assert!(matches!(parsed[0].event, PerturbationEvent::DemandStep { .. }));
    }
}
