//! Serde definitions of an already-parsed network.
//!
//! Values are in engineering units (bar, °C, m³/h, m) as they appear in
//! network descriptions; conversion to SI happens in the builder.

use std::collections::HashMap;

use pf_core::units::{bar, degc, m, m3ph};
use serde::{Deserialize, Serialize};

use crate::builder::TopologyBuilder;
use crate::error::{TopologyError, TopologyResult};
use crate::topology::NetworkTopology;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkDef {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    pub nodes: Vec<NodeDef>,
    pub pipes: Vec<PipeDef>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeDef {
    pub name: String,
    #[serde(flatten)]
    pub kind: NodeDefKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial_pressure_bar: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial_temperature_c: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NodeDefKind {
    Source {
        supply_pressure_bar: f64,
    },
    Junction,
    Compressor {
        boost_ratio: f64,
    },
    Sink {
        demand_m3h: f64,
        /// Defaults to twice the demand.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max_draw_m3h: Option<f64>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipeDef {
    pub name: String,
    pub from: String,
    pub to: String,
    pub length_m: f64,
    pub diameter_m: f64,
}

impl NetworkDef {
    /// Resolve node names and build a validated topology.
    pub fn to_topology(&self) -> TopologyResult<NetworkTopology> {
        let mut builder = TopologyBuilder::new();
        let mut ids = HashMap::new();

        for def in &self.nodes {
            let id = match def.kind {
                NodeDefKind::Source {
                    supply_pressure_bar,
                } => builder.add_source(def.name.clone(), bar(supply_pressure_bar)),
                NodeDefKind::Junction => builder.add_junction(def.name.clone()),
                NodeDefKind::Compressor { boost_ratio } => {
                    builder.add_compressor(def.name.clone(), boost_ratio)
                }
                NodeDefKind::Sink {
                    demand_m3h,
                    max_draw_m3h,
                } => builder.add_sink(
                    def.name.clone(),
                    m3ph(demand_m3h),
                    m3ph(max_draw_m3h.unwrap_or(2.0 * demand_m3h)),
                ),
            };
            if let Some(p) = def.initial_pressure_bar {
                builder.set_initial_pressure(id, bar(p));
            }
            if let Some(t) = def.initial_temperature_c {
                builder.set_initial_temperature(id, degc(t));
            }
            if ids.insert(def.name.as_str(), id).is_some() {
                return Err(TopologyError::DuplicateName {
                    name: def.name.clone(),
                });
            }
        }

        for def in &self.pipes {
            let resolve = |name: &str| {
                ids.get(name)
                    .copied()
                    .ok_or_else(|| TopologyError::DanglingPipe {
                        pipe: def.name.clone(),
                        node: name.to_string(),
                    })
            };
            let from = resolve(&def.from)?;
            let to = resolve(&def.to)?;
            builder.add_pipe(def.name.clone(), from, to, m(def.length_m), m(def.diameter_m));
        }

        builder.build()
    }
}
