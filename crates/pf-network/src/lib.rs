//! pf-network: immutable pipeline topology for pipeflow.
//!
//! Provides:
//! - Node/pipe data structures and the validated `NetworkTopology`
//! - Incremental builder with validation
//! - Serde definitions for already-parsed network descriptions
//!
//! # Example
//!
//! ```
//! use pf_core::units::{bar, m, m3ph};
//! use pf_network::TopologyBuilder;
//!
//! let mut builder = TopologyBuilder::new();
//! let src = builder.add_source("S1", bar(100.0));
//! let sink = builder.add_sink("D1", m3ph(50.0), m3ph(100.0));
//! builder.add_pipe("P1", src, sink, m(1_000.0), m(0.5));
//! let topology = builder.build().unwrap();
//!
//! assert_eq!(topology.nodes().len(), 2);
//! assert_eq!(topology.pipes().len(), 1);
//! ```

pub mod builder;
pub mod def;
pub mod error;
pub mod topology;
pub(crate) mod validate;

pub use builder::TopologyBuilder;
pub use def::{NetworkDef, NodeDef, NodeDefKind, PipeDef};
pub use error::{TopologyError, TopologyResult};
pub use topology::{NetworkTopology, Node, NodeKind, NodeRole, Pipe};
