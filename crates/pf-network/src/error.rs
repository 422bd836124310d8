//! Topology construction errors.

use thiserror::Error;

pub type TopologyResult<T> = Result<T, TopologyError>;

/// Reasons a network cannot be loaded.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TopologyError {
    #[error("network has no source node")]
    MissingSource,

    #[error("network has no sink node")]
    MissingSink,

    #[error("pipe {pipe} references unknown node {node}")]
    DanglingPipe { pipe: String, node: String },

    #[error("pipe {pipe} connects node {node} to itself")]
    SelfLoop { pipe: String, node: String },

    #[error("duplicate name: {name}")]
    DuplicateName { name: String },

    #[error("invalid attribute on {entity}: {what}")]
    InvalidAttribute { entity: String, what: &'static str },
}
