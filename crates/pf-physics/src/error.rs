//! Error types for physics operations.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PhysicsError {
    /// A computed value is non-finite or physically invalid; fatal to a run.
    #[error("physics divergence: {what} at {entity} = {value}")]
    Divergence {
        what: &'static str,
        entity: String,
        value: f64,
    },

    #[error("invalid physics configuration: {what}")]
    InvalidConfig { what: &'static str },

    #[error("invalid time step: {dt}")]
    InvalidStep { dt: f64 },

    #[error("perturbation references unknown {kind} {name}")]
    UnknownEntity { kind: &'static str, name: String },
}

pub type PhysicsResult<T> = Result<T, PhysicsError>;
