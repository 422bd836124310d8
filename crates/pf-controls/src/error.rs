//! Error types for control operations.

use thiserror::Error;

/// Result type for control operations.
pub type ControlResult<T> = Result<T, ControlError>;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ControlError {
    /// Invalid argument provided to a control primitive.
    #[error("Invalid argument: {what}")]
    InvalidArg { what: &'static str },

    /// Invalid controller configuration.
    #[error("Invalid controller configuration: {what}")]
    InvalidConfig { what: String },

    /// Name that does not resolve against the topology.
    #[error("Unknown {kind} '{name}'")]
    UnknownEntity { kind: &'static str, name: String },

    /// Computation produced a non-finite value.
    #[error("Non-finite {what}: {value}")]
    NonFinite { what: String, value: f64 },

    #[error(transparent)]
    Core(#[from] pf_core::PfError),
}
