//! Transient physics for pipeflow networks.
//!
//! Provides:
//! - Per-tick network state (node pressure/temperature/flow, pipe flow, valves)
//! - Actuator command set consumed by the model
//! - Sub-stepped semi-implicit `PhysicsModel::advance`
//! - Scheduled external perturbations (demand steps, leaks, start faults)

pub mod command;
pub mod config;
pub mod error;
pub mod model;
pub mod perturbation;
pub mod state;

pub use command::{ActuatorId, Command, CommandSet, CompressorMode};
pub use config::PhysicsConfig;
pub use error::{PhysicsError, PhysicsResult};
pub use model::PhysicsModel;
pub use perturbation::{Perturbation, PerturbationEvent, PerturbationSchedule};
pub use state::{NetworkState, NodeState, PipeState};
