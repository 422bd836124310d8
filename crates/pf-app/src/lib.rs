//! Shared application service layer for pipeflow.
//!
//! Wires topology, physics, sensors, controllers, alarms and loggers into
//! runs, executes each run on its own thread and exposes the control and
//! read API used by front ends.

pub mod config;
pub mod context;
pub mod error;
pub mod params;
pub mod run_loop;
pub mod scenario;
pub mod service;
pub mod snapshot;

pub use config::{Pacing, SimConfig};
pub use context::RunContext;
pub use error::{AppError, AppResult};
pub use params::RunParams;
pub use run_loop::{LoopCommand, RunShared};
pub use scenario::{Scenario, ScheduledCommand};
pub use service::{NetworkSetup, RunStatusView, SimulationService};
pub use snapshot::{ControllerStatus, TickSnapshot};
