//! Control domain for pipeflow: sensors, controller primitives, the eight
//! PLC-style controllers and the runtime that scans them.
//!
//! # Architecture
//!
//! - `SensorSampler` turns physical state into engineering-unit readings
//! - Controllers are a tagged enum over eight kinds sharing one `step` contract
//! - Each controller owns a `ScanClock`; outputs are held between scans
//! - `ControllerRuntime` merges held actuator commands by fixed priority, so
//!   evaluation order never changes the applied command set

pub mod actuator;
pub mod command;
pub mod config;
pub mod controller;
pub mod controllers;
pub mod error;
pub mod pid;
pub mod runtime;
pub mod scan;
pub mod sensor;

pub use actuator::RateLimit;
pub use command::OperatorCommand;
pub use config::{ControllersConfig, PidGains};
pub use controller::{Controller, ControllerKind, ScanInput, ScanOutput};
pub use error::{ControlError, ControlResult};
pub use pid::{PIDController, PIDControllerState};
pub use runtime::{ControllerRuntime, ControllerSlot, ScanRecord, TickControl, TickInput};
pub use scan::ScanClock;
pub use sensor::{
    NoiseConfig, SensorConfig, SensorDef, SensorFrame, SensorKind, SensorLocation, SensorQuality,
    SensorReading, SensorSampler, SensorTarget,
};
