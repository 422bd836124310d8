//! Central alarm registry for pipeflow runs.
//!
//! Alarms are raised by controller scans, deduplicated per active
//! `(controller, code)` pair, acknowledged by operators and cleared when the
//! asserting controller stops reporting the condition.

pub mod alarm;
pub mod error;
pub mod manager;

pub use alarm::{Alarm, AlarmAssertion, AlarmId, AlarmPolicy, AlarmState, Severity};
pub use error::{AlarmError, AlarmResult};
pub use manager::{AlarmManager, RaiseOutcome, ReconcileSummary};
