//! The state published at the end of every tick.

use pf_alarms::Alarm;
use pf_controls::{ControllerKind, ControllerSlot, SensorReading};
use pf_physics::{CommandSet, NetworkState};
use pf_results::RunId;
use serde::{Deserialize, Serialize};

/// Read-only view of one controller slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControllerStatus {
    pub id: String,
    pub kind: ControllerKind,
    pub state: String,
    pub summary: String,
    pub scan_interval_s: f64,
    pub last_scan_s: Option<f64>,
    pub faulted: bool,
    pub active_alarms: usize,
}

impl ControllerStatus {
    pub fn from_slot(slot: &ControllerSlot, active_alarms: usize) -> Self {
        Self {
            id: slot.kind().id().to_string(),
            kind: slot.kind(),
            state: slot.state_label(),
            summary: slot.summary(),
            scan_interval_s: slot.scan_interval(),
            last_scan_s: slot.last_scan(),
            faulted: slot.faulted().is_some(),
            active_alarms,
        }
    }
}

/// Complete, internally consistent result of one tick.
#[derive(Debug, Clone)]
pub struct TickSnapshot {
    pub run_id: RunId,
    pub network_id: String,
    pub tick_index: u64,
    pub sim_time_s: f64,
    pub state: NetworkState,
    pub readings: Vec<SensorReading>,
    pub controllers: Vec<ControllerStatus>,
    /// Commands that drive the next physics step.
    pub commands: CommandSet,
    pub interlock: bool,
    pub active_alarms: Vec<Alarm>,
}
