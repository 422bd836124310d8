//! Result data types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type RunId = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Pending,
    Running,
    Completed,
    Stopped,
    Failed,
}

impl RunStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            RunStatus::Completed | RunStatus::Stopped | RunStatus::Failed
        )
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            RunStatus::Pending => "pending",
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::Stopped => "stopped",
            RunStatus::Failed => "failed",
        })
    }
}

/// Persisted description and progress of one simulation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub run_id: RunId,
    pub network_id: String,
    pub status: RunStatus,
    /// Simulation time of tick 0 (s).
    pub start_time_s: f64,
    pub duration_s: f64,
    pub dt_s: f64,
    pub total_ticks: u64,
    /// Last completed tick, if any.
    pub tick_index: Option<u64>,
    pub sim_time_s: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
}

impl RunRecord {
    pub fn new(
        run_id: impl Into<RunId>,
        network_id: impl Into<String>,
        duration_s: f64,
        dt_s: f64,
        total_ticks: u64,
    ) -> Self {
        let now = Utc::now();
        Self {
            run_id: run_id.into(),
            network_id: network_id.into(),
            status: RunStatus::Pending,
            start_time_s: 0.0,
            duration_s,
            dt_s,
            total_ticks,
            tick_index: None,
            sim_time_s: 0.0,
            created_at: now,
            updated_at: now,
            failure: None,
        }
    }

    /// Move to `status`, stamping `updated_at`.
    pub fn transition(&mut self, status: RunStatus) {
        self.status = status;
        self.updated_at = Utc::now();
    }

    pub fn fail(&mut self, reason: impl Into<String>) {
        self.failure = Some(reason.into());
        self.transition(RunStatus::Failed);
    }

    pub fn ticks_completed(&self) -> u64 {
        self.tick_index.map_or(0, |k| k + 1)
    }
}

/// Entity a series row describes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "snake_case")]
pub enum EntityRef {
    Node(String),
    Pipe(String),
    Sensor(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeriesKind {
    /// bar
    Pressure,
    /// °C
    Temperature,
    /// m³/h
    NetFlow,
    /// m³/h
    PipeFlow,
    ValvePosition,
    CompressorSpeed,
    /// Sensor value in its engineering unit.
    Reading,
}

/// One tracked value at one tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesRow {
    pub run_id: RunId,
    pub tick_index: u64,
    pub sim_time_s: f64,
    pub entity: EntityRef,
    pub kind: SeriesKind,
    pub value: f64,
}
