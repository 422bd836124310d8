//! Alarm records and policy.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Alarm severity, ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Low => "LOW",
            Severity::Medium => "MEDIUM",
            Severity::High => "HIGH",
            Severity::Critical => "CRITICAL",
        };
        f.write_str(s)
    }
}

/// Run-scoped alarm identifier; `seq` is assigned monotonically per run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AlarmId {
    pub run: String,
    pub seq: u64,
}

impl fmt::Display for AlarmId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.run, self.seq)
    }
}

/// A condition a controller currently reports as true.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlarmAssertion {
    pub code: String,
    pub severity: Severity,
    pub message: String,
}

impl AlarmAssertion {
    pub fn new(code: impl Into<String>, severity: Severity, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            severity,
            message: message.into(),
        }
    }
}

/// Observable lifecycle state of an alarm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlarmState {
    Active,
    Acknowledged,
    Cleared,
}

/// One alarm instance. Timestamps are simulation seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alarm {
    pub id: AlarmId,
    pub controller: String,
    pub code: String,
    pub severity: Severity,
    pub message: String,
    pub raised_at: f64,
    pub acknowledged_at: Option<f64>,
    pub cleared_at: Option<f64>,
    /// Condition has gone away but the alarm is held for acknowledgement.
    #[serde(default)]
    pub returned_to_normal: bool,
}

impl Alarm {
    pub fn is_active(&self) -> bool {
        self.cleared_at.is_none()
    }

    pub fn state(&self) -> AlarmState {
        match (self.cleared_at, self.acknowledged_at) {
            (Some(_), _) => AlarmState::Cleared,
            (None, Some(_)) => AlarmState::Acknowledged,
            (None, None) => AlarmState::Active,
        }
    }
}

/// Auto-clear policy.
///
/// With `latch_at = None` every alarm clears as soon as its condition is no
/// longer asserted. With `Some(severity)`, alarms at or above that severity
/// stay active after returning to normal until acknowledged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AlarmPolicy {
    pub latch_at: Option<Severity>,
}

impl AlarmPolicy {
    pub fn latches(&self, severity: Severity) -> bool {
        self.latch_at.is_some_and(|floor| severity >= floor)
    }
}
