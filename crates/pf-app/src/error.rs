//! Error types for the pf-app service layer.

use std::path::PathBuf;

/// Application error type wrapping the backend crates' errors.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Invalid topology: {0}")]
    InvalidTopology(#[from] pf_network::TopologyError),

    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("Network {network_id} already has an active run ({run_id})")]
    ConcurrentRunConflict { network_id: String, run_id: String },

    #[error("Network not found: {0}")]
    NetworkNotFound(String),

    #[error("Network {0} has no active run")]
    NoActiveRun(String),

    #[error("Run not found: {0}")]
    RunNotFound(String),

    #[error("Alarm not found: {0}")]
    AlarmNotFound(String),

    #[error("Alarm is no longer active: {0}")]
    AlarmNotActive(String),

    #[error("Physics error: {0}")]
    Physics(#[from] pf_physics::PhysicsError),

    #[error("Control error: {0}")]
    Control(#[from] pf_controls::ControlError),

    #[error("Results error: {0}")]
    Results(#[from] pf_results::ResultsError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to read scenario file: {path}")]
    ScenarioRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Run thread panicked: {0}")]
    Thread(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for pf-app operations.
pub type AppResult<T> = Result<T, AppError>;

impl From<pf_alarms::AlarmError> for AppError {
    fn from(err: pf_alarms::AlarmError) -> Self {
        match err {
            pf_alarms::AlarmError::NotFound { id } => AppError::AlarmNotFound(id.to_string()),
            pf_alarms::AlarmError::NotActive { id } => AppError::AlarmNotActive(id.to_string()),
        }
    }
}

impl From<serde_yaml::Error> for AppError {
    fn from(err: serde_yaml::Error) -> Self {
        AppError::Config(err.to_string())
    }
}
