//! pf-results: run records, time-series rows and their loggers.

pub mod logger;
pub mod memory;
pub mod store;
pub mod types;

pub use logger::{DataLogger, LoggerSet};
pub use memory::MemoryLogger;
pub use store::RunStore;
pub use types::*;

pub type ResultsResult<T> = Result<T, ResultsError>;

#[derive(thiserror::Error, Debug)]
pub enum ResultsError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Run not found: {run_id}")]
    RunNotFound { run_id: String },

    #[error("Run {run_id}: tick {tick} is not after tick {last}")]
    OutOfOrder { run_id: String, tick: u64, last: u64 },

    #[error("Run {run_id}: tick {tick} leaves a gap, expected tick {expected}")]
    TickGap {
        run_id: String,
        tick: u64,
        expected: u64,
    },

    #[error("Corrupt series for run {run_id} at line {line}: {message}")]
    CorruptSeries {
        run_id: String,
        line: usize,
        message: String,
    },
}
