//! In-memory logger, readable while a run is writing.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::logger::{DataLogger, check_order};
use crate::types::{EntityRef, RunId, RunRecord, SeriesKind, SeriesRow};
use crate::{ResultsError, ResultsResult};

#[derive(Debug, Default)]
struct MemoryRun {
    record: Option<RunRecord>,
    rows: Vec<SeriesRow>,
    last_tick: Option<u64>,
}

/// Cloneable handle; every clone shares the same storage.
#[derive(Debug, Clone, Default)]
pub struct MemoryLogger {
    runs: Arc<RwLock<BTreeMap<RunId, MemoryRun>>>,
}

impl MemoryLogger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn run(&self, run_id: &str) -> Option<RunRecord> {
        self.runs.read().get(run_id).and_then(|r| r.record.clone())
    }

    pub fn runs(&self) -> Vec<RunRecord> {
        self.runs
            .read()
            .values()
            .filter_map(|r| r.record.clone())
            .collect()
    }

    pub fn series(&self, run_id: &str) -> ResultsResult<Vec<SeriesRow>> {
        self.runs
            .read()
            .get(run_id)
            .map(|r| r.rows.clone())
            .ok_or_else(|| ResultsError::RunNotFound {
                run_id: run_id.to_string(),
            })
    }

    /// Values of one tracked quantity, as `(tick, value)` in tick order.
    pub fn trace(&self, run_id: &str, entity: &EntityRef, kind: SeriesKind) -> Vec<(u64, f64)> {
        self.runs
            .read()
            .get(run_id)
            .map(|r| {
                r.rows
                    .iter()
                    .filter(|row| row.kind == kind && &row.entity == entity)
                    .map(|row| (row.tick_index, row.value))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn last_tick(&self, run_id: &str) -> Option<u64> {
        self.runs.read().get(run_id).and_then(|r| r.last_tick)
    }
}

impl DataLogger for MemoryLogger {
    fn begin_run(&mut self, record: &RunRecord) -> ResultsResult<()> {
        let mut runs = self.runs.write();
        let run = runs.entry(record.run_id.clone()).or_default();
        run.record = Some(record.clone());
        Ok(())
    }

    fn append(&mut self, rows: &[SeriesRow]) -> ResultsResult<()> {
        let Some(first) = rows.first() else {
            return Ok(());
        };
        let run_id = first.run_id.clone();
        let mut runs = self.runs.write();
        let run = runs
            .get_mut(&run_id)
            .ok_or_else(|| ResultsError::RunNotFound {
                run_id: run_id.clone(),
            })?;
        run.last_tick = check_order(&run_id, run.last_tick, rows)?;
        run.rows.extend_from_slice(rows);
        Ok(())
    }

    fn update_run(&mut self, record: &RunRecord) -> ResultsResult<()> {
        let mut runs = self.runs.write();
        let run = runs
            .get_mut(&record.run_id)
            .ok_or_else(|| ResultsError::RunNotFound {
                run_id: record.run_id.clone(),
            })?;
        run.record = Some(record.clone());
        Ok(())
    }
}
