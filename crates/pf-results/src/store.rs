//! Run storage on disk: one directory per run.
//!
//! `run.json` is rewritten whole through a temp file and rename, so a reader
//! sees either the old or the new record. `timeseries.jsonl` is append-only;
//! a reader ignores a trailing line that is still being written.

use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::logger::{DataLogger, check_order};
use crate::types::{RunRecord, SeriesRow};
use crate::{ResultsError, ResultsResult};

const RECORD_FILE: &str = "run.json";
const SERIES_FILE: &str = "timeseries.jsonl";

#[derive(Debug, Clone)]
pub struct RunStore {
    root_dir: PathBuf,
    last_ticks: HashMap<String, Option<u64>>,
}

impl RunStore {
    pub fn new(root_dir: PathBuf) -> ResultsResult<Self> {
        if !root_dir.exists() {
            fs::create_dir_all(&root_dir)?;
        }
        Ok(Self {
            root_dir,
            last_ticks: HashMap::new(),
        })
    }

    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    fn run_dir(&self, run_id: &str) -> PathBuf {
        self.root_dir.join(run_id)
    }

    pub fn has_run(&self, run_id: &str) -> bool {
        self.run_dir(run_id).join(RECORD_FILE).exists()
    }

    fn write_record(&self, record: &RunRecord) -> ResultsResult<()> {
        let run_dir = self.run_dir(&record.run_id);
        fs::create_dir_all(&run_dir)?;
        let tmp = run_dir.join(format!("{RECORD_FILE}.tmp"));
        fs::write(&tmp, serde_json::to_string_pretty(record)?)?;
        fs::rename(&tmp, run_dir.join(RECORD_FILE))?;
        Ok(())
    }

    /// Overwrite the record of a run that is already stored.
    pub fn rewrite_run(&self, record: &RunRecord) -> ResultsResult<()> {
        if !self.has_run(&record.run_id) {
            return Err(ResultsError::RunNotFound {
                run_id: record.run_id.clone(),
            });
        }
        self.write_record(record)
    }

    pub fn load_run(&self, run_id: &str) -> ResultsResult<RunRecord> {
        let path = self.run_dir(run_id).join(RECORD_FILE);
        if !path.exists() {
            return Err(ResultsError::RunNotFound {
                run_id: run_id.to_string(),
            });
        }
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn load_series(&self, run_id: &str) -> ResultsResult<Vec<SeriesRow>> {
        if !self.has_run(run_id) {
            return Err(ResultsError::RunNotFound {
                run_id: run_id.to_string(),
            });
        }
        let path = self.run_dir(run_id).join(SERIES_FILE);
        if !path.exists() {
            return Ok(Vec::new());
        }

        let content = fs::read_to_string(path)?;
        let complete = content.ends_with('\n');
        let lines: Vec<&str> = content.lines().collect();
        let mut rows = Vec::with_capacity(lines.len());
        for (i, line) in lines.iter().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<SeriesRow>(line) {
                Ok(row) => rows.push(row),
                Err(_) if !complete && i + 1 == lines.len() => {
                    debug!(run_id, line = i + 1, "skipping partial trailing row");
                }
                Err(e) => {
                    return Err(ResultsError::CorruptSeries {
                        run_id: run_id.to_string(),
                        line: i + 1,
                        message: e.to_string(),
                    });
                }
            }
        }
        Ok(rows)
    }

    /// Runs of one network, oldest first.
    pub fn list_runs(&self, network_id: &str) -> ResultsResult<Vec<RunRecord>> {
        let mut runs = Vec::new();
        if !self.root_dir.exists() {
            return Ok(runs);
        }

        for entry in fs::read_dir(&self.root_dir)? {
            let entry = entry?;
            if !entry.path().is_dir() {
                continue;
            }
            let run_id = entry.file_name().to_string_lossy().to_string();
            match self.load_run(&run_id) {
                Ok(record) if record.network_id == network_id => runs.push(record),
                Ok(_) => {}
                Err(e) => warn!(run_id, error = %e, "skipping unreadable run"),
            }
        }
        runs.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(runs)
    }

    pub fn delete_run(&mut self, run_id: &str) -> ResultsResult<()> {
        let run_dir = self.run_dir(run_id);
        if run_dir.exists() {
            fs::remove_dir_all(run_dir)?;
        }
        self.last_ticks.remove(run_id);
        Ok(())
    }
}

impl DataLogger for RunStore {
    fn begin_run(&mut self, record: &RunRecord) -> ResultsResult<()> {
        self.write_record(record)?;
        let series = self.run_dir(&record.run_id).join(SERIES_FILE);
        fs::write(series, "")?;
        self.last_ticks.insert(record.run_id.clone(), None);
        debug!(run_id = %record.run_id, dir = %self.root_dir.display(), "run stored");
        Ok(())
    }

    fn append(&mut self, rows: &[SeriesRow]) -> ResultsResult<()> {
        let Some(first) = rows.first() else {
            return Ok(());
        };
        let run_id = first.run_id.clone();
        let last = *self
            .last_ticks
            .get(&run_id)
            .ok_or_else(|| ResultsError::RunNotFound {
                run_id: run_id.clone(),
            })?;
        let next = check_order(&run_id, last, rows)?;

        let mut buf = String::new();
        for row in rows {
            buf.push_str(&serde_json::to_string(row)?);
            buf.push('\n');
        }
        let mut file = OpenOptions::new()
            .append(true)
            .open(self.run_dir(&run_id).join(SERIES_FILE))?;
        file.write_all(buf.as_bytes())?;

        self.last_ticks.insert(run_id, next);
        Ok(())
    }

    fn update_run(&mut self, record: &RunRecord) -> ResultsResult<()> {
        if !self.last_ticks.contains_key(&record.run_id) {
            return Err(ResultsError::RunNotFound {
                run_id: record.run_id.clone(),
            });
        }
        self.write_record(record)
    }
}
