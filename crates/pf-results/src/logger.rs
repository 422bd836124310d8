//! The logging contract every run sink implements.

use crate::types::{RunRecord, SeriesRow};
use crate::{ResultsError, ResultsResult};

/// Append-only sink for run records and time-series rows.
///
/// Rows of a run arrive tick by tick starting at 0, without gaps; a batch may
/// hold several rows of the same tick. Rows already accepted are never changed.
pub trait DataLogger: Send {
    fn begin_run(&mut self, record: &RunRecord) -> ResultsResult<()>;

    fn append(&mut self, rows: &[SeriesRow]) -> ResultsResult<()>;

    fn update_run(&mut self, record: &RunRecord) -> ResultsResult<()>;
}

/// Check that `rows` continue right after tick `last` and return the new last tick.
pub(crate) fn check_order(
    run_id: &str,
    last: Option<u64>,
    rows: &[SeriesRow],
) -> ResultsResult<Option<u64>> {
    let mut current = last;
    for row in rows {
        if current == Some(row.tick_index) && current != last {
            continue;
        }
        if let Some(bound) = current
            && row.tick_index <= bound
        {
            return Err(ResultsError::OutOfOrder {
                run_id: run_id.to_string(),
                tick: row.tick_index,
                last: bound,
            });
        }
        let expected = current.map_or(0, |k| k + 1);
        if row.tick_index != expected {
            return Err(ResultsError::TickGap {
                run_id: run_id.to_string(),
                tick: row.tick_index,
                expected,
            });
        }
        current = Some(row.tick_index);
    }
    Ok(current)
}

/// Fan out every call to several loggers, in order.
#[derive(Default)]
pub struct LoggerSet {
    loggers: Vec<Box<dyn DataLogger>>,
}

impl LoggerSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, logger: impl DataLogger + 'static) -> Self {
        self.loggers.push(Box::new(logger));
        self
    }

    pub fn len(&self) -> usize {
        self.loggers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.loggers.is_empty()
    }
}

impl DataLogger for LoggerSet {
    fn begin_run(&mut self, record: &RunRecord) -> ResultsResult<()> {
        self.loggers.iter_mut().try_for_each(|l| l.begin_run(record))
    }

    fn append(&mut self, rows: &[SeriesRow]) -> ResultsResult<()> {
        self.loggers.iter_mut().try_for_each(|l| l.append(rows))
    }

    fn update_run(&mut self, record: &RunRecord) -> ResultsResult<()> {
        self.loggers.iter_mut().try_for_each(|l| l.update_run(record))
    }
}
