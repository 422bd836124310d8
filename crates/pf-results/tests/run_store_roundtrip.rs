use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use pf_results::{
    DataLogger, EntityRef, RunRecord, RunStatus, RunStore, ResultsError, SeriesKind, SeriesRow,
};

fn unique_temp_dir(prefix: &str) -> PathBuf {
    let mut dir = std::env::temp_dir();
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    dir.push(format!("{}_{}", prefix, nanos));
    dir
}

fn rows(run_id: &str, tick: u64) -> Vec<SeriesRow> {
    ["S", "D"]
        .iter()
        .map(|node| SeriesRow {
            run_id: run_id.to_string(),
            tick_index: tick,
            sim_time_s: tick as f64 * 0.5,
            entity: EntityRef::Node(node.to_string()),
            kind: SeriesKind::Pressure,
            value: 50.0 - tick as f64,
        })
        .collect()
}

#[test]
fn begin_append_update_load() {
    let dir = unique_temp_dir("pf_results_roundtrip");
    let mut store = RunStore::new(dir.clone()).expect("failed to create run store");

    let mut record = RunRecord::new("run-1", "net-a", 2.0, 0.5, 4);
    store.begin_run(&record).unwrap();
    record.transition(RunStatus::Running);
    store.update_run(&record).unwrap();

    for tick in 0..4 {
        store.append(&rows("run-1", tick)).unwrap();
        record.tick_index = Some(tick);
        record.sim_time_s = tick as f64 * 0.5;
    }
    record.transition(RunStatus::Completed);
    store.update_run(&record).unwrap();

    let loaded = store.load_run("run-1").unwrap();
    assert_eq!(loaded.status, RunStatus::Completed);
    assert_eq!(loaded.tick_index, Some(3));

    let series = store.load_series("run-1").unwrap();
    assert_eq!(series.len(), 8);
    assert!(series.windows(2).all(|w| w[0].tick_index <= w[1].tick_index));
    assert_eq!(series[7].value, 47.0);

    let _ = fs::remove_dir_all(dir);
}

#[test]
fn out_of_order_tick_is_rejected_and_nothing_written() {
    let dir = unique_temp_dir("pf_results_order");
    let mut store = RunStore::new(dir.clone()).unwrap();
    store
        .begin_run(&RunRecord::new("run-o", "net", 1.0, 1.0, 1))
        .unwrap();
    store.append(&rows("run-o", 0)).unwrap();
    store.append(&rows("run-o", 1)).unwrap();

    let err = store.append(&rows("run-o", 1)).unwrap_err();
    assert!(matches!(err, ResultsError::OutOfOrder { tick: 1, last: 1, .. }));
    assert_eq!(store.load_series("run-o").unwrap().len(), 4);

    let _ = fs::remove_dir_all(dir);
}

#[test]
fn reader_skips_partial_trailing_line() {
    let dir = unique_temp_dir("pf_results_partial");
    let mut store = RunStore::new(dir.clone()).unwrap();
    store
        .begin_run(&RunRecord::new("run-p", "net", 1.0, 1.0, 1))
        .unwrap();
    store.append(&rows("run-p", 0)).unwrap();

    let mut file = OpenOptions::new()
        .append(true)
        .open(dir.join("run-p").join("timeseries.jsonl"))
        .unwrap();
    file.write_all(br#"{"run_id":"run-p","tick_ind"#).unwrap();
    drop(file);

    assert_eq!(store.load_series("run-p").unwrap().len(), 2);

    let _ = fs::remove_dir_all(dir);
}

#[test]
fn list_runs_by_network() {
    let dir = unique_temp_dir("pf_results_list");
    let mut store = RunStore::new(dir.clone()).unwrap();
    for (run, net) in [("r1", "a"), ("r2", "a"), ("r3", "b")] {
        store.begin_run(&RunRecord::new(run, net, 1.0, 1.0, 1)).unwrap();
    }

    let a = store.list_runs("a").unwrap();
    assert_eq!(a.len(), 2);
    assert!(a.iter().all(|r| r.network_id == "a"));
    assert_eq!(store.list_runs("b").unwrap().len(), 1);
    assert!(store.list_runs("c").unwrap().is_empty());

    assert!(matches!(
        store.load_run("missing"),
        Err(ResultsError::RunNotFound { .. })
    ));

    let _ = fs::remove_dir_all(dir);
}

#[test]
fn skipped_tick_is_rejected_and_nothing_written() {
    let dir = unique_temp_dir("pf_results_gap");
    let mut store = RunStore::new(dir.clone()).unwrap();
    store
        .begin_run(&RunRecord::new("run-g", "net", 5.0, 1.0, 5))
        .unwrap();
    store.append(&rows("run-g", 0)).unwrap();

    let err = store.append(&rows("run-g", 2)).unwrap_err();
    assert!(matches!(err, ResultsError::TickGap { tick: 2, expected: 1, .. }));
    store.append(&rows("run-g", 1)).unwrap();
    assert_eq!(store.load_series("run-g").unwrap().len(), 4);

    let _ = fs::remove_dir_all(dir);
}

#[test]
fn rewrite_run_needs_a_stored_run() {
    let dir = unique_temp_dir("pf_results_rewrite");
    let mut store = RunStore::new(dir.clone()).unwrap();
    let mut record = RunRecord::new("run-w", "net", 1.0, 1.0, 1);
    assert!(matches!(
        store.rewrite_run(&record),
        Err(ResultsError::RunNotFound { .. })
    ));

    store.begin_run(&record).unwrap();
    record.fail("loop died");
    RunStore::new(dir.clone()).unwrap().rewrite_run(&record).unwrap();
    let loaded = store.load_run("run-w").unwrap();
    assert_eq!(loaded.status, RunStatus::Failed);
    assert_eq!(loaded.failure.as_deref(), Some("loop died"));

    let _ = fs::remove_dir_all(dir);
}
