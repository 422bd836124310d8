mod common;

use std::path::PathBuf;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use pf_alarms::AlarmId;
use pf_app::{AppError, NetworkSetup, Pacing, SimConfig, SimulationService};
use pf_controls::OperatorCommand;
use pf_physics::{Perturbation, PerturbationEvent};
use pf_results::{EntityRef, RunStatus, RunStore, SeriesKind};

use common::{junction_line, station_line, supply_line};

fn paced(speedup: f64) -> SimConfig {
    SimConfig {
        pacing: Pacing::RealTime { speedup },
        ..SimConfig::default()
    }
}

fn unique_temp_dir(prefix: &str) -> PathBuf {
    let mut dir = std::env::temp_dir();
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    dir.push(format!("{}_{}", prefix, nanos));
    dir
}

fn wait_for(what: &str, mut done: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while !done() {
        assert!(Instant::now() < deadline, "timed out waiting for {what}");
        std::thread::sleep(Duration::from_millis(5));
    }
}

#[test]
fn unpaced_run_completes_with_every_tick_logged() {
    let service = SimulationService::new();
    service
        .register_network("net", supply_line(100.0, 50.0), SimConfig::default())
        .unwrap();
    let run_id = service.start("net", 30.0, 1.0).unwrap();
    let record = service.wait(&run_id).unwrap();

    assert_eq!(record.status, RunStatus::Completed);
    assert_eq!(record.tick_index, Some(29));
    assert_eq!(record.sim_time_s, 29.0);

    let status = service.status(&run_id).unwrap();
    assert_eq!(status.status, RunStatus::Completed);

    let snapshot = service.snapshot("net").unwrap().unwrap();
    assert_eq!(snapshot.tick_index, 29);
    assert_eq!(service.controller_status("net").unwrap().len(), 8);
    assert!(!service.sensor_readings("net").unwrap().is_empty());

    let trace = service
        .memory()
        .trace(&run_id, &EntityRef::Pipe("P1".into()), SeriesKind::PipeFlow);
    assert_eq!(trace.len(), 30);
    assert_eq!(service.runs("net").unwrap().len(), 1);
}

#[test]
fn stop_is_observed_at_a_tick_boundary() {
    let service = SimulationService::new();
    service
        .register_network("net", supply_line(100.0, 50.0), paced(100.0))
        .unwrap();
    let run_id = service.start("net", 3600.0, 0.1).unwrap();
    std::thread::sleep(Duration::from_millis(50));
    service.stop(&run_id).unwrap();
    let record = service.wait(&run_id).unwrap();

    assert_eq!(record.status, RunStatus::Stopped);
    let last = record.tick_index.expect("some ticks ran");
    assert!(last < record.total_ticks - 1);

    let ticks: Vec<u64> = service
        .memory()
        .trace(&run_id, &EntityRef::Node("S".into()), SeriesKind::Pressure)
        .into_iter()
        .map(|(tick, _)| tick)
        .collect();
    assert_eq!(ticks, (0..=last).collect::<Vec<_>>());

    // Stopping again is harmless.
    service.stop(&run_id).unwrap();
    assert_eq!(service.status(&run_id).unwrap().status, RunStatus::Stopped);
}

#[test]
fn second_start_on_a_running_network_conflicts() {
    let service = SimulationService::new();
    service
        .register_network("net", supply_line(100.0, 50.0), paced(10.0))
        .unwrap();
    let first = service.start("net", 600.0, 1.0).unwrap();

    match service.start("net", 10.0, 1.0) {
        Err(AppError::ConcurrentRunConflict { network_id, run_id }) => {
            assert_eq!(network_id, "net");
            assert_eq!(run_id, first);
        }
        other => panic!("expected conflict, got {other:?}"),
    }
    assert!(matches!(
        service.register_network("net", junction_line(), SimConfig::default()),
        Err(AppError::ConcurrentRunConflict { .. })
    ));

    service.stop(&first).unwrap();
    service.wait(&first).unwrap();
    let second = service.start("net", 2.0, 1.0).unwrap();
    assert_ne!(first, second);
    assert_eq!(service.wait(&second).unwrap().status, RunStatus::Completed);
}

#[test]
fn unrepresentable_pacing_fails_the_run_and_frees_the_network() {
    let service = SimulationService::new();
    service
        .register_network("net", supply_line(100.0, 50.0), paced(1e-300))
        .unwrap();
    let run_id = service.start("net", 10.0, 1.0).unwrap();
    let record = service.wait(&run_id).unwrap();

    assert_eq!(record.status, RunStatus::Failed);
    assert!(record.failure.as_deref().is_some_and(|f| f.contains("pacing")));
    assert_eq!(record.tick_index, Some(0));
    assert_eq!(service.status(&run_id).unwrap().status, RunStatus::Failed);

    let again = service.start("net", 10.0, 1.0).unwrap();
    service.stop(&again).unwrap();
    assert!(service.wait(&again).unwrap().status.is_terminal());
    service
        .register_network("net", supply_line(100.0, 50.0), SimConfig::default())
        .unwrap();
    let last = service.start("net", 3.0, 1.0).unwrap();
    assert_eq!(service.wait(&last).unwrap().status, RunStatus::Completed);
}

#[test]
fn start_rejects_bad_requests() {
    let service = SimulationService::new();
    assert!(matches!(
        service.start("missing", 10.0, 1.0),
        Err(AppError::NetworkNotFound(_))
    ));

    service
        .register_network("net", supply_line(100.0, 50.0), SimConfig::default())
        .unwrap();
    for (duration, dt) in [(0.5, 1.0), (3601.0, 1.0), (10.0, 0.05), (10.0, 61.0), (f64::NAN, 1.0)] {
        assert!(
            matches!(
                service.start("net", duration, dt),
                Err(AppError::InvalidParameters(_))
            ),
            "duration {duration}, dt {dt}"
        );
    }
    assert!(service.runs("net").unwrap().is_empty());
    assert!(matches!(service.status("nope"), Err(AppError::RunNotFound(_))));
}

#[test]
fn commands_need_an_active_run() {
    let service = SimulationService::new();
    service
        .register_network("net", station_line(), paced(20.0))
        .unwrap();
    assert!(matches!(
        service.command("net", OperatorCommand::EmergencyShutdown),
        Err(AppError::NoActiveRun(_))
    ));
    assert!(matches!(
        service.command("other", OperatorCommand::EmergencyShutdown),
        Err(AppError::NetworkNotFound(_))
    ));

    let run_id = service.start("net", 600.0, 1.0).unwrap();
    assert!(matches!(
        service.command(
            "net",
            OperatorCommand::SetValve {
                pipe: "P9".into(),
                position: 0.5
            }
        ),
        Err(AppError::Control(_))
    ));

    service.command("net", OperatorCommand::EmergencyShutdown).unwrap();
    wait_for("shutdown", || {
        service
            .controller_status("net")
            .unwrap()
            .iter()
            .any(|c| c.id == "emergency_shutdown" && c.state != "normal")
    });
    wait_for("shutdown alarm", || {
        service
            .alarms("net", true)
            .unwrap()
            .iter()
            .any(|a| a.code == "EMERGENCY_SHUTDOWN")
    });

    service.stop(&run_id).unwrap();
    service.wait(&run_id).unwrap();
    assert!(matches!(
        service.command("net", OperatorCommand::Reset),
        Err(AppError::NoActiveRun(_))
    ));
}

#[test]
fn leak_alarm_can_be_acknowledged() {
    let service = SimulationService::new();
    let mut setup = NetworkSetup::new(junction_line(), SimConfig::default());
    setup.perturbations.push(Perturbation {
        at_s: 10.0,
        event: PerturbationEvent::Leak {
            node: "J".into(),
            rate_m3h: 30.0,
        },
    });
    service.register_setup("net", setup).unwrap();
    let run_id = service.start("net", 30.0, 1.0).unwrap();
    service.wait(&run_id).unwrap();

    let leak = service
        .alarms("net", true)
        .unwrap()
        .into_iter()
        .find(|a| a.code == "GAS_LEAK:J")
        .expect("leak alarm");
    assert_eq!(leak.id.run, run_id);
    assert!(leak.acknowledged_at.is_none());

    service.acknowledge_alarm(&leak.id).unwrap();
    service.acknowledge_alarm(&leak.id).unwrap();
    let acked = service
        .alarms("net", false)
        .unwrap()
        .into_iter()
        .find(|a| a.id == leak.id)
        .unwrap();
    assert_eq!(acked.acknowledged_at, Some(29.0));
    assert!(acked.is_active());

    let bogus = AlarmId {
        run: run_id.clone(),
        seq: 999,
    };
    assert!(matches!(
        service.acknowledge_alarm(&bogus),
        Err(AppError::AlarmNotFound(_))
    ));
    let foreign = AlarmId {
        run: "no-such-run".into(),
        seq: leak.id.seq,
    };
    assert!(matches!(
        service.acknowledge_alarm(&foreign),
        Err(AppError::AlarmNotFound(_))
    ));
}

#[test]
fn stored_runs_outlive_the_service() {
    let dir = unique_temp_dir("pf_app_store");
    let run_id = {
        let service = SimulationService::with_store(RunStore::new(dir.clone()).unwrap());
        service
            .register_network("net", supply_line(60.0, 40.0), SimConfig::default())
            .unwrap();
        let run_id = service.start("net", 5.0, 0.5).unwrap();
        service.wait(&run_id).unwrap();
        run_id
    };

    let service = SimulationService::with_store(RunStore::new(dir.clone()).unwrap());
    let record = service.run_record(&run_id).unwrap();
    assert_eq!(record.status, RunStatus::Completed);
    assert_eq!(record.total_ticks, 10);
    assert_eq!(record.tick_index, Some(9));

    let series = service.series(&run_id).unwrap();
    assert!(series.iter().all(|r| r.run_id == run_id));
    assert_eq!(series.last().map(|r| r.tick_index), Some(9));

    let _ = std::fs::remove_dir_all(&dir);
}
