//! End-to-end behaviour of single runs, driven tick by tick.

mod common;

use std::sync::Arc;

use pf_app::{RunContext, RunParams, Scenario, ScheduledCommand, SimConfig};
use pf_controls::OperatorCommand;
use pf_core::units::pa_to_bar;
use pf_physics::{CompressorMode, Perturbation, PerturbationEvent};
use pf_results::{
    DataLogger, EntityRef, MemoryLogger, ResultsError, ResultsResult, RunRecord, SeriesKind, SeriesRow,
};
use proptest::prelude::*;

use common::{context, junction_line, station_line, supply_line};

#[test]
fn steady_supply_settles_without_alarms() {
    let topology = supply_line(100.0, 50.0);
    let s = topology.node_by_name("S").unwrap().id;
    let d = topology.node_by_name("D").unwrap().id;
    let (mut ctx, logger) = context(topology, &SimConfig::default(), 60.0, 1.0, vec![], vec![]);

    let mut last = None;
    while !ctx.is_finished() {
        last = Some(ctx.step(&[]).unwrap());
    }
    let last = last.unwrap();
    assert_eq!(last.tick_index, 59);

    for node in [s, d] {
        let p = pa_to_bar(last.state.nodes[node.slot()].pressure_pa);
        assert!((p - 100.0).abs() <= 1.0, "node pressure {p} bar");
    }
    assert!(ctx.alarms().lock().all().is_empty());
    assert!(last.active_alarms.is_empty());

    let trace = logger.trace("test-run", &EntityRef::Node("D".into()), SeriesKind::Pressure);
    assert_eq!(trace.len(), 60);
}

#[test]
fn demand_step_reaches_flow_command_at_next_scan() {
    let topology = supply_line(100.0, 50.0);
    let d = topology.node_by_name("D").unwrap().id;
    let mut config = SimConfig::default();
    config.controllers.flow.scan_interval_s = 5.0;
    let step = Perturbation {
        at_s: 31.0,
        event: PerturbationEvent::DemandStep {
            sink: "D".into(),
            demand_m3h: 80.0,
        },
    };
    let (mut ctx, _) = context(topology, &config, 40.0, 1.0, vec![step], vec![]);

    let mut valve = Vec::new();
    while !ctx.is_finished() {
        let snap = ctx.step(&[]).unwrap();
        valve.push(snap.commands.sink_valve(d).unwrap());
    }

    for k in 31..35 {
        assert_eq!(valve[k], valve[30], "valve command moved at tick {k}");
    }
    assert!(valve[35] > valve[34] + 0.01);
}

#[test]
fn sustained_imbalance_raises_one_leak_alarm() {
    let leak = Perturbation {
        at_s: 20.0,
        event: PerturbationEvent::Leak {
            node: "J".into(),
            rate_m3h: 30.0,
        },
    };
    let (mut ctx, _) = context(junction_line(), &SimConfig::default(), 40.0, 1.0, vec![leak], vec![]);
    while !ctx.is_finished() {
        ctx.step(&[]).unwrap();
    }

    let alarms = ctx.alarms();
    let alarms = alarms.lock();
    let leaks: Vec<_> = alarms
        .all()
        .iter()
        .filter(|a| a.code.starts_with("GAS_LEAK"))
        .collect();
    assert_eq!(leaks.len(), 1);
    assert_eq!(leaks[0].code, "GAS_LEAK:J");
    assert_eq!(leaks[0].raised_at, 22.0);
    assert!(leaks[0].is_active());
    assert_eq!(leaks[0].severity, pf_alarms::Severity::Critical);
}

#[test]
fn operator_shutdown_stops_compressors_and_ignores_early_reset() {
    let topology = station_line();
    let c = topology.node_by_name("C").unwrap().id;
    let (mut ctx, _) = context(topology, &SimConfig::default(), 60.0, 1.0, vec![], vec![]);

    for _ in 0..10 {
        ctx.step(&[]).unwrap();
    }
    let tripped = ctx.step(&[OperatorCommand::EmergencyShutdown]).unwrap();
    assert_eq!(tripped.tick_index, 10);
    assert_eq!(
        tripped.commands.compressor(c).map(|(mode, _)| mode),
        Some(CompressorMode::Stopping)
    );
    for pipe in 0..3 {
        assert_eq!(tripped.commands.pipe_valve(pf_core::Id::from_index(pipe)), Some(0.0));
    }
    let esd_alarm = tripped
        .active_alarms
        .iter()
        .find(|a| a.code == "EMERGENCY_SHUTDOWN")
        .expect("shutdown alarm");
    assert_eq!(esd_alarm.severity, pf_alarms::Severity::Critical);
    assert_eq!(esd_alarm.raised_at, 10.0);

    let next = ctx.step(&[OperatorCommand::Reset]).unwrap();
    assert!(matches!(
        next.state.nodes[c.slot()].compressor_mode,
        CompressorMode::Stopping | CompressorMode::Idle
    ));
    let esd = next
        .controllers
        .iter()
        .find(|s| s.id == "emergency_shutdown")
        .unwrap();
    assert_eq!(esd.state, "tripped");
}

#[test]
fn scheduled_commands_are_delivered_at_their_tick() {
    let set_valve = ScheduledCommand {
        at_s: 5.0,
        command: OperatorCommand::SetValve {
            pipe: "P1".into(),
            position: 0.5,
        },
    };
    let (mut ctx, _) = context(junction_line(), &SimConfig::default(), 20.0, 1.0, vec![], vec![set_valve]);
    let p1 = pf_core::Id::from_index(0);
    let mut commands = Vec::new();
    while !ctx.is_finished() {
        commands.push(ctx.step(&[]).unwrap().commands.pipe_valve(p1).unwrap());
    }
    assert_eq!(commands[4], 1.0);
    assert!((commands[5] - 0.95).abs() < 1e-9);
    assert!((commands[19] - 0.5).abs() < 1e-9);
}

#[test]
fn demo_scenario_runs_end_to_end() {
    let scenario =
        Scenario::from_yaml_str(include_str!("../../../demos/station_leak.yaml")).unwrap();
    let topology = scenario.validate().unwrap();
    let params: RunParams = scenario.run.unwrap();
    let logger = MemoryLogger::new();
    let mut ctx = RunContext::new(
        "demo-run".to_string(),
        scenario.network.id.clone(),
        Arc::new(topology),
        &scenario.config,
        params,
        scenario.perturbations.clone(),
        scenario.commands.clone(),
        Box::new(logger.clone()),
    )
    .unwrap();
    ctx.begin().unwrap();
    while !ctx.is_finished() {
        ctx.step(&[]).unwrap();
    }

    assert_eq!(logger.last_tick("demo-run"), Some(299));
    let alarms = ctx.alarms();
    let alarms = alarms.lock();
    assert!(alarms.all().iter().any(|a| a.code == "GAS_LEAK:J1"));
    assert!(
        alarms
            .active()
            .any(|a| a.code == "EMERGENCY_SHUTDOWN" && a.raised_at <= 240.0)
    );
}

/// Memory logger whose append fails once the run reaches `fail_at`.
struct FailingLogger {
    inner: MemoryLogger,
    fail_at: u64,
}

impl DataLogger for FailingLogger {
    fn begin_run(&mut self, record: &RunRecord) -> ResultsResult<()> {
        self.inner.begin_run(record)
    }

    fn append(&mut self, rows: &[SeriesRow]) -> ResultsResult<()> {
        if rows.iter().any(|r| r.tick_index >= self.fail_at) {
            return Err(ResultsError::Io(std::io::Error::other("disk full")));
        }
        self.inner.append(rows)
    }

    fn update_run(&mut self, record: &RunRecord) -> ResultsResult<()> {
        self.inner.update_run(record)
    }
}

#[test]
fn tick_that_fails_to_log_leaves_no_alarms() {
    let logger = MemoryLogger::new();
    let mut ctx = RunContext::new(
        "failing-run".to_string(),
        "test-net",
        Arc::new(station_line()),
        &SimConfig::default(),
        RunParams::new(20.0, 1.0).unwrap(),
        vec![],
        vec![],
        Box::new(FailingLogger {
            inner: logger.clone(),
            fail_at: 5,
        }),
    )
    .unwrap();
    ctx.begin().unwrap();
    for _ in 0..5 {
        ctx.step(&[]).unwrap();
    }

    let mut published = 0;
    let result = ctx.step_with(&[OperatorCommand::EmergencyShutdown], |_, _| published += 1);
    assert!(result.is_err());
    assert_eq!(published, 0);

    assert_eq!(ctx.record().tick_index, Some(4));
    assert_eq!(ctx.next_tick(), 5);
    assert_eq!(logger.last_tick("failing-run"), Some(4));
    let alarms = ctx.alarms();
    let alarms = alarms.lock();
    assert!(alarms.all().iter().all(|a| a.raised_at < 5.0));
    assert!(!alarms.all().iter().any(|a| a.code == "EMERGENCY_SHUTDOWN"));
}

#[test]
fn published_tick_matches_its_record() {
    let (mut ctx, _) = context(junction_line(), &SimConfig::default(), 10.0, 1.0, vec![], vec![]);
    for k in 0..10u64 {
        let mut seen = None;
        let snapshot = ctx
            .step_with(&[], |snap, record| {
                seen = Some((snap.tick_index, record.tick_index, record.sim_time_s))
            })
            .unwrap();
        assert_eq!(seen, Some((k, Some(k), k as f64)));
        assert_eq!(snapshot.tick_index, k);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(12))]

    #[test]
    fn tick_count_and_times_are_exact(duration in 1.0f64..120.0, dt in 0.1f64..60.0) {
        let (mut ctx, logger) =
            context(supply_line(60.0, 40.0), &SimConfig::default(), duration, dt, vec![], vec![]);
        let expected = (duration / dt - 1e-9).ceil().max(1.0) as u64;

        let mut k = 0u64;
        while !ctx.is_finished() {
            let snap = ctx.step(&[]).unwrap();
            prop_assert_eq!(snap.tick_index, k);
            prop_assert_eq!(snap.sim_time_s, k as f64 * dt);
            k += 1;
        }
        prop_assert_eq!(k, expected);

        let ticks: Vec<u64> = logger
            .trace("test-run", &EntityRef::Node("S".into()), SeriesKind::Pressure)
            .into_iter()
            .map(|(tick, _)| tick)
            .collect();
        prop_assert_eq!(ticks, (0..expected).collect::<Vec<_>>());
    }
}
