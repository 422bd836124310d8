//! Explicit per-run state and the single-tick pipeline.

use std::sync::Arc;

use parking_lot::Mutex;
use pf_alarms::AlarmManager;
use pf_controls::{ControllerRuntime, OperatorCommand, SensorFrame, SensorSampler, TickInput};
use pf_core::units::{k_to_degc, m3ps_to_m3ph, pa_to_bar};
use pf_network::{NetworkTopology, NodeKind};
use pf_physics::{CommandSet, NetworkState, Perturbation, PerturbationSchedule, PhysicsModel};
use pf_results::{DataLogger, EntityRef, RunId, RunRecord, RunStatus, SeriesKind, SeriesRow};
use tracing::{debug, info};

use crate::config::SimConfig;
use crate::error::{AppError, AppResult};
use crate::params::RunParams;
use crate::scenario::ScheduledCommand;
use crate::snapshot::{ControllerStatus, TickSnapshot};

pub struct RunContext {
    network_id: String,
    topology: Arc<NetworkTopology>,
    params: RunParams,
    model: PhysicsModel,
    sampler: SensorSampler,
    runtime: ControllerRuntime,
    alarms: Arc<Mutex<AlarmManager>>,
    logger: Box<dyn DataLogger>,
    perturbations: PerturbationSchedule,
    scheduled: Vec<ScheduledCommand>,
    state: NetworkState,
    applied: CommandSet,
    record: RunRecord,
    next_tick: u64,
}

impl RunContext {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        run_id: RunId,
        network_id: impl Into<String>,
        topology: Arc<NetworkTopology>,
        config: &SimConfig,
        params: RunParams,
        perturbations: Vec<Perturbation>,
        mut scheduled: Vec<ScheduledCommand>,
        logger: Box<dyn DataLogger>,
    ) -> AppResult<Self> {
        params.validate()?;
        config.validate()?;
        let network_id = network_id.into();

        let perturbations = PerturbationSchedule::new(perturbations);
        perturbations.validate(&topology)?;
        for s in &scheduled {
            s.command.validate(&topology)?;
        }
        scheduled.sort_by(|a, b| a.at_s.total_cmp(&b.at_s));

        let model = PhysicsModel::new(topology.clone(), config.physics.clone())?;
        let sampler = SensorSampler::new(&topology, &config.sensors, config.seed);
        let runtime = ControllerRuntime::new(&topology, &config.controllers)?;
        let state = NetworkState::initial(&topology);
        let alarms = Arc::new(Mutex::new(AlarmManager::new(run_id.clone(), config.alarms)));
        let record = RunRecord::new(
            run_id,
            network_id.clone(),
            params.duration_s,
            params.dt_s,
            params.total_ticks(),
        );

        Ok(Self {
            network_id,
            topology,
            params,
            model,
            sampler,
            runtime,
            alarms,
            logger,
            perturbations,
            scheduled,
            state,
            applied: CommandSet::new(),
            record,
            next_tick: 0,
        })
    }

    pub fn run_id(&self) -> &str {
        &self.record.run_id
    }

    pub fn params(&self) -> RunParams {
        self.params
    }

    pub fn record(&self) -> &RunRecord {
        &self.record
    }

    pub fn state(&self) -> &NetworkState {
        &self.state
    }

    pub fn runtime(&self) -> &ControllerRuntime {
        &self.runtime
    }

    pub fn alarms(&self) -> Arc<Mutex<AlarmManager>> {
        self.alarms.clone()
    }

    pub fn next_tick(&self) -> u64 {
        self.next_tick
    }

    pub fn is_finished(&self) -> bool {
        self.next_tick >= self.record.total_ticks
    }

    /// Persist the pending record.
    pub fn begin(&mut self) -> AppResult<()> {
        self.logger.begin_run(&self.record)?;
        Ok(())
    }

    /// Record a lifecycle change and persist it.
    pub fn transition(&mut self, status: RunStatus) -> AppResult<()> {
        info!(run_id = %self.record.run_id, from = %self.record.status, to = %status, "run status");
        self.record.transition(status);
        self.logger.update_run(&self.record)?;
        Ok(())
    }

    pub fn fail(&mut self, reason: &str) -> AppResult<()> {
        self.record.fail(reason);
        self.logger.update_run(&self.record)?;
        Ok(())
    }

    /// Execute exactly one tick.
    pub fn step(&mut self, operator: &[OperatorCommand]) -> AppResult<TickSnapshot> {
        self.step_with(operator, |_, _| {}).map(Arc::unwrap_or_clone)
    }

    /// Execute one tick and hand the result to `publish` before the alarm
    /// changes of the tick become visible to other holders of `alarms()`.
    ///
    /// Alarms are reconciled on a copy of the manager. The copy replaces the
    /// shared manager only once the tick's rows are logged, so a tick that
    /// fails to log leaves no alarm behind.
    pub fn step_with(
        &mut self,
        operator: &[OperatorCommand],
        publish: impl FnOnce(&Arc<TickSnapshot>, &RunRecord),
    ) -> AppResult<Arc<TickSnapshot>> {
        if self.is_finished() {
            return Err(AppError::InvalidParameters(format!(
                "run {} already completed {} ticks",
                self.record.run_id, self.record.total_ticks
            )));
        }
        let k = self.next_tick;
        let t = self.params.sim_time(k);
        let topology = self.topology.clone();

        let due = self
            .scheduled
            .iter()
            .take_while(|s| s.at_s <= t + 1e-9)
            .count();
        let mut commands: Vec<OperatorCommand> =
            self.scheduled.drain(..due).map(|s| s.command).collect();
        commands.extend_from_slice(operator);

        if k > 0 {
            let mut state = self.state.clone();
            self.perturbations.apply_due(t, &topology, &mut state)?;
            self.state = self.model.advance(&state, &self.applied, self.params.dt_s)?;
        }

        let frame = self.sampler.sample(&topology, &self.state, t);
        let control = self.runtime.tick(&TickInput {
            t,
            model: &self.model,
            state: &self.state,
            sensors: &frame,
            operator: &commands,
        });

        // Held until the tick is published; acknowledgements wait for it.
        let mut shared_alarms = self.alarms.lock();
        let mut alarms = shared_alarms.clone();
        for scan in &control.scans {
            let summary = alarms.reconcile(scan.kind.id(), &scan.alarms, t);
            if !summary.raised.is_empty() || !summary.cleared.is_empty() {
                debug!(
                    controller = %scan.kind,
                    raised = summary.raised.len(),
                    cleared = summary.cleared.len(),
                    "alarms reconciled"
                );
            }
        }
        let controllers: Vec<ControllerStatus> = self
            .runtime
            .slots()
            .iter()
            .map(|slot| ControllerStatus::from_slot(slot, alarms.active_count(slot.kind().id())))
            .collect();
        let active_alarms: Vec<_> = alarms.active().cloned().collect();

        let rows = series_rows(&self.record.run_id, k, t, &topology, &self.state, &frame);
        self.logger.append(&rows)?;

        self.applied = control.commands.clone();
        self.record.tick_index = Some(k);
        self.record.sim_time_s = t;
        self.next_tick += 1;

        let snapshot = Arc::new(TickSnapshot {
            run_id: self.record.run_id.clone(),
            network_id: self.network_id.clone(),
            tick_index: k,
            sim_time_s: t,
            state: self.state.clone(),
            readings: frame.readings().to_vec(),
            controllers,
            commands: control.commands,
            interlock: control.interlock,
            active_alarms,
        });
        *shared_alarms = alarms;
        publish(&snapshot, &self.record);
        drop(shared_alarms);
        Ok(snapshot)
    }
}

/// Tracked values of one tick.
fn series_rows(
    run_id: &str,
    tick: u64,
    t: f64,
    topology: &NetworkTopology,
    state: &NetworkState,
    frame: &SensorFrame,
) -> Vec<SeriesRow> {
    let row = |entity: EntityRef, kind: SeriesKind, value: f64| SeriesRow {
        run_id: run_id.to_string(),
        tick_index: tick,
        sim_time_s: t,
        entity,
        kind,
        value,
    };

    let mut rows = Vec::new();
    for (node, ns) in topology.nodes().iter().zip(&state.nodes) {
        let entity = || EntityRef::Node(node.name.clone());
        rows.push(row(entity(), SeriesKind::Pressure, pa_to_bar(ns.pressure_pa)));
        rows.push(row(entity(), SeriesKind::Temperature, k_to_degc(ns.temperature_k)));
        rows.push(row(entity(), SeriesKind::NetFlow, m3ps_to_m3ph(ns.net_flow_m3ps)));
        if node.kind() == NodeKind::Compressor {
            rows.push(row(entity(), SeriesKind::CompressorSpeed, ns.speed));
        }
    }
    for (pipe, ps) in topology.pipes().iter().zip(&state.pipes) {
        let entity = || EntityRef::Pipe(pipe.name.clone());
        rows.push(row(entity(), SeriesKind::PipeFlow, m3ps_to_m3ph(ps.flow_m3ps)));
        rows.push(row(entity(), SeriesKind::ValvePosition, ps.valve_position));
    }
    for reading in frame.readings() {
        if let Some(value) = reading.good_value() {
            rows.push(row(
                EntityRef::Sensor(reading.sensor_id.clone()),
                SeriesKind::Reading,
                value,
            ));
        }
    }
    rows
}
