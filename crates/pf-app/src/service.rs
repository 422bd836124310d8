//! Simulation service: network registry, run lifecycle and read API.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::mpsc::{self, Sender};
use std::thread::JoinHandle;

use parking_lot::Mutex;
use pf_alarms::{Alarm, AlarmId, AlarmManager};
use pf_controls::{OperatorCommand, SensorReading};
use pf_network::NetworkTopology;
use pf_physics::Perturbation;
use pf_results::{
    DataLogger, LoggerSet, MemoryLogger, RunId, RunRecord, RunStatus, RunStore, SeriesRow,
};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::SimConfig;
use crate::context::RunContext;
use crate::error::{AppError, AppResult};
use crate::params::RunParams;
use crate::run_loop::{LoopCommand, RunShared, run_loop};
use crate::scenario::{Scenario, ScheduledCommand};
use crate::snapshot::{ControllerStatus, TickSnapshot};

/// Everything needed to start runs on one network.
#[derive(Debug, Clone)]
pub struct NetworkSetup {
    pub topology: Arc<NetworkTopology>,
    pub config: SimConfig,
    pub perturbations: Vec<Perturbation>,
    pub commands: Vec<ScheduledCommand>,
}

impl NetworkSetup {
    pub fn new(topology: NetworkTopology, config: SimConfig) -> Self {
        Self {
            topology: Arc::new(topology),
            config,
            perturbations: Vec::new(),
            commands: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RunStatusView {
    pub status: RunStatus,
    pub tick_index: Option<u64>,
    pub sim_time_s: f64,
}

struct RunEntry {
    network_id: String,
    control: Sender<LoopCommand>,
    shared: Arc<RunShared>,
    alarms: Arc<Mutex<AlarmManager>>,
    thread: Option<JoinHandle<RunRecord>>,
}

impl RunEntry {
    fn is_terminal(&self) -> bool {
        self.shared.record().status.is_terminal()
    }

    /// The loop thread exited without leaving a terminal status behind.
    fn loop_died(&self) -> bool {
        !self.is_terminal() && self.thread.as_ref().is_some_and(JoinHandle::is_finished)
    }
}

const LOOP_DIED: &str = "run loop exited without a final status";

#[derive(Default)]
struct Registry {
    networks: HashMap<String, NetworkSetup>,
    runs: HashMap<RunId, RunEntry>,
    /// Most recent run per network.
    latest: HashMap<String, RunId>,
}

impl Registry {
    fn latest_run(&self, network_id: &str) -> AppResult<Option<&RunEntry>> {
        if !self.networks.contains_key(network_id) {
            return Err(AppError::NetworkNotFound(network_id.to_string()));
        }
        Ok(self.latest.get(network_id).and_then(|id| self.runs.get(id)))
    }
}

/// Front door for every client of the simulator.
pub struct SimulationService {
    registry: Mutex<Registry>,
    memory: MemoryLogger,
    store: Option<RunStore>,
}

impl Default for SimulationService {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulationService {
    /// Service keeping results in memory only.
    pub fn new() -> Self {
        Self {
            registry: Mutex::new(Registry::default()),
            memory: MemoryLogger::new(),
            store: None,
        }
    }

    /// Service that also persists every run under `store`.
    pub fn with_store(store: RunStore) -> Self {
        Self {
            registry: Mutex::new(Registry::default()),
            memory: MemoryLogger::new(),
            store: Some(store),
        }
    }

    pub fn memory(&self) -> &MemoryLogger {
        &self.memory
    }

    pub fn register_network(
        &self,
        network_id: impl Into<String>,
        topology: NetworkTopology,
        config: SimConfig,
    ) -> AppResult<()> {
        self.register_setup(network_id, NetworkSetup::new(topology, config))
    }

    pub fn register_scenario(&self, scenario: &Scenario) -> AppResult<String> {
        let topology = scenario.validate()?;
        let setup = NetworkSetup {
            topology: Arc::new(topology),
            config: scenario.config.clone(),
            perturbations: scenario.perturbations.clone(),
            commands: scenario.commands.clone(),
        };
        self.register_setup(scenario.network.id.clone(), setup)?;
        Ok(scenario.network.id.clone())
    }

    /// Register or replace a network. Replacing is refused while it runs.
    pub fn register_setup(&self, network_id: impl Into<String>, setup: NetworkSetup) -> AppResult<()> {
        let network_id = network_id.into();
        setup.config.validate()?;
        let mut registry = self.registry.lock();
        if let Some(run_id) = registry.latest.get(&network_id)
            && registry.runs.get(run_id).is_some_and(|e| self.is_active(e))
        {
            return Err(AppError::ConcurrentRunConflict {
                network_id,
                run_id: run_id.clone(),
            });
        }
        info!(network_id, nodes = setup.topology.nodes().len(), pipes = setup.topology.pipes().len(), "network registered");
        registry.networks.insert(network_id, setup);
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Control
    // ---------------------------------------------------------------------

    pub fn start(&self, network_id: &str, duration_s: f64, dt_s: f64) -> AppResult<RunId> {
        let mut registry = self.registry.lock();
        let setup = registry
            .networks
            .get(network_id)
            .cloned()
            .ok_or_else(|| AppError::NetworkNotFound(network_id.to_string()))?;
        let params = RunParams::new(duration_s, dt_s)?;

        if let Some(run_id) = registry.latest.get(network_id)
            && registry.runs.get(run_id).is_some_and(|e| self.is_active(e))
        {
            return Err(AppError::ConcurrentRunConflict {
                network_id: network_id.to_string(),
                run_id: run_id.clone(),
            });
        }

        let run_id: RunId = Uuid::new_v4().to_string();
        let mut loggers = LoggerSet::new().with(self.memory.clone());
        if let Some(store) = &self.store {
            loggers = loggers.with(store.clone());
        }

        let mut ctx = RunContext::new(
            run_id.clone(),
            network_id,
            setup.topology.clone(),
            &setup.config,
            params,
            setup.perturbations.clone(),
            setup.commands.clone(),
            Box::new(loggers),
        )?;
        ctx.begin()?;

        let shared = Arc::new(RunShared::new(ctx.record().clone()));
        let alarms = ctx.alarms();
        let (tx, rx) = mpsc::channel();
        let pacing = setup.config.pacing;
        let loop_shared = shared.clone();
        let thread = std::thread::Builder::new()
            .name(format!("pipeflow-run-{network_id}"))
            .spawn(move || run_loop(ctx, rx, loop_shared, pacing))?;

        info!(run_id, network_id, duration_s, dt_s, ticks = params.total_ticks(), "run started");
        registry.runs.insert(
            run_id.clone(),
            RunEntry {
                network_id: network_id.to_string(),
                control: tx,
                shared,
                alarms,
                thread: Some(thread),
            },
        );
        registry.latest.insert(network_id.to_string(), run_id.clone());
        Ok(run_id)
    }

    /// Ask a run to stop at its next tick boundary. Stopping a finished run
    /// is a no-op.
    pub fn stop(&self, run_id: &str) -> AppResult<()> {
        let registry = self.registry.lock();
        let entry = registry
            .runs
            .get(run_id)
            .ok_or_else(|| AppError::RunNotFound(run_id.to_string()))?;
        if self.is_active(entry) && entry.control.send(LoopCommand::Stop).is_err() {
            warn!(run_id, "run loop already gone");
        }
        Ok(())
    }

    pub fn status(&self, run_id: &str) -> AppResult<RunStatusView> {
        let record = self.run_record(run_id)?;
        Ok(RunStatusView {
            status: record.status,
            tick_index: record.tick_index,
            sim_time_s: record.sim_time_s,
        })
    }

    /// Block until the run's thread exits and return its final record.
    pub fn wait(&self, run_id: &str) -> AppResult<RunRecord> {
        let thread = {
            let mut registry = self.registry.lock();
            let entry = registry
                .runs
                .get_mut(run_id)
                .ok_or_else(|| AppError::RunNotFound(run_id.to_string()))?;
            entry.thread.take()
        };
        let Some(handle) = thread else {
            return self.run_record(run_id);
        };
        let joined = handle.join();
        let registry = self.registry.lock();
        let entry = registry
            .runs
            .get(run_id)
            .ok_or_else(|| AppError::RunNotFound(run_id.to_string()))?;
        match joined {
            Ok(record) => Ok(record),
            Err(_) => {
                self.abandon(entry);
                Err(AppError::Thread(format!("run {run_id} panicked")))
            }
        }
    }

    /// Deliver an operator command to the active run of a network.
    pub fn command(&self, network_id: &str, command: OperatorCommand) -> AppResult<()> {
        let registry = self.registry.lock();
        let setup = registry
            .networks
            .get(network_id)
            .ok_or_else(|| AppError::NetworkNotFound(network_id.to_string()))?;
        command.validate(&setup.topology)?;
        let entry = registry
            .latest_run(network_id)?
            .filter(|e| self.is_active(e))
            .ok_or_else(|| AppError::NoActiveRun(network_id.to_string()))?;
        info!(network_id, ?command, "operator command");
        entry
            .control
            .send(LoopCommand::Operator(command))
            .map_err(|_| AppError::NoActiveRun(network_id.to_string()))
    }

    // ---------------------------------------------------------------------
    // Read
    // ---------------------------------------------------------------------

    /// Latest published tick of the network's most recent run.
    pub fn snapshot(&self, network_id: &str) -> AppResult<Option<Arc<TickSnapshot>>> {
        let registry = self.registry.lock();
        Ok(registry
            .latest_run(network_id)?
            .and_then(|e| e.shared.snapshot()))
    }

    pub fn sensor_readings(&self, network_id: &str) -> AppResult<Vec<SensorReading>> {
        Ok(self
            .snapshot(network_id)?
            .map(|s| s.readings.clone())
            .unwrap_or_default())
    }

    pub fn controller_status(&self, network_id: &str) -> AppResult<Vec<ControllerStatus>> {
        Ok(self
            .snapshot(network_id)?
            .map(|s| s.controllers.clone())
            .unwrap_or_default())
    }

    /// Alarms of the network's most recent run, live.
    pub fn alarms(&self, network_id: &str, active_only: bool) -> AppResult<Vec<Alarm>> {
        let registry = self.registry.lock();
        let Some(entry) = registry.latest_run(network_id)? else {
            return Ok(Vec::new());
        };
        let alarms = entry.alarms.lock();
        Ok(if active_only {
            alarms.active().cloned().collect()
        } else {
            alarms.all().to_vec()
        })
    }

    /// Acknowledge an alarm at the owning run's current simulation time.
    pub fn acknowledge_alarm(&self, alarm_id: &AlarmId) -> AppResult<()> {
        let registry = self.registry.lock();
        let entry = registry
            .runs
            .get(&alarm_id.run)
            .ok_or_else(|| AppError::AlarmNotFound(alarm_id.to_string()))?;
        let t = entry.shared.record().sim_time_s;
        entry.alarms.lock().acknowledge(alarm_id, t)?;
        Ok(())
    }

    pub fn run_record(&self, run_id: &str) -> AppResult<RunRecord> {
        let registry = self.registry.lock();
        if let Some(entry) = registry.runs.get(run_id) {
            return Ok(entry.shared.record());
        }
        drop(registry);
        if let Some(store) = &self.store
            && store.has_run(run_id)
        {
            return Ok(store.load_run(run_id)?);
        }
        Err(AppError::RunNotFound(run_id.to_string()))
    }

    /// Persisted rows of a run, from memory or the store.
    pub fn series(&self, run_id: &str) -> AppResult<Vec<SeriesRow>> {
        match self.memory.series(run_id) {
            Ok(rows) => Ok(rows),
            Err(_) => match &self.store {
                Some(store) if store.has_run(run_id) => Ok(store.load_series(run_id)?),
                _ => Err(AppError::RunNotFound(run_id.to_string())),
            },
        }
    }

    pub fn runs(&self, network_id: &str) -> AppResult<Vec<RunRecord>> {
        let registry = self.registry.lock();
        if !registry.networks.contains_key(network_id) {
            return Err(AppError::NetworkNotFound(network_id.to_string()));
        }
        let mut runs: Vec<RunRecord> = registry
            .runs
            .values()
            .filter(|e| e.network_id == network_id)
            .map(|e| e.shared.record())
            .collect();
        runs.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(runs)
    }

    /// Whether the run still executes. A loop thread that exited without a
    /// terminal status is reaped here and its run recorded as failed.
    fn is_active(&self, entry: &RunEntry) -> bool {
        if entry.loop_died() {
            self.abandon(entry);
            return false;
        }
        !entry.is_terminal()
    }

    fn abandon(&self, entry: &RunEntry) {
        let Some(record) = entry.shared.abandon(LOOP_DIED) else {
            return;
        };
        error!(run_id = %record.run_id, network_id = %entry.network_id, "run loop died");
        if let Err(e) = self.memory.clone().update_run(&record) {
            warn!(run_id = %record.run_id, error = %e, "failed to record abandoned run");
        }
        if let Some(store) = &self.store
            && let Err(e) = store.rewrite_run(&record)
        {
            warn!(run_id = %record.run_id, error = %e, "failed to persist abandoned run");
        }
    }
}

impl Drop for SimulationService {
    fn drop(&mut self) {
        let mut registry = self.registry.lock();
        for entry in registry.runs.values_mut() {
            let _ = entry.control.send(LoopCommand::Stop);
            if let Some(handle) = entry.thread.take() {
                let _ = handle.join();
            }
        }
    }
}
