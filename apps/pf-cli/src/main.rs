use clap::{Parser, Subcommand, ValueEnum};
use pf_app::{AppError, AppResult, Pacing, RunParams, Scenario, SimulationService};
use pf_results::{EntityRef, RunRecord, RunStore, SeriesKind};
use std::collections::BTreeSet;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "pipeflow")]
#[command(about = "PipeFlow CLI - Gas pipeline transient simulation with PLC-style control", long_about = None)]
struct Cli {
    /// Directory holding persisted runs
    #[arg(long, global = true, default_value = "pipeflow-runs")]
    store: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a scenario file (topology, configuration, schedules)
    Validate {
        /// Path to the scenario YAML file
        scenario_path: PathBuf,
    },
    /// Run a scenario to completion
    Run {
        /// Path to the scenario YAML file
        scenario_path: PathBuf,
        /// Simulated duration in seconds (overrides the scenario)
        #[arg(long)]
        duration: Option<f64>,
        /// Tick length in seconds (overrides the scenario)
        #[arg(long)]
        dt: Option<f64>,
        /// Pace the run at this multiple of real time
        #[arg(long)]
        speedup: Option<f64>,
    },
    /// List persisted runs for a network
    Runs {
        /// Network ID
        network_id: String,
    },
    /// Show details of a persisted run
    ShowRun {
        /// Run ID to display
        run_id: String,
        /// Print the run record as JSON
        #[arg(long)]
        json: bool,
    },
    /// Export one time series of a run as CSV
    ExportSeries {
        /// Run ID
        run_id: String,
        /// Entity type
        #[arg(value_enum)]
        entity: EntityArg,
        /// Entity name (node, pipe or sensor id)
        name: String,
        /// Tracked quantity
        #[arg(value_enum)]
        variable: VariableArg,
        /// Output CSV file path (optional, defaults to stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum EntityArg {
    Node,
    Pipe,
    Sensor,
}

#[derive(Clone, Copy, ValueEnum)]
enum VariableArg {
    Pressure,
    Temperature,
    NetFlow,
    PipeFlow,
    ValvePosition,
    CompressorSpeed,
    Reading,
}

impl From<VariableArg> for SeriesKind {
    fn from(v: VariableArg) -> Self {
        match v {
            VariableArg::Pressure => SeriesKind::Pressure,
            VariableArg::Temperature => SeriesKind::Temperature,
            VariableArg::NetFlow => SeriesKind::NetFlow,
            VariableArg::PipeFlow => SeriesKind::PipeFlow,
            VariableArg::ValvePosition => SeriesKind::ValvePosition,
            VariableArg::CompressorSpeed => SeriesKind::CompressorSpeed,
            VariableArg::Reading => SeriesKind::Reading,
        }
    }
}

fn main() -> AppResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("PIPEFLOW_LOG").unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Validate { scenario_path } => cmd_validate(&scenario_path),
        Commands::Run {
            scenario_path,
            duration,
            dt,
            speedup,
        } => cmd_run(&cli.store, &scenario_path, duration, dt, speedup),
        Commands::Runs { network_id } => cmd_runs(&cli.store, &network_id),
        Commands::ShowRun { run_id, json } => cmd_show_run(&cli.store, &run_id, json),
        Commands::ExportSeries {
            run_id,
            entity,
            name,
            variable,
            output,
        } => cmd_export_series(
            &cli.store,
            &run_id,
            entity,
            &name,
            variable.into(),
            output.as_deref(),
        ),
    }
}

fn cmd_validate(scenario_path: &Path) -> AppResult<()> {
    println!("Validating scenario: {}", scenario_path.display());
    let scenario = Scenario::load(scenario_path)?;
    let topology = scenario.validate()?;
    println!("✓ Scenario is valid");
    println!("  Network: {}", scenario.network.id);
    println!("  Nodes: {}", topology.nodes().len());
    println!("  Pipes: {}", topology.pipes().len());
    println!("  Perturbations: {}", scenario.perturbations.len());
    println!("  Scheduled commands: {}", scenario.commands.len());
    Ok(())
}

fn cmd_run(
    store: &Path,
    scenario_path: &Path,
    duration: Option<f64>,
    dt: Option<f64>,
    speedup: Option<f64>,
) -> AppResult<()> {
    let mut scenario = Scenario::load(scenario_path)?;
    if let Some(speedup) = speedup {
        scenario.config.pacing = Pacing::RealTime { speedup };
    }
    let defaults = scenario.run.unwrap_or(RunParams {
        duration_s: 60.0,
        dt_s: 1.0,
    });
    let params = RunParams::new(
        duration.unwrap_or(defaults.duration_s),
        dt.unwrap_or(defaults.dt_s),
    )?;

    let service = SimulationService::with_store(RunStore::new(store.to_path_buf())?);
    let network_id = service.register_scenario(&scenario)?;
    println!("Running scenario for network: {}", network_id);
    println!(
        "  duration = {:.1} s, dt = {:.3} s, ticks = {}",
        params.duration_s,
        params.dt_s,
        params.total_ticks()
    );

    let started = Instant::now();
    let run_id = service.start(&network_id, params.duration_s, params.dt_s)?;
    let mut last_emit: Option<Instant> = None;
    loop {
        let status = service.status(&run_id)?;
        if status.status.is_terminal() {
            break;
        }
        if last_emit.is_none_or(|t| t.elapsed().as_millis() >= 100) {
            let record = service.run_record(&run_id)?;
            render_progress(&record, started.elapsed().as_secs_f64());
            last_emit = Some(Instant::now());
        }
        std::thread::sleep(Duration::from_millis(20));
    }
    let record = service.wait(&run_id)?;
    clear_progress_line();

    match &record.failure {
        Some(reason) => println!("✗ Run {} failed: {}", record.run_id, reason),
        None => println!("✓ Run {} {}", record.run_id, record.status),
    }
    println!(
        "  Ticks: {}/{}  (t = {:.1} s, wall {:.2} s)",
        record.ticks_completed(),
        record.total_ticks,
        record.sim_time_s,
        started.elapsed().as_secs_f64()
    );

    let alarms = service.alarms(&network_id, false)?;
    if alarms.is_empty() {
        println!("\nNo alarms raised");
    } else {
        println!("\nAlarms:");
        for alarm in &alarms {
            let state = if alarm.is_active() { "active" } else { "cleared" };
            println!(
                "  [{}] {:<8} {:<28} t={:<8.1} {:<8} {}",
                alarm.id,
                alarm.severity.to_string(),
                alarm.code, alarm.raised_at, state, alarm.message
            );
        }
    }

    let controllers = service.controller_status(&network_id)?;
    if !controllers.is_empty() {
        println!("\nControllers:");
        for c in controllers {
            println!("  {:<24} {:<10} {}", c.id, c.state, c.summary);
        }
    }

    Ok(())
}

fn clear_progress_line() {
    print!("\r{}\r", " ".repeat(100));
    let _ = io::stdout().flush();
}

fn render_progress(record: &RunRecord, elapsed_wall_s: f64) {
    let fraction = if record.total_ticks == 0 {
        0.0
    } else {
        record.ticks_completed() as f64 / record.total_ticks as f64
    };
    let width = 28usize;
    let filled = ((fraction * width as f64).round() as usize).min(width);
    print!(
        "\r[{}{}] {:>6.2}%  t={:.1}/{:.1}s  elapsed={:.1}s",
        "#".repeat(filled),
        "-".repeat(width.saturating_sub(filled)),
        fraction * 100.0,
        record.sim_time_s,
        record.duration_s,
        elapsed_wall_s
    );
    let _ = io::stdout().flush();
}

fn cmd_runs(store: &Path, network_id: &str) -> AppResult<()> {
    let store = RunStore::new(store.to_path_buf())?;
    let runs = store.list_runs(network_id)?;

    if runs.is_empty() {
        println!("No runs found for network: {}", network_id);
    } else {
        println!("Runs for network '{}':", network_id);
        for record in runs {
            println!(
                "  {} {:<10} {} ticks ({})",
                record.run_id,
                record.status.to_string(),
                record.ticks_completed(),
                record.created_at
            );
        }
    }
    Ok(())
}

fn cmd_show_run(store: &Path, run_id: &str, json: bool) -> AppResult<()> {
    let store = RunStore::new(store.to_path_buf())?;
    if !store.has_run(run_id) {
        return Err(AppError::RunNotFound(run_id.to_string()));
    }
    let record = store.load_run(run_id)?;
    if json {
        let text = serde_json::to_string_pretty(&record)
            .map_err(|e| AppError::Config(e.to_string()))?;
        println!("{}", text);
        return Ok(());
    }

    let rows = store.load_series(run_id)?;
    println!("Run: {}", record.run_id);
    println!("  Network: {}", record.network_id);
    println!("  Status: {}", record.status);
    if let Some(reason) = &record.failure {
        println!("  Failure: {}", reason);
    }
    println!(
        "  Duration: {:.1} s at dt = {:.3} s ({} ticks)",
        record.duration_s, record.dt_s, record.total_ticks
    );
    println!("  Ticks completed: {}", record.ticks_completed());
    println!("  Series rows: {}", rows.len());

    let entities: BTreeSet<String> = rows
        .iter()
        .map(|r| format!("{} {:?}", entity_label(&r.entity), r.kind))
        .collect();
    println!("\nSeries:");
    for e in entities {
        println!("  {}", e);
    }
    Ok(())
}

fn entity_label(entity: &EntityRef) -> String {
    match entity {
        EntityRef::Node(name) => format!("node:{name}"),
        EntityRef::Pipe(name) => format!("pipe:{name}"),
        EntityRef::Sensor(name) => format!("sensor:{name}"),
    }
}

fn cmd_export_series(
    store: &Path,
    run_id: &str,
    entity: EntityArg,
    name: &str,
    kind: SeriesKind,
    output: Option<&Path>,
) -> AppResult<()> {
    let store = RunStore::new(store.to_path_buf())?;
    if !store.has_run(run_id) {
        return Err(AppError::RunNotFound(run_id.to_string()));
    }
    let entity = match entity {
        EntityArg::Node => EntityRef::Node(name.to_string()),
        EntityArg::Pipe => EntityRef::Pipe(name.to_string()),
        EntityArg::Sensor => EntityRef::Sensor(name.to_string()),
    };
    let series: Vec<_> = store
        .load_series(run_id)?
        .into_iter()
        .filter(|r| r.entity == entity && r.kind == kind)
        .collect();

    let mut csv = String::from("tick,time_s,value\n");
    for row in &series {
        csv.push_str(&format!("{},{},{}\n", row.tick_index, row.sim_time_s, row.value));
    }

    if let Some(path) = output {
        std::fs::write(path, csv)?;
        println!(
            "✓ Exported {} data points to {}",
            series.len(),
            path.display()
        );
    } else {
        print!("{}", csv);
    }

    Ok(())
}
