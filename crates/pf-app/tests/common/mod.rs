#![allow(dead_code)]

use std::sync::Arc;

use pf_app::{RunContext, RunParams, ScheduledCommand, SimConfig};
use pf_core::units::{bar, m, m3ph};
use pf_network::{NetworkTopology, TopologyBuilder};
use pf_physics::Perturbation;
use pf_results::MemoryLogger;

/// S --P1--> D
pub fn supply_line(supply_bar: f64, demand_m3h: f64) -> NetworkTopology {
    let mut b = TopologyBuilder::new();
    let s = b.add_source("S", bar(supply_bar));
    let d = b.add_sink("D", m3ph(demand_m3h), m3ph(2.0 * demand_m3h));
    b.add_pipe("P1", s, d, m(1000.0), m(0.5));
    b.build().unwrap()
}

/// S --P1--> J --P2--> D
pub fn junction_line() -> NetworkTopology {
    let mut b = TopologyBuilder::new();
    let s = b.add_source("S", bar(100.0));
    let j = b.add_junction("J");
    let d = b.add_sink("D", m3ph(50.0), m3ph(100.0));
    b.add_pipe("P1", s, j, m(1000.0), m(0.5));
    b.add_pipe("P2", j, d, m(1000.0), m(0.5));
    b.build().unwrap()
}

/// S --P1--> J --P2--> C --P3--> D
pub fn station_line() -> NetworkTopology {
    let mut b = TopologyBuilder::new();
    let s = b.add_source("S", bar(60.0));
    let j = b.add_junction("J");
    let c = b.add_compressor("C", 1.4);
    let d = b.add_sink("D", m3ph(50.0), m3ph(100.0));
    b.add_pipe("P1", s, j, m(1000.0), m(0.3));
    b.add_pipe("P2", j, c, m(1000.0), m(0.3));
    b.add_pipe("P3", c, d, m(1000.0), m(0.3));
    b.build().unwrap()
}

/// A run context logging into a fresh memory logger.
pub fn context(
    topology: NetworkTopology,
    config: &SimConfig,
    duration_s: f64,
    dt_s: f64,
    perturbations: Vec<Perturbation>,
    commands: Vec<ScheduledCommand>,
) -> (RunContext, MemoryLogger) {
    let logger = MemoryLogger::new();
    let mut ctx = RunContext::new(
        "test-run".to_string(),
        "test-net",
        Arc::new(topology),
        config,
        RunParams::new(duration_s, dt_s).unwrap(),
        perturbations,
        commands,
        Box::new(logger.clone()),
    )
    .unwrap();
    ctx.begin().unwrap();
    (ctx, logger)
}
