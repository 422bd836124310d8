//! Sensor sampling.
//!
//! Sensors are derived views of the physical state: they convert SI values to
//! engineering units (bar, °C, m³/h) and optionally add bounded uniform
//! jitter. Sampling never writes to the physical state.

use std::collections::HashMap;

use pf_core::units::{k_to_degc, m3ps_to_m3ph, pa_to_bar};
use pf_core::{NodeId, PipeId};
use pf_network::{NetworkTopology, NodeRole};
use pf_physics::NetworkState;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorKind {
    Pressure,
    Temperature,
    Flow,
}

impl SensorKind {
    pub fn unit(self) -> &'static str {
        match self {
            SensorKind::Pressure => "bar",
            SensorKind::Temperature => "degC",
            SensorKind::Flow => "m3/h",
        }
    }

    fn tag(self) -> &'static str {
        match self {
            SensorKind::Pressure => "PT",
            SensorKind::Temperature => "TT",
            SensorKind::Flow => "FT",
        }
    }
}

/// Where a sensor is mounted, by entity name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorLocation {
    Node(String),
    Pipe(String),
}

/// Resolved mounting point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SensorTarget {
    Node(NodeId),
    Pipe(PipeId),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorDef {
    pub id: String,
    pub kind: SensorKind,
    pub location: SensorLocation,
}

/// Half-width of the uniform jitter per sensor kind, in engineering units.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NoiseConfig {
    pub pressure_bar: f64,
    pub temperature_c: f64,
    pub flow_m3h: f64,
}

impl NoiseConfig {
    fn amplitude(&self, kind: SensorKind) -> f64 {
        match kind {
            SensorKind::Pressure => self.pressure_bar,
            SensorKind::Temperature => self.temperature_c,
            SensorKind::Flow => self.flow_m3h,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SensorConfig {
    pub noise: NoiseConfig,
    /// Install the standard per-node and per-pipe sensor set.
    pub defaults: bool,
    pub extra: Vec<SensorDef>,
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            noise: NoiseConfig::default(),
            defaults: true,
            extra: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorQuality {
    Good,
    /// Location not reachable; `value` is the last good value, if any.
    Missing,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorReading {
    pub sensor_id: String,
    pub kind: SensorKind,
    pub location: SensorLocation,
    pub value: Option<f64>,
    pub quality: SensorQuality,
    /// Simulation time at which `value` was sampled.
    pub sampled_at: Option<f64>,
    #[serde(skip)]
    pub target: Option<SensorTarget>,
}

impl SensorReading {
    pub fn good_value(&self) -> Option<f64> {
        match self.quality {
            SensorQuality::Good => self.value,
            SensorQuality::Missing => None,
        }
    }
}

/// Readings of one tick, indexed by kind and mounting point.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SensorFrame {
    readings: Vec<SensorReading>,
    index: HashMap<(SensorKind, SensorTarget), usize>,
}

impl SensorFrame {
    pub fn new(readings: Vec<SensorReading>) -> Self {
        let mut index = HashMap::new();
        for (i, r) in readings.iter().enumerate() {
            if let Some(target) = r.target {
                index.entry((r.kind, target)).or_insert(i);
            }
        }
        Self { readings, index }
    }

    pub fn readings(&self) -> &[SensorReading] {
        &self.readings
    }

    /// Good value of the first sensor of `kind` at `target`.
    pub fn value(&self, kind: SensorKind, target: SensorTarget) -> Option<f64> {
        self.index
            .get(&(kind, target))
            .and_then(|&i| self.readings[i].good_value())
    }

    pub fn node_pressure_bar(&self, node: NodeId) -> Option<f64> {
        self.value(SensorKind::Pressure, SensorTarget::Node(node))
    }

    pub fn node_temperature_c(&self, node: NodeId) -> Option<f64> {
        self.value(SensorKind::Temperature, SensorTarget::Node(node))
    }

    pub fn node_flow_m3h(&self, node: NodeId) -> Option<f64> {
        self.value(SensorKind::Flow, SensorTarget::Node(node))
    }

    pub fn pipe_flow_m3h(&self, pipe: PipeId) -> Option<f64> {
        self.value(SensorKind::Flow, SensorTarget::Pipe(pipe))
    }
}

#[derive(Debug, Clone)]
struct Sensor {
    def: SensorDef,
    target: Option<SensorTarget>,
    last_value: Option<f64>,
    last_sample_time: Option<f64>,
    fault_logged: bool,
}

/// Samples every configured sensor once per tick.
#[derive(Debug, Clone)]
pub struct SensorSampler {
    sensors: Vec<Sensor>,
    noise: NoiseConfig,
    rng: ChaCha8Rng,
}

impl SensorSampler {
    pub fn new(topology: &NetworkTopology, config: &SensorConfig, seed: u64) -> Self {
        let mut defs = Vec::new();
        if config.defaults {
            defs.extend(default_sensors(topology));
        }
        defs.extend(config.extra.iter().cloned());

        let sensors = defs
            .into_iter()
            .map(|def| {
                let target = match &def.location {
                    SensorLocation::Node(name) => {
                        topology.node_by_name(name).map(|n| SensorTarget::Node(n.id))
                    }
                    SensorLocation::Pipe(name) => {
                        topology.pipe_by_name(name).map(|p| SensorTarget::Pipe(p.id))
                    }
                };
                Sensor {
                    def,
                    target,
                    last_value: None,
                    last_sample_time: None,
                    fault_logged: false,
                }
            })
            .collect();

        Self {
            sensors,
            noise: config.noise,
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    pub fn len(&self) -> usize {
        self.sensors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sensors.is_empty()
    }

    pub fn sample(
        &mut self,
        topology: &NetworkTopology,
        state: &NetworkState,
        t: f64,
    ) -> SensorFrame {
        let mut readings = Vec::with_capacity(self.sensors.len());
        for sensor in &mut self.sensors {
            let raw = sensor
                .target
                .and_then(|target| measure(topology, state, sensor.def.kind, target));
            let quality = match raw {
                Some(value) => {
                    let amp = self.noise.amplitude(sensor.def.kind);
                    let jitter = if amp > 0.0 {
                        self.rng.random_range(-amp..=amp)
                    } else {
                        0.0
                    };
                    sensor.last_value = Some(value + jitter);
                    sensor.last_sample_time = Some(t);
                    SensorQuality::Good
                }
                None => {
                    if !sensor.fault_logged {
                        warn!(sensor = %sensor.def.id, t, "sensor location unreachable");
                        sensor.fault_logged = true;
                    }
                    SensorQuality::Missing
                }
            };
            readings.push(SensorReading {
                sensor_id: sensor.def.id.clone(),
                kind: sensor.def.kind,
                location: sensor.def.location.clone(),
                value: sensor.last_value,
                quality,
                sampled_at: sensor.last_sample_time,
                target: sensor.target,
            });
        }
        SensorFrame::new(readings)
    }
}

/// Pressure and temperature at every node, flow at sources, sinks and pipes.
pub fn default_sensors(topology: &NetworkTopology) -> Vec<SensorDef> {
    let mut defs = Vec::new();
    let node_def = |kind: SensorKind, name: &str| SensorDef {
        id: format!("{}:{name}", kind.tag()),
        kind,
        location: SensorLocation::Node(name.to_string()),
    };
    for node in topology.nodes() {
        defs.push(node_def(SensorKind::Pressure, &node.name));
        defs.push(node_def(SensorKind::Temperature, &node.name));
        if matches!(node.role, NodeRole::Source { .. } | NodeRole::Sink { .. }) {
            defs.push(node_def(SensorKind::Flow, &node.name));
        }
    }
    for pipe in topology.pipes() {
        defs.push(SensorDef {
            id: format!("FT:{}", pipe.name),
            kind: SensorKind::Flow,
            location: SensorLocation::Pipe(pipe.name.clone()),
        });
    }
    defs
}

fn measure(
    topology: &NetworkTopology,
    state: &NetworkState,
    kind: SensorKind,
    target: SensorTarget,
) -> Option<f64> {
    match target {
        SensorTarget::Node(id) => {
            let node = topology.node(id)?;
            let ns = state.nodes.get(id.slot())?;
            Some(match kind {
                SensorKind::Pressure => pa_to_bar(ns.pressure_pa),
                SensorKind::Temperature => k_to_degc(ns.temperature_k),
                SensorKind::Flow => m3ps_to_m3ph(match node.role {
                    NodeRole::Source { .. } => ns.supply_m3ps,
                    NodeRole::Sink { .. } => ns.draw_m3ps,
                    _ => ns.net_flow_m3ps,
                }),
            })
        }
        SensorTarget::Pipe(id) => {
            let pipe = topology.pipe(id)?;
            let ps = state.pipes.get(id.slot())?;
            match kind {
                SensorKind::Flow => Some(m3ps_to_m3ph(ps.flow_m3ps)),
                SensorKind::Pressure => {
                    let a = state.nodes.get(pipe.from.slot())?.pressure_pa;
                    let b = state.nodes.get(pipe.to.slot())?.pressure_pa;
                    Some(pa_to_bar(0.5 * (a + b)))
                }
                SensorKind::Temperature => {
                    let a = state.nodes.get(pipe.from.slot())?.temperature_k;
                    let b = state.nodes.get(pipe.to.slot())?.temperature_k;
                    Some(k_to_degc(0.5 * (a + b)))
                }
            }
        }
    }
}
