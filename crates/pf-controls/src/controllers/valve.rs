//! Valve Control: rate-limited tracking of commanded pipe valve positions.

use std::collections::BTreeMap;

use pf_network::NetworkTopology;
use pf_physics::Command;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::actuator::RateLimit;
use crate::command::{OperatorCommand, resolve_pipe};
use crate::controller::{ScanInput, ScanOutput};
use crate::error::{ControlError, ControlResult};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValveControlConfig {
    pub scan_interval_s: f64,
    /// Maximum valve travel per second (fraction of full stroke).
    pub rate_per_s: f64,
    /// Initial targets by pipe name; unlisted pipes start fully open.
    pub targets: BTreeMap<String, f64>,
}

impl Default for ValveControlConfig {
    fn default() -> Self {
        Self {
            scan_interval_s: 1.0,
            rate_per_s: 0.05,
            targets: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ValveControl {
    limit: RateLimit,
    /// Target position per pipe slot.
    targets: Vec<f64>,
    last: Vec<f64>,
}

impl ValveControl {
    pub fn new(topology: &NetworkTopology, config: &ValveControlConfig) -> ControlResult<Self> {
        let limit = RateLimit::new(config.rate_per_s)?;
        let mut targets = vec![1.0; topology.pipes().len()];
        for (name, &target) in &config.targets {
            let id = resolve_pipe(topology, name)?;
            if !(0.0..=1.0).contains(&target) {
                return Err(ControlError::InvalidConfig {
                    what: format!("valve target for '{name}' outside [0, 1]"),
                });
            }
            targets[id.slot()] = target;
        }
        let last = targets.clone();
        Ok(Self {
            limit,
            targets,
            last,
        })
    }

    pub fn target(&self, slot: usize) -> Option<f64> {
        self.targets.get(slot).copied()
    }

    pub fn step(&mut self, elapsed: f64, input: &ScanInput<'_>) -> ControlResult<ScanOutput> {
        for cmd in input.operator {
            if let OperatorCommand::SetValve { pipe, position } = cmd {
                let id = resolve_pipe(input.topology(), pipe)?;
                info!(pipe = %pipe, target = position, "valve target changed");
                self.targets[id.slot()] = position.clamp(0.0, 1.0);
            }
        }

        let mut out = ScanOutput::default();
        for pipe in input.topology().pipes() {
            let slot = pipe.id.slot();
            let actual = input
                .state
                .pipes
                .get(slot)
                .map_or(self.last[slot], |p| p.valve_position);
            let next = self.limit.step(actual, self.targets[slot], elapsed);
            self.last[slot] = next;
            out.commands.push(Command::PipeValve {
                pipe: pipe.id,
                position: next,
            });
        }
        Ok(out)
    }

    pub fn summary(&self) -> String {
        let moving = self
            .targets
            .iter()
            .zip(&self.last)
            .filter(|(t, l)| (*t - *l).abs() > 1e-9)
            .count();
        format!("{} valves, {moving} travelling", self.targets.len())
    }
}
