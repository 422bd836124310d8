//! YAML scenario files: a network plus configuration, scheduled
//! perturbations and scheduled operator commands.

use std::path::Path;

use pf_controls::OperatorCommand;
use pf_network::{NetworkDef, NetworkTopology};
use pf_physics::{Perturbation, PerturbationSchedule};
use serde::{Deserialize, Serialize};

use crate::config::SimConfig;
use crate::error::{AppError, AppResult};
use crate::params::RunParams;

/// Operator command delivered at the first tick at or after `at_s`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledCommand {
    pub at_s: f64,
    pub command: OperatorCommand,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    pub network: NetworkDef,
    #[serde(default)]
    pub config: SimConfig,
    #[serde(default)]
    pub perturbations: Vec<Perturbation>,
    #[serde(default)]
    pub commands: Vec<ScheduledCommand>,
    /// Default run length when none is given on the command line.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run: Option<RunParams>,
}

impl Scenario {
    pub fn from_yaml_str(yaml: &str) -> AppResult<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    pub fn load(path: &Path) -> AppResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| AppError::ScenarioRead {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&content)
    }

    /// Build the topology and check every reference against it.
    pub fn validate(&self) -> AppResult<NetworkTopology> {
        let topology = self.network.to_topology()?;
        self.config.validate()?;
        PerturbationSchedule::new(self.perturbations.clone()).validate(&topology)?;
        for scheduled in &self.commands {
            if !(scheduled.at_s.is_finite() && scheduled.at_s >= 0.0) {
                return Err(AppError::Config(format!(
                    "command time {} must be non-negative",
                    scheduled.at_s
                )));
            }
            scheduled.command.validate(&topology)?;
        }
        if let Some(run) = &self.run {
            run.validate()?;
        }
        Ok(topology)
    }
}
