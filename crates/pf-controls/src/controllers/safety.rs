//! Safety Monitoring: threshold checks and the shutdown interlock.

use pf_alarms::{AlarmAssertion, Severity};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::controller::{ScanInput, ScanOutput};
use crate::error::{ControlError, ControlResult};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SafetyMonitoringConfig {
    pub scan_interval_s: f64,
    pub pressure_high_bar: f64,
    pub pressure_low_bar: f64,
    /// Pressure at which the interlock is asserted.
    pub pressure_trip_bar: f64,
    pub temperature_high_c: f64,
    /// Temperature at which the interlock is asserted.
    pub temperature_trip_c: f64,
    /// Absolute pipe flow limit.
    pub flow_high_m3h: f64,
}

impl Default for SafetyMonitoringConfig {
    fn default() -> Self {
        Self {
            scan_interval_s: 1.0,
            pressure_high_bar: 120.0,
            pressure_low_bar: 2.0,
            pressure_trip_bar: 140.0,
            temperature_high_c: 60.0,
            temperature_trip_c: 80.0,
            flow_high_m3h: 100_000.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SafetyMonitoring {
    limits: SafetyMonitoringConfig,
    interlock: bool,
    violations: usize,
}

impl SafetyMonitoring {
    pub fn new(config: &SafetyMonitoringConfig) -> ControlResult<Self> {
        if !(config.pressure_low_bar < config.pressure_high_bar
            && config.pressure_high_bar <= config.pressure_trip_bar)
        {
            return Err(ControlError::InvalidConfig {
                what: "pressure limits must satisfy low < high <= trip".into(),
            });
        }
        if config.temperature_high_c > config.temperature_trip_c {
            return Err(ControlError::InvalidConfig {
                what: "temperature_high_c must not exceed temperature_trip_c".into(),
            });
        }
        Ok(Self {
            limits: config.clone(),
            interlock: false,
            violations: 0,
        })
    }

    pub fn interlock(&self) -> bool {
        self.interlock
    }

    pub fn step(&mut self, _elapsed: f64, input: &ScanInput<'_>) -> ControlResult<ScanOutput> {
        let lim = &self.limits;
        let mut out = ScanOutput::default();
        let topology = input.topology();

        for node in topology.nodes() {
            if let Some(p) = input.sensors.node_pressure_bar(node.id) {
                if p >= lim.pressure_trip_bar {
                    out.interlock = true;
                    out.alarms.push(AlarmAssertion::new(
                        format!("PRESSURE_TRIP:{}", node.name),
                        Severity::Critical,
                        format!("{} at {p:.2} bar beyond trip {:.2} bar", node.name, lim.pressure_trip_bar),
                    ));
                } else if p > lim.pressure_high_bar {
                    out.alarms.push(AlarmAssertion::new(
                        format!("HIGH_PRESSURE:{}", node.name),
                        Severity::High,
                        format!("{} at {p:.2} bar above {:.2} bar", node.name, lim.pressure_high_bar),
                    ));
                } else if p < lim.pressure_low_bar {
                    out.alarms.push(AlarmAssertion::new(
                        format!("LOW_PRESSURE:{}", node.name),
                        Severity::High,
                        format!("{} at {p:.2} bar below {:.2} bar", node.name, lim.pressure_low_bar),
                    ));
                }
            }
            if let Some(temp) = input.sensors.node_temperature_c(node.id) {
                if temp >= lim.temperature_trip_c {
                    out.interlock = true;
                    out.alarms.push(AlarmAssertion::new(
                        format!("TEMPERATURE_TRIP:{}", node.name),
                        Severity::Critical,
                        format!("{} at {temp:.1} degC beyond trip {:.1} degC", node.name, lim.temperature_trip_c),
                    ));
                } else if temp > lim.temperature_high_c {
                    out.alarms.push(AlarmAssertion::new(
                        format!("HIGH_TEMPERATURE:{}", node.name),
                        Severity::High,
                        format!("{} at {temp:.1} degC above {:.1} degC", node.name, lim.temperature_high_c),
                    ));
                }
            }
        }

        for pipe in topology.pipes() {
            if let Some(q) = input.sensors.pipe_flow_m3h(pipe.id) {
                if q.abs() > lim.flow_high_m3h {
                    out.alarms.push(AlarmAssertion::new(
                        format!("HIGH_FLOW:{}", pipe.name),
                        Severity::Medium,
                        format!("{} carrying {q:.0} m3/h above {:.0} m3/h", pipe.name, lim.flow_high_m3h),
                    ));
                }
            }
        }

        if out.interlock && !self.interlock {
            warn!(t = input.t, "safety interlock asserted");
        }
        self.interlock = out.interlock;
        self.violations = out.alarms.len();
        Ok(out)
    }

    pub fn summary(&self) -> String {
        format!("interlock={} violations={}", self.interlock, self.violations)
    }
}
