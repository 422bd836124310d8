//! Alarm lifecycle: raise, dedupe, acknowledge, clear.

use std::collections::HashMap;

use tracing::{info, warn};

use crate::alarm::{Alarm, AlarmAssertion, AlarmId, AlarmPolicy, Severity};
use crate::error::{AlarmError, AlarmResult};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RaiseOutcome {
    /// A new alarm instance was created.
    Raised(AlarmId),
    /// An alarm for the same `(controller, code)` is already active.
    Duplicate(AlarmId),
}

impl RaiseOutcome {
    pub fn id(&self) -> &AlarmId {
        match self {
            RaiseOutcome::Raised(id) | RaiseOutcome::Duplicate(id) => id,
        }
    }
}

/// Alarms raised and cleared by one `reconcile` call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileSummary {
    pub raised: Vec<AlarmId>,
    pub cleared: Vec<AlarmId>,
}

/// Per-run alarm registry.
///
/// At most one active alarm exists per `(controller, code)`. Cleared alarms
/// are kept for history and never reactivated; a recurrence gets a new id.
#[derive(Debug, Clone)]
pub struct AlarmManager {
    run: String,
    policy: AlarmPolicy,
    next_seq: u64,
    alarms: Vec<Alarm>,
    active: HashMap<(String, String), usize>,
}

impl AlarmManager {
    pub fn new(run: impl Into<String>, policy: AlarmPolicy) -> Self {
        Self {
            run: run.into(),
            policy,
            next_seq: 1,
            alarms: Vec::new(),
            active: HashMap::new(),
        }
    }

    pub fn policy(&self) -> AlarmPolicy {
        self.policy
    }

    pub fn raise(
        &mut self,
        controller: &str,
        code: &str,
        severity: Severity,
        message: impl Into<String>,
        t: f64,
    ) -> RaiseOutcome {
        let key = (controller.to_string(), code.to_string());
        if let Some(&idx) = self.active.get(&key) {
            let alarm = &mut self.alarms[idx];
            alarm.returned_to_normal = false;
            return RaiseOutcome::Duplicate(alarm.id.clone());
        }

        let id = AlarmId {
            run: self.run.clone(),
            seq: self.next_seq,
        };
        self.next_seq += 1;
        let message = message.into();
        warn!(
            alarm = %id,
            controller,
            code,
            severity = %severity,
            t,
            "{message}"
        );
        self.active.insert(key, self.alarms.len());
        self.alarms.push(Alarm {
            id: id.clone(),
            controller: controller.to_string(),
            code: code.to_string(),
            severity,
            message,
            raised_at: t,
            acknowledged_at: None,
            cleared_at: None,
            returned_to_normal: false,
        });
        RaiseOutcome::Raised(id)
    }

    /// Mark an alarm acknowledged. Acknowledging twice is a no-op; a latched
    /// alarm whose condition already returned to normal clears here.
    pub fn acknowledge(&mut self, id: &AlarmId, t: f64) -> AlarmResult<()> {
        let idx = self.index_of(id)?;
        let alarm = &mut self.alarms[idx];
        if !alarm.is_active() {
            return Err(AlarmError::NotActive { id: id.clone() });
        }
        if alarm.acknowledged_at.is_none() {
            alarm.acknowledged_at = Some(t);
            info!(alarm = %id, t, "alarm acknowledged");
        }
        if alarm.returned_to_normal {
            self.clear_index(idx, t);
        }
        Ok(())
    }

    /// Clear the active alarm for `(controller, code)`, if any.
    pub fn clear(&mut self, controller: &str, code: &str, t: f64) -> Option<AlarmId> {
        let idx = *self
            .active
            .get(&(controller.to_string(), code.to_string()))?;
        Some(self.clear_index(idx, t))
    }

    /// Raise every asserted condition of `controller` and auto-clear its
    /// active alarms that are no longer asserted.
    pub fn reconcile(
        &mut self,
        controller: &str,
        asserted: &[AlarmAssertion],
        t: f64,
    ) -> ReconcileSummary {
        let mut summary = ReconcileSummary::default();
        for a in asserted {
            if let RaiseOutcome::Raised(id) =
                self.raise(controller, &a.code, a.severity, a.message.clone(), t)
            {
                summary.raised.push(id);
            }
        }

        let stale: Vec<usize> = self
            .active
            .iter()
            .filter(|((c, code), _)| c == controller && !asserted.iter().any(|a| &a.code == code))
            .map(|(_, &idx)| idx)
            .collect();
        for idx in stale {
            let severity = self.alarms[idx].severity;
            if self.policy.latches(severity) && self.alarms[idx].acknowledged_at.is_none() {
                self.alarms[idx].returned_to_normal = true;
            } else {
                summary.cleared.push(self.clear_index(idx, t));
            }
        }
        summary.cleared.sort();
        summary
    }

    fn clear_index(&mut self, idx: usize, t: f64) -> AlarmId {
        let alarm = &mut self.alarms[idx];
        alarm.cleared_at = Some(t);
        alarm.returned_to_normal = false;
        self.active
            .remove(&(alarm.controller.clone(), alarm.code.clone()));
        info!(alarm = %alarm.id, code = %alarm.code, t, "alarm cleared");
        alarm.id.clone()
    }

    fn index_of(&self, id: &AlarmId) -> AlarmResult<usize> {
        if id.run != self.run || id.seq == 0 || id.seq >= self.next_seq {
            return Err(AlarmError::NotFound { id: id.clone() });
        }
        // Alarms are pushed in seq order starting at 1.
        Ok((id.seq - 1) as usize)
    }

    pub fn get(&self, id: &AlarmId) -> Option<&Alarm> {
        self.index_of(id).ok().map(|idx| &self.alarms[idx])
    }

    pub fn active(&self) -> impl Iterator<Item = &Alarm> + '_ {
        self.alarms.iter().filter(|a| a.is_active())
    }

    pub fn all(&self) -> &[Alarm] {
        &self.alarms
    }

    pub fn active_count(&self, controller: &str) -> usize {
        self.active.keys().filter(|(c, _)| c == controller).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alarm::AlarmState;

    fn manager() -> AlarmManager {
        AlarmManager::new("run-a", AlarmPolicy::default())
    }

    #[test]
    fn duplicate_raise_yields_one_active_alarm() {
        let mut m = manager();
        let first = m.raise("safety", "HIGH_PRESSURE", Severity::High, "p high", 1.0);
        let second = m.raise("safety", "HIGH_PRESSURE", Severity::High, "p high", 2.0);
        assert!(matches!(first, RaiseOutcome::Raised(_)));
        assert_eq!(second, RaiseOutcome::Duplicate(first.id().clone()));
        assert_eq!(m.active().count(), 1);
        assert_eq!(m.all().len(), 1);
        assert_eq!(m.all()[0].raised_at, 1.0);
    }

    #[test]
    fn same_code_on_other_controller_is_distinct() {
        let mut m = manager();
        m.raise("a", "X", Severity::Low, "", 0.0);
        m.raise("b", "X", Severity::Low, "", 0.0);
        assert_eq!(m.active().count(), 2);
        assert_eq!(m.active_count("a"), 1);
    }

    #[test]
    fn acknowledge_does_not_clear() {
        let mut m = manager();
        let id = m.raise("esd", "EMERGENCY_SHUTDOWN", Severity::Critical, "", 3.0);
        m.acknowledge(id.id(), 4.0).unwrap();
        let alarm = m.get(id.id()).unwrap();
        assert_eq!(alarm.state(), AlarmState::Acknowledged);
        assert_eq!(alarm.acknowledged_at, Some(4.0));
        m.acknowledge(id.id(), 5.0).unwrap();
        assert_eq!(m.get(id.id()).unwrap().acknowledged_at, Some(4.0));
    }

    #[test]
    fn acknowledge_unknown_and_cleared() {
        let mut m = manager();
        let missing = AlarmId {
            run: "run-a".into(),
            seq: 9,
        };
        assert_eq!(
            m.acknowledge(&missing, 0.0),
            Err(AlarmError::NotFound { id: missing.clone() })
        );
        let id = m.raise("c", "X", Severity::Low, "", 0.0).id().clone();
        m.clear("c", "X", 1.0);
        assert_eq!(
            m.acknowledge(&id, 2.0),
            Err(AlarmError::NotActive { id: id.clone() })
        );
    }

    #[test]
    fn reconcile_auto_clears_and_recurrence_is_new_instance() {
        let mut m = manager();
        let leak = AlarmAssertion::new("GAS_LEAK:J1", Severity::Critical, "leak");
        let s1 = m.reconcile("leak", std::slice::from_ref(&leak), 10.0);
        assert_eq!(s1.raised.len(), 1);

        let s2 = m.reconcile("leak", &[], 12.0);
        assert_eq!(s2.cleared, s1.raised);
        let first = m.get(&s1.raised[0]).unwrap();
        assert_eq!(first.cleared_at, Some(12.0));
        assert_eq!(first.state(), AlarmState::Cleared);

        let s3 = m.reconcile("leak", &[leak], 14.0);
        assert_eq!(s3.raised.len(), 1);
        assert!(s3.raised[0].seq > s1.raised[0].seq);
        assert_eq!(m.all().len(), 2);
        assert!(m.get(&s1.raised[0]).unwrap().cleared_at.is_some());
    }

    #[test]
    fn reconcile_leaves_other_controllers_alone() {
        let mut m = manager();
        m.raise("safety", "HIGH_PRESSURE", Severity::High, "", 0.0);
        m.reconcile("leak", &[], 1.0);
        assert_eq!(m.active_count("safety"), 1);
    }

    #[test]
    fn latched_alarm_waits_for_acknowledge() {
        let mut m = AlarmManager::new(
            "run-b",
            AlarmPolicy {
                latch_at: Some(Severity::Critical),
            },
        );
        let a = AlarmAssertion::new("EMERGENCY_SHUTDOWN", Severity::Critical, "trip");
        let id = m.reconcile("esd", &[a], 1.0).raised.remove(0);
        let summary = m.reconcile("esd", &[], 2.0);
        assert!(summary.cleared.is_empty());
        assert!(m.get(&id).unwrap().returned_to_normal);

        m.acknowledge(&id, 3.0).unwrap();
        let alarm = m.get(&id).unwrap();
        assert_eq!(alarm.cleared_at, Some(3.0));
        assert_eq!(m.active().count(), 0);
    }

    #[test]
    fn latched_alarm_already_acknowledged_clears_on_return() {
        let mut m = AlarmManager::new(
            "run-c",
            AlarmPolicy {
                latch_at: Some(Severity::High),
            },
        );
        let a = AlarmAssertion::new("HIGH_TEMPERATURE", Severity::High, "");
        let id = m.reconcile("safety", &[a], 1.0).raised.remove(0);
        m.acknowledge(&id, 2.0).unwrap();
        let summary = m.reconcile("safety", &[], 3.0);
        assert_eq!(summary.cleared, vec![id]);
    }

    #[test]
    fn ids_are_monotonic() {
        let mut m = manager();
        let seqs: Vec<u64> = (0..5)
            .map(|i| {
                m.raise("c", &format!("C{i}"), Severity::Low, "", 0.0)
                    .id()
                    .seq
            })
            .collect();
        assert!(seqs.windows(2).all(|w| w[0] < w[1]));
    }
}
