//! Scan scheduling for sampled controllers.
//!
//! A controller scans when the time since its last scan reaches its scan
//! interval; between scans its outputs are held (zero-order hold). The first
//! scan is always due.

use pf_core::ensure_positive;
use serde::{Deserialize, Serialize};

use crate::error::ControlResult;

/// Slack for `k * dt` sampling instants accumulated in floating point.
const TIME_EPS: f64 = 1e-9;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanClock {
    interval: f64,
    last_scan: Option<f64>,
}

impl ScanClock {
    pub fn new(interval: f64) -> ControlResult<Self> {
        let interval = ensure_positive(interval, "scan interval")?;
        Ok(Self {
            interval,
            last_scan: None,
        })
    }

    pub fn interval(&self) -> f64 {
        self.interval
    }

    pub fn last_scan(&self) -> Option<f64> {
        self.last_scan
    }

    pub fn is_due(&self, t: f64) -> bool {
        match self.last_scan {
            None => true,
            Some(last) => t - last + TIME_EPS >= self.interval,
        }
    }

    /// Time elapsed since the previous scan; the interval for the first one.
    pub fn elapsed(&self, t: f64) -> f64 {
        self.last_scan.map_or(self.interval, |last| t - last)
    }

    /// Record a scan at `t` and return the elapsed time it covered.
    pub fn mark_scanned(&mut self, t: f64) -> f64 {
        let elapsed = self.elapsed(t);
        self.last_scan = Some(t);
        elapsed
    }

    /// Next time a scan becomes due.
    pub fn next_scan_time(&self) -> f64 {
        self.last_scan.map_or(0.0, |last| last + self.interval)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_scan_is_due() {
        let clock = ScanClock::new(5.0).unwrap();
        assert!(clock.is_due(0.0));
        assert_eq!(clock.elapsed(0.0), 5.0);
    }

    #[test]
    fn scans_every_interval_on_coarser_grid() {
        let mut clock = ScanClock::new(5.0).unwrap();
        let scanned: Vec<u32> = (0..=20)
            .filter(|&k| {
                let t = k as f64;
                let due = clock.is_due(t);
                if due {
                    clock.mark_scanned(t);
                }
                due
            })
            .collect();
        assert_eq!(scanned, vec![0, 5, 10, 15, 20]);
    }

    #[test]
    fn fractional_dt_does_not_skip_scans() {
        let mut clock = ScanClock::new(0.3).unwrap();
        let mut count = 0;
        for k in 0..30 {
            let t = k as f64 * 0.1;
            if clock.is_due(t) {
                clock.mark_scanned(t);
                count += 1;
            }
        }
        assert_eq!(count, 10);
    }

    #[test]
    fn rejects_non_positive_interval() {
        assert!(ScanClock::new(0.0).is_err());
        assert!(ScanClock::new(-1.0).is_err());
        assert!(ScanClock::new(f64::NAN).is_err());
    }

    #[test]
    fn elapsed_tracks_last_scan() {
        let mut clock = ScanClock::new(2.0).unwrap();
        clock.mark_scanned(0.0);
        assert_eq!(clock.next_scan_time(), 2.0);
        assert_eq!(clock.mark_scanned(3.0), 3.0);
        assert_eq!(clock.last_scan(), Some(3.0));
    }
}
