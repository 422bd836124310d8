//! The dedicated per-run execution loop.
//!
//! The loop owns its `RunContext` exclusively. Control messages arrive over
//! an `mpsc` channel and are only looked at between ticks. Each finished
//! tick is published together with its run record under one lock, while the
//! run's alarm manager is still held, so readers never see a partially
//! updated tick.

use std::sync::Arc;
use std::sync::mpsc::{Receiver, TryRecvError};
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use pf_controls::OperatorCommand;
use pf_results::{RunRecord, RunStatus};
use tracing::{debug, error, info, warn};

use crate::config::Pacing;
use crate::context::RunContext;
use crate::snapshot::TickSnapshot;

#[derive(Debug, Clone, PartialEq)]
pub enum LoopCommand {
    Stop,
    Operator(OperatorCommand),
}

#[derive(Debug)]
struct Published {
    snapshot: Option<Arc<TickSnapshot>>,
    record: RunRecord,
}

/// State the loop publishes for readers.
#[derive(Debug)]
pub struct RunShared {
    published: RwLock<Published>,
}

impl RunShared {
    pub fn new(record: RunRecord) -> Self {
        Self {
            published: RwLock::new(Published {
                snapshot: None,
                record,
            }),
        }
    }

    /// Last fully published tick.
    pub fn snapshot(&self) -> Option<Arc<TickSnapshot>> {
        self.published.read().snapshot.clone()
    }

    pub fn record(&self) -> RunRecord {
        self.published.read().record.clone()
    }

    pub(crate) fn publish(&self, snapshot: Arc<TickSnapshot>, record: &RunRecord) {
        let mut published = self.published.write();
        published.snapshot = Some(snapshot);
        published.record = record.clone();
    }

    fn set_record(&self, record: &RunRecord) {
        self.published.write().record = record.clone();
    }

    /// Mark a run whose loop died without a final status as failed.
    ///
    /// Returns `None` when the record already reached a terminal status.
    pub(crate) fn abandon(&self, reason: &str) -> Option<RunRecord> {
        let mut published = self.published.write();
        if published.record.status.is_terminal() {
            return None;
        }
        published.record.fail(reason);
        Some(published.record.clone())
    }
}

/// Wall-clock instant at which tick `tick + 1` is due, if representable.
fn pacing_deadline(started: Instant, tick: u64, dt: f64, speedup: f64) -> Option<Instant> {
    let offset = Duration::try_from_secs_f64((tick + 1) as f64 * dt / speedup).ok()?;
    started.checked_add(offset)
}

fn fail_run(mut ctx: RunContext, shared: &RunShared, reason: &str) -> RunRecord {
    if let Err(persist) = ctx.fail(reason) {
        warn!(run_id = ctx.run_id(), error = %persist, "failed to persist run failure");
    }
    shared.set_record(ctx.record());
    ctx.record().clone()
}

/// Drive `ctx` to completion, stop or failure.
pub fn run_loop(
    mut ctx: RunContext,
    control: Receiver<LoopCommand>,
    shared: Arc<RunShared>,
    pacing: Pacing,
) -> RunRecord {
    let run_id = ctx.run_id().to_string();
    if let Err(e) = ctx.transition(RunStatus::Running) {
        error!(run_id, error = %e, "failed to record run start");
        return fail_run(ctx, &shared, &e.to_string());
    }
    shared.set_record(ctx.record());

    let started = Instant::now();
    let dt = ctx.params().dt_s;
    let mut operator = Vec::new();

    let final_status = loop {
        if ctx.is_finished() {
            break RunStatus::Completed;
        }

        let mut stop = false;
        loop {
            match control.try_recv() {
                Ok(LoopCommand::Stop) => stop = true,
                Ok(LoopCommand::Operator(cmd)) => operator.push(cmd),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    debug!(run_id, "control channel closed");
                    stop = true;
                    break;
                }
            }
        }
        if stop {
            info!(run_id, tick = ctx.next_tick(), "stop observed");
            break RunStatus::Stopped;
        }

        let tick = ctx.next_tick();
        let published = ctx.step_with(&operator, |snapshot, record| {
            shared.publish(snapshot.clone(), record)
        });
        if let Err(e) = published {
            error!(run_id, tick, error = %e, "run failed");
            return fail_run(ctx, &shared, &e.to_string());
        }
        operator.clear();

        if let Pacing::RealTime { speedup } = pacing {
            let Some(due) = pacing_deadline(started, tick, dt, speedup) else {
                let reason = format!(
                    "pacing deadline of tick {} is out of range at speedup {speedup}",
                    tick + 1
                );
                error!(run_id, tick, speedup, "run failed");
                return fail_run(ctx, &shared, &reason);
            };
            let now = Instant::now();
            if due > now {
                std::thread::sleep(due - now);
            }
        }
    };

    if let Err(e) = ctx.transition(final_status) {
        warn!(run_id, error = %e, "failed to persist final run status");
    }
    shared.set_record(ctx.record());
    ctx.record().clone()
}
