//! Fixed-interval driver for periodic maintenance.
//!
//! The [`Scheduler`] owns one background task that calls a [`PeriodicTask`] on a
//! `tokio::time::interval`. Ticks never overlap: a slow tick delays the next one
//! and missed ticks are skipped rather than bursted.
//!
//! # Graceful Shutdown
//!
//! [`SchedulerHandle::shutdown`] broadcasts a stop signal. A tick already in
//! progress runs to completion (operations are fire-to-completion); the loop
//! then exits. If the tick outlives the timeout the task is aborted.

use crate::metrics::SchedulerMetrics;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Outcome of one tick, used for logging and metrics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Units of work (e.g. schedules) handled successfully
    pub processed: usize,
    /// Units of work that failed and were skipped
    pub failed: usize,
}

/// Work performed on every tick.
pub trait PeriodicTask: Send + Sync + 'static {
    /// Short name used in logs and metric labels.
    fn name(&self) -> &'static str;

    /// Run one pass. Must not fail as a whole; per-item failures go in the report.
    fn run_once(&self) -> Pin<Box<dyn Future<Output = TickReport> + Send + '_>>;
}

/// Errors from stopping a scheduler.
#[derive(Error, Debug)]
pub enum SchedulerError {
    /// The running tick did not finish within the shutdown timeout
    #[error("Scheduler shutdown timed out after {0:?}")]
    ShutdownTimeout(Duration),

    /// The background task panicked
    #[error("Scheduler task failed: {0}")]
    TaskFailed(#[from] tokio::task::JoinError),
}

/// Spawns periodic tasks.
#[derive(Debug, Clone, Copy)]
pub struct Scheduler {
    interval: Duration,
}

impl Scheduler {
    /// Create a scheduler ticking every `interval`.
    ///
    /// A zero interval is raised to one millisecond; the tick timer cannot run
    /// with a zero period.
    #[must_use]
    pub const fn new(interval: Duration) -> Self {
        let interval = if interval.is_zero() {
            Duration::from_millis(1)
        } else {
            interval
        };
        Self { interval }
    }

    /// Tick interval.
    #[must_use]
    pub const fn interval(&self) -> Duration {
        self.interval
    }

    /// Start driving `task` in the background. The first tick fires immediately.
    #[must_use]
    pub fn spawn<T: PeriodicTask>(&self, task: Arc<T>) -> SchedulerHandle {
        let (shutdown_tx, mut shutdown_rx) = broadcast::channel::<()>(1);
        let period = self.interval;

        let join = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            info!(task = task.name(), interval_ms = period.as_millis(), "Scheduler started");

            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => break,
                    _ = ticker.tick() => {
                        let started = Instant::now();
                        let report = task.run_once().await;
                        SchedulerMetrics::record_tick(task.name(), report, started.elapsed());

                        if report.failed > 0 {
                            warn!(
                                task = task.name(),
                                processed = report.processed,
                                failed = report.failed,
                                "Tick completed with failures"
                            );
                        } else {
                            debug!(task = task.name(), processed = report.processed, "Tick completed");
                        }
                    }
                }
            }

            info!(task = task.name(), "Scheduler stopped");
        });

        SchedulerHandle { shutdown_tx, join }
    }
}

/// Handle to a running scheduler.
#[derive(Debug)]
pub struct SchedulerHandle {
    shutdown_tx: broadcast::Sender<()>,
    join: JoinHandle<()>,
}

impl SchedulerHandle {
    /// Whether the background task has exited.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Signal shutdown and wait for the current tick to finish.
    ///
    /// # Errors
    ///
    /// [`SchedulerError::ShutdownTimeout`] if the tick is still running after
    /// `timeout` (the task is aborted), or [`SchedulerError::TaskFailed`] if it panicked.
    pub async fn shutdown(self, timeout: Duration) -> Result<(), SchedulerError> {
        // A send error only means the loop already exited.
        let _ = self.shutdown_tx.send(());

        let abort = self.join.abort_handle();
        match tokio::time::timeout(timeout, self.join).await {
            Ok(joined) => joined.map_err(SchedulerError::from),
            Err(_) => {
                abort.abort();
                Err(SchedulerError::ShutdownTimeout(timeout))
            }
        }
    }
}
