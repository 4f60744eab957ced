//! Periodic sweep and promotion across every schedule.

use crate::engine::ReservationEngine;
use crate::error::ReservationError;
use futures::future::join_all;
use railbook_core::Schedule;
use railbook_runtime::retry::{RetryPolicy, retry_when};
use railbook_runtime::{PeriodicTask, TickReport};
use std::future::Future;
use std::pin::Pin;
use tracing::{error, warn};

/// Runs `sweep` then `promote` for every schedule on each tick.
///
/// Schedules are processed concurrently; each takes its own lease, so they do
/// not contend with one another. A failure on one schedule is logged and
/// counted without stopping the others. Lease contention with user traffic is
/// retried with backoff before it counts as a failure.
#[derive(Clone, Debug)]
pub struct MaintenanceTask {
    engine: ReservationEngine,
    retry: RetryPolicy,
}

impl MaintenanceTask {
    /// Maintenance over `engine` with the default retry policy.
    #[must_use]
    pub fn new(engine: ReservationEngine) -> Self {
        Self {
            engine,
            retry: RetryPolicy::default(),
        }
    }

    /// Replace the retry policy for `Busy` outcomes.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// One pass over every schedule.
    pub async fn tick(&self) -> TickReport {
        let schedules = match self.engine.list_schedules().await {
            Ok(schedules) => schedules,
            Err(e) => {
                error!(error = %e, "Could not list schedules");
                return TickReport {
                    processed: 0,
                    failed: 1,
                };
            }
        };

        let outcomes = join_all(schedules.iter().map(|s| self.maintain(s))).await;
        let failed = outcomes.iter().filter(|o| o.is_err()).count();
        TickReport {
            processed: outcomes.len() - failed,
            failed,
        }
    }

    async fn maintain(&self, schedule: &Schedule) -> Result<(), ReservationError> {
        let result = self.sweep_then_promote(schedule).await;
        if let Err(e) = &result {
            warn!(schedule_id = %schedule.id, error = %e, "Schedule maintenance failed");
        }
        result
    }

    async fn sweep_then_promote(&self, schedule: &Schedule) -> Result<(), ReservationError> {
        let engine = &self.engine;
        retry_when(&self.retry, || engine.sweep(schedule.id), ReservationError::is_busy).await?;
        retry_when(&self.retry, || engine.promote(schedule.id), ReservationError::is_busy).await?;
        Ok(())
    }
}

impl PeriodicTask for MaintenanceTask {
    fn name(&self) -> &'static str {
        "reservation-maintenance"
    }

    fn run_once(&self) -> Pin<Box<dyn Future<Output = TickReport> + Send + '_>> {
        Box::pin(self.tick())
    }
}
