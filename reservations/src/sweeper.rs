//! Cutoff sweep: force resolution of the waitlist once booking has closed.

use crate::engine::ReservationEngine;
use crate::error::ReservationError;
use crate::saga::WriteSaga;
use railbook_core::{ReservationQuery, ReservationStatus, Schedule, ScheduleId};
use railbook_runtime::LeaseKey;
use railbook_runtime::metrics::ReservationMetrics;
use tracing::{debug, info, instrument};

impl ReservationEngine {
    /// Resolve every unconfirmed reservation of a schedule inside its cutoff window.
    ///
    /// Waiting reservations become Not-Confirmed and every Not-Confirmed
    /// reservation is then deleted, releasing any seat it was left holding.
    /// Returns the number deleted. Outside `[departure - cutoff, departure)` this
    /// is a no-op, and a second call inside the window resolves nothing new.
    ///
    /// # Errors
    ///
    /// [`NotFound`](ReservationError::NotFound) for an unknown schedule,
    /// [`Busy`](ReservationError::Busy) on lease contention, or a store failure.
    #[instrument(skip(self), fields(schedule_id = %schedule_id))]
    pub async fn sweep(&self, schedule_id: ScheduleId) -> Result<usize, ReservationError> {
        let schedule = self.load_schedule(schedule_id).await?;
        let _lease = self.lease(&[LeaseKey::Schedule(schedule.id)]).await?;
        self.sweep_locked(&schedule).await
    }

    /// Sweep body; the caller holds the schedule lease.
    pub(crate) async fn sweep_locked(&self, schedule: &Schedule) -> Result<usize, ReservationError> {
        let env = self.environment();
        if !env.policy.sweep_due(schedule, env.now()) {
            debug!(schedule_id = %schedule.id, "Sweep not due");
            return Ok(0);
        }

        let of_schedule = |status| ReservationQuery::for_schedule(schedule.id).with_status(status);

        for waiting in self
            .store()
            .find_reservations(of_schedule(ReservationStatus::Waiting))
            .await?
        {
            let mut unconfirmed = waiting;
            unconfirmed.status = ReservationStatus::NotConfirmed;
            self.store().update_reservation(unconfirmed).await?;
        }

        // Also picks up leftovers of an earlier sweep that stopped half-way.
        let mut resolved = 0;
        for reservation in self
            .store()
            .find_reservations(of_schedule(ReservationStatus::NotConfirmed))
            .await?
        {
            let mut saga = WriteSaga::begin(self.store(), "sweep");
            if !saga.delete_reservation(&reservation).await? {
                continue;
            }
            if let Some(seat_id) = reservation.seat_id {
                if let Err(e) = self
                    .release_orphaned_seat(&mut saga, schedule.train_id, seat_id)
                    .await
                {
                    return Err(saga.abort(e).await);
                }
            }
            saga.commit();
            resolved += 1;
        }

        if resolved > 0 {
            ReservationMetrics::record_swept(resolved);
            info!(schedule_id = %schedule.id, resolved, "Unconfirmed reservations swept");
        }
        Ok(resolved)
    }
}
