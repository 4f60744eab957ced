//! Reservation cancellation and its cascade into promotion.

use crate::engine::ReservationEngine;
use crate::error::ReservationError;
use crate::saga::WriteSaga;
use railbook_core::{Reservation, ReservationId, ReservationStatus, Schedule, SeatId};
use railbook_runtime::LeaseKey;
use railbook_runtime::metrics::ReservationMetrics;
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument, warn};

/// What a cancellation did.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CancelOutcome {
    /// A waiting reservation was removed from the waitlist
    RemovedFromWaitlist,
    /// A confirmed reservation was canceled and its seat handed on
    Canceled {
        /// Waiting reservations promoted into the freed capacity
        promoted: usize,
    },
}

impl ReservationEngine {
    /// Cancel a reservation.
    ///
    /// A Waiting reservation is deleted. A Confirmed one becomes Canceled, its
    /// seat and capacity are returned, and the waitlist is promoted against the
    /// freed seat.
    ///
    /// # Errors
    ///
    /// - [`NotFound`](ReservationError::NotFound) / [`AlreadyCanceled`](ReservationError::AlreadyCanceled)
    /// - [`CancellationClosed`](ReservationError::CancellationClosed) after `arrival - cutoff`
    /// - [`MissingSeatInformation`](ReservationError::MissingSeatInformation) for a
    ///   Confirmed reservation without a seat (the record is deleted)
    /// - [`Busy`](ReservationError::Busy) or a store failure (after rollback)
    #[instrument(skip(self), fields(reservation_id = %reservation_id))]
    pub async fn cancel_reservation(
        &self,
        reservation_id: ReservationId,
    ) -> Result<CancelOutcome, ReservationError> {
        let reservation = self.load_reservation(reservation_id).await?;
        ensure_cancellable(&reservation)?;

        let schedule = self.load_schedule(reservation.schedule_id).await?;
        let env = self.environment();
        if env.policy.cancellation_closed(&schedule, env.now()) {
            warn!("Cancellation window closed");
            return Err(ReservationError::CancellationClosed);
        }

        let mut keys = vec![LeaseKey::Schedule(schedule.id)];
        keys.extend(reservation.seat_id.map(LeaseKey::Seat));
        let _lease = self.lease(&keys).await?;

        // Re-read under the lease; a promotion or sweep may have moved it.
        let reservation = self.load_reservation(reservation_id).await?;
        ensure_cancellable(&reservation)?;

        let outcome = match (reservation.status, reservation.seat_id) {
            (ReservationStatus::Confirmed, Some(seat_id)) => {
                self.cancel_confirmed(&schedule, &reservation, seat_id)
                    .await?
            }
            (ReservationStatus::Confirmed, None) => {
                error!("Confirmed reservation without seat; removing it");
                self.store().delete_reservation(reservation.id).await?;
                return Err(ReservationError::MissingSeatInformation(
                    reservation.id.to_string(),
                ));
            }
            _ => self.leave_waitlist(&schedule, &reservation).await?,
        };

        ReservationMetrics::record_canceled();
        Ok(outcome)
    }

    async fn cancel_confirmed(
        &self,
        schedule: &Schedule,
        reservation: &Reservation,
        seat_id: SeatId,
    ) -> Result<CancelOutcome, ReservationError> {
        let mut canceled = reservation.clone();
        canceled.status = ReservationStatus::Canceled;
        canceled.seat_id = None;

        let mut saga = WriteSaga::begin(self.store(), "cancel");
        saga.update_reservation(&canceled, reservation).await?;
        saga.release_seat(seat_id).await?;
        let released = saga.release_capacity(schedule.train_id).await?;
        saga.commit();

        info!(
            available = ?released.map(|train| train.available_seats),
            "Reservation canceled"
        );

        // The cancellation has committed; a failed promotion is retried by the
        // maintenance loop rather than reported as a failed cancel.
        let promoted = match self.promote_locked(schedule, Some(seat_id)).await {
            Ok(promoted) => promoted,
            Err(e) => {
                warn!(error = %e, "Promotion after cancellation failed");
                0
            }
        };
        Ok(CancelOutcome::Canceled { promoted })
    }

    async fn leave_waitlist(
        &self,
        schedule: &Schedule,
        reservation: &Reservation,
    ) -> Result<CancelOutcome, ReservationError> {
        let mut saga = WriteSaga::begin(self.store(), "leave-waitlist");
        saga.delete_reservation(reservation).await?;
        if let Some(seat_id) = reservation.seat_id {
            if let Err(e) = self
                .release_orphaned_seat(&mut saga, schedule.train_id, seat_id)
                .await
            {
                return Err(saga.abort(e).await);
            }
        }
        saga.commit();

        info!("Waiting reservation removed");
        Ok(CancelOutcome::RemovedFromWaitlist)
    }
}

fn ensure_cancellable(reservation: &Reservation) -> Result<(), ReservationError> {
    if reservation.status.is_terminal() {
        return Err(ReservationError::AlreadyCanceled(reservation.id.to_string()));
    }
    Ok(())
}
