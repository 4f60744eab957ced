//! Waitlist promotion in reservation-time order.

use crate::engine::ReservationEngine;
use crate::error::ReservationError;
use crate::saga::WriteSaga;
use railbook_core::{Reservation, ReservationQuery, ReservationStatus, Schedule, ScheduleId, SeatId};
use railbook_runtime::LeaseKey;
use railbook_runtime::metrics::ReservationMetrics;
use tracing::{debug, info, instrument};

/// Outcome of trying to promote one waiting reservation.
enum Step {
    Promoted(SeatId),
    /// Out of capacity or seats; later entries must not jump the queue.
    Stop,
}

impl ReservationEngine {
    /// Promote waiting reservations of a schedule while capacity allows.
    ///
    /// Returns how many were promoted. Promotion walks the waitlist strictly by
    /// `reservation_time` and stops at the first entry that cannot be seated.
    ///
    /// # Errors
    ///
    /// [`NotFound`](ReservationError::NotFound) for an unknown schedule,
    /// [`Busy`](ReservationError::Busy) on lease contention, or a store failure.
    #[instrument(skip(self), fields(schedule_id = %schedule_id))]
    pub async fn promote(&self, schedule_id: ScheduleId) -> Result<usize, ReservationError> {
        let schedule = self.load_schedule(schedule_id).await?;
        let _lease = self.lease(&[LeaseKey::Schedule(schedule.id)]).await?;
        self.promote_locked(&schedule, None).await
    }

    /// Promotion body; the caller holds the schedule lease.
    ///
    /// `freed_seat` is the seat a cancellation just released, preferred for the
    /// first promotee that has no seat preference of its own.
    pub(crate) async fn promote_locked(
        &self,
        schedule: &Schedule,
        mut freed_seat: Option<SeatId>,
    ) -> Result<usize, ReservationError> {
        let waiting = self
            .store()
            .find_reservations(
                ReservationQuery::for_schedule(schedule.id)
                    .with_status(ReservationStatus::Waiting),
            )
            .await?;

        let mut promoted = 0;
        for reservation in &waiting {
            match self.promote_one(schedule, reservation, freed_seat).await? {
                Step::Promoted(seat_id) => {
                    promoted += 1;
                    if freed_seat == Some(seat_id) {
                        freed_seat = None;
                    }
                }
                Step::Stop => break,
            }
        }

        if promoted > 0 {
            ReservationMetrics::record_promoted(promoted);
            info!(
                schedule_id = %schedule.id,
                promoted,
                still_waiting = waiting.len() - promoted,
                "Waitlist promoted"
            );
        }
        Ok(promoted)
    }

    async fn promote_one(
        &self,
        schedule: &Schedule,
        reservation: &Reservation,
        freed_seat: Option<SeatId>,
    ) -> Result<Step, ReservationError> {
        let preferred: Vec<SeatId> = reservation.seat_id.into_iter().chain(freed_seat).collect();

        // A failed claim means another schedule of the train took the seat in
        // between; it is no longer available, so the next choice differs.
        loop {
            let train = self.load_train(schedule.train_id).await?;
            if train.available_seats == 0 {
                debug!(schedule_id = %schedule.id, "No capacity left for promotion");
                return Ok(Step::Stop);
            }
            let Some(seat) = self
                .choose_seat(schedule, Some(reservation.id), &preferred)
                .await?
            else {
                debug!(schedule_id = %schedule.id, "No free seat left for promotion");
                return Ok(Step::Stop);
            };

            let mut confirmed = reservation.clone();
            confirmed.status = ReservationStatus::Confirmed;
            confirmed.seat_id = Some(seat.id);

            let mut saga = WriteSaga::begin(self.store(), "promote");
            saga.update_reservation(&confirmed, reservation).await?;
            match saga.claim_seat(&seat).await {
                Ok(()) => {}
                Err(ReservationError::SeatAlreadyBooked(_)) => continue,
                Err(e) => return Err(e),
            }
            match saga.reserve_capacity(schedule.train_id).await {
                Ok(_) => {}
                Err(ReservationError::CapacityExhausted(_)) => return Ok(Step::Stop),
                Err(e) => return Err(e),
            }
            saga.commit();

            info!(
                reservation_id = %reservation.id,
                seat_number = %seat.seat_number,
                "Reservation promoted"
            );
            return Ok(Step::Promoted(seat.id));
        }
    }
}
