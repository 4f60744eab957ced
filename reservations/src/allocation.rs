//! Admission: confirm, waitlist or reject a reservation request.

use crate::engine::ReservationEngine;
use crate::error::ReservationError;
use crate::saga::WriteSaga;
use railbook_core::{
    Passenger, PassengerId, Reservation, ReservationQuery, ReservationStatus, Schedule, ScheduleId, Seat,
    SeatId,
};
use railbook_runtime::LeaseKey;
use railbook_runtime::metrics::ReservationMetrics;
use tracing::{info, instrument, warn};

impl ReservationEngine {
    /// Request a seat (or a waitlist place, with `seat_id: None`) on a schedule.
    ///
    /// Policy, in order:
    /// 1. inside the booking cutoff before departure: [`ReservationClosed`]
    /// 2. a requested seat must belong to the train and must not be referenced
    ///    by another Confirmed/Waiting reservation on the schedule
    /// 3. while fewer than `total_seats` are confirmed and the ledger has room,
    ///    confirm (assigning the requested or lowest free seat); if another
    ///    departure of the train takes the last unit first, fall through
    /// 4. otherwise join the waitlist unless it already holds `total_seats`
    ///    entries ([`WaitlistFull`])
    ///
    /// The returned record reflects any promotion that happened before return.
    ///
    /// # Errors
    ///
    /// The rejections above, [`NotFound`] for unknown ids, [`Busy`] when the
    /// schedule or seat lease is contended, or a store failure (after rollback).
    ///
    /// [`ReservationClosed`]: ReservationError::ReservationClosed
    /// [`WaitlistFull`]: ReservationError::WaitlistFull
    /// [`NotFound`]: ReservationError::NotFound
    /// [`Busy`]: ReservationError::Busy
    #[instrument(skip(self), fields(passenger_id = %passenger_id, schedule_id = %schedule_id))]
    pub async fn request_reservation(
        &self,
        passenger_id: PassengerId,
        seat_id: Option<SeatId>,
        schedule_id: ScheduleId,
    ) -> Result<Reservation, ReservationError> {
        let result = self.admit(passenger_id, seat_id, schedule_id).await;
        match &result {
            Ok(reservation) if reservation.status == ReservationStatus::Confirmed => {
                ReservationMetrics::record_confirmed();
            }
            Ok(_) => ReservationMetrics::record_waitlisted(),
            Err(e) => {
                ReservationMetrics::record_rejected(e.reason());
                warn!(reason = e.reason(), error = %e, "Reservation request rejected");
            }
        }
        result
    }

    async fn admit(
        &self,
        passenger_id: PassengerId,
        seat_id: Option<SeatId>,
        schedule_id: ScheduleId,
    ) -> Result<Reservation, ReservationError> {
        let passenger = self.load_passenger(passenger_id).await?;
        let schedule = self.load_schedule(schedule_id).await?;
        self.load_train(schedule.train_id).await?;

        if self.booking_closed(&schedule) {
            return Err(ReservationError::ReservationClosed);
        }

        let mut keys = vec![LeaseKey::Schedule(schedule.id)];
        keys.extend(seat_id.map(LeaseKey::Seat));
        let _lease = self.lease(&keys).await?;

        self.admit_locked(&passenger, seat_id, &schedule).await
    }

    fn booking_closed(&self, schedule: &Schedule) -> bool {
        let env = self.environment();
        env.policy.reservation_closed(schedule, env.now())
    }

    async fn admit_locked(
        &self,
        passenger: &Passenger,
        seat_id: Option<SeatId>,
        schedule: &Schedule,
    ) -> Result<Reservation, ReservationError> {
        let requested = match seat_id {
            Some(id) => Some(self.requested_seat(schedule, id).await?),
            None => None,
        };

        let by_status = |status| ReservationQuery::for_schedule(schedule.id).with_status(status);
        let confirmed = self
            .store()
            .count_reservations(by_status(ReservationStatus::Confirmed))
            .await?;
        let waiting = self
            .store()
            .count_reservations(by_status(ReservationStatus::Waiting))
            .await?;
        let train = self.load_train(schedule.train_id).await?;

        if confirmed < train.total_seats as usize && train.available_seats > 0 {
            match &requested {
                Some(seat) if seat.is_available => {
                    match self.confirm(passenger, seat, schedule).await {
                        // Another departure of the train took the last unit;
                        // queue with the seat kept as a preference.
                        Err(ReservationError::CapacityExhausted(_)) => {}
                        other => return other,
                    }
                }
                Some(seat) => {
                    return Err(ReservationError::SeatAlreadyBooked(seat.seat_number.clone()));
                }
                None => {
                    while let Some(seat) = self.choose_seat(schedule, None, &[]).await? {
                        match self.confirm(passenger, &seat, schedule).await {
                            // Another departure of the train claimed it first.
                            Err(ReservationError::SeatAlreadyBooked(_)) => {}
                            Err(ReservationError::CapacityExhausted(_)) => break,
                            other => return other,
                        }
                    }
                }
            }
        }

        if waiting >= train.total_seats as usize {
            return Err(ReservationError::WaitlistFull);
        }
        self.waitlist(passenger, requested.map(|s| s.id), schedule)
            .await
    }

    /// Resolve a requested seat and check it is not already spoken for.
    async fn requested_seat(
        &self,
        schedule: &Schedule,
        seat_id: SeatId,
    ) -> Result<Seat, ReservationError> {
        let seat = self
            .store()
            .get_seat(seat_id)
            .await?
            .filter(|seat| seat.train_id == schedule.train_id)
            .ok_or_else(|| ReservationError::SeatNotFound(seat_id.to_string()))?;

        let taken = self
            .store()
            .count_reservations(
                ReservationQuery::for_schedule(schedule.id)
                    .with_seat(seat_id)
                    .active(),
            )
            .await?;
        if taken > 0 {
            return Err(ReservationError::SeatAlreadyBooked(seat.seat_number));
        }
        Ok(seat)
    }

    async fn confirm(
        &self,
        passenger: &Passenger,
        seat: &Seat,
        schedule: &Schedule,
    ) -> Result<Reservation, ReservationError> {
        let reservation = Reservation::new(
            passenger.id,
            Some(seat.id),
            schedule.id,
            ReservationStatus::Confirmed,
            self.environment().reservation_time(),
        );

        let mut saga = WriteSaga::begin(self.store(), "confirm");
        saga.insert_reservation(&reservation).await?;
        saga.claim_seat(seat).await?;
        let train = saga.reserve_capacity(schedule.train_id).await?;
        saga.commit();

        info!(
            reservation_id = %reservation.id,
            seat_number = %seat.seat_number,
            available = train.available_seats,
            "Reservation confirmed"
        );

        if train.available_seats == 0 {
            // Capacity just ran out: resolve the waitlist against the cutoff now.
            if let Err(e) = self.sweep_locked(schedule).await {
                warn!(error = %e, "Early sweep failed");
            }
        }

        Ok(reservation)
    }

    async fn waitlist(
        &self,
        passenger: &Passenger,
        preferred_seat: Option<SeatId>,
        schedule: &Schedule,
    ) -> Result<Reservation, ReservationError> {
        let reservation = Reservation::new(
            passenger.id,
            preferred_seat,
            schedule.id,
            ReservationStatus::Waiting,
            self.environment().reservation_time(),
        );
        self.store().insert_reservation(reservation.clone()).await?;
        info!(reservation_id = %reservation.id, "Reservation waitlisted");

        // Capacity may have been freed while this request was being decided.
        if let Err(e) = self.promote_locked(schedule, None).await {
            warn!(error = %e, "Promotion after waitlisting failed");
        }

        Ok(self
            .store()
            .get_reservation(reservation.id)
            .await?
            .unwrap_or(reservation))
    }
}
