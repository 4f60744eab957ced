//! Boarding confirmed passengers shortly before arrival.

use crate::engine::ReservationEngine;
use crate::error::ReservationError;
use railbook_core::{BoardingStatus, Reservation, ReservationId, ReservationQuery, ReservationStatus};
use railbook_runtime::LeaseKey;
use tracing::{info, instrument};

impl ReservationEngine {
    /// Mark a confirmed reservation as boarded.
    ///
    /// Boarding opens `boarding_window` before arrival and closes at arrival.
    /// Boarding an already boarded reservation returns it unchanged.
    ///
    /// # Errors
    ///
    /// [`NotConfirmed`](ReservationError::NotConfirmed) unless the reservation is
    /// Confirmed, [`BoardingClosed`](ReservationError::BoardingClosed) outside the
    /// window, plus the usual `NotFound` / `Busy` / store failures.
    #[instrument(skip(self), fields(reservation_id = %reservation_id))]
    pub async fn board(&self, reservation_id: ReservationId) -> Result<Reservation, ReservationError> {
        let reservation = self.load_reservation(reservation_id).await?;
        let schedule = self.load_schedule(reservation.schedule_id).await?;
        let _lease = self.lease(&[LeaseKey::Schedule(schedule.id)]).await?;

        let mut reservation = self.load_reservation(reservation_id).await?;
        if reservation.status != ReservationStatus::Confirmed {
            return Err(ReservationError::NotConfirmed(reservation.id.to_string()));
        }
        let env = self.environment();
        if !env.policy.boarding_open(&schedule, env.now()) {
            return Err(ReservationError::BoardingClosed);
        }
        if reservation.boarding_status == BoardingStatus::Boarded {
            return Ok(reservation);
        }

        reservation.boarding_status = BoardingStatus::Boarded;
        self.store().update_reservation(reservation.clone()).await?;
        info!("Passenger boarded");
        Ok(reservation)
    }

    /// Every boarded reservation, oldest first.
    ///
    /// # Errors
    ///
    /// Store failures.
    pub async fn boarded_reservations(&self) -> Result<Vec<Reservation>, ReservationError> {
        Ok(self
            .store()
            .find_reservations(ReservationQuery::default().boarded())
            .await?)
    }
}
