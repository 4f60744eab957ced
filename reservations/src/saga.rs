//! Ordered multi-record writes with compensation.
//!
//! The store only guarantees per-record atomicity, so an operation that touches a
//! reservation, a seat and a train applies the writes in that order and records
//! an inverse for each one. If a later step fails, the recorded inverses run in
//! reverse order before the error is returned:
//!
//! ```text
//! insert Reservation ──► claim Seat ──► reserve capacity on Train
//!        ▲                    ▲                    │ fails
//!        │ delete             │ release            │
//!        └────────────────────┴────────────────────┘
//! ```
//!
//! Administrative changes to the seat pool run the same way: a new train and
//! its seats, or a seat and the capacity it adds or removes.
//!
//! Every step method compensates on its own failure, so callers can use `?`.
//! Callers that decide to abandon the sequence for a domain reason call
//! [`WriteSaga::abort`]. A successful sequence ends with [`WriteSaga::commit`].

use crate::error::ReservationError;
use crate::ledger::CapacityLedger;
use railbook_core::{InventoryStore, Reservation, ReservationId, Seat, SeatId, Train, TrainId};
use railbook_runtime::metrics::ReservationMetrics;

#[derive(Debug)]
enum Undo {
    DeleteReservation(ReservationId),
    RestoreReservation(Box<Reservation>),
    ReinsertReservation(Box<Reservation>),
    ReleaseSeat(SeatId),
    ReclaimSeat(SeatId),
    ReleaseCapacity(TrainId),
    ReserveCapacity(TrainId),
    DeleteTrain(TrainId),
    ReinsertTrain(Box<Train>),
    DeleteSeat(SeatId),
    ReinsertSeat(Box<Seat>),
    ShrinkCapacity(TrainId),
    GrowCapacity(TrainId),
}

/// One in-flight write sequence.
pub struct WriteSaga<'a> {
    store: &'a dyn InventoryStore,
    name: &'static str,
    undo: Vec<Undo>,
}

impl<'a> WriteSaga<'a> {
    /// Start a sequence; `name` labels log lines.
    #[must_use]
    pub fn begin(store: &'a dyn InventoryStore, name: &'static str) -> Self {
        Self {
            store,
            name,
            undo: Vec::new(),
        }
    }

    /// Insert a new reservation.
    ///
    /// # Errors
    ///
    /// The store error, after compensating earlier steps.
    pub async fn insert_reservation(
        &mut self,
        reservation: &Reservation,
    ) -> Result<(), ReservationError> {
        match self.store.insert_reservation(reservation.clone()).await {
            Ok(()) => {
                self.undo.push(Undo::DeleteReservation(reservation.id));
                Ok(())
            }
            Err(e) => Err(self.abort(e.into()).await),
        }
    }

    /// Overwrite a reservation, remembering `previous` for rollback.
    ///
    /// # Errors
    ///
    /// The store error, after compensating earlier steps.
    pub async fn update_reservation(
        &mut self,
        updated: &Reservation,
        previous: &Reservation,
    ) -> Result<(), ReservationError> {
        match self.store.update_reservation(updated.clone()).await {
            Ok(()) => {
                self.undo
                    .push(Undo::RestoreReservation(Box::new(previous.clone())));
                Ok(())
            }
            Err(e) => Err(self.abort(e.into()).await),
        }
    }

    /// Delete a reservation, remembering it for rollback.
    ///
    /// Returns `false` if it was already gone.
    ///
    /// # Errors
    ///
    /// The store error, after compensating earlier steps.
    pub async fn delete_reservation(
        &mut self,
        reservation: &Reservation,
    ) -> Result<bool, ReservationError> {
        match self.store.delete_reservation(reservation.id).await {
            Ok(Some(deleted)) => {
                self.undo.push(Undo::ReinsertReservation(Box::new(deleted)));
                Ok(true)
            }
            Ok(None) => Ok(false),
            Err(e) => Err(self.abort(e.into()).await),
        }
    }

    /// Mark an available seat as held.
    ///
    /// # Errors
    ///
    /// [`ReservationError::SeatAlreadyBooked`] if the seat was not available, or
    /// the store error; earlier steps are compensated either way.
    pub async fn claim_seat(&mut self, seat: &Seat) -> Result<(), ReservationError> {
        match self.store.claim_seat(seat.id).await {
            Ok(true) => {
                self.undo.push(Undo::ReleaseSeat(seat.id));
                Ok(())
            }
            Ok(false) => Err(self
                .abort(ReservationError::SeatAlreadyBooked(seat.seat_number.clone()))
                .await),
            Err(e) => Err(self.abort(e.into()).await),
        }
    }

    /// Mark a held seat as available. Returns `false` if it already was.
    ///
    /// # Errors
    ///
    /// The store error, after compensating earlier steps.
    pub async fn release_seat(&mut self, seat_id: SeatId) -> Result<bool, ReservationError> {
        match self.store.release_seat(seat_id).await {
            Ok(true) => {
                self.undo.push(Undo::ReclaimSeat(seat_id));
                Ok(true)
            }
            Ok(false) => Ok(false),
            Err(e) => Err(self.abort(e.into()).await),
        }
    }

    /// Take one unit of train capacity.
    ///
    /// # Errors
    ///
    /// [`ReservationError::CapacityExhausted`] or the store error, after
    /// compensating earlier steps.
    pub async fn reserve_capacity(&mut self, train_id: TrainId) -> Result<Train, ReservationError> {
        match CapacityLedger::new(self.store).reserve_seat(train_id).await {
            Ok(train) => {
                self.undo.push(Undo::ReleaseCapacity(train_id));
                Ok(train)
            }
            Err(e) => Err(self.abort(e).await),
        }
    }

    /// Return one unit of train capacity. Returns `None` if the ledger was
    /// already at total; there is nothing to undo then.
    ///
    /// # Errors
    ///
    /// The store error, after compensating earlier steps.
    pub async fn release_capacity(
        &mut self,
        train_id: TrainId,
    ) -> Result<Option<Train>, ReservationError> {
        match CapacityLedger::new(self.store).release_seat(train_id).await {
            Ok(Some(train)) => {
                self.undo.push(Undo::ReserveCapacity(train_id));
                Ok(Some(train))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(self.abort(e).await),
        }
    }

    /// Insert a new train.
    ///
    /// # Errors
    ///
    /// The store error, after compensating earlier steps.
    pub async fn insert_train(&mut self, train: &Train) -> Result<(), ReservationError> {
        match self.store.insert_train(train.clone()).await {
            Ok(()) => {
                self.undo.push(Undo::DeleteTrain(train.id));
                Ok(())
            }
            Err(e) => Err(self.abort(e.into()).await),
        }
    }

    /// Delete a train, remembering it for rollback. Returns `false` if it was
    /// already gone.
    ///
    /// # Errors
    ///
    /// The store error, after compensating earlier steps.
    pub async fn delete_train(&mut self, train_id: TrainId) -> Result<bool, ReservationError> {
        match self.store.delete_train(train_id).await {
            Ok(Some(deleted)) => {
                self.undo.push(Undo::ReinsertTrain(Box::new(deleted)));
                Ok(true)
            }
            Ok(None) => Ok(false),
            Err(e) => Err(self.abort(e.into()).await),
        }
    }

    /// Insert new seats.
    ///
    /// # Errors
    ///
    /// The store error, after compensating earlier steps.
    pub async fn insert_seats(&mut self, seats: &[Seat]) -> Result<(), ReservationError> {
        match self.store.insert_seats(seats.to_vec()).await {
            Ok(()) => {
                self.undo
                    .extend(seats.iter().map(|seat| Undo::DeleteSeat(seat.id)));
                Ok(())
            }
            Err(e) => Err(self.abort(e.into()).await),
        }
    }

    /// Delete an available seat, remembering it for rollback. Returns `false`
    /// if the seat is held or already gone.
    ///
    /// # Errors
    ///
    /// The store error, after compensating earlier steps.
    pub async fn delete_seat(&mut self, seat_id: SeatId) -> Result<bool, ReservationError> {
        match self.store.delete_seat(seat_id).await {
            Ok(Some(deleted)) => {
                self.undo.push(Undo::ReinsertSeat(Box::new(deleted)));
                Ok(true)
            }
            Ok(None) => Ok(false),
            Err(e) => Err(self.abort(e.into()).await),
        }
    }

    /// Grow both capacity counters of a train by one.
    ///
    /// # Errors
    ///
    /// The store error, after compensating earlier steps.
    pub async fn grow_capacity(&mut self, train_id: TrainId) -> Result<Train, ReservationError> {
        match CapacityLedger::new(self.store).grow(train_id).await {
            Ok(train) => {
                self.undo.push(Undo::ShrinkCapacity(train_id));
                Ok(train)
            }
            Err(e) => Err(self.abort(e).await),
        }
    }

    /// Shrink both capacity counters of a train by one unheld unit.
    ///
    /// # Errors
    ///
    /// [`ReservationError::CapacityExhausted`] or the store error, after
    /// compensating earlier steps.
    pub async fn shrink_capacity(&mut self, train_id: TrainId) -> Result<Train, ReservationError> {
        match CapacityLedger::new(self.store).shrink(train_id).await {
            Ok(train) => {
                self.undo.push(Undo::GrowCapacity(train_id));
                Ok(train)
            }
            Err(e) => Err(self.abort(e).await),
        }
    }

    /// Roll back every applied step in reverse order and hand back `error`.
    pub async fn abort(&mut self, error: ReservationError) -> ReservationError {
        if self.undo.is_empty() {
            return error;
        }

        ReservationMetrics::record_compensation();
        tracing::warn!(
            saga = self.name,
            steps = self.undo.len(),
            error = %error,
            "Compensating partial write"
        );

        while let Some(step) = self.undo.pop() {
            if let Err(undo_error) = self.apply(&step).await {
                // Nothing left to fall back on; leave a trail for repair.
                tracing::error!(
                    saga = self.name,
                    step = ?step,
                    error = %undo_error,
                    "Compensation step failed"
                );
            }
        }

        error
    }

    /// Finish the sequence; nothing will be rolled back.
    pub fn commit(mut self) {
        tracing::trace!(saga = self.name, steps = self.undo.len(), "Write sequence committed");
        self.undo.clear();
    }

    async fn apply(&self, step: &Undo) -> Result<(), ReservationError> {
        match step {
            Undo::DeleteReservation(id) => {
                self.store.delete_reservation(*id).await?;
            }
            Undo::RestoreReservation(previous) => {
                self.store.update_reservation((**previous).clone()).await?;
            }
            Undo::ReinsertReservation(previous) => {
                self.store.insert_reservation((**previous).clone()).await?;
            }
            Undo::ReleaseSeat(id) => {
                self.store.release_seat(*id).await?;
            }
            Undo::ReclaimSeat(id) => {
                self.store.claim_seat(*id).await?;
            }
            Undo::ReleaseCapacity(id) => {
                CapacityLedger::new(self.store).release_seat(*id).await?;
            }
            Undo::ReserveCapacity(id) => {
                CapacityLedger::new(self.store).reserve_seat(*id).await?;
            }
            Undo::DeleteTrain(id) => {
                self.store.delete_train(*id).await?;
            }
            Undo::ReinsertTrain(train) => {
                self.store.insert_train((**train).clone()).await?;
            }
            Undo::DeleteSeat(id) => {
                if self.store.delete_seat(*id).await?.is_none() {
                    return Err(ReservationError::InUse(format!("seat {id}")));
                }
            }
            Undo::ReinsertSeat(seat) => {
                self.store.insert_seats(vec![(**seat).clone()]).await?;
            }
            Undo::ShrinkCapacity(id) => {
                CapacityLedger::new(self.store).shrink(*id).await?;
            }
            Undo::GrowCapacity(id) => {
                CapacityLedger::new(self.store).grow(*id).await?;
            }
        }
        Ok(())
    }
}

impl Drop for WriteSaga<'_> {
    fn drop(&mut self) {
        if !self.undo.is_empty() {
            tracing::error!(
                saga = self.name,
                steps = self.undo.len(),
                "Write sequence dropped without commit or abort"
            );
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::Utc;
    use railbook_core::{PassengerId, ReservationStatus, ScheduleId};
    use railbook_testing::{InMemoryInventoryStore, StoreOp, fixtures};

    fn confirmed_on(seat: &Seat) -> Reservation {
        Reservation::new(
            PassengerId::new(),
            Some(seat.id),
            ScheduleId::new(),
            ReservationStatus::Confirmed,
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn failed_capacity_step_undoes_seat_and_reservation() {
        let store = InMemoryInventoryStore::new();
        let seeded = fixtures::seed_train(&store, 1);
        let seat = &seeded.seats[0];
        let reservation = confirmed_on(seat);
        store.fail_next(StoreOp::DecrementSeats);

        let mut saga = WriteSaga::begin(&store, "test");
        saga.insert_reservation(&reservation).await.unwrap();
        saga.claim_seat(seat).await.unwrap();
        let result = saga.reserve_capacity(seeded.train.id).await;

        assert!(matches!(result, Err(ReservationError::Store(_))));
        assert!(store.reservation(reservation.id).is_none());
        assert!(store.seat(seat.id).unwrap().is_available);
        assert_eq!(store.train(seeded.train.id).unwrap().available_seats, 1);
    }

    #[tokio::test]
    async fn taken_seat_aborts_with_seat_already_booked() {
        let store = InMemoryInventoryStore::new();
        let seeded = fixtures::seed_train(&store, 1);
        let seat = &seeded.seats[0];
        store.claim_seat(seat.id).await.unwrap();
        let reservation = confirmed_on(seat);

        let mut saga = WriteSaga::begin(&store, "test");
        saga.insert_reservation(&reservation).await.unwrap();
        let result = saga.claim_seat(seat).await;

        assert!(matches!(result, Err(ReservationError::SeatAlreadyBooked(_))));
        assert!(store.reservation(reservation.id).is_none());
        assert!(!store.seat(seat.id).unwrap().is_available);
    }

    #[tokio::test]
    async fn abort_restores_updated_and_deleted_records() {
        let store = InMemoryInventoryStore::new();
        let seeded = fixtures::seed_train(&store, 2);
        let first = confirmed_on(&seeded.seats[0]);
        let second = confirmed_on(&seeded.seats[1]);
        store.put_reservation(first.clone());
        store.put_reservation(second.clone());

        let mut canceled = first.clone();
        canceled.status = ReservationStatus::Canceled;
        canceled.seat_id = None;

        let mut saga = WriteSaga::begin(&store, "test");
        saga.update_reservation(&canceled, &first).await.unwrap();
        assert!(saga.delete_reservation(&second).await.unwrap());
        let returned = saga.abort(ReservationError::WaitlistFull).await;

        assert_eq!(returned, ReservationError::WaitlistFull);
        assert_eq!(store.reservation(first.id).unwrap(), first);
        assert_eq!(store.reservation(second.id).unwrap(), second);
    }

    #[tokio::test]
    async fn capped_capacity_release_is_not_undone() {
        let store = InMemoryInventoryStore::new();
        let seeded = fixtures::seed_train(&store, 2);
        let reservation = confirmed_on(&seeded.seats[0]);
        store.put_reservation(reservation.clone());

        let mut canceled = reservation.clone();
        canceled.status = ReservationStatus::Canceled;

        // The ledger is already at total, so the release moves nothing.
        let mut saga = WriteSaga::begin(&store, "test");
        saga.update_reservation(&canceled, &reservation).await.unwrap();
        assert!(saga.release_capacity(seeded.train.id).await.unwrap().is_none());
        saga.abort(ReservationError::WaitlistFull).await;

        assert_eq!(store.train(seeded.train.id).unwrap().available_seats, 2);
        assert_eq!(store.reservation(reservation.id).unwrap(), reservation);
    }

    #[tokio::test]
    async fn failed_capacity_growth_removes_inserted_seat() {
        let store = InMemoryInventoryStore::new();
        let seeded = fixtures::seed_train(&store, 1);
        let seat = Seat::new(seeded.train.id, "A2", "A");
        store.fail_next(StoreOp::GrowCapacity);

        let mut saga = WriteSaga::begin(&store, "test");
        saga.insert_seats(std::slice::from_ref(&seat)).await.unwrap();
        let result = saga.grow_capacity(seeded.train.id).await;

        assert!(matches!(result, Err(ReservationError::Store(_))));
        assert!(store.seat(seat.id).is_none());
        assert_eq!(store.train(seeded.train.id).unwrap().total_seats, 1);
    }

    #[tokio::test]
    async fn committed_saga_keeps_its_writes() {
        let store = InMemoryInventoryStore::new();
        let seeded = fixtures::seed_train(&store, 1);
        let seat = &seeded.seats[0];
        let reservation = confirmed_on(seat);

        let mut saga = WriteSaga::begin(&store, "test");
        saga.insert_reservation(&reservation).await.unwrap();
        saga.claim_seat(seat).await.unwrap();
        saga.reserve_capacity(seeded.train.id).await.unwrap();
        saga.commit();

        assert!(store.reservation(reservation.id).is_some());
        assert!(!store.seat(seat.id).unwrap().is_available);
        assert_eq!(store.train(seeded.train.id).unwrap().available_seats, 0);
    }
}
