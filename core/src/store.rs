//! Inventory store contract.
//!
//! The store is an external collaborator holding Trains, Schedules, Seats,
//! Reservations and Passengers. It offers point lookups, filtered finds, counts and
//! **single-record** atomic updates. Nothing here promises multi-record
//! transactions; the engine composes multi-record changes as ordered writes with
//! compensation.
//!
//! # Dyn Compatibility
//!
//! Methods return explicit `Pin<Box<dyn Future>>` instead of `async fn` so the
//! store can be shared as `Arc<dyn InventoryStore>` across the engine and the
//! scheduler loop.

use crate::types::{
    Passenger, PassengerId, Reservation, ReservationId, ReservationStatus, Schedule, ScheduleId,
    Seat, SeatId, Train, TrainId,
};
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Boxed future returned by every store operation.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + Send + 'a>>;

/// Errors raised by a store implementation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// A unique constraint would be violated (duplicate id, name, number)
    #[error("Duplicate record: {0}")]
    Duplicate(String),

    /// The record addressed by an update does not exist
    #[error("Record not found: {0}")]
    Missing(String),

    /// Backend connectivity or query failure
    #[error("Database error: {0}")]
    DatabaseError(String),
}

/// Filter for reservation finds and counts.
///
/// Unset fields match everything. Results of [`InventoryStore::find_reservations`]
/// are always sorted by `reservation_time` ascending; callers never rely on
/// storage iteration order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReservationQuery {
    /// Restrict to one schedule
    pub schedule_id: Option<ScheduleId>,
    /// Restrict to a set of schedules (e.g. every schedule of a train)
    pub schedule_ids: Option<Vec<ScheduleId>>,
    /// Restrict to one passenger
    pub passenger_id: Option<PassengerId>,
    /// Restrict to one referenced seat
    pub seat_id: Option<SeatId>,
    /// Restrict to any of these statuses
    pub statuses: Option<Vec<ReservationStatus>>,
    /// Restrict to boarded reservations
    pub boarded_only: bool,
}

impl ReservationQuery {
    /// Reservations of one schedule.
    #[must_use]
    pub fn for_schedule(schedule_id: ScheduleId) -> Self {
        Self {
            schedule_id: Some(schedule_id),
            ..Self::default()
        }
    }

    /// Reservations of one passenger.
    #[must_use]
    pub fn for_passenger(passenger_id: PassengerId) -> Self {
        Self {
            passenger_id: Some(passenger_id),
            ..Self::default()
        }
    }

    /// Reservations of any of the given schedules.
    #[must_use]
    pub fn for_schedules(schedule_ids: Vec<ScheduleId>) -> Self {
        Self {
            schedule_ids: Some(schedule_ids),
            ..Self::default()
        }
    }

    /// Narrow to one referenced seat.
    #[must_use]
    pub const fn with_seat(mut self, seat_id: SeatId) -> Self {
        self.seat_id = Some(seat_id);
        self
    }

    /// Narrow to a single status.
    #[must_use]
    pub fn with_status(mut self, status: ReservationStatus) -> Self {
        self.statuses = Some(vec![status]);
        self
    }

    /// Narrow to Confirmed or Waiting.
    #[must_use]
    pub fn active(mut self) -> Self {
        self.statuses = Some(vec![ReservationStatus::Confirmed, ReservationStatus::Waiting]);
        self
    }

    /// Narrow to boarded reservations.
    #[must_use]
    pub const fn boarded(mut self) -> Self {
        self.boarded_only = true;
        self
    }

    /// Whether a reservation satisfies this filter.
    #[must_use]
    pub fn matches(&self, reservation: &Reservation) -> bool {
        self.schedule_id.is_none_or(|id| reservation.schedule_id == id)
            && self
                .schedule_ids
                .as_ref()
                .is_none_or(|ids| ids.contains(&reservation.schedule_id))
            && self.passenger_id.is_none_or(|id| reservation.passenger_id == id)
            && self.seat_id.is_none_or(|id| reservation.seat_id == Some(id))
            && self
                .statuses
                .as_ref()
                .is_none_or(|statuses| statuses.contains(&reservation.status))
            && (!self.boarded_only
                || reservation.boarding_status == crate::types::BoardingStatus::Boarded)
    }
}

/// Durable inventory records with per-record atomic updates.
///
/// # Atomic primitives
///
/// The capacity ledger and seat availability are only ever changed through the
/// conditional single-record operations below, mirroring a document store's
/// `findOneAndUpdate` with a guard:
///
/// - [`claim_seat`](Self::claim_seat): `is_available: true -> false`, else no-op
/// - [`release_seat`](Self::release_seat): `is_available: false -> true`, else no-op
/// - [`decrement_available_seats`](Self::decrement_available_seats): only when `> 0`
/// - [`increment_available_seats`](Self::increment_available_seats): only when `< total`
/// - [`grow_capacity`](Self::grow_capacity): `total` and `available` up by one together
/// - [`shrink_capacity`](Self::shrink_capacity): both down by one, only when `available > 0`
/// - [`delete_seat`](Self::delete_seat): only while the seat is available
pub trait InventoryStore: Send + Sync {
    // ------------------------------------------------------------------ trains

    /// Insert a new train.
    ///
    /// # Errors
    ///
    /// [`StoreError::Duplicate`] if a train with the same name or number exists.
    fn insert_train(&self, train: Train) -> StoreFuture<'_, ()>;

    /// Point lookup.
    ///
    /// # Errors
    ///
    /// Backend failures only.
    fn get_train(&self, id: TrainId) -> StoreFuture<'_, Option<Train>>;

    /// All trains.
    ///
    /// # Errors
    ///
    /// Backend failures only.
    fn list_trains(&self) -> StoreFuture<'_, Vec<Train>>;

    /// Change a train's name and number, leaving its counters untouched.
    ///
    /// # Errors
    ///
    /// [`StoreError::Missing`] if the train does not exist,
    /// [`StoreError::Duplicate`] if another train has the name or number.
    fn rename_train(&self, id: TrainId, name: String, number: u32) -> StoreFuture<'_, Train>;

    /// Delete a train, returning the removed record if it existed.
    ///
    /// # Errors
    ///
    /// Backend failures only.
    fn delete_train(&self, id: TrainId) -> StoreFuture<'_, Option<Train>>;

    /// Atomically take one unit of capacity. Returns `None` when already at zero.
    ///
    /// # Errors
    ///
    /// [`StoreError::Missing`] if the train does not exist.
    fn decrement_available_seats(&self, id: TrainId) -> StoreFuture<'_, Option<Train>>;

    /// Atomically return one unit of capacity. Returns `None`, leaving the
    /// counter alone, when it already equals `total_seats`.
    ///
    /// # Errors
    ///
    /// [`StoreError::Missing`] if the train does not exist.
    fn increment_available_seats(&self, id: TrainId) -> StoreFuture<'_, Option<Train>>;

    /// Atomically add one seat's worth of capacity to both counters.
    ///
    /// # Errors
    ///
    /// [`StoreError::Missing`] if the train does not exist.
    fn grow_capacity(&self, id: TrainId) -> StoreFuture<'_, Train>;

    /// Atomically remove one unheld unit from both counters. Returns `None` when
    /// `available_seats` is already 0.
    ///
    /// # Errors
    ///
    /// [`StoreError::Missing`] if the train does not exist.
    fn shrink_capacity(&self, id: TrainId) -> StoreFuture<'_, Option<Train>>;

    // --------------------------------------------------------------- schedules

    /// Insert a new schedule.
    ///
    /// # Errors
    ///
    /// [`StoreError::Duplicate`] on id collision.
    fn insert_schedule(&self, schedule: Schedule) -> StoreFuture<'_, ()>;

    /// Point lookup.
    ///
    /// # Errors
    ///
    /// Backend failures only.
    fn get_schedule(&self, id: ScheduleId) -> StoreFuture<'_, Option<Schedule>>;

    /// All schedules, ordered by departure time.
    ///
    /// # Errors
    ///
    /// Backend failures only.
    fn list_schedules(&self) -> StoreFuture<'_, Vec<Schedule>>;

    /// Schedules run by one train.
    ///
    /// # Errors
    ///
    /// Backend failures only.
    fn schedules_for_train(&self, train_id: TrainId) -> StoreFuture<'_, Vec<Schedule>>;

    /// Replace one schedule record.
    ///
    /// # Errors
    ///
    /// [`StoreError::Missing`] if the schedule does not exist.
    fn update_schedule(&self, schedule: Schedule) -> StoreFuture<'_, ()>;

    /// Delete a schedule, returning the removed record if it existed.
    ///
    /// # Errors
    ///
    /// Backend failures only.
    fn delete_schedule(&self, id: ScheduleId) -> StoreFuture<'_, Option<Schedule>>;

    // ------------------------------------------------------------------- seats

    /// Insert seats in bulk.
    ///
    /// # Errors
    ///
    /// [`StoreError::Duplicate`] on id collision; nothing is inserted in that case.
    fn insert_seats(&self, seats: Vec<Seat>) -> StoreFuture<'_, ()>;

    /// Point lookup.
    ///
    /// # Errors
    ///
    /// Backend failures only.
    fn get_seat(&self, id: SeatId) -> StoreFuture<'_, Option<Seat>>;

    /// Seat pool of one train, ordered by compartment then seat number.
    ///
    /// # Errors
    ///
    /// Backend failures only.
    fn seats_for_train(&self, train_id: TrainId) -> StoreFuture<'_, Vec<Seat>>;

    /// Mark a seat held if it is currently available. Returns whether it flipped.
    ///
    /// # Errors
    ///
    /// [`StoreError::Missing`] if the seat does not exist.
    fn claim_seat(&self, id: SeatId) -> StoreFuture<'_, bool>;

    /// Mark a seat available if it is currently held. Returns whether it flipped.
    ///
    /// # Errors
    ///
    /// [`StoreError::Missing`] if the seat does not exist.
    fn release_seat(&self, id: SeatId) -> StoreFuture<'_, bool>;

    /// Delete a seat if it is currently available, returning the removed record.
    /// A held or unknown seat is left alone and `None` returned.
    ///
    /// # Errors
    ///
    /// Backend failures only.
    fn delete_seat(&self, id: SeatId) -> StoreFuture<'_, Option<Seat>>;

    // ------------------------------------------------------------ reservations

    /// Insert a new reservation.
    ///
    /// # Errors
    ///
    /// [`StoreError::Duplicate`] on id collision.
    fn insert_reservation(&self, reservation: Reservation) -> StoreFuture<'_, ()>;

    /// Point lookup.
    ///
    /// # Errors
    ///
    /// Backend failures only.
    fn get_reservation(&self, id: ReservationId) -> StoreFuture<'_, Option<Reservation>>;

    /// Replace one reservation record.
    ///
    /// # Errors
    ///
    /// [`StoreError::Missing`] if the reservation does not exist.
    fn update_reservation(&self, reservation: Reservation) -> StoreFuture<'_, ()>;

    /// Delete one reservation, returning the removed record if it existed.
    ///
    /// # Errors
    ///
    /// Backend failures only.
    fn delete_reservation(&self, id: ReservationId) -> StoreFuture<'_, Option<Reservation>>;

    /// Reservations matching the query, sorted by `reservation_time` ascending.
    ///
    /// # Errors
    ///
    /// Backend failures only.
    fn find_reservations(&self, query: ReservationQuery) -> StoreFuture<'_, Vec<Reservation>>;

    /// Number of reservations matching the query.
    ///
    /// # Errors
    ///
    /// Backend failures only.
    fn count_reservations(&self, query: ReservationQuery) -> StoreFuture<'_, usize>;

    // -------------------------------------------------------------- passengers

    /// Insert a new passenger.
    ///
    /// # Errors
    ///
    /// [`StoreError::Duplicate`] if the name is taken.
    fn insert_passenger(&self, passenger: Passenger) -> StoreFuture<'_, ()>;

    /// Point lookup.
    ///
    /// # Errors
    ///
    /// Backend failures only.
    fn get_passenger(&self, id: PassengerId) -> StoreFuture<'_, Option<Passenger>>;

    /// All passengers, ordered by name.
    ///
    /// # Errors
    ///
    /// Backend failures only.
    fn list_passengers(&self) -> StoreFuture<'_, Vec<Passenger>>;

    /// Replace one passenger record.
    ///
    /// # Errors
    ///
    /// [`StoreError::Missing`] if the passenger does not exist,
    /// [`StoreError::Duplicate`] if another passenger has the name.
    fn update_passenger(&self, passenger: Passenger) -> StoreFuture<'_, ()>;

    /// Delete a passenger, returning the removed record if it existed.
    ///
    /// # Errors
    ///
    /// Backend failures only.
    fn delete_passenger(&self, id: PassengerId) -> StoreFuture<'_, Option<Passenger>>;
}
