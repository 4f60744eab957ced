//! In-memory inventory store.
//!
//! Every operation takes one lock over the whole table set, so each call is
//! atomic on its own, which is exactly the per-record guarantee the engine is
//! allowed to assume. Nothing spans calls.
//!
//! [`InMemoryInventoryStore::fail_next`] arms a one-shot failure for a given
//! operation so tests can drive the engine's compensation paths.
//! [`InMemoryInventoryStore::before_next`] runs a closure just before an
//! operation, which lets a test slip a competing write in between two steps of
//! an engine operation.

use railbook_core::store::{InventoryStore, ReservationQuery, StoreError, StoreFuture};
use railbook_core::{
    Passenger, PassengerId, Reservation, ReservationId, Schedule, ScheduleId, Seat, SeatId, Train,
    TrainId,
};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

/// Store operations that can be made to fail.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StoreOp {
    /// `insert_reservation`
    InsertReservation,
    /// `update_reservation`
    UpdateReservation,
    /// `delete_reservation`
    DeleteReservation,
    /// `claim_seat`
    ClaimSeat,
    /// `release_seat`
    ReleaseSeat,
    /// `decrement_available_seats`
    DecrementSeats,
    /// `increment_available_seats`
    IncrementSeats,
    /// `find_reservations`
    FindReservations,
    /// `get_schedule`
    GetSchedule,
    /// `insert_train`
    InsertTrain,
    /// `delete_train`
    DeleteTrain,
    /// `insert_seats`
    InsertSeats,
    /// `delete_seat`
    DeleteSeat,
    /// `grow_capacity`
    GrowCapacity,
    /// `shrink_capacity`
    ShrinkCapacity,
}

type Hook = Box<dyn FnOnce() + Send>;

#[derive(Default)]
struct Hooks(Mutex<HashMap<StoreOp, Vec<Hook>>>);

impl fmt::Debug for Hooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let armed: usize = self
            .0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .map(Vec::len)
            .sum();
        f.debug_struct("Hooks").field("armed", &armed).finish()
    }
}

#[derive(Debug, Default)]
struct Tables {
    trains: HashMap<TrainId, Train>,
    schedules: HashMap<ScheduleId, Schedule>,
    seats: HashMap<SeatId, Seat>,
    reservations: HashMap<ReservationId, Reservation>,
    passengers: HashMap<PassengerId, Passenger>,
}

/// `HashMap`-backed [`InventoryStore`] for tests and demos.
///
/// Cheap to clone; clones share the same data.
#[derive(Clone, Debug, Default)]
pub struct InMemoryInventoryStore {
    tables: Arc<RwLock<Tables>>,
    faults: Arc<Mutex<HashMap<StoreOp, usize>>>,
    hooks: Arc<Hooks>,
}

fn ready<'a, T: Send + 'a>(result: Result<T, StoreError>) -> StoreFuture<'a, T> {
    Box::pin(std::future::ready(result))
}

impl InMemoryInventoryStore {
    /// Create a new empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next call to `op` fail with [`StoreError::DatabaseError`].
    ///
    /// Calling this `n` times fails the next `n` calls.
    pub fn fail_next(&self, op: StoreOp) {
        *self
            .faults
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(op)
            .or_default() += 1;
    }

    /// Run `hook` right before the next call to `op` touches the tables.
    ///
    /// The hook runs outside the store lock, so it may use the synchronous
    /// accessors (`put_train`, `put_seat`, ...) to stage a competing write.
    pub fn before_next(&self, op: StoreOp, hook: impl FnOnce() + Send + 'static) {
        self.hooks
            .0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(op)
            .or_default()
            .push(Box::new(hook));
    }

    fn injected(&self, op: StoreOp) -> Result<(), StoreError> {
        let hook = self
            .hooks
            .0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get_mut(&op)
            .and_then(|armed| (!armed.is_empty()).then(|| armed.remove(0)));
        if let Some(hook) = hook {
            hook();
        }

        let mut faults = self.faults.lock().unwrap_or_else(PoisonError::into_inner);
        match faults.get_mut(&op) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                tracing::debug!(?op, "Injected store failure");
                Err(StoreError::DatabaseError(format!("injected failure in {op:?}")))
            }
            _ => Ok(()),
        }
    }

    fn read<T>(&self, f: impl FnOnce(&Tables) -> T) -> T {
        f(&self.tables.read().unwrap_or_else(PoisonError::into_inner))
    }

    fn write<T>(&self, f: impl FnOnce(&mut Tables) -> T) -> T {
        f(&mut self.tables.write().unwrap_or_else(PoisonError::into_inner))
    }

    // ------------------------------------------------------------------
    // Synchronous accessors for seeding and assertions
    // ------------------------------------------------------------------

    /// Insert or replace a train without going through the trait.
    pub fn put_train(&self, train: Train) {
        self.write(|t| t.trains.insert(train.id, train));
    }

    /// Insert or replace a schedule without going through the trait.
    pub fn put_schedule(&self, schedule: Schedule) {
        self.write(|t| t.schedules.insert(schedule.id, schedule));
    }

    /// Insert or replace a seat without going through the trait.
    pub fn put_seat(&self, seat: Seat) {
        self.write(|t| t.seats.insert(seat.id, seat));
    }

    /// Insert or replace a reservation without going through the trait.
    pub fn put_reservation(&self, reservation: Reservation) {
        self.write(|t| t.reservations.insert(reservation.id, reservation));
    }

    /// Insert or replace a passenger without going through the trait.
    pub fn put_passenger(&self, passenger: Passenger) {
        self.write(|t| t.passengers.insert(passenger.id, passenger));
    }

    /// Snapshot of one train.
    #[must_use]
    pub fn train(&self, id: TrainId) -> Option<Train> {
        self.read(|t| t.trains.get(&id).cloned())
    }

    /// Snapshot of every train.
    #[must_use]
    pub fn trains(&self) -> Vec<Train> {
        self.read(|t| t.trains.values().cloned().collect())
    }

    /// Snapshot of one seat.
    #[must_use]
    pub fn seat(&self, id: SeatId) -> Option<Seat> {
        self.read(|t| t.seats.get(&id).cloned())
    }

    /// Snapshot of a train's seats, in seat-number order.
    #[must_use]
    pub fn seats_of(&self, train_id: TrainId) -> Vec<Seat> {
        self.read(|t| sorted_seats(t, train_id))
    }

    /// Snapshot of one reservation.
    #[must_use]
    pub fn reservation(&self, id: ReservationId) -> Option<Reservation> {
        self.read(|t| t.reservations.get(&id).cloned())
    }

    /// Snapshot of a schedule's reservations in `reservation_time` order.
    #[must_use]
    pub fn reservations_of(&self, schedule_id: ScheduleId) -> Vec<Reservation> {
        self.read(|t| find(t, &ReservationQuery::for_schedule(schedule_id)))
    }

    /// Number of passengers.
    #[must_use]
    pub fn passenger_count(&self) -> usize {
        self.read(|t| t.passengers.len())
    }

    /// Snapshot of one passenger.
    #[must_use]
    pub fn passenger(&self, id: PassengerId) -> Option<Passenger> {
        self.read(|t| t.passengers.get(&id).cloned())
    }

    /// Snapshot of one schedule.
    #[must_use]
    pub fn schedule(&self, id: ScheduleId) -> Option<Schedule> {
        self.read(|t| t.schedules.get(&id).cloned())
    }
}

fn sorted_seats(tables: &Tables, train_id: TrainId) -> Vec<Seat> {
    let mut seats: Vec<Seat> = tables
        .seats
        .values()
        .filter(|s| s.train_id == train_id)
        .cloned()
        .collect();
    seats.sort_by(|a, b| {
        a.compartment
            .cmp(&b.compartment)
            .then_with(|| natural_key(&a.seat_number).cmp(&natural_key(&b.seat_number)))
    });
    seats
}

/// Order `A2` before `A10`.
fn natural_key(seat_number: &str) -> (String, u64) {
    let split = seat_number
        .find(|c: char| c.is_ascii_digit())
        .unwrap_or(seat_number.len());
    let (prefix, digits) = seat_number.split_at(split);
    (prefix.to_string(), digits.parse().unwrap_or(u64::MAX))
}

fn find(tables: &Tables, query: &ReservationQuery) -> Vec<Reservation> {
    let mut found: Vec<Reservation> = tables
        .reservations
        .values()
        .filter(|r| query.matches(r))
        .cloned()
        .collect();
    found.sort_by(|a, b| {
        a.reservation_time
            .cmp(&b.reservation_time)
            .then_with(|| a.id.cmp(&b.id))
    });
    found
}

impl InventoryStore for InMemoryInventoryStore {
    fn insert_train(&self, train: Train) -> StoreFuture<'_, ()> {
        if let Err(e) = self.injected(StoreOp::InsertTrain) {
            return ready(Err(e));
        }
        ready(self.write(|t| {
            if t.trains
                .values()
                .any(|existing| existing.name == train.name || existing.number == train.number)
            {
                return Err(StoreError::Duplicate(format!(
                    "train {} / {}",
                    train.name, train.number
                )));
            }
            t.trains.insert(train.id, train);
            Ok(())
        }))
    }

    fn get_train(&self, id: TrainId) -> StoreFuture<'_, Option<Train>> {
        ready(Ok(self.train(id)))
    }

    fn list_trains(&self) -> StoreFuture<'_, Vec<Train>> {
        let mut trains = self.trains();
        trains.sort_by_key(|train| train.number);
        ready(Ok(trains))
    }

    fn rename_train(&self, id: TrainId, name: String, number: u32) -> StoreFuture<'_, Train> {
        ready(self.write(|t| {
            if t.trains
                .values()
                .any(|other| other.id != id && (other.name == name || other.number == number))
            {
                return Err(StoreError::Duplicate(format!("train {name} / {number}")));
            }
            let train = t
                .trains
                .get_mut(&id)
                .ok_or_else(|| StoreError::Missing(format!("train {id}")))?;
            train.name = name;
            train.number = number;
            Ok(train.clone())
        }))
    }

    fn delete_train(&self, id: TrainId) -> StoreFuture<'_, Option<Train>> {
        if let Err(e) = self.injected(StoreOp::DeleteTrain) {
            return ready(Err(e));
        }
        ready(Ok(self.write(|t| t.trains.remove(&id))))
    }

    fn decrement_available_seats(&self, id: TrainId) -> StoreFuture<'_, Option<Train>> {
        if let Err(e) = self.injected(StoreOp::DecrementSeats) {
            return ready(Err(e));
        }
        ready(self.write(|t| {
            let train = t
                .trains
                .get_mut(&id)
                .ok_or_else(|| StoreError::Missing(format!("train {id}")))?;
            if train.available_seats == 0 {
                return Ok(None);
            }
            train.available_seats -= 1;
            Ok(Some(train.clone()))
        }))
    }

    fn increment_available_seats(&self, id: TrainId) -> StoreFuture<'_, Option<Train>> {
        if let Err(e) = self.injected(StoreOp::IncrementSeats) {
            return ready(Err(e));
        }
        ready(self.write(|t| {
            let train = t
                .trains
                .get_mut(&id)
                .ok_or_else(|| StoreError::Missing(format!("train {id}")))?;
            if train.available_seats >= train.total_seats {
                return Ok(None);
            }
            train.available_seats += 1;
            Ok(Some(train.clone()))
        }))
    }

    fn grow_capacity(&self, id: TrainId) -> StoreFuture<'_, Train> {
        if let Err(e) = self.injected(StoreOp::GrowCapacity) {
            return ready(Err(e));
        }
        ready(self.write(|t| {
            let train = t
                .trains
                .get_mut(&id)
                .ok_or_else(|| StoreError::Missing(format!("train {id}")))?;
            train.total_seats += 1;
            train.available_seats += 1;
            Ok(train.clone())
        }))
    }

    fn shrink_capacity(&self, id: TrainId) -> StoreFuture<'_, Option<Train>> {
        if let Err(e) = self.injected(StoreOp::ShrinkCapacity) {
            return ready(Err(e));
        }
        ready(self.write(|t| {
            let train = t
                .trains
                .get_mut(&id)
                .ok_or_else(|| StoreError::Missing(format!("train {id}")))?;
            if train.available_seats == 0 {
                return Ok(None);
            }
            train.total_seats -= 1;
            train.available_seats -= 1;
            Ok(Some(train.clone()))
        }))
    }

    fn insert_schedule(&self, schedule: Schedule) -> StoreFuture<'_, ()> {
        ready(self.write(|t| {
            if t.schedules.contains_key(&schedule.id) {
                return Err(StoreError::Duplicate(format!("schedule {}", schedule.id)));
            }
            t.schedules.insert(schedule.id, schedule);
            Ok(())
        }))
    }

    fn get_schedule(&self, id: ScheduleId) -> StoreFuture<'_, Option<Schedule>> {
        if let Err(e) = self.injected(StoreOp::GetSchedule) {
            return ready(Err(e));
        }
        ready(Ok(self.read(|t| t.schedules.get(&id).cloned())))
    }

    fn list_schedules(&self) -> StoreFuture<'_, Vec<Schedule>> {
        let mut schedules: Vec<Schedule> = self.read(|t| t.schedules.values().cloned().collect());
        schedules.sort_by_key(|s| (s.departure_time, s.id));
        ready(Ok(schedules))
    }

    fn schedules_for_train(&self, train_id: TrainId) -> StoreFuture<'_, Vec<Schedule>> {
        let mut schedules: Vec<Schedule> = self.read(|t| {
            t.schedules
                .values()
                .filter(|s| s.train_id == train_id)
                .cloned()
                .collect()
        });
        schedules.sort_by_key(|s| (s.departure_time, s.id));
        ready(Ok(schedules))
    }

    fn update_schedule(&self, schedule: Schedule) -> StoreFuture<'_, ()> {
        ready(self.write(|t| match t.schedules.get_mut(&schedule.id) {
            Some(existing) => {
                *existing = schedule;
                Ok(())
            }
            None => Err(StoreError::Missing(format!("schedule {}", schedule.id))),
        }))
    }

    fn delete_schedule(&self, id: ScheduleId) -> StoreFuture<'_, Option<Schedule>> {
        ready(Ok(self.write(|t| t.schedules.remove(&id))))
    }

    fn insert_seats(&self, seats: Vec<Seat>) -> StoreFuture<'_, ()> {
        if let Err(e) = self.injected(StoreOp::InsertSeats) {
            return ready(Err(e));
        }
        ready(self.write(|t| {
            if let Some(dup) = seats.iter().find(|s| t.seats.contains_key(&s.id)) {
                return Err(StoreError::Duplicate(format!("seat {}", dup.id)));
            }
            for seat in seats {
                t.seats.insert(seat.id, seat);
            }
            Ok(())
        }))
    }

    fn get_seat(&self, id: SeatId) -> StoreFuture<'_, Option<Seat>> {
        ready(Ok(self.seat(id)))
    }

    fn seats_for_train(&self, train_id: TrainId) -> StoreFuture<'_, Vec<Seat>> {
        ready(Ok(self.seats_of(train_id)))
    }

    fn claim_seat(&self, id: SeatId) -> StoreFuture<'_, bool> {
        if let Err(e) = self.injected(StoreOp::ClaimSeat) {
            return ready(Err(e));
        }
        ready(self.write(|t| {
            let seat = t
                .seats
                .get_mut(&id)
                .ok_or_else(|| StoreError::Missing(format!("seat {id}")))?;
            let flipped = seat.is_available;
            seat.is_available = false;
            Ok(flipped)
        }))
    }

    fn release_seat(&self, id: SeatId) -> StoreFuture<'_, bool> {
        if let Err(e) = self.injected(StoreOp::ReleaseSeat) {
            return ready(Err(e));
        }
        ready(self.write(|t| {
            let seat = t
                .seats
                .get_mut(&id)
                .ok_or_else(|| StoreError::Missing(format!("seat {id}")))?;
            let flipped = !seat.is_available;
            seat.is_available = true;
            Ok(flipped)
        }))
    }

    fn delete_seat(&self, id: SeatId) -> StoreFuture<'_, Option<Seat>> {
        if let Err(e) = self.injected(StoreOp::DeleteSeat) {
            return ready(Err(e));
        }
        ready(Ok(self.write(|t| {
            if t.seats.get(&id).is_some_and(|seat| seat.is_available) {
                t.seats.remove(&id)
            } else {
                None
            }
        })))
    }

    fn insert_reservation(&self, reservation: Reservation) -> StoreFuture<'_, ()> {
        if let Err(e) = self.injected(StoreOp::InsertReservation) {
            return ready(Err(e));
        }
        ready(self.write(|t| {
            if t.reservations.contains_key(&reservation.id) {
                return Err(StoreError::Duplicate(format!("reservation {}", reservation.id)));
            }
            t.reservations.insert(reservation.id, reservation);
            Ok(())
        }))
    }

    fn get_reservation(&self, id: ReservationId) -> StoreFuture<'_, Option<Reservation>> {
        ready(Ok(self.reservation(id)))
    }

    fn update_reservation(&self, reservation: Reservation) -> StoreFuture<'_, ()> {
        if let Err(e) = self.injected(StoreOp::UpdateReservation) {
            return ready(Err(e));
        }
        ready(self.write(|t| match t.reservations.get_mut(&reservation.id) {
            Some(existing) => {
                *existing = reservation;
                Ok(())
            }
            None => Err(StoreError::Missing(format!("reservation {}", reservation.id))),
        }))
    }

    fn delete_reservation(&self, id: ReservationId) -> StoreFuture<'_, Option<Reservation>> {
        if let Err(e) = self.injected(StoreOp::DeleteReservation) {
            return ready(Err(e));
        }
        ready(Ok(self.write(|t| t.reservations.remove(&id))))
    }

    fn find_reservations(&self, query: ReservationQuery) -> StoreFuture<'_, Vec<Reservation>> {
        if let Err(e) = self.injected(StoreOp::FindReservations) {
            return ready(Err(e));
        }
        ready(Ok(self.read(|t| find(t, &query))))
    }

    fn count_reservations(&self, query: ReservationQuery) -> StoreFuture<'_, usize> {
        ready(Ok(self.read(|t| {
            t.reservations.values().filter(|r| query.matches(r)).count()
        })))
    }

    fn insert_passenger(&self, passenger: Passenger) -> StoreFuture<'_, ()> {
        ready(self.write(|t| {
            if t.passengers.values().any(|p| p.name == passenger.name) {
                return Err(StoreError::Duplicate(format!("passenger {}", passenger.name)));
            }
            t.passengers.insert(passenger.id, passenger);
            Ok(())
        }))
    }

    fn get_passenger(&self, id: PassengerId) -> StoreFuture<'_, Option<Passenger>> {
        ready(Ok(self.passenger(id)))
    }

    fn list_passengers(&self) -> StoreFuture<'_, Vec<Passenger>> {
        let mut passengers: Vec<Passenger> = self.read(|t| t.passengers.values().cloned().collect());
        passengers.sort_by(|a, b| a.name.cmp(&b.name));
        ready(Ok(passengers))
    }

    fn update_passenger(&self, passenger: Passenger) -> StoreFuture<'_, ()> {
        ready(self.write(|t| {
            if t.passengers
                .values()
                .any(|other| other.id != passenger.id && other.name == passenger.name)
            {
                return Err(StoreError::Duplicate(format!("passenger {}", passenger.name)));
            }
            match t.passengers.get_mut(&passenger.id) {
                Some(existing) => {
                    *existing = passenger;
                    Ok(())
                }
                None => Err(StoreError::Missing(format!("passenger {}", passenger.id))),
            }
        }))
    }

    fn delete_passenger(&self, id: PassengerId) -> StoreFuture<'_, Option<Passenger>> {
        ready(Ok(self.write(|t| t.passengers.remove(&id))))
    }
}

/// Check the capacity and seat invariants for one train.
///
/// 1. `available_seats + confirmed reservations holding a seat == total_seats`
///    (across every schedule of the train)
/// 2. no two Confirmed/Waiting reservations reference the same (seat, schedule)
/// 3. a seat is unavailable iff exactly one Confirmed reservation holds it
///
/// # Errors
///
/// A description of the first violated invariant.
pub fn check_invariants(store: &InMemoryInventoryStore, train_id: TrainId) -> Result<(), String> {
    store.read(|t| {
        let train = t
            .trains
            .get(&train_id)
            .ok_or_else(|| format!("train {train_id} missing"))?;
        let schedule_ids: Vec<ScheduleId> = t
            .schedules
            .values()
            .filter(|s| s.train_id == train_id)
            .map(|s| s.id)
            .collect();
        let reservations: Vec<&Reservation> = t
            .reservations
            .values()
            .filter(|r| schedule_ids.contains(&r.schedule_id))
            .collect();

        let holding = reservations.iter().filter(|r| r.holds_seat()).count();
        if train.available_seats as usize + holding != train.total_seats as usize {
            return Err(format!(
                "capacity drift: available {} + holding {} != total {}",
                train.available_seats, holding, train.total_seats
            ));
        }

        let mut active_pairs = HashMap::new();
        for r in reservations.iter().filter(|r| r.status.is_active()) {
            if let Some(seat_id) = r.seat_id {
                if let Some(other) = active_pairs.insert((seat_id, r.schedule_id), r.id) {
                    return Err(format!(
                        "seat {seat_id} referenced by {other} and {} on one schedule",
                        r.id
                    ));
                }
            }
        }

        for seat in t.seats.values().filter(|s| s.train_id == train_id) {
            let holders = reservations
                .iter()
                .filter(|r| r.holds_seat() && r.seat_id == Some(seat.id))
                .count();
            let consistent = if seat.is_available { holders == 0 } else { holders == 1 };
            if !consistent {
                return Err(format!(
                    "seat {} is_available={} with {holders} confirmed holders",
                    seat.seat_number, seat.is_available
                ));
            }
        }

        Ok(())
    })
}
