//! Administrative operations: trains, schedules, seats, passengers.
//!
//! Authentication happens upstream; callers pass the authenticated [`Actor`].

use crate::engine::ReservationEngine;
use crate::error::{Entity, ReservationError};
use crate::saga::WriteSaga;
use chrono::{DateTime, Utc};
use railbook_core::{
    Passenger, PassengerId, ReservationQuery, Role, Schedule, ScheduleId, Seat, SeatId,
    StoreError, Train, TrainId, ValidationError,
};
use railbook_runtime::{Lease, LeaseKey};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

/// Authenticated caller identity, as supplied by the auth layer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    /// Passenger acting
    pub passenger_id: PassengerId,
    /// Role granted by the auth layer
    pub role: Role,
}

impl Actor {
    /// An administrator.
    #[must_use]
    pub const fn admin(passenger_id: PassengerId) -> Self {
        Self {
            passenger_id,
            role: Role::Admin,
        }
    }

    /// A regular user.
    #[must_use]
    pub const fn user(passenger_id: PassengerId) -> Self {
        Self {
            passenger_id,
            role: Role::User,
        }
    }

    pub(crate) fn require_admin(&self) -> Result<(), ReservationError> {
        match self.role {
            Role::Admin => Ok(()),
            Role::User => Err(ReservationError::Forbidden),
        }
    }
}

impl From<&Passenger> for Actor {
    fn from(passenger: &Passenger) -> Self {
        Self {
            passenger_id: passenger.id,
            role: passenger.role,
        }
    }
}

/// Input for [`ReservationEngine::add_train`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewTrain {
    /// Display name (unique)
    pub name: String,
    /// Train number (unique)
    pub number: u32,
    /// Seats to generate
    pub total_seats: u32,
    /// Compartment names; seats are spread evenly across them
    pub compartments: Vec<String>,
}

/// Lay out `total` seats over `compartments`.
///
/// Each compartment gets `total / n` seats and the first `total % n` get one
/// more. Seat numbers are the compartment name followed by a running index over
/// the whole train: `["A", "B"]` with 3 seats gives `A1 A2 B3`.
#[must_use]
pub fn layout_seats(train_id: TrainId, total: u32, compartments: &[String]) -> Vec<Seat> {
    let Ok(count) = u32::try_from(compartments.len()) else {
        return Vec::new();
    };
    if count == 0 {
        return Vec::new();
    }
    let per_compartment = total / count;
    let remainder = total % count;

    let mut running = 0;
    let mut seats = Vec::with_capacity(total as usize);
    for (index, compartment) in (0..count).zip(compartments) {
        let here = per_compartment + u32::from(index < remainder);
        for _ in 0..here {
            running += 1;
            seats.push(Seat::new(train_id, format!("{compartment}{running}"), compartment.as_str()));
        }
    }
    seats
}

/// Changes for [`ReservationEngine::update_train`]; `None` keeps the field.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrainUpdate {
    /// New display name
    pub name: Option<String>,
    /// New train number
    pub number: Option<u32>,
}

/// Changes for [`ReservationEngine::update_passenger`]; `None` keeps the field.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PassengerUpdate {
    /// New user name
    pub name: Option<String>,
    /// New contact email
    pub email: Option<String>,
    /// New role
    pub role: Option<Role>,
}

fn duplicate_as_invalid(err: StoreError, what: &str) -> ReservationError {
    match err {
        StoreError::Duplicate(_) => ReservationError::InvalidInput(format!("{what} already exists")),
        other => other.into(),
    }
}

/// Leases over a train and every one of its schedules.
struct TrainLease {
    _train: Lease,
    _schedules: Lease,
    schedule_ids: Vec<ScheduleId>,
}

impl ReservationEngine {
    /// Take the train key first so no schedule can be added or removed, then
    /// every schedule key of the train plus `extra`.
    async fn lease_train(
        &self,
        train_id: TrainId,
        extra: &[LeaseKey],
    ) -> Result<TrainLease, ReservationError> {
        let train = self.lease(&[LeaseKey::Train(train_id)]).await?;
        let schedule_ids: Vec<ScheduleId> = self
            .store()
            .schedules_for_train(train_id)
            .await?
            .into_iter()
            .map(|s| s.id)
            .collect();
        let mut keys: Vec<LeaseKey> = schedule_ids.iter().copied().map(LeaseKey::Schedule).collect();
        keys.extend_from_slice(extra);
        let schedules = self.lease(&keys).await?;
        Ok(TrainLease {
            _train: train,
            _schedules: schedules,
            schedule_ids,
        })
    }

    /// Create a train and its seat pool.
    ///
    /// # Errors
    ///
    /// [`Forbidden`](ReservationError::Forbidden) for non-admins;
    /// [`InvalidInput`](ReservationError::InvalidInput) for a blank name, zero
    /// seats, no compartments, or a name/number already in use. A store failure
    /// after the train was written removes it again.
    #[instrument(skip(self, train), fields(name = %train.name, number = train.number))]
    pub async fn add_train(
        &self,
        actor: &Actor,
        train: NewTrain,
    ) -> Result<(Train, Vec<Seat>), ReservationError> {
        actor.require_admin()?;
        if train.name.trim().is_empty() {
            return Err(ReservationError::InvalidInput("train name is required".into()));
        }
        if train.total_seats == 0 {
            return Err(ValidationError::NoSeats.into());
        }
        let compartments: Vec<String> = train
            .compartments
            .iter()
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .collect();
        if compartments.is_empty() {
            return Err(ValidationError::NoCompartments.into());
        }

        let record = Train::new(train.name.trim(), train.number, train.total_seats);
        let seats = layout_seats(record.id, train.total_seats, &compartments);

        let mut saga = WriteSaga::begin(self.store(), "add-train");
        saga.insert_train(&record)
            .await
            .map_err(|e| match e {
                ReservationError::Store(inner) => duplicate_as_invalid(inner, "train name or number"),
                other => other,
            })?;
        saga.insert_seats(&seats).await?;
        saga.commit();

        info!(train_id = %record.id, seats = seats.len(), "Train added");
        Ok((record, seats))
    }

    /// Rename or renumber a train. Capacity only changes through
    /// [`add_seat`](Self::add_seat) and [`delete_seat`](Self::delete_seat).
    ///
    /// # Errors
    ///
    /// `Forbidden`, `NotFound` for the train, or `InvalidInput` for a blank or
    /// taken name or number.
    #[instrument(skip(self))]
    pub async fn update_train(
        &self,
        actor: &Actor,
        train_id: TrainId,
        update: TrainUpdate,
    ) -> Result<Train, ReservationError> {
        actor.require_admin()?;
        let current = self.load_train(train_id).await?;
        let name = update
            .name
            .map_or(current.name, |name| name.trim().to_string());
        if name.is_empty() {
            return Err(ReservationError::InvalidInput("train name is required".into()));
        }
        let number = update.number.unwrap_or(current.number);

        let train = self
            .store()
            .rename_train(train_id, name, number)
            .await
            .map_err(|e| match e {
                StoreError::Missing(_) => ReservationError::not_found(Entity::Train, train_id),
                other => duplicate_as_invalid(other, "train name or number"),
            })?;

        info!(train_id = %train.id, name = %train.name, "Train updated");
        Ok(train)
    }

    /// Delete a train together with its seat pool.
    ///
    /// Refused while the train still has schedules; delete those first.
    ///
    /// # Errors
    ///
    /// `Forbidden`, `NotFound`, [`InUse`](ReservationError::InUse), `Busy`, or a
    /// store failure (after the deleted seats are restored).
    #[instrument(skip(self))]
    pub async fn delete_train(&self, actor: &Actor, train_id: TrainId) -> Result<Train, ReservationError> {
        actor.require_admin()?;
        let train = self.load_train(train_id).await?;
        let lease = self.lease_train(train_id, &[]).await?;
        if !lease.schedule_ids.is_empty() {
            return Err(ReservationError::InUse(format!(
                "train {} ({} schedules)",
                train.name,
                lease.schedule_ids.len()
            )));
        }

        let mut saga = WriteSaga::begin(self.store(), "delete-train");
        for seat in self.store().seats_for_train(train_id).await? {
            if !saga.delete_seat(seat.id).await? {
                let err = ReservationError::InUse(format!("seat {}", seat.seat_number));
                return Err(saga.abort(err).await);
            }
        }
        saga.delete_train(train_id).await?;
        saga.commit();

        info!(train_id = %train_id, name = %train.name, "Train deleted");
        Ok(train)
    }

    /// Add a departure of an existing train.
    ///
    /// # Errors
    ///
    /// `Forbidden`, `NotFound` for the train, `InvalidInput` when arrival is
    /// not after departure, or `Busy` while the train's seat pool is being
    /// changed.
    #[instrument(skip(self))]
    pub async fn add_schedule(
        &self,
        actor: &Actor,
        train_id: TrainId,
        departure_time: DateTime<Utc>,
        arrival_time: DateTime<Utc>,
    ) -> Result<Schedule, ReservationError> {
        actor.require_admin()?;
        let train = self.load_train(train_id).await?;
        let schedule = Schedule::new(train.id, departure_time, arrival_time)?;
        let _lease = self.lease(&[LeaseKey::Train(train.id)]).await?;
        self.store().insert_schedule(schedule.clone()).await?;

        info!(schedule_id = %schedule.id, "Schedule added");
        Ok(schedule)
    }

    /// Move a departure to new times. The train stays the same.
    ///
    /// # Errors
    ///
    /// `Forbidden`, `NotFound` for the schedule, `InvalidInput` when arrival is
    /// not after departure, `Busy`, or a store failure.
    #[instrument(skip(self))]
    pub async fn update_schedule(
        &self,
        actor: &Actor,
        schedule_id: ScheduleId,
        departure_time: DateTime<Utc>,
        arrival_time: DateTime<Utc>,
    ) -> Result<Schedule, ReservationError> {
        actor.require_admin()?;
        let current = self.load_schedule(schedule_id).await?;
        let mut schedule = Schedule::new(current.train_id, departure_time, arrival_time)?;
        schedule.id = current.id;

        let _lease = self.lease(&[LeaseKey::Schedule(schedule.id)]).await?;
        self.store().update_schedule(schedule.clone()).await?;

        info!(
            schedule_id = %schedule.id,
            departure = %schedule.departure_time,
            "Schedule updated"
        );
        Ok(schedule)
    }

    /// Delete a departure.
    ///
    /// Refused while any Confirmed or Waiting reservation is on it; canceled
    /// history is left in place.
    ///
    /// # Errors
    ///
    /// `Forbidden`, `NotFound`, [`InUse`](ReservationError::InUse), `Busy`, or a
    /// store failure.
    #[instrument(skip(self))]
    pub async fn delete_schedule(
        &self,
        actor: &Actor,
        schedule_id: ScheduleId,
    ) -> Result<Schedule, ReservationError> {
        actor.require_admin()?;
        let schedule = self.load_schedule(schedule_id).await?;
        let _lease = self
            .lease(&[LeaseKey::Train(schedule.train_id), LeaseKey::Schedule(schedule.id)])
            .await?;

        let active = self
            .store()
            .count_reservations(ReservationQuery::for_schedule(schedule.id).active())
            .await?;
        if active > 0 {
            return Err(ReservationError::InUse(format!(
                "schedule {schedule_id} ({active} active reservations)"
            )));
        }
        self.store().delete_schedule(schedule.id).await?;

        info!(schedule_id = %schedule.id, "Schedule deleted");
        Ok(schedule)
    }

    /// Add one seat to a train's pool, growing its capacity by one.
    ///
    /// Holds the train key and every schedule key of the train while the pool
    /// changes, so no admission, promotion or schedule change interleaves. The
    /// counters move through one atomic store update; a failure there removes
    /// the new seat again.
    ///
    /// # Errors
    ///
    /// `Forbidden`, `NotFound` for the train, `InvalidInput` for a blank or
    /// duplicate seat number, `Busy`, or a store failure.
    #[instrument(skip(self))]
    pub async fn add_seat(
        &self,
        actor: &Actor,
        train_id: TrainId,
        seat_number: &str,
        compartment: &str,
    ) -> Result<Seat, ReservationError> {
        actor.require_admin()?;
        if seat_number.trim().is_empty() || compartment.trim().is_empty() {
            return Err(ReservationError::InvalidInput(
                "seat number and compartment are required".into(),
            ));
        }
        self.load_train(train_id).await?;
        let _lease = self.lease_train(train_id, &[]).await?;

        let existing = self.store().seats_for_train(train_id).await?;
        if existing.iter().any(|s| s.seat_number == seat_number.trim()) {
            return Err(ReservationError::InvalidInput(format!(
                "seat {seat_number} already exists"
            )));
        }

        let seat = Seat::new(train_id, seat_number.trim(), compartment.trim());
        let mut saga = WriteSaga::begin(self.store(), "add-seat");
        saga.insert_seats(std::slice::from_ref(&seat)).await?;
        let train = saga.grow_capacity(train_id).await?;
        saga.commit();

        info!(seat_id = %seat.id, total = train.total_seats, "Seat added");
        Ok(seat)
    }

    /// Remove one seat from a train's pool, shrinking its capacity by one.
    ///
    /// Refused while the seat is held or any Confirmed or Waiting reservation
    /// on the train references it.
    ///
    /// # Errors
    ///
    /// `Forbidden`, `NotFound` for the seat, [`InUse`](ReservationError::InUse),
    /// `Busy`, or a store failure (after the seat is restored).
    #[instrument(skip(self))]
    pub async fn delete_seat(&self, actor: &Actor, seat_id: SeatId) -> Result<Seat, ReservationError> {
        actor.require_admin()?;
        let seat = self
            .store()
            .get_seat(seat_id)
            .await?
            .ok_or_else(|| ReservationError::not_found(Entity::Seat, seat_id))?;
        let lease = self
            .lease_train(seat.train_id, &[LeaseKey::Seat(seat.id)])
            .await?;

        let referenced = self
            .store()
            .count_reservations(
                ReservationQuery::for_schedules(lease.schedule_ids.clone())
                    .with_seat(seat.id)
                    .active(),
            )
            .await?;
        if referenced > 0 {
            return Err(ReservationError::InUse(format!("seat {}", seat.seat_number)));
        }

        let mut saga = WriteSaga::begin(self.store(), "delete-seat");
        if !saga.delete_seat(seat.id).await? {
            return Err(ReservationError::InUse(format!("seat {}", seat.seat_number)));
        }
        let train = saga.shrink_capacity(seat.train_id).await?;
        saga.commit();

        info!(seat_id = %seat.id, total = train.total_seats, "Seat deleted");
        Ok(seat)
    }

    /// Register a passenger.
    ///
    /// # Errors
    ///
    /// `InvalidInput` for a malformed or already taken name.
    #[instrument(skip(self, email, password_hash))]
    pub async fn register_passenger(
        &self,
        name: &str,
        email: &str,
        password_hash: &str,
        role: Role,
    ) -> Result<Passenger, ReservationError> {
        let passenger = Passenger::new(name, email, password_hash, role)?;
        self.store()
            .insert_passenger(passenger.clone())
            .await
            .map_err(|e| duplicate_as_invalid(e, "passenger name"))?;

        info!(passenger_id = %passenger.id, "Passenger registered");
        Ok(passenger)
    }

    /// Names of every registered passenger, sorted. Admin only.
    ///
    /// # Errors
    ///
    /// `Forbidden` or a store failure.
    pub async fn list_passengers(&self, actor: &Actor) -> Result<Vec<String>, ReservationError> {
        actor.require_admin()?;
        Ok(self
            .store()
            .list_passengers()
            .await?
            .into_iter()
            .map(|p| p.name)
            .collect())
    }

    /// Edit a passenger's name, email or role. Admin only.
    ///
    /// # Errors
    ///
    /// `Forbidden`, `NotFound`, or `InvalidInput` for a malformed or taken name.
    #[instrument(skip(self, update))]
    pub async fn update_passenger(
        &self,
        actor: &Actor,
        passenger_id: PassengerId,
        update: PassengerUpdate,
    ) -> Result<Passenger, ReservationError> {
        actor.require_admin()?;
        let current = self.load_passenger(passenger_id).await?;
        let mut passenger = Passenger::new(
            update.name.unwrap_or(current.name),
            update.email.unwrap_or(current.email),
            current.password_hash,
            update.role.unwrap_or(current.role),
        )?;
        passenger.id = current.id;

        self.store()
            .update_passenger(passenger.clone())
            .await
            .map_err(|e| match e {
                StoreError::Missing(_) => ReservationError::not_found(Entity::Passenger, passenger_id),
                other => duplicate_as_invalid(other, "passenger name"),
            })?;

        info!(passenger_id = %passenger.id, "Passenger updated");
        Ok(passenger)
    }

    /// Remove a passenger. Admin only.
    ///
    /// Refused while the passenger has a Confirmed or Waiting reservation;
    /// canceled history is left in place.
    ///
    /// # Errors
    ///
    /// `Forbidden`, `NotFound`, [`InUse`](ReservationError::InUse), or a store
    /// failure.
    #[instrument(skip(self))]
    pub async fn delete_passenger(
        &self,
        actor: &Actor,
        passenger_id: PassengerId,
    ) -> Result<Passenger, ReservationError> {
        actor.require_admin()?;
        let passenger = self.load_passenger(passenger_id).await?;
        let active = self
            .store()
            .count_reservations(ReservationQuery::for_passenger(passenger_id).active())
            .await?;
        if active > 0 {
            return Err(ReservationError::InUse(format!(
                "passenger {} ({active} active reservations)",
                passenger.name
            )));
        }
        self.store().delete_passenger(passenger_id).await?;

        info!(passenger_id = %passenger_id, "Passenger deleted");
        Ok(passenger)
    }
}
