//! The reservation engine facade.
//!
//! Operations are spread over sibling modules as `impl ReservationEngine` blocks:
//!
//! | Module | Operations |
//! |---|---|
//! | [`allocation`](crate::allocation) | `request_reservation` |
//! | [`cancellation`](crate::cancellation) | `cancel_reservation` |
//! | [`promoter`](crate::promoter) | `promote` |
//! | [`sweeper`](crate::sweeper) | `sweep` |
//! | [`boarding`](crate::boarding) | `board`, `boarded_reservations` |
//! | [`admin`](crate::admin) | trains, schedules, seats and passengers: add, edit, delete |
//! | [`queries`](crate::queries) | read-only views |
//!
//! Every public mutating operation takes its own lease. The `*_locked` variants
//! assume the caller already holds the schedule lease.

use crate::environment::ReservationEnvironment;
use crate::error::{Entity, ReservationError};
use crate::saga::WriteSaga;
use railbook_core::{
    InventoryStore, Passenger, PassengerId, Reservation, ReservationId, ReservationQuery,
    ReservationStatus, Schedule, ScheduleId, Seat, SeatId, Train, TrainId,
};
use railbook_runtime::{Lease, LeaseKey};
use std::collections::HashSet;

/// Allocation, cancellation, promotion and sweep over an inventory store.
///
/// Cheap to clone; clones share the environment.
#[derive(Clone, Debug)]
pub struct ReservationEngine {
    env: ReservationEnvironment,
}

impl ReservationEngine {
    /// Creates a new engine.
    #[must_use]
    pub const fn new(env: ReservationEnvironment) -> Self {
        Self { env }
    }

    /// The injected environment.
    #[must_use]
    pub const fn environment(&self) -> &ReservationEnvironment {
        &self.env
    }

    pub(crate) fn store(&self) -> &dyn InventoryStore {
        self.env.store.as_ref()
    }

    pub(crate) async fn lease(&self, keys: &[LeaseKey]) -> Result<Lease, ReservationError> {
        Ok(self.env.leases.acquire(keys).await?)
    }

    pub(crate) async fn load_passenger(
        &self,
        id: PassengerId,
    ) -> Result<Passenger, ReservationError> {
        self.store()
            .get_passenger(id)
            .await?
            .ok_or_else(|| ReservationError::not_found(Entity::Passenger, id))
    }

    pub(crate) async fn load_schedule(&self, id: ScheduleId) -> Result<Schedule, ReservationError> {
        self.store()
            .get_schedule(id)
            .await?
            .ok_or_else(|| ReservationError::not_found(Entity::Schedule, id))
    }

    pub(crate) async fn load_train(&self, id: TrainId) -> Result<Train, ReservationError> {
        self.store()
            .get_train(id)
            .await?
            .ok_or_else(|| ReservationError::not_found(Entity::Train, id))
    }

    pub(crate) async fn load_reservation(
        &self,
        id: ReservationId,
    ) -> Result<Reservation, ReservationError> {
        self.store()
            .get_reservation(id)
            .await?
            .ok_or_else(|| ReservationError::not_found(Entity::Reservation, id))
    }

    /// Pick a free seat on the schedule's train.
    ///
    /// A seat qualifies when it is available and no other Confirmed/Waiting
    /// reservation on the schedule references it (other than `claimant`'s own).
    /// `preferred` seats are tried first, in order; otherwise the lowest-numbered
    /// qualifying seat wins.
    pub(crate) async fn choose_seat(
        &self,
        schedule: &Schedule,
        claimant: Option<ReservationId>,
        preferred: &[SeatId],
    ) -> Result<Option<Seat>, ReservationError> {
        let seats = self.store().seats_for_train(schedule.train_id).await?;
        let referenced: HashSet<SeatId> = self
            .store()
            .find_reservations(ReservationQuery::for_schedule(schedule.id).active())
            .await?
            .into_iter()
            .filter(|r| Some(r.id) != claimant)
            .filter_map(|r| r.seat_id)
            .collect();

        let free = |seat: &&Seat| seat.is_available && !referenced.contains(&seat.id);

        let choice = preferred
            .iter()
            .find_map(|id| seats.iter().filter(free).find(|seat| seat.id == *id))
            .or_else(|| seats.iter().find(free))
            .cloned();
        Ok(choice)
    }

    /// Release a seat left held without a Confirmed holder, as part of `saga`.
    ///
    /// Capacity is returned only when the ledger is short of what the confirmed
    /// reservations imply, so the ledger never over-counts.
    pub(crate) async fn release_orphaned_seat(
        &self,
        saga: &mut WriteSaga<'_>,
        train_id: TrainId,
        seat_id: SeatId,
    ) -> Result<bool, ReservationError> {
        let Some(seat) = self.store().get_seat(seat_id).await? else {
            return Ok(false);
        };
        if seat.is_available {
            return Ok(false);
        }

        let schedule_ids: Vec<ScheduleId> = self
            .store()
            .schedules_for_train(train_id)
            .await?
            .into_iter()
            .map(|s| s.id)
            .collect();
        let confirmed = ReservationQuery::for_schedules(schedule_ids)
            .with_status(ReservationStatus::Confirmed);

        let holders = self
            .store()
            .count_reservations(confirmed.clone().with_seat(seat_id))
            .await?;
        if holders > 0 {
            return Ok(false);
        }

        saga.release_seat(seat_id).await?;
        let holding = self
            .store()
            .find_reservations(confirmed)
            .await?
            .iter()
            .filter(|r| r.holds_seat())
            .count();
        let train = self.load_train(train_id).await?;
        if (train.available_seats as usize) + holding < train.total_seats as usize {
            saga.release_capacity(train_id).await?;
        }

        tracing::warn!(
            seat_id = %seat_id,
            seat_number = %seat.seat_number,
            "Released orphaned seat hold"
        );
        Ok(true)
    }
}
