//! Read-only views over trains, schedules, seats and reservations.

use crate::admin::Actor;
use crate::engine::ReservationEngine;
use crate::error::ReservationError;
use railbook_core::{
    PassengerId, Reservation, ReservationQuery, ReservationStatus, Schedule, ScheduleId, Seat,
    Train, TrainId,
};

impl ReservationEngine {
    /// All reservations of a passenger, oldest first.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown passenger, or a store failure.
    pub async fn reservations_for_passenger(
        &self,
        passenger_id: PassengerId,
    ) -> Result<Vec<Reservation>, ReservationError> {
        self.load_passenger(passenger_id).await?;
        Ok(self
            .store()
            .find_reservations(ReservationQuery::for_passenger(passenger_id))
            .await?)
    }

    /// Waiting reservations across every schedule of a train.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown train, or a store failure.
    pub async fn waiting_count_for_train(&self, train_id: TrainId) -> Result<usize, ReservationError> {
        let query = self
            .train_query(train_id)
            .await?
            .with_status(ReservationStatus::Waiting);
        Ok(self.store().count_reservations(query).await?)
    }

    /// Confirmed reservations across every schedule of a train. Admin only.
    ///
    /// # Errors
    ///
    /// `Forbidden`, `NotFound` for an unknown train, or a store failure.
    pub async fn confirmed_for_train(
        &self,
        actor: &Actor,
        train_id: TrainId,
    ) -> Result<Vec<Reservation>, ReservationError> {
        actor.require_admin()?;
        let query = self
            .train_query(train_id)
            .await?
            .with_status(ReservationStatus::Confirmed);
        Ok(self.store().find_reservations(query).await?)
    }

    /// Reservations of one schedule, oldest first.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown schedule, or a store failure.
    pub async fn reservations_for_schedule(
        &self,
        schedule_id: ScheduleId,
    ) -> Result<Vec<Reservation>, ReservationError> {
        self.load_schedule(schedule_id).await?;
        Ok(self
            .store()
            .find_reservations(ReservationQuery::for_schedule(schedule_id))
            .await?)
    }

    /// Not-Confirmed reservations of one schedule. Admin only.
    ///
    /// The sweep deletes these as it resolves them, so anything listed here is
    /// left over from a sweep that stopped part-way.
    ///
    /// # Errors
    ///
    /// `Forbidden`, `NotFound` for an unknown schedule, or a store failure.
    pub async fn not_confirmed_reservations(
        &self,
        actor: &Actor,
        schedule_id: ScheduleId,
    ) -> Result<Vec<Reservation>, ReservationError> {
        actor.require_admin()?;
        self.load_schedule(schedule_id).await?;
        Ok(self
            .store()
            .find_reservations(
                ReservationQuery::for_schedule(schedule_id)
                    .with_status(ReservationStatus::NotConfirmed),
            )
            .await?)
    }

    /// One schedule together with the train running it.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown schedule or train, or a store failure.
    pub async fn get_schedule(
        &self,
        schedule_id: ScheduleId,
    ) -> Result<(Schedule, Train), ReservationError> {
        let schedule = self.load_schedule(schedule_id).await?;
        let train = self.load_train(schedule.train_id).await?;
        Ok((schedule, train))
    }

    /// Every schedule, by departure.
    ///
    /// # Errors
    ///
    /// Store failures.
    pub async fn list_schedules(&self) -> Result<Vec<Schedule>, ReservationError> {
        Ok(self.store().list_schedules().await?)
    }

    /// Every train, by number.
    ///
    /// # Errors
    ///
    /// Store failures.
    pub async fn list_trains(&self) -> Result<Vec<Train>, ReservationError> {
        Ok(self.store().list_trains().await?)
    }

    /// A train's seat pool, by compartment and number.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown train, or a store failure.
    pub async fn seats_for_train(&self, train_id: TrainId) -> Result<Vec<Seat>, ReservationError> {
        self.load_train(train_id).await?;
        Ok(self.store().seats_for_train(train_id).await?)
    }

    async fn train_query(&self, train_id: TrainId) -> Result<ReservationQuery, ReservationError> {
        self.load_train(train_id).await?;
        let schedule_ids = self
            .store()
            .schedules_for_train(train_id)
            .await?
            .into_iter()
            .map(|s| s.id)
            .collect();
        Ok(ReservationQuery::for_schedules(schedule_ids))
    }
}
