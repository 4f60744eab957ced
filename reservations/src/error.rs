//! Typed failures of the reservation engine.

use railbook_core::{StoreError, ValidationError};
use railbook_runtime::LeaseError;
use std::fmt;
use thiserror::Error;

/// Record kinds named by [`ReservationError::NotFound`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Entity {
    /// Passenger
    Passenger,
    /// Train
    Train,
    /// Schedule
    Schedule,
    /// Seat
    Seat,
    /// Reservation
    Reservation,
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Passenger => "passenger",
            Self::Train => "train",
            Self::Schedule => "schedule",
            Self::Seat => "seat",
            Self::Reservation => "reservation",
        };
        f.write_str(name)
    }
}

/// Errors returned by engine operations.
///
/// Domain errors are returned to the caller as-is; only [`Busy`](Self::Busy) is
/// worth retrying.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReservationError {
    /// A referenced record does not exist
    #[error("{entity} {id} not found")]
    NotFound {
        /// Kind of record
        entity: Entity,
        /// Id as given by the caller
        id: String,
    },

    /// The booking cutoff before departure has been reached
    #[error("Reservations are closed for this schedule")]
    ReservationClosed,

    /// The cancellation cutoff before arrival has been reached
    #[error("Cancellations are closed for this schedule")]
    CancellationClosed,

    /// The seat is already taken for this schedule
    #[error("Seat {0} is already booked")]
    SeatAlreadyBooked(String),

    /// The seat does not exist on the schedule's train
    #[error("Seat {0} not found on this train")]
    SeatNotFound(String),

    /// As many passengers are waiting as the train has seats
    #[error("Waitlist is full")]
    WaitlistFull,

    /// The capacity ledger would underflow
    #[error("No capacity left on train {0}")]
    CapacityExhausted(String),

    /// The reservation was already canceled
    #[error("Reservation {0} is already canceled")]
    AlreadyCanceled(String),

    /// A confirmed reservation had no seat; it has been removed
    #[error("Reservation {0} had no seat information and was removed")]
    MissingSeatInformation(String),

    /// Boarding is only possible shortly before arrival
    #[error("Boarding is closed for this schedule")]
    BoardingClosed,

    /// Only confirmed reservations can board
    #[error("Reservation {0} is not confirmed")]
    NotConfirmed(String),

    /// The actor lacks the admin role
    #[error("Administrator role required")]
    Forbidden,

    /// Request data failed validation
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The record is still referenced by active reservations, schedules or seat
    /// holds and cannot be removed
    #[error("{0} is still in use")]
    InUse(String),

    /// A lease could not be acquired within the bounded wait
    #[error(transparent)]
    Busy(#[from] LeaseError),

    /// The inventory store failed
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl ReservationError {
    pub(crate) fn not_found(entity: Entity, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Whether retrying the operation later may succeed.
    #[must_use]
    pub const fn is_busy(&self) -> bool {
        matches!(self, Self::Busy(_))
    }

    /// Short label for metrics and logs.
    #[must_use]
    pub const fn reason(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "not_found",
            Self::ReservationClosed => "reservation_closed",
            Self::CancellationClosed => "cancellation_closed",
            Self::SeatAlreadyBooked(_) => "seat_already_booked",
            Self::SeatNotFound(_) => "seat_not_found",
            Self::WaitlistFull => "waitlist_full",
            Self::CapacityExhausted(_) => "capacity_exhausted",
            Self::AlreadyCanceled(_) => "already_canceled",
            Self::MissingSeatInformation(_) => "missing_seat_information",
            Self::BoardingClosed => "boarding_closed",
            Self::NotConfirmed(_) => "not_confirmed",
            Self::Forbidden => "forbidden",
            Self::InvalidInput(_) => "invalid_input",
            Self::InUse(_) => "in_use",
            Self::Busy(_) => "busy",
            Self::Store(_) => "store",
        }
    }
}

impl From<ValidationError> for ReservationError {
    fn from(err: ValidationError) -> Self {
        Self::InvalidInput(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use railbook_runtime::LeaseKey;
    use std::time::Duration;

    #[test]
    fn only_busy_is_retryable() {
        let busy = ReservationError::from(LeaseError::Busy {
            key: LeaseKey::Schedule(railbook_core::ScheduleId::new()),
            waited: Duration::from_millis(5),
        });
        assert!(busy.is_busy());
        assert_eq!(busy.reason(), "busy");
        assert!(!ReservationError::WaitlistFull.is_busy());
    }

    #[test]
    fn not_found_names_the_entity() {
        let err = ReservationError::not_found(Entity::Schedule, "abc");
        assert_eq!(err.to_string(), "schedule abc not found");
    }

    #[test]
    fn validation_maps_to_invalid_input() {
        let err = ReservationError::from(ValidationError::NoSeats);
        assert!(matches!(err, ReservationError::InvalidInput(_)));
    }
}
