//! Domain records for the Railbook reservation system.
//!
//! Trains own a capacity ledger (`total_seats` / `available_seats`) and a pool of
//! seats. Schedules are departures of one train. Reservations tie a passenger to a
//! schedule and, once confirmed, to one seat of the train's pool.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

// ============================================================================
// Identifiers
// ============================================================================

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(Uuid);

        impl $name {
            #[doc = concat!("Creates a new random `", stringify!($name), "`")]
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            #[doc = concat!("Create a `", stringify!($name), "` from a `Uuid`")]
            #[must_use]
            pub const fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Get the inner UUID
            #[must_use]
            pub const fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

define_id!(
    /// Unique identifier for a train
    TrainId
);
define_id!(
    /// Unique identifier for a scheduled departure
    ScheduleId
);
define_id!(
    /// Unique identifier for a seat in a train's pool
    SeatId
);
define_id!(
    /// Unique identifier for a reservation
    ReservationId
);
define_id!(
    /// Unique identifier for a passenger
    PassengerId
);

// ============================================================================
// Validation
// ============================================================================

/// Record-level validation failures (independent of any store state).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Arrival must be strictly after departure
    #[error("arrival time {arrival} must be after departure time {departure}")]
    ArrivalBeforeDeparture {
        /// Requested departure
        departure: DateTime<Utc>,
        /// Requested arrival
        arrival: DateTime<Utc>,
    },

    /// A train needs at least one seat
    #[error("total seats must be a positive number")]
    NoSeats,

    /// A train needs at least one compartment to place seats in
    #[error("compartments must be a non-empty list")]
    NoCompartments,

    /// Passenger names are 3-50 characters of letters, digits, `.`, `_`, `-`
    #[error("invalid passenger name: {0:?}")]
    InvalidPassengerName(String),
}

// ============================================================================
// Train
// ============================================================================

/// A train and its capacity ledger.
///
/// Invariant: `0 <= available_seats <= total_seats`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Train {
    /// Train ID
    pub id: TrainId,
    /// Display name (unique)
    pub name: String,
    /// Train number (unique)
    pub number: u32,
    /// Size of the seat pool
    pub total_seats: u32,
    /// Seats not held by a confirmed reservation
    pub available_seats: u32,
}

impl Train {
    /// Creates a train with every seat available.
    #[must_use]
    pub fn new(name: impl Into<String>, number: u32, total_seats: u32) -> Self {
        Self {
            id: TrainId::new(),
            name: name.into(),
            number,
            total_seats,
            available_seats: total_seats,
        }
    }

    /// Seats currently held by confirmed reservations.
    #[must_use]
    pub const fn held_seats(&self) -> u32 {
        self.total_seats.saturating_sub(self.available_seats)
    }
}

// ============================================================================
// Schedule
// ============================================================================

/// A scheduled departure of one train.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schedule {
    /// Schedule ID
    pub id: ScheduleId,
    /// Train running this schedule
    pub train_id: TrainId,
    /// Departure time
    pub departure_time: DateTime<Utc>,
    /// Arrival time (always after departure)
    pub arrival_time: DateTime<Utc>,
}

impl Schedule {
    /// Creates a schedule.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::ArrivalBeforeDeparture`] unless `arrival > departure`.
    pub fn new(
        train_id: TrainId,
        departure_time: DateTime<Utc>,
        arrival_time: DateTime<Utc>,
    ) -> Result<Self, ValidationError> {
        if arrival_time <= departure_time {
            return Err(ValidationError::ArrivalBeforeDeparture {
                departure: departure_time,
                arrival: arrival_time,
            });
        }

        Ok(Self {
            id: ScheduleId::new(),
            train_id,
            departure_time,
            arrival_time,
        })
    }
}

// ============================================================================
// Seat
// ============================================================================

/// A seat in a train's pool.
///
/// `is_available == false` means the seat is held by exactly one confirmed reservation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Seat {
    /// Seat ID
    pub id: SeatId,
    /// Train whose pool this seat belongs to
    pub train_id: TrainId,
    /// Seat number, e.g. `"B7"`
    pub seat_number: String,
    /// Compartment name, e.g. `"B"`
    pub compartment: String,
    /// Whether the seat is free
    pub is_available: bool,
}

impl Seat {
    /// Creates an available seat.
    #[must_use]
    pub fn new(
        train_id: TrainId,
        seat_number: impl Into<String>,
        compartment: impl Into<String>,
    ) -> Self {
        Self {
            id: SeatId::new(),
            train_id,
            seat_number: seat_number.into(),
            compartment: compartment.into(),
            is_available: true,
        }
    }
}

// ============================================================================
// Reservation
// ============================================================================

/// Reservation lifecycle status.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReservationStatus {
    /// Holds a seat and one unit of train capacity
    Confirmed,
    /// On the waitlist, ordered by reservation time
    Waiting,
    /// Forcibly resolved by the cutoff sweep; deleted right after
    #[serde(rename = "Not-Confirmed")]
    NotConfirmed,
    /// Canceled by the passenger
    Canceled,
}

impl ReservationStatus {
    /// Confirmed or Waiting.
    #[must_use]
    pub const fn is_active(self) -> bool {
        matches!(self, Self::Confirmed | Self::Waiting)
    }

    /// Canceled or Not-Confirmed; never transitions back.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        !self.is_active()
    }
}

impl fmt::Display for ReservationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Confirmed => "Confirmed",
            Self::Waiting => "Waiting",
            Self::NotConfirmed => "Not-Confirmed",
            Self::Canceled => "Canceled",
        };
        f.write_str(label)
    }
}

/// Whether the passenger has boarded.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum BoardingStatus {
    /// Not yet boarded
    #[default]
    #[serde(rename = "Not-Boarded")]
    NotBoarded,
    /// Boarded
    Boarded,
}

/// A passenger's claim on a schedule.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    /// Reservation ID
    pub id: ReservationId,
    /// Passenger holding the reservation
    pub passenger_id: PassengerId,
    /// Held seat when Confirmed; seat preference (or none) when Waiting
    pub seat_id: Option<SeatId>,
    /// Schedule reserved on
    pub schedule_id: ScheduleId,
    /// Lifecycle status
    pub status: ReservationStatus,
    /// Boarding status
    pub boarding_status: BoardingStatus,
    /// Strictly increasing creation time; waitlist fairness key
    pub reservation_time: DateTime<Utc>,
}

impl Reservation {
    /// Creates a reservation in the given status.
    #[must_use]
    pub fn new(
        passenger_id: PassengerId,
        seat_id: Option<SeatId>,
        schedule_id: ScheduleId,
        status: ReservationStatus,
        reservation_time: DateTime<Utc>,
    ) -> Self {
        Self {
            id: ReservationId::new(),
            passenger_id,
            seat_id,
            schedule_id,
            status,
            boarding_status: BoardingStatus::NotBoarded,
            reservation_time,
        }
    }

    /// Whether this reservation occupies a seat and a unit of capacity.
    #[must_use]
    pub const fn holds_seat(&self) -> bool {
        matches!(self.status, ReservationStatus::Confirmed) && self.seat_id.is_some()
    }
}

// ============================================================================
// Passenger
// ============================================================================

/// Authorization role supplied by the authentication collaborator.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Regular passenger
    #[default]
    User,
    /// Administrator (train / schedule / seat management, confirmed lists)
    Admin,
}

/// A registered passenger.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Passenger {
    /// Passenger ID
    pub id: PassengerId,
    /// Unique user name
    pub name: String,
    /// Contact email
    pub email: String,
    /// Credential hash produced by the authentication collaborator
    pub password_hash: String,
    /// Role
    pub role: Role,
}

impl Passenger {
    /// Creates a passenger.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::InvalidPassengerName`] if the name is not 3-50
    /// characters drawn from letters, digits, `.`, `_` and `-`.
    pub fn new(
        name: impl Into<String>,
        email: impl Into<String>,
        password_hash: impl Into<String>,
        role: Role,
    ) -> Result<Self, ValidationError> {
        let name = name.into().trim().to_string();
        let valid_chars = name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'));
        if !(3..=50).contains(&name.len()) || !valid_chars {
            return Err(ValidationError::InvalidPassengerName(name));
        }

        Ok(Self {
            id: PassengerId::new(),
            name,
            email: email.into(),
            password_hash: password_hash.into(),
            role,
        })
    }

    /// Whether this passenger may perform administrative operations.
    #[must_use]
    pub const fn is_admin(&self) -> bool {
        matches!(self.role, Role::Admin)
    }
}
