//! # Railbook Core
//!
//! Domain records and collaborator contracts for the Railbook seat reservation engine.
//!
//! This crate is deliberately free of policy. It defines:
//!
//! - **Records**: [`Train`], [`Schedule`], [`Seat`], [`Reservation`], [`Passenger`]
//! - **Identifiers**: strongly-typed UUID newtypes for every record
//! - **Environment**: the [`Clock`](environment::Clock) trait for injectable time
//! - **Store**: the [`InventoryStore`](store::InventoryStore) collaborator trait with
//!   per-record atomic update primitives only (no multi-record transactions)
//!
//! The allocation engine in the `reservations` crate is written entirely against
//! these types, so any persistence technology can sit behind the store trait.
//!
//! ## Example
//!
//! ```
//! use railbook_core::{Schedule, Train, TrainId};
//! use chrono::{Duration, Utc};
//!
//! let train = Train::new("Coastal Express", 12_045, 40);
//! assert_eq!(train.available_seats, 40);
//!
//! let departure = Utc::now() + Duration::days(2);
//! let schedule = Schedule::new(train.id, departure, departure + Duration::hours(6));
//! assert!(schedule.is_ok());
//!
//! let backwards = Schedule::new(TrainId::new(), departure, departure - Duration::hours(1));
//! assert!(backwards.is_err());
//! ```

#![forbid(unsafe_code)]

// Re-export commonly used types
pub use chrono::{DateTime, Utc};
pub use serde::{Deserialize, Serialize};

pub mod environment;
pub mod store;
pub mod types;

pub use store::{InventoryStore, ReservationQuery, StoreError, StoreFuture};
pub use types::*;
