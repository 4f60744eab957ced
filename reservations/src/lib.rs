//! # Reservations
//!
//! Seat allocation and reservation lifecycle for scheduled train departures.
//!
//! Passengers request a seat or a waitlist place on a schedule. The engine
//! confirms, waitlists or rejects the request under a per-schedule lease,
//! keeps the train's capacity ledger in step with seat holds, promotes the
//! waitlist in arrival order as seats free up, and sweeps unresolved waiting
//! reservations once the booking cutoff is reached.
//!
//! ## Example
//!
//! ```
//! use reservations::{ReservationEngine, ReservationEnvironment};
//! use railbook_core::{ReservationStatus, Role};
//! use railbook_testing::{InMemoryInventoryStore, fixtures, test_clock};
//! use railbook_core::environment::Clock;
//! use chrono::Duration;
//! use std::sync::Arc;
//!
//! # tokio_test::block_on(async {
//! let store = InMemoryInventoryStore::new();
//! let clock = test_clock();
//! let seeded = fixtures::seed_train(&store, 1);
//! let schedule = fixtures::seed_schedule(&store, &seeded.train, clock.now() + Duration::days(1));
//! let alice = fixtures::seed_passenger(&store, Role::User);
//! let bob = fixtures::seed_passenger(&store, Role::User);
//!
//! let engine = ReservationEngine::new(ReservationEnvironment::new(
//!     Arc::new(clock),
//!     Arc::new(store),
//! ));
//!
//! let first = engine
//!     .request_reservation(alice.id, Some(seeded.seats[0].id), schedule.id)
//!     .await?;
//! assert_eq!(first.status, ReservationStatus::Confirmed);
//!
//! let second = engine.request_reservation(bob.id, None, schedule.id).await?;
//! assert_eq!(second.status, ReservationStatus::Waiting);
//!
//! engine.cancel_reservation(first.id).await?;
//! let promoted = engine.reservations_for_passenger(bob.id).await?;
//! assert_eq!(promoted[0].status, ReservationStatus::Confirmed);
//! # Ok::<(), reservations::ReservationError>(())
//! # }).unwrap();
//! ```

pub mod admin;
pub mod allocation;
pub mod boarding;
pub mod cancellation;
pub mod config;
pub mod engine;
pub mod environment;
pub mod error;
pub mod ledger;
pub mod maintenance;
pub mod policy;
pub mod promoter;
pub mod queries;
pub mod saga;
pub mod sweeper;

pub use admin::{Actor, NewTrain, PassengerUpdate, TrainUpdate};
pub use cancellation::CancelOutcome;
pub use config::Config;
pub use engine::ReservationEngine;
pub use environment::ReservationEnvironment;
pub use error::{Entity, ReservationError};
pub use maintenance::MaintenanceTask;
pub use policy::BookingPolicy;
