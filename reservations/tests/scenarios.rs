//! Reservation lifecycle scenarios.
//!
//! End-to-end flows through the engine against the in-memory store: admission,
//! waitlisting, cancellation with promotion, cutoff sweeps, boarding and the
//! administrative surface. Every test finishes by checking the capacity and
//! seat invariants.
//!
//! Run with: `cargo test -p reservations --test scenarios`

#![allow(clippy::expect_used)]
#![allow(clippy::unwrap_used)]

use chrono::Duration;
use railbook_core::environment::Clock;
use railbook_core::{
    BoardingStatus, Passenger, Reservation, ReservationId, ReservationStatus, Role, Schedule,
    Seat, Train,
};
use railbook_testing::fixtures::{self, SeededTrain};
use railbook_testing::{
    InMemoryInventoryStore, ManualClock, StoreOp, check_invariants, manual_clock,
};
use reservations::{
    Actor, CancelOutcome, Entity, NewTrain, PassengerUpdate, ReservationEngine,
    ReservationEnvironment, ReservationError, TrainUpdate,
};
use std::sync::Arc;

struct Harness {
    store: InMemoryInventoryStore,
    clock: ManualClock,
    engine: ReservationEngine,
    train: Train,
    seats: Vec<Seat>,
    schedule: Schedule,
}

impl Harness {
    /// A train with `total_seats` seats and one schedule departing tomorrow.
    fn new(total_seats: u32) -> Self {
        railbook_testing::init_test_tracing();
        let store = InMemoryInventoryStore::new();
        let clock = manual_clock();
        let SeededTrain { train, seats } = fixtures::seed_train(&store, total_seats);
        let schedule =
            fixtures::seed_schedule(&store, &train, clock.now() + Duration::days(1));
        let engine = ReservationEngine::new(ReservationEnvironment::new(
            Arc::new(clock.clone()),
            Arc::new(store.clone()),
        ));
        Self {
            store,
            clock,
            engine,
            train,
            seats,
            schedule,
        }
    }

    fn passenger(&self) -> Passenger {
        fixtures::seed_passenger(&self.store, Role::User)
    }

    fn admin(&self) -> Actor {
        Actor::from(&fixtures::seed_passenger(&self.store, Role::Admin))
    }

    fn available(&self) -> u32 {
        self.store.train(self.train.id).unwrap().available_seats
    }

    fn reservation(&self, id: ReservationId) -> Option<Reservation> {
        self.store.reservation(id)
    }

    fn assert_invariants(&self) {
        check_invariants(&self.store, self.train.id).unwrap();
    }
}

// ============================================================================
// Admission
// ============================================================================

#[tokio::test]
async fn scenario_a_seat_taken_then_waitlist() {
    let h = Harness::new(1);
    let seat = &h.seats[0];
    let (p1, p2) = (h.passenger(), h.passenger());

    let confirmed = h
        .engine
        .request_reservation(p1.id, Some(seat.id), h.schedule.id)
        .await
        .unwrap();
    assert_eq!(confirmed.status, ReservationStatus::Confirmed);
    assert_eq!(confirmed.seat_id, Some(seat.id));
    assert_eq!(h.available(), 0);

    let taken = h
        .engine
        .request_reservation(p2.id, Some(seat.id), h.schedule.id)
        .await;
    assert!(matches!(taken, Err(ReservationError::SeatAlreadyBooked(_))));

    let waiting = h
        .engine
        .request_reservation(p2.id, None, h.schedule.id)
        .await
        .unwrap();
    assert_eq!(waiting.status, ReservationStatus::Waiting);
    assert_eq!(h.engine.waiting_count_for_train(h.train.id).await.unwrap(), 1);
    h.assert_invariants();
}

#[tokio::test]
async fn scenario_b_cancel_promotes_waiting_passenger_into_freed_seat() {
    let h = Harness::new(1);
    let seat = &h.seats[0];
    let (p1, p2) = (h.passenger(), h.passenger());
    let confirmed = h
        .engine
        .request_reservation(p1.id, Some(seat.id), h.schedule.id)
        .await
        .unwrap();
    let waiting = h
        .engine
        .request_reservation(p2.id, None, h.schedule.id)
        .await
        .unwrap();

    let outcome = h.engine.cancel_reservation(confirmed.id).await.unwrap();

    assert_eq!(outcome, CancelOutcome::Canceled { promoted: 1 });
    let canceled = h.reservation(confirmed.id).unwrap();
    assert_eq!(canceled.status, ReservationStatus::Canceled);
    assert_eq!(canceled.seat_id, None);

    let promoted = h.reservation(waiting.id).unwrap();
    assert_eq!(promoted.status, ReservationStatus::Confirmed);
    assert_eq!(promoted.seat_id, Some(seat.id));
    assert!(!h.store.seat(seat.id).unwrap().is_available);
    assert_eq!(h.available(), 0);
    h.assert_invariants();
}

#[tokio::test]
async fn scenario_c_booking_closed_inside_cutoff() {
    let h = Harness::new(2);
    let soon = fixtures::seed_schedule(&h.store, &h.train, h.clock.now() + Duration::hours(2));

    let result = h
        .engine
        .request_reservation(h.passenger().id, None, soon.id)
        .await;

    assert_eq!(result, Err(ReservationError::ReservationClosed));
    assert_eq!(h.available(), 2);
}

#[tokio::test]
async fn scenario_d_sweep_resolves_seatless_waiting_reservation() {
    let h = Harness::new(1);
    h.engine
        .request_reservation(h.passenger().id, None, h.schedule.id)
        .await
        .unwrap();
    let waiting = h
        .engine
        .request_reservation(h.passenger().id, None, h.schedule.id)
        .await
        .unwrap();
    assert_eq!(waiting.status, ReservationStatus::Waiting);

    h.clock.set(h.schedule.departure_time - Duration::hours(2));
    let resolved = h.engine.sweep(h.schedule.id).await.unwrap();

    assert_eq!(resolved, 1);
    assert!(h.reservation(waiting.id).is_none());
    assert_eq!(h.available(), 0, "a waiting entry never held capacity");
    h.assert_invariants();

    assert_eq!(h.engine.sweep(h.schedule.id).await.unwrap(), 0);
}

#[tokio::test]
async fn scenario_e_one_cancel_promotes_exactly_one() {
    let h = Harness::new(2);
    for seat in &h.seats {
        h.engine
            .request_reservation(h.passenger().id, Some(seat.id), h.schedule.id)
            .await
            .unwrap();
    }
    let first_confirmed = h.store.reservations_of(h.schedule.id)[0].clone();
    let early = h
        .engine
        .request_reservation(h.passenger().id, None, h.schedule.id)
        .await
        .unwrap();
    let late = h
        .engine
        .request_reservation(h.passenger().id, None, h.schedule.id)
        .await
        .unwrap();

    let outcome = h.engine.cancel_reservation(first_confirmed.id).await.unwrap();

    assert_eq!(outcome, CancelOutcome::Canceled { promoted: 1 });
    assert_eq!(
        h.reservation(early.id).unwrap().status,
        ReservationStatus::Confirmed
    );
    assert_eq!(
        h.reservation(late.id).unwrap().status,
        ReservationStatus::Waiting
    );
    assert_eq!(h.available(), 0);
    h.assert_invariants();
}

#[tokio::test]
async fn request_then_cancel_restores_capacity_and_seat() {
    let h = Harness::new(3);
    let seat = &h.seats[1];
    let before_available = h.available();
    let before_seat = h.store.seat(seat.id).unwrap();

    let reservation = h
        .engine
        .request_reservation(h.passenger().id, Some(seat.id), h.schedule.id)
        .await
        .unwrap();
    h.engine.cancel_reservation(reservation.id).await.unwrap();

    assert_eq!(h.available(), before_available);
    assert_eq!(h.store.seat(seat.id).unwrap(), before_seat);
    h.assert_invariants();
}

#[tokio::test]
async fn seatless_request_with_room_takes_lowest_free_seat() {
    let h = Harness::new(3);
    h.engine
        .request_reservation(h.passenger().id, Some(h.seats[0].id), h.schedule.id)
        .await
        .unwrap();

    let reservation = h
        .engine
        .request_reservation(h.passenger().id, None, h.schedule.id)
        .await
        .unwrap();

    assert_eq!(reservation.status, ReservationStatus::Confirmed);
    assert_eq!(reservation.seat_id, Some(h.seats[1].id));
    h.assert_invariants();
}

#[tokio::test]
async fn waitlist_is_capped_at_total_seats() {
    let h = Harness::new(1);
    for _ in 0..2 {
        h.engine
            .request_reservation(h.passenger().id, None, h.schedule.id)
            .await
            .unwrap();
    }

    let result = h
        .engine
        .request_reservation(h.passenger().id, None, h.schedule.id)
        .await;

    assert_eq!(result, Err(ReservationError::WaitlistFull));
}

#[tokio::test]
async fn unknown_and_foreign_seats_are_not_found() {
    let h = Harness::new(1);
    let other = fixtures::seed_train(&h.store, 1);
    let passenger = h.passenger();

    let foreign = h
        .engine
        .request_reservation(passenger.id, Some(other.seats[0].id), h.schedule.id)
        .await;
    assert!(matches!(foreign, Err(ReservationError::SeatNotFound(_))));

    let unknown = h
        .engine
        .request_reservation(passenger.id, None, railbook_core::ScheduleId::new())
        .await;
    assert!(matches!(
        unknown,
        Err(ReservationError::NotFound {
            entity: Entity::Schedule,
            ..
        })
    ));

    let stranger = h
        .engine
        .request_reservation(railbook_core::PassengerId::new(), None, h.schedule.id)
        .await;
    assert!(matches!(
        stranger,
        Err(ReservationError::NotFound {
            entity: Entity::Passenger,
            ..
        })
    ));
}

#[tokio::test]
async fn seat_preference_is_honoured_across_schedules() {
    // Two departures share one two-seat pool.
    let h = Harness::new(2);
    let later = fixtures::seed_schedule(&h.store, &h.train, h.clock.now() + Duration::days(2));
    let (a1, a2) = (&h.seats[0], &h.seats[1]);

    let on_later = h
        .engine
        .request_reservation(h.passenger().id, Some(a1.id), later.id)
        .await
        .unwrap();
    h.engine
        .request_reservation(h.passenger().id, Some(a2.id), h.schedule.id)
        .await
        .unwrap();

    // A1 is not referenced on this schedule, but the pool is out of capacity.
    let wants_a1 = h
        .engine
        .request_reservation(h.passenger().id, Some(a1.id), h.schedule.id)
        .await
        .unwrap();
    assert_eq!(wants_a1.status, ReservationStatus::Waiting);
    assert_eq!(wants_a1.seat_id, Some(a1.id));

    h.engine.cancel_reservation(on_later.id).await.unwrap();
    assert_eq!(h.engine.promote(h.schedule.id).await.unwrap(), 1);

    let promoted = h.reservation(wants_a1.id).unwrap();
    assert_eq!(promoted.status, ReservationStatus::Confirmed);
    assert_eq!(promoted.seat_id, Some(a1.id));
    h.assert_invariants();
}

// ============================================================================
// Cancellation
// ============================================================================

#[tokio::test]
async fn canceling_twice_is_rejected() {
    let h = Harness::new(1);
    let reservation = h
        .engine
        .request_reservation(h.passenger().id, None, h.schedule.id)
        .await
        .unwrap();
    h.engine.cancel_reservation(reservation.id).await.unwrap();

    let again = h.engine.cancel_reservation(reservation.id).await;
    assert!(matches!(again, Err(ReservationError::AlreadyCanceled(_))));

    let missing = h.engine.cancel_reservation(ReservationId::new()).await;
    assert!(matches!(
        missing,
        Err(ReservationError::NotFound {
            entity: Entity::Reservation,
            ..
        })
    ));
}

#[tokio::test]
async fn cancellation_closes_before_arrival() {
    let h = Harness::new(1);
    let reservation = h
        .engine
        .request_reservation(h.passenger().id, None, h.schedule.id)
        .await
        .unwrap();

    h.clock.set(h.schedule.arrival_time - Duration::hours(2));
    let result = h.engine.cancel_reservation(reservation.id).await;

    assert_eq!(result, Err(ReservationError::CancellationClosed));
    assert_eq!(
        h.reservation(reservation.id).unwrap().status,
        ReservationStatus::Confirmed
    );
}

#[tokio::test]
async fn canceling_waiting_reservation_deletes_it() {
    let h = Harness::new(1);
    h.engine
        .request_reservation(h.passenger().id, None, h.schedule.id)
        .await
        .unwrap();
    let waiting = h
        .engine
        .request_reservation(h.passenger().id, None, h.schedule.id)
        .await
        .unwrap();

    let outcome = h.engine.cancel_reservation(waiting.id).await.unwrap();

    assert_eq!(outcome, CancelOutcome::RemovedFromWaitlist);
    assert!(h.reservation(waiting.id).is_none());
    assert_eq!(h.available(), 0);
    h.assert_invariants();
}

#[tokio::test]
async fn confirmed_without_seat_is_removed_and_reported() {
    let h = Harness::new(1);
    let corrupt = Reservation::new(
        h.passenger().id,
        None,
        h.schedule.id,
        ReservationStatus::Confirmed,
        h.clock.now(),
    );
    h.store.put_reservation(corrupt.clone());

    let result = h.engine.cancel_reservation(corrupt.id).await;

    assert!(matches!(
        result,
        Err(ReservationError::MissingSeatInformation(_))
    ));
    assert!(h.reservation(corrupt.id).is_none());
}

// ============================================================================
// Sweep
// ============================================================================

#[tokio::test]
async fn sweep_outside_window_does_nothing() {
    let h = Harness::new(1);
    h.engine
        .request_reservation(h.passenger().id, None, h.schedule.id)
        .await
        .unwrap();
    let waiting = h
        .engine
        .request_reservation(h.passenger().id, None, h.schedule.id)
        .await
        .unwrap();

    assert_eq!(h.engine.sweep(h.schedule.id).await.unwrap(), 0);
    assert_eq!(
        h.reservation(waiting.id).unwrap().status,
        ReservationStatus::Waiting
    );

    h.clock.set(h.schedule.departure_time + Duration::minutes(1));
    assert_eq!(h.engine.sweep(h.schedule.id).await.unwrap(), 0);
}

#[tokio::test]
async fn sweep_finishes_leftover_not_confirmed_records() {
    let h = Harness::new(1);
    let leftover = Reservation::new(
        h.passenger().id,
        None,
        h.schedule.id,
        ReservationStatus::NotConfirmed,
        h.clock.now(),
    );
    h.store.put_reservation(leftover.clone());

    h.clock.set(h.schedule.departure_time - Duration::minutes(30));
    assert_eq!(h.engine.sweep(h.schedule.id).await.unwrap(), 1);
    assert!(h.reservation(leftover.id).is_none());
    h.assert_invariants();
}

#[tokio::test]
async fn confirming_last_unit_inside_cutoff_sweeps_waitlist() {
    let h = Harness::new(1);
    let later = fixtures::seed_schedule(
        &h.store,
        &h.train,
        h.clock.now() + Duration::days(2),
    );
    let holder = h
        .engine
        .request_reservation(h.passenger().id, None, later.id)
        .await
        .unwrap();
    let waiting = h
        .engine
        .request_reservation(h.passenger().id, None, h.schedule.id)
        .await
        .unwrap();
    assert_eq!(waiting.status, ReservationStatus::Waiting);
    h.engine.cancel_reservation(holder.id).await.unwrap();
    assert_eq!(h.available(), 1);

    // The clock crosses into the cutoff window while the seat is being claimed.
    let clock = h.clock.clone();
    let cutoff = h.schedule.departure_time - Duration::hours(3);
    h.store.before_next(StoreOp::ClaimSeat, move || clock.set(cutoff));

    let confirmed = h
        .engine
        .request_reservation(h.passenger().id, Some(h.seats[0].id), h.schedule.id)
        .await
        .unwrap();

    assert_eq!(confirmed.status, ReservationStatus::Confirmed);
    assert!(h.reservation(waiting.id).is_none());
    assert_eq!(h.available(), 0);
    h.assert_invariants();
}

// ============================================================================
// Boarding
// ============================================================================

#[tokio::test]
async fn boarding_only_in_window_and_only_confirmed() {
    let h = Harness::new(1);
    let confirmed = h
        .engine
        .request_reservation(h.passenger().id, None, h.schedule.id)
        .await
        .unwrap();
    let waiting = h
        .engine
        .request_reservation(h.passenger().id, None, h.schedule.id)
        .await
        .unwrap();

    assert_eq!(
        h.engine.board(confirmed.id).await,
        Err(ReservationError::BoardingClosed)
    );

    h.clock.set(h.schedule.arrival_time - Duration::minutes(10));
    let boarded = h.engine.board(confirmed.id).await.unwrap();
    assert_eq!(boarded.boarding_status, BoardingStatus::Boarded);
    assert_eq!(h.engine.board(confirmed.id).await.unwrap(), boarded);

    assert!(matches!(
        h.engine.board(waiting.id).await,
        Err(ReservationError::NotConfirmed(_))
    ));

    let all_boarded = h.engine.boarded_reservations().await.unwrap();
    assert_eq!(all_boarded.len(), 1);
    assert_eq!(all_boarded[0].id, confirmed.id);
}

// ============================================================================
// Administration and queries
// ============================================================================

#[tokio::test]
async fn add_train_lays_out_seats_and_rejects_duplicates() {
    let h = Harness::new(1);
    let admin = h.admin();
    let request = NewTrain {
        name: "Coastline".to_string(),
        number: 4242,
        total_seats: 5,
        compartments: vec!["A".to_string(), "B".to_string()],
    };

    let (train, seats) = h.engine.add_train(&admin, request.clone()).await.unwrap();
    assert_eq!(train.total_seats, 5);
    assert_eq!(train.available_seats, 5);
    let numbers: Vec<_> = seats.iter().map(|s| s.seat_number.as_str()).collect();
    assert_eq!(numbers, ["A1", "A2", "A3", "B4", "B5"]);
    assert_eq!(h.engine.seats_for_train(train.id).await.unwrap().len(), 5);

    let duplicate = h.engine.add_train(&admin, request.clone()).await;
    assert!(matches!(duplicate, Err(ReservationError::InvalidInput(_))));

    let user = Actor::from(&h.passenger());
    assert_eq!(
        h.engine.add_train(&user, request).await,
        Err(ReservationError::Forbidden)
    );
}

#[tokio::test]
async fn add_train_validates_input() {
    let h = Harness::new(1);
    let admin = h.admin();
    let base = NewTrain {
        name: "Valid".to_string(),
        number: 1,
        total_seats: 4,
        compartments: vec!["A".to_string()],
    };

    let no_seats = NewTrain {
        total_seats: 0,
        ..base.clone()
    };
    let no_compartments = NewTrain {
        compartments: vec![" ".to_string()],
        ..base.clone()
    };
    let no_name = NewTrain {
        name: String::new(),
        ..base
    };

    for bad in [no_seats, no_compartments, no_name] {
        assert!(matches!(
            h.engine.add_train(&admin, bad).await,
            Err(ReservationError::InvalidInput(_))
        ));
    }
}

#[tokio::test]
async fn add_schedule_requires_arrival_after_departure() {
    let h = Harness::new(1);
    let admin = h.admin();
    let departure = h.clock.now() + Duration::days(3);

    let backwards = h
        .engine
        .add_schedule(&admin, h.train.id, departure, departure - Duration::hours(1))
        .await;
    assert!(matches!(backwards, Err(ReservationError::InvalidInput(_))));

    let schedule = h
        .engine
        .add_schedule(&admin, h.train.id, departure, departure + Duration::hours(4))
        .await
        .unwrap();
    let listed = h.engine.list_schedules().await.unwrap();
    assert!(listed.iter().any(|s| s.id == schedule.id));
}

#[tokio::test]
async fn add_seat_grows_capacity() {
    let h = Harness::new(1);
    let admin = h.admin();
    h.engine
        .request_reservation(h.passenger().id, None, h.schedule.id)
        .await
        .unwrap();

    let seat = h.engine.add_seat(&admin, h.train.id, "B1", "B").await.unwrap();

    let train = h.store.train(h.train.id).unwrap();
    assert_eq!(train.total_seats, 2);
    assert_eq!(train.available_seats, 1);
    assert!(h.store.seat(seat.id).unwrap().is_available);
    h.assert_invariants();

    let again = h.engine.add_seat(&admin, h.train.id, "B1", "B").await;
    assert!(matches!(again, Err(ReservationError::InvalidInput(_))));
}

#[tokio::test]
async fn passenger_names_are_validated_and_unique() {
    let h = Harness::new(1);

    let passenger = h
        .engine
        .register_passenger("ada.l", "ada@example.com", "hash", Role::User)
        .await
        .unwrap();
    assert_eq!(passenger.name, "ada.l");

    let duplicate = h
        .engine
        .register_passenger("ada.l", "other@example.com", "hash", Role::User)
        .await;
    assert!(matches!(duplicate, Err(ReservationError::InvalidInput(_))));

    let malformed = h
        .engine
        .register_passenger("a!", "x@example.com", "hash", Role::User)
        .await;
    assert!(matches!(malformed, Err(ReservationError::InvalidInput(_))));
}

#[tokio::test]
async fn confirmed_list_is_admin_only() {
    let h = Harness::new(2);
    let passenger = h.passenger();
    h.engine
        .request_reservation(passenger.id, None, h.schedule.id)
        .await
        .unwrap();

    let user = Actor::from(&passenger);
    assert_eq!(
        h.engine.confirmed_for_train(&user, h.train.id).await,
        Err(ReservationError::Forbidden)
    );

    let confirmed = h
        .engine
        .confirmed_for_train(&h.admin(), h.train.id)
        .await
        .unwrap();
    assert_eq!(confirmed.len(), 1);

    let mine = h.engine.reservations_for_passenger(passenger.id).await.unwrap();
    assert_eq!(mine.len(), 1);
    assert_eq!(h.engine.list_trains().await.unwrap().len(), 1);
}

#[tokio::test]
async fn update_train_renames_and_keeps_capacity() {
    let h = Harness::new(2);
    let admin = h.admin();
    h.engine
        .request_reservation(h.passenger().id, None, h.schedule.id)
        .await
        .unwrap();

    let renamed = h
        .engine
        .update_train(
            &admin,
            h.train.id,
            TrainUpdate {
                name: Some("Night Owl".to_string()),
                number: None,
            },
        )
        .await
        .unwrap();
    assert_eq!(renamed.name, "Night Owl");
    assert_eq!(renamed.number, h.train.number);
    assert_eq!((renamed.total_seats, renamed.available_seats), (2, 1));

    let SeededTrain { train: other, .. } = fixtures::seed_train(&h.store, 1);
    let taken = h
        .engine
        .update_train(
            &admin,
            other.id,
            TrainUpdate {
                name: Some("Night Owl".to_string()),
                number: None,
            },
        )
        .await;
    assert!(matches!(taken, Err(ReservationError::InvalidInput(_))));

    let blank = TrainUpdate {
        name: Some("  ".to_string()),
        number: None,
    };
    assert!(matches!(
        h.engine.update_train(&admin, h.train.id, blank).await,
        Err(ReservationError::InvalidInput(_))
    ));

    let user = Actor::from(&h.passenger());
    assert_eq!(
        h.engine
            .update_train(&user, h.train.id, TrainUpdate::default())
            .await,
        Err(ReservationError::Forbidden)
    );
    h.assert_invariants();
}

#[tokio::test]
async fn train_with_schedules_is_not_deleted() {
    let h = Harness::new(2);
    let admin = h.admin();

    let refused = h.engine.delete_train(&admin, h.train.id).await;
    assert!(matches!(refused, Err(ReservationError::InUse(_))));
    assert!(h.store.train(h.train.id).is_some());
    h.assert_invariants();

    h.engine.delete_schedule(&admin, h.schedule.id).await.unwrap();
    let deleted = h.engine.delete_train(&admin, h.train.id).await.unwrap();

    assert_eq!(deleted.id, h.train.id);
    assert!(h.store.train(h.train.id).is_none());
    assert!(h.store.seats_of(h.train.id).is_empty());
    assert!(matches!(
        h.engine.delete_train(&admin, h.train.id).await,
        Err(ReservationError::NotFound {
            entity: Entity::Train,
            ..
        })
    ));
}

#[tokio::test]
async fn update_schedule_moves_times() {
    let h = Harness::new(1);
    let admin = h.admin();
    let departure = h.schedule.departure_time + Duration::days(1);

    let moved = h
        .engine
        .update_schedule(&admin, h.schedule.id, departure, departure + Duration::hours(2))
        .await
        .unwrap();
    assert_eq!(moved.id, h.schedule.id);
    assert_eq!(moved.train_id, h.train.id);

    let (fetched, train) = h.engine.get_schedule(h.schedule.id).await.unwrap();
    assert_eq!(fetched, moved);
    assert_eq!(train.id, h.train.id);

    let backwards = h
        .engine
        .update_schedule(&admin, h.schedule.id, departure, departure - Duration::hours(1))
        .await;
    assert!(matches!(backwards, Err(ReservationError::InvalidInput(_))));
    assert_eq!(h.store.schedule(h.schedule.id).unwrap(), moved);

    let user = Actor::from(&h.passenger());
    assert_eq!(
        h.engine
            .update_schedule(&user, h.schedule.id, departure, departure + Duration::hours(2))
            .await,
        Err(ReservationError::Forbidden)
    );
}

#[tokio::test]
async fn schedule_with_active_reservations_is_not_deleted() {
    let h = Harness::new(1);
    let admin = h.admin();
    let confirmed = h
        .engine
        .request_reservation(h.passenger().id, None, h.schedule.id)
        .await
        .unwrap();

    let refused = h.engine.delete_schedule(&admin, h.schedule.id).await;
    assert!(matches!(refused, Err(ReservationError::InUse(_))));

    h.engine.cancel_reservation(confirmed.id).await.unwrap();
    let deleted = h.engine.delete_schedule(&admin, h.schedule.id).await.unwrap();

    assert_eq!(deleted.id, h.schedule.id);
    assert!(h.store.schedule(h.schedule.id).is_none());
    assert!(matches!(
        h.engine.get_schedule(h.schedule.id).await,
        Err(ReservationError::NotFound {
            entity: Entity::Schedule,
            ..
        })
    ));
    assert_eq!(h.available(), 1);
    h.assert_invariants();
}

#[tokio::test]
async fn referenced_seat_is_not_deleted() {
    let h = Harness::new(2);
    let admin = h.admin();
    h.engine
        .request_reservation(h.passenger().id, Some(h.seats[0].id), h.schedule.id)
        .await
        .unwrap();

    let held = h.engine.delete_seat(&admin, h.seats[0].id).await;
    assert!(matches!(held, Err(ReservationError::InUse(_))));

    // A waiting preference on another departure also pins the seat.
    let later = fixtures::seed_schedule(&h.store, &h.train, h.clock.now() + Duration::days(2));
    h.store.put_reservation(Reservation::new(
        h.passenger().id,
        Some(h.seats[1].id),
        later.id,
        ReservationStatus::Waiting,
        h.clock.now(),
    ));
    let preferred = h.engine.delete_seat(&admin, h.seats[1].id).await;
    assert!(matches!(preferred, Err(ReservationError::InUse(_))));

    let train = h.store.train(h.train.id).unwrap();
    assert_eq!((train.total_seats, train.available_seats), (2, 1));
    h.assert_invariants();
}

#[tokio::test]
async fn delete_seat_shrinks_capacity() {
    let h = Harness::new(2);
    let admin = h.admin();

    let deleted = h.engine.delete_seat(&admin, h.seats[1].id).await.unwrap();

    assert_eq!(deleted.id, h.seats[1].id);
    assert!(h.store.seat(h.seats[1].id).is_none());
    let train = h.store.train(h.train.id).unwrap();
    assert_eq!((train.total_seats, train.available_seats), (1, 1));
    h.assert_invariants();

    assert!(matches!(
        h.engine.delete_seat(&admin, h.seats[1].id).await,
        Err(ReservationError::NotFound {
            entity: Entity::Seat,
            ..
        })
    ));
    let user = Actor::from(&h.passenger());
    assert_eq!(
        h.engine.delete_seat(&user, h.seats[0].id).await,
        Err(ReservationError::Forbidden)
    );
}

#[tokio::test]
async fn passengers_are_listed_by_name_for_admins() {
    let h = Harness::new(1);
    for name in ["zoe", "bob", "mia"] {
        h.engine
            .register_passenger(name, "x@example.com", "hash", Role::User)
            .await
            .unwrap();
    }

    let names = h.engine.list_passengers(&h.admin()).await.unwrap();
    let registered: Vec<_> = names
        .iter()
        .filter(|n| !n.starts_with("passenger-"))
        .map(String::as_str)
        .collect();
    assert_eq!(registered, ["bob", "mia", "zoe"]);

    let user = Actor::from(&h.passenger());
    assert_eq!(
        h.engine.list_passengers(&user).await,
        Err(ReservationError::Forbidden)
    );
}

#[tokio::test]
async fn update_passenger_validates_name() {
    let h = Harness::new(1);
    let admin = h.admin();
    let passenger = h.passenger();
    let other = h.passenger();

    let updated = h
        .engine
        .update_passenger(
            &admin,
            passenger.id,
            PassengerUpdate {
                name: Some("grace.h".to_string()),
                role: Some(Role::Admin),
                ..PassengerUpdate::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.id, passenger.id);
    assert_eq!(updated.name, "grace.h");
    assert_eq!(updated.role, Role::Admin);
    assert_eq!(updated.password_hash, passenger.password_hash);
    assert_eq!(h.store.passenger(passenger.id).unwrap(), updated);

    for bad in ["a!", other.name.as_str()] {
        let rejected = h
            .engine
            .update_passenger(
                &admin,
                passenger.id,
                PassengerUpdate {
                    name: Some(bad.to_string()),
                    ..PassengerUpdate::default()
                },
            )
            .await;
        assert!(matches!(rejected, Err(ReservationError::InvalidInput(_))));
    }
    assert_eq!(h.store.passenger(passenger.id).unwrap(), updated);
}

#[tokio::test]
async fn passenger_with_active_reservation_is_not_deleted() {
    let h = Harness::new(1);
    let admin = h.admin();
    let passenger = h.passenger();
    let reservation = h
        .engine
        .request_reservation(passenger.id, None, h.schedule.id)
        .await
        .unwrap();

    let refused = h.engine.delete_passenger(&admin, passenger.id).await;
    assert!(matches!(refused, Err(ReservationError::InUse(_))));

    h.engine.cancel_reservation(reservation.id).await.unwrap();
    let deleted = h.engine.delete_passenger(&admin, passenger.id).await.unwrap();
    assert_eq!(deleted.id, passenger.id);
    assert!(h.store.passenger(passenger.id).is_none());

    let user = Actor::from(&h.passenger());
    assert_eq!(
        h.engine.delete_passenger(&user, passenger.id).await,
        Err(ReservationError::Forbidden)
    );
    h.assert_invariants();
}

#[tokio::test]
async fn leftover_not_confirmed_records_are_listed_for_admins() {
    let h = Harness::new(1);
    let leftover = Reservation::new(
        h.passenger().id,
        None,
        h.schedule.id,
        ReservationStatus::NotConfirmed,
        h.clock.now(),
    );
    h.store.put_reservation(leftover.clone());
    h.engine
        .request_reservation(h.passenger().id, None, h.schedule.id)
        .await
        .unwrap();

    let listed = h
        .engine
        .not_confirmed_reservations(&h.admin(), h.schedule.id)
        .await
        .unwrap();
    assert_eq!(listed, [leftover]);

    let user = Actor::from(&h.passenger());
    assert_eq!(
        h.engine.not_confirmed_reservations(&user, h.schedule.id).await,
        Err(ReservationError::Forbidden)
    );
    h.assert_invariants();
}
