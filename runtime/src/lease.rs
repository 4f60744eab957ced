//! Exclusive leases keyed by train, schedule and seat.
//!
//! Every read-decide-write sequence in the engine (capacity check, seat-booked
//! check, promotion walk, sweep) runs while holding a lease on the schedule, and
//! additionally on the seat when a specific seat is targeted. Requests for
//! different schedules and seats proceed in parallel. Administrative changes to
//! a train's schedules or seat pool also take the train key, which keeps the
//! set of schedules stable while they hold every schedule key of the train.
//!
//! # Guarantees
//!
//! - **Bounded wait**: acquisition gives up after the configured timeout with
//!   [`LeaseError::Busy`] instead of blocking indefinitely.
//! - **Release on every exit path**: a [`Lease`] releases its keys when dropped,
//!   including early returns through `?` and panics unwinding through the holder.
//! - **No lock-order inversion**: keys are acquired in canonical order
//!   (train keys, then schedule keys, then seat keys, each by id), so two callers asking for
//!   overlapping key sets cannot deadlock.
//!
//! Leases are not re-entrant. Code already holding a schedule lease must call the
//! lease-free inner variants of engine operations.

use railbook_core::{ScheduleId, SeatId, TrainId};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::OwnedMutexGuard;

/// What a lease protects.
///
/// The derived ordering puts `Train` keys first, then `Schedule`, then `Seat`;
/// that ordering is the canonical acquisition order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LeaseKey {
    /// A train's set of schedules and seat pool
    Train(TrainId),
    /// A schedule's capacity and waitlist
    Schedule(ScheduleId),
    /// One seat of a train's pool
    Seat(SeatId),
}

impl fmt::Display for LeaseKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Train(id) => write!(f, "train:{id}"),
            Self::Schedule(id) => write!(f, "schedule:{id}"),
            Self::Seat(id) => write!(f, "seat:{id}"),
        }
    }
}

/// Errors from lease acquisition.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LeaseError {
    /// Another operation held the key for longer than the bounded wait
    #[error("Lease on {key} is busy (waited {waited:?})")]
    Busy {
        /// Key that could not be acquired
        key: LeaseKey,
        /// How long the caller waited
        waited: Duration,
    },
}

type Slot = Arc<tokio::sync::Mutex<()>>;

#[derive(Debug, Default)]
struct LeaseTable {
    slots: Mutex<HashMap<LeaseKey, Slot>>,
}

impl LeaseTable {
    fn slot(&self, key: LeaseKey) -> Slot {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(slots.entry(key).or_default())
    }

    /// Drop slots nobody is holding or waiting on.
    fn prune(&self, keys: &[LeaseKey]) {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        for key in keys {
            if slots.get(key).is_some_and(|slot| Arc::strong_count(slot) == 1) {
                slots.remove(key);
            }
        }
    }

    fn len(&self) -> usize {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

/// Hands out exclusive leases with a bounded wait.
///
/// Cheap to clone; clones share the same lease table.
#[derive(Clone, Debug)]
pub struct LeaseManager {
    table: Arc<LeaseTable>,
    timeout: Duration,
}

impl LeaseManager {
    /// Create a lease manager whose acquisitions wait at most `timeout`.
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self {
            table: Arc::new(LeaseTable::default()),
            timeout,
        }
    }

    /// The bounded wait applied to every acquisition.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Acquire every key, in canonical order, within one shared deadline.
    ///
    /// On failure, keys already taken by this call are released before returning.
    ///
    /// # Errors
    ///
    /// [`LeaseError::Busy`] if any key cannot be taken before the deadline.
    pub async fn acquire(&self, keys: &[LeaseKey]) -> Result<Lease, LeaseError> {
        let mut ordered = keys.to_vec();
        ordered.sort_unstable();
        ordered.dedup();

        let started = Instant::now();
        let deadline = tokio::time::Instant::now() + self.timeout;
        let mut guards = Vec::with_capacity(ordered.len());

        for key in &ordered {
            let slot = self.table.slot(*key);
            if let Ok(guard) = tokio::time::timeout_at(deadline, slot.lock_owned()).await {
                guards.push(guard);
            } else {
                drop(guards);
                self.table.prune(&ordered);
                crate::metrics::LeaseMetrics::record_busy();
                tracing::warn!(key = %key, waited_ms = started.elapsed().as_millis(), "Lease busy");
                return Err(LeaseError::Busy {
                    key: *key,
                    waited: started.elapsed(),
                });
            }
        }

        tracing::trace!(keys = ?ordered, "Lease acquired");
        Ok(Lease {
            keys: ordered,
            guards,
            table: Arc::clone(&self.table),
        })
    }

    /// Number of keys currently tracked (held or contended).
    #[must_use]
    pub fn tracked_keys(&self) -> usize {
        self.table.len()
    }
}

/// An acquired set of keys. Released on drop.
pub struct Lease {
    keys: Vec<LeaseKey>,
    guards: Vec<OwnedMutexGuard<()>>,
    table: Arc<LeaseTable>,
}

impl Lease {
    /// Keys held by this lease, in acquisition order.
    #[must_use]
    pub fn keys(&self) -> &[LeaseKey] {
        &self.keys
    }
}

impl fmt::Debug for Lease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lease").field("keys", &self.keys).finish()
    }
}

impl Drop for Lease {
    fn drop(&mut self) {
        // Release in reverse acquisition order, then forget idle slots.
        while self.guards.pop().is_some() {}
        self.table.prune(&self.keys);
        tracing::trace!(keys = ?self.keys, "Lease released");
    }
}
