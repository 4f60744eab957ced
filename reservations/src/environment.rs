//! Injected dependencies of the reservation engine.

use crate::policy::BookingPolicy;
use chrono::{DateTime, Utc};
use railbook_core::InventoryStore;
use railbook_core::environment::{Clock, MonotonicStamper};
use railbook_runtime::LeaseManager;
use std::sync::Arc;
use std::time::Duration;

/// Everything the engine talks to.
///
/// Cheap to clone; clones share the store, the lease table and the stamper.
#[derive(Clone)]
pub struct ReservationEnvironment {
    /// Time source for every cutoff decision
    pub clock: Arc<dyn Clock>,
    /// Inventory records
    pub store: Arc<dyn InventoryStore>,
    /// Per-schedule and per-seat exclusive leases
    pub leases: LeaseManager,
    /// Cutoff and boarding windows
    pub policy: BookingPolicy,
    stamper: Arc<MonotonicStamper>,
}

impl ReservationEnvironment {
    /// Creates a new `ReservationEnvironment` with the default policy and a
    /// two-second lease wait.
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>, store: Arc<dyn InventoryStore>) -> Self {
        Self {
            clock,
            store,
            leases: LeaseManager::new(Duration::from_secs(2)),
            policy: BookingPolicy::default(),
            stamper: Arc::new(MonotonicStamper::new()),
        }
    }

    /// Replace the booking policy.
    #[must_use]
    pub fn with_policy(mut self, policy: BookingPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Replace the lease manager (e.g. to change the bounded wait).
    #[must_use]
    pub fn with_leases(mut self, leases: LeaseManager) -> Self {
        self.leases = leases;
        self
    }

    /// Current time.
    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Creation timestamp for a new reservation, strictly after every earlier one.
    #[must_use]
    pub fn reservation_time(&self) -> DateTime<Utc> {
        self.stamper.stamp(self.clock.as_ref())
    }
}

impl std::fmt::Debug for ReservationEnvironment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReservationEnvironment")
            .field("leases", &self.leases)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}
