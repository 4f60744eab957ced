//! Capacity ledger: the `available_seats` / `total_seats` pair of each train.
//!
//! The ledger is the single source of truth for admission. It is only moved one
//! unit at a time through the store's conditional counter updates, and always as
//! one step of a [`WriteSaga`](crate::saga::WriteSaga).

use crate::error::ReservationError;
use railbook_core::{InventoryStore, Train, TrainId};

/// View over the store's train counters.
#[derive(Clone, Copy)]
pub struct CapacityLedger<'a> {
    store: &'a dyn InventoryStore,
}

impl<'a> CapacityLedger<'a> {
    /// Ledger backed by `store`.
    #[must_use]
    pub const fn new(store: &'a dyn InventoryStore) -> Self {
        Self { store }
    }

    /// Take one unit of capacity.
    ///
    /// # Errors
    ///
    /// [`ReservationError::CapacityExhausted`] if `available_seats` is already 0,
    /// which happens when another departure of the same train took the last unit
    /// after the admission check.
    pub async fn reserve_seat(&self, train_id: TrainId) -> Result<Train, ReservationError> {
        match self.store.decrement_available_seats(train_id).await? {
            Some(train) => {
                tracing::debug!(
                    train_id = %train_id,
                    available = train.available_seats,
                    "Capacity reserved"
                );
                Ok(train)
            }
            None => {
                tracing::warn!(train_id = %train_id, "Capacity exhausted");
                Err(ReservationError::CapacityExhausted(train_id.to_string()))
            }
        }
    }

    /// Return one unit of capacity.
    ///
    /// Returns `None` when the ledger already equals `total_seats`; nothing
    /// moved in that case.
    ///
    /// # Errors
    ///
    /// Store failures.
    pub async fn release_seat(&self, train_id: TrainId) -> Result<Option<Train>, ReservationError> {
        let released = self.store.increment_available_seats(train_id).await?;
        match &released {
            Some(train) => tracing::debug!(
                train_id = %train_id,
                available = train.available_seats,
                "Capacity released"
            ),
            None => tracing::warn!(train_id = %train_id, "Capacity already at total"),
        }
        Ok(released)
    }

    /// Add one seat's worth of capacity (a seat joined the pool).
    ///
    /// # Errors
    ///
    /// Store failures.
    pub async fn grow(&self, train_id: TrainId) -> Result<Train, ReservationError> {
        let train = self.store.grow_capacity(train_id).await?;
        tracing::debug!(train_id = %train_id, total = train.total_seats, "Capacity grown");
        Ok(train)
    }

    /// Remove one unheld unit of capacity (a seat left the pool).
    ///
    /// # Errors
    ///
    /// [`ReservationError::CapacityExhausted`] if every unit is held.
    pub async fn shrink(&self, train_id: TrainId) -> Result<Train, ReservationError> {
        match self.store.shrink_capacity(train_id).await? {
            Some(train) => {
                tracing::debug!(train_id = %train_id, total = train.total_seats, "Capacity shrunk");
                Ok(train)
            }
            None => Err(ReservationError::CapacityExhausted(train_id.to_string())),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use railbook_testing::InMemoryInventoryStore;

    #[tokio::test]
    async fn reserve_until_exhausted_then_release() {
        let store = InMemoryInventoryStore::new();
        let train = Train::new("Coastal", 12, 2);
        store.put_train(train.clone());
        let ledger = CapacityLedger::new(&store);

        assert_eq!(ledger.reserve_seat(train.id).await.unwrap().available_seats, 1);
        assert_eq!(ledger.reserve_seat(train.id).await.unwrap().available_seats, 0);
        assert!(matches!(
            ledger.reserve_seat(train.id).await,
            Err(ReservationError::CapacityExhausted(_))
        ));

        let released = ledger.release_seat(train.id).await.unwrap().unwrap();
        assert_eq!(released.available_seats, 1);
        assert_eq!(store.train(train.id).unwrap().available_seats, 1);
    }

    #[tokio::test]
    async fn release_at_total_reports_no_movement() {
        let store = InMemoryInventoryStore::new();
        let train = Train::new("Coastal", 12, 2);
        store.put_train(train.clone());
        let ledger = CapacityLedger::new(&store);

        assert!(ledger.release_seat(train.id).await.unwrap().is_none());
        assert_eq!(store.train(train.id).unwrap().available_seats, 2);
    }

    #[tokio::test]
    async fn shrink_refuses_when_every_unit_is_held() {
        let store = InMemoryInventoryStore::new();
        let train = Train::new("Coastal", 12, 1);
        store.put_train(train.clone());
        let ledger = CapacityLedger::new(&store);

        assert_eq!(ledger.grow(train.id).await.unwrap().total_seats, 2);
        ledger.reserve_seat(train.id).await.unwrap();
        ledger.reserve_seat(train.id).await.unwrap();
        assert!(matches!(
            ledger.shrink(train.id).await,
            Err(ReservationError::CapacityExhausted(_))
        ));
        assert_eq!(store.train(train.id).unwrap().total_seats, 2);
    }
}
