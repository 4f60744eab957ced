//! # Railbook Runtime
//!
//! Runtime plumbing shared by the reservation engine and its drivers.
//!
//! ## Core Components
//!
//! - **Leases**: exclusive, bounded-wait locks keyed by schedule or seat id
//! - **Retry**: exponential backoff for contention (`Busy`) outcomes
//! - **Scheduler**: a fixed-interval driver for periodic maintenance with graceful shutdown
//! - **Metrics**: Prometheus exporter and metric descriptions
//!
//! ## Example
//!
//! ```
//! use railbook_core::ScheduleId;
//! use railbook_runtime::lease::{LeaseKey, LeaseManager};
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), railbook_runtime::lease::LeaseError> {
//! let leases = LeaseManager::new(Duration::from_millis(500));
//! let schedule_id = ScheduleId::new();
//!
//! let lease = leases.acquire(&[LeaseKey::Schedule(schedule_id)]).await?;
//! // read-decide-write under the lease ...
//! drop(lease);
//! # Ok(())
//! # }
//! ```

/// Exclusive leases keyed by schedule and seat
pub mod lease;

/// Retry logic with exponential backoff
pub mod retry;

/// Fixed-interval driver for periodic tasks
pub mod scheduler;

/// Prometheus metrics for observability
pub mod metrics;

pub use lease::{Lease, LeaseError, LeaseKey, LeaseManager};
pub use retry::RetryPolicy;
pub use scheduler::{PeriodicTask, Scheduler, SchedulerHandle, TickReport};
