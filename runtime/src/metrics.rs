//! Prometheus export of engine counters.
//!
//! Recorders are grouped per component:
//! - Reservation engine outcomes (confirmed, waitlisted, rejected, canceled, promoted, swept)
//! - Write-saga compensations
//! - Lease contention
//! - Retry attempts
//! - Scheduler ticks
//!
//! # Example
//!
//! ```rust,no_run
//! use railbook_runtime::metrics::MetricsServer;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut exporter = MetricsServer::new("127.0.0.1:9090".parse()?);
//! exporter.start()?;
//! // scrape http://127.0.0.1:9090/metrics
//! # Ok(())
//! # }
//! ```

use crate::scheduler::TickReport;
use metrics::{describe_counter, describe_histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

pub use metrics::{counter, histogram};

/// Errors from metrics operations.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Failed to build metrics exporter
    #[error("Failed to build metrics exporter: {0}")]
    Build(String),
    /// Failed to install metrics exporter
    #[error("Failed to install metrics exporter: {0}")]
    Install(String),
}

/// Prometheus metrics server.
///
/// Exposes metrics on an HTTP endpoint for Prometheus scraping.
pub struct MetricsServer {
    addr: SocketAddr,
    handle: Option<PrometheusHandle>,
}

impl MetricsServer {
    /// Create a new metrics server.
    ///
    /// # Arguments
    ///
    /// * `addr` - Socket address to bind to (e.g., `0.0.0.0:9090`)
    #[must_use]
    pub const fn new(addr: SocketAddr) -> Self {
        Self { addr, handle: None }
    }

    /// Install the global recorder and spawn the HTTP exporter.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns error if the exporter cannot be built.
    ///
    /// # Note
    ///
    /// If a metrics recorder is already installed (e.g., in tests), this logs a
    /// warning and returns `Ok(())` without starting a second exporter.
    pub fn start(&mut self) -> Result<(), MetricsError> {
        register_metrics();

        let (recorder, exporter) = PrometheusBuilder::new()
            .with_http_listener(self.addr)
            .set_buckets_for_metric(
                Matcher::Suffix("duration_seconds".to_string()),
                &[0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0],
            )
            .map_err(|e| MetricsError::Build(e.to_string()))?
            .build()
            .map_err(|e| MetricsError::Build(e.to_string()))?;

        let handle = recorder.handle();
        match metrics::set_global_recorder(recorder) {
            Ok(()) => {
                self.handle = Some(handle);
                tokio::spawn(async move {
                    if let Err(_e) = exporter.await {
                        // ExporterError implements neither Debug nor Display in 0.15.
                        tracing::error!("Metrics exporter stopped");
                    }
                });
                tracing::info!(
                    addr = %self.addr,
                    "Metrics server started - available at http://{}/metrics",
                    self.addr
                );
                Ok(())
            }
            Err(_) => {
                tracing::warn!("Metrics recorder already initialized, skipping re-initialization");
                Ok(())
            }
        }
    }

    /// Get the metrics handle for rendering.
    #[must_use]
    pub const fn handle(&self) -> Option<&PrometheusHandle> {
        self.handle.as_ref()
    }

    /// Render current metrics in Prometheus format.
    ///
    /// Returns `None` if this server did not install the recorder.
    #[must_use]
    pub fn render(&self) -> Option<String> {
        self.handle.as_ref().map(PrometheusHandle::render)
    }
}

/// Register all metric descriptions.
fn register_metrics() {
    describe_counter!(
        "reservations_confirmed_total",
        "Reservations confirmed at request time"
    );
    describe_counter!(
        "reservations_waitlisted_total",
        "Reservations placed on a waitlist"
    );
    describe_counter!(
        "reservations_rejected_total",
        "Reservation requests rejected, labelled by reason"
    );
    describe_counter!(
        "reservations_canceled_total",
        "Reservations canceled or removed from a waitlist"
    );
    describe_counter!(
        "reservations_promoted_total",
        "Waiting reservations promoted to confirmed"
    );
    describe_counter!(
        "reservations_swept_total",
        "Unconfirmed reservations resolved by the cutoff sweep"
    );
    describe_counter!(
        "saga_compensations_total",
        "Multi-record write sequences rolled back after a partial failure"
    );
    describe_counter!(
        "lease_busy_total",
        "Lease acquisitions that timed out"
    );
    describe_counter!("retry_attempts_total", "Total number of retry attempts");
    describe_counter!("retry_successes_total", "Total number of successful retries");
    describe_counter!(
        "retry_exhausted_total",
        "Total number of operations that exhausted their retries"
    );
    describe_counter!(
        "scheduler_items_failed_total",
        "Items that failed during a scheduler tick"
    );
    describe_histogram!(
        "scheduler_tick_duration_seconds",
        "Time taken by one scheduler tick"
    );
}

/// Reservation engine metrics recorder.
pub struct ReservationMetrics;

impl ReservationMetrics {
    /// A reservation was confirmed at request time.
    pub fn record_confirmed() {
        counter!("reservations_confirmed_total").increment(1);
    }

    /// A reservation was placed on the waitlist.
    pub fn record_waitlisted() {
        counter!("reservations_waitlisted_total").increment(1);
    }

    /// A request was rejected.
    pub fn record_rejected(reason: &'static str) {
        counter!("reservations_rejected_total", "reason" => reason).increment(1);
    }

    /// A reservation was canceled.
    pub fn record_canceled() {
        counter!("reservations_canceled_total").increment(1);
    }

    /// Waiting reservations were promoted.
    pub fn record_promoted(count: usize) {
        counter!("reservations_promoted_total").increment(count as u64);
    }

    /// Reservations were resolved by a sweep.
    pub fn record_swept(count: usize) {
        counter!("reservations_swept_total").increment(count as u64);
    }

    /// A write sequence was compensated.
    pub fn record_compensation() {
        counter!("saga_compensations_total").increment(1);
    }
}

/// Lease metrics recorder.
pub struct LeaseMetrics;

impl LeaseMetrics {
    /// A lease acquisition timed out.
    pub fn record_busy() {
        counter!("lease_busy_total").increment(1);
    }
}

/// Retry metrics recorder.
pub struct RetryMetrics;

impl RetryMetrics {
    /// Record a retry attempt.
    pub fn record_attempt() {
        counter!("retry_attempts_total").increment(1);
    }

    /// Record a successful retry.
    pub fn record_success() {
        counter!("retry_successes_total").increment(1);
    }

    /// Record exhausted retries.
    pub fn record_exhausted() {
        counter!("retry_exhausted_total").increment(1);
    }
}

/// Scheduler metrics recorder.
pub struct SchedulerMetrics;

impl SchedulerMetrics {
    /// Record one completed tick.
    pub fn record_tick(task: &'static str, report: TickReport, duration: Duration) {
        histogram!("scheduler_tick_duration_seconds", "task" => task)
            .record(duration.as_secs_f64());
        if report.failed > 0 {
            counter!("scheduler_items_failed_total", "task" => task)
                .increment(report.failed as u64);
        }
    }
}
