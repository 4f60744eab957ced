//! Configuration management for the reservation service.
//!
//! Loads configuration from environment variables with sensible defaults.

use crate::policy::BookingPolicy;
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

/// Longest accepted booking or boarding window: one year.
const MAX_WINDOW_MINUTES: i64 = 525_600;

const DEFAULT_TICK_SECS: u64 = 10;

fn valid_window(minutes: i64) -> bool {
    (1..=MAX_WINDOW_MINUTES).contains(&minutes)
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Booking and boarding windows
    pub booking: BookingConfig,
    /// Background maintenance loop
    pub scheduler: SchedulerConfig,
    /// Process-level settings
    pub server: ServerConfig,
}

/// Booking and boarding windows
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingConfig {
    /// Minutes before departure when booking closes (and before arrival when
    /// cancellation closes)
    pub cutoff_minutes: i64,
    /// Minutes before arrival when boarding opens
    pub boarding_window_minutes: i64,
}

/// Background maintenance loop
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Seconds between sweep/promote passes
    pub tick_secs: u64,
    /// Bounded wait for a schedule or seat lease, in milliseconds
    pub lease_timeout_ms: u64,
}

/// Process-level settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Metrics server host (for Prometheus scraping)
    pub metrics_host: String,
    /// Metrics server port
    pub metrics_port: u16,
    /// Graceful shutdown timeout in seconds
    pub shutdown_timeout: u64,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Falls back to defaults for anything unset, unparsable or out of range:
    /// window minutes must lie in `1..=525600`, tick and lease timeout must be
    /// positive.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the configuration from any key lookup, with the same fallbacks as
    /// [`from_env`](Self::from_env).
    #[must_use]
    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            booking: BookingConfig {
                cutoff_minutes: get("BOOKING_CUTOFF_MINUTES")
                    .and_then(|s| s.parse::<i64>().ok())
                    .filter(|&m| valid_window(m))
                    .unwrap_or(180),
                boarding_window_minutes: get("BOARDING_WINDOW_MINUTES")
                    .and_then(|s| s.parse::<i64>().ok())
                    .filter(|&m| valid_window(m))
                    .unwrap_or(15),
            },
            scheduler: SchedulerConfig {
                tick_secs: get("SCHEDULER_TICK_SECS")
                    .and_then(|s| s.parse::<u64>().ok())
                    .filter(|&secs| secs > 0)
                    .unwrap_or(DEFAULT_TICK_SECS),
                lease_timeout_ms: get("LEASE_TIMEOUT_MS")
                    .and_then(|s| s.parse::<u64>().ok())
                    .filter(|&ms| ms > 0)
                    .unwrap_or(2000),
            },
            server: ServerConfig {
                log_level: get("RUST_LOG").unwrap_or_else(|| "info".to_string()),
                metrics_host: get("METRICS_HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
                metrics_port: get("METRICS_PORT")
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(9090),
                shutdown_timeout: get("SHUTDOWN_TIMEOUT")
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(30),
            },
        }
    }

    /// Booking policy built from the configured windows.
    ///
    /// A window outside the accepted range (the fields are public and
    /// deserializable) falls back to the default policy's.
    #[must_use]
    pub fn policy(&self) -> BookingPolicy {
        let window = |minutes: i64| {
            if valid_window(minutes) {
                chrono::Duration::try_minutes(minutes)
            } else {
                None
            }
        };
        let defaults = BookingPolicy::default();
        BookingPolicy::new(
            window(self.booking.cutoff_minutes).unwrap_or(defaults.cutoff()),
            window(self.booking.boarding_window_minutes).unwrap_or(defaults.boarding_window()),
        )
    }

    /// Scheduler tick interval; never zero.
    #[must_use]
    pub const fn tick_interval(&self) -> Duration {
        match self.scheduler.tick_secs {
            0 => Duration::from_secs(DEFAULT_TICK_SECS),
            secs => Duration::from_secs(secs),
        }
    }

    /// Bounded lease wait.
    #[must_use]
    pub const fn lease_timeout(&self) -> Duration {
        Duration::from_millis(self.scheduler.lease_timeout_ms)
    }

    /// Graceful shutdown timeout.
    #[must_use]
    pub const fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.server.shutdown_timeout)
    }

    /// Metrics server bind address.
    #[must_use]
    pub fn metrics_address(&self) -> String {
        format!("{}:{}", self.server.metrics_host, self.server.metrics_port)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            booking: BookingConfig {
                cutoff_minutes: 180,
                boarding_window_minutes: 15,
            },
            scheduler: SchedulerConfig {
                tick_secs: DEFAULT_TICK_SECS,
                lease_timeout_ms: 2000,
            },
            server: ServerConfig {
                log_level: "info".to_string(),
                metrics_host: "0.0.0.0".to_string(),
                metrics_port: 9090,
                shutdown_timeout: 30,
            },
        }
    }
}
