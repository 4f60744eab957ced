//! Reservation service.
//!
//! Runs the reservation engine over an in-memory inventory seeded with a demo
//! train, drives the periodic sweep/promote loop, and exposes Prometheus metrics.

use anyhow::Context;
use chrono::Duration;
use railbook_core::Role;
use railbook_core::environment::{Clock, SystemClock};
use railbook_runtime::metrics::MetricsServer;
use railbook_runtime::{LeaseManager, Scheduler};
use railbook_testing::InMemoryInventoryStore;
use reservations::{
    Actor, Config, MaintenanceTask, NewTrain, ReservationEngine, ReservationEnvironment,
};
use std::sync::Arc;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // .env is optional
    let _ = dotenvy::dotenv();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "reservations=info,railbook_runtime=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting reservation service");

    // Load configuration
    let config = Config::from_env();
    info!(config = %serde_json::to_string(&config)?, "Configuration loaded");

    // Metrics
    let mut metrics = MetricsServer::new(
        config
            .metrics_address()
            .parse()
            .context("invalid METRICS_HOST/METRICS_PORT")?,
    );
    metrics.start()?;

    // Engine
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let store = InMemoryInventoryStore::new();
    let env = ReservationEnvironment::new(Arc::clone(&clock), Arc::new(store))
        .with_policy(config.policy())
        .with_leases(LeaseManager::new(config.lease_timeout()));
    let engine = ReservationEngine::new(env);

    seed_demo(&engine, clock.as_ref()).await?;

    // Background maintenance
    let scheduler = Scheduler::new(config.tick_interval());
    let handle = scheduler.spawn(Arc::new(MaintenanceTask::new(engine.clone())));
    info!(
        tick_secs = config.scheduler.tick_secs,
        "Maintenance loop running, press Ctrl+C to stop"
    );

    shutdown_signal().await;

    info!("Shutting down");
    if let Err(e) = handle.shutdown(config.shutdown_timeout()).await {
        warn!(error = %e, "Maintenance loop did not stop cleanly");
    }
    info!("Reservation service stopped");
    Ok(())
}

/// Seed one train with two departures so the loop has something to maintain.
async fn seed_demo(engine: &ReservationEngine, clock: &dyn Clock) -> anyhow::Result<()> {
    let admin = engine
        .register_passenger("admin", "admin@railbook.local", "!", Role::Admin)
        .await?;
    let actor = Actor::from(&admin);

    let (train, seats) = engine
        .add_train(
            &actor,
            NewTrain {
                name: "Northern Express".to_string(),
                number: 101,
                total_seats: 12,
                compartments: vec!["A".to_string(), "B".to_string(), "C".to_string()],
            },
        )
        .await?;

    let tomorrow = clock.now() + Duration::days(1);
    for departure in [tomorrow, tomorrow + Duration::hours(12)] {
        engine
            .add_schedule(&actor, train.id, departure, departure + Duration::hours(5))
            .await?;
    }

    info!(
        train_id = %train.id,
        seats = seats.len(),
        "Demo inventory seeded"
    );
    Ok(())
}

async fn shutdown_signal() {
    match signal::ctrl_c().await {
        Ok(()) => info!("Received Ctrl+C signal"),
        Err(e) => warn!(error = %e, "Failed to listen for Ctrl+C; shutting down"),
    }
}
