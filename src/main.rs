use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use slotbook::booking::BookingCoordinator;
use slotbook::config::Config;
use slotbook::reaper;
use slotbook::store::{Catalog, LocalStore};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let config = Config::from_env();
    config.booking.validate()?;
    slotbook::observability::init(config.metrics_port);

    std::fs::create_dir_all(&config.data_dir)?;
    let catalog = match &config.catalog_path {
        Some(path) => Catalog::load(path)?,
        None => Catalog::new(),
    };
    let wal_path = config.data_dir.join("slotbook.wal");
    let store = Arc::new(LocalStore::open(&wal_path, catalog)?);
    let coordinator = Arc::new(BookingCoordinator::new(
        store.clone(),
        store.clone(),
        config.booking,
    )?);

    info!("slotbook started");
    info!("  wal: {}", wal_path.display());
    info!("  appointments: {}", store.ledger.appointment_count());
    info!(
        "  catalog: {}",
        config
            .catalog_path
            .as_ref()
            .map_or("none".to_string(), |p| p.display().to_string())
    );
    info!(
        "  holds expire after {} min, swept every {}s",
        config.booking.policy.incomplete_hold_minutes, config.sweep_interval_secs
    );
    info!(
        "  metrics: {}",
        config
            .metrics_port
            .map_or("disabled".to_string(), |p| format!("http://0.0.0.0:{p}/metrics"))
    );

    let every = Duration::from_secs(config.sweep_interval_secs.max(1));
    let sweeper = tokio::spawn(reaper::run_sweeper(coordinator.clone(), every));
    let compactor = tokio::spawn(reaper::run_compactor(
        store.clone(),
        config.compact_threshold,
        every,
    ));

    // Graceful shutdown on SIGTERM/ctrl-c
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
        tokio::select! {
            _ = ctrl_c => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
    }
    info!("shutdown signal received");

    sweeper.abort();
    compactor.abort();
    // last compaction so the next start replays a short log
    reaper::compact_if_needed(&store, 1).await;

    info!("slotbook stopped");
    Ok(())
}
