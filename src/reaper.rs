use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::booking::{AppointmentStore, AvailabilityRepository, BookingCoordinator};
use crate::observability;
use crate::store::LocalStore;

/// Current wall-clock business time.
pub fn local_now() -> chrono::NaiveDateTime {
    chrono::Local::now().naive_local()
}

/// Background task that periodically cancels expired incomplete holds.
pub async fn run_sweeper<R, S>(coordinator: Arc<BookingCoordinator<R, S>>, every: Duration)
where
    R: AvailabilityRepository,
    S: AppointmentStore,
{
    let mut interval = tokio::time::interval(every);
    loop {
        interval.tick().await;
        match coordinator.sweep_expired_holds(local_now()).await {
            Ok(0) => debug!("sweep: no expired holds"),
            Ok(n) => debug!("sweep: cancelled {n} holds"),
            Err(e) => warn!("sweep failed: {e}"),
        }
    }
}

/// Compact the WAL once `threshold` appends have accumulated. Returns
/// whether a compaction ran.
pub async fn compact_if_needed(store: &LocalStore, threshold: u64) -> bool {
    let appends = store.ledger.wal_appends_since_compact().await;
    metrics::gauge!(observability::APPOINTMENTS_STORED).set(store.ledger.appointment_count() as f64);
    if threshold == 0 || appends < threshold {
        return false;
    }
    match store.ledger.compact_wal().await {
        Ok(()) => {
            info!("compacted WAL after {appends} appends");
            metrics::counter!(observability::WAL_COMPACTIONS_TOTAL).increment(1);
            true
        }
        Err(e) => {
            warn!("WAL compaction failed: {e}");
            false
        }
    }
}

/// Background task that checks the compaction threshold every `every`.
pub async fn run_compactor(store: Arc<LocalStore>, threshold: u64, every: Duration) {
    let mut interval = tokio::time::interval(every);
    loop {
        interval.tick().await;
        compact_if_needed(&store, threshold).await;
    }
}
