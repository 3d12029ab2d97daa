use std::collections::HashMap;
use std::io;
use std::path::Path;
use std::sync::Arc;

use chrono::NaiveDate;
use dashmap::DashMap;
use tokio::sync::{mpsc, oneshot, OwnedRwLockWriteGuard, RwLock};
use tracing::{debug, error, info, warn};

use crate::booking::{BookingError, StatusChange, Transition};
use crate::limits::MAX_APPOINTMENTS_PER_LEDGER;
use crate::model::*;
use crate::notify::NotifyHub;
use crate::observability;
use crate::wal::Wal;

pub type SharedStaffLedger = Arc<RwLock<StaffLedger>>;

type Pending = (Event, oneshot::Sender<io::Result<()>>);

// ── Group-commit WAL channel ─────────────────────────────

enum WalCommand {
    Append {
        event: Event,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

/// Owns the WAL. Appends that queue up while a flush is running are written
/// together and share one fsync.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        let mut batch = match cmd {
            WalCommand::Append { event, response } => vec![(event, response)],
            other => {
                handle_non_append(&mut wal, other);
                continue;
            }
        };
        let mut deferred = None;
        while let Ok(next) = rx.try_recv() {
            match next {
                WalCommand::Append { event, response } => batch.push((event, response)),
                other => {
                    deferred = Some(other);
                    break;
                }
            }
        }
        commit_batch(&mut wal, &mut batch);
        if let Some(cmd) = deferred {
            handle_non_append(&mut wal, cmd);
        }
    }
    debug!("WAL writer stopped");
}

fn commit_batch(wal: &mut Wal, batch: &mut Vec<Pending>) {
    metrics::histogram!(observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
    let started = std::time::Instant::now();
    let result = flush_batch(wal, batch);
    metrics::histogram!(observability::WAL_FLUSH_DURATION_SECONDS)
        .record(started.elapsed().as_secs_f64());
    respond_batch(batch, &result);
}

/// Write and fsync the batch. On failure the log is rolled back to its last
/// committed length, so records of callers told "failed" never replay.
fn flush_batch(wal: &mut Wal, batch: &[Pending]) -> io::Result<()> {
    let result = batch
        .iter()
        .try_for_each(|(event, _)| wal.append_buffered(event))
        .and_then(|()| wal.flush_sync());
    if let Err(e) = &result {
        warn!("WAL batch of {} failed: {e}", batch.len());
        if let Err(e) = wal.rollback() {
            error!("WAL rollback failed: {e}");
        }
    }
    result
}

fn respond_batch(batch: &mut Vec<Pending>, result: &io::Result<()>) {
    for (_, tx) in batch.drain(..) {
        let r = match result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(r);
    }
}

fn handle_non_append(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { events, response } => {
            let result =
                Wal::write_compact_file(wal.path(), &events).and_then(|()| wal.swap_compact_file());
            let _ = response.send(result);
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { .. } => unreachable!("appends are batched by the caller"),
    }
}

/// Apply an event to a staff ledger (caller holds the lock) and keep the
/// lookup indexes in step.
fn apply_to_ledger(
    ledger: &mut StaffLedger,
    event: &Event,
    by_id: &DashMap<AppointmentId, Option<StaffId>>,
    by_token: &DashMap<String, AppointmentId>,
) {
    match event {
        Event::AppointmentCreated { appointment } => {
            by_id.insert(appointment.id, appointment.staff_id);
            by_token.insert(appointment.cancellation_token.clone(), appointment.id);
            ledger.insert(appointment.clone());
        }
        Event::StatusChanged {
            id,
            status,
            payment_status,
            payment,
            ..
        } => {
            if let Some(appointment) = ledger.get_mut(id) {
                appointment.status = *status;
                appointment.payment_status = *payment_status;
                appointment.payment = payment.clone();
            }
        }
    }
}

/// Durable appointment ledger: one lock per staff member, every change
/// written to the WAL before it becomes visible.
pub struct Ledger {
    state: DashMap<Option<StaffId>, SharedStaffLedger>,
    wal_tx: mpsc::Sender<WalCommand>,
    pub notify: Arc<NotifyHub>,
    by_id: DashMap<AppointmentId, Option<StaffId>>,
    by_token: DashMap<String, AppointmentId>,
    /// Writers hold it shared; compaction holds it exclusively so the
    /// snapshot and the log swap see no interleaved append.
    commit_gate: RwLock<()>,
}

impl Ledger {
    /// Replay the log at `wal_path` and start the writer task.
    pub fn open(wal_path: &Path, notify: Arc<NotifyHub>) -> io::Result<Self> {
        let events = Wal::replay(wal_path)?;
        let wal = Wal::open(wal_path)?;

        let by_id = DashMap::new();
        let by_token = DashMap::new();
        let mut ledgers: HashMap<Option<StaffId>, StaffLedger> = HashMap::new();
        for event in &events {
            let staff_id = event.staff_id();
            let ledger = ledgers
                .entry(staff_id)
                .or_insert_with(|| StaffLedger::new(staff_id));
            apply_to_ledger(ledger, event, &by_id, &by_token);
        }
        if !events.is_empty() {
            info!(
                "replayed {} events ({} appointments) from {}",
                events.len(),
                by_id.len(),
                wal_path.display()
            );
        }

        let state = DashMap::new();
        for (staff_id, ledger) in ledgers {
            state.insert(staff_id, Arc::new(RwLock::new(ledger)));
        }

        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        Ok(Self {
            state,
            wal_tx,
            notify,
            by_id,
            by_token,
            commit_gate: RwLock::new(()),
        })
    }

    async fn wal_append(&self, event: &Event) -> Result<(), BookingError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append {
                event: event.clone(),
                response: tx,
            })
            .await
            .map_err(|_| BookingError::PersistenceError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| BookingError::PersistenceError("WAL writer dropped response".into()))?
            .map_err(BookingError::from)
    }

    fn existing_ledger(&self, staff_id: Option<StaffId>) -> Option<SharedStaffLedger> {
        self.state.get(&staff_id).map(|e| e.value().clone())
    }

    fn ledger_for(&self, staff_id: Option<StaffId>) -> SharedStaffLedger {
        self.state
            .entry(staff_id)
            .or_insert_with(|| Arc::new(RwLock::new(StaffLedger::new(staff_id))))
            .value()
            .clone()
    }

    /// WAL append, then apply, then notify.
    async fn persist_and_apply(&self, ledger: &mut StaffLedger, event: &Event) -> Result<(), BookingError> {
        self.wal_append(event).await?;
        apply_to_ledger(ledger, event, &self.by_id, &self.by_token);
        self.notify.send(event);
        Ok(())
    }

    /// Look up the owning ledger of an appointment and lock it for writing.
    async fn resolve_write(
        &self,
        id: AppointmentId,
    ) -> Result<(Option<StaffId>, OwnedRwLockWriteGuard<StaffLedger>), BookingError> {
        let staff_id = self
            .by_id
            .get(&id)
            .map(|e| *e.value())
            .ok_or_else(|| BookingError::NotFound(format!("appointment {id}")))?;
        let ledger = self
            .existing_ledger(staff_id)
            .ok_or_else(|| BookingError::NotFound(format!("appointment {id}")))?;
        Ok((staff_id, ledger.write_owned().await))
    }

    /// Insert unless an occupying appointment of the same staff member
    /// overlaps. Check and write happen under one ledger lock.
    pub async fn insert_if_free(&self, appointment: Appointment) -> Result<Appointment, BookingError> {
        let _gate = self.commit_gate.read().await;
        let ledger = self.ledger_for(appointment.staff_id);
        let mut guard = ledger.write().await;
        if guard.appointments.len() >= MAX_APPOINTMENTS_PER_LEDGER {
            return Err(BookingError::LimitExceeded("too many appointments for one staff member"));
        }
        if appointment.staff_id.is_some()
            && let Some(existing) = guard.first_conflict(&appointment.span)
        {
            return Err(BookingError::Conflict(existing.id));
        }
        let event = Event::AppointmentCreated {
            appointment: appointment.clone(),
        };
        self.persist_and_apply(&mut guard, &event).await?;
        Ok(appointment)
    }

    /// Apply `change` if the stored status is one of `from`. A `None`
    /// payment keeps the stored payment link.
    pub async fn transition(
        &self,
        id: AppointmentId,
        from: &[AppointmentStatus],
        change: StatusChange,
    ) -> Result<Transition, BookingError> {
        let _gate = self.commit_gate.read().await;
        let (staff_id, mut guard) = self.resolve_write(id).await?;
        let current = guard
            .get(&id)
            .cloned()
            .ok_or_else(|| BookingError::NotFound(format!("appointment {id}")))?;
        if !from.contains(&current.status) {
            return Ok(Transition::Rejected(current));
        }
        let event = Event::StatusChanged {
            id,
            staff_id,
            status: change.status,
            payment_status: change.payment_status,
            payment: change.payment.or(current.payment),
        };
        self.persist_and_apply(&mut guard, &event).await?;
        guard
            .get(&id)
            .cloned()
            .map(Transition::Applied)
            .ok_or_else(|| BookingError::NotFound(format!("appointment {id}")))
    }

    pub async fn get(&self, id: AppointmentId) -> Option<Appointment> {
        let staff_id = *self.by_id.get(&id)?.value();
        let ledger = self.existing_ledger(staff_id)?;
        let guard = ledger.read().await;
        guard.get(&id).cloned()
    }

    pub async fn find_by_token(&self, token: &str) -> Option<Appointment> {
        let id = *self.by_token.get(token)?.value();
        self.get(id).await
    }

    /// Spans of appointments occupying time on `date`.
    pub async fn booked_intervals(&self, staff_id: Option<StaffId>, date: NaiveDate) -> Vec<Span> {
        let Some(ledger) = self.existing_ledger(staff_id) else {
            return Vec::new();
        };
        let guard = ledger.read().await;
        guard
            .overlapping(&Span::day(date))
            .filter(|a| a.status.occupies())
            .map(|a| a.span)
            .collect()
    }

    /// Every appointment of a staff member overlapping `window`, any status.
    pub async fn appointments_for(&self, staff_id: Option<StaffId>, window: Span) -> Vec<Appointment> {
        let Some(ledger) = self.existing_ledger(staff_id) else {
            return Vec::new();
        };
        let guard = ledger.read().await;
        guard.overlapping(&window).cloned().collect()
    }

    pub async fn incomplete_holds(&self) -> Vec<Appointment> {
        let ledgers: Vec<SharedStaffLedger> = self.state.iter().map(|e| e.value().clone()).collect();
        let mut holds = Vec::new();
        for ledger in ledgers {
            let guard = ledger.read().await;
            holds.extend(
                guard
                    .appointments
                    .iter()
                    .filter(|a| a.status == AppointmentStatus::Incomplete)
                    .cloned(),
            );
        }
        holds
    }

    pub fn appointment_count(&self) -> usize {
        self.by_id.len()
    }

    /// Rewrite the log as one `AppointmentCreated` per appointment in its
    /// current state.
    pub async fn compact_wal(&self) -> Result<(), BookingError> {
        let _gate = self.commit_gate.write().await;
        let ledgers: Vec<SharedStaffLedger> = self.state.iter().map(|e| e.value().clone()).collect();
        let mut events = Vec::with_capacity(self.by_id.len());
        for ledger in ledgers {
            let guard = ledger.read().await;
            events.extend(guard.appointments.iter().map(|a| Event::AppointmentCreated {
                appointment: a.clone(),
            }));
        }
        let count = events.len();

        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact { events, response: tx })
            .await
            .map_err(|_| BookingError::PersistenceError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| BookingError::PersistenceError("WAL writer dropped response".into()))??;
        info!("compacted WAL to {count} events");
        Ok(())
    }

    pub async fn wal_appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}
