use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use ulid::Ulid;

use slotbook::booking::BookingCoordinator;
use slotbook::config::BookingConfig;
use slotbook::model::*;
use slotbook::store::{Catalog, LocalStore};

type Coordinator = BookingCoordinator<LocalStore, LocalStore>;

const SERVICE: ServiceId = 1;
const STAFF: u64 = 20;
/// 08:00–20:00 in 30-minute slots.
const SLOTS_PER_DAY: usize = 24;

fn percentile(sorted: &[Duration], p: f64) -> Duration {
    if sorted.is_empty() {
        return Duration::ZERO;
    }
    let idx = ((sorted.len() as f64) * p / 100.0) as usize;
    sorted[idx.min(sorted.len() - 1)]
}

fn print_latency(label: &str, latencies: &mut [Duration]) {
    if latencies.is_empty() {
        println!("  {label}: no samples");
        return;
    }
    latencies.sort();
    let total: Duration = latencies.iter().sum();
    let avg = total / latencies.len() as u32;
    println!("  {label}:");
    println!(
        "    n={}, avg={:.2}ms, p50={:.2}ms, p95={:.2}ms, p99={:.2}ms, max={:.2}ms",
        latencies.len(),
        avg.as_secs_f64() * 1000.0,
        percentile(latencies, 50.0).as_secs_f64() * 1000.0,
        percentile(latencies, 95.0).as_secs_f64() * 1000.0,
        percentile(latencies, 99.0).as_secs_f64() * 1000.0,
        latencies[latencies.len() - 1].as_secs_f64() * 1000.0,
    );
}

fn first_day() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 3, 2).unwrap()
}

fn now() -> NaiveDateTime {
    first_day().and_time(NaiveTime::MIN)
}

/// Start time of the `i`-th consecutive slot from the first day on.
fn nth_slot(i: usize) -> NaiveDateTime {
    let day = first_day() + chrono::Duration::days((i / SLOTS_PER_DAY) as i64);
    let minutes = 8 * 60 + 30 * (i % SLOTS_PER_DAY) as u32;
    day.and_time(NaiveTime::from_hms_opt(minutes / 60, minutes % 60, 0).unwrap_or(NaiveTime::MIN))
}

fn catalog() -> Catalog {
    let c = Catalog::new();
    c.upsert_service(Service {
        id: SERVICE,
        name: Some("bench".into()),
        duration_minutes: Some(30),
        price_cents: 0,
    })
    .unwrap();
    let hours = TimeRange::new(
        NaiveTime::from_hms_opt(8, 0, 0).unwrap(),
        NaiveTime::from_hms_opt(20, 0, 0).unwrap(),
    );
    for id in 0..STAFF {
        c.upsert_staff(StaffMember { id, name: None, status: StaffStatus::Active });
        c.assign_service(StaffService { staff_id: id, service_id: SERVICE, duration_minutes: None })
            .unwrap();
        for day in 0..7 {
            let entry = ScheduleEntry { staff_id: id, day_of_week: day, hours, breaks: Vec::new() };
            c.set_schedule(id, day, vec![entry]).unwrap();
        }
    }
    c
}

fn open(name: &str) -> (Arc<LocalStore>, Arc<Coordinator>) {
    let dir = std::env::temp_dir().join(format!("slotbook_bench_{}", Ulid::new()));
    std::fs::create_dir_all(&dir).unwrap();
    let path: PathBuf = dir.join(format!("{name}.wal"));
    let store = Arc::new(LocalStore::open(&path, catalog()).unwrap());
    let config = BookingConfig {
        slot_granularity_minutes: 30,
        ..BookingConfig::default()
    };
    let coordinator = Arc::new(BookingCoordinator::new(store.clone(), store.clone(), config).unwrap());
    (store, coordinator)
}

fn customer() -> CustomerInfo {
    CustomerInfo {
        name: "bench".into(),
        email: "bench@example.com".into(),
        phone: None,
        notes: None,
    }
}

async fn phase1_sequential() {
    let (_, coordinator) = open("sequential");
    let n = 2000;
    let mut latencies = Vec::with_capacity(n);
    let start = Instant::now();

    for i in 0..n {
        let t = Instant::now();
        coordinator
            .reserve_slot(SERVICE, Some(0), nth_slot(i), customer(), now())
            .await
            .unwrap();
        latencies.push(t.elapsed());
    }

    let elapsed = start.elapsed();
    let ops = n as f64 / elapsed.as_secs_f64();
    println!("  {n} reservations in {:.2}s = {ops:.0} ops/sec", elapsed.as_secs_f64());
    print_latency("reserve latency", &mut latencies);
}

async fn phase2_concurrent() {
    let (_, coordinator) = open("concurrent");
    let n_per_task = 500;
    let start = Instant::now();

    let mut handles = Vec::new();
    for staff in 0..STAFF {
        let coordinator = coordinator.clone();
        handles.push(tokio::spawn(async move {
            for i in 0..n_per_task {
                coordinator
                    .reserve_slot(SERVICE, Some(staff), nth_slot(i), customer(), now())
                    .await
                    .unwrap();
            }
        }));
    }
    for h in handles {
        h.await.unwrap();
    }

    let elapsed = start.elapsed();
    let total = STAFF as usize * n_per_task;
    let ops = total as f64 / elapsed.as_secs_f64();
    println!(
        "  {STAFF} staff x {n_per_task} reservations = {total} total in {:.2}s = {ops:.0} ops/sec",
        elapsed.as_secs_f64()
    );
}

async fn phase3_query_under_load() {
    let (_, coordinator) = open("query_under_load");

    // pre-fill so slot generation has bookings to subtract
    for i in (0..SLOTS_PER_DAY * 14).step_by(3) {
        for staff in 0..STAFF {
            coordinator
                .reserve_slot(SERVICE, Some(staff), nth_slot(i), customer(), now())
                .await
                .unwrap();
        }
    }

    let stop = Arc::new(AtomicBool::new(false));
    let mut writers = Vec::new();
    for staff in 0..5 {
        let coordinator = coordinator.clone();
        let stop = stop.clone();
        writers.push(tokio::spawn(async move {
            let mut i = SLOTS_PER_DAY * 30;
            while !stop.load(Ordering::Relaxed) {
                let _ = coordinator
                    .reserve_slot(SERVICE, Some(staff), nth_slot(i), customer(), now())
                    .await;
                i += 1;
            }
        }));
    }

    let n_readers = 10;
    let reads_per_reader = 200;
    let mut readers = Vec::new();
    for r in 0..n_readers {
        let coordinator = coordinator.clone();
        readers.push(tokio::spawn(async move {
            let mut latencies = Vec::with_capacity(reads_per_reader);
            for i in 0..reads_per_reader {
                let date = first_day() + chrono::Duration::days(((r + i) % 14) as i64);
                let t = Instant::now();
                let slots = coordinator.generate_slots(SERVICE, None, date, now()).await.unwrap();
                latencies.push(t.elapsed());
                std::hint::black_box(slots);
            }
            latencies
        }));
    }

    let mut all = Vec::new();
    for h in readers {
        all.extend(h.await.unwrap());
    }
    stop.store(true, Ordering::Relaxed);
    for h in writers {
        let _ = h.await;
    }
    print_latency("any-staff slot query latency", &mut all);
}

async fn phase4_contention() {
    let (store, coordinator) = open("contention");
    let contenders = 500;
    let won = Arc::new(AtomicUsize::new(0));
    let lost = Arc::new(AtomicUsize::new(0));
    let start = Instant::now();

    let mut handles = Vec::new();
    for _ in 0..contenders {
        let coordinator = coordinator.clone();
        let won = won.clone();
        let lost = lost.clone();
        handles.push(tokio::spawn(async move {
            match coordinator
                .reserve_slot(SERVICE, None, nth_slot(0), customer(), now())
                .await
            {
                Ok(_) => won.fetch_add(1, Ordering::Relaxed),
                Err(_) => lost.fetch_add(1, Ordering::Relaxed),
            };
        }));
    }
    for h in handles {
        let _ = h.await;
    }

    let elapsed = start.elapsed();
    println!(
        "  {contenders} customers racing for {STAFF} seats: {} won, {} lost in {:.2}s ({} stored)",
        won.load(Ordering::Relaxed),
        lost.load(Ordering::Relaxed),
        elapsed.as_secs_f64(),
        store.ledger.appointment_count(),
    );
}

#[tokio::main]
async fn main() {
    println!("=== slotbook stress benchmark ===\n");

    println!("[phase 1] sequential reservation throughput");
    phase1_sequential().await;

    println!("\n[phase 2] concurrent reservation throughput");
    phase2_concurrent().await;

    println!("\n[phase 3] slot query latency under write load");
    phase3_query_under_load().await;

    println!("\n[phase 4] single-slot contention");
    phase4_contention().await;

    println!("\n=== benchmark complete ===");
}
