use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;

/// Monotonic event counter, relaxed ordering throughout.
#[derive(Debug, Default)]
pub struct Counter {
    value: AtomicU64,
}

impl Counter {
    pub fn new() -> Self {
        Self {
            value: AtomicU64::new(0),
        }
    }

    pub fn increment(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add(&self, value: u64) {
        self.value.fetch_add(value, Ordering::Relaxed);
    }

    pub fn value(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

/// Last-write-wins level indicator, for table sizes.
#[derive(Debug, Default)]
pub struct Gauge {
    value: AtomicU64,
}

impl Gauge {
    pub fn new() -> Self {
        Self {
            value: AtomicU64::new(0),
        }
    }

    pub fn set(&self, value: u64) {
        self.value.store(value, Ordering::Relaxed);
    }

    pub fn value(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

/// Packet counters of one worker's pipelines.
#[derive(Debug, Default)]
pub struct ForwarderCounters {
    pub n_in_interests: Counter,
    pub n_out_interests: Counter,
    pub n_in_data: Counter,
    pub n_out_data: Counter,
    pub n_in_nacks: Counter,
    pub n_out_nacks: Counter,
    pub n_satisfied: Counter,
    pub n_unsatisfied: Counter,
    pub n_cs_hits: Counter,
    pub n_cs_misses: Counter,
    pub n_duplicates: Counter,
    pub n_unsolicited: Counter,
    pub n_dispatch_dropped: Counter,
}

/// Table sizes of one worker, refreshed by its loop.
#[derive(Debug, Default)]
pub struct TableGauges {
    pub n_name_tree: Gauge,
    pub n_fib: Gauge,
    pub n_pit: Gauge,
    pub n_measurements: Gauge,
    pub n_cs: Gauge,
}

/// Everything a worker shares with the status plane. The worker writes,
/// the collector reads; no locks anywhere.
#[derive(Debug, Default)]
pub struct WorkerTelemetry {
    pub counters: ForwarderCounters,
    pub gauges: TableGauges,
    /// Set when the worker loop has exited; the dispatcher drops traffic
    /// destined to a dead shard.
    pub dead: AtomicBool,
}

impl WorkerTelemetry {
    pub fn is_dead(&self) -> bool {
        self.dead.load(Ordering::Relaxed)
    }

    pub fn mark_dead(&self) {
        self.dead.store(true, Ordering::Relaxed);
    }
}

/// Point-in-time aggregate over all workers, serializable for the
/// management plane.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct StatusSnapshot {
    pub version: String,
    pub start_ts: u64,
    pub now_ts: u64,
    pub n_name_tree: u64,
    pub n_fib: u64,
    pub n_pit: u64,
    pub n_measurements: u64,
    pub n_cs: u64,
    pub n_in_interests: u64,
    pub n_out_interests: u64,
    pub n_in_data: u64,
    pub n_out_data: u64,
    pub n_in_nacks: u64,
    pub n_out_nacks: u64,
    pub n_satisfied: u64,
    pub n_unsatisfied: u64,
    pub n_cs_hits: u64,
    pub n_cs_misses: u64,
    pub n_duplicates: u64,
    pub n_dispatch_dropped: u64,
}

/// Pull API over every worker's telemetry.
pub struct StatusCollector {
    start: SystemTime,
    workers: Vec<Arc<WorkerTelemetry>>,
}

impl StatusCollector {
    pub fn new(workers: Vec<Arc<WorkerTelemetry>>) -> Self {
        Self {
            start: SystemTime::now(),
            workers,
        }
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        fn ms(t: SystemTime) -> u64 {
            t.duration_since(UNIX_EPOCH)
                .map(|d| d.as_millis() as u64)
                .unwrap_or(0)
        }
        let mut snapshot = StatusSnapshot {
            version: env!("CARGO_PKG_VERSION").to_string(),
            start_ts: ms(self.start),
            now_ts: ms(SystemTime::now()),
            n_name_tree: 0,
            n_fib: 0,
            n_pit: 0,
            n_measurements: 0,
            n_cs: 0,
            n_in_interests: 0,
            n_out_interests: 0,
            n_in_data: 0,
            n_out_data: 0,
            n_in_nacks: 0,
            n_out_nacks: 0,
            n_satisfied: 0,
            n_unsatisfied: 0,
            n_cs_hits: 0,
            n_cs_misses: 0,
            n_duplicates: 0,
            n_dispatch_dropped: 0,
        };
        for worker in &self.workers {
            let c = &worker.counters;
            let g = &worker.gauges;
            snapshot.n_name_tree += g.n_name_tree.value();
            snapshot.n_fib += g.n_fib.value();
            snapshot.n_pit += g.n_pit.value();
            snapshot.n_measurements += g.n_measurements.value();
            snapshot.n_cs += g.n_cs.value();
            snapshot.n_in_interests += c.n_in_interests.value();
            snapshot.n_out_interests += c.n_out_interests.value();
            snapshot.n_in_data += c.n_in_data.value();
            snapshot.n_out_data += c.n_out_data.value();
            snapshot.n_in_nacks += c.n_in_nacks.value();
            snapshot.n_out_nacks += c.n_out_nacks.value();
            snapshot.n_satisfied += c.n_satisfied.value();
            snapshot.n_unsatisfied += c.n_unsatisfied.value();
            snapshot.n_cs_hits += c.n_cs_hits.value();
            snapshot.n_cs_misses += c.n_cs_misses.value();
            snapshot.n_duplicates += c.n_duplicates.value();
            snapshot.n_dispatch_dropped += c.n_dispatch_dropped.value();
        }
        snapshot
    }
}
