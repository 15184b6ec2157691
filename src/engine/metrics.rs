//! Transfer counters.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Live counters, updated lock-free from every activity of an engine.
#[derive(Debug, Default)]
pub struct MetricsCounters {
    pub bytes_enqueued: AtomicU64,
    pub bytes_sent: AtomicU64,
    pub bytes_received: AtomicU64,
    pub control_bytes_filtered: AtomicU64,
    pub bytes_discarded_out: AtomicU64,
    pub bytes_discarded_in: AtomicU64,
    pub overruns: AtomicU64,
    pub read_timeouts: AtomicU64,
    pub write_timeouts: AtomicU64,
    pub send_failures: AtomicU64,
}

impl MetricsCounters {
    pub fn add(counter: &AtomicU64, n: usize) {
        counter.fetch_add(n as u64, Ordering::Relaxed);
    }

    pub fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self, open_for: Duration) -> EngineMetrics {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        EngineMetrics {
            bytes_enqueued: load(&self.bytes_enqueued),
            bytes_sent: load(&self.bytes_sent),
            bytes_received: load(&self.bytes_received),
            control_bytes_filtered: load(&self.control_bytes_filtered),
            bytes_discarded_out: load(&self.bytes_discarded_out),
            bytes_discarded_in: load(&self.bytes_discarded_in),
            overruns: load(&self.overruns),
            read_timeouts: load(&self.read_timeouts),
            write_timeouts: load(&self.write_timeouts),
            send_failures: load(&self.send_failures),
            open_duration_ms: u64::try_from(open_for.as_millis()).unwrap_or(u64::MAX),
        }
    }
}

/// Point-in-time copy of an engine's counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineMetrics {
    pub bytes_enqueued: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub control_bytes_filtered: u64,
    pub bytes_discarded_out: u64,
    pub bytes_discarded_in: u64,
    pub overruns: u64,
    pub read_timeouts: u64,
    pub write_timeouts: u64,
    pub send_failures: u64,
    pub open_duration_ms: u64,
}
