//! The transmit drain activity.
//!
//! One thread per open engine moves bytes from the head of the transmit ring
//! to the port while the flow-control gate is clear. Callers only ever
//! enqueue; a stalled line therefore never blocks a caller that still has
//! room to enqueue.

use super::metrics::MetricsCounters;
use super::EngineShared;
use crate::timeout::Deadline;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, trace, warn};

/// Most bytes handed to the port in one send.
pub const DRAIN_CHUNK: usize = 64;

/// Pause after the port accepted nothing.
const ZERO_SEND_PAUSE: Duration = Duration::from_millis(1);

/// Pause after a failed send before retrying.
const SEND_RETRY_BACKOFF: Duration = Duration::from_millis(10);

pub(super) fn run(shared: Arc<EngineShared>) {
    let mut chunk = Vec::with_capacity(DRAIN_CHUNK);
    let mut failing = false;

    'drain: loop {
        let epoch = {
            let mut tx = shared.tx.lock();
            loop {
                if tx.closed {
                    break 'drain;
                }
                if !tx.ring.is_empty() && shared.gate.can_drain() {
                    break;
                }
                shared.tx.wait(&mut tx, &Deadline::never());
            }
            chunk.clear();
            tx.in_flight = tx.take_extend(DRAIN_CHUNK, &mut chunk);
            shared.tx.notify_locked(&tx);
            tx.discard_epoch
        };

        let mut offset = 0;
        while offset < chunk.len() {
            if !shared.gate.can_drain() {
                // Stalled mid-chunk; hand the rest back.
                let mut tx = shared.tx.lock();
                if tx.discard_epoch == epoch {
                    tx.restore_front(&chunk[offset..]);
                }
                tx.in_flight = 0;
                shared.tx.notify_locked(&tx);
                continue 'drain;
            }

            match shared.port.send_raw(&chunk[offset..]) {
                Ok(0) => thread::sleep(ZERO_SEND_PAUSE),
                Ok(n) => {
                    if failing {
                        debug!(port = %shared.name, "send recovered");
                        failing = false;
                    }
                    offset += n;
                    {
                        let mut tx = shared.tx.lock();
                        tx.in_flight = tx.in_flight.saturating_sub(n);
                        shared.tx.notify_locked(&tx);
                    }
                    MetricsCounters::add(&shared.metrics.bytes_sent, n);
                    trace!(port = %shared.name, sent = n, "drained");
                }
                Err(e) => {
                    MetricsCounters::bump(&shared.metrics.send_failures);
                    if !shared.port.is_open() {
                        warn!(port = %shared.name, error = %e, "port closed underneath the engine");
                        shared.mark_lost();
                        break 'drain;
                    }
                    if failing {
                        debug!(port = %shared.name, error = %e, "send still failing");
                    } else {
                        warn!(port = %shared.name, error = %e, "send failed, retrying");
                        failing = true;
                    }

                    let mut tx = shared.tx.lock();
                    if tx.closed {
                        break 'drain;
                    }
                    if tx.discard_epoch == epoch {
                        tx.restore_front(&chunk[offset..]);
                    }
                    tx.in_flight = 0;
                    shared.tx.notify_locked(&tx);
                    shared.tx.wait_for(&mut tx, SEND_RETRY_BACKOFF);
                    continue 'drain;
                }
            }
        }
    }

    debug!(port = %shared.name, "drain stopped");
}
