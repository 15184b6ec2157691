//! A [`ByteRing`] shared between threads.
//!
//! Each ring has its own mutex and condition variable. Append, take, clear
//! and count on one ring are linearizable with respect to each other; nothing
//! is ever locked across both rings.

use super::ring::ByteRing;
use crate::timeout::Deadline;
use parking_lot::{Condvar, Mutex, MutexGuard};
use std::time::Duration;

/// State guarded by a [`SharedRing`]'s lock.
#[derive(Debug)]
pub struct RingState {
    pub ring: ByteRing,
    /// Set once when the session closes; every waiter must give up.
    pub closed: bool,
    /// Total bytes ever appended.
    pub enqueued_total: u64,
    /// Total bytes that have left the ring, whether taken or discarded.
    pub drained_total: u64,
    /// Bumped by every `clear`, so a taker can tell its bytes were discarded.
    pub discard_epoch: u64,
    /// Ring length recorded at the last unreported overrun.
    pub overrun: Option<usize>,
    /// Bytes taken by the drain that the port has not accepted yet. They
    /// still occupy capacity, since a stall hands them back to the ring.
    pub in_flight: usize,
}

impl RingState {
    /// Room a writer may fill without the ring exceeding its capacity once
    /// the in-flight bytes are restored.
    pub fn writable(&self) -> usize {
        self.ring.free_space().saturating_sub(self.in_flight)
    }

    /// Append bytes, keeping the sequence counters current.
    pub fn append(&mut self, bytes: &[u8]) {
        self.ring.append(bytes);
        self.enqueued_total += bytes.len() as u64;
    }

    /// Take up to `n` head bytes into `out`, keeping the counters current.
    pub fn take_extend(&mut self, n: usize, out: &mut Vec<u8>) -> usize {
        let taken = self.ring.take_extend(n, out);
        self.drained_total += taken as u64;
        taken
    }

    /// Take head bytes into `out`, keeping the counters current.
    pub fn take_into(&mut self, out: &mut [u8]) -> usize {
        let taken = self.ring.take_into(out);
        self.drained_total += taken as u64;
        taken
    }

    /// Drop `n` head bytes, keeping the counters current.
    pub fn discard_front(&mut self, n: usize) -> usize {
        let dropped = self.ring.discard_front(n);
        self.drained_total += dropped as u64;
        dropped
    }

    /// Return bytes that were taken but could not be delivered.
    pub fn restore_front(&mut self, bytes: &[u8]) {
        self.ring.restore_front(bytes);
        self.drained_total -= bytes.len() as u64;
    }

    /// Empty the ring; discarded bytes count as drained.
    pub fn clear(&mut self) -> usize {
        let dropped = self.ring.count();
        self.ring.clear();
        self.drained_total += dropped as u64;
        self.discard_epoch += 1;
        self.overrun = None;
        dropped
    }
}

/// One ring plus the lock and condition variable that serialize access to it.
#[derive(Debug)]
pub struct SharedRing {
    name: &'static str,
    state: Mutex<RingState>,
    changed: Condvar,
}

impl SharedRing {
    pub fn new(name: &'static str, capacity: usize) -> Self {
        Self {
            name,
            state: Mutex::new(RingState {
                ring: ByteRing::with_capacity(capacity),
                closed: false,
                enqueued_total: 0,
                drained_total: 0,
                discard_epoch: 0,
                overrun: None,
                in_flight: 0,
            }),
            changed: Condvar::new(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn lock(&self) -> MutexGuard<'_, RingState> {
        self.state.lock()
    }

    /// Current occupancy.
    pub fn count(&self) -> usize {
        self.state.lock().ring.count()
    }

    pub fn capacity(&self) -> usize {
        self.state.lock().ring.capacity()
    }

    /// Wait for a change, bounded by `deadline`. See [`Deadline::wait`].
    pub fn wait(&self, guard: &mut MutexGuard<'_, RingState>, deadline: &Deadline) -> bool {
        deadline.wait(&self.changed, guard)
    }

    /// Wait for a change for at most `duration`.
    pub fn wait_for(&self, guard: &mut MutexGuard<'_, RingState>, duration: Duration) {
        self.changed.wait_for(guard, duration);
    }

    /// Wake every waiter while holding the lock, so a waiter that checked its
    /// condition just before parking cannot miss the wakeup.
    pub fn notify_all(&self) {
        let _guard = self.state.lock();
        self.changed.notify_all();
    }

    /// Wake waiters from a context that already holds the lock.
    pub fn notify_locked(&self, _guard: &MutexGuard<'_, RingState>) {
        self.changed.notify_all();
    }

    /// Atomically empty the ring and wake waiters. Returns bytes dropped.
    pub fn clear(&self) -> usize {
        let mut state = self.state.lock();
        let dropped = state.clear();
        self.changed.notify_all();
        dropped
    }

    /// Mark the ring closed and wake every waiter.
    pub fn close(&self) {
        let mut state = self.state.lock();
        state.closed = true;
        self.changed.notify_all();
    }
}
