//! The transfer engine.
//!
//! A [`TransferEngine`] is one open session over a [`PortSession`]. It owns a
//! transmit and a receive [`SharedRing`], consults the [`FlowControlGate`]
//! before anything leaves the transmit ring, and runs every blocking call
//! against a [`Deadline`](crate::timeout::Deadline).
//!
//! Three activities touch an open engine:
//!
//! * callers, who enqueue into the transmit ring and dequeue from the receive
//!   ring;
//! * the port's receive activity, which delivers inbound bytes and line
//!   changes through callbacks;
//! * the drain thread (see [`drain`]), which moves transmit bytes onto the
//!   wire while the gate is clear.
//!
//! Lock order is `writer_turn`, then a ring, then the gate. Gate transitions
//! that unblock the transmit path release the gate before waking the drain.

mod drain;
pub mod metrics;
pub mod pending;

pub use drain::DRAIN_CHUNK;
pub use metrics::EngineMetrics;
pub use pending::PendingOperation;

use crate::buffer::{RingState, SharedRing};
use crate::encoding::EncodingAdapter;
use crate::error::{Operation, TransferError, TransferResult};
use crate::flow::{FlowControlGate, GateState, Handshake};
use crate::port::{PortError, PortSession, Signal};
use crate::state::{LineSettings, SessionState, WriteCompletion};
use crate::timeout::Timeout;
use metrics::MetricsCounters;
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;
use tracing::{debug, info, warn};

/// State shared between callers, the port callbacks and the drain thread.
pub(crate) struct EngineShared {
    name: String,
    port: Arc<dyn PortSession>,
    open: AtomicBool,
    tx: SharedRing,
    rx: SharedRing,
    gate: FlowControlGate,
    encoding: RwLock<EncodingAdapter>,
    completion: RwLock<WriteCompletion>,
    /// Held while one Write enqueues, so its bytes stay contiguous.
    writer_turn: Mutex<()>,
    metrics: MetricsCounters,
    opened_at: Instant,
}

impl EngineShared {
    fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    /// Inbound bytes from the port.
    fn on_received(&self, bytes: &[u8]) {
        if !self.is_open() {
            return;
        }
        let mut data = Vec::with_capacity(bytes.len());
        let filtered = self.gate.filter_inbound(bytes, &mut data);
        if filtered.control_bytes > 0 {
            MetricsCounters::add(&self.metrics.control_bytes_filtered, filtered.control_bytes);
        }
        if filtered.cleared {
            self.tx.notify_all();
        }
        if data.is_empty() {
            return;
        }

        let mut rx = self.rx.lock();
        rx.append(&data);
        MetricsCounters::add(&self.metrics.bytes_received, data.len());
        if rx.ring.is_over_capacity() {
            if rx.overrun.is_none() {
                MetricsCounters::bump(&self.metrics.overruns);
                warn!(
                    port = %self.name,
                    buffered = rx.ring.count(),
                    capacity = rx.ring.capacity(),
                    "receive buffer overrun"
                );
            }
            rx.overrun = Some(rx.ring.count());
        }
        self.rx.notify_locked(&rx);
    }

    /// A modem line changed level.
    fn on_signal(&self, signal: Signal, asserted: bool) {
        if !self.is_open() {
            return;
        }
        if self.gate.on_signal_changed(signal, asserted).cleared() {
            self.tx.notify_all();
        }
    }

    /// The port went away without the engine closing it.
    fn mark_lost(&self) {
        self.open.store(false, Ordering::Release);
        self.tx.close();
        self.rx.close();
    }
}

/// One open transfer session.
pub struct TransferEngine {
    shared: Arc<EngineShared>,
    drain: Mutex<Option<JoinHandle<()>>>,
}

impl TransferEngine {
    /// Start a session over an already open port.
    ///
    /// Both rings start empty and the gate is derived from the port's current
    /// line levels.
    pub fn open(
        port: Arc<dyn PortSession>,
        settings: &LineSettings,
        encoding: EncodingAdapter,
    ) -> TransferResult<Self> {
        if !port.is_open() {
            return Err(PortError::NotOpen.into());
        }
        if settings.read_buffer_size == 0 {
            return Err(TransferError::invalid_argument("read_buffer_size", "must be positive"));
        }
        if settings.write_buffer_size == 0 {
            return Err(TransferError::invalid_argument("write_buffer_size", "must be positive"));
        }

        let shared = Arc::new(EngineShared {
            name: port.name().to_string(),
            gate: FlowControlGate::new(settings.handshake, port.signals().clear_to_send),
            port: Arc::clone(&port),
            open: AtomicBool::new(true),
            tx: SharedRing::new("tx", settings.write_buffer_size),
            rx: SharedRing::new("rx", settings.read_buffer_size),
            encoding: RwLock::new(encoding),
            completion: RwLock::new(settings.write_completion),
            writer_turn: Mutex::new(()),
            metrics: MetricsCounters::default(),
            opened_at: Instant::now(),
        });

        let weak = Arc::downgrade(&shared);
        port.register_receive_callback(Box::new(move |bytes| {
            if let Some(shared) = weak.upgrade() {
                shared.on_received(bytes);
            }
        }));
        let weak = Arc::downgrade(&shared);
        port.register_signal_callback(Box::new(move |signal, asserted| {
            if let Some(shared) = weak.upgrade() {
                shared.on_signal(signal, asserted);
            }
        }));
        // A line may have moved between construction and registration.
        shared.gate.reset(port.signals().clear_to_send);

        if settings.handshake.uses_rts() {
            if let Err(e) = port.set_request_to_send(true) {
                warn!(port = %shared.name, error = %e, "could not assert RTS");
            }
        }

        let worker = Arc::clone(&shared);
        let drain = thread::Builder::new()
            .name(format!("serial-tx-{}", shared.name))
            .spawn(move || drain::run(worker))
            .map_err(PortError::from)?;

        info!(
            port = %shared.name,
            handshake = %settings.handshake,
            encoding = %shared.encoding.read().name(),
            "transfer session opened"
        );
        Ok(Self {
            shared,
            drain: Mutex::new(Some(drain)),
        })
    }

    pub fn port_name(&self) -> &str {
        &self.shared.name
    }

    pub fn is_open(&self) -> bool {
        self.shared.is_open()
    }

    pub fn state(&self) -> SessionState {
        if self.is_open() {
            SessionState::Open
        } else {
            SessionState::Closed
        }
    }

    fn ensure_open(&self) -> TransferResult<()> {
        if self.is_open() {
            Ok(())
        } else {
            Err(TransferError::invalid_state(SessionState::Closed))
        }
    }

    fn timed_out(&self, op: &PendingOperation) -> TransferError {
        let counter = match op.kind() {
            Operation::Read => &self.shared.metrics.read_timeouts,
            Operation::Write | Operation::Flush => &self.shared.metrics.write_timeouts,
        };
        MetricsCounters::bump(counter);
        debug!(
            port = %self.shared.name,
            operation = %op.kind(),
            timeout = %op.deadline().timeout(),
            completed = op.completed(),
            "operation timed out"
        );
        op.timed_out()
    }

    // ----- transmit -----

    /// Enqueue `bytes` for transmission.
    ///
    /// Blocks while the transmit ring is full and, under
    /// [`WriteCompletion::Unstalled`], while flow control holds this call's
    /// bytes in the ring. On timeout the bytes already enqueued stay queued.
    pub fn write(&self, bytes: &[u8], timeout: Timeout) -> TransferResult<()> {
        self.ensure_open()?;
        if bytes.is_empty() {
            return Ok(());
        }
        let shared = &self.shared;
        let mut op = PendingOperation::begin(Operation::Write, bytes.len(), timeout);

        let turn = match op.deadline().expires_at() {
            None => shared.writer_turn.lock(),
            Some(at) => match shared.writer_turn.try_lock_until(at) {
                Some(turn) => turn,
                None => return Err(self.timed_out(&op)),
            },
        };

        let mut tx = shared.tx.lock();
        loop {
            if tx.closed {
                return Err(TransferError::Disposed);
            }
            let n = tx.writable().min(op.remaining());
            if n > 0 {
                let start = op.completed();
                tx.append(&bytes[start..start + n]);
                op.record(n);
                MetricsCounters::add(&shared.metrics.bytes_enqueued, n);
                shared.tx.notify_locked(&tx);
                if op.is_satisfied() {
                    break;
                }
            }
            if op.deadline().has_expired() {
                return Err(self.timed_out(&op));
            }
            shared.tx.wait(&mut tx, op.deadline());
        }
        drop(turn);

        if *shared.completion.read() == WriteCompletion::Enqueued {
            return Ok(());
        }

        let end = tx.enqueued_total;
        loop {
            if tx.closed {
                return Err(TransferError::Disposed);
            }
            if tx.drained_total >= end || shared.gate.can_drain() {
                return Ok(());
            }
            if op.deadline().has_expired() {
                return Err(self.timed_out(&op));
            }
            shared.tx.wait(&mut tx, op.deadline());
        }
    }

    /// Encode `text` with the current encoding and [`write`](Self::write) it.
    pub fn write_text(&self, text: &str, timeout: Timeout) -> TransferResult<()> {
        self.ensure_open()?;
        let bytes = self.encoding().encode(text)?;
        self.write(&bytes, timeout)
    }

    /// Block until the transmit ring is empty.
    pub fn flush(&self, timeout: Timeout) -> TransferResult<()> {
        self.ensure_open()?;
        let shared = &self.shared;
        let op = PendingOperation::begin(Operation::Flush, 0, timeout);
        let mut tx = shared.tx.lock();
        loop {
            if tx.closed {
                return Err(TransferError::Disposed);
            }
            if tx.ring.is_empty() {
                return Ok(());
            }
            if op.deadline().has_expired() {
                return Err(self.timed_out(&op));
            }
            shared.tx.wait(&mut tx, op.deadline());
        }
    }

    pub fn bytes_to_write(&self) -> TransferResult<usize> {
        self.ensure_open()?;
        Ok(self.shared.tx.count())
    }

    /// Drop everything queued for transmission. The gate is untouched.
    pub fn discard_out_buffer(&self) -> TransferResult<()> {
        self.ensure_open()?;
        let dropped = self.shared.tx.clear();
        MetricsCounters::add(&self.shared.metrics.bytes_discarded_out, dropped);
        debug!(port = %self.shared.name, dropped, "transmit buffer discarded");
        Ok(())
    }

    // ----- receive -----

    /// Run `attempt` under the receive lock until it yields a value, the
    /// deadline passes or the session closes.
    fn read_when<T>(
        &self,
        op: &PendingOperation,
        mut attempt: impl FnMut(&mut RingState) -> TransferResult<Option<T>>,
    ) -> TransferResult<T> {
        let shared = &self.shared;
        let mut rx = shared.rx.lock();
        loop {
            if rx.closed {
                return Err(TransferError::Disposed);
            }
            take_overrun(&mut rx)?;
            if let Some(value) = attempt(&mut rx)? {
                return Ok(value);
            }
            if op.deadline().has_expired() {
                return Err(self.timed_out(op));
            }
            shared.rx.wait(&mut rx, op.deadline());
        }
    }

    /// Read at least one and at most `buf.len()` bytes.
    pub fn read(&self, buf: &mut [u8], timeout: Timeout) -> TransferResult<usize> {
        self.ensure_open()?;
        if buf.is_empty() {
            return Ok(0);
        }
        let op = PendingOperation::begin(Operation::Read, buf.len(), timeout);
        self.read_when(&op, |rx| {
            if rx.ring.is_empty() {
                Ok(None)
            } else {
                Ok(Some(rx.take_into(&mut *buf)))
            }
        })
    }

    /// Read at least one and at most `max_chars` whole characters.
    ///
    /// A partially received multi-byte character stays buffered.
    pub fn read_text(&self, max_chars: usize, timeout: Timeout) -> TransferResult<String> {
        self.ensure_open()?;
        if max_chars == 0 {
            return Ok(String::new());
        }
        let encoding = self.encoding();
        let op = PendingOperation::begin(Operation::Read, max_chars, timeout);
        self.read_when(&op, |rx| {
            if rx.ring.is_empty() {
                return Ok(None);
            }
            let mut text = String::new();
            let decoded = encoding.decode(rx.ring.contiguous(), max_chars, &mut text);
            if decoded.chars == 0 {
                return Ok(None);
            }
            rx.discard_front(decoded.bytes_consumed);
            Ok(Some(text))
        })
    }

    /// Read up to `delimiter`, consuming the delimiter too.
    ///
    /// Nothing is consumed unless the whole delimiter has arrived.
    pub fn read_to(&self, delimiter: &str, timeout: Timeout) -> TransferResult<String> {
        self.ensure_open()?;
        if delimiter.is_empty() {
            return Err(TransferError::invalid_argument("delimiter", "must not be empty"));
        }
        let encoding = self.encoding();
        let needle = encoding.encode(delimiter)?;
        let op = PendingOperation::begin(Operation::Read, needle.len(), timeout);
        let single_byte = encoding.max_bytes_per_char() == 1;
        let delimiter_chars = delimiter.chars().count();

        self.read_when(&op, |rx| {
            if single_byte {
                // Byte offsets are character offsets.
                let Some(pos) = rx.ring.find(&needle) else {
                    return Ok(None);
                };
                let (text, _) = encoding.decode_all(&rx.ring.contiguous()[..pos]);
                rx.discard_front(pos + needle.len());
                return Ok(Some(text));
            }

            let (text, _) = encoding.decode_all(rx.ring.contiguous());
            let Some(idx) = text.find(delimiter) else {
                return Ok(None);
            };
            let chars = text[..idx].chars().count() + delimiter_chars;
            let mut scratch = String::new();
            let consumed = encoding
                .decode(rx.ring.contiguous(), chars, &mut scratch)
                .bytes_consumed;
            rx.discard_front(consumed);
            let mut text = text;
            text.truncate(idx);
            Ok(Some(text))
        })
    }

    /// Decode every whole character currently buffered, without blocking.
    pub fn read_existing(&self) -> TransferResult<String> {
        self.ensure_open()?;
        let encoding = self.encoding();
        let mut rx = self.shared.rx.lock();
        take_overrun(&mut rx)?;
        let (text, decoded) = encoding.decode_all(rx.ring.contiguous());
        rx.discard_front(decoded.bytes_consumed);
        Ok(text)
    }

    /// Bytes waiting in the receive ring. Reports a pending overrun once.
    pub fn bytes_to_read(&self) -> TransferResult<usize> {
        self.ensure_open()?;
        let mut rx = self.shared.rx.lock();
        take_overrun(&mut rx)?;
        Ok(rx.ring.count())
    }

    /// Receive occupancy and whether an overrun is waiting to be reported,
    /// without reporting it.
    pub fn peek_receive(&self) -> TransferResult<(usize, bool)> {
        self.ensure_open()?;
        let rx = self.shared.rx.lock();
        Ok((rx.ring.count(), rx.overrun.is_some()))
    }

    pub fn discard_in_buffer(&self) -> TransferResult<()> {
        self.ensure_open()?;
        let dropped = self.shared.rx.clear();
        MetricsCounters::add(&self.shared.metrics.bytes_discarded_in, dropped);
        debug!(port = %self.shared.name, dropped, "receive buffer discarded");
        Ok(())
    }

    // ----- configuration -----

    /// Snapshot of the current encoding.
    pub fn encoding(&self) -> EncodingAdapter {
        self.shared.encoding.read().clone()
    }

    /// Takes effect for calls that start afterwards.
    pub fn set_encoding(&self, encoding: EncodingAdapter) {
        *self.shared.encoding.write() = encoding;
    }

    pub fn handshake(&self) -> Handshake {
        self.shared.gate.mode()
    }

    pub fn set_handshake(&self, mode: Handshake) -> TransferResult<()> {
        self.ensure_open()?;
        if self.shared.gate.set_mode(mode).cleared() {
            self.shared.tx.notify_all();
        }
        if mode.uses_rts() {
            self.shared.port.set_request_to_send(true)?;
        }
        Ok(())
    }

    pub fn write_completion(&self) -> WriteCompletion {
        *self.shared.completion.read()
    }

    pub fn set_write_completion(&self, completion: WriteCompletion) {
        *self.shared.completion.write() = completion;
        self.shared.tx.notify_all();
    }

    // ----- lines -----

    pub fn gate_state(&self) -> GateState {
        self.shared.gate.snapshot()
    }

    /// Live level of the remote clear-to-send line.
    pub fn cts_holding(&self) -> TransferResult<bool> {
        self.ensure_open()?;
        Ok(self.shared.gate.cts_holding())
    }

    pub fn set_request_to_send(&self, asserted: bool) -> TransferResult<()> {
        self.ensure_open()?;
        self.shared.port.set_request_to_send(asserted)?;
        Ok(())
    }

    pub fn metrics(&self) -> EngineMetrics {
        self.shared.metrics.snapshot(self.shared.opened_at.elapsed())
    }

    /// End the session. Blocked calls fail with `Disposed`. Idempotent.
    pub fn close(&self) -> TransferResult<()> {
        let shared = &self.shared;
        let was_open = shared.open.swap(false, Ordering::AcqRel);
        shared.tx.close();
        shared.rx.close();

        let port_result = if was_open { shared.port.close() } else { Ok(()) };
        if let Err(e) = &port_result {
            warn!(port = %shared.name, error = %e, "port close failed");
        }

        if let Some(handle) = self.drain.lock().take() {
            if handle.thread().id() != thread::current().id() && handle.join().is_err() {
                warn!(port = %shared.name, "drain thread panicked");
            }
        }
        if was_open {
            info!(port = %shared.name, "transfer session closed");
        }
        port_result.map_err(TransferError::from)
    }
}

impl Drop for TransferEngine {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

impl std::fmt::Debug for TransferEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransferEngine")
            .field("port", &self.shared.name)
            .field("state", &self.state())
            .field("gate", &self.shared.gate.snapshot())
            .finish()
    }
}

/// Report a pending overrun once; the buffered data is kept.
fn take_overrun(rx: &mut RingState) -> TransferResult<()> {
    if rx.overrun.take().is_some() {
        return Err(TransferError::Overrun {
            buffered: rx.ring.count(),
            capacity: rx.ring.capacity(),
        });
    }
    Ok(())
}
