//! Mock port sessions for testing.
//!
//! Provides a [`MockPortSession`] that simulates a serial line without
//! requiring actual hardware, a [`NullModem`] that wires two of them together
//! the way a crossed cable would, and a [`MockConnector`] that hands a mock
//! session to anything opening ports by name.

use super::error::PortError;
use super::traits::{
    ControlSignals, PortConfiguration, PortConnector, PortSession, ReceiveCallback, Signal,
    SignalCallback,
};
use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use tracing::trace;

type SharedReceive = Arc<dyn Fn(&[u8]) + Send + Sync>;
type SharedSignal = Arc<dyn Fn(Signal, bool) + Send + Sync>;

/// Inner state of the mock session, protected by a mutex for interior mutability.
#[derive(Default)]
struct MockSessionState {
    open: bool,
    /// Every chunk accepted by `send_raw`, in order.
    write_log: Vec<Vec<u8>>,
    /// Bytes injected before a receive callback was registered.
    undelivered: Vec<u8>,
    signals: ControlSignals,
    request_to_send: bool,
    /// Number of upcoming `send_raw` calls that fail.
    failing_sends: usize,
    /// Upper bound on bytes accepted per `send_raw`.
    max_send_chunk: Option<usize>,
    /// Echo every sent byte back to this session's own receive callback.
    loopback: bool,
    peer: Option<Weak<MockInner>>,
    connects: usize,
    on_receive: Option<SharedReceive>,
    on_signal: Option<SharedSignal>,
}

struct MockInner {
    name: String,
    state: Mutex<MockSessionState>,
}

impl MockInner {
    /// Hand bytes to the receive callback, or hold them until one exists.
    fn deliver(&self, bytes: &[u8]) {
        let callback = {
            let mut state = self.state.lock();
            if !state.open {
                trace!(port = %self.name, len = bytes.len(), "dropping bytes for closed mock");
                return;
            }
            match &state.on_receive {
                Some(callback) => Arc::clone(callback),
                None => {
                    state.undelivered.extend_from_slice(bytes);
                    return;
                }
            }
        };
        callback(bytes);
    }

    fn change_signal(&self, signal: Signal, asserted: bool) {
        let callback = {
            let mut state = self.state.lock();
            if state.signals.level(signal) == asserted {
                return;
            }
            state.signals.set(signal, asserted);
            if !state.open {
                return;
            }
            state.on_signal.clone()
        };
        if let Some(callback) = callback {
            callback(signal, asserted);
        }
    }
}

/// Mock port session for testing.
///
/// Cloning yields another handle to the same session, so a test can keep one
/// handle for inspection while the engine owns another.
///
/// # Example
/// ```
/// use serial_line::port::{MockPortSession, PortSession};
///
/// let port = MockPortSession::new("MOCK0");
/// port.send_raw(b"Response").unwrap();
///
/// assert_eq!(port.written(), b"Response");
/// assert_eq!(port.write_log().len(), 1);
/// ```
#[derive(Clone)]
pub struct MockPortSession {
    inner: Arc<MockInner>,
}

impl MockPortSession {
    /// Create an open mock session with every modem line asserted.
    pub fn new(name: impl Into<String>) -> Self {
        let session = Self::with_signals(
            name,
            ControlSignals {
                clear_to_send: true,
                data_set_ready: true,
                carrier_detect: true,
                ring_indicator: false,
            },
        );
        session.inner.state.lock().request_to_send = true;
        session
    }

    /// Create an open mock session with the given initial line levels.
    pub fn with_signals(name: impl Into<String>, signals: ControlSignals) -> Self {
        Self {
            inner: Arc::new(MockInner {
                name: name.into(),
                state: Mutex::new(MockSessionState {
                    open: true,
                    signals,
                    ..Default::default()
                }),
            }),
        }
    }

    /// Echo everything sent back into this session's receive side.
    pub fn with_loopback(self) -> Self {
        self.inner.state.lock().loopback = true;
        self
    }

    /// Simulate bytes arriving from the remote.
    pub fn inject_received(&self, bytes: &[u8]) {
        self.inner.deliver(bytes);
    }

    /// Simulate a modem-status line changing level.
    pub fn set_signal(&self, signal: Signal, asserted: bool) {
        self.inner.change_signal(signal, asserted);
    }

    /// Shorthand for driving the clear-to-send input.
    pub fn set_cts(&self, asserted: bool) {
        self.set_signal(Signal::ClearToSend, asserted);
    }

    /// Make the next `count` sends fail with an I/O error.
    pub fn fail_next_sends(&self, count: usize) {
        self.inner.state.lock().failing_sends = count;
    }

    /// Accept at most `limit` bytes per send, simulating a slow line.
    pub fn limit_send_chunk(&self, limit: usize) {
        self.inner.state.lock().max_send_chunk = Some(limit.max(1));
    }

    /// Get a copy of every chunk sent so far.
    pub fn write_log(&self) -> Vec<Vec<u8>> {
        self.inner.state.lock().write_log.clone()
    }

    /// All sent bytes, concatenated.
    pub fn written(&self) -> Vec<u8> {
        self.inner.state.lock().write_log.concat()
    }

    /// Clear the write log.
    pub fn clear_write_log(&self) {
        self.inner.state.lock().write_log.clear();
    }

    /// Current level of the local request-to-send output.
    pub fn request_to_send(&self) -> bool {
        self.inner.state.lock().request_to_send
    }

    /// How many times a [`MockConnector`] has opened this session.
    pub fn connect_count(&self) -> usize {
        self.inner.state.lock().connects
    }

    pub fn has_receive_callback(&self) -> bool {
        self.inner.state.lock().on_receive.is_some()
    }

    /// Mark the session open again, as a fresh connect would.
    fn reopen(&self) {
        let mut state = self.inner.state.lock();
        state.open = true;
        state.connects += 1;
        state.on_receive = None;
        state.on_signal = None;
        state.undelivered.clear();
    }

    fn link(&self, peer: &MockPortSession) {
        self.inner.state.lock().peer = Some(Arc::downgrade(&peer.inner));
    }

    fn peer(&self) -> Option<Arc<MockInner>> {
        self.inner.state.lock().peer.as_ref().and_then(Weak::upgrade)
    }
}

impl PortSession for MockPortSession {
    fn name(&self) -> &str {
        &self.inner.name
    }

    fn send_raw(&self, bytes: &[u8]) -> Result<usize, PortError> {
        let (accepted, loopback, peer) = {
            let mut state = self.inner.state.lock();
            if !state.open {
                return Err(PortError::NotOpen);
            }
            if state.failing_sends > 0 {
                state.failing_sends -= 1;
                return Err(PortError::Io(std::io::Error::new(
                    std::io::ErrorKind::BrokenPipe,
                    "simulated send failure",
                )));
            }
            let accepted = state.max_send_chunk.map_or(bytes.len(), |max| max.min(bytes.len()));
            state.write_log.push(bytes[..accepted].to_vec());
            let peer = state.peer.as_ref().and_then(Weak::upgrade);
            (accepted, state.loopback, peer)
        };

        let sent = &bytes[..accepted];
        if loopback {
            self.inner.deliver(sent);
        }
        if let Some(peer) = peer {
            peer.deliver(sent);
        }
        Ok(accepted)
    }

    fn register_receive_callback(&self, callback: ReceiveCallback) {
        let callback: SharedReceive = Arc::from(callback);
        let held = {
            let mut state = self.inner.state.lock();
            state.on_receive = Some(Arc::clone(&callback));
            std::mem::take(&mut state.undelivered)
        };
        if !held.is_empty() {
            callback(&held);
        }
    }

    fn register_signal_callback(&self, callback: SignalCallback) {
        self.inner.state.lock().on_signal = Some(Arc::from(callback));
    }

    fn is_open(&self) -> bool {
        self.inner.state.lock().open
    }

    fn signals(&self) -> ControlSignals {
        self.inner.state.lock().signals
    }

    fn set_request_to_send(&self, asserted: bool) -> Result<(), PortError> {
        {
            let mut state = self.inner.state.lock();
            if !state.open {
                return Err(PortError::NotOpen);
            }
            state.request_to_send = asserted;
        }
        if let Some(peer) = self.peer() {
            peer.change_signal(Signal::ClearToSend, asserted);
        }
        Ok(())
    }

    fn close(&self) -> Result<(), PortError> {
        let mut state = self.inner.state.lock();
        state.open = false;
        state.on_receive = None;
        state.on_signal = None;
        Ok(())
    }
}

impl std::fmt::Debug for MockPortSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("MockPortSession")
            .field("name", &self.inner.name)
            .field("open", &state.open)
            .field("signals", &state.signals)
            .finish()
    }
}

/// Two mock sessions joined by a crossed cable.
///
/// Bytes sent on one arrive at the other, and each side's request-to-send
/// output drives the other side's clear-to-send input.
pub struct NullModem;

impl NullModem {
    /// Create both ends with request-to-send deasserted, so neither side sees
    /// clear-to-send until the other asserts it.
    pub fn pair(
        a: impl Into<String>,
        b: impl Into<String>,
    ) -> (MockPortSession, MockPortSession) {
        let first = MockPortSession::with_signals(a, ControlSignals::default());
        let second = MockPortSession::with_signals(b, ControlSignals::default());
        first.link(&second);
        second.link(&first);
        (first, second)
    }
}

/// Hands out one mock session whenever a port is opened.
#[derive(Clone, Debug)]
pub struct MockConnector {
    session: Option<MockPortSession>,
}

impl MockConnector {
    pub fn new(session: MockPortSession) -> Self {
        Self {
            session: Some(session),
        }
    }

    /// A connector for which every port name is unknown.
    pub fn failing() -> Self {
        Self { session: None }
    }
}

impl PortConnector for MockConnector {
    fn connect(
        &self,
        port_name: &str,
        _config: &PortConfiguration,
    ) -> Result<Arc<dyn PortSession>, PortError> {
        match &self.session {
            Some(session) => {
                session.reopen();
                Ok(Arc::new(session.clone()))
            }
            None => Err(PortError::not_found(port_name)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    fn collector(session: &MockPortSession) -> Arc<Mutex<Vec<u8>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        session.register_receive_callback(Box::new(move |bytes| sink.lock().extend_from_slice(bytes)));
        seen
    }

    #[test]
    fn test_write_logging() {
        let port = MockPortSession::new("MOCK0");
        port.send_raw(b"Test1").unwrap();
        port.send_raw(b"Test2").unwrap();

        let log = port.write_log();
        assert_eq!(log.len(), 2);
        assert_eq!(log[0], b"Test1");
        assert_eq!(log[1], b"Test2");
    }

    #[test]
    fn test_injected_bytes_wait_for_callback() {
        let port = MockPortSession::new("MOCK0");
        port.inject_received(b"early");
        let seen = collector(&port);
        port.inject_received(b" late");
        assert_eq!(&*seen.lock(), b"early late");
    }

    #[test]
    fn test_send_failure_simulation() {
        let port = MockPortSession::new("MOCK0");
        port.fail_next_sends(1);
        assert!(matches!(port.send_raw(b"x"), Err(PortError::Io(_))));
        assert_eq!(port.send_raw(b"x").unwrap(), 1);
    }

    #[test]
    fn test_short_sends() {
        let port = MockPortSession::new("MOCK0");
        port.limit_send_chunk(3);
        assert_eq!(port.send_raw(b"abcdef").unwrap(), 3);
        assert_eq!(port.written(), b"abc");
    }

    #[test]
    fn test_loopback() {
        let port = MockPortSession::new("LOOP").with_loopback();
        let seen = collector(&port);
        port.send_raw(b"echo").unwrap();
        assert_eq!(&*seen.lock(), b"echo");
    }

    #[test]
    fn test_closed_session_rejects_sends() {
        let port = MockPortSession::new("MOCK0");
        port.close().unwrap();
        assert!(!port.is_open());
        assert!(matches!(port.send_raw(b"x"), Err(PortError::NotOpen)));
    }

    #[test]
    fn test_null_modem_crosses_data_and_handshake_lines() {
        let (a, b) = NullModem::pair("A", "B");
        let at_b = collector(&b);
        let cts_at_a = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&cts_at_a);
        a.register_signal_callback(Box::new(move |signal, asserted| {
            if signal == Signal::ClearToSend {
                flag.store(asserted, Ordering::SeqCst);
            }
        }));

        a.send_raw(b"ping").unwrap();
        assert_eq!(&*at_b.lock(), b"ping");

        assert!(!a.signals().clear_to_send);
        b.set_request_to_send(true).unwrap();
        assert!(a.signals().clear_to_send);
        assert!(cts_at_a.load(Ordering::SeqCst));
    }

    #[test]
    fn test_connector() {
        let session = MockPortSession::new("MOCK0");
        let connector = MockConnector::new(session.clone());
        session.close().unwrap();

        let opened = connector
            .connect("MOCK0", &PortConfiguration::default())
            .unwrap();
        assert!(opened.is_open());
        assert_eq!(session.connect_count(), 1);

        let err = MockConnector::failing()
            .connect("BAD_PORT_NAME", &PortConfiguration::default())
            .unwrap_err();
        assert_eq!(err.to_string(), "Serial port not found: BAD_PORT_NAME");
    }
}
