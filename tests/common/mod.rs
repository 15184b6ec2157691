//! Shared test utilities for serial line integration tests.
//!
//! This module provides common test infrastructure including:
//! - Lines over mock sessions (loopback, stand-alone, null modem)
//! - Predicate polling with a deadline
//! - Elapsed-time assertions for timeout checks

#![allow(dead_code)]

use serial_line::{Handshake, MockConnector, MockPortSession, NullModem, SerialLine};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Scheduling slop allowed on top of a timeout before a test calls it late.
pub const TIMEOUT_SLOP: Duration = Duration::from_millis(400);

/// A line over `session`, configured but not yet opened.
pub fn line_over(session: &MockPortSession) -> SerialLine {
    SerialLine::with_connector(
        session_name(session),
        Arc::new(MockConnector::new(session.clone())),
    )
}

fn session_name(session: &MockPortSession) -> String {
    use serial_line::PortSession;
    session.name().to_string()
}

/// An opened line plus the mock session underneath it.
pub fn open_line(name: &str, handshake: Handshake) -> (SerialLine, MockPortSession) {
    let session = MockPortSession::new(name);
    let line = line_over(&session);
    line.set_handshake(handshake).unwrap();
    line.open().unwrap();
    (line, session)
}

/// An opened line that hears everything it sends.
pub fn loopback_line(name: &str) -> (SerialLine, MockPortSession) {
    let session = MockPortSession::new(name).with_loopback();
    let line = line_over(&session);
    line.set_read_timeout(2000).unwrap();
    line.set_write_timeout(2000).unwrap();
    line.open().unwrap();
    (line, session)
}

/// Two lines joined by a null-modem cable, both opened with `handshake`.
pub struct NullModemLines {
    pub a: SerialLine,
    pub b: SerialLine,
    pub port_a: MockPortSession,
    pub port_b: MockPortSession,
}

impl NullModemLines {
    pub fn open(handshake: Handshake) -> Self {
        let (port_a, port_b) = NullModem::pair("NM-A", "NM-B");
        let a = line_over(&port_a);
        let b = line_over(&port_b);
        for line in [&a, &b] {
            line.set_handshake(handshake).unwrap();
            line.set_read_timeout(2000).unwrap();
            line.set_write_timeout(2000).unwrap();
        }
        a.open().unwrap();
        b.open().unwrap();
        Self {
            a,
            b,
            port_a,
            port_b,
        }
    }
}

/// Poll `predicate` until it holds or `timeout` passes.
pub fn wait_for(timeout: Duration, mut predicate: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if predicate() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
}

/// Assert an elapsed time is at least `expected` and not much more.
pub fn assert_elapsed_near(elapsed: Duration, expected: Duration) {
    assert!(
        elapsed >= expected,
        "returned after {:?}, before the {:?} timeout",
        elapsed,
        expected
    );
    assert!(
        elapsed <= expected + TIMEOUT_SLOP,
        "returned after {:?}, well past the {:?} timeout",
        elapsed,
        expected
    );
}
