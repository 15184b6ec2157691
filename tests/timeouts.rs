//! Deadlines on blocked reads, writes and flushes.

mod common;

use common::{assert_elapsed_near, line_over, open_line};
use pretty_assertions::assert_eq;
use serial_line::{Handshake, MockPortSession, Operation, TransferError, WriteCompletion};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

#[test]
fn test_read_timeout_is_honoured() {
    let (line, _port) = open_line("SILENT", Handshake::None);
    for ms in [50u64, 200] {
        line.set_read_timeout(ms as i64).unwrap();
        let mut buf = [0u8; 4];
        let started = Instant::now();
        let err = line.read_at(&mut buf, 0, 4).unwrap_err();
        assert_elapsed_near(started.elapsed(), Duration::from_millis(ms));
        assert!(matches!(
            err,
            TransferError::Timeout {
                operation: Operation::Read,
                completed: 0,
                ..
            }
        ));
    }
    assert_eq!(line.metrics().unwrap().read_timeouts, 2);
}

#[test]
fn test_zero_timeout_polls() {
    let (line, port) = open_line("POLL", Handshake::None);
    line.set_read_timeout(0).unwrap();

    let started = Instant::now();
    assert!(line.read_string(8).unwrap_err().is_timeout());
    assert!(started.elapsed() < Duration::from_millis(100));

    port.inject_received(b"ready");
    assert_eq!(line.read_string(8).unwrap(), "ready");
}

#[test]
fn test_infinite_read_waits_for_data() {
    let (line, port) = open_line("FOREVER", Handshake::None);
    assert_eq!(line.read_timeout(), -1);

    let feeder = thread::spawn(move || {
        thread::sleep(Duration::from_millis(150));
        port.inject_received(b"late");
    });
    let started = Instant::now();
    assert_eq!(line.read_string(4).unwrap(), "late");
    assert!(started.elapsed() >= Duration::from_millis(100));
    feeder.join().unwrap();
}

#[test]
fn test_stalled_write_and_flush_time_out() {
    let (line, port) = open_line("STALLED", Handshake::RequestToSend);
    port.set_cts(false);
    line.set_write_timeout(150).unwrap();

    let started = Instant::now();
    let err = line.write_bytes(b"xyz").unwrap_err();
    assert_elapsed_near(started.elapsed(), Duration::from_millis(150));
    assert!(matches!(
        err,
        TransferError::Timeout {
            operation: Operation::Write,
            completed: 3,
            ..
        }
    ));

    let started = Instant::now();
    let err = line.flush().unwrap_err();
    assert_elapsed_near(started.elapsed(), Duration::from_millis(150));
    assert!(matches!(
        err,
        TransferError::Timeout {
            operation: Operation::Flush,
            ..
        }
    ));
    assert_eq!(line.metrics().unwrap().write_timeouts, 2);
}

#[test]
fn test_full_ring_write_reports_partial_progress() {
    let session = MockPortSession::new("FULL");
    let line = line_over(&session);
    line.set_handshake(Handshake::RequestToSend).unwrap();
    line.set_write_buffer_size(8).unwrap();
    line.set_write_timeout(100).unwrap();
    line.set_write_completion(WriteCompletion::Enqueued);
    line.open().unwrap();
    session.set_cts(false);

    let started = Instant::now();
    let err = line.write_bytes(&[0x55; 20]).unwrap_err();
    assert_elapsed_near(started.elapsed(), Duration::from_millis(100));
    assert!(matches!(err, TransferError::Timeout { completed: 8, .. }), "{err:?}");
    assert_eq!(line.bytes_to_write().unwrap(), 8);
}

#[test]
fn test_enqueue_completion_returns_while_stalled() {
    let (line, port) = open_line("ENQ", Handshake::RequestToSend);
    port.set_cts(false);
    line.set_write_timeout(1000).unwrap();
    line.set_write_completion(WriteCompletion::Enqueued);

    let started = Instant::now();
    line.write_bytes(b"queued").unwrap();
    assert!(started.elapsed() < Duration::from_millis(500));
    assert_eq!(line.bytes_to_write().unwrap(), 6);
}

#[test]
fn test_concurrent_blocked_writers_keep_their_bytes() {
    let (line, port) = open_line("PAIR", Handshake::RequestToSend);
    port.set_cts(false);
    line.set_write_timeout(300).unwrap();
    let line = Arc::new(line);

    let writers: Vec<_> = [b"AAAA", b"BBBB"]
        .into_iter()
        .map(|chunk| {
            let line = Arc::clone(&line);
            thread::spawn(move || line.write_bytes(chunk))
        })
        .collect();
    for writer in writers {
        assert!(writer.join().unwrap().unwrap_err().is_timeout());
    }
    assert_eq!(line.bytes_to_write().unwrap(), 8);

    port.set_cts(true);
    assert!(common::wait_for(Duration::from_secs(2), || {
        line.bytes_to_write().unwrap() == 0
    }));
    let written = port.written();
    assert!(written == b"AAAABBBB" || written == b"BBBBAAAA", "{written:?}");
}

#[test]
fn test_negative_timeouts_rejected() {
    let line = line_over(&MockPortSession::new("NEG"));
    assert!(matches!(
        line.set_read_timeout(-2),
        Err(TransferError::InvalidArgument { .. })
    ));
    line.set_write_timeout(-1).unwrap();
    assert_eq!(line.write_timeout(), -1);
}
