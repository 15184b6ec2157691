//! Tests requiring actual serial hardware.
//!
//! These tests are skipped if no hardware is available.
//!
//! # Running Hardware Tests
//!
//! ```bash
//! export TEST_PORT=/dev/ttyUSB0          # or COM3 on Windows
//! export TEST_PORT2=/dev/ttyUSB1         # optional, null-modem partner of TEST_PORT
//! export TEST_BAUD=9600                  # optional, default: 9600
//! export TEST_LOOPBACK=1                 # if TEST_PORT has TX-RX loopback
//!
//! cargo test --features hardware-tests --test hardware
//! ```

#![cfg(feature = "hardware-tests")]

use serial_line::{Handshake, PortConfiguration, SerialLine, TransferError};
use std::env;
use std::time::Duration;

fn get_test_baud() -> u32 {
    env::var("TEST_BAUD")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(9600)
}

fn is_loopback_enabled() -> bool {
    env::var("TEST_LOOPBACK").ok().as_deref() == Some("1")
}

/// The named port as a configured line, or `None` to skip.
fn line_from_env(var: &str) -> Option<SerialLine> {
    let Ok(port_name) = env::var(var) else {
        println!("Skipping hardware test: {var} not set");
        return None;
    };
    let line = SerialLine::new(port_name);
    line.set_port_configuration(PortConfiguration {
        baud_rate: get_test_baud(),
        ..PortConfiguration::default()
    })
    .unwrap();
    line.set_read_timeout(2000).unwrap();
    line.set_write_timeout(2000).unwrap();
    Some(line)
}

#[test]
fn test_real_port_open_close() {
    let Some(line) = line_from_env("TEST_PORT") else {
        return;
    };
    line.open().unwrap();
    assert!(line.is_open());
    assert_eq!(line.bytes_to_write().unwrap(), 0);
    line.close().unwrap();

    // A closed port can be opened again.
    line.open().unwrap();
    line.close().unwrap();
}

#[test]
fn test_real_port_read_timeout() {
    let Some(line) = line_from_env("TEST_PORT") else {
        return;
    };
    line.set_read_timeout(200).unwrap();
    line.open().unwrap();
    line.discard_in_buffer().unwrap();

    let started = std::time::Instant::now();
    let mut buf = [0u8; 16];
    let len = buf.len();
    match line.read_at(&mut buf, 0, len) {
        Err(e) => assert!(e.is_timeout(), "{e}"),
        Ok(n) => println!("Port is not silent; read {n} bytes"),
    }
    assert!(started.elapsed() >= Duration::from_millis(200));
}

#[test]
fn test_real_port_loopback() {
    if !is_loopback_enabled() {
        println!("Skipping loopback test: TEST_LOOPBACK not set");
        return;
    }
    let Some(line) = line_from_env("TEST_PORT") else {
        return;
    };
    line.open().unwrap();
    line.discard_in_buffer().unwrap();

    line.write_line("serial_line loopback").unwrap();
    assert_eq!(line.read_line().unwrap(), "serial_line loopback");
}

#[test]
fn test_real_null_modem_rts_handshake() {
    let (Some(a), Some(b)) = (line_from_env("TEST_PORT"), line_from_env("TEST_PORT2")) else {
        return;
    };
    a.set_handshake(Handshake::RequestToSend).unwrap();
    b.set_handshake(Handshake::RequestToSend).unwrap();
    a.open().unwrap();
    b.open().unwrap();

    a.write_line("ping").unwrap();
    assert_eq!(b.read_line().unwrap(), "ping");

    b.set_request_to_send(false).unwrap();
    std::thread::sleep(Duration::from_millis(50));
    a.set_write_timeout(300).unwrap();
    match a.write_str("held") {
        Err(TransferError::Timeout { .. }) => {}
        other => panic!("expected a stalled write, got {other:?}"),
    }
    b.set_request_to_send(true).unwrap();
    assert_eq!(b.read_to("d").unwrap(), "hel");
}
