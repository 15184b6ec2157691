//! Caller-facing serial line.
//!
//! [`SerialLine`] is the surface applications use: Open/Close, the line
//! properties (encoding, handshake, timeouts, new-line), and the blocking
//! Read/Write family. It owns configuration that outlives a session and
//! forwards every transfer to the [`TransferEngine`] of the current session.
//!
//! # Architecture
//!
//! ```text
//! caller ──> SerialLine ──> TransferEngine ──> PortSession ──> wire
//!               │                 │
//!           LineSettings     tx/rx rings + gate
//! ```
//!
//! A failed Open leaves the line `Unopened`; Close moves it to `Closed`.
//! Either way every transfer call fails with `InvalidState` until the next
//! successful Open, which starts a fresh session.

#[cfg(feature = "async-serial")]
pub mod async_line;

use crate::config::LineConfig;
use crate::encoding::{EncodingAdapter, EncodingCodec};
use crate::engine::{EngineMetrics, TransferEngine};
use crate::error::{TransferError, TransferResult};
use crate::flow::Handshake;
use crate::port::{PortConfiguration, PortConnector, PortError, SerialportConnector};
use crate::state::{LineSettings, LineState, SessionState, WriteCompletion};
use crate::timeout::Timeout;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::io;
use std::ops::Range;
use std::sync::Arc;
use tracing::{debug, info};

// ========== Status DTOs ==========

/// Line status information
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "PascalCase")]
pub enum LineStatus {
    Unopened {
        port_name: String,
    },
    Open {
        port_name: String,
        handshake: Handshake,
        encoding: String,
        bytes_to_read: usize,
        /// An overrun the next read or `bytes_to_read` will report.
        overrun_pending: bool,
        bytes_to_write: usize,
        cts_holding: bool,
        metrics: EngineMetrics,
    },
    Closed {
        port_name: String,
    },
}

// ========== Line Implementation ==========

/// One serial line, opened and closed any number of times.
pub struct SerialLine {
    port_name: String,
    connector: Arc<dyn PortConnector>,
    settings: Mutex<LineSettings>,
    encoding: RwLock<EncodingAdapter>,
    state: Mutex<LineState>,
}

impl SerialLine {
    /// A line on a real device, with default settings.
    pub fn new(port_name: impl Into<String>) -> Self {
        Self::with_connector(port_name, Arc::new(SerialportConnector))
    }

    /// A line whose sessions come from `connector`.
    pub fn with_connector(port_name: impl Into<String>, connector: Arc<dyn PortConnector>) -> Self {
        Self {
            port_name: port_name.into(),
            connector,
            settings: Mutex::new(LineSettings::default()),
            encoding: RwLock::new(EncodingAdapter::default()),
            state: Mutex::new(LineState::Unopened),
        }
    }

    /// A line configured from the `[line]` configuration section.
    pub fn from_config(config: &LineConfig, connector: Arc<dyn PortConnector>) -> TransferResult<Self> {
        let line = Self::with_connector(config.port_name.clone(), connector);
        *line.settings.lock() = config.to_settings()?;
        *line.encoding.write() = EncodingAdapter::for_name(&config.encoding)?;
        Ok(line)
    }

    pub fn port_name(&self) -> &str {
        &self.port_name
    }

    pub fn state(&self) -> SessionState {
        self.state.lock().session_state()
    }

    pub fn is_open(&self) -> bool {
        self.state() == SessionState::Open
    }

    /// The current session, or `InvalidState`.
    fn engine(&self) -> TransferResult<Arc<TransferEngine>> {
        let state = self.state.lock();
        match state.engine() {
            Some(engine) if engine.is_open() => Ok(Arc::clone(engine)),
            Some(_) => Err(TransferError::invalid_state(SessionState::Closed)),
            None => Err(TransferError::invalid_state(state.session_state())),
        }
    }

    fn settings(&self) -> LineSettings {
        self.settings.lock().clone()
    }

    // ========== Lifecycle ==========

    /// Open the port and start a new session.
    ///
    /// # Errors
    ///
    /// - `Port(AlreadyOpen)` if a session is already open
    /// - `Port(..)` if the port cannot be opened; the line stays `Unopened`
    pub fn open(&self) -> TransferResult<()> {
        let mut state = self.state.lock();
        if let Some(engine) = state.engine() {
            if engine.is_open() {
                return Err(PortError::AlreadyOpen.into());
            }
        }

        let settings = self.settings();
        let encoding = self.encoding.read().clone();
        let opened = self
            .connector
            .connect(&self.port_name, &settings.port)
            .map_err(TransferError::from)
            .and_then(|port| {
                TransferEngine::open(Arc::clone(&port), &settings, encoding).inspect_err(|_| {
                    let _ = port.close();
                })
            });

        match opened {
            Ok(engine) => {
                *state = LineState::Open(Arc::new(engine));
                info!(port = %self.port_name, "line opened");
                Ok(())
            }
            Err(e) => {
                *state = LineState::Unopened;
                debug!(port = %self.port_name, error = %e, "line failed to open");
                Err(e)
            }
        }
    }

    /// Close the current session. Pending calls fail with `Disposed`.
    ///
    /// This operation is idempotent - closing a line that is not open succeeds.
    pub fn close(&self) -> TransferResult<()> {
        let engine = {
            let mut state = self.state.lock();
            match std::mem::take(&mut *state) {
                LineState::Open(engine) => {
                    *state = LineState::Closed;
                    engine
                }
                other => {
                    *state = other;
                    return Ok(());
                }
            }
        };
        engine.close()
    }

    // ========== Properties ==========

    pub fn encoding(&self) -> EncodingAdapter {
        self.encoding.read().clone()
    }

    /// Assign a codec; `None` is rejected with `NullArgument`.
    ///
    /// Validation happens here, whether or not the line is open. An open
    /// session picks the codec up for calls that start afterwards.
    pub fn set_encoding(&self, codec: Option<Arc<dyn EncodingCodec>>) -> TransferResult<()> {
        let adapter = EncodingAdapter::from_option(codec)?;
        self.apply_encoding(adapter);
        Ok(())
    }

    pub fn set_encoding_name(&self, name: &str) -> TransferResult<()> {
        let adapter = EncodingAdapter::for_name(name)?;
        self.apply_encoding(adapter);
        Ok(())
    }

    fn apply_encoding(&self, adapter: EncodingAdapter) {
        *self.encoding.write() = adapter.clone();
        if let Ok(engine) = self.engine() {
            engine.set_encoding(adapter);
        }
    }

    pub fn handshake(&self) -> Handshake {
        self.settings.lock().handshake
    }

    pub fn set_handshake(&self, handshake: Handshake) -> TransferResult<()> {
        self.settings.lock().handshake = handshake;
        if let Ok(engine) = self.engine() {
            engine.set_handshake(handshake)?;
        }
        Ok(())
    }

    /// Read timeout in milliseconds, `-1` for infinite.
    pub fn read_timeout(&self) -> i64 {
        self.settings.lock().read_timeout.as_millis()
    }

    pub fn set_read_timeout(&self, ms: i64) -> TransferResult<()> {
        self.settings.lock().read_timeout = Timeout::from_millis(ms)?;
        Ok(())
    }

    /// Write timeout in milliseconds, `-1` for infinite.
    pub fn write_timeout(&self) -> i64 {
        self.settings.lock().write_timeout.as_millis()
    }

    pub fn set_write_timeout(&self, ms: i64) -> TransferResult<()> {
        self.settings.lock().write_timeout = Timeout::from_millis(ms)?;
        Ok(())
    }

    pub fn new_line(&self) -> String {
        self.settings.lock().new_line.clone()
    }

    pub fn set_new_line(&self, new_line: &str) -> TransferResult<()> {
        if new_line.is_empty() {
            return Err(TransferError::invalid_argument("new_line", "must not be empty"));
        }
        self.settings.lock().new_line = new_line.to_string();
        Ok(())
    }

    pub fn write_completion(&self) -> WriteCompletion {
        self.settings.lock().write_completion
    }

    pub fn set_write_completion(&self, completion: WriteCompletion) {
        self.settings.lock().write_completion = completion;
        if let Ok(engine) = self.engine() {
            engine.set_write_completion(completion);
        }
    }

    pub fn read_buffer_size(&self) -> usize {
        self.settings.lock().read_buffer_size
    }

    /// Takes effect at the next Open; rejected while open.
    pub fn set_read_buffer_size(&self, size: usize) -> TransferResult<()> {
        self.ensure_reconfigurable("read_buffer_size")?;
        if size == 0 {
            return Err(TransferError::invalid_argument("read_buffer_size", "must be positive"));
        }
        self.settings.lock().read_buffer_size = size;
        Ok(())
    }

    pub fn write_buffer_size(&self) -> usize {
        self.settings.lock().write_buffer_size
    }

    /// Takes effect at the next Open; rejected while open.
    pub fn set_write_buffer_size(&self, size: usize) -> TransferResult<()> {
        self.ensure_reconfigurable("write_buffer_size")?;
        if size == 0 {
            return Err(TransferError::invalid_argument("write_buffer_size", "must be positive"));
        }
        self.settings.lock().write_buffer_size = size;
        Ok(())
    }

    pub fn port_configuration(&self) -> PortConfiguration {
        self.settings.lock().port.clone()
    }

    /// Takes effect at the next Open; rejected while open.
    pub fn set_port_configuration(&self, port: PortConfiguration) -> TransferResult<()> {
        self.ensure_reconfigurable("port")?;
        if port.baud_rate == 0 {
            return Err(TransferError::invalid_argument("baud_rate", "must be positive"));
        }
        self.settings.lock().port = port;
        Ok(())
    }

    fn ensure_reconfigurable(&self, name: &'static str) -> TransferResult<()> {
        if self.is_open() {
            return Err(TransferError::invalid_argument(
                name,
                "cannot change while the port is open",
            ));
        }
        Ok(())
    }

    // ========== Transmit ==========

    /// Write `count` bytes of `buffer` starting at `offset`.
    pub fn write_at(&self, buffer: &[u8], offset: usize, count: usize) -> TransferResult<()> {
        let range = checked_range(buffer.len(), offset, count)?;
        let timeout = self.settings.lock().write_timeout;
        self.engine()?.write(&buffer[range], timeout)
    }

    pub fn write_bytes(&self, buffer: &[u8]) -> TransferResult<()> {
        self.write_at(buffer, 0, buffer.len())
    }

    /// Write `count` characters of `buffer` starting at `offset`.
    pub fn write_chars(&self, buffer: &[char], offset: usize, count: usize) -> TransferResult<()> {
        let range = checked_range(buffer.len(), offset, count)?;
        let timeout = self.settings.lock().write_timeout;
        let engine = self.engine()?;
        let bytes = engine.encoding().encode_chars(&buffer[range])?;
        engine.write(&bytes, timeout)
    }

    pub fn write_str(&self, text: &str) -> TransferResult<()> {
        let timeout = self.settings.lock().write_timeout;
        self.engine()?.write_text(text, timeout)
    }

    /// Write `text` followed by the new-line string.
    pub fn write_line(&self, text: &str) -> TransferResult<()> {
        let (timeout, new_line) = {
            let settings = self.settings.lock();
            (settings.write_timeout, settings.new_line.clone())
        };
        let mut line = String::with_capacity(text.len() + new_line.len());
        line.push_str(text);
        line.push_str(&new_line);
        self.engine()?.write_text(&line, timeout)
    }

    /// Wait until everything queued has left the transmit buffer.
    pub fn flush(&self) -> TransferResult<()> {
        let timeout = self.settings.lock().write_timeout;
        self.engine()?.flush(timeout)
    }

    pub fn bytes_to_write(&self) -> TransferResult<usize> {
        self.engine()?.bytes_to_write()
    }

    pub fn discard_out_buffer(&self) -> TransferResult<()> {
        self.engine()?.discard_out_buffer()
    }

    // ========== Receive ==========

    /// Read at most `count` bytes into `buffer` at `offset`.
    pub fn read_at(&self, buffer: &mut [u8], offset: usize, count: usize) -> TransferResult<usize> {
        let range = checked_range(buffer.len(), offset, count)?;
        let timeout = self.settings.lock().read_timeout;
        self.engine()?.read(&mut buffer[range], timeout)
    }

    /// Read at most `count` whole characters into `buffer` at `offset`.
    pub fn read_chars(&self, buffer: &mut [char], offset: usize, count: usize) -> TransferResult<usize> {
        let range = checked_range(buffer.len(), offset, count)?;
        let text = self.read_string(range.len())?;
        let mut n = 0;
        for (slot, c) in buffer[range].iter_mut().zip(text.chars()) {
            *slot = c;
            n += 1;
        }
        Ok(n)
    }

    /// Read at least one and at most `max_chars` characters.
    pub fn read_string(&self, max_chars: usize) -> TransferResult<String> {
        let timeout = self.settings.lock().read_timeout;
        self.engine()?.read_text(max_chars, timeout)
    }

    /// Read up to the next new-line string, which is consumed but not returned.
    pub fn read_line(&self) -> TransferResult<String> {
        let (timeout, new_line) = {
            let settings = self.settings.lock();
            (settings.read_timeout, settings.new_line.clone())
        };
        self.engine()?.read_to(&new_line, timeout)
    }

    /// Read up to `delimiter`, which is consumed but not returned.
    pub fn read_to(&self, delimiter: &str) -> TransferResult<String> {
        let timeout = self.settings.lock().read_timeout;
        self.engine()?.read_to(delimiter, timeout)
    }

    /// Everything decodable that is already buffered; never blocks.
    pub fn read_existing(&self) -> TransferResult<String> {
        self.engine()?.read_existing()
    }

    pub fn bytes_to_read(&self) -> TransferResult<usize> {
        self.engine()?.bytes_to_read()
    }

    pub fn discard_in_buffer(&self) -> TransferResult<()> {
        self.engine()?.discard_in_buffer()
    }

    // ========== Lines and status ==========

    pub fn cts_holding(&self) -> TransferResult<bool> {
        self.engine()?.cts_holding()
    }

    pub fn set_request_to_send(&self, asserted: bool) -> TransferResult<()> {
        self.engine()?.set_request_to_send(asserted)
    }

    pub fn metrics(&self) -> TransferResult<EngineMetrics> {
        Ok(self.engine()?.metrics())
    }

    pub fn status(&self) -> LineStatus {
        let port_name = self.port_name.clone();
        let engine = match self.engine() {
            Ok(engine) => engine,
            Err(_) => {
                return match self.state() {
                    SessionState::Unopened => LineStatus::Unopened { port_name },
                    _ => LineStatus::Closed { port_name },
                }
            }
        };
        let (bytes_to_read, overrun_pending) = engine.peek_receive().unwrap_or_default();
        LineStatus::Open {
            port_name,
            handshake: engine.handshake(),
            encoding: engine.encoding().name().to_string(),
            bytes_to_read,
            overrun_pending,
            bytes_to_write: engine.bytes_to_write().unwrap_or_default(),
            cts_holding: engine.cts_holding().unwrap_or_default(),
            metrics: engine.metrics(),
        }
    }
}

impl Drop for SerialLine {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

impl std::fmt::Debug for SerialLine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialLine")
            .field("port_name", &self.port_name)
            .field("state", &self.state())
            .field("encoding", &self.encoding.read().name())
            .finish()
    }
}

fn checked_range(len: usize, offset: usize, count: usize) -> TransferResult<Range<usize>> {
    if offset > len {
        return Err(TransferError::invalid_argument(
            "offset",
            format!("{offset} is beyond the buffer length {len}"),
        ));
    }
    match offset.checked_add(count) {
        Some(end) if end <= len => Ok(offset..end),
        _ => Err(TransferError::invalid_argument(
            "count",
            format!("{count} bytes from offset {offset} exceed the buffer length {len}"),
        )),
    }
}

// ========== std::io adapters ==========

impl io::Read for &SerialLine {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let len = buf.len();
        Ok(self.read_at(buf, 0, len)?)
    }
}

impl io::Write for &SerialLine {
    /// Bytes enqueued before a timeout stay queued, so they are reported as
    /// written; only a timeout that enqueued nothing is an error.
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self.write_bytes(buf) {
            Ok(()) => Ok(buf.len()),
            Err(TransferError::Timeout { completed, .. }) if completed > 0 => Ok(completed),
            Err(e) => Err(e.into()),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(SerialLine::flush(*self)?)
    }
}

impl io::Read for SerialLine {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        (&*self).read(buf)
    }
}

impl io::Write for SerialLine {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        (&*self).write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        io::Write::flush(&mut &*self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::{MockConnector, MockPortSession};

    fn create_test_line() -> (MockPortSession, SerialLine) {
        let session = MockPortSession::new("MOCK0");
        let line = SerialLine::with_connector("MOCK0", Arc::new(MockConnector::new(session.clone())));
        (session, line)
    }

    #[test]
    fn test_line_creation() {
        let (_, line) = create_test_line();
        assert!(!line.is_open());
        assert_eq!(line.state(), SessionState::Unopened);
        assert_eq!(line.encoding().name(), "us-ascii");
        assert_eq!(line.read_timeout(), -1);
    }

    #[test]
    fn test_close_when_never_opened() {
        let (_, line) = create_test_line();
        assert!(line.close().is_ok());
        assert_eq!(line.state(), SessionState::Unopened);
    }

    #[test]
    fn test_write_when_not_open() {
        let (_, line) = create_test_line();
        assert!(matches!(
            line.write_str("test"),
            Err(TransferError::InvalidState {
                state: SessionState::Unopened
            })
        ));
    }

    #[test]
    fn test_open_twice() {
        let (_, line) = create_test_line();
        line.open().unwrap();
        assert!(matches!(
            line.open(),
            Err(TransferError::Port(PortError::AlreadyOpen))
        ));
    }

    #[test]
    fn test_status_follows_lifecycle() {
        let (_, line) = create_test_line();
        assert!(matches!(line.status(), LineStatus::Unopened { .. }));
        line.open().unwrap();
        assert!(matches!(line.status(), LineStatus::Open { .. }));
        line.close().unwrap();
        assert!(matches!(line.status(), LineStatus::Closed { .. }));

        let json = serde_json::to_value(line.status()).unwrap();
        assert_eq!(json["state"], "Closed");
        assert_eq!(json["port_name"], "MOCK0");
    }

    #[test]
    fn test_offset_and_count_validation() {
        let (_, line) = create_test_line();
        line.open().unwrap();
        let buf = [0u8; 4];
        assert!(matches!(
            line.write_at(&buf, 3, 2),
            Err(TransferError::InvalidArgument { name: "count", .. })
        ));
        assert!(matches!(
            line.write_at(&buf, 5, 0),
            Err(TransferError::InvalidArgument { name: "offset", .. })
        ));
        assert!(matches!(
            line.write_at(&buf, 1, usize::MAX),
            Err(TransferError::InvalidArgument { name: "count", .. })
        ));
    }

    #[test]
    fn test_buffer_sizes_fixed_while_open() {
        let (_, line) = create_test_line();
        line.set_read_buffer_size(128).unwrap();
        line.open().unwrap();
        assert!(line.set_read_buffer_size(256).is_err());
        assert_eq!(line.read_buffer_size(), 128);
    }

    #[test]
    fn test_new_line_must_not_be_empty() {
        let (_, line) = create_test_line();
        assert!(line.set_new_line("").is_err());
        line.set_new_line("\r\n").unwrap();
        assert_eq!(line.new_line(), "\r\n");
    }

    #[test]
    fn test_io_traits() {
        use std::io::{Read, Write};

        let session = MockPortSession::new("LOOP").with_loopback();
        let mut line = SerialLine::with_connector("LOOP", Arc::new(MockConnector::new(session)));
        line.set_read_timeout(500).unwrap();
        line.open().unwrap();

        line.write_all(b"ping").unwrap();
        line.flush().unwrap();
        let mut buf = [0u8; 4];
        line.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"ping");
    }

    #[test]
    fn test_io_write_reports_bytes_queued_before_timeout() {
        use std::io::Write;

        let (session, line) = create_test_line();
        line.set_handshake(Handshake::XOnXOff).unwrap();
        line.set_write_buffer_size(4).unwrap();
        line.set_write_timeout(50).unwrap();
        line.open().unwrap();
        session.inject_received(&[crate::flow::XOFF]);

        assert_eq!((&line).write(b"abcd").unwrap(), 4);
        assert_eq!(line.bytes_to_write().unwrap(), 4);

        let err = (&line).write(b"efgh").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::TimedOut);
        assert_eq!(line.bytes_to_write().unwrap(), 4);

        session.inject_received(&[crate::flow::XON]);
        line.set_write_timeout(1000).unwrap();
        line.flush().unwrap();
        assert_eq!(session.written(), b"abcd");
    }
}
