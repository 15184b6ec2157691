//! Async access to a [`SerialLine`].
//!
//! Every call runs the blocking operation on Tokio's blocking thread pool, so
//! a read waiting out its timeout never stalls the async runtime.
//!
//! Note: This module is gated behind the `async-serial` feature flag.

use super::SerialLine;
use crate::error::{TransferError, TransferResult};
use crate::port::PortError;
use std::sync::Arc;

/// Async wrapper sharing one [`SerialLine`].
#[derive(Debug, Clone)]
pub struct AsyncSerialLine {
    inner: Arc<SerialLine>,
}

impl AsyncSerialLine {
    pub fn new(line: SerialLine) -> Self {
        Self {
            inner: Arc::new(line),
        }
    }

    pub fn from_shared(line: Arc<SerialLine>) -> Self {
        Self { inner: line }
    }

    /// The wrapped line, for property access that never blocks.
    pub fn line(&self) -> &SerialLine {
        &self.inner
    }

    async fn run<T, F>(&self, op: F) -> TransferResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&SerialLine) -> TransferResult<T> + Send + 'static,
    {
        let line = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || op(&line))
            .await
            .map_err(|e| TransferError::from(PortError::Io(std::io::Error::other(e.to_string()))))?
    }

    pub async fn open(&self) -> TransferResult<()> {
        self.run(|line| line.open()).await
    }

    pub async fn close(&self) -> TransferResult<()> {
        self.run(|line| line.close()).await
    }

    pub async fn write_bytes(&self, data: Vec<u8>) -> TransferResult<()> {
        self.run(move |line| line.write_bytes(&data)).await
    }

    pub async fn write_str(&self, text: String) -> TransferResult<()> {
        self.run(move |line| line.write_str(&text)).await
    }

    pub async fn write_line(&self, text: String) -> TransferResult<()> {
        self.run(move |line| line.write_line(&text)).await
    }

    /// Read at least one and at most `max` bytes.
    pub async fn read_bytes(&self, max: usize) -> TransferResult<Vec<u8>> {
        self.run(move |line| {
            let mut buf = vec![0u8; max];
            let n = line.read_at(&mut buf, 0, max)?;
            buf.truncate(n);
            Ok(buf)
        })
        .await
    }

    pub async fn read_line(&self) -> TransferResult<String> {
        self.run(|line| line.read_line()).await
    }

    pub async fn flush(&self) -> TransferResult<()> {
        self.run(|line| line.flush()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::{MockConnector, MockPortSession};

    fn loopback_line() -> AsyncSerialLine {
        let session = MockPortSession::new("LOOP").with_loopback();
        let line = SerialLine::with_connector("LOOP", Arc::new(MockConnector::new(session)));
        line.set_read_timeout(1000).unwrap();
        AsyncSerialLine::new(line)
    }

    #[tokio::test]
    async fn test_async_round_trip() {
        let line = loopback_line();
        line.open().await.unwrap();
        line.write_line("hello".to_string()).await.unwrap();
        assert_eq!(line.read_line().await.unwrap(), "hello");
        line.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_async_read_timeout() {
        let line = loopback_line();
        line.line().set_read_timeout(20).unwrap();
        line.open().await.unwrap();
        let err = line.read_bytes(4).await.unwrap_err();
        assert!(err.is_timeout());
    }

    #[test]
    fn test_async_not_open() {
        let line = loopback_line();
        let result = tokio_test::block_on(line.write_str("x".to_string()));
        assert!(matches!(result, Err(TransferError::InvalidState { .. })));
    }
}
