//! Serial Line Library
//!
//! Buffered, flow-controlled, timeout-governed transfer of bytes and encoded
//! text over a point-to-point serial connection.
//!
//! # Modules
//!
//! - `buffer`: bounded byte rings shared between callers and port activities
//! - `encoding`: text codecs and the validating `EncodingAdapter`
//! - `flow`: handshake modes and the `FlowControlGate`
//! - `timeout`: `Timeout` values and per-call `Deadline`s
//! - `engine`: the `TransferEngine` behind one open session
//! - `port`: the `PortSession` boundary, real ports and mocks
//! - `service`: `SerialLine`, the caller-facing port object
//! - `config`: Configuration management with TOML support
//! - `logging`: `tracing` subscriber setup
//! - `state`: session states and settings
//! - `error`: `TransferError` taxonomy
//!
//! # Example
//!
//! ```rust
//! use serial_line::{MockConnector, MockPortSession, SerialLine};
//! use std::sync::Arc;
//!
//! let wire = MockPortSession::new("LOOP").with_loopback();
//! let line = SerialLine::with_connector("LOOP", Arc::new(MockConnector::new(wire)));
//! line.set_read_timeout(500)?;
//! line.open()?;
//! line.write_line("ping")?;
//! assert_eq!(line.read_line()?, "ping");
//! line.close()?;
//! # Ok::<(), serial_line::TransferError>(())
//! ```

pub mod buffer;
pub mod config;
pub mod encoding;
pub mod engine;
pub mod error;
pub mod flow;
pub mod logging;
pub mod port;
pub mod service;
pub mod state;
pub mod timeout;

// Re-export commonly used types for convenience
pub use buffer::ByteRing;
pub use encoding::{EncodingAdapter, EncodingCodec};
pub use engine::{EngineMetrics, TransferEngine};
pub use error::{Operation, TransferError, TransferResult};
pub use flow::{FlowControlGate, GateCondition, Handshake, XOFF, XON};
pub use port::{
    DataBits, MockConnector, MockPortSession, NullModem, Parity, PortConfiguration,
    PortConnector, PortError, PortSession, SerialportConnector, Signal, StopBits,
};
pub use service::{LineStatus, SerialLine};
pub use state::{LineSettings, SessionState, WriteCompletion};
pub use timeout::{Deadline, Timeout};

#[cfg(feature = "async-serial")]
pub use service::async_line::AsyncSerialLine;

// Re-export config types
pub use config::{Config, ConfigError, ConfigKey, ConfigLoader, ConfigResult};
