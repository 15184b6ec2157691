use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::engine::TransferEngine;
use crate::flow::Handshake;
use crate::port::PortConfiguration;
use crate::timeout::Timeout;

// Default line constants
pub const DEFAULT_BAUD_RATE: u32 = 9600;
pub const DEFAULT_READ_BUFFER_SIZE: usize = 4096;
pub const DEFAULT_WRITE_BUFFER_SIZE: usize = 2048;
pub const DEFAULT_NEW_LINE: &str = "\n";
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 10;

/// Default baud rate for serial port configuration (9600 bps).
pub fn default_baud() -> u32 {
    DEFAULT_BAUD_RATE
}

/// Default receive buffer capacity (4096 bytes).
pub fn default_read_buffer_size() -> usize {
    DEFAULT_READ_BUFFER_SIZE
}

/// Default transmit buffer capacity (2048 bytes).
pub fn default_write_buffer_size() -> usize {
    DEFAULT_WRITE_BUFFER_SIZE
}

/// Default line terminator for `write_line`/`read_line` (newline).
pub fn default_new_line() -> String {
    DEFAULT_NEW_LINE.into()
}

/// Default receive poll interval (10 ms).
pub fn default_poll_interval_ms() -> u64 {
    DEFAULT_POLL_INTERVAL_MS
}

/// Lifecycle of a transfer session.
///
/// `Closed` is terminal for a session; opening again creates a new one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Unopened,
    Open,
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unopened => write!(f, "unopened"),
            Self::Open => write!(f, "open"),
            Self::Closed => write!(f, "closed"),
        }
    }
}

/// When a Write call counts as complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum WriteCompletion {
    /// All bytes enqueued, and either they have left the transmit buffer or
    /// flow control is clear. A flow-control stall holds the call until its
    /// deadline.
    #[default]
    Unstalled,
    /// All bytes enqueued; only buffer capacity can hold the call.
    Enqueued,
}

impl fmt::Display for WriteCompletion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unstalled => write!(f, "unstalled"),
            Self::Enqueued => write!(f, "enqueued"),
        }
    }
}

impl FromStr for WriteCompletion {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "unstalled" => Ok(Self::Unstalled),
            "enqueued" => Ok(Self::Enqueued),
            other => Err(format!(
                "unknown write completion '{other}' (expected unstalled or enqueued)"
            )),
        }
    }
}

/// Everything a session needs besides its port and codec.
#[derive(Debug, Clone, PartialEq)]
pub struct LineSettings {
    pub port: PortConfiguration,
    pub handshake: Handshake,
    pub read_timeout: Timeout,
    pub write_timeout: Timeout,
    pub read_buffer_size: usize,
    pub write_buffer_size: usize,
    pub new_line: String,
    pub write_completion: WriteCompletion,
}

impl Default for LineSettings {
    fn default() -> Self {
        Self {
            port: PortConfiguration::default(),
            handshake: Handshake::None,
            read_timeout: Timeout::Infinite,
            write_timeout: Timeout::Infinite,
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
            write_buffer_size: DEFAULT_WRITE_BUFFER_SIZE,
            new_line: default_new_line(),
            write_completion: WriteCompletion::Unstalled,
        }
    }
}

/// What a caller-facing line currently holds.
#[derive(Debug, Default)]
pub enum LineState {
    /// Never opened, or the last open attempt failed.
    #[default]
    Unopened,
    Open(Arc<TransferEngine>),
    Closed,
}

impl LineState {
    pub fn session_state(&self) -> SessionState {
        match self {
            Self::Unopened => SessionState::Unopened,
            Self::Open(_) => SessionState::Open,
            Self::Closed => SessionState::Closed,
        }
    }

    pub fn engine(&self) -> Option<&Arc<TransferEngine>> {
        match self {
            Self::Open(engine) => Some(engine),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_state_display() {
        assert_eq!(SessionState::Unopened.to_string(), "unopened");
        assert_eq!(SessionState::Open.to_string(), "open");
        assert_eq!(SessionState::Closed.to_string(), "closed");
    }

    #[test]
    fn test_write_completion_parse() {
        assert_eq!("Enqueued".parse::<WriteCompletion>().unwrap(), WriteCompletion::Enqueued);
        assert_eq!(WriteCompletion::default(), WriteCompletion::Unstalled);
        assert!("eventually".parse::<WriteCompletion>().is_err());
    }

    #[test]
    fn test_default_settings() {
        let settings = LineSettings::default();
        assert_eq!(settings.read_buffer_size, 4096);
        assert_eq!(settings.write_buffer_size, 2048);
        assert_eq!(settings.new_line, "\n");
        assert!(settings.read_timeout.is_infinite());
        assert_eq!(settings.handshake, Handshake::None);
    }

    #[test]
    fn test_line_state_projection() {
        let state = LineState::default();
        assert_eq!(state.session_state(), SessionState::Unopened);
        assert!(state.engine().is_none());
        assert_eq!(LineState::Closed.session_state(), SessionState::Closed);
    }
}
