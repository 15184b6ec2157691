//! Configuration schema definitions.
//!
//! This module defines the structure of the configuration file using serde.
//! All configuration sections are defined here with appropriate defaults.

use super::error::{ConfigError, ConfigKey, ConfigResult};
use crate::encoding::EncodingAdapter;
use crate::error::TransferResult;
use crate::flow::Handshake;
use crate::port::{DataBits, Parity, PortConfiguration, StopBits};
use crate::state::{
    default_baud, default_new_line, default_poll_interval_ms, default_read_buffer_size,
    default_write_buffer_size, LineSettings, WriteCompletion,
};
use crate::timeout::Timeout;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration structure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Serial line configuration
    pub line: LineConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
}

impl Config {
    /// Check every section, reporting the first offending key.
    pub fn validate(&self) -> ConfigResult<()> {
        self.line.validate()
    }
}

/// Serial line configuration section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LineConfig {
    /// Port to open (e.g. "/dev/ttyUSB0", "COM3")
    pub port_name: String,
    /// Baud rate
    pub baud_rate: u32,
    pub data_bits: DataBits,
    pub parity: Parity,
    pub stop_bits: StopBits,
    /// Handshake: "none", "request_to_send", "xon_xoff", "request_to_send_xon_xoff"
    pub handshake: Handshake,
    /// Encoding name, e.g. "us-ascii", "utf-8", "utf-16le"
    pub encoding: String,
    /// Read timeout in milliseconds (-1 = infinite)
    pub read_timeout_ms: i64,
    /// Write timeout in milliseconds (-1 = infinite)
    pub write_timeout_ms: i64,
    pub new_line: String,
    pub read_buffer_size: usize,
    pub write_buffer_size: usize,
    /// When a write counts as complete: "unstalled" or "enqueued"
    pub write_completion: WriteCompletion,
    /// Device read poll interval in milliseconds
    pub poll_interval_ms: u64,
}

impl Default for LineConfig {
    fn default() -> Self {
        Self {
            port_name: default_port_name(),
            baud_rate: default_baud(),
            data_bits: DataBits::Eight,
            parity: Parity::None,
            stop_bits: StopBits::One,
            handshake: Handshake::None,
            encoding: "us-ascii".to_string(),
            read_timeout_ms: -1,
            write_timeout_ms: -1,
            new_line: default_new_line(),
            read_buffer_size: default_read_buffer_size(),
            write_buffer_size: default_write_buffer_size(),
            write_completion: WriteCompletion::Unstalled,
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

fn default_port_name() -> String {
    if cfg!(windows) {
        "COM1".to_string()
    } else {
        "/dev/ttyS0".to_string()
    }
}

impl LineConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn port_configuration(&self) -> PortConfiguration {
        PortConfiguration {
            baud_rate: self.baud_rate,
            data_bits: self.data_bits,
            parity: self.parity,
            stop_bits: self.stop_bits,
            poll_interval: self.poll_interval(),
        }
    }

    /// Session settings described by this section.
    pub fn to_settings(&self) -> TransferResult<LineSettings> {
        Ok(LineSettings {
            port: self.port_configuration(),
            handshake: self.handshake,
            read_timeout: Timeout::from_millis(self.read_timeout_ms)?,
            write_timeout: Timeout::from_millis(self.write_timeout_ms)?,
            read_buffer_size: self.read_buffer_size,
            write_buffer_size: self.write_buffer_size,
            new_line: self.new_line.clone(),
            write_completion: self.write_completion,
        })
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.port_name.trim().is_empty() {
            return Err(ConfigError::validation(ConfigKey::PortName, "must not be empty"));
        }
        if self.baud_rate == 0 {
            return Err(ConfigError::validation(ConfigKey::BaudRate, "must be positive"));
        }
        if self.read_buffer_size == 0 {
            return Err(ConfigError::validation(ConfigKey::ReadBufferSize, "must be positive"));
        }
        if self.write_buffer_size == 0 {
            return Err(ConfigError::validation(ConfigKey::WriteBufferSize, "must be positive"));
        }
        for (key, ms) in [
            (ConfigKey::ReadTimeoutMs, self.read_timeout_ms),
            (ConfigKey::WriteTimeoutMs, self.write_timeout_ms),
        ] {
            if ms < -1 {
                return Err(ConfigError::validation(key, "must be -1 (infinite) or >= 0"));
            }
        }
        if self.new_line.is_empty() {
            return Err(ConfigError::validation(ConfigKey::NewLine, "must not be empty"));
        }
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::validation(ConfigKey::PollIntervalMs, "must be positive"));
        }
        EncodingAdapter::for_name(&self.encoding)
            .map_err(|e| ConfigError::validation(ConfigKey::Encoding, e.to_string()))?;
        Ok(())
    }
}

/// Logging configuration section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level or filter directive: "trace", "debug", "info", "warn", "error"
    pub level: String,
    /// Log format: "json", "pretty", "compact"
    pub format: LogFormat,
    /// Log file path (optional, stderr when unset)
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
            file: None,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// JSON format
    Json,
    /// Pretty format with colors
    #[default]
    Pretty,
    /// Compact format
    Compact,
}
