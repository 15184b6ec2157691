//! Core traits for the port boundary.
//!
//! Defines the [`PortSession`] trait through which the transfer engine
//! reaches the wire, and [`PortConnector`] which opens one. Both real
//! `serialport`-backed sessions and in-memory mocks implement them, so the
//! engine never knows which it is talking to.

use super::error::PortError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Configuration parameters handed to a [`PortConnector`].
///
/// OS-level flow control is deliberately absent: the engine's flow-control
/// gate is the only handshake authority, so real ports are always opened with
/// `serialport::FlowControl::None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortConfiguration {
    /// Baud rate (bits per second).
    pub baud_rate: u32,

    /// Number of data bits (5, 6, 7, or 8).
    pub data_bits: DataBits,

    /// Parity checking mode.
    pub parity: Parity,

    /// Number of stop bits.
    pub stop_bits: StopBits,

    /// How long the receive activity blocks in one device read before it
    /// re-checks modem lines and the open flag.
    pub poll_interval: Duration,
}

impl Default for PortConfiguration {
    fn default() -> Self {
        Self {
            baud_rate: 9600,
            data_bits: DataBits::Eight,
            parity: Parity::None,
            stop_bits: StopBits::One,
            poll_interval: Duration::from_millis(10),
        }
    }
}

/// Number of data bits per character.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DataBits {
    Five,
    Six,
    Seven,
    #[default]
    Eight,
}

impl From<DataBits> for serialport::DataBits {
    fn from(bits: DataBits) -> Self {
        match bits {
            DataBits::Five => serialport::DataBits::Five,
            DataBits::Six => serialport::DataBits::Six,
            DataBits::Seven => serialport::DataBits::Seven,
            DataBits::Eight => serialport::DataBits::Eight,
        }
    }
}

/// Parity checking modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Parity {
    #[default]
    None,
    Odd,
    Even,
}

impl From<Parity> for serialport::Parity {
    fn from(parity: Parity) -> Self {
        match parity {
            Parity::None => serialport::Parity::None,
            Parity::Odd => serialport::Parity::Odd,
            Parity::Even => serialport::Parity::Even,
        }
    }
}

/// Number of stop bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StopBits {
    #[default]
    One,
    Two,
}

impl From<StopBits> for serialport::StopBits {
    fn from(bits: StopBits) -> Self {
        match bits {
            StopBits::One => serialport::StopBits::One,
            StopBits::Two => serialport::StopBits::Two,
        }
    }
}

/// Modem-status input lines a session reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Signal {
    ClearToSend,
    DataSetReady,
    CarrierDetect,
    RingIndicator,
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::ClearToSend => "CTS",
            Self::DataSetReady => "DSR",
            Self::CarrierDetect => "CD",
            Self::RingIndicator => "RI",
        };
        f.write_str(name)
    }
}

/// Current levels of the modem-status input lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ControlSignals {
    pub clear_to_send: bool,
    pub data_set_ready: bool,
    pub carrier_detect: bool,
    pub ring_indicator: bool,
}

impl ControlSignals {
    pub fn level(&self, signal: Signal) -> bool {
        match signal {
            Signal::ClearToSend => self.clear_to_send,
            Signal::DataSetReady => self.data_set_ready,
            Signal::CarrierDetect => self.carrier_detect,
            Signal::RingIndicator => self.ring_indicator,
        }
    }

    pub fn set(&mut self, signal: Signal, asserted: bool) {
        match signal {
            Signal::ClearToSend => self.clear_to_send = asserted,
            Signal::DataSetReady => self.data_set_ready = asserted,
            Signal::CarrierDetect => self.carrier_detect = asserted,
            Signal::RingIndicator => self.ring_indicator = asserted,
        }
    }
}

/// Callback invoked with every chunk of bytes that arrives from the wire.
pub type ReceiveCallback = Box<dyn Fn(&[u8]) + Send + Sync>;

/// Callback invoked whenever a modem-status line changes level.
pub type SignalCallback = Box<dyn Fn(Signal, bool) + Send + Sync>;

/// An open connection to one serial line.
///
/// Implementations use interior mutability: the engine shares one session
/// between the callers' threads, its drain activity and the session's own
/// receive activity.
pub trait PortSession: Send + Sync + fmt::Debug {
    /// The name/path of the port.
    fn name(&self) -> &str;

    /// Put bytes on the wire.
    ///
    /// Returns how many bytes were actually accepted, which may be fewer than
    /// offered; the caller retries the remainder.
    fn send_raw(&self, bytes: &[u8]) -> Result<usize, PortError>;

    /// Install the callback that receives inbound bytes, replacing any
    /// previous one.
    fn register_receive_callback(&self, callback: ReceiveCallback);

    /// Install the callback that receives modem-status changes, replacing
    /// any previous one.
    fn register_signal_callback(&self, callback: SignalCallback);

    fn is_open(&self) -> bool;

    /// Current modem-status levels.
    fn signals(&self) -> ControlSignals;

    /// Drive the local request-to-send output line.
    fn set_request_to_send(&self, asserted: bool) -> Result<(), PortError>;

    /// Release the device. Idempotent.
    fn close(&self) -> Result<(), PortError>;
}

/// Opens [`PortSession`]s by name.
pub trait PortConnector: Send + Sync {
    fn connect(
        &self,
        port_name: &str,
        config: &PortConfiguration,
    ) -> Result<std::sync::Arc<dyn PortSession>, PortError>;
}

impl<F> PortConnector for F
where
    F: Fn(&str, &PortConfiguration) -> Result<std::sync::Arc<dyn PortSession>, PortError>
        + Send
        + Sync,
{
    fn connect(
        &self,
        port_name: &str,
        config: &PortConfiguration,
    ) -> Result<std::sync::Arc<dyn PortSession>, PortError> {
        self(port_name, config)
    }
}
