//! Handshake (flow control) gate.
//!
//! The gate is a small tagged state value, `{mode, cts_holding, xon}`, with a
//! pure derived [`GateState::can_drain`]. Observations from the port boundary
//! arrive as [`GateEvent`] messages; each event is applied as one serialized
//! mutation under the gate's lock, so [`FlowControlGate::can_drain`] always
//! reflects the most recent observation.
//!
//! The gate never blocks anyone. It only reports whether buffered transmit
//! bytes may go onto the wire; the engine does the waiting.

use crate::port::Signal;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::debug;

/// Resume transmission (DC1).
pub const XON: u8 = 0x11;
/// Pause transmission (DC3).
pub const XOFF: u8 = 0x13;

/// Flow-control discipline governing when transmit bytes may be sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Handshake {
    /// Only local buffer capacity gates transmission.
    #[default]
    None,
    /// Hardware handshake on the remote clear-to-send line.
    RequestToSend,
    /// Software handshake with in-band XON/XOFF bytes.
    #[serde(rename = "xon_xoff")]
    XOnXOff,
    /// Both; transmission needs CTS asserted and no outstanding XOFF.
    #[serde(rename = "request_to_send_xon_xoff")]
    RequestToSendXOnXOff,
}

impl Handshake {
    pub const ALL: [Handshake; 4] = [
        Handshake::None,
        Handshake::RequestToSend,
        Handshake::XOnXOff,
        Handshake::RequestToSendXOnXOff,
    ];

    pub fn uses_rts(self) -> bool {
        matches!(self, Self::RequestToSend | Self::RequestToSendXOnXOff)
    }

    pub fn uses_xon_xoff(self) -> bool {
        matches!(self, Self::XOnXOff | Self::RequestToSendXOnXOff)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::RequestToSend => "request_to_send",
            Self::XOnXOff => "xon_xoff",
            Self::RequestToSendXOnXOff => "request_to_send_xon_xoff",
        }
    }
}

impl fmt::Display for Handshake {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Handshake {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace(['-', ' '], "_");
        match normalized.as_str() {
            "none" => Ok(Self::None),
            "request_to_send" | "rts" | "rts_cts" | "hardware" => Ok(Self::RequestToSend),
            "xon_xoff" | "xonxoff" | "software" => Ok(Self::XOnXOff),
            "request_to_send_xon_xoff" | "rts_xon_xoff" | "requesttosendxonxoff" => {
                Ok(Self::RequestToSendXOnXOff)
            }
            _ => Err(format!(
                "unknown handshake '{s}' (expected none, request_to_send, xon_xoff or request_to_send_xon_xoff)"
            )),
        }
    }
}

/// Whether the gate currently lets bytes through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GateCondition {
    Clear,
    Blocked,
}

/// An observation delivered to the gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateEvent {
    /// A modem-status line changed level.
    Signal { signal: Signal, asserted: bool },
    /// An XON or XOFF byte arrived from the remote.
    ControlByte(u8),
    /// The configured handshake changed.
    ModeChanged(Handshake),
    /// A session opened; re-derive from the current line levels.
    Reset { cts_holding: bool },
}

/// Live handshake state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct GateState {
    pub mode: Handshake,
    /// Remote clear-to-send level.
    pub cts_holding: bool,
    /// False after an XOFF until the next XON.
    pub xon: bool,
}

impl GateState {
    pub fn new(mode: Handshake, cts_holding: bool) -> Self {
        Self {
            mode,
            cts_holding,
            xon: true,
        }
    }

    /// Clear only if every sub-condition the mode uses is clear.
    pub fn can_drain(&self) -> bool {
        let rts_clear = !self.mode.uses_rts() || self.cts_holding;
        let xon_clear = !self.mode.uses_xon_xoff() || self.xon;
        rts_clear && xon_clear
    }

    pub fn condition(&self) -> GateCondition {
        if self.can_drain() {
            GateCondition::Clear
        } else {
            GateCondition::Blocked
        }
    }

    /// The state after observing `event`.
    pub fn apply(self, event: GateEvent) -> Self {
        match event {
            GateEvent::Signal {
                signal: Signal::ClearToSend,
                asserted,
            } => Self {
                cts_holding: asserted,
                ..self
            },
            GateEvent::Signal { .. } => self,
            GateEvent::ControlByte(XOFF) if self.mode.uses_xon_xoff() => Self { xon: false, ..self },
            GateEvent::ControlByte(XON) if self.mode.uses_xon_xoff() => Self { xon: true, ..self },
            GateEvent::ControlByte(_) => self,
            GateEvent::ModeChanged(mode) => Self {
                mode,
                // XOFF bytes seen outside a software-handshake mode were data.
                xon: if mode.uses_xon_xoff() && !self.mode.uses_xon_xoff() {
                    true
                } else {
                    self.xon
                },
                ..self
            },
            GateEvent::Reset { cts_holding } => Self::new(self.mode, cts_holding),
        }
    }
}

/// The gate condition before and after one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub before: GateCondition,
    pub after: GateCondition,
}

impl Transition {
    /// The event unblocked the transmit path.
    pub fn cleared(&self) -> bool {
        self.before == GateCondition::Blocked && self.after == GateCondition::Clear
    }

    pub fn blocked(&self) -> bool {
        self.before == GateCondition::Clear && self.after == GateCondition::Blocked
    }
}

/// Summary of filtering one inbound chunk.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InboundFilter {
    /// XON/XOFF bytes removed from the data stream.
    pub control_bytes: usize,
    /// Some control byte unblocked the transmit path.
    pub cleared: bool,
}

/// Thread-safe owner of the live [`GateState`].
#[derive(Debug)]
pub struct FlowControlGate {
    state: Mutex<GateState>,
}

impl FlowControlGate {
    pub fn new(mode: Handshake, cts_holding: bool) -> Self {
        Self {
            state: Mutex::new(GateState::new(mode, cts_holding)),
        }
    }

    /// Pure query of the current condition.
    pub fn can_drain(&self) -> bool {
        self.state.lock().can_drain()
    }

    pub fn snapshot(&self) -> GateState {
        *self.state.lock()
    }

    pub fn mode(&self) -> Handshake {
        self.state.lock().mode
    }

    pub fn cts_holding(&self) -> bool {
        self.state.lock().cts_holding
    }

    /// Apply one observation as a single serialized mutation.
    pub fn apply(&self, event: GateEvent) -> Transition {
        let mut state = self.state.lock();
        let before = state.condition();
        *state = state.apply(event);
        let after = state.condition();
        drop(state);

        if before != after {
            debug!(?event, ?before, ?after, "flow control gate changed");
        }
        Transition { before, after }
    }

    pub fn on_signal_changed(&self, signal: Signal, asserted: bool) -> Transition {
        self.apply(GateEvent::Signal { signal, asserted })
    }

    pub fn on_control_byte_observed(&self, byte: u8) -> Transition {
        self.apply(GateEvent::ControlByte(byte))
    }

    pub fn set_mode(&self, mode: Handshake) -> Transition {
        self.apply(GateEvent::ModeChanged(mode))
    }

    pub fn reset(&self, cts_holding: bool) -> Transition {
        self.apply(GateEvent::Reset { cts_holding })
    }

    /// Split an inbound chunk into data and protocol bytes.
    ///
    /// Under a software-handshake mode XON/XOFF bytes are fed to the gate and
    /// left out of `data`; otherwise every byte is data.
    pub fn filter_inbound(&self, bytes: &[u8], data: &mut Vec<u8>) -> InboundFilter {
        let mut summary = InboundFilter::default();
        if !self.mode().uses_xon_xoff() {
            data.extend_from_slice(bytes);
            return summary;
        }
        for &byte in bytes {
            if byte == XON || byte == XOFF {
                summary.control_bytes += 1;
                summary.cleared |= self.on_control_byte_observed(byte).cleared();
            } else {
                data.push(byte);
            }
        }
        summary
    }
}
