//! Byte buffering for the transmit and receive paths.
//!
//! [`ByteRing`] is the plain single-owner FIFO. [`SharedRing`] wraps one ring
//! in its own lock and condition variable so the caller-facing operations and
//! the receive/drain activities can share it.

pub mod ring;
pub mod shared;

pub use ring::ByteRing;
pub use shared::{RingState, SharedRing};
