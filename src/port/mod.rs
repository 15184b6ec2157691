//! Port boundary for serial communication.
//!
//! The transfer engine never opens a device itself. It talks to an open
//! [`PortSession`], obtained from a [`PortConnector`], which can be a real
//! `serialport` device or an in-memory mock.

pub mod error;
pub mod mock;
pub mod sync_port;
pub mod traits;

pub use error::PortError;
pub use mock::{MockConnector, MockPortSession, NullModem};
pub use sync_port::{SerialportConnector, SerialportSession};
pub use traits::*;
