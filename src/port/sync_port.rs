//! Hardware-backed port session.
//!
//! Wraps the `serialport` crate. Writes go straight to the device; a named
//! reader thread polls the device for inbound bytes and the clear-to-send
//! line, and reports both through the registered callbacks.

use super::error::PortError;
use super::traits::{
    ControlSignals, PortConfiguration, PortConnector, PortSession, ReceiveCallback, Signal,
    SignalCallback,
};
use parking_lot::Mutex;
use std::io::{Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info, warn};

const READ_CHUNK: usize = 1024;

type SharedReceive = Arc<dyn Fn(&[u8]) + Send + Sync>;
type SharedSignal = Arc<dyn Fn(Signal, bool) + Send + Sync>;

/// State shared with the reader thread.
#[derive(Default)]
struct ReaderShared {
    open: AtomicBool,
    on_receive: Mutex<Option<SharedReceive>>,
    on_signal: Mutex<Option<SharedSignal>>,
    signals: Mutex<ControlSignals>,
    /// Bytes read before a receive callback was registered.
    undelivered: Mutex<Vec<u8>>,
}

impl ReaderShared {
    fn deliver(&self, bytes: &[u8]) {
        let callback = self.on_receive.lock().clone();
        match callback {
            Some(callback) => callback(bytes),
            None => self.undelivered.lock().extend_from_slice(bytes),
        }
    }

    fn update_signals(&self, now: ControlSignals) {
        let changed: Vec<(Signal, bool)> = {
            let mut signals = self.signals.lock();
            let changed = [
                Signal::ClearToSend,
                Signal::DataSetReady,
                Signal::CarrierDetect,
                Signal::RingIndicator,
            ]
            .into_iter()
            .filter(|&s| signals.level(s) != now.level(s))
            .map(|s| (s, now.level(s)))
            .collect();
            *signals = now;
            changed
        };
        if changed.is_empty() {
            return;
        }
        let callback = self.on_signal.lock().clone();
        for (signal, asserted) in changed {
            debug!(%signal, asserted, "modem line changed");
            if let Some(callback) = &callback {
                callback(signal, asserted);
            }
        }
    }
}

fn read_signals(port: &mut dyn serialport::SerialPort) -> Result<ControlSignals, PortError> {
    Ok(ControlSignals {
        clear_to_send: port.read_clear_to_send()?,
        data_set_ready: port.read_data_set_ready()?,
        carrier_detect: port.read_carrier_detect()?,
        ring_indicator: port.read_ring_indicator()?,
    })
}

/// A [`PortSession`] over a real serial device.
pub struct SerialportSession {
    name: String,
    writer: Mutex<Box<dyn serialport::SerialPort>>,
    shared: Arc<ReaderShared>,
    reader: Mutex<Option<JoinHandle<()>>>,
}

impl SerialportSession {
    /// Open a serial port with the given configuration.
    ///
    /// # Arguments
    /// * `port_name` - The system path to the serial port (e.g., "/dev/ttyUSB0" or "COM3")
    /// * `config` - Line parameters for the port
    ///
    /// # Example
    /// ```no_run
    /// use serial_line::port::{PortConfiguration, SerialportSession};
    ///
    /// let session = SerialportSession::open("/dev/ttyUSB0", &PortConfiguration::default())?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn open(port_name: &str, config: &PortConfiguration) -> Result<Self, PortError> {
        let mut port = serialport::new(port_name, config.baud_rate)
            .data_bits(config.data_bits.into())
            .flow_control(serialport::FlowControl::None)
            .parity(config.parity.into())
            .stop_bits(config.stop_bits.into())
            .timeout(config.poll_interval)
            .open()
            .map_err(|e| PortError::from_open_error(port_name, e))?;

        let initial = read_signals(port.as_mut()).unwrap_or_default();
        let reader_port = port.try_clone()?;

        let shared = Arc::new(ReaderShared {
            open: AtomicBool::new(true),
            signals: Mutex::new(initial),
            ..Default::default()
        });

        let reader = spawn_reader(port_name, reader_port, Arc::clone(&shared), config.poll_interval)?;

        info!(port = port_name, baud = config.baud_rate, "serial device opened");
        Ok(Self {
            name: port_name.to_string(),
            writer: Mutex::new(port),
            shared,
            reader: Mutex::new(Some(reader)),
        })
    }
}

fn spawn_reader(
    port_name: &str,
    mut port: Box<dyn serialport::SerialPort>,
    shared: Arc<ReaderShared>,
    poll_interval: Duration,
) -> Result<JoinHandle<()>, PortError> {
    let name = port_name.to_string();
    let handle = thread::Builder::new()
        .name(format!("serial-rx-{name}"))
        .spawn(move || {
            let mut buf = [0u8; READ_CHUNK];
            while shared.open.load(Ordering::Acquire) {
                match port.read(&mut buf) {
                    Ok(0) => {}
                    Ok(n) => shared.deliver(&buf[..n]),
                    Err(e) if e.kind() == std::io::ErrorKind::TimedOut => {}
                    Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                    Err(e) => {
                        if shared.open.load(Ordering::Acquire) {
                            warn!(port = %name, error = %e, "serial read failed");
                            thread::sleep(poll_interval);
                        }
                    }
                }
                match read_signals(port.as_mut()) {
                    Ok(now) => shared.update_signals(now),
                    Err(e) => debug!(port = %name, error = %e, "could not poll modem lines"),
                }
            }
            debug!(port = %name, "serial reader stopped");
        })?;
    Ok(handle)
}

impl PortSession for SerialportSession {
    fn name(&self) -> &str {
        &self.name
    }

    fn send_raw(&self, bytes: &[u8]) -> Result<usize, PortError> {
        if !self.is_open() {
            return Err(PortError::NotOpen);
        }
        match self.writer.lock().write(bytes) {
            Ok(n) => Ok(n),
            Err(e) if e.kind() == std::io::ErrorKind::TimedOut => Ok(0),
            Err(e) => Err(PortError::Io(e)),
        }
    }

    fn register_receive_callback(&self, callback: ReceiveCallback) {
        let callback: SharedReceive = Arc::from(callback);
        *self.shared.on_receive.lock() = Some(Arc::clone(&callback));
        let held = std::mem::take(&mut *self.shared.undelivered.lock());
        if !held.is_empty() {
            callback(&held);
        }
    }

    fn register_signal_callback(&self, callback: SignalCallback) {
        *self.shared.on_signal.lock() = Some(Arc::from(callback));
    }

    fn is_open(&self) -> bool {
        self.shared.open.load(Ordering::Acquire)
    }

    fn signals(&self) -> ControlSignals {
        *self.shared.signals.lock()
    }

    fn set_request_to_send(&self, asserted: bool) -> Result<(), PortError> {
        if !self.is_open() {
            return Err(PortError::NotOpen);
        }
        self.writer.lock().write_request_to_send(asserted)?;
        Ok(())
    }

    fn close(&self) -> Result<(), PortError> {
        if !self.shared.open.swap(false, Ordering::AcqRel) {
            return Ok(());
        }
        *self.shared.on_receive.lock() = None;
        *self.shared.on_signal.lock() = None;
        if let Some(handle) = self.reader.lock().take() {
            if handle.thread().id() != thread::current().id() && handle.join().is_err() {
                warn!(port = %self.name, "serial reader panicked");
            }
        }
        info!(port = %self.name, "serial device closed");
        Ok(())
    }
}

impl Drop for SerialportSession {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

impl std::fmt::Debug for SerialportSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialportSession")
            .field("name", &self.name)
            .field("open", &self.is_open())
            .finish()
    }
}

/// Opens [`SerialportSession`]s on real devices.
#[derive(Debug, Clone, Copy, Default)]
pub struct SerialportConnector;

impl PortConnector for SerialportConnector {
    fn connect(
        &self,
        port_name: &str,
        config: &PortConfiguration,
    ) -> Result<Arc<dyn PortSession>, PortError> {
        Ok(Arc::new(SerialportSession::open(port_name, config)?))
    }
}
