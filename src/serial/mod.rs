//! Serial Link
//!
//! Connection to the serial-controlled peripheral (optical channel selector):
//! port enumeration, open/close, fire-and-forget writes and received-data
//! notifications from a reader thread.
//!
//! Every operation updates a human readable status string, mirroring what an
//! operator would see next to the connect button. Failures are returned to the
//! caller and never touch the camera session.
//!
//! - [`backend`]: port discovery/opening (`serialport` or in-memory)
//! - [`channel`]: `CHAN:<index>\r\n` commands
//! - [`mock`]: in-memory ports for tests

pub mod backend;
pub mod channel;
pub mod mock;

use std::io::{self, Read, Write};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};

use crate::error::{RigError, RigResult};

pub use backend::{PortBackend, SerialStream, SystemPorts};
pub use channel::{OpticalChannel, channel_command};

/// Payloads at least this long are truncated in the status string.
const STATUS_PAYLOAD_LIMIT: usize = 24;

/// Bytes of a truncated payload kept in the status string.
const STATUS_PAYLOAD_KEEP: usize = 21;

/// Read chunk size of the reader thread.
const READ_CHUNK: usize = 1024;

// =============================================================================
// Types
// =============================================================================

/// A port as shown to the operator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortInfo {
    /// Short name, e.g. `ttyUSB0` or `COM3`.
    pub name: String,
    /// Path used to open the port, e.g. `/dev/ttyUSB0`.
    pub system_location: String,
    /// Driver supplied description, possibly empty.
    pub description: String,
}

impl PortInfo {
    /// Derive the short name from the last path component of `location`.
    pub fn from_location(location: &str, description: impl Into<String>) -> Self {
        let name = Path::new(location)
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(location)
            .to_string();
        Self {
            name,
            system_location: location.to_string(),
            description: description.into(),
        }
    }

    /// `name  description`, or just the name.
    pub fn label(&self) -> String {
        if self.description.is_empty() {
            self.name.clone()
        } else {
            format!("{}  {}", self.name, self.description)
        }
    }
}

/// Line settings. Framing is fixed at 8N1 without flow control.
#[derive(Debug, Clone, PartialEq)]
pub struct SerialSettings {
    /// Line speed.
    pub baud_rate: u32,
    /// Reader thread poll timeout.
    pub read_timeout: Duration,
    /// Bound on a single write.
    pub write_timeout: Duration,
}

impl Default for SerialSettings {
    fn default() -> Self {
        Self {
            baud_rate: 115_200,
            read_timeout: Duration::from_millis(100),
            write_timeout: Duration::from_millis(100),
        }
    }
}

/// Notifications from the serial link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SerialEvent {
    /// Bytes read from the open port, in arrival order.
    DataReceived(Vec<u8>),
}

/// Render a payload for the status line: escaped ASCII, truncated when long.
pub fn display_payload(data: &[u8]) -> String {
    if data.len() < STATUS_PAYLOAD_LIMIT {
        data.escape_ascii().to_string()
    } else {
        format!("{}...", data[..STATUS_PAYLOAD_KEEP].escape_ascii())
    }
}

// =============================================================================
// Serial Link
// =============================================================================

struct Connection {
    label: String,
    stream: Box<dyn SerialStream>,
    running: Arc<AtomicBool>,
    reader: Option<JoinHandle<()>>,
}

impl Connection {
    fn shutdown(mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(reader) = self.reader.take() {
            if reader.join().is_err() {
                tracing::error!(port = %self.label, "Serial reader thread panicked");
            }
        }
    }
}

/// One serial connection at a time, with a status line.
pub struct SerialLink {
    backend: Arc<dyn PortBackend>,
    settings: SerialSettings,
    connection: Mutex<Option<Connection>>,
    status: Mutex<String>,
    events: UnboundedSender<SerialEvent>,
}

impl SerialLink {
    /// A disconnected link and the receiver for its events.
    pub fn new(
        backend: Arc<dyn PortBackend>,
        settings: SerialSettings,
    ) -> (Self, UnboundedReceiver<SerialEvent>) {
        let (events, receiver) = tokio::sync::mpsc::unbounded_channel();
        let link = Self {
            backend,
            settings,
            connection: Mutex::new(None),
            status: Mutex::new("Disconnected".into()),
            events,
        };
        (link, receiver)
    }

    /// Ports the backend can see.
    pub fn list_ports(&self) -> RigResult<Vec<PortInfo>> {
        let ports = self.backend.available_ports()?;
        tracing::debug!(count = ports.len(), "Serial ports enumerated");
        Ok(ports)
    }

    /// Current status line.
    pub fn status(&self) -> String {
        self.status.lock().clone()
    }

    /// Whether a port is open.
    pub fn is_connected(&self) -> bool {
        self.connection.lock().is_some()
    }

    fn set_status(&self, status: String) {
        tracing::debug!(%status, "Serial status");
        *self.status.lock() = status;
    }

    /// Open a port by short name or system location, closing any open one.
    ///
    /// A selector that matches no enumerated port is opened as a path.
    ///
    /// # Errors
    ///
    /// [`RigError::SerialOpenFailed`] when nothing is selected or the port
    /// cannot be opened.
    pub fn open(&self, selector: Option<&str>) -> RigResult<()> {
        let Some(selector) = selector.filter(|s| !s.is_empty()) else {
            self.set_status("No port selected".into());
            return Err(RigError::SerialOpenFailed {
                port: String::new(),
                reason: "no port selected".into(),
            });
        };

        let mut connection = self.connection.lock();
        if let Some(previous) = connection.take() {
            tracing::info!(port = %previous.label, "Closing port before reopening");
            previous.shutdown();
        }

        let (label, location) = self.resolve(selector);
        let mut stream = match self.backend.open(&location, &self.settings) {
            Ok(stream) => stream,
            Err(e) => {
                let reason = match &e {
                    RigError::SerialOpenFailed { reason, .. } => reason.clone(),
                    other => other.to_string(),
                };
                tracing::warn!(port = %location, %reason, "Serial open failed");
                self.set_status(format!("Connection failed: {reason}"));
                return Err(e);
            }
        };

        if let Err(e) = stream.assert_control_lines() {
            tracing::debug!(port = %location, error = %e, "Could not assert DTR/RTS");
        }

        let running = Arc::new(AtomicBool::new(true));
        let reader = match self.spawn_reader(stream.as_ref(), &label, running.clone()) {
            Ok(reader) => Some(reader),
            Err(e) => {
                tracing::warn!(port = %location, error = %e, "No reader for serial port");
                None
            }
        };

        tracing::info!(port = %location, baud = self.settings.baud_rate, "Serial port connected");
        *connection = Some(Connection {
            label: label.clone(),
            stream,
            running,
            reader,
        });
        self.set_status(format!("Connected: {label}"));
        Ok(())
    }

    /// Map a selector onto `(display name, location)`.
    fn resolve(&self, selector: &str) -> (String, String) {
        let ports = self.backend.available_ports().unwrap_or_default();
        ports
            .into_iter()
            .find(|p| p.system_location == selector || p.name == selector)
            .map(|p| (p.name, p.system_location))
            .unwrap_or_else(|| (selector.to_string(), selector.to_string()))
    }

    fn spawn_reader(
        &self,
        stream: &dyn SerialStream,
        label: &str,
        running: Arc<AtomicBool>,
    ) -> io::Result<JoinHandle<()>> {
        let mut reader = stream.try_clone_stream()?;
        reader.set_timeout(self.settings.read_timeout)?;
        let events = self.events.clone();
        let port = label.to_string();
        thread::Builder::new()
            .name(format!("serial-reader-{label}"))
            .spawn(move || read_loop(reader.as_mut(), &port, &running, &events))
    }

    /// Close the port. Safe to call when already closed.
    pub fn close(&self) {
        if let Some(connection) = self.connection.lock().take() {
            tracing::info!(port = %connection.label, "Serial port disconnected");
            connection.shutdown();
        }
        self.set_status("Disconnected".into());
    }

    /// Write `data` in full and flush it.
    ///
    /// # Errors
    ///
    /// [`RigError::SerialPortNotConnected`] or [`RigError::SerialWriteFailed`];
    /// neither closes the port.
    pub fn write(&self, data: &[u8]) -> RigResult<usize> {
        let mut connection = self.connection.lock();
        let Some(connection) = connection.as_mut() else {
            self.set_status("Not connected, cannot send".into());
            return Err(RigError::SerialPortNotConnected);
        };

        tracing::debug!(port = %connection.label, payload = %data.escape_ascii(), "Serial TX");
        let written = connection
            .stream
            .write_all(data)
            .and_then(|()| connection.stream.flush());
        match written {
            Ok(()) => {
                self.set_status(format!("Sent {}B: {}", data.len(), display_payload(data)));
                Ok(data.len())
            }
            Err(e) => {
                tracing::warn!(port = %connection.label, error = %e, "Serial write failed");
                self.set_status("Send failed".into());
                Err(RigError::SerialWriteFailed(e.to_string()))
            }
        }
    }

    /// Switch the optical channel selector.
    pub fn select_channel(&self, channel: OpticalChannel) -> RigResult<usize> {
        tracing::info!(%channel, index = channel.index(), "Selecting optical channel");
        self.write(&channel.command())
    }
}

impl Drop for SerialLink {
    fn drop(&mut self) {
        if let Some(connection) = self.connection.get_mut().take() {
            connection.shutdown();
        }
    }
}

fn read_loop(
    stream: &mut dyn SerialStream,
    port: &str,
    running: &AtomicBool,
    events: &UnboundedSender<SerialEvent>,
) {
    let mut buffer = [0u8; READ_CHUNK];
    while running.load(Ordering::SeqCst) {
        match stream.read(&mut buffer) {
            Ok(0) => {}
            Ok(n) => {
                let data = buffer[..n].to_vec();
                tracing::debug!(port, payload = %data.escape_ascii(), "Serial RX");
                let _ = events.send(SerialEvent::DataReceived(data));
            }
            Err(e) if matches!(e.kind(), io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock) => {}
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => {
                tracing::warn!(port, error = %e, "Serial read failed, reader stopping");
                break;
            }
        }
    }
}
