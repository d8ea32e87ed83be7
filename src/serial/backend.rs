//! Serial port backends.
//!
//! [`PortBackend`] enumerates and opens ports; [`SerialStream`] is one open
//! port. The system backend wraps the `serialport` crate and is only built with
//! the `instrument_serial` feature. [`crate::serial::mock::MockPorts`] provides
//! in-memory ports for tests.

use std::io::{self, Read, Write};
use std::time::Duration;

use crate::error::RigResult;
use crate::serial::{PortInfo, SerialSettings};

/// An open serial port.
pub trait SerialStream: Read + Write + Send {
    /// Second handle onto the same port, for a reader thread.
    fn try_clone_stream(&self) -> io::Result<Box<dyn SerialStream>>;

    /// Timeout for blocking reads and writes on this handle.
    fn set_timeout(&mut self, timeout: Duration) -> io::Result<()>;

    /// Raise DTR and RTS. Some adapters stay silent until both are set.
    fn assert_control_lines(&mut self) -> io::Result<()>;
}

/// Port discovery and opening.
pub trait PortBackend: Send + Sync {
    /// Ports currently present on the system.
    fn available_ports(&self) -> RigResult<Vec<PortInfo>>;

    /// Open `location` as 8N1 without flow control at the configured baud
    /// rate, using the write timeout.
    fn open(&self, location: &str, settings: &SerialSettings) -> RigResult<Box<dyn SerialStream>>;
}

// =============================================================================
// System Ports
// =============================================================================

/// Hardware serial ports through the `serialport` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemPorts;

#[cfg(feature = "instrument_serial")]
struct SystemStream(Box<dyn serialport::SerialPort>);

#[cfg(feature = "instrument_serial")]
impl Read for SystemStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.0.read(buf)
    }
}

#[cfg(feature = "instrument_serial")]
impl Write for SystemStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.0.flush()
    }
}

#[cfg(feature = "instrument_serial")]
impl SerialStream for SystemStream {
    fn try_clone_stream(&self) -> io::Result<Box<dyn SerialStream>> {
        let clone = self.0.try_clone().map_err(io::Error::from)?;
        Ok(Box::new(SystemStream(clone)))
    }

    fn set_timeout(&mut self, timeout: Duration) -> io::Result<()> {
        self.0.set_timeout(timeout).map_err(io::Error::from)
    }

    fn assert_control_lines(&mut self) -> io::Result<()> {
        self.0.write_data_terminal_ready(true).map_err(io::Error::from)?;
        self.0.write_request_to_send(true).map_err(io::Error::from)
    }
}

#[cfg(feature = "instrument_serial")]
fn describe(port_type: &serialport::SerialPortType) -> String {
    use serialport::SerialPortType;

    match port_type {
        SerialPortType::UsbPort(info) => {
            let parts: Vec<&str> = [info.manufacturer.as_deref(), info.product.as_deref()]
                .into_iter()
                .flatten()
                .collect();
            if parts.is_empty() {
                format!("USB {:04x}:{:04x}", info.vid, info.pid)
            } else {
                parts.join(" ")
            }
        }
        SerialPortType::PciPort => "PCI serial port".into(),
        SerialPortType::BluetoothPort => "Bluetooth serial port".into(),
        SerialPortType::Unknown => String::new(),
    }
}

impl PortBackend for SystemPorts {
    fn available_ports(&self) -> RigResult<Vec<PortInfo>> {
        #[cfg(feature = "instrument_serial")]
        {
            let ports = serialport::available_ports().map_err(|e| {
                crate::error::RigError::Io(io::Error::other(format!(
                    "serial port enumeration failed: {e}"
                )))
            })?;
            Ok(ports
                .into_iter()
                .map(|port| PortInfo::from_location(&port.port_name, describe(&port.port_type)))
                .collect())
        }
        #[cfg(not(feature = "instrument_serial"))]
        {
            Err(crate::error::RigError::SerialFeatureDisabled)
        }
    }

    fn open(&self, location: &str, settings: &SerialSettings) -> RigResult<Box<dyn SerialStream>> {
        #[cfg(feature = "instrument_serial")]
        {
            let port = serialport::new(location, settings.baud_rate)
                .data_bits(serialport::DataBits::Eight)
                .parity(serialport::Parity::None)
                .stop_bits(serialport::StopBits::One)
                .flow_control(serialport::FlowControl::None)
                .timeout(settings.write_timeout)
                .open()
                .map_err(|e| crate::error::RigError::SerialOpenFailed {
                    port: location.to_string(),
                    reason: e.to_string(),
                })?;
            Ok(Box::new(SystemStream(port)))
        }
        #[cfg(not(feature = "instrument_serial"))]
        {
            let _ = (location, settings);
            Err(crate::error::RigError::SerialFeatureDisabled)
        }
    }
}
