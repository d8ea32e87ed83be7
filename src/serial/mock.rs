//! In-memory serial ports.
//!
//! Each mock port is a wire with two directions: bytes written by the link are
//! recorded, bytes injected by a test are handed to the link's reader.

use std::collections::{HashMap, VecDeque};
use std::io::{self, Read, Write};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use crate::error::{RigError, RigResult};
use crate::serial::backend::{PortBackend, SerialStream};
use crate::serial::{PortInfo, SerialSettings};

#[derive(Debug, Default)]
struct WireState {
    written: Vec<u8>,
    incoming: VecDeque<u8>,
    open_error: Option<String>,
    fail_writes: bool,
    dtr: bool,
    rts: bool,
    baud_rate: Option<u32>,
}

#[derive(Debug, Default)]
struct Wire {
    state: Mutex<WireState>,
    data_ready: Condvar,
}

/// Backend over simulated ports.
#[derive(Debug, Default, Clone)]
pub struct MockPorts {
    ports: Vec<PortInfo>,
    wires: Arc<Mutex<HashMap<String, Arc<Wire>>>>,
}

impl MockPorts {
    /// No ports attached.
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a port at `location`, e.g. `/dev/ttyUSB0`.
    pub fn with_port(mut self, location: &str, description: &str) -> Self {
        self.ports.push(PortInfo::from_location(location, description));
        self.wires
            .lock()
            .insert(location.to_string(), Arc::new(Wire::default()));
        self
    }

    /// Opening `location` fails with `reason`.
    pub fn failing_open(self, location: &str, reason: &str) -> Self {
        self.wire(location).state.lock().open_error = Some(reason.to_string());
        self
    }

    /// Writes to `location` fail.
    pub fn failing_writes(self, location: &str) -> Self {
        self.wire(location).state.lock().fail_writes = true;
        self
    }

    /// Everything written to `location` so far.
    pub fn written(&self, location: &str) -> Vec<u8> {
        self.wire(location).state.lock().written.clone()
    }

    /// Make `bytes` arrive on `location`.
    pub fn inject(&self, location: &str, bytes: &[u8]) {
        let wire = self.wire(location);
        wire.state.lock().incoming.extend(bytes);
        wire.data_ready.notify_all();
    }

    /// `(dtr, rts)` as last set on `location`.
    pub fn control_lines(&self, location: &str) -> (bool, bool) {
        let wire = self.wire(location);
        let state = wire.state.lock();
        (state.dtr, state.rts)
    }

    /// Baud rate `location` was last opened with.
    pub fn baud_rate(&self, location: &str) -> Option<u32> {
        self.wire(location).state.lock().baud_rate
    }

    fn wire(&self, location: &str) -> Arc<Wire> {
        self.wires
            .lock()
            .entry(location.to_string())
            .or_default()
            .clone()
    }
}

impl PortBackend for MockPorts {
    fn available_ports(&self) -> RigResult<Vec<PortInfo>> {
        Ok(self.ports.clone())
    }

    fn open(&self, location: &str, settings: &SerialSettings) -> RigResult<Box<dyn SerialStream>> {
        let wire = self
            .wires
            .lock()
            .get(location)
            .cloned()
            .ok_or_else(|| RigError::SerialOpenFailed {
                port: location.to_string(),
                reason: "No such file or directory".into(),
            })?;
        {
            let mut state = wire.state.lock();
            if let Some(reason) = state.open_error.clone() {
                return Err(RigError::SerialOpenFailed {
                    port: location.to_string(),
                    reason,
                });
            }
            state.baud_rate = Some(settings.baud_rate);
        }
        Ok(Box::new(MockStream {
            wire,
            timeout: settings.write_timeout,
        }))
    }
}

struct MockStream {
    wire: Arc<Wire>,
    timeout: Duration,
}

impl Read for MockStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut state = self.wire.state.lock();
        if state.incoming.is_empty() {
            let _ = self.wire.data_ready.wait_for(&mut state, self.timeout);
        }
        if state.incoming.is_empty() {
            return Err(io::Error::new(io::ErrorKind::TimedOut, "Operation timed out"));
        }
        let n = buf.len().min(state.incoming.len());
        for (slot, byte) in buf.iter_mut().zip(state.incoming.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }
}

impl Write for MockStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut state = self.wire.state.lock();
        if state.fail_writes {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "device disconnected"));
        }
        state.written.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl SerialStream for MockStream {
    fn try_clone_stream(&self) -> io::Result<Box<dyn SerialStream>> {
        Ok(Box::new(MockStream {
            wire: self.wire.clone(),
            timeout: self.timeout,
        }))
    }

    fn set_timeout(&mut self, timeout: Duration) -> io::Result<()> {
        self.timeout = timeout;
        Ok(())
    }

    fn assert_control_lines(&mut self) -> io::Result<()> {
        let mut state = self.wire.state.lock();
        state.dtr = true;
        state.rts = true;
        Ok(())
    }
}
