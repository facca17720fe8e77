//! Serial-device endpoint (the native variant on Windows).
//!
//! Windows has no pseudo-terminals, so the bridge attaches to one end of a
//! virtual COM-port pair (com0com or similar) and the user's serial tool
//! opens the other end.  Creating that pair is outside this program; we only
//! open the port the user names.
//!
//! With no port named we list the system's ports and fail with a hint.  We
//! never pick one on the user's behalf.

use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use esp_bridge_core::domain::config::LOCAL_BAUD_RATE;
use serialport::{DataBits, FlowControl, Parity, SerialPort, StopBits};
use tracing::{debug, info, warn};

use crate::application::endpoint::{Endpoint, EndpointError, EndpointOpener};

/// Per-call timeout on the serial handle.
///
/// Reads only happen after `bytes_to_read` reports data, so this bounds
/// writes into a stalled port.
const PORT_TIMEOUT: Duration = Duration::from_millis(100);

/// Lists the names of the serial ports present on this machine.
pub type PortLister = fn() -> io::Result<Vec<String>>;

/// The system's serial ports, via `serialport::available_ports`.
pub fn system_ports() -> io::Result<Vec<String>> {
    Ok(serialport::available_ports()?
        .into_iter()
        .map(|p| p.port_name)
        .collect())
}

/// Opens the serial port named by the hint.
#[derive(Debug, Clone, Copy)]
pub struct SerialOpener {
    list_ports: PortLister,
}

impl Default for SerialOpener {
    fn default() -> Self {
        Self {
            list_ports: system_ports,
        }
    }
}

impl SerialOpener {
    /// Uses `list_ports` instead of asking the OS.  For tests.
    pub fn with_port_lister(list_ports: PortLister) -> Self {
        Self { list_ports }
    }

    fn ports(&self) -> Vec<String> {
        match (self.list_ports)() {
            Ok(ports) => ports,
            Err(e) => {
                warn!("failed to enumerate serial ports: {e}");
                Vec::new()
            }
        }
    }
}

impl EndpointOpener for SerialOpener {
    fn open(&self, hint: Option<&str>) -> Result<Arc<dyn Endpoint>, EndpointError> {
        let Some(port) = hint else {
            let available = self.ports();
            if available.is_empty() {
                return Err(EndpointError::NoPortsFound);
            }
            return Err(EndpointError::PortNotSpecified { available });
        };

        match SerialEndpoint::open(port) {
            Ok(ep) => Ok(Arc::new(ep)),
            Err(e) => {
                let available = self.ports();
                if !available.is_empty() {
                    info!("available serial ports: {}", available.join(", "));
                }
                Err(e)
            }
        }
    }
}

/// An open serial port.
pub struct SerialEndpoint {
    name: String,
    port: Mutex<Option<Box<dyn SerialPort>>>,
    closed: AtomicBool,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl SerialEndpoint {
    /// Opens `name` at 115200-8-N-1 without flow control.
    ///
    /// # Errors
    ///
    /// [`EndpointError::PortUnavailable`] if the OS refuses the port.
    pub fn open(name: &str) -> Result<Self, EndpointError> {
        let port = serialport::new(name, LOCAL_BAUD_RATE)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(PORT_TIMEOUT)
            .open()
            .map_err(|e| EndpointError::PortUnavailable {
                port: name.to_string(),
                source: e.into(),
            })?;
        debug!(port = name, "serial port opened");
        Ok(Self {
            name: name.to_string(),
            port: Mutex::new(Some(port)),
            closed: AtomicBool::new(false),
        })
    }
}

impl Endpoint for SerialEndpoint {
    fn name(&self) -> &str {
        &self.name
    }

    fn read(&self, buf: &mut [u8]) -> Result<usize, EndpointError> {
        let mut guard = lock(&self.port);
        let port = guard.as_mut().ok_or(EndpointError::Closed)?;
        let pending = port.bytes_to_read().map_err(io::Error::from)? as usize;
        if pending == 0 {
            return Ok(0);
        }
        let want = pending.min(buf.len());
        match port.read(&mut buf[..want]) {
            Ok(n) => Ok(n),
            Err(e) if e.kind() == io::ErrorKind::TimedOut => Ok(0),
            Err(e) => Err(e.into()),
        }
    }

    fn write(&self, data: &[u8]) -> Result<usize, EndpointError> {
        let mut guard = lock(&self.port);
        let port = guard.as_mut().ok_or(EndpointError::Closed)?;
        match port.write(data) {
            Ok(n) => Ok(n),
            Err(e) if e.kind() == io::ErrorKind::TimedOut => Ok(0),
            Err(e) => Err(e.into()),
        }
    }

    fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        lock(&self.port).take();
        debug!(port = %self.name, "serial port closed");
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
