//! TCP transport to the ESP32 UART server.
//!
//! The device speaks raw bytes on a TELNET-style socket: no framing and no
//! option negotiation.  `TcpTransport` is therefore a thin wrapper over
//! [`std::net::TcpStream`] that maps I/O results onto the [`Transport`]
//! contract.
//!
//! # Portability note
//!
//! Only the `std::net` API is used, which behaves the same on Windows,
//! Linux and macOS.

use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::application::transport::{Connector, Transport, TransportError};

/// Production [`Connector`]: blocking TCP connect with a timeout.
#[derive(Debug, Default, Clone, Copy)]
pub struct TcpConnector;

impl Connector for TcpConnector {
    fn connect(
        &self,
        host: &str,
        port: u16,
        timeout: Duration,
    ) -> Result<Arc<dyn Transport>, TransportError> {
        Ok(Arc::new(TcpTransport::connect(host, port, timeout)?))
    }
}

/// An established TCP connection to the device.
#[derive(Debug)]
pub struct TcpTransport {
    peer: String,
    stream: TcpStream,
    closed: AtomicBool,
}

impl TcpTransport {
    /// Resolves `host` and tries each address in turn, each bounded by
    /// `timeout`.  The lookup itself blocks in the system resolver with no
    /// limit of its own.
    ///
    /// # Errors
    ///
    /// - [`TransportError::Resolve`] if `host` does not resolve.
    /// - [`TransportError::ConnectFailed`] with the last address's error if
    ///   none accepted the connection.
    pub fn connect(host: &str, port: u16, timeout: Duration) -> Result<Self, TransportError> {
        let peer = format!("{host}:{port}");
        let addrs: Vec<_> = (host, port)
            .to_socket_addrs()
            .map_err(|source| TransportError::Resolve {
                host: host.to_string(),
                source,
            })?
            .collect();
        if addrs.is_empty() {
            return Err(TransportError::Resolve {
                host: host.to_string(),
                source: io::Error::new(io::ErrorKind::NotFound, "no addresses found"),
            });
        }

        let mut last_err = None;
        for addr in addrs {
            debug!(%addr, ?timeout, "connecting");
            match TcpStream::connect_timeout(&addr, timeout) {
                Ok(stream) => return Self::from_stream(peer, stream),
                Err(e) => {
                    debug!(%addr, "connect attempt failed: {e}");
                    last_err = Some(e);
                }
            }
        }

        Err(TransportError::ConnectFailed {
            addr: peer,
            source: last_err
                .unwrap_or_else(|| io::Error::new(io::ErrorKind::Other, "no address attempted")),
        })
    }

    /// Wraps an already connected stream.
    ///
    /// Any read timeout is cleared so that `receive` blocks until data, EOF,
    /// or an error.
    pub fn from_stream(peer: String, stream: TcpStream) -> Result<Self, TransportError> {
        stream.set_read_timeout(None)?;
        // Keystrokes are tiny; send them immediately.
        stream.set_nodelay(true)?;
        Ok(Self {
            peer,
            stream,
            closed: AtomicBool::new(false),
        })
    }

    fn ensure_open(&self) -> Result<(), TransportError> {
        if self.closed.load(Ordering::SeqCst) {
            Err(TransportError::Closed)
        } else {
            Ok(())
        }
    }
}

impl Transport for TcpTransport {
    fn peer(&self) -> &str {
        &self.peer
    }

    fn receive(&self, buf: &mut [u8]) -> Result<usize, TransportError> {
        self.ensure_open()?;
        match (&self.stream).read(buf) {
            Ok(n) => Ok(n),
            // A read interrupted by our own shutdown is reported as closed,
            // not as a lost connection.
            Err(_) if self.closed.load(Ordering::SeqCst) => Err(TransportError::Closed),
            Err(e) => Err(e.into()),
        }
    }

    fn send(&self, data: &[u8]) -> Result<(), TransportError> {
        self.ensure_open()?;
        (&self.stream).write_all(data)?;
        Ok(())
    }

    fn probe(&self) -> Result<(), TransportError> {
        self.ensure_open()?;
        (&self.stream).write(&[])?;
        match self.stream.take_error()? {
            Some(e) => Err(e.into()),
            None => Ok(()),
        }
    }

    fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Err(e) = self.stream.shutdown(Shutdown::Both) {
            debug!(peer = %self.peer, "shutdown: {e}");
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
