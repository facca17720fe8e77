//! The local endpoint seam: what the bridge needs from a serial-like device.
//!
//! The bridge never knows whether it is talking to a pseudo-terminal master,
//! a COM port, or an in-memory mock.  It sees an [`Endpoint`] obtained from an
//! [`EndpointOpener`] chosen once, at construction time.  The concrete
//! implementations live in `infrastructure::endpoint`.

use std::sync::Arc;

use thiserror::Error;

/// Error type for local endpoint operations.
#[derive(Debug, Error)]
pub enum EndpointError {
    /// A pseudo-terminal pair could not be allocated or configured.
    #[error("failed to set up pseudo-terminal: {0}")]
    Allocation(#[source] std::io::Error),

    /// The named serial port exists in the request but could not be opened.
    #[error("serial port {port} is unavailable: {source}")]
    PortUnavailable {
        port: String,
        #[source]
        source: std::io::Error,
    },

    /// No port was named and the system has no serial ports at all.
    #[error("no serial ports found; create a virtual port pair (e.g. com0com) and pass one with --port")]
    NoPortsFound,

    /// No port was named; the caller must pick one of `available`.
    #[error("no serial port specified; available ports: {}", .available.join(", "))]
    PortNotSpecified { available: Vec<String> },

    /// The endpoint has been closed.
    #[error("endpoint is closed")]
    Closed,

    /// Read or write failed on an open endpoint.
    #[error("endpoint I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A local serial-like endpoint.
///
/// All methods take `&self`: the remote→local task writes while the
/// local→remote task reads, and the shutdown path closes, all through one
/// shared handle.  Implementations guard their OS handle internally.
pub trait Endpoint: Send + Sync {
    /// The externally addressable name (a pty slave path or a COM port name).
    fn name(&self) -> &str;

    /// Reads whatever bytes are available without waiting.
    ///
    /// Returns `Ok(0)` when nothing is available right now.  That is a normal
    /// poll result, not end-of-stream.
    fn read(&self, buf: &mut [u8]) -> Result<usize, EndpointError>;

    /// Writes as many bytes of `data` as the endpoint accepts right now.
    ///
    /// Returns the number written; `Ok(0)` means "full, try again later".
    fn write(&self, data: &[u8]) -> Result<usize, EndpointError>;

    /// Releases the OS resource.  Idempotent; later reads and writes fail
    /// with [`EndpointError::Closed`].
    fn close(&self);

    /// `true` once [`Endpoint::close`] has run.
    fn is_closed(&self) -> bool;
}

/// Strategy that produces the platform's endpoint.
pub trait EndpointOpener: Send + Sync {
    /// Opens a new endpoint.  `hint` is the user-supplied device name, if any.
    ///
    /// # Errors
    ///
    /// Returns [`EndpointError`] if the device cannot be allocated or opened.
    fn open(&self, hint: Option<&str>) -> Result<Arc<dyn Endpoint>, EndpointError>;
}

// ── Tests ─────────────────────────────────────────────────────────────────────
