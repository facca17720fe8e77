//! The transport seam: a byte-stream connection to the remote ESP32.
//!
//! The production implementation is a plain TCP socket
//! (`infrastructure::transport::tcp`); tests substitute a scripted mock.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

/// Error type for transport operations.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The host name did not resolve to any address.
    #[error("could not resolve {host}: {source}")]
    Resolve {
        host: String,
        #[source]
        source: std::io::Error,
    },

    /// Every resolved address refused, timed out, or was unreachable.
    #[error("connection to {addr} failed: {source}")]
    ConnectFailed {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// The transport has been closed locally.
    #[error("transport is closed")]
    Closed,

    /// Send, receive or probe failed on an established connection.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// An established connection to the remote device.
///
/// Like [`Endpoint`](crate::application::endpoint::Endpoint), every method
/// takes `&self` so one handle can be shared by the forwarding tasks, the
/// liveness task, and the shutdown path.
pub trait Transport: Send + Sync {
    /// `host:port` of the remote side, for log messages.
    fn peer(&self) -> &str;

    /// Blocks until at least one byte arrives, the peer closes, or an error
    /// occurs.  `Ok(0)` means the remote side closed the connection.
    fn receive(&self, buf: &mut [u8]) -> Result<usize, TransportError>;

    /// Sends all of `data`.
    fn send(&self, data: &[u8]) -> Result<(), TransportError>;

    /// Zero-length liveness check.  Any error means the connection is gone.
    ///
    /// This is a heuristic: a healthy idle connection and one whose peer
    /// vanished without a reset look the same until the kernel notices.
    fn probe(&self) -> Result<(), TransportError>;

    /// Closes the connection and unblocks any pending [`Transport::receive`].
    /// Idempotent.
    fn close(&self);
}

/// Strategy that establishes a [`Transport`].
pub trait Connector: Send + Sync {
    /// Connects to `host:port`, giving up after `timeout`.
    ///
    /// `timeout` bounds each connection attempt.  Resolving a hostname
    /// happens first and is not covered by it, so a slow resolver can
    /// delay this call past `timeout`.  Pass an IP address to avoid that.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Resolve`] or [`TransportError::ConnectFailed`].
    fn connect(
        &self,
        host: &str,
        port: u16,
        timeout: Duration,
    ) -> Result<Arc<dyn Transport>, TransportError>;
}
