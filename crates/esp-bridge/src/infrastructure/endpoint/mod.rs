//! Local endpoint implementations.
//!
//! The platform's variant is selected at compile time and re-exported as
//! `NativeEndpointOpener`, so the bridge and the binary never mention the
//! OS.  The serial variant is compiled everywhere; on unix it is simply not
//! the native choice.

pub mod mock;
pub mod serial;

// ── Unix: pseudo-terminal ─────────────────────────────────────────────────────

#[cfg(unix)]
pub mod pty;

/// Re-export the pseudo-terminal opener as `NativeEndpointOpener` on unix.
#[cfg(unix)]
pub use pty::PtyOpener as NativeEndpointOpener;

// ── Everything else: serial device ────────────────────────────────────────────

/// Re-export the serial port opener as `NativeEndpointOpener` elsewhere.
#[cfg(not(unix))]
pub use serial::SerialOpener as NativeEndpointOpener;
