//! Domain types for the bridge and the discovery scanner.
//!
//! Nothing in here performs I/O.  The application crate wires these types to
//! real sockets, pseudo-terminals and serial ports.

pub mod config;
pub mod state;

pub use config::{BridgeConfig, BridgeTimings, ScanConfig};
pub use state::{RunState, StopReason};
