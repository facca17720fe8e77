//! Use cases and the traits they depend on.
//!
//! Each seam trait lives next to the use case that consumes it; the
//! implementations are in `crate::infrastructure`.

pub mod bridge;
pub mod endpoint;
pub mod scanner;
pub mod target;
pub mod transport;

pub use bridge::{Bridge, BridgeError};
pub use scanner::{DiscoveryScanner, HostProber, InterfaceSource, ScanResult};
pub use target::{resolve_target, DeviceChooser, TargetError};
