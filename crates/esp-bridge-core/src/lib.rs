//! # esp-bridge-core
//!
//! Shared domain types for the ESP32 UART bridge.
//!
//! The bridge connects to an ESP32 that serves its UART as a raw byte stream
//! over TCP (port 23 by default) and republishes that stream as a local
//! serial endpoint: a pseudo-terminal on POSIX systems, or a COM port on
//! Windows.  Serial tools then talk to the microcontroller as if it were
//! wired to the machine.
//!
//! This crate has no dependencies on sockets, terminals, or serial drivers.
//! It holds the pieces that are pure data and pure logic:
//!
//! - **`domain`** – Bridge and scanner configuration, the bridge
//!   [`RunState`] machine, and the [`StopReason`] taxonomy.
//!
//! - **`network`** – Subnet planning for the discovery scanner: which CIDR
//!   blocks are worth probing, which are skipped (loopback, wider than /16),
//!   and the list of host addresses each eligible block contains.

pub mod domain;
pub mod network;

pub use domain::config::{BridgeConfig, BridgeTimings, ScanConfig};
pub use domain::state::{RunState, StopReason};
pub use network::subnet::{
    DiscoveredNetwork, NetworkOrigin, ScanPlan, SkipReason, SkippedNetwork, SubnetError,
};
