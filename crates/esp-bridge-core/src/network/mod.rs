//! Network-level domain logic shared by the scanner and the CLI.

pub mod subnet;

pub use subnet::{fallback_networks, DiscoveredNetwork, NetworkOrigin, ScanPlan, FALLBACK_SUBNETS};
