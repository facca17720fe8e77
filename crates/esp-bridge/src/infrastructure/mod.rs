//! OS adapters behind the application-layer traits.

pub mod console;
pub mod discovery;
pub mod endpoint;
pub mod transport;

use std::sync::Arc;

use esp_bridge_core::{BridgeConfig, ScanConfig};

use crate::application::{Bridge, DiscoveryScanner};

/// A bridge wired to the platform's native endpoint and a TCP transport.
pub fn build_bridge(config: BridgeConfig) -> Bridge {
    Bridge::new(
        config,
        Arc::new(endpoint::NativeEndpointOpener::default()),
        Arc::new(transport::TcpConnector),
    )
}

/// A scanner using real TCP probes and the OS interface table.
pub fn build_scanner(config: ScanConfig) -> DiscoveryScanner {
    DiscoveryScanner::new(
        config,
        Arc::new(discovery::TcpProber),
        Arc::new(discovery::SystemInterfaces),
    )
}
