//! Local IPv4 networks from the OS interface table.

use esp_bridge_core::{DiscoveredNetwork, NetworkOrigin};
use ipnetwork::IpNetwork;
use pnet::datalink::{self, NetworkInterface};
use tracing::debug;

use crate::application::scanner::InterfaceSource;

/// Reads interfaces through `pnet::datalink`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemInterfaces;

impl InterfaceSource for SystemInterfaces {
    fn ipv4_networks(&self) -> Vec<DiscoveredNetwork> {
        ipv4_networks_of(datalink::interfaces())
    }
}

/// IPv4 networks of every interface that is up and not loopback.
pub fn ipv4_networks_of(interfaces: Vec<NetworkInterface>) -> Vec<DiscoveredNetwork> {
    interfaces
        .into_iter()
        .filter(|i| i.is_up() && !i.is_loopback())
        .flat_map(|i| {
            debug!(interface = %i.name, ips = i.ips.len(), "inspecting interface");
            i.ips.into_iter().filter_map(|ip| match ip {
                IpNetwork::V4(v4) => Some(DiscoveredNetwork::new(v4, NetworkOrigin::Interface)),
                IpNetwork::V6(_) => None,
            })
        })
        .collect()
}

// ── Tests ─────────────────────────────────────────────────────────────────────
