//! Integration tests for subnet planning through the crate's public API.
//!
//! These mirror how the discovery scanner uses the planner: a mixed list of
//! user-supplied, interface-derived and fallback networks goes in; a list of
//! host addresses and a list of skipped networks come out.

use std::net::Ipv4Addr;

use esp_bridge_core::network::fallback_networks;
use esp_bridge_core::{DiscoveredNetwork, NetworkOrigin, ScanConfig, ScanPlan, SkipReason};

fn explicit(s: &str) -> DiscoveredNetwork {
    DiscoveredNetwork::parse(s, NetworkOrigin::Explicit).expect("valid CIDR")
}

/// Loopback is never probed and a /8 is never enumerated; only the /24 is.
#[test]
fn test_mixed_networks_probe_only_the_slash_24() {
    // Arrange
    let candidates = vec![
        explicit("127.0.0.0/8"),
        explicit("10.0.0.0/8"),
        explicit("192.168.1.0/24"),
    ];
    let cfg = ScanConfig::default();

    // Act
    let plan = ScanPlan::build(candidates, cfg.min_prefix);
    let hosts = plan.hosts();

    // Assert
    assert_eq!(hosts.len(), 254);
    assert!(hosts.iter().all(|ip| !ip.is_loopback()));
    assert!(hosts
        .iter()
        .all(|ip| ip.octets()[0] == 192 && ip.octets()[1] == 168 && ip.octets()[2] == 1));
}

#[test]
fn test_fallback_plan_has_no_skips() {
    // Arrange / Act
    let plan = ScanPlan::build(fallback_networks(), ScanConfig::default().min_prefix);

    // Assert
    assert_eq!(plan.eligible.len(), 4);
    assert!(plan.skipped.is_empty());
    assert_eq!(plan.host_count(), 4 * 254);
}

#[test]
fn test_skipped_networks_keep_their_origin() {
    // Arrange
    let candidates = vec![DiscoveredNetwork::parse("10.0.0.0/12", NetworkOrigin::Interface).unwrap()];

    // Act
    let plan = ScanPlan::build(candidates, 16);

    // Assert
    assert_eq!(plan.skipped.len(), 1);
    assert_eq!(plan.skipped[0].network.origin, NetworkOrigin::Interface);
    assert!(matches!(
        plan.skipped[0].reason,
        SkipReason::TooWide { prefix: 12, .. }
    ));
}

#[test]
fn test_single_host_network_is_probed() {
    let plan = ScanPlan::build(vec![explicit("192.168.4.1/32")], 16);
    assert_eq!(plan.hosts(), vec![Ipv4Addr::new(192, 168, 4, 1)]);
}
