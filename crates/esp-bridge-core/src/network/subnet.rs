//! Subnet planning for the discovery scanner.
//!
//! The scanner receives candidate IPv4 networks from three places: explicit
//! `--network` arguments, the machine's own interfaces, or a fallback list of
//! common home/office subnets.  Before any packet is sent, this module turns
//! that raw list into a [`ScanPlan`]:
//!
//! 1. Every network is normalised to its network address, so
//!    `192.168.1.77/24` and `192.168.1.0/24` are the same entry.
//! 2. Duplicates are dropped.
//! 3. Loopback networks are skipped.  The ESP32 is never on `127.0.0.0/8`.
//! 4. Networks wider than the configured minimum prefix (`/16` by default)
//!    are skipped.  A `/8` holds 16.7 million hosts; at 50 probes per second
//!    that scan would take days.
//!
//! The plan then yields the flat, deduplicated list of host addresses to
//! probe.

use std::collections::HashSet;
use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

use ipnetwork::Ipv4Network;
use thiserror::Error;

/// Subnets tried when interface enumeration yields nothing usable.
pub const FALLBACK_SUBNETS: [&str; 4] = [
    "192.168.1.0/24",
    "192.168.0.0/24",
    "10.0.0.0/24",
    "172.16.0.0/24",
];

/// Error type for subnet parsing.
#[derive(Debug, Error, PartialEq)]
pub enum SubnetError {
    /// The text is not a valid IPv4 CIDR block.
    #[error("invalid IPv4 network '{input}': {reason}")]
    InvalidCidr { input: String, reason: String },
}

/// Where a candidate network came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NetworkOrigin {
    /// Supplied by the user.
    Explicit,
    /// Derived from a local interface address.
    Interface,
    /// Taken from [`FALLBACK_SUBNETS`].
    Fallback,
}

/// A candidate IPv4 network for discovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DiscoveredNetwork {
    /// The network, normalised to its network address.
    pub cidr: Ipv4Network,
    /// Where the network came from.
    pub origin: NetworkOrigin,
}

impl DiscoveredNetwork {
    /// Wraps `cidr`, normalising the address part to the network address.
    pub fn new(cidr: Ipv4Network, origin: NetworkOrigin) -> Self {
        // `network()` masks off the host bits; the prefix is already valid so
        // re-wrapping cannot fail, but fall back to the input just in case.
        let cidr = Ipv4Network::new(cidr.network(), cidr.prefix()).unwrap_or(cidr);
        Self { cidr, origin }
    }

    /// Parses `a.b.c.d/n` (or a bare address, treated as `/32`).
    ///
    /// # Errors
    ///
    /// Returns [`SubnetError::InvalidCidr`] if the text is not an IPv4 network.
    pub fn parse(input: &str, origin: NetworkOrigin) -> Result<Self, SubnetError> {
        let trimmed = input.trim();
        let cidr = Ipv4Network::from_str(trimmed).map_err(|e| SubnetError::InvalidCidr {
            input: trimmed.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self::new(cidr, origin))
    }

    /// `true` if the network lies in `127.0.0.0/8`.
    pub fn is_loopback(&self) -> bool {
        self.cidr.network().is_loopback()
    }

    /// Number of probe targets this network contributes.
    pub fn host_count(&self) -> u64 {
        match self.cidr.prefix() {
            32 => 1,
            31 => 2,
            p => (1u64 << (32 - u32::from(p))) - 2,
        }
    }

    /// Host addresses to probe, in ascending order.
    ///
    /// For prefixes up to `/30` the network and broadcast addresses are
    /// excluded.  A `/31` yields both addresses (point-to-point link) and a
    /// `/32` yields the single address.
    pub fn hosts(&self) -> impl Iterator<Item = Ipv4Addr> {
        let base = u64::from(u32::from(self.cidr.network()));
        let (first, last) = match self.cidr.prefix() {
            32 => (base, base),
            31 => (base, base + 1),
            p => {
                let span = (1u64 << (32 - u32::from(p))) - 1;
                (base + 1, base + span - 1)
            }
        };
        // Every value fits in a u32: `last` never exceeds the broadcast address.
        (first..=last).map(|v| Ipv4Addr::from(v as u32))
    }
}

impl fmt::Display for DiscoveredNetwork {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.cidr.network(), self.cidr.prefix())
    }
}

/// Returns [`FALLBACK_SUBNETS`] as discovered networks.
pub fn fallback_networks() -> Vec<DiscoveredNetwork> {
    FALLBACK_SUBNETS
        .iter()
        .filter_map(|s| DiscoveredNetwork::parse(s, NetworkOrigin::Fallback).ok())
        .collect()
}

/// Why a network was left out of the scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The network is loopback.
    Loopback,
    /// The prefix is shorter than the scanner's minimum.
    TooWide { prefix: u8, min_prefix: u8 },
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::Loopback => f.write_str("loopback network"),
            SkipReason::TooWide { prefix, min_prefix } => write!(
                f,
                "/{prefix} is wider than /{min_prefix}; too many hosts to probe"
            ),
        }
    }
}

/// A network that will not be probed, with the reason.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SkippedNetwork {
    pub network: DiscoveredNetwork,
    pub reason: SkipReason,
}

/// The outcome of filtering candidate networks.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanPlan {
    /// Networks that will be probed exhaustively.
    pub eligible: Vec<DiscoveredNetwork>,
    /// Networks left out, in input order.
    pub skipped: Vec<SkippedNetwork>,
}

impl ScanPlan {
    /// Normalises, deduplicates and filters `networks`.
    ///
    /// Networks with a prefix shorter than `min_prefix` are skipped as too
    /// wide; loopback networks are always skipped.
    pub fn build<I>(networks: I, min_prefix: u8) -> Self
    where
        I: IntoIterator<Item = DiscoveredNetwork>,
    {
        let mut seen = HashSet::new();
        let mut plan = ScanPlan::default();

        for network in networks {
            let network = DiscoveredNetwork::new(network.cidr, network.origin);
            if !seen.insert(network.cidr) {
                continue;
            }

            if network.is_loopback() {
                plan.skipped.push(SkippedNetwork {
                    network,
                    reason: SkipReason::Loopback,
                });
            } else if network.cidr.prefix() < min_prefix {
                plan.skipped.push(SkippedNetwork {
                    network,
                    reason: SkipReason::TooWide {
                        prefix: network.cidr.prefix(),
                        min_prefix,
                    },
                });
            } else {
                plan.eligible.push(network);
            }
        }

        plan
    }

    /// `true` when nothing is left to probe.
    pub fn is_empty(&self) -> bool {
        self.eligible.is_empty()
    }

    /// Every host address of every eligible network, each exactly once.
    ///
    /// Overlapping networks (a `/24` inside a `/16`) contribute their shared
    /// addresses only once.
    pub fn hosts(&self) -> Vec<Ipv4Addr> {
        let mut seen = HashSet::new();
        self.eligible
            .iter()
            .flat_map(|n| n.hosts())
            .filter(|ip| seen.insert(*ip))
            .collect()
    }

    /// Sum of the host counts of the eligible networks (before overlap removal).
    pub fn host_count(&self) -> u64 {
        self.eligible.iter().map(DiscoveredNetwork::host_count).sum()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn net(s: &str) -> DiscoveredNetwork {
        DiscoveredNetwork::parse(s, NetworkOrigin::Explicit).unwrap()
    }

    #[test]
    fn test_parse_normalises_to_network_address() {
        // Arrange / Act
        let n = net("192.168.1.77/24");

        // Assert
        assert_eq!(n.to_string(), "192.168.1.0/24");
    }

    #[test]
    fn test_parse_rejects_garbage() {
        let result = DiscoveredNetwork::parse("not-a-network", NetworkOrigin::Explicit);
        assert!(matches!(result, Err(SubnetError::InvalidCidr { .. })));
    }

    #[test]
    fn test_parse_rejects_prefix_over_32() {
        let result = DiscoveredNetwork::parse("10.0.0.0/33", NetworkOrigin::Explicit);
        assert!(result.is_err());
    }

    #[test]
    fn test_slash_24_has_254_hosts_without_network_and_broadcast() {
        // Arrange
        let n = net("192.168.1.0/24");

        // Act
        let hosts: Vec<Ipv4Addr> = n.hosts().collect();

        // Assert
        assert_eq!(hosts.len(), 254);
        assert_eq!(n.host_count(), 254);
        assert_eq!(hosts.first(), Some(&Ipv4Addr::new(192, 168, 1, 1)));
        assert_eq!(hosts.last(), Some(&Ipv4Addr::new(192, 168, 1, 254)));
    }

    #[test]
    fn test_slash_32_yields_single_host() {
        let n = net("10.1.2.3/32");
        let hosts: Vec<Ipv4Addr> = n.hosts().collect();
        assert_eq!(hosts, vec![Ipv4Addr::new(10, 1, 2, 3)]);
    }

    #[test]
    fn test_slash_31_yields_both_addresses() {
        let n = net("10.1.2.2/31");
        let hosts: Vec<Ipv4Addr> = n.hosts().collect();
        assert_eq!(
            hosts,
            vec![Ipv4Addr::new(10, 1, 2, 2), Ipv4Addr::new(10, 1, 2, 3)]
        );
    }

    #[test]
    fn test_slash_16_host_count() {
        assert_eq!(net("172.16.0.0/16").host_count(), 65_534);
    }

    #[test]
    fn test_plan_skips_loopback_and_wide_networks() {
        // Arrange
        let candidates = vec![net("127.0.0.0/8"), net("10.0.0.0/8"), net("192.168.1.0/24")];

        // Act
        let plan = ScanPlan::build(candidates, 16);

        // Assert
        assert_eq!(plan.eligible, vec![net("192.168.1.0/24")]);
        assert_eq!(plan.skipped.len(), 2);
        assert_eq!(plan.skipped[0].reason, SkipReason::Loopback);
        assert_eq!(
            plan.skipped[1].reason,
            SkipReason::TooWide {
                prefix: 8,
                min_prefix: 16
            }
        );
    }

    #[test]
    fn test_plan_keeps_slash_16_exactly() {
        let plan = ScanPlan::build(vec![net("172.20.0.0/16")], 16);
        assert_eq!(plan.eligible.len(), 1);
        assert!(plan.skipped.is_empty());
    }

    #[test]
    fn test_plan_skips_narrow_loopback_too() {
        let plan = ScanPlan::build(vec![net("127.0.0.0/24")], 16);
        assert!(plan.is_empty());
        assert_eq!(plan.skipped[0].reason, SkipReason::Loopback);
    }

    #[test]
    fn test_plan_deduplicates_equivalent_networks() {
        // Arrange: same /24 written two ways
        let candidates = vec![net("192.168.1.0/24"), net("192.168.1.200/24")];

        // Act
        let plan = ScanPlan::build(candidates, 16);

        // Assert
        assert_eq!(plan.eligible.len(), 1);
    }

    #[test]
    fn test_plan_hosts_removes_overlap() {
        // Arrange: a /24 contained in a /23
        let plan = ScanPlan::build(vec![net("10.0.0.0/23"), net("10.0.1.0/24")], 16);

        // Act
        let hosts = plan.hosts();

        // Assert: the /23 already covers every host in the /24
        let unique: HashSet<_> = hosts.iter().collect();
        assert_eq!(unique.len(), hosts.len());
        assert_eq!(hosts.len(), 510);
    }

    #[test]
    fn test_fallback_networks_are_the_four_private_defaults() {
        let nets = fallback_networks();
        assert_eq!(nets.len(), 4);
        assert!(nets.iter().all(|n| n.origin == NetworkOrigin::Fallback));
        assert_eq!(nets[0].to_string(), "192.168.1.0/24");
        assert_eq!(nets[3].to_string(), "172.16.0.0/24");
    }

    #[test]
    fn test_skip_reason_display_mentions_prefix() {
        let reason = SkipReason::TooWide {
            prefix: 8,
            min_prefix: 16,
        };
        assert!(reason.to_string().contains("/8"));
    }
}
