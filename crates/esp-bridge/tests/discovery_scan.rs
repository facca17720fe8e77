//! Integration tests for the discovery scanner with instrumented probers.

use std::io;
use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use esp_bridge::application::{DiscoveryScanner, HostProber, InterfaceSource};
use esp_bridge_core::{DiscoveredNetwork, NetworkOrigin, ScanConfig};

// ── Fixtures ──────────────────────────────────────────────────────────────────

/// Records every probed address and the peak number of concurrent probes.
#[derive(Default)]
struct CountingProber {
    in_flight: AtomicUsize,
    peak: AtomicUsize,
    probed: Mutex<Vec<Ipv4Addr>>,
    alive: Vec<Ipv4Addr>,
}

impl CountingProber {
    fn answering(alive: Vec<Ipv4Addr>) -> Self {
        Self {
            alive,
            ..Self::default()
        }
    }

    fn probed(&self) -> Vec<Ipv4Addr> {
        self.probed.lock().unwrap().clone()
    }
}

#[async_trait]
impl HostProber for CountingProber {
    async fn probe(&self, addr: Ipv4Addr, _port: u16, _timeout: Duration) -> io::Result<()> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        self.probed.lock().unwrap().push(addr);

        tokio::time::sleep(Duration::from_millis(2)).await;

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        if self.alive.contains(&addr) {
            Ok(())
        } else {
            Err(io::Error::new(io::ErrorKind::ConnectionRefused, "refused"))
        }
    }
}

struct NoInterfaces;

impl InterfaceSource for NoInterfaces {
    fn ipv4_networks(&self) -> Vec<DiscoveredNetwork> {
        Vec::new()
    }
}

fn explicit(cidrs: &[&str]) -> Vec<DiscoveredNetwork> {
    cidrs
        .iter()
        .map(|c| DiscoveredNetwork::parse(c, NetworkOrigin::Explicit).expect("valid CIDR"))
        .collect()
}

fn scanner(config: ScanConfig, prober: &Arc<CountingProber>) -> DiscoveryScanner {
    DiscoveryScanner::new(config, prober.clone(), Arc::new(NoInterfaces))
}

// ── Exclusion ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_loopback_and_wide_networks_are_not_probed() {
    // Arrange
    let prober = Arc::new(CountingProber::default());
    let s = scanner(ScanConfig::default(), &prober);

    // Act
    s.scan(&explicit(&["127.0.0.0/8", "10.0.0.0/8", "192.168.1.0/24"]))
        .await;

    // Assert
    let probed = prober.probed();
    assert_eq!(probed.len(), 254);
    assert!(probed.iter().all(|ip| !ip.is_loopback()));
    assert!(probed.iter().all(|ip| ip.octets()[0] != 10));
    assert!(probed.iter().all(|ip| ip.octets()[..3] == [192, 168, 1]));
}

#[tokio::test]
async fn test_network_and_broadcast_addresses_are_not_probed() {
    let prober = Arc::new(CountingProber::default());
    let s = scanner(ScanConfig::default(), &prober);

    s.scan(&explicit(&["192.168.9.0/24"])).await;

    let probed = prober.probed();
    assert!(!probed.contains(&Ipv4Addr::new(192, 168, 9, 0)));
    assert!(!probed.contains(&Ipv4Addr::new(192, 168, 9, 255)));
}

#[tokio::test]
async fn test_fallback_subnets_used_when_no_interfaces() {
    // Arrange
    let prober = Arc::new(CountingProber::default());
    let s = scanner(ScanConfig::default(), &prober);

    // Act
    s.scan(&[]).await;

    // Assert
    let probed = prober.probed();
    assert_eq!(probed.len(), 4 * 254);
    assert!(probed.contains(&Ipv4Addr::new(192, 168, 1, 1)));
    assert!(probed.contains(&Ipv4Addr::new(172, 16, 0, 254)));
}

// ── Concurrency bound ─────────────────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_in_flight_probes_never_exceed_default_cap() {
    // Arrange: a /22 holds 1022 hosts, about 20 batches.
    let prober = Arc::new(CountingProber::default());
    let s = scanner(ScanConfig::default(), &prober);

    // Act
    s.scan(&explicit(&["172.20.0.0/22"])).await;

    // Assert
    let peak = prober.peak.load(Ordering::SeqCst);
    assert_eq!(prober.probed().len(), 1022);
    assert!(peak <= 50, "peak in-flight {peak}");
    assert!(peak > 1, "probes never overlapped");
}

#[tokio::test]
async fn test_in_flight_probes_respect_custom_cap() {
    // Arrange
    let prober = Arc::new(CountingProber::default());
    let config = ScanConfig {
        max_in_flight: 7,
        ..ScanConfig::default()
    };
    let s = scanner(config, &prober);

    // Act
    s.scan(&explicit(&["192.168.1.0/24"])).await;

    // Assert
    let peak = prober.peak.load(Ordering::SeqCst);
    assert!(peak <= 7, "peak in-flight {peak}");
}

// ── Results ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_found_devices_are_sorted_and_unique() {
    // Arrange
    let alive = vec![
        Ipv4Addr::new(192, 168, 1, 200),
        Ipv4Addr::new(192, 168, 0, 17),
        Ipv4Addr::new(192, 168, 1, 3),
    ];
    let prober = Arc::new(CountingProber::answering(alive));
    let s = scanner(ScanConfig::default(), &prober);

    // Act
    let found = s
        .scan(&explicit(&["192.168.1.0/24", "192.168.0.0/24", "192.168.1.0/25"]))
        .await;

    // Assert
    let found: Vec<_> = found.into_iter().collect();
    assert_eq!(
        found,
        vec![
            Ipv4Addr::new(192, 168, 0, 17),
            Ipv4Addr::new(192, 168, 1, 3),
            Ipv4Addr::new(192, 168, 1, 200),
        ]
    );
}
