//! Discovery use case: find hosts on the local subnets that accept TCP
//! connections on the ESP32 port.
//!
//! # Pipeline
//!
//! ```text
//!  explicit CIDRs ─┐
//!                  ├─▶ candidates ─▶ ScanPlan ─▶ batches of ≤ 50 probes ─▶ BTreeSet
//!  interfaces ─────┤                 (skip loopback,   (JoinSet, each batch
//!  (or fallback) ──┘                  skip > /16)       joins before the next)
//! ```
//!
//! Probes report finds over an unbounded channel.  The receiver is drained
//! only after the last batch has joined, so no probe task ever shares a
//! mutable collection.
//!
//! A single unreachable host never fails the scan: probe errors and
//! timeouts are logged at `debug` and dropped.

use std::collections::BTreeSet;
use std::io;
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use esp_bridge_core::network::fallback_networks;
use esp_bridge_core::{DiscoveredNetwork, ScanConfig, ScanPlan, SkipReason};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// Reachable addresses, sorted for stable display.
pub type ScanResult = BTreeSet<Ipv4Addr>;

/// Checks whether one host accepts a TCP connection on `port`.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait HostProber: Send + Sync {
    /// `Ok(())` if the host accepted the connection within `timeout`.
    async fn probe(&self, addr: Ipv4Addr, port: u16, timeout: Duration) -> io::Result<()>;
}

/// Supplies the IPv4 networks attached to this machine.
#[cfg_attr(test, mockall::automock)]
pub trait InterfaceSource: Send + Sync {
    fn ipv4_networks(&self) -> Vec<DiscoveredNetwork>;
}

/// Concurrent subnet scanner.
pub struct DiscoveryScanner {
    config: ScanConfig,
    prober: Arc<dyn HostProber>,
    interfaces: Arc<dyn InterfaceSource>,
}

impl DiscoveryScanner {
    pub fn new(
        config: ScanConfig,
        prober: Arc<dyn HostProber>,
        interfaces: Arc<dyn InterfaceSource>,
    ) -> Self {
        Self {
            config,
            prober,
            interfaces,
        }
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    /// Decides which networks to probe.
    ///
    /// `explicit` wins when non-empty.  Otherwise the local interfaces are
    /// used, and if they contribute nothing scannable the fixed fallback
    /// list is used instead.  Every skipped network is logged.
    pub fn plan(&self, explicit: &[DiscoveredNetwork]) -> ScanPlan {
        let min_prefix = self.config.min_prefix;

        let plan = if explicit.is_empty() {
            let derived = self.interfaces.ipv4_networks();
            debug!(count = derived.len(), "interface networks");
            let plan = ScanPlan::build(derived, min_prefix);
            log_skipped(&plan);
            if plan.is_empty() {
                warn!("no scannable interface networks found; using fallback subnets");
                ScanPlan::build(fallback_networks(), min_prefix)
            } else {
                plan
            }
        } else {
            let plan = ScanPlan::build(explicit.iter().copied(), min_prefix);
            log_skipped(&plan);
            plan
        };

        for net in &plan.eligible {
            info!(network = %net, origin = ?net.origin, "will scan");
        }
        plan
    }

    /// Plans and runs a scan.  See [`DiscoveryScanner::plan`].
    pub async fn scan(&self, explicit: &[DiscoveredNetwork]) -> ScanResult {
        let plan = self.plan(explicit);
        self.scan_plan(&plan).await
    }

    /// Probes every host of `plan` in batches of at most
    /// `config.max_in_flight`.
    pub async fn scan_plan(&self, plan: &ScanPlan) -> ScanResult {
        let hosts = plan.hosts();
        let port = self.config.port;
        let timeout = self.config.probe_timeout;
        let batch_size = self.config.max_in_flight.max(1);
        info!(hosts = hosts.len(), port, "scanning for devices");

        let (tx, mut rx) = mpsc::unbounded_channel();

        for batch in hosts.chunks(batch_size) {
            let mut probes = JoinSet::new();
            for &addr in batch {
                let prober = Arc::clone(&self.prober);
                let tx = tx.clone();
                probes.spawn(async move {
                    match prober.probe(addr, port, timeout).await {
                        Ok(()) => {
                            info!(%addr, port, "found device");
                            // The receiver outlives every batch.
                            let _ = tx.send(addr);
                        }
                        Err(e) => debug!(%addr, port, "probe failed: {e}"),
                    }
                });
            }
            while let Some(joined) = probes.join_next().await {
                if let Err(e) = joined {
                    debug!("probe task aborted: {e}");
                }
            }
        }
        drop(tx);

        let mut found = ScanResult::new();
        while let Some(addr) = rx.recv().await {
            found.insert(addr);
        }
        info!(found = found.len(), "scan complete");
        found
    }
}

fn log_skipped(plan: &ScanPlan) {
    for skipped in &plan.skipped {
        match skipped.reason {
            SkipReason::Loopback => {
                debug!(network = %skipped.network, "skipping loopback network");
            }
            SkipReason::TooWide { .. } => {
                warn!(network = %skipped.network, "skipping network: {}", skipped.reason);
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
