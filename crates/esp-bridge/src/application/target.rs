//! Target resolution: decide which device address the bridge connects to.
//!
//! | `--ip` | `--scan` | Behaviour                                           |
//! |--------|----------|-----------------------------------------------------|
//! | yes    | no       | Use the address as given; no network traffic.       |
//! | yes    | yes      | Scan and report; use `--ip` unless nothing answered. |
//! | no     | either   | Scan; one device is picked automatically, several   |
//! |        |          | are offered to the [`DeviceChooser`], none is an error. |

use std::net::Ipv4Addr;

use esp_bridge_core::DiscoveredNetwork;
use thiserror::Error;
use tracing::info;

use crate::application::scanner::DiscoveryScanner;

/// Error type for target resolution.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TargetError {
    /// The scan found nothing listening on the device port.
    #[error("no devices found on port {port}; check that the ESP32 is powered and on this network, or pass --ip")]
    NoDevicesFound { port: u16 },

    /// The user closed the prompt without choosing.
    #[error("device selection aborted")]
    SelectionAborted,
}

/// Picks one device out of several discovered ones.
#[cfg_attr(test, mockall::automock)]
pub trait DeviceChooser {
    /// Returns the chosen address.  `devices` has at least two entries.
    ///
    /// # Errors
    ///
    /// [`TargetError::SelectionAborted`] if no choice was made.
    fn choose(&mut self, devices: &[Ipv4Addr]) -> Result<Ipv4Addr, TargetError>;
}

/// Resolves the address to connect to.
///
/// `explicit` is the user-supplied host (name or address) and `networks`
/// the user-supplied CIDRs, which may be empty.
///
/// # Errors
///
/// [`TargetError::NoDevicesFound`] when a scan comes back empty, even if
/// `explicit` is set: asking for a scan and finding nothing means the device
/// is not on the network.  Otherwise whatever the chooser returns.
pub async fn resolve_target(
    explicit: Option<&str>,
    scan_requested: bool,
    networks: &[DiscoveredNetwork],
    scanner: &DiscoveryScanner,
    chooser: &mut dyn DeviceChooser,
) -> Result<String, TargetError> {
    if let Some(host) = explicit {
        if scan_requested {
            let found = scanner.scan(networks).await;
            if found.is_empty() {
                return Err(TargetError::NoDevicesFound {
                    port: scanner.config().port,
                });
            }
            for addr in &found {
                info!(%addr, "device found");
            }
        }
        return Ok(host.to_string());
    }

    let found: Vec<Ipv4Addr> = scanner.scan(networks).await.into_iter().collect();
    match found.as_slice() {
        [] => Err(TargetError::NoDevicesFound {
            port: scanner.config().port,
        }),
        [only] => {
            info!(addr = %only, "one device found; selecting it");
            Ok(only.to_string())
        }
        many => {
            info!(count = many.len(), "several devices found");
            chooser.choose(many).map(|addr| addr.to_string())
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::sync::Arc;

    use esp_bridge_core::{NetworkOrigin, ScanConfig};

    use crate::application::scanner::{MockHostProber, MockInterfaceSource};

    fn lan() -> Vec<DiscoveredNetwork> {
        vec![DiscoveredNetwork::parse("192.168.1.0/24", NetworkOrigin::Explicit).unwrap()]
    }

    /// Scanner whose prober accepts exactly `alive`.
    fn scanner_finding(alive: Vec<Ipv4Addr>) -> DiscoveryScanner {
        let mut prober = MockHostProber::new();
        prober.expect_probe().returning(move |addr, _, _| {
            if alive.contains(&addr) {
                Ok(())
            } else {
                Err(io::Error::new(io::ErrorKind::TimedOut, "timeout"))
            }
        });
        DiscoveryScanner::new(
            ScanConfig::default(),
            Arc::new(prober),
            Arc::new(MockInterfaceSource::new()),
        )
    }

    /// Scanner that must never be used.
    fn idle_scanner() -> DiscoveryScanner {
        let mut prober = MockHostProber::new();
        prober.expect_probe().times(0);
        DiscoveryScanner::new(
            ScanConfig::default(),
            Arc::new(prober),
            Arc::new(MockInterfaceSource::new()),
        )
    }

    #[tokio::test]
    async fn test_explicit_address_used_without_scanning() {
        // Arrange
        let scanner = idle_scanner();
        let mut chooser = MockDeviceChooser::new();
        chooser.expect_choose().times(0);

        // Act
        let target = resolve_target(Some("esp32.local"), false, &[], &scanner, &mut chooser).await;

        // Assert
        assert_eq!(target, Ok("esp32.local".to_string()));
    }

    #[tokio::test]
    async fn test_explicit_address_wins_over_scan_results() {
        // Arrange
        let scanner = scanner_finding(vec![Ipv4Addr::new(192, 168, 1, 5)]);
        let mut chooser = MockDeviceChooser::new();
        chooser.expect_choose().times(0);

        // Act
        let target =
            resolve_target(Some("192.168.1.99"), true, &lan(), &scanner, &mut chooser).await;

        // Assert
        assert_eq!(target, Ok("192.168.1.99".to_string()));
    }

    #[tokio::test]
    async fn test_empty_scan_refuses_explicit_address() {
        // Arrange
        let scanner = scanner_finding(Vec::new());
        let mut chooser = MockDeviceChooser::new();
        chooser.expect_choose().times(0);

        // Act
        let target =
            resolve_target(Some("192.168.1.99"), true, &lan(), &scanner, &mut chooser).await;

        // Assert
        assert_eq!(target, Err(TargetError::NoDevicesFound { port: 23 }));
    }

    #[tokio::test]
    async fn test_single_device_is_auto_selected() {
        // Arrange
        let scanner = scanner_finding(vec![Ipv4Addr::new(192, 168, 1, 42)]);
        let mut chooser = MockDeviceChooser::new();
        chooser.expect_choose().times(0);

        // Act
        let target = resolve_target(None, false, &lan(), &scanner, &mut chooser).await;

        // Assert
        assert_eq!(target, Ok("192.168.1.42".to_string()));
    }

    #[tokio::test]
    async fn test_several_devices_go_to_the_chooser() {
        // Arrange
        let scanner = scanner_finding(vec![
            Ipv4Addr::new(192, 168, 1, 42),
            Ipv4Addr::new(192, 168, 1, 3),
        ]);
        let mut chooser = MockDeviceChooser::new();
        chooser
            .expect_choose()
            .times(1)
            .withf(|devices| {
                devices == [Ipv4Addr::new(192, 168, 1, 3), Ipv4Addr::new(192, 168, 1, 42)]
            })
            .returning(|devices| Ok(devices[1]));

        // Act
        let target = resolve_target(None, true, &lan(), &scanner, &mut chooser).await;

        // Assert
        assert_eq!(target, Ok("192.168.1.42".to_string()));
    }

    #[tokio::test]
    async fn test_no_devices_is_an_error() {
        let scanner = scanner_finding(Vec::new());
        let mut chooser = MockDeviceChooser::new();
        let target = resolve_target(None, false, &lan(), &scanner, &mut chooser).await;
        assert_eq!(target, Err(TargetError::NoDevicesFound { port: 23 }));
    }

    #[tokio::test]
    async fn test_aborted_selection_propagates() {
        // Arrange
        let scanner = scanner_finding(vec![
            Ipv4Addr::new(192, 168, 1, 10),
            Ipv4Addr::new(192, 168, 1, 11),
        ]);
        let mut chooser = MockDeviceChooser::new();
        chooser
            .expect_choose()
            .returning(|_| Err(TargetError::SelectionAborted));

        // Act
        let target = resolve_target(None, false, &lan(), &scanner, &mut chooser).await;

        // Assert
        assert_eq!(target, Err(TargetError::SelectionAborted));
    }
}
