//! ESP32 UART bridge: entry point.
//!
//! Connects to an ESP32 that serves its UART on a TCP port and exposes the
//! stream as a local serial endpoint.
//!
//! # Usage
//!
//! ```text
//! esp-bridge [OPTIONS]
//!
//! Options:
//!   -i, --ip <ADDR>          ESP32 address; omit to scan for it
//!   -e, --esp-port <PORT>    ESP32 UART server port [default: 23]
//!   -p, --port <NAME>        Local serial port to attach to (Windows)
//!   -s, --scan               Scan the local network even if --ip is given
//!   -n, --network <CIDR>     Network to scan; repeatable
//!       --scan-port <PORT>   Port to probe while scanning [default: --esp-port]
//!   -v, --verbose            Debug logging
//! ```
//!
//! # Environment variable overrides
//!
//! CLI args take precedence when both are present.
//!
//! | Variable               | Description                          |
//! |------------------------|--------------------------------------|
//! | `ESP_BRIDGE_IP`        | ESP32 address                        |
//! | `ESP_BRIDGE_ESP_PORT`  | ESP32 UART server port               |
//! | `ESP_BRIDGE_PORT`      | Local serial port name               |
//! | `ESP_BRIDGE_NETWORKS`  | Comma-separated networks to scan     |
//!
//! `RUST_LOG` overrides the log filter entirely.
//!
//! # Architecture overview
//!
//! ```text
//! esp-bridge  ← this process
//!   application/
//!     target     pick the device (direct, scan, prompt)
//!     scanner    concurrent TCP probes over local subnets
//!     bridge     three forwarding/liveness threads + lifecycle
//!   infrastructure/
//!     endpoint/  pty (unix) | serial (windows) | mock
//!     transport/ tcp | mock
//!     discovery/ pnet interfaces, tokio TCP prober
//!     console    numbered device prompt
//!       ↕
//! ESP32 (raw UART bytes over TCP, port 23)
//! ```

use std::io;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use esp_bridge::application::resolve_target;
use esp_bridge::infrastructure::console::ConsoleChooser;
use esp_bridge::infrastructure::{build_bridge, build_scanner};
use esp_bridge_core::domain::config::DEFAULT_REMOTE_PORT;
use esp_bridge_core::{BridgeConfig, DiscoveredNetwork, NetworkOrigin, ScanConfig, SubnetError};

// ── CLI argument definitions ──────────────────────────────────────────────────

/// ESP32 UART bridge.
///
/// Exposes an ESP32's TCP-served UART as a local pseudo-terminal (Linux,
/// macOS) or attaches it to a virtual COM port (Windows).
#[derive(Debug, Parser)]
#[command(
    name = "esp-bridge",
    about = "Bridge an ESP32 TCP UART server to a local serial endpoint",
    version
)]
struct Cli {
    /// IP address or hostname of the ESP32.
    ///
    /// When omitted, the local network is scanned for devices.
    #[arg(short = 'i', long = "ip", env = "ESP_BRIDGE_IP")]
    ip: Option<String>,

    /// TCP port the ESP32 serves its UART on.
    #[arg(short = 'e', long, default_value_t = DEFAULT_REMOTE_PORT, env = "ESP_BRIDGE_ESP_PORT")]
    esp_port: u16,

    /// Local serial port to attach to, e.g. `COM10`.
    ///
    /// Required on Windows, where it should be one side of a virtual COM
    /// pair.  Ignored where a pseudo-terminal is created instead.
    #[arg(short = 'p', long, env = "ESP_BRIDGE_PORT")]
    port: Option<String>,

    /// Scan the local network for devices even when `--ip` is given.
    #[arg(short = 's', long)]
    scan: bool,

    /// Network to scan in CIDR form, e.g. `192.168.4.0/24`.
    ///
    /// Repeat the flag for several networks.  Defaults to the networks of
    /// the local interfaces.
    #[arg(
        short = 'n',
        long = "network",
        value_name = "CIDR",
        env = "ESP_BRIDGE_NETWORKS",
        value_delimiter = ','
    )]
    networks: Vec<String>,

    /// Port to probe while scanning.  Defaults to `--esp-port`.
    #[arg(long)]
    scan_port: Option<u16>,

    /// Log at debug level unless `RUST_LOG` says otherwise.
    #[arg(short = 'v', long)]
    verbose: bool,
}

impl Cli {
    /// Parses every `--network` value.
    ///
    /// # Errors
    ///
    /// Returns the first [`SubnetError::InvalidCidr`].
    fn parse_networks(&self) -> Result<Vec<DiscoveredNetwork>, SubnetError> {
        self.networks
            .iter()
            .map(|n| DiscoveredNetwork::parse(n, NetworkOrigin::Explicit))
            .collect()
    }

    /// Scanner settings: default limits, probing `--scan-port` or `--esp-port`.
    fn scan_config(&self) -> ScanConfig {
        ScanConfig::for_port(self.scan_port.unwrap_or(self.esp_port))
    }

    /// Converts the parsed CLI arguments into a [`BridgeConfig`] for `host`.
    fn into_bridge_config(self, host: String) -> BridgeConfig {
        BridgeConfig::new(host)
            .with_port(self.esp_port)
            .with_endpoint_hint(self.port)
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

/// Program entry point.
///
/// # What happens at startup
///
/// 1. CLI arguments are parsed and logging is initialised.
/// 2. The device address is resolved, scanning if needed.
/// 3. The bridge is started on a blocking thread; the endpoint name is
///    printed for the user.
/// 4. We wait for Ctrl+C or for the bridge to stop by itself, then stop it.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ─────────────────────────────────────────────────────────
    let fallback = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback)),
        )
        .init();

    let networks = cli
        .parse_networks()
        .context("invalid --network value")?;

    // ── Resolve the device address ────────────────────────────────────────────
    let host = {
        let scanner = build_scanner(cli.scan_config());
        let mut chooser = ConsoleChooser::new(io::stdin().lock(), io::stdout());
        resolve_target(
            cli.ip.as_deref(),
            cli.scan,
            &networks,
            &scanner,
            &mut chooser,
        )
        .await
        .context("could not determine the ESP32 address")?
    };

    let config = cli.into_bridge_config(host);
    info!(
        "ESP32 UART bridge starting: device={}",
        config.remote_addr()
    );

    // ── Start the bridge ──────────────────────────────────────────────────────
    //
    // Bridge calls block (connect, thread joins), so they run on the
    // blocking pool rather than on a runtime worker.
    let bridge = Arc::new(build_bridge(config));
    let endpoint = {
        let bridge = Arc::clone(&bridge);
        tokio::task::spawn_blocking(move || bridge.start())
            .await
            .context("bridge start task panicked")?
            .context("failed to start the bridge")?
    };
    info!("connect your serial tool to {endpoint}");

    // ── Run until Ctrl+C or the bridge stops on its own ──────────────────────
    let mut stopped = {
        let bridge = Arc::clone(&bridge);
        tokio::task::spawn_blocking(move || bridge.wait_stopped(None))
    };
    tokio::select! {
        signal = tokio::signal::ctrl_c() => match signal {
            Ok(()) => info!("received Ctrl+C; shutting down"),
            Err(e) => {
                error!("failed to listen for Ctrl+C signal: {e}");
                let _ = (&mut stopped).await;
            }
        },
        _ = &mut stopped => {}
    }

    let reason = {
        let bridge = Arc::clone(&bridge);
        tokio::task::spawn_blocking(move || bridge.stop())
            .await
            .context("bridge stop task panicked")?
    };
    match reason {
        Some(r) if r.is_unsolicited() => warn!("bridge stopped: {r}"),
        _ => info!("bridge stopped"),
    }
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_defaults() {
        // Arrange / Act
        let cli = Cli::parse_from(["esp-bridge"]);

        // Assert
        assert!(cli.ip.is_none());
        assert_eq!(cli.esp_port, 23);
        assert!(cli.port.is_none());
        assert!(!cli.scan);
        assert!(cli.networks.is_empty());
        assert!(cli.scan_port.is_none());
        assert!(!cli.verbose);
    }

    #[test]
    fn test_cli_short_flags() {
        let cli = Cli::parse_from([
            "esp-bridge", "-i", "192.168.1.42", "-e", "2323", "-p", "COM10", "-s", "-v",
        ]);
        assert_eq!(cli.ip.as_deref(), Some("192.168.1.42"));
        assert_eq!(cli.esp_port, 2323);
        assert_eq!(cli.port.as_deref(), Some("COM10"));
        assert!(cli.scan);
        assert!(cli.verbose);
    }

    #[test]
    fn test_cli_network_flag_is_repeatable() {
        // Arrange
        let cli = Cli::parse_from([
            "esp-bridge",
            "-n",
            "192.168.1.0/24",
            "--network",
            "10.0.0.0/24",
        ]);

        // Act
        let nets = cli.parse_networks().unwrap();

        // Assert
        assert_eq!(nets.len(), 2);
        assert_eq!(nets[1].to_string(), "10.0.0.0/24");
        assert!(nets.iter().all(|n| n.origin == NetworkOrigin::Explicit));
    }

    #[test]
    fn test_cli_network_accepts_comma_list() {
        let cli = Cli::parse_from(["esp-bridge", "-n", "192.168.1.0/24,192.168.4.0/24"]);
        assert_eq!(cli.parse_networks().unwrap().len(), 2);
    }

    #[test]
    fn test_invalid_network_is_rejected() {
        // Arrange
        let cli = Cli::parse_from(["esp-bridge", "-n", "192.168.1.0/40"]);

        // Act
        let result = cli.parse_networks();

        // Assert
        assert!(matches!(result, Err(SubnetError::InvalidCidr { .. })));
    }

    #[test]
    fn test_scan_port_defaults_to_esp_port() {
        let cli = Cli::parse_from(["esp-bridge", "-e", "8023"]);
        assert_eq!(cli.scan_config().port, 8023);
    }

    #[test]
    fn test_scan_port_override() {
        let cli = Cli::parse_from(["esp-bridge", "-e", "8023", "--scan-port", "23"]);
        assert_eq!(cli.scan_config().port, 23);
    }

    #[test]
    fn test_into_bridge_config_carries_port_and_hint() {
        // Arrange
        let cli = Cli::parse_from(["esp-bridge", "-e", "2323", "-p", "COM7"]);

        // Act
        let config = cli.into_bridge_config("192.168.1.42".to_string());

        // Assert
        assert_eq!(config.remote_addr(), "192.168.1.42:2323");
        assert_eq!(config.local_endpoint_hint.as_deref(), Some("COM7"));
        assert_eq!(config.timings, esp_bridge_core::BridgeTimings::default());
    }
}
