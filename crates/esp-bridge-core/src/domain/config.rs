//! Bridge and scanner configuration types.
//!
//! [`BridgeConfig`] describes *where* to connect and *which* local endpoint
//! to expose.  [`BridgeTimings`] groups the fixed timing constants of the
//! forwarding loops, and [`ScanConfig`] holds the discovery scanner limits.
//!
//! The binary builds these structs from command-line arguments.  They are
//! plain data with no I/O, so tests can construct them directly, usually
//! with shortened timings.

use std::time::Duration;

/// Default TCP port of the ESP32 UART server (TELNET).
pub const DEFAULT_REMOTE_PORT: u16 = 23;

/// Baud rate the local endpoint is configured for (115200-8-N-1).
pub const LOCAL_BAUD_RATE: u32 = 115_200;

/// Upper bound on bytes moved per forwarding iteration.
pub const CHUNK_SIZE: usize = 1024;

/// Maximum number of probes the scanner keeps in flight.
pub const MAX_PROBES_IN_FLIGHT: usize = 50;

/// Narrowest prefix length the scanner still enumerates exhaustively.
///
/// A `/16` holds 65 534 hosts.  Anything wider is skipped.
pub const MIN_SCANNABLE_PREFIX: u8 = 16;

/// Fixed timing constants used by the bridge tasks.
///
/// Production code always uses [`BridgeTimings::default`]; the fields are
/// public so tests can shrink the intervals instead of sleeping for seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BridgeTimings {
    /// Upper bound on the TCP connect to the remote device.
    pub connect_timeout: Duration,

    /// Delay between two empty polls of the local endpoint.
    ///
    /// Ten milliseconds keeps typed characters feeling immediate without
    /// spinning a core.
    pub poll_interval: Duration,

    /// Period of the zero-length liveness probe on the transport.
    pub liveness_interval: Duration,

    /// How long `stop()` waits for each task before giving up on it.
    pub shutdown_grace: Duration,

    /// Maximum bytes read per forwarding iteration.
    pub chunk_size: usize,
}

impl Default for BridgeTimings {
    /// | Field             | Default    |
    /// |-------------------|------------|
    /// | connect_timeout   | 5 s        |
    /// | poll_interval     | 10 ms      |
    /// | liveness_interval | 5 s        |
    /// | shutdown_grace    | 1 s        |
    /// | chunk_size        | 1024 bytes |
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            poll_interval: Duration::from_millis(10),
            liveness_interval: Duration::from_secs(5),
            shutdown_grace: Duration::from_secs(1),
            chunk_size: CHUNK_SIZE,
        }
    }
}

/// Everything a bridge needs to know before it starts.
///
/// Immutable once the bridge has been constructed.
///
/// # Example
///
/// ```rust
/// use esp_bridge_core::BridgeConfig;
///
/// let cfg = BridgeConfig::new("192.168.1.42");
/// assert_eq!(cfg.remote_port, 23);
/// assert!(cfg.local_endpoint_hint.is_none());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeConfig {
    /// Hostname or IP address of the ESP32.
    pub remote_host: String,

    /// TCP port the ESP32 serves its UART on.
    pub remote_port: u16,

    /// Name of the local serial device to use, if the platform needs one.
    ///
    /// Serial-device endpoints (Windows) require it; pseudo-terminal
    /// endpoints allocate their own device and ignore it.
    pub local_endpoint_hint: Option<String>,

    /// Loop and timeout constants.
    pub timings: BridgeTimings,
}

impl BridgeConfig {
    /// Creates a config for `remote_host` on the default port with default
    /// timings and no endpoint hint.
    pub fn new(remote_host: impl Into<String>) -> Self {
        Self {
            remote_host: remote_host.into(),
            remote_port: DEFAULT_REMOTE_PORT,
            local_endpoint_hint: None,
            timings: BridgeTimings::default(),
        }
    }

    /// Overrides the remote port.
    pub fn with_port(mut self, port: u16) -> Self {
        self.remote_port = port;
        self
    }

    /// Sets the local endpoint hint.
    pub fn with_endpoint_hint(mut self, hint: Option<String>) -> Self {
        self.local_endpoint_hint = hint;
        self
    }

    /// Replaces the timing constants.
    pub fn with_timings(mut self, timings: BridgeTimings) -> Self {
        self.timings = timings;
        self
    }

    /// `host:port` form used in log lines and for address resolution.
    pub fn remote_addr(&self) -> String {
        format!("{}:{}", self.remote_host, self.remote_port)
    }
}

/// Limits and targets for the discovery scanner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanConfig {
    /// TCP port probed on every candidate host.
    pub port: u16,

    /// Connect timeout for a single probe.
    pub probe_timeout: Duration,

    /// Probes issued per batch.  A batch completes fully before the next one
    /// starts, so this is also the in-flight ceiling.
    pub max_in_flight: usize,

    /// Networks with a shorter prefix than this are skipped.
    pub min_prefix: u8,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_REMOTE_PORT,
            probe_timeout: Duration::from_secs(1),
            max_in_flight: MAX_PROBES_IN_FLIGHT,
            min_prefix: MIN_SCANNABLE_PREFIX,
        }
    }
}

impl ScanConfig {
    /// Default scanner settings targeting `port`.
    pub fn for_port(port: u16) -> Self {
        Self {
            port,
            ..Self::default()
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
