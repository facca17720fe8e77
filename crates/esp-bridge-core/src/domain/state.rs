//! Bridge lifecycle state and stop reasons.
//!
//! ```text
//!            start()                 ok
//!  Stopped ──────────▶ Starting ──────────▶ Running
//!     ▲                   │                    │ stop() / fatal I/O
//!     │   setup failure   │                    ▼
//!     ├───────────────────┘                 Stopping
//!     │                                        │ tasks joined (or grace elapsed)
//!     └────────────────────────────────────────┘
//! ```
//!
//! A bridge walks this cycle once.  Restarting means building a new bridge.

use std::fmt;

/// Lifecycle state of a bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RunState {
    /// Not forwarding; no resources held.
    #[default]
    Stopped,
    /// Acquiring the local endpoint and the transport.
    Starting,
    /// Both resources held; forwarding and liveness tasks active.
    Running,
    /// Shutdown signalled; tasks are draining.
    Stopping,
}

impl RunState {
    /// Returns `true` if moving from `self` to `next` is a legal transition.
    pub fn can_transition_to(self, next: RunState) -> bool {
        matches!(
            (self, next),
            (RunState::Stopped, RunState::Starting)
                | (RunState::Starting, RunState::Running)
                | (RunState::Starting, RunState::Stopped)
                | (RunState::Running, RunState::Stopping)
                | (RunState::Stopping, RunState::Stopped)
        )
    }

    /// Only the `Running` state may move bytes.
    pub fn is_forwarding(self) -> bool {
        self == RunState::Running
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunState::Stopped => "stopped",
            RunState::Starting => "starting",
            RunState::Running => "running",
            RunState::Stopping => "stopping",
        };
        f.write_str(s)
    }
}

/// Why a bridge left the `Running` state.
///
/// The first reason recorded wins: if the liveness probe fails and the
/// forwarding task then sees the closed socket, the bridge still reports
/// [`StopReason::LivenessFailed`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StopReason {
    /// `stop()` was called by the owner.
    Requested,
    /// The device closed the TCP connection (zero-length receive).
    RemoteClosed,
    /// A send or receive on the transport failed.
    TransportLost,
    /// A read or write on the local endpoint failed.
    EndpointClosed,
    /// The periodic zero-length probe failed.
    LivenessFailed,
}

impl StopReason {
    /// `true` for every reason except an explicit [`StopReason::Requested`].
    pub fn is_unsolicited(self) -> bool {
        self != StopReason::Requested
    }
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StopReason::Requested => "stop requested",
            StopReason::RemoteClosed => "remote device closed the connection",
            StopReason::TransportLost => "connection to remote device lost",
            StopReason::EndpointClosed => "local endpoint closed",
            StopReason::LivenessFailed => "liveness probe failed",
        };
        f.write_str(s)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
