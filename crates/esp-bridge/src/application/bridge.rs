//! Bridge use case: forward bytes between the remote transport and the local
//! endpoint until one side goes away or the owner calls [`Bridge::stop`].
//!
//! # How it works (for beginners)
//!
//! A running bridge has three OS threads:
//!
//! ```text
//!   remote-to-local : transport.receive() ──▶ endpoint.write()
//!   local-to-remote : endpoint.read()     ──▶ transport.send()   (10 ms poll)
//!   liveness        : every 5 s            ──▶ transport.probe()
//! ```
//!
//! All three share one `Shared` block holding the [`RunState`] behind a
//! `Mutex` + `Condvar`, plus the two resource slots.  Any task that hits a
//! fatal condition calls `begin_stop`, which flips the state to `Stopping`
//! and closes both resources.  Closing the transport unblocks the
//! remote-to-local thread parked in `receive`; the condvar wakes the
//! liveness thread; the poll loop notices the state at its next iteration.
//!
//! Each thread carries a `TaskGuard`.  When the last guard drops while the
//! bridge is `Stopping`, the bridge becomes `Stopped`.  That counter is the
//! single shutdown barrier that [`Bridge::stop`] and [`Bridge::wait_stopped`]
//! wait on; a thread never joins itself.

use std::io;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;

use esp_bridge_core::{BridgeConfig, BridgeTimings, RunState, StopReason};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::application::endpoint::{Endpoint, EndpointError, EndpointOpener};
use crate::application::transport::{Connector, Transport, TransportError};

/// Number of threads a running bridge owns.
const TASK_COUNT: u32 = 3;

/// Error type for [`Bridge::start`].
#[derive(Debug, Error)]
pub enum BridgeError {
    /// `start()` was called on a bridge that has already been started once.
    #[error("bridge has already been started; build a new bridge to reconnect")]
    AlreadyUsed,

    /// The local endpoint could not be opened.
    #[error(transparent)]
    Endpoint(#[from] EndpointError),

    /// The remote device could not be reached.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// [`Bridge::stop`] arrived while `start()` was still setting up.
    /// Everything acquired so far has been released.
    #[error("bridge start was cancelled by a stop request")]
    Cancelled,

    /// The OS refused to create a forwarding thread.
    #[error("failed to spawn bridge task {name}: {source}")]
    Spawn {
        name: &'static str,
        #[source]
        source: io::Error,
    },
}

// ── Shared state ──────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct Lifecycle {
    state: RunState,
    reason: Option<StopReason>,
    live_tasks: usize,
    started: bool,
    /// A stop arrived during `Starting`; `start()` must not go `Running`.
    cancelled: bool,
    endpoint_name: Option<String>,
}

impl Lifecycle {
    fn transition(&mut self, next: RunState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "illegal bridge transition {} -> {}",
            self.state,
            next
        );
        debug!(from = %self.state, to = %next, "bridge state change");
        self.state = next;
    }
}

/// State shared between the owner and the bridge threads.
struct Shared {
    lifecycle: Mutex<Lifecycle>,
    changed: Condvar,
    transport: Mutex<Option<Arc<dyn Transport>>>,
    endpoint: Mutex<Option<Arc<dyn Endpoint>>>,
}

/// Locks `m`, recovering the data if a thread panicked while holding it.
fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Shared {
    fn new() -> Self {
        Self {
            lifecycle: Mutex::new(Lifecycle::default()),
            changed: Condvar::new(),
            transport: Mutex::new(None),
            endpoint: Mutex::new(None),
        }
    }

    fn is_running(&self) -> bool {
        lock(&self.lifecycle).state.is_forwarding()
    }

    /// Moves `Running` to `Stopping`, records `reason` and closes both
    /// resources.  During `Starting` the request is recorded and `start()`
    /// backs out on its own.  Returns `false` if there was nothing to stop.
    fn begin_stop(&self, reason: StopReason) -> bool {
        let mut lc = lock(&self.lifecycle);
        match lc.state {
            RunState::Running => {}
            RunState::Starting if !lc.cancelled => {
                lc.cancelled = true;
                lc.reason.get_or_insert(reason);
                self.changed.notify_all();
                return true;
            }
            _ => return false,
        }
        lc.transition(RunState::Stopping);
        lc.reason.get_or_insert(reason);

        // Resources are closed before the lock is released so that an
        // observer of `Stopped` never sees a live handle.
        let transport = lock(&self.transport).take();
        let endpoint = lock(&self.endpoint).take();
        if let Some(t) = transport {
            t.close();
        }
        if let Some(e) = endpoint {
            e.close();
        }

        if lc.live_tasks == 0 {
            lc.transition(RunState::Stopped);
        }
        self.changed.notify_all();
        true
    }

    /// Blocks for up to `timeout` while the bridge is running.  Returns
    /// `true` if it is still running afterwards.
    fn wait_while_running(&self, timeout: Duration) -> bool {
        let lc = lock(&self.lifecycle);
        let (lc, _) = self
            .changed
            .wait_timeout_while(lc, timeout, |l| l.state.is_forwarding())
            .unwrap_or_else(PoisonError::into_inner);
        lc.state.is_forwarding()
    }
}

/// Registration of one bridge thread in the shutdown barrier.
///
/// Dropping the guard deregisters the thread.  Once armed by its running
/// thread, a guard that drops while the bridge is still running (a panic)
/// stops the bridge with `on_exit`.  An unarmed guard belongs to a thread
/// that was never spawned and only deregisters.
struct TaskGuard {
    shared: Arc<Shared>,
    name: &'static str,
    on_exit: StopReason,
    armed: bool,
}

impl TaskGuard {
    fn register(
        lc: &mut Lifecycle,
        shared: &Arc<Shared>,
        name: &'static str,
        on_exit: StopReason,
    ) -> Self {
        lc.live_tasks += 1;
        Self {
            shared: Arc::clone(shared),
            name,
            on_exit,
            armed: false,
        }
    }

    fn arm(mut self) -> Self {
        self.armed = true;
        self
    }
}

impl Drop for TaskGuard {
    fn drop(&mut self) {
        if self.armed && self.shared.begin_stop(self.on_exit) {
            error!(task = self.name, "bridge task ended unexpectedly; stopping bridge");
        }

        let mut lc = lock(&self.shared.lifecycle);
        lc.live_tasks = lc.live_tasks.saturating_sub(1);
        debug!(task = self.name, remaining = lc.live_tasks, "bridge task exited");
        if lc.live_tasks == 0 && lc.state == RunState::Stopping {
            lc.transition(RunState::Stopped);
            self.shared.changed.notify_all();
        }
    }
}

// ── Bridge ────────────────────────────────────────────────────────────────────

/// One TCP ↔ local-endpoint bridge.
///
/// A bridge runs at most once: after it stops, build a new one to reconnect.
///
/// # Example
///
/// ```rust,no_run
/// use esp_bridge::infrastructure::build_bridge;
/// use esp_bridge_core::BridgeConfig;
///
/// let bridge = build_bridge(BridgeConfig::new("192.168.1.42"));
/// let name = bridge.start()?;
/// println!("connect your serial tool to {name}");
/// bridge.wait_stopped(None);
/// # Ok::<(), esp_bridge::application::bridge::BridgeError>(())
/// ```
pub struct Bridge {
    config: BridgeConfig,
    opener: Arc<dyn EndpointOpener>,
    connector: Arc<dyn Connector>,
    shared: Arc<Shared>,
}

impl Bridge {
    /// Creates a stopped bridge.  No resources are acquired until
    /// [`Bridge::start`].
    pub fn new(
        config: BridgeConfig,
        opener: Arc<dyn EndpointOpener>,
        connector: Arc<dyn Connector>,
    ) -> Self {
        Self {
            config,
            opener,
            connector,
            shared: Arc::new(Shared::new()),
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> RunState {
        lock(&self.shared.lifecycle).state
    }

    /// Why the bridge stopped, once it has.
    pub fn stop_reason(&self) -> Option<StopReason> {
        lock(&self.shared.lifecycle).reason
    }

    /// Name of the local endpoint, once started.
    pub fn endpoint_name(&self) -> Option<String> {
        lock(&self.shared.lifecycle).endpoint_name.clone()
    }

    /// Opens the local endpoint, connects to the remote device and starts
    /// forwarding.  Returns the endpoint's externally addressable name.
    ///
    /// # Errors
    ///
    /// - [`BridgeError::AlreadyUsed`] if this bridge was started before.
    /// - [`BridgeError::Endpoint`] / [`BridgeError::Transport`] on setup
    ///   failure.  The bridge is back in `Stopped` and holds nothing.
    /// - [`BridgeError::Cancelled`] if [`Bridge::stop`] was called while
    ///   setup was in progress.  The bridge is `Stopped` and holds nothing.
    /// - [`BridgeError::Spawn`] if a thread could not be created.  The bridge
    ///   has been stopped.
    pub fn start(&self) -> Result<String, BridgeError> {
        {
            let mut lc = lock(&self.shared.lifecycle);
            if lc.started {
                return Err(BridgeError::AlreadyUsed);
            }
            lc.started = true;
            lc.transition(RunState::Starting);
        }

        let endpoint = match self
            .opener
            .open(self.config.local_endpoint_hint.as_deref())
        {
            Ok(e) => e,
            Err(e) => {
                self.abort_start();
                return Err(e.into());
            }
        };
        info!(endpoint = endpoint.name(), "local endpoint ready");

        if lock(&self.shared.lifecycle).cancelled {
            endpoint.close();
            return Err(self.cancel_start());
        }

        let timings = self.config.timings;
        let transport = match self.connector.connect(
            &self.config.remote_host,
            self.config.remote_port,
            timings.connect_timeout,
        ) {
            Ok(t) => t,
            Err(e) => {
                endpoint.close();
                self.abort_start();
                return Err(e.into());
            }
        };
        info!(peer = transport.peer(), "connected to remote device");

        let name = endpoint.name().to_string();
        *lock(&self.shared.transport) = Some(Arc::clone(&transport));
        *lock(&self.shared.endpoint) = Some(Arc::clone(&endpoint));

        // The cancellation check, the guard registration and the move to
        // Running happen under one lock so a concurrent stop() either
        // cancels the start or sees a fully registered Running bridge.
        let guards = {
            let mut lc = lock(&self.shared.lifecycle);
            if lc.cancelled {
                drop(lc);
                let transport = lock(&self.shared.transport).take();
                let endpoint = lock(&self.shared.endpoint).take();
                if let Some(t) = transport {
                    t.close();
                }
                if let Some(e) = endpoint {
                    e.close();
                }
                return Err(self.cancel_start());
            }
            let guards = [
                TaskGuard::register(&mut lc, &self.shared, "remote-to-local", StopReason::TransportLost),
                TaskGuard::register(&mut lc, &self.shared, "local-to-remote", StopReason::EndpointClosed),
                TaskGuard::register(&mut lc, &self.shared, "liveness", StopReason::LivenessFailed),
            ];
            lc.endpoint_name = Some(name.clone());
            lc.transition(RunState::Running);
            guards
        };

        let [r2l, l2r, live] = guards;
        let spawned = self
            .spawn_task(r2l, {
                let (shared, t, e) = (Arc::clone(&self.shared), Arc::clone(&transport), Arc::clone(&endpoint));
                move || remote_to_local(&shared, t.as_ref(), e.as_ref(), timings)
            })
            .and_then(|()| {
                self.spawn_task(l2r, {
                    let (shared, t, e) = (Arc::clone(&self.shared), Arc::clone(&transport), Arc::clone(&endpoint));
                    move || local_to_remote(&shared, t.as_ref(), e.as_ref(), timings)
                })
            })
            .and_then(|()| {
                self.spawn_task(live, {
                    let (shared, t) = (Arc::clone(&self.shared), Arc::clone(&transport));
                    move || liveness(&shared, t.as_ref(), timings)
                })
            });

        if let Err(e) = spawned {
            error!("{e}");
            self.stop();
            return Err(e);
        }

        info!(endpoint = %name, peer = transport.peer(), "bridge running");
        Ok(name)
    }

    /// Stops the bridge and waits for its threads to exit.
    ///
    /// Safe to call any number of times; calls after the first return the
    /// recorded reason immediately.  A call that lands while another thread
    /// is inside [`Bridge::start`] cancels that start and waits for it to
    /// back out.  Threads that are still busy after the grace period are
    /// abandoned with a warning and the bridge is reported `Stopped`
    /// regardless.
    pub fn stop(&self) -> Option<StopReason> {
        if self.shared.begin_stop(StopReason::Requested) {
            info!("stopping bridge");
        }

        let timings = self.config.timings;
        let budget = timings.connect_timeout + timings.shutdown_grace * TASK_COUNT;
        let lc = lock(&self.shared.lifecycle);
        let (mut lc, timeout) = self
            .shared
            .changed
            .wait_timeout_while(lc, budget, |l| {
                matches!(l.state, RunState::Starting | RunState::Stopping)
            })
            .unwrap_or_else(PoisonError::into_inner);

        if timeout.timed_out() && lc.state == RunState::Stopping {
            warn!(
                remaining = lc.live_tasks,
                "bridge tasks did not exit within {budget:?}; abandoning them"
            );
            lc.transition(RunState::Stopped);
            self.shared.changed.notify_all();
        }
        lc.reason
    }

    /// Blocks until the bridge is `Stopped`, or `timeout` elapses.
    ///
    /// Returns `true` if the bridge is stopped.  A bridge that was never
    /// started counts as stopped.
    pub fn wait_stopped(&self, timeout: Option<Duration>) -> bool {
        let lc = lock(&self.shared.lifecycle);
        let busy = |l: &mut Lifecycle| l.state != RunState::Stopped;
        let lc = match timeout {
            Some(d) => {
                self.shared
                    .changed
                    .wait_timeout_while(lc, d, busy)
                    .unwrap_or_else(PoisonError::into_inner)
                    .0
            }
            None => self
                .shared
                .changed
                .wait_while(lc, busy)
                .unwrap_or_else(PoisonError::into_inner),
        };
        lc.state == RunState::Stopped
    }

    fn abort_start(&self) {
        let mut lc = lock(&self.shared.lifecycle);
        lc.transition(RunState::Stopped);
        self.shared.changed.notify_all();
    }

    fn cancel_start(&self) -> BridgeError {
        info!("bridge start cancelled");
        self.abort_start();
        BridgeError::Cancelled
    }

    fn spawn_task<F>(&self, guard: TaskGuard, body: F) -> Result<(), BridgeError>
    where
        F: FnOnce() + Send + 'static,
    {
        let name = guard.name;
        thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                let _guard = guard.arm();
                body();
            })
            .map(|_detached| ())
            .map_err(|source| BridgeError::Spawn { name, source })
    }
}

impl Drop for Bridge {
    fn drop(&mut self) {
        self.stop();
    }
}

// ── Tasks ─────────────────────────────────────────────────────────────────────

/// Stops the bridge on behalf of a task, logging only if this call was the
/// one that initiated the shutdown.
fn fail(shared: &Shared, reason: StopReason, detail: &dyn std::fmt::Display) {
    if shared.begin_stop(reason) {
        warn!("{reason}: {detail}");
    }
}

fn remote_to_local(
    shared: &Shared,
    transport: &dyn Transport,
    endpoint: &dyn Endpoint,
    timings: BridgeTimings,
) {
    let mut buf = vec![0u8; timings.chunk_size];
    while shared.is_running() {
        let n = match transport.receive(&mut buf) {
            Ok(0) => {
                fail(shared, StopReason::RemoteClosed, &transport.peer());
                return;
            }
            Ok(n) => n,
            Err(e) => {
                fail(shared, StopReason::TransportLost, &e);
                return;
            }
        };
        debug!(bytes = n, "remote -> local");
        if let Err(e) = write_fully(shared, endpoint, &buf[..n], timings.poll_interval) {
            fail(shared, StopReason::EndpointClosed, &e);
            return;
        }
    }
}

fn local_to_remote(
    shared: &Shared,
    transport: &dyn Transport,
    endpoint: &dyn Endpoint,
    timings: BridgeTimings,
) {
    let mut buf = vec![0u8; timings.chunk_size];
    while shared.is_running() {
        match endpoint.read(&mut buf) {
            Ok(0) => thread::sleep(timings.poll_interval),
            Ok(n) => {
                debug!(bytes = n, "local -> remote");
                if let Err(e) = transport.send(&buf[..n]) {
                    fail(shared, StopReason::TransportLost, &e);
                    return;
                }
            }
            Err(e) => {
                fail(shared, StopReason::EndpointClosed, &e);
                return;
            }
        }
    }
}

fn liveness(shared: &Shared, transport: &dyn Transport, timings: BridgeTimings) {
    while shared.wait_while_running(timings.liveness_interval) {
        match transport.probe() {
            Ok(()) => debug!(peer = transport.peer(), "liveness probe ok"),
            Err(e) => {
                fail(shared, StopReason::LivenessFailed, &e);
                return;
            }
        }
    }
}

/// Writes all of `data`, retrying at `poll` while the endpoint is full.
///
/// Gives up silently once the bridge is no longer running.
fn write_fully(
    shared: &Shared,
    endpoint: &dyn Endpoint,
    mut data: &[u8],
    poll: Duration,
) -> Result<(), EndpointError> {
    while !data.is_empty() {
        let n = endpoint.write(data)?;
        if n == 0 {
            if !shared.is_running() {
                return Ok(());
            }
            thread::sleep(poll);
            continue;
        }
        data = &data[n..];
    }
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
