//! Scripted transport for unit and integration tests.
//!
//! `MockTransport` stands in for the TCP connection to the ESP32:
//!
//! - `push_inbound` queues bytes the "device" sends; a parked
//!   [`Transport::receive`] wakes up and returns them.
//! - `close_remote` makes the next receive return `Ok(0)`, as if the device
//!   closed the socket.
//! - In echo mode every sent chunk is queued back as inbound data after an
//!   optional delay, which gives a full loop through the bridge.
//! - Counters record sends, receives, probes and closes so tests can assert
//!   on how the bridge used the connection.

use std::collections::VecDeque;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use crate::application::transport::{Connector, Transport, TransportError};

#[derive(Default)]
struct Wire {
    inbound: VecDeque<u8>,
    remote_closed: bool,
    closed: bool,
}

/// A fake connection to the remote device.
#[derive(Default)]
pub struct MockTransport {
    peer: String,
    wire: Mutex<Wire>,
    wire_changed: Condvar,
    sent: Mutex<Vec<u8>>,
    sent_changed: Condvar,
    echo_delay: Option<Duration>,
    fail_sends: AtomicBool,
    fail_probes: AtomicBool,
    receive_calls: AtomicUsize,
    probe_calls: AtomicUsize,
    close_calls: AtomicUsize,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MockTransport {
    /// A silent transport: nothing arrives until the test pushes it.
    pub fn new() -> Self {
        Self {
            peer: "mock-esp32:23".to_string(),
            ..Self::default()
        }
    }

    /// Shorthand for `Arc::new(MockTransport::new())`.
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// A transport that sends every chunk straight back after `delay`.
    pub fn echo(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            echo_delay: Some(delay),
            ..Self::new()
        })
    }

    /// Queues bytes as if the device had sent them.
    pub fn push_inbound(&self, data: &[u8]) {
        lock(&self.wire).inbound.extend(data.iter().copied());
        self.wire_changed.notify_all();
    }

    /// Simulates the device closing its side of the connection.
    pub fn close_remote(&self) {
        lock(&self.wire).remote_closed = true;
        self.wire_changed.notify_all();
    }

    /// Make every subsequent send fail.
    pub fn set_fail_sends(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::SeqCst);
    }

    /// Make every subsequent probe fail.
    pub fn set_fail_probes(&self, fail: bool) {
        self.fail_probes.store(fail, Ordering::SeqCst);
    }

    /// Snapshot of everything sent so far.
    pub fn sent(&self) -> Vec<u8> {
        lock(&self.sent).clone()
    }

    /// Blocks until at least `len` bytes have been sent or `timeout`
    /// elapses.  Returns `true` on success.
    pub fn wait_for_sent(&self, len: usize, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut sent = lock(&self.sent);
        while sent.len() < len {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return false;
            }
            sent = self
                .sent_changed
                .wait_timeout(sent, remaining)
                .map(|(g, _)| g)
                .unwrap_or_else(|p| p.into_inner().0);
        }
        true
    }

    pub fn receive_calls(&self) -> usize {
        self.receive_calls.load(Ordering::SeqCst)
    }

    pub fn probe_calls(&self) -> usize {
        self.probe_calls.load(Ordering::SeqCst)
    }

    pub fn close_calls(&self) -> usize {
        self.close_calls.load(Ordering::SeqCst)
    }
}

impl Transport for MockTransport {
    fn peer(&self) -> &str {
        &self.peer
    }

    fn receive(&self, buf: &mut [u8]) -> Result<usize, TransportError> {
        self.receive_calls.fetch_add(1, Ordering::SeqCst);
        let mut wire = lock(&self.wire);
        loop {
            if wire.closed {
                return Err(TransportError::Closed);
            }
            if !wire.inbound.is_empty() {
                let n = buf.len().min(wire.inbound.len());
                for (slot, byte) in buf.iter_mut().zip(wire.inbound.drain(..n)) {
                    *slot = byte;
                }
                return Ok(n);
            }
            if wire.remote_closed {
                return Ok(0);
            }
            wire = self
                .wire_changed
                .wait(wire)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    fn send(&self, data: &[u8]) -> Result<(), TransportError> {
        if lock(&self.wire).closed {
            return Err(TransportError::Closed);
        }
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "mock send failure").into());
        }
        lock(&self.sent).extend_from_slice(data);
        self.sent_changed.notify_all();

        if let Some(delay) = self.echo_delay {
            if !delay.is_zero() {
                thread::sleep(delay);
            }
            self.push_inbound(data);
        }
        Ok(())
    }

    fn probe(&self) -> Result<(), TransportError> {
        self.probe_calls.fetch_add(1, Ordering::SeqCst);
        if lock(&self.wire).closed {
            return Err(TransportError::Closed);
        }
        if self.fail_probes.load(Ordering::SeqCst) {
            return Err(io::Error::new(io::ErrorKind::ConnectionReset, "mock probe failure").into());
        }
        Ok(())
    }

    fn close(&self) {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        lock(&self.wire).closed = true;
        self.wire_changed.notify_all();
    }
}

/// Connector that hands out one pre-built [`MockTransport`], or fails.
pub struct MockConnector {
    transport: Option<Arc<MockTransport>>,
    connects: AtomicUsize,
}

impl MockConnector {
    pub fn new(transport: Arc<MockTransport>) -> Self {
        Self {
            transport: Some(transport),
            connects: AtomicUsize::new(0),
        }
    }

    /// Every `connect` fails with [`TransportError::ConnectFailed`].
    pub fn failing() -> Self {
        Self {
            transport: None,
            connects: AtomicUsize::new(0),
        }
    }

    pub fn connect_calls(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

impl Connector for MockConnector {
    fn connect(
        &self,
        host: &str,
        port: u16,
        _timeout: Duration,
    ) -> Result<Arc<dyn Transport>, TransportError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        match &self.transport {
            Some(t) => Ok(Arc::clone(t) as Arc<dyn Transport>),
            None => Err(TransportError::ConnectFailed {
                addr: format!("{host}:{port}"),
                source: io::Error::new(io::ErrorKind::ConnectionRefused, "mock refusal"),
            }),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
