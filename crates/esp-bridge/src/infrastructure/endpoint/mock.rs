//! In-memory endpoint for unit and integration tests.
//!
//! # Why a mock endpoint?
//!
//! The real endpoints allocate pseudo-terminals or open COM ports, which
//! needs OS support the test machine may not have and makes the bytes the
//! bridge writes hard to observe.  `MockEndpoint` keeps everything in
//! memory:
//!
//! - `push_input` queues bytes as if a serial tool had typed them; the
//!   bridge picks them up through [`Endpoint::read`].
//! - Everything the bridge writes is appended to an internal buffer readable
//!   through [`MockEndpoint::written`].
//! - Failure flags simulate a device that disappears mid-session.
//!
//! # Usage in tests
//!
//! ```ignore
//! let endpoint = MockEndpoint::shared("mock0");
//! let opener = MockEndpointOpener::new(Arc::clone(&endpoint));
//! // ... start a bridge with `opener` ...
//! endpoint.push_input(b"AT\r\n");
//! assert!(endpoint.wait_for_written(2, Duration::from_secs(1)));
//! ```

use std::collections::VecDeque;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use crate::application::endpoint::{Endpoint, EndpointError, EndpointOpener};

/// A mock endpoint that records writes and serves queued reads.
#[derive(Default)]
pub struct MockEndpoint {
    name: String,
    input: Mutex<VecDeque<u8>>,
    written: Mutex<Vec<u8>>,
    written_changed: Condvar,
    write_limit: Mutex<Option<usize>>,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
    closed: AtomicBool,
    close_calls: AtomicUsize,
}

impl MockEndpoint {
    /// Creates an open mock endpoint called `name`.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Shorthand for `Arc::new(MockEndpoint::new(name))`.
    pub fn shared(name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self::new(name))
    }

    /// Queues bytes for the bridge to read.
    pub fn push_input(&self, data: &[u8]) {
        lock(&self.input).extend(data.iter().copied());
    }

    /// Snapshot of everything written so far.
    pub fn written(&self) -> Vec<u8> {
        lock(&self.written).clone()
    }

    /// Blocks until at least `len` bytes have been written or `timeout`
    /// elapses.  Returns `true` on success.
    pub fn wait_for_written(&self, len: usize, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut written = lock(&self.written);
        while written.len() < len {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return false;
            }
            written = self
                .written_changed
                .wait_timeout(written, remaining)
                .map(|(g, _)| g)
                .unwrap_or_else(|p| p.into_inner().0);
        }
        true
    }

    /// Accept at most `limit` bytes per write call (`Some(0)` = always full).
    pub fn set_write_limit(&self, limit: Option<usize>) {
        *lock(&self.write_limit) = limit;
    }

    /// Make every subsequent read fail.
    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Make every subsequent write fail.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// How many times `close` has been called.
    pub fn close_calls(&self) -> usize {
        self.close_calls.load(Ordering::SeqCst)
    }
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

impl Endpoint for MockEndpoint {
    fn name(&self) -> &str {
        &self.name
    }

    fn read(&self, buf: &mut [u8]) -> Result<usize, EndpointError> {
        if self.is_closed() {
            return Err(EndpointError::Closed);
        }
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "mock read failure").into());
        }
        let mut input = lock(&self.input);
        let n = buf.len().min(input.len());
        for (slot, byte) in buf.iter_mut().zip(input.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }

    fn write(&self, data: &[u8]) -> Result<usize, EndpointError> {
        if self.is_closed() {
            return Err(EndpointError::Closed);
        }
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "mock write failure").into());
        }
        let n = match *lock(&self.write_limit) {
            Some(limit) => data.len().min(limit),
            None => data.len(),
        };
        lock(&self.written).extend_from_slice(&data[..n]);
        self.written_changed.notify_all();
        Ok(n)
    }

    fn close(&self) {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        self.closed.store(true, Ordering::SeqCst);
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// Opener that hands out one pre-built [`MockEndpoint`], or fails.
pub struct MockEndpointOpener {
    endpoint: Option<Arc<MockEndpoint>>,
    opens: AtomicUsize,
}

impl MockEndpointOpener {
    /// Every `open` returns `endpoint`.
    pub fn new(endpoint: Arc<MockEndpoint>) -> Self {
        Self {
            endpoint: Some(endpoint),
            opens: AtomicUsize::new(0),
        }
    }

    /// Every `open` fails with [`EndpointError::Allocation`].
    pub fn failing() -> Self {
        Self {
            endpoint: None,
            opens: AtomicUsize::new(0),
        }
    }

    /// Number of `open` calls so far, successful or not.
    pub fn open_calls(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }
}

impl EndpointOpener for MockEndpointOpener {
    fn open(&self, _hint: Option<&str>) -> Result<Arc<dyn Endpoint>, EndpointError> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        match &self.endpoint {
            Some(e) => Ok(Arc::clone(e) as Arc<dyn Endpoint>),
            None => Err(EndpointError::Allocation(io::Error::new(
                io::ErrorKind::Other,
                "mock endpoint allocation failure",
            ))),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
