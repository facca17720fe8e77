//! Pseudo-terminal endpoint (unix).
//!
//! `openpty` returns a master/slave pair.  The bridge reads and writes the
//! master; serial tools open the slave by path (e.g. `/dev/pts/7`), which is
//! what [`Endpoint::name`] reports.
//!
//! The slave is put into raw 115200-8-N-1 mode with every input, output and
//! local flag cleared, so bytes pass through untouched.  The master is
//! non-blocking: a read with nothing pending yields `Ok(0)` instead of
//! parking the thread, and a write into a full buffer yields `Ok(0)`.
//!
//! We keep our own slave fd open for the endpoint's lifetime.  Without it a
//! master read returns `EIO` whenever no serial tool is attached.

use std::fs::File;
use std::io::{self, Read, Write};
use std::os::fd::{AsRawFd, OwnedFd};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use nix::fcntl::{fcntl, FcntlArg, OFlag};
use nix::pty::openpty;
use nix::sys::termios::{
    self, BaudRate, ControlFlags, InputFlags, LocalFlags, OutputFlags, SetArg,
    SpecialCharacterIndices,
};
use nix::unistd::ttyname;
use tracing::{debug, warn};

use crate::application::endpoint::{Endpoint, EndpointError, EndpointOpener};

/// Opens a fresh [`PtyEndpoint`] per call.
#[derive(Debug, Default, Clone, Copy)]
pub struct PtyOpener;

impl EndpointOpener for PtyOpener {
    fn open(&self, hint: Option<&str>) -> Result<Arc<dyn Endpoint>, EndpointError> {
        if let Some(hint) = hint {
            warn!(hint, "pseudo-terminals pick their own device name; ignoring the requested port");
        }
        Ok(Arc::new(PtyEndpoint::open()?))
    }
}

/// A configured pseudo-terminal pair.
#[derive(Debug)]
pub struct PtyEndpoint {
    name: String,
    master: Mutex<Option<File>>,
    slave: Mutex<Option<OwnedFd>>,
    closed: AtomicBool,
}

fn alloc(e: nix::Error) -> EndpointError {
    EndpointError::Allocation(e.into())
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl PtyEndpoint {
    /// Allocates and configures a new pair.
    ///
    /// # Errors
    ///
    /// [`EndpointError::Allocation`] if any step fails; nothing is leaked
    /// since both fds are owned.
    pub fn open() -> Result<Self, EndpointError> {
        let pair = openpty(None, None).map_err(alloc)?;
        let name = ttyname(&pair.slave).map_err(alloc)?.display().to_string();

        configure_raw(&pair.slave).map_err(alloc)?;

        let raw = pair.master.as_raw_fd();
        let flags = OFlag::from_bits_truncate(fcntl(raw, FcntlArg::F_GETFL).map_err(alloc)?);
        fcntl(raw, FcntlArg::F_SETFL(flags | OFlag::O_NONBLOCK)).map_err(alloc)?;

        debug!(%name, "pseudo-terminal allocated");
        Ok(Self {
            name,
            master: Mutex::new(Some(File::from(pair.master))),
            slave: Mutex::new(Some(pair.slave)),
            closed: AtomicBool::new(false),
        })
    }
}

/// Raw mode at 115200 baud, 8 data bits, no parity, no flow control.
fn configure_raw(slave: &OwnedFd) -> nix::Result<()> {
    let mut t = termios::tcgetattr(slave)?;
    t.input_flags = InputFlags::empty();
    t.output_flags = OutputFlags::empty();
    t.local_flags = LocalFlags::empty();
    t.control_flags = ControlFlags::CS8 | ControlFlags::CREAD | ControlFlags::CLOCAL;
    t.control_chars[SpecialCharacterIndices::VMIN as usize] = 1;
    t.control_chars[SpecialCharacterIndices::VTIME as usize] = 0;
    termios::cfsetispeed(&mut t, BaudRate::B115200)?;
    termios::cfsetospeed(&mut t, BaudRate::B115200)?;
    termios::tcsetattr(slave, SetArg::TCSANOW, &t)
}

impl Endpoint for PtyEndpoint {
    fn name(&self) -> &str {
        &self.name
    }

    fn read(&self, buf: &mut [u8]) -> Result<usize, EndpointError> {
        let mut master = lock(&self.master);
        let file = master.as_mut().ok_or(EndpointError::Closed)?;
        match file.read(buf) {
            Ok(n) => Ok(n),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(0),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => Ok(0),
            Err(e) => Err(e.into()),
        }
    }

    fn write(&self, data: &[u8]) -> Result<usize, EndpointError> {
        let mut master = lock(&self.master);
        let file = master.as_mut().ok_or(EndpointError::Closed)?;
        match file.write(data) {
            Ok(n) => Ok(n),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(0),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => Ok(0),
            Err(e) => Err(e.into()),
        }
    }

    fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        lock(&self.master).take();
        lock(&self.slave).take();
        debug!(name = %self.name, "pseudo-terminal closed");
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl Drop for PtyEndpoint {
    fn drop(&mut self) {
        self.close();
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::OpenOptions;
    use std::thread;
    use std::time::{Duration, Instant};

    fn open_slave(name: &str) -> File {
        OpenOptions::new()
            .read(true)
            .write(true)
            .open(name)
            .expect("open slave")
    }

    /// Polls the master until `len` bytes have arrived.
    fn read_master(ep: &PtyEndpoint, len: usize) -> Vec<u8> {
        let deadline = Instant::now() + Duration::from_secs(2);
        let mut out = Vec::new();
        let mut buf = [0u8; 256];
        while out.len() < len && Instant::now() < deadline {
            let n = ep.read(&mut buf).expect("master read");
            if n == 0 {
                thread::sleep(Duration::from_millis(5));
            }
            out.extend_from_slice(&buf[..n]);
        }
        out
    }

    #[test]
    fn test_open_reports_slave_path() {
        let ep = PtyEndpoint::open().expect("openpty");
        assert!(ep.name().starts_with("/dev/"), "got {}", ep.name());
    }

    #[test]
    fn test_empty_master_read_returns_zero() {
        let ep = PtyEndpoint::open().expect("openpty");
        assert_eq!(ep.read(&mut [0u8; 16]).unwrap(), 0);
    }

    #[test]
    fn test_bytes_pass_through_untranslated() {
        // Arrange
        let ep = PtyEndpoint::open().expect("openpty");
        let mut slave = open_slave(ep.name());
        // CR, LF, ^C and a high byte would all be rewritten in cooked mode.
        let payload = b"a\r\nb\x03\xff";

        // Act
        slave.write_all(payload).unwrap();
        let got = read_master(&ep, payload.len());

        // Assert
        assert_eq!(got, payload);
    }

    #[test]
    fn test_master_write_reaches_slave() {
        // Arrange
        let ep = PtyEndpoint::open().expect("openpty");
        let mut slave = open_slave(ep.name());

        // Act
        let n = ep.write(b"OK\r\n").unwrap();
        let mut got = [0u8; 4];
        slave.read_exact(&mut got).unwrap();

        // Assert
        assert_eq!(n, 4);
        assert_eq!(&got, b"OK\r\n");
    }

    #[test]
    fn test_close_is_idempotent_and_rejects_io() {
        let ep = PtyEndpoint::open().expect("openpty");
        ep.close();
        ep.close();
        assert!(ep.is_closed());
        assert!(matches!(ep.read(&mut [0u8; 1]), Err(EndpointError::Closed)));
        assert!(matches!(ep.write(b"x"), Err(EndpointError::Closed)));
    }

    #[test]
    fn test_opener_ignores_hint() {
        let ep = PtyOpener.open(Some("COM3")).expect("open");
        assert_ne!(ep.name(), "COM3");
    }
}
