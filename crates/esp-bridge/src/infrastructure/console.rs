//! Interactive device selection on the terminal.

use std::io::{BufRead, Write};
use std::net::Ipv4Addr;

use tracing::warn;

use crate::application::target::{DeviceChooser, TargetError};

/// Prints a numbered list and reads a 1-based choice.
///
/// Generic over the reader and writer so tests can script the session.
pub struct ConsoleChooser<R, W> {
    input: R,
    output: W,
}

impl<R: BufRead, W: Write> ConsoleChooser<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    /// Gives back the writer, e.g. to inspect what was printed.
    pub fn into_output(self) -> W {
        self.output
    }

    fn prompt(&mut self, devices: &[Ipv4Addr]) -> std::io::Result<Option<Ipv4Addr>> {
        writeln!(self.output, "Found {} devices:", devices.len())?;
        for (i, addr) in devices.iter().enumerate() {
            writeln!(self.output, "  {}. {addr}", i + 1)?;
        }

        loop {
            write!(self.output, "Select device (1-{}): ", devices.len())?;
            self.output.flush()?;

            let mut line = String::new();
            if self.input.read_line(&mut line)? == 0 {
                return Ok(None);
            }
            match line.trim().parse::<usize>() {
                Ok(n) if (1..=devices.len()).contains(&n) => return Ok(Some(devices[n - 1])),
                _ => writeln!(
                    self.output,
                    "Invalid choice {:?}; enter a number between 1 and {}.",
                    line.trim(),
                    devices.len()
                )?,
            }
        }
    }
}

impl<R: BufRead, W: Write> DeviceChooser for ConsoleChooser<R, W> {
    fn choose(&mut self, devices: &[Ipv4Addr]) -> Result<Ipv4Addr, TargetError> {
        match self.prompt(devices) {
            Ok(Some(addr)) => Ok(addr),
            Ok(None) => Err(TargetError::SelectionAborted),
            Err(e) => {
                warn!("console prompt failed: {e}");
                Err(TargetError::SelectionAborted)
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
