//! esp-bridge library entry point.
//!
//! Re-exports all public modules so that integration tests in `tests/`
//! and the binary entry point in `main.rs` share the same module tree.
//!
//! # What does esp-bridge do? (for beginners)
//!
//! Many ESP32 firmwares expose the chip's UART over Wi-Fi as a raw TCP
//! socket (TELNET-style, port 23).  Serial tools such as `minicom`, `screen`
//! or an IDE's serial monitor expect a local serial device instead.
//! esp-bridge sits in between:
//!
//! 1. Optionally scans the local subnets for hosts listening on the device
//!    port and picks (or asks for) one.
//! 2. Creates a local endpoint: a pseudo-terminal on Linux/macOS, or opens
//!    one side of a virtual COM-port pair on Windows.
//! 3. Connects to the device and copies bytes both ways until either side
//!    goes away or the user presses Ctrl+C.
//!
//! There is no protocol on the wire: bytes are forwarded verbatim.

/// Application layer: bridge, scanner and target-resolution use cases.
pub mod application;

/// Infrastructure layer: OS endpoints, TCP, interface enumeration, console.
pub mod infrastructure;
