//! A failed `start()` on the real pty endpoint must give back every file
//! descriptor it opened.
//!
//! Kept in its own test binary: the descriptor count covers the whole
//! process, so no other test may run alongside it.

#![cfg(target_os = "linux")]

use std::fs;
use std::net::TcpListener;

use esp_bridge::application::BridgeError;
use esp_bridge::infrastructure::build_bridge;
use esp_bridge_core::{BridgeConfig, RunState};

fn open_fds() -> usize {
    fs::read_dir("/proc/self/fd")
        .expect("list /proc/self/fd")
        .count()
}

fn closed_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    listener.local_addr().expect("addr").port()
}

#[test]
fn test_failed_starts_release_pty_descriptors() {
    // Arrange: one warm-up run so lazily opened process-wide handles are
    // already counted.
    let port = closed_port();
    let warm_up = build_bridge(BridgeConfig::new("127.0.0.1").with_port(port));
    assert!(warm_up.start().is_err());
    drop(warm_up);
    let before = open_fds();

    // Act
    for _ in 0..20 {
        let bridge = build_bridge(BridgeConfig::new("127.0.0.1").with_port(port));
        let result = bridge.start();
        assert!(matches!(result, Err(BridgeError::Transport(_))), "start returned {result:?}");
        assert_eq!(bridge.state(), RunState::Stopped);
    }
    let after = open_fds();

    // Assert
    assert_eq!(before, after, "descriptors leaked across failed starts");
}
