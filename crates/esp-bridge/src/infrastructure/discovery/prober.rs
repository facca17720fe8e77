//! TCP connect probe.
//!
//! A host counts as found when it completes the TCP handshake on the device
//! port within the timeout.  The connection is dropped immediately.

use std::io;
use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::TcpStream;
use tokio::time::timeout;

use crate::application::scanner::HostProber;

#[derive(Debug, Default, Clone, Copy)]
pub struct TcpProber;

#[async_trait]
impl HostProber for TcpProber {
    async fn probe(&self, addr: Ipv4Addr, port: u16, limit: Duration) -> io::Result<()> {
        let target = SocketAddr::from((addr, port));
        match timeout(limit, TcpStream::connect(target)).await {
            Ok(Ok(_stream)) => Ok(()),
            Ok(Err(e)) => Err(e),
            Err(_elapsed) => Err(io::Error::new(
                io::ErrorKind::TimedOut,
                format!("no answer within {limit:?}"),
            )),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_probe_succeeds_against_listener() {
        // Arrange
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        // Act
        let result = TcpProber
            .probe(Ipv4Addr::LOCALHOST, port, Duration::from_secs(1))
            .await;

        // Assert
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_probe_fails_on_closed_port() {
        // Arrange
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        // Act
        let result = TcpProber
            .probe(Ipv4Addr::LOCALHOST, port, Duration::from_secs(1))
            .await;

        // Assert
        assert!(result.is_err());
    }
}
