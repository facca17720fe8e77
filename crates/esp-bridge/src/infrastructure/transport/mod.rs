//! Transport implementations: TCP for production, a scripted mock for tests.

pub mod mock;
pub mod tcp;

pub use tcp::{TcpConnector, TcpTransport};
