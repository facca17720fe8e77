//! Production implementations of the scanner seams.

pub mod interfaces;
pub mod prober;

pub use interfaces::SystemInterfaces;
pub use prober::TcpProber;
