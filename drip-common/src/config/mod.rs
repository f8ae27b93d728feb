//! Configuration shared between the delivery pipeline and the daemon.

pub mod timeouts;

pub use timeouts::ClientTimeouts;
