//! Common utilities for Polymarket binaries

mod shutdown;
mod heartbeat;
mod logging;

pub use shutdown::ShutdownManager;
pub use heartbeat::Heartbeat;
pub use logging::init_tracing;
