//! Re-export of the shared heartbeat utility for infrastructure-layer callers.

pub use crate::utils::Heartbeat;
