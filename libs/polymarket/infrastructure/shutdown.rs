//! Re-export of the shared shutdown utility for infrastructure-layer callers.

pub use crate::utils::ShutdownManager;
