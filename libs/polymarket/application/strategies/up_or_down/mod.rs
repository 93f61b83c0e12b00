//! Up or Down Strategy
//!
//! Monitors recurring crypto price prediction markets
//! with tags: 'Up or Down', 'Crypto Prices', 'Recurring', 'Crypto'
//!
//! When a market enters the delta_t window (time before end), this strategy
//! spawns a WebSocket tracker to monitor the orderbook in real-time.

mod services;
mod strategy;
pub mod tracker;
pub mod types;

pub use strategy::UpOrDownStrategy;
pub use types::{CryptoAsset, Timeframe};

// New standalone-bot runtime (§4.2-§4.7): Signal Engine, Kelly Risk
// Manager, oracle consensus/anchor tracking, order execution state
// machine, and the top-level Orchestrator. These are independent of
// the legacy DB-driven `UpOrDownStrategy` above, which keeps serving
// the pluggable sniper (`src/bin/sniper.rs`).
pub mod execution;
pub mod oracle;
pub mod orchestrator;
pub mod risk;
pub mod signal;

pub use orchestrator::Orchestrator;
