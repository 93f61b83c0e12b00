pub mod events;
pub mod markets;

pub use events::EventSyncService;
pub use markets::MarketSyncService;
