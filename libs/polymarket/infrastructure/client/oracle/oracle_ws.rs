//! WebSocket client for Oracle price tracking
//!
//! Connects to Polymarket's live data WebSocket to receive real-time
//! crypto price updates from ChainLink and Binance oracles.

use super::price_manager::{OraclePriceManager, SharedOraclePrices};
use super::types::{OracleMessage, OraclePriceUpdate, OracleSubscription, OracleType};
use anyhow::Result;
use hypersockets::core::*;
use hypersockets::traits::reconnect::NeverReconnect;
use hypersockets::{MessageHandler, MessageRouter, WsMessage};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};

/// WebSocket URL for Polymarket live data
const ORACLE_WS_URL: &str = "wss://ws-live-data.polymarket.com";

/// Initial reconnect backoff after a stream drop
const RECONNECT_INITIAL_BACKOFF_SECS: u64 = 5;

/// Cap on reconnect backoff
const RECONNECT_MAX_BACKOFF_SECS: u64 = 120;

/// Watchdog poll cadence
const WATCHDOG_INTERVAL_SECS: u64 = 10;

/// If no message has arrived within this many seconds, the watchdog force-closes
/// the connection so the outer loop reconnects.
const WATCHDOG_STALE_SECS: f64 = 30.0;

fn now_unix_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Backoff used between reconnect attempts of a single oracle stream.
/// Doubles on each failed session, resets to the initial delay after any
/// session that received at least one message.
struct SessionBackoff {
    next_delay: Duration,
}

impl SessionBackoff {
    fn new() -> Self {
        Self {
            next_delay: Duration::from_secs(RECONNECT_INITIAL_BACKOFF_SECS),
        }
    }

    fn reset(&mut self) {
        self.next_delay = Duration::from_secs(RECONNECT_INITIAL_BACKOFF_SECS);
    }

    fn advance(&mut self) -> Duration {
        let delay = self.next_delay;
        self.next_delay = (self.next_delay * 2).min(Duration::from_secs(RECONNECT_MAX_BACKOFF_SECS));
        delay
    }
}

/// Heartbeat interval in seconds
const HEARTBEAT_INTERVAL_SECS: u64 = 8;

// =============================================================================
// Symbol Parsing
// =============================================================================

/// Parse ChainLink symbol format ("eth/usd" -> "ETH")
pub fn parse_chainlink_symbol(symbol: &str) -> String {
    // ChainLink format: "eth/usd", "btc/usd", etc.
    // Extract the base currency (before the slash)
    symbol
        .split('/')
        .next()
        .unwrap_or(symbol)
        .to_uppercase()
}

/// Parse Binance symbol format ("solusdt" -> "SOL")
pub fn parse_binance_symbol(symbol: &str) -> String {
    // Binance format: "solusdt", "btcusdt", etc.
    // Strip the "usdt" suffix
    let lower = symbol.to_lowercase();
    if lower.ends_with("usdt") {
        lower[..lower.len() - 4].to_uppercase()
    } else {
        symbol.to_uppercase()
    }
}

// =============================================================================
// Router - Parses WebSocket messages
// =============================================================================

/// Route key for oracle messages
#[derive(Debug, Clone, Hash, Eq, PartialEq)]
pub enum OracleRoute {
    Oracle(OracleType),
}

/// Router for parsing WebSocket messages
pub struct OracleRouter {
    oracle_type: OracleType,
}

impl OracleRouter {
    pub fn new(oracle_type: OracleType) -> Self {
        Self { oracle_type }
    }
}

#[async_trait::async_trait]
impl MessageRouter for OracleRouter {
    type Message = OracleMessage;
    type RouteKey = OracleRoute;

    async fn parse(&self, message: WsMessage) -> hypersockets::Result<Self::Message> {
        let text = match message.as_text() {
            Some(t) => t,
            None => return Ok(OracleMessage::Unknown("Binary data".to_string())),
        };

        // Check for PONG response
        if text == "PONG" {
            return Ok(OracleMessage::Pong);
        }

        // Try to parse as price update
        if let Ok(update) = serde_json::from_str::<OraclePriceUpdate>(text) {
            if update.msg_type == "update" {
                return Ok(OracleMessage::PriceUpdate(update));
            }
        }

        // Unknown message
        debug!("[Oracle {}] Unknown message: {}", self.oracle_type, text);
        Ok(OracleMessage::Unknown(text.to_string()))
    }

    fn route_key(&self, _message: &Self::Message) -> Self::RouteKey {
        OracleRoute::Oracle(self.oracle_type)
    }
}

// =============================================================================
// Handler - Processes and stores price updates
// =============================================================================

/// Handler for processing oracle price messages
pub struct OracleHandler {
    oracle_type: OracleType,
    prices: SharedOraclePrices,
    message_count: u64,
}

impl OracleHandler {
    pub fn new(oracle_type: OracleType, prices: SharedOraclePrices) -> Self {
        Self {
            oracle_type,
            prices,
            message_count: 0,
        }
    }

    /// Process a price update and store it
    fn handle_price_update(&mut self, update: &OraclePriceUpdate) {
        // Parse the symbol based on oracle type
        let symbol = match self.oracle_type {
            OracleType::ChainLink => parse_chainlink_symbol(&update.payload.symbol),
            OracleType::Binance => parse_binance_symbol(&update.payload.symbol),
        };

        // Update the price in shared state
        {
            let mut prices = self.prices.write().unwrap();
            prices.update_price(
                self.oracle_type,
                &symbol,
                update.payload.value,
                update.payload.timestamp,
            );
            prices.health_mut(self.oracle_type).record_success(now_unix_ms());
        }

        debug!(
            "[Oracle {}] {} = {} (ts: {})",
            self.oracle_type, symbol, update.payload.value, update.payload.timestamp
        );
    }
}

impl MessageHandler<OracleMessage> for OracleHandler {
    fn handle(&mut self, message: OracleMessage) -> hypersockets::Result<()> {
        self.message_count += 1;

        match message {
            OracleMessage::PriceUpdate(update) => self.handle_price_update(&update),
            OracleMessage::Pong => debug!("[Oracle {}] Pong received", self.oracle_type),
            OracleMessage::Unknown(_) => {}
        }

        Ok(())
    }
}

// =============================================================================
// WebSocket Client Builder
// =============================================================================

/// Build a WebSocket client for the given oracle type.
///
/// Each WebSocket client uses a local shutdown flag because hypersockets
/// sets the flag to false during `client.shutdown()`, which would
/// inadvertently trigger global shutdown if shared.
async fn build_oracle_ws_client(
    oracle_type: OracleType,
    prices: SharedOraclePrices,
) -> Result<WebSocketClient<OracleRouter, OracleMessage>> {
    let local_shutdown_flag = Arc::new(AtomicBool::new(true));

    let router = OracleRouter::new(oracle_type);
    let handler = OracleHandler::new(oracle_type, prices);

    let subscription = OracleSubscription::new(oracle_type);
    let subscription_json = serde_json::to_string(&subscription)?;

    // Reconnection is driven by the outer loop in `spawn_single_oracle_tracker`
    // so that we can apply our own watchdog and expose health counters; the
    // inner client only needs to run a single session.
    let client = WebSocketClientBuilder::new()
        .url(ORACLE_WS_URL)
        .router(router, move |routing| {
            routing.handler(OracleRoute::Oracle(oracle_type), handler)
        })
        .heartbeat(
            Duration::from_secs(HEARTBEAT_INTERVAL_SECS),
            WsMessage::Text("PING".to_string()),
        )
        .subscription(WsMessage::Text(subscription_json))
        .reconnect_strategy(NeverReconnect)
        .shutdown_flag(local_shutdown_flag)
        .build()
        .await?;

    Ok(client)
}

// =============================================================================
// Main Tracking Loop
// =============================================================================

/// Handle a WebSocket client event. Returns `false` once the current session
/// should be torn down (disconnect, or an error serious enough to reconnect).
fn handle_client_event(event: ClientEvent, oracle_type: OracleType) -> bool {
    match event {
        ClientEvent::Connected => {
            info!("[Oracle {}] WebSocket connected", oracle_type);
            true
        }
        ClientEvent::Disconnected => {
            warn!("[Oracle {}] WebSocket disconnected", oracle_type);
            false
        }
        ClientEvent::Reconnecting(attempt) => {
            warn!("[Oracle {}] Reconnecting (attempt {})", oracle_type, attempt);
            true
        }
        ClientEvent::Error(err) => {
            warn!("[Oracle {}] Error: {}", oracle_type, err);
            false
        }
    }
}

/// Spawn a tracker for a single oracle type (internal use).
///
/// Implements the persistent-stream contract: one session at a time, torn
/// down and rebuilt on disconnect/error/watchdog timeout, with exponential
/// backoff between attempts (5s doubling to a 120s cap, reset on any session
/// that received a message).
async fn spawn_single_oracle_tracker(
    oracle_type: OracleType,
    prices: SharedOraclePrices,
    shutdown_flag: Arc<AtomicBool>,
) -> Result<()> {
    let mut backoff = SessionBackoff::new();

    'sessions: while shutdown_flag.load(Ordering::Acquire) {
        prices.write().unwrap().health_mut(oracle_type).record_attempt();

        info!("[Oracle {}] Connecting to price feed...", oracle_type);
        let client = match build_oracle_ws_client(oracle_type, Arc::clone(&prices)).await {
            Ok(c) => c,
            Err(e) => {
                warn!("[Oracle {}] Connect failed: {}", oracle_type, e);
                prices.write().unwrap().health_mut(oracle_type).record_failure();
                let delay = backoff.advance();
                sleep(delay).await;
                continue 'sessions;
            }
        };
        info!("[Oracle {}] Connected and subscribed", oracle_type);

        let session_start_ms = now_unix_ms();
        let successes_at_start = prices.read().unwrap().health_of(oracle_type).successes;
        let mut last_watchdog_check = std::time::Instant::now();

        // Per-session loop: runs until shutdown, disconnect, error, or watchdog timeout.
        loop {
            if !shutdown_flag.load(Ordering::Acquire) {
                info!("[Oracle {}] Shutdown signal received", oracle_type);
                let _ = client.shutdown().await;
                break 'sessions;
            }

            // Watchdog: every WATCHDOG_INTERVAL_SECS, force-close a stale stream.
            if last_watchdog_check.elapsed() >= Duration::from_secs(WATCHDOG_INTERVAL_SECS) {
                last_watchdog_check = std::time::Instant::now();
                let stale = {
                    let guard = prices.read().unwrap();
                    match guard.health_of(oracle_type).seconds_since_last_success(now_unix_ms()) {
                        Some(secs) => secs > WATCHDOG_STALE_SECS,
                        // Nothing has ever arrived: only fire the watchdog once the
                        // session itself has been open longer than the stale window.
                        None => (now_unix_ms().saturating_sub(session_start_ms)) as f64 / 1000.0
                            > WATCHDOG_STALE_SECS,
                    }
                };
                if stale {
                    warn!(
                        "[Oracle {}] Watchdog: no message in {}s, forcing reconnect",
                        oracle_type, WATCHDOG_STALE_SECS
                    );
                    let _ = client.shutdown().await;
                    break;
                }
            }

            // Handle WebSocket events
            match client.try_recv_event() {
                Some(event) => {
                    if !handle_client_event(event, oracle_type) {
                        let _ = client.shutdown().await;
                        break;
                    }
                }
                None => {
                    // No event available, sleep briefly before checking again
                    sleep(Duration::from_millis(10)).await;
                }
            }
        }

        let session_had_message =
            prices.read().unwrap().health_of(oracle_type).successes > successes_at_start;
        if session_had_message {
            backoff.reset();
        } else {
            prices.write().unwrap().health_mut(oracle_type).record_failure();
            let delay = backoff.advance();
            warn!(
                "[Oracle {}] Session ended without a message, backing off {:?}",
                oracle_type, delay
            );
            sleep(delay).await;
        }
    }

    info!("[Oracle {}] Tracker stopped", oracle_type);
    Ok(())
}

// =============================================================================
// Public Entry Point
// =============================================================================

/// Spawn both ChainLink and Binance oracle WebSocket connections.
///
/// Returns the shared price manager for reading prices.
/// Both connections run in background tasks and update the shared state.
pub async fn spawn_oracle_trackers(
    shutdown_flag: Arc<AtomicBool>,
) -> Result<SharedOraclePrices> {
    // Create shared price manager
    let prices: SharedOraclePrices = Arc::new(RwLock::new(OraclePriceManager::new()));

    info!("════════════════════════════════════════════════════════════════");
    info!("🔮 STARTING ORACLE PRICE TRACKERS");
    info!("════════════════════════════════════════════════════════════════");
    info!("  ChainLink: crypto_prices_chainlink");
    info!("  Binance:   crypto_prices");
    info!("  Heartbeat: {} seconds", HEARTBEAT_INTERVAL_SECS);
    info!("════════════════════════════════════════════════════════════════");

    // Spawn ChainLink tracker
    let chainlink_prices = Arc::clone(&prices);
    let chainlink_shutdown = Arc::clone(&shutdown_flag);
    tokio::spawn(async move {
        if let Err(e) = spawn_single_oracle_tracker(
            OracleType::ChainLink,
            chainlink_prices,
            chainlink_shutdown,
        )
        .await
        {
            warn!("[Oracle ChainLink] Tracker failed: {}", e);
        }
    });

    // Spawn Binance tracker
    let binance_prices = Arc::clone(&prices);
    let binance_shutdown = Arc::clone(&shutdown_flag);
    tokio::spawn(async move {
        if let Err(e) =
            spawn_single_oracle_tracker(OracleType::Binance, binance_prices, binance_shutdown).await
        {
            warn!("[Oracle Binance] Tracker failed: {}", e);
        }
    });

    Ok(prices)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_chainlink_symbol() {
        assert_eq!(parse_chainlink_symbol("eth/usd"), "ETH");
        assert_eq!(parse_chainlink_symbol("btc/usd"), "BTC");
        assert_eq!(parse_chainlink_symbol("sol/usd"), "SOL");
        assert_eq!(parse_chainlink_symbol("ETH/USD"), "ETH");
    }

    #[test]
    fn test_parse_binance_symbol() {
        assert_eq!(parse_binance_symbol("solusdt"), "SOL");
        assert_eq!(parse_binance_symbol("btcusdt"), "BTC");
        assert_eq!(parse_binance_symbol("ethusdt"), "ETH");
        assert_eq!(parse_binance_symbol("SOLUSDT"), "SOL");
        // Edge case: no usdt suffix
        assert_eq!(parse_binance_symbol("btc"), "BTC");
    }

    #[test]
    fn test_oracle_route_equality() {
        let route1 = OracleRoute::Oracle(OracleType::ChainLink);
        let route2 = OracleRoute::Oracle(OracleType::ChainLink);
        let route3 = OracleRoute::Oracle(OracleType::Binance);

        assert_eq!(route1, route2);
        assert_ne!(route1, route3);
    }
}
