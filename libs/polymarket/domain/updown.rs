//! Domain entities for the BTC-style Up/Down prediction-market runtime.
//!
//! These are plain, `serde`-derived structs shared by the oracle, signal,
//! risk, and exchange layers of the `up_or_down` strategy family. None of
//! these types touch I/O; they are the vocabulary the rest of the runtime
//! is built from.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Which upstream fed a given price observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceSource {
    /// Authoritative resolution oracle (ChainLink data streams).
    ChainLink,
    /// Exchange-native streaming feed (Binance direct websocket).
    Binance,
    /// Exchange REST ticker.
    ExchangeRest,
    /// Independent REST aggregator (CoinGecko/CoinCap style).
    Aggregator,
}

impl PriceSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            PriceSource::ChainLink => "chainlink",
            PriceSource::Binance => "binance",
            PriceSource::ExchangeRest => "exchange_rest",
            PriceSource::Aggregator => "aggregator",
        }
    }
}

impl std::fmt::Display for PriceSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single observed price with its provenance.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PricePoint {
    pub source: PriceSource,
    pub price: f64,
    pub ts: DateTime<Utc>,
    pub bid: Option<f64>,
    pub ask: Option<f64>,
}

impl PricePoint {
    pub fn new(source: PriceSource, price: f64, ts: DateTime<Utc>) -> Self {
        Self { source, price, ts, bid: None, ask: None }
    }

    /// Age of this observation relative to `now`, in seconds.
    pub fn age_secs(&self, now: DateTime<Utc>) -> f64 {
        (now - self.ts).num_milliseconds().max(0) as f64 / 1000.0
    }
}

/// Aggregate price across all fresh sources at the moment of a request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsensusPrice {
    pub price: f64,
    pub sources: Vec<PriceSource>,
    pub spread_pct: f64,
    pub confidence: f64,
    pub authoritative: Option<f64>,
    pub ts: DateTime<Utc>,
}

/// The immutable window-open anchor for one (window, interval) pair.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct WindowAnchor {
    pub boundary: DateTime<Utc>,
    pub open_price: f64,
    pub source: PriceSource,
    pub captured_at: DateTime<Utc>,
}

/// A single OHLCV candle at a given interval.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Candle {
    pub ts: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// A live, discovered Up/Down binary market. Not persisted — a fresh
/// snapshot is produced by every discovery cycle (distinct from the
/// teacher's SQLite-backed `DbMarket`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Market {
    pub condition_id: String,
    pub question: String,
    pub slug: String,
    pub token_ids: [String; 2],
    pub prices: [f64; 2],
    pub liquidity: f64,
    pub end_time: DateTime<Utc>,
    pub tradable: bool,
}

impl Market {
    pub const UP: usize = 0;
    pub const DOWN: usize = 1;

    pub fn up_token(&self) -> &str {
        &self.token_ids[Self::UP]
    }

    pub fn down_token(&self) -> &str {
        &self.token_ids[Self::DOWN]
    }

    pub fn seconds_to_close(&self, now: DateTime<Utc>) -> f64 {
        (self.end_time - now).num_milliseconds().max(0) as f64 / 1000.0
    }
}

/// Trade direction, or the absence of one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    Up,
    Down,
    Hold,
}

impl Direction {
    pub fn is_actionable(&self) -> bool {
        !matches!(self, Direction::Hold)
    }

    /// The token index (0 = UP, 1 = DOWN) this direction trades, if any.
    pub fn token_index(&self) -> Option<usize> {
        match self {
            Direction::Up => Some(Market::UP),
            Direction::Down => Some(Market::DOWN),
            Direction::Hold => None,
        }
    }

    pub fn opposes(&self, other: Direction) -> bool {
        matches!(
            (self, other),
            (Direction::Up, Direction::Down) | (Direction::Down, Direction::Up)
        )
    }
}

/// One named signal's verdict.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signal {
    pub name: &'static str,
    pub direction: Direction,
    pub strength: f64,
    pub raw: f64,
    pub description: String,
}

impl Signal {
    pub fn hold(name: &'static str, raw: f64, description: impl Into<String>) -> Self {
        Self {
            name,
            direction: Direction::Hold,
            strength: 0.0,
            raw,
            description: description.into(),
        }
    }
}

/// The output of one Signal Engine analysis call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyDecision {
    pub direction: Direction,
    pub confidence: f64,
    pub signals: Vec<Signal>,
    pub price: f64,
    pub anchor: Option<f64>,
    pub drift_pct: f64,
    pub volatility_pct: f64,
    pub should_trade: bool,
    pub reason: String,
    pub position_size_pct: f64,
}

impl StrategyDecision {
    pub fn hold(price: f64, anchor: Option<f64>, reason: impl Into<String>) -> Self {
        Self {
            direction: Direction::Hold,
            confidence: 0.0,
            signals: Vec::new(),
            price,
            anchor,
            drift_pct: 0.0,
            volatility_pct: 0.0,
            should_trade: false,
            reason: reason.into(),
            position_size_pct: 0.0,
        }
    }
}

/// Outcome of a settled trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeOutcome {
    Pending,
    Win,
    Loss,
}

/// Which loop placed a given trade, used to route resolved PnL back to
/// exactly one Risk Manager bucket (invariant I2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineKind {
    Main,
    LateWindow,
    FiveMinute,
    Arb,
    MarketMaker,
}

/// A single placed/resolved trade.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeRecord {
    pub id: Uuid,
    pub ts: DateTime<Utc>,
    pub market_id: String,
    pub direction: Direction,
    pub confidence: f64,
    pub entry_price: f64,
    pub size_usd: f64,
    pub oracle_price: f64,
    pub outcome: TradeOutcome,
    pub pnl: f64,
    pub order_id: Option<String>,
    pub engine: EngineKind,
}

impl TradeRecord {
    pub fn shares(&self) -> f64 {
        if self.entry_price > 0.0 {
            self.size_usd / self.entry_price
        } else {
            0.0
        }
    }

    /// Resolve this record against the declared winning direction, per
    /// §4.4.3: on win, pnl = shares - size; on loss, pnl = -size.
    pub fn resolve(&mut self, winner: Direction) {
        if self.outcome != TradeOutcome::Pending {
            return;
        }
        if self.direction == winner {
            self.outcome = TradeOutcome::Win;
            self.pnl = self.shares() - self.size_usd;
        } else {
            self.outcome = TradeOutcome::Loss;
            self.pnl = -self.size_usd;
        }
    }
}

/// Per-engine daily counters, reset at UTC midnight.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DailyStats {
    pub date: DateTime<Utc>,
    pub trades: u32,
    pub wins: u32,
    pub losses: u32,
    pub pnl: f64,
    pub consecutive_losses: u32,
    pub budget_spent: f64,
    pub cooldown_until: Option<DateTime<Utc>>,
    pub start_of_day_capital: f64,
}

impl DailyStats {
    pub fn new(date: DateTime<Utc>, capital: f64) -> Self {
        Self {
            date,
            trades: 0,
            wins: 0,
            losses: 0,
            pnl: 0.0,
            consecutive_losses: 0,
            budget_spent: 0.0,
            cooldown_until: None,
            start_of_day_capital: capital,
        }
    }

    pub fn is_same_utc_day(&self, now: DateTime<Utc>) -> bool {
        self.date.date_naive() == now.date_naive()
    }
}

/// A resting post-only maker order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActiveQuote {
    pub order_id: String,
    pub token_id: String,
    pub condition_id: String,
    pub side: super::super::infrastructure::client::clob::Side,
    pub price: f64,
    pub size: f64,
    pub posted_at: DateTime<Utc>,
}

/// The dashboard broadcast contract (§6): the Orchestrator publishes these,
/// an external dashboard process (not built here, Non-goal #1) subscribes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DashboardMessage {
    State {
        cycle: u64,
        oracle_price: f64,
        anchor: Option<f64>,
        decision: Option<StrategyDecision>,
        stats: Vec<DailyStats>,
    },
    PriceTick {
        price: f64,
        ts: DateTime<Utc>,
    },
    TradeNotification {
        trade: TradeRecord,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direction_opposes_is_symmetric() {
        assert!(Direction::Up.opposes(Direction::Down));
        assert!(Direction::Down.opposes(Direction::Up));
        assert!(!Direction::Up.opposes(Direction::Up));
        assert!(!Direction::Up.opposes(Direction::Hold));
    }

    #[test]
    fn trade_record_resolves_win_once() {
        let mut t = TradeRecord {
            id: Uuid::nil(),
            ts: Utc::now(),
            market_id: "m".into(),
            direction: Direction::Up,
            confidence: 0.8,
            entry_price: 0.5,
            size_usd: 10.0,
            oracle_price: 50000.0,
            outcome: TradeOutcome::Pending,
            pnl: 0.0,
            order_id: None,
            engine: EngineKind::Main,
        };
        t.resolve(Direction::Up);
        assert_eq!(t.outcome, TradeOutcome::Win);
        assert!((t.pnl - 10.0).abs() < 1e-9); // shares=20, pnl=20-10=10

        // Resolving again must not change the outcome.
        t.resolve(Direction::Down);
        assert_eq!(t.outcome, TradeOutcome::Win);
    }

    #[test]
    fn trade_record_resolves_loss() {
        let mut t = TradeRecord {
            id: Uuid::nil(),
            ts: Utc::now(),
            market_id: "m".into(),
            direction: Direction::Down,
            confidence: 0.8,
            entry_price: 0.5,
            size_usd: 10.0,
            oracle_price: 50000.0,
            outcome: TradeOutcome::Pending,
            pnl: 0.0,
            order_id: None,
            engine: EngineKind::Main,
        };
        t.resolve(Direction::Up);
        assert_eq!(t.outcome, TradeOutcome::Loss);
        assert!((t.pnl + 10.0).abs() < 1e-9);
    }
}
