//! Exchange Client (§4.4): market discovery, order placement state
//! machine with fill verification, resolution polling, and fee lookup.

use crate::domain::updown::{Direction, Market as DomainMarket, TradeOutcome, TradeRecord};
use crate::infrastructure::client::clob::TradingClient;
use crate::infrastructure::client::gamma::GammaClient;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("no tradable market found for {asset} {window_minutes}m")]
    NoMarketFound { asset: String, window_minutes: i64 },
    #[error("order rejected: {0}")]
    Rejected(String),
    #[error("trading client error: {0}")]
    Trading(#[from] crate::infrastructure::client::clob::trading::TradingError),
}

pub type Result<T> = std::result::Result<T, ExecutionError>;

/// Venue minimum order size, in shares.
const MIN_SHARES: f64 = 5.0;

/// Tries to deserialize a value that the venue sometimes sends as a
/// JSON-encoded string rather than a native JSON value - the same
/// double-encoding shape `domain::models::DbMarket::parse_outcomes`
/// already works around.
pub fn parse_flexible<T: DeserializeOwned>(v: &serde_json::Value) -> Option<T> {
    if let Ok(parsed) = serde_json::from_value::<T>(v.clone()) {
        return Some(parsed);
    }
    if let Some(s) = v.as_str() {
        if let Ok(parsed) = serde_json::from_str::<T>(s) {
            return Some(parsed);
        }
    }
    None
}

fn generate_slug(asset: &str, window_minutes: i64, boundary: DateTime<Utc>) -> String {
    let timeframe = match window_minutes {
        5 => "5m",
        15 => "15m",
        30 => "30m",
        60 => "1h",
        other => return format!("{}-updown-{}m-{}", asset, other, boundary.timestamp()),
    };
    format!("{}-updown-{}-{}", asset, timeframe, boundary.timestamp())
}

fn candidate_boundaries(window_minutes: i64, now: DateTime<Utc>) -> Vec<DateTime<Utc>> {
    let current = super::oracle::window_boundary(now, window_minutes);
    [-1i64, 0, 1, 2]
        .iter()
        .map(|offset| current + ChronoDuration::minutes(offset * window_minutes))
        .collect()
}

fn to_domain_market(m: crate::infrastructure::client::gamma::Market) -> Option<DomainMarket> {
    let condition_id = m.condition_id?;
    let slug = m.slug.unwrap_or_default();
    let token_ids: Vec<String> = serde_json::from_str(&m.clob_token_ids?).ok()?;
    if token_ids.len() < 2 {
        return None;
    }
    let end_time: DateTime<Utc> = m
        .end_date_iso
        .as_deref()
        .or(m.end_date.as_deref())
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))?;
    let up_price = m.best_ask.unwrap_or(0.5);
    let down_price = 1.0 - up_price;
    let liquidity = m
        .liquidity
        .as_deref()
        .and_then(|s| s.parse::<f64>().ok())
        .unwrap_or(0.0);

    Some(DomainMarket {
        condition_id,
        question: m.question.unwrap_or_default(),
        slug,
        token_ids: [token_ids[0].clone(), token_ids[1].clone()],
        prices: [up_price, down_price],
        liquidity,
        end_time,
        tradable: m.active.unwrap_or(false) && !m.closed.unwrap_or(true),
    })
}

/// Market discovery (§4.4.1): probe deterministic slugs across window
/// offsets `{-1,0,+1,+2}` in parallel, then apply the current-window
/// filter (last 90s of a window routes to the next boundary instead).
pub async fn discover_market(
    gamma: &GammaClient,
    asset: &str,
    window_minutes: i64,
    now: DateTime<Utc>,
) -> Result<DomainMarket> {
    let boundaries = candidate_boundaries(window_minutes, now);
    let slugs: Vec<String> = boundaries
        .iter()
        .map(|b| generate_slug(asset, window_minutes, *b))
        .collect();

    let markets = gamma.get_markets_by_slugs(&slugs).await;
    let mut candidates: Vec<DomainMarket> = markets.into_iter().filter_map(to_domain_market).collect();

    if candidates.is_empty() {
        candidates = discover_via_events_fallback(gamma, asset, window_minutes, now).await;
    }

    let current_boundary = super::oracle::window_boundary(now, window_minutes);
    let next_boundary = current_boundary + ChronoDuration::minutes(window_minutes);
    let seconds_into_close = (next_boundary - now).num_seconds();
    let target_boundary = if seconds_into_close <= 90 { next_boundary } else { current_boundary };

    candidates
        .into_iter()
        .filter(|m| m.tradable && m.end_time > now)
        .find(|m| (m.end_time - target_boundary).num_seconds().abs() < 5)
        .ok_or_else(|| ExecutionError::NoMarketFound {
            asset: asset.to_string(),
            window_minutes,
        })
}

/// Fallback discovery: paginate the generic events endpoint, filtering by
/// slug prefix, for venues where the deterministic slug template drifted.
async fn discover_via_events_fallback(
    gamma: &GammaClient,
    asset: &str,
    window_minutes: i64,
    now: DateTime<Utc>,
) -> Vec<DomainMarket> {
    let prefix = format!("{}-updown-", asset);
    let events = match gamma.get_events_page(200, 0).await {
        Ok(events) => events,
        Err(e) => {
            warn!("discovery fallback: events page fetch failed: {}", e);
            return Vec::new();
        }
    };
    let _ = window_minutes;
    let _ = now;
    GammaClient::extract_markets_from_events(events)
        .into_iter()
        .filter(|m| m.slug.as_deref().is_some_and(|s| s.starts_with(&prefix)))
        .filter_map(to_domain_market)
        .collect()
}

/// Per-token fee rate cache with a TTL, mirroring `neg_risk_cache`'s
/// read-through-then-populate shape in `trading.rs`.
pub struct FeeCache {
    ttl: Duration,
    fallback_pct: f64,
    entries: RwLock<HashMap<String, (u64, Instant)>>,
}

impl FeeCache {
    pub fn new(ttl_secs: u64, fallback_pct: f64) -> Self {
        Self {
            ttl: Duration::from_secs(ttl_secs),
            fallback_pct,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Taker fee percent at price `p`: `bps/10000 * (1-p) * 100` from the
    /// live endpoint if cached/fetchable, else the parabolic fallback
    /// `fallback * 4 * p * (1-p)` (maximal at p = 0.5).
    pub async fn fee_pct(&self, trading: &TradingClient, token_id: &str, price: f64) -> f64 {
        if let Some(bps) = self.cached(token_id) {
            return bps as f64 / 10_000.0 * (1.0 - price) * 100.0;
        }

        match trading.get_fee_rate_bps(token_id).await {
            Ok(bps) => {
                self.entries.write().insert(token_id.to_string(), (bps, Instant::now()));
                bps as f64 / 10_000.0 * (1.0 - price) * 100.0
            }
            Err(e) => {
                debug!("fee lookup failed for {}: {}, using parabolic fallback", token_id, e);
                self.fallback_pct * 4.0 * price * (1.0 - price)
            }
        }
    }

    fn cached(&self, token_id: &str) -> Option<u64> {
        let entries = self.entries.read();
        entries
            .get(token_id)
            .filter(|(_, at)| at.elapsed() < self.ttl)
            .map(|(bps, _)| *bps)
    }
}

/// Final outcome of one order-placement attempt.
pub enum PlacementOutcome {
    Filled(TradeRecord),
    NoFill(&'static str),
}

/// A venue rejection naming a thin order book (§4.4.2 FOKUnfillable) is
/// the only `OrderReject` that retries - as a GTC limit with slippage.
/// Every other non-success is a terminal `OrderReject`: no trade, no retry.
fn is_thin_book_rejection(error_msg: Option<&str>) -> bool {
    error_msg.is_some_and(|m| {
        let lower = m.to_lowercase();
        lower.contains("fully filled or killed")
            || lower.contains("couldn't be fully filled")
            || lower.contains("cannot fully fill")
    })
}

/// Order placement state machine (§4.4.2): FOK first, falling back to a
/// GTC limit with a slippage bump only on a thin-book rejection; any path
/// lacking a positive fill confirmation returns `NoFill` rather than a
/// `TradeRecord` (I4) - including a FOK that reports success.
pub async fn place_directional_order(
    trading: &TradingClient,
    market: &DomainMarket,
    direction: Direction,
    size_usd: f64,
    oracle_price: f64,
    confidence: f64,
    max_slippage_pct: f64,
    engine: crate::domain::updown::EngineKind,
) -> Result<PlacementOutcome> {
    let token_index = direction
        .token_index()
        .ok_or_else(|| ExecutionError::Rejected("direction is Hold".to_string()))?;
    let token_id = market.token_ids[token_index].clone();

    let quoted_price = market.prices[token_index];
    let exec_price = trading.get_midpoint(&token_id).await.ok().flatten().unwrap_or(quoted_price);
    let exec_price = exec_price.clamp(0.01, 0.99);
    let shares = (size_usd / exec_price).max(MIN_SHARES);

    let fok = trading.buy_fok(&token_id, exec_price, shares).await?;

    if !fok.success && is_thin_book_rejection(fok.error_msg.as_deref()) {
        info!(token_id = %token_id, "FOK rejected (thin book), retrying as GTC limit with slippage");
        return place_limit_with_slippage(
            trading, market, direction, &token_id, confidence, exec_price, shares, size_usd,
            oracle_price, max_slippage_pct, engine,
        )
        .await;
    }

    if !fok.success {
        return Ok(PlacementOutcome::NoFill("order rejected: non-fillable, not a thin book"));
    }

    let Some(order_id) = fok.order_id.clone() else {
        return Ok(PlacementOutcome::NoFill("fok success with no order id"));
    };

    if !fok.order_hashes.as_ref().is_some_and(|h| !h.is_empty()) {
        warn!(order_id = %order_id, "ghost fill: success=true but no transaction hashes");
    }

    if !verify_fill(trading, &order_id).await {
        return Ok(PlacementOutcome::NoFill("phantom: fill not verified"));
    }

    Ok(PlacementOutcome::Filled(build_trade_record(
        market, direction, confidence, exec_price, size_usd, oracle_price, Some(order_id), engine,
    )))
}

/// The GTC-limit-with-slippage fallback (§4.4.2 S2): a resting order
/// waits 10s for a fill before being cancelled; a failed cancel means it
/// may have filled in the meantime, so either way the fill must still
/// pass verification before a `TradeRecord` is built.
#[allow(clippy::too_many_arguments)]
async fn place_limit_with_slippage(
    trading: &TradingClient,
    market: &DomainMarket,
    direction: Direction,
    token_id: &str,
    confidence: f64,
    exec_price: f64,
    shares: f64,
    size_usd: f64,
    oracle_price: f64,
    max_slippage_pct: f64,
    engine: crate::domain::updown::EngineKind,
) -> Result<PlacementOutcome> {
    let bumped_price = (exec_price * (1.0 + max_slippage_pct / 100.0)).min(0.99);
    let limit = trading
        .order(token_id)
        .price(bumped_price)
        .size(shares)
        .buy()
        .gtc()
        .execute()
        .await?;

    let Some(order_id) = limit.order_id.clone() else {
        return Ok(PlacementOutcome::NoFill("limit order rejected, no order id"));
    };

    if limit.status.as_deref() == Some("live") {
        tokio::time::sleep(Duration::from_secs(10)).await;
        if let Ok(_cancelled) = trading.cancel_order(&order_id).await {
            return Ok(PlacementOutcome::NoFill("cancelled, no fill"));
        }
        // Cancel failed: order may have filled in the meantime. Fall
        // through to the same verification path as any other fill.
    }

    if !verify_fill(trading, &order_id).await {
        return Ok(PlacementOutcome::NoFill("ghost/phantom: fill not verified"));
    }

    Ok(PlacementOutcome::Filled(build_trade_record(
        market,
        direction,
        confidence,
        bumped_price,
        size_usd,
        oracle_price,
        Some(order_id),
        engine,
    )))
}

fn is_filled(order: &serde_json::Value) -> bool {
    matches!(
        order.get("status").and_then(|v| v.as_str()),
        Some("matched") | Some("filled")
    )
}

async fn verify_fill(trading: &TradingClient, order_id: &str) -> bool {
    tokio::time::sleep(Duration::from_secs(3)).await;
    if let Ok(order) = trading.get_order(order_id).await {
        if is_filled(&order) {
            return true;
        }
    }
    tokio::time::sleep(Duration::from_secs(2)).await;
    trading
        .get_order(order_id)
        .await
        .map(|o| is_filled(&o))
        .unwrap_or(false)
}

fn build_trade_record(
    market: &DomainMarket,
    direction: Direction,
    confidence: f64,
    entry_price: f64,
    size_usd: f64,
    oracle_price: f64,
    order_id: Option<String>,
    engine: crate::domain::updown::EngineKind,
) -> TradeRecord {
    TradeRecord {
        id: Uuid::new_v4(),
        ts: Utc::now(),
        market_id: market.condition_id.clone(),
        direction,
        confidence,
        entry_price,
        size_usd,
        oracle_price,
        outcome: TradeOutcome::Pending,
        pnl: 0.0,
        order_id,
        engine,
    }
}

/// Post-only GTC order primitive for the Market Maker (§4.4.5); a
/// "would cross the spread" rejection is a normal non-fatal outcome.
pub async fn place_post_only(
    trading: &TradingClient,
    token_id: &str,
    price: f64,
    shares: f64,
) -> Result<Option<String>> {
    let response = trading
        .order(token_id)
        .price(price)
        .size(shares)
        .buy()
        .gtc()
        .execute()
        .await?;
    if !response.success {
        debug!(token_id, price, "post-only rejected (likely would-cross): {:?}", response.error_msg);
        return Ok(None);
    }
    Ok(response.order_id)
}

/// Resolution polling (§4.4.3): for each pending record, query the venue
/// and resolve against the declared winner once the market has closed.
/// Looked up by condition id via the CLOB REST API (the id `TradeRecord`
/// actually carries), not the Gamma slug. Returns resolved records older
/// than 1 hour separately for archival.
pub async fn poll_resolutions(
    trading: &TradingClient,
    pending: &mut Vec<TradeRecord>,
) -> Vec<TradeRecord> {
    let mut still_pending = Vec::with_capacity(pending.len());
    let now = Utc::now();

    for mut record in pending.drain(..) {
        if record.outcome != TradeOutcome::Pending {
            still_pending.push(record);
            continue;
        }

        match trading.rest().get_market(&record.market_id).await {
            Ok(m) if m.closed => {
                if let Some(winner) = declared_winner(&m) {
                    record.resolve(winner);
                    info!(trade_id = %record.id, ?winner, pnl = record.pnl, "trade resolved");
                }
            }
            Ok(_) => {}
            Err(e) => warn!("resolution poll failed for {}: {}", record.market_id, e),
        }

        still_pending.push(record);
    }

    let (archived, remaining): (Vec<_>, Vec<_>) = still_pending.into_iter().partition(|r| {
        r.outcome != TradeOutcome::Pending && (now - r.ts) > ChronoDuration::hours(1)
    });

    *pending = remaining;
    archived
}

fn declared_winner(m: &crate::infrastructure::client::clob::Market) -> Option<Direction> {
    if m.outcomes.len() < 2 {
        return None;
    }
    let up_price = m.outcomes[0].price.unwrap_or(0.0);
    let down_price = m.outcomes[1].price.unwrap_or(0.0);
    if up_price >= 0.99 {
        Some(Direction::Up)
    } else if down_price >= 0.99 {
        Some(Direction::Down)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slug_template_matches_timeframe_names() {
        let boundary = Utc::now();
        assert!(generate_slug("btc", 15, boundary).starts_with("btc-updown-15m-"));
        assert!(generate_slug("btc", 60, boundary).starts_with("btc-updown-1h-"));
    }

    #[test]
    fn candidate_boundaries_covers_offsets() {
        let now = Utc::now();
        let boundaries = candidate_boundaries(15, now);
        assert_eq!(boundaries.len(), 4);
    }

    #[test]
    fn thin_book_rejection_detects_known_phrasings() {
        assert!(is_thin_book_rejection(Some("order couldn't be fully filled or killed")));
        assert!(is_thin_book_rejection(Some("Cannot fully fill at this price")));
        assert!(!is_thin_book_rejection(Some("insufficient balance")));
        assert!(!is_thin_book_rejection(None));
    }

    #[test]
    fn fee_pct_uses_parabolic_fallback_shape() {
        // fallback * 4 * p * (1-p), maximal at p=0.5
        let fallback = 1.56;
        let at_half = fallback * 4.0 * 0.5 * 0.5;
        let at_quarter = fallback * 4.0 * 0.25 * 0.75;
        assert!(at_half > at_quarter);
        assert!((at_half - fallback).abs() < 1e-9);
    }

    #[test]
    fn parse_flexible_handles_double_encoded_json() {
        let inner = serde_json::json!(["a", "b"]);
        let encoded = serde_json::Value::String(inner.to_string());
        let parsed: Option<Vec<String>> = parse_flexible(&encoded);
        assert_eq!(parsed, Some(vec!["a".to_string(), "b".to_string()]));

        let native = serde_json::json!(["x", "y"]);
        let parsed: Option<Vec<String>> = parse_flexible(&native);
        assert_eq!(parsed, Some(vec!["x".to_string(), "y".to_string()]));
    }
}
