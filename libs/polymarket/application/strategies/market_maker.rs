//! Market Maker (§4.6): a post-only quoting loop around the Chainlink
//! mid price, capturing spread plus the venue's zero-fee maker rebates.
//!
//! Runs independently of the directional engines and the arb scanner.
//! Only one market is quoted at a time, the most liquid tradable BTC
//! up/down market currently discovered.

use crate::domain::updown::ActiveQuote;
use crate::infrastructure::client::clob::{Side, TradingClient};
use crate::infrastructure::client::gamma::GammaClient;
use crate::infrastructure::config::MarketMakerConfig;
use chrono::{DateTime, Utc};
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use tracing::{debug, info};

use super::up_or_down::execution::{parse_flexible, place_post_only};

#[derive(Debug, Clone, Default)]
pub struct MarketMakerStats {
    pub quotes_posted: u64,
    pub quotes_filled: u64,
    pub quotes_cancelled: u64,
    pub quotes_rejected: u64,
    pub yes_fills_usd: f64,
    pub no_fills_usd: f64,
    pub skipped_for_imbalance: u64,
    pub skipped_extreme_price: u64,
    pub pulls_before_close: u64,
}

/// Insert `order_id` into the order-preserving cancelled-ID tracker,
/// pruning down to the most recent 200 entries once it exceeds 500.
///
/// A bare `HashSet` pruned via `set(list(x)[-200:])` (the original
/// bot's approach) is not order-stable - Python set iteration order
/// is insertion-hash dependent, so that prune can drop recently
/// cancelled IDs and keep ancient ones, letting a stale self-cancel
/// get mistaken for a fill. The deque fixes that.
fn push_cancelled(order_ids: &mut VecDeque<String>, order_id_set: &mut HashSet<String>, order_id: String) {
    if order_id_set.insert(order_id.clone()) {
        order_ids.push_back(order_id);
    }
    if order_ids.len() > 500 {
        while order_ids.len() > 200 {
            if let Some(old) = order_ids.pop_front() {
                order_id_set.remove(&old);
            }
        }
    }
}

struct TradeableMarket {
    condition_id: String,
    token_yes: String,
    token_no: String,
    liquidity: f64,
    end_time: DateTime<Utc>,
}

/// Conservative post-only quoting engine.
///
/// Safety properties carried over from the original bot: fill detection
/// runs before any cancellation each cycle, cancelled order IDs are
/// tracked separately so self-cancels are never mistaken for fills, and
/// resting quotes are pulled unconditionally once a market nears close.
pub struct MarketMaker {
    config: MarketMakerConfig,
    trading: Arc<TradingClient>,
    gamma: Arc<GammaClient>,
    active_quotes: Vec<ActiveQuote>,
    stats: MarketMakerStats,
    day_start: DateTime<Utc>,
    cycle_count: u64,
    daily_fills_usd: f64,
    yes_fills_usd: f64,
    no_fills_usd: f64,
    /// Order-preserving bounded set: a `HashSet` alone would let `prune`
    /// drop arbitrary (not oldest) entries, so insertion order is kept
    /// in the deque and mirrored into the set for O(1) membership.
    cancelled_order_ids: VecDeque<String>,
    cancelled_order_id_set: HashSet<String>,
}

impl MarketMaker {
    pub fn new(config: MarketMakerConfig, trading: Arc<TradingClient>, gamma: Arc<GammaClient>) -> Self {
        let now = Utc::now();
        Self {
            config,
            trading,
            gamma,
            active_quotes: Vec::new(),
            stats: MarketMakerStats::default(),
            day_start: now,
            cycle_count: 0,
            daily_fills_usd: 0.0,
            yes_fills_usd: 0.0,
            no_fills_usd: 0.0,
            cancelled_order_ids: VecDeque::new(),
            cancelled_order_id_set: HashSet::new(),
        }
    }

    pub fn stats(&self) -> MarketMakerStats {
        self.stats.clone()
    }

    fn resting_order_value(&self) -> f64 {
        self.active_quotes.iter().map(|q| q.price * q.size).sum()
    }

    fn imbalance(&self) -> (f64, &'static str) {
        let diff = self.yes_fills_usd - self.no_fills_usd;
        if diff > 0.0 {
            (diff, "YES")
        } else if diff < 0.0 {
            (-diff, "NO")
        } else {
            (0.0, "BALANCED")
        }
    }

    fn mark_cancelled(&mut self, order_id: String) {
        push_cancelled(&mut self.cancelled_order_ids, &mut self.cancelled_order_id_set, order_id);
    }

    /// Compare active quotes against venue open orders; anything no
    /// longer resting and not in our own cancel set is a genuine fill.
    async fn detect_fills(&mut self) {
        if self.active_quotes.is_empty() {
            return;
        }

        let mut by_market: std::collections::HashMap<String, Vec<usize>> = std::collections::HashMap::new();
        for (i, q) in self.active_quotes.iter().enumerate() {
            by_market.entry(q.condition_id.clone()).or_default().push(i);
        }

        let mut filled_indices: Vec<usize> = Vec::new();

        for (condition_id, indices) in by_market {
            let params = crate::infrastructure::client::clob::OpenOrderParams {
                market: Some(condition_id.clone()),
                ..Default::default()
            };
            let open_orders = match self.trading.get_orders(Some(&params)).await {
                Ok(orders) => orders,
                Err(e) => {
                    debug!(condition_id = %condition_id, error = %e, "mm: fill detection fetch failed");
                    continue;
                }
            };
            let open_ids: HashSet<String> = open_orders
                .iter()
                .filter_map(|o| {
                    o.get("id")
                        .or_else(|| o.get("orderID"))
                        .and_then(|v| v.as_str())
                        .map(|s| s.to_string())
                })
                .collect();

            for i in indices {
                let order_id = self.active_quotes[i].order_id.clone();
                if order_id.is_empty() || open_ids.contains(&order_id) {
                    continue;
                }
                if self.cancelled_order_id_set.contains(&order_id) {
                    continue;
                }
                filled_indices.push(i);
            }
        }

        if filled_indices.is_empty() {
            return;
        }
        filled_indices.sort_unstable();
        for &i in filled_indices.iter().rev() {
            let q = self.active_quotes.remove(i);
            let fill_usd = q.price * q.size;
            self.stats.quotes_filled += 1;
            self.daily_fills_usd += fill_usd;
            // Level construction posts the YES leg as a BUY and the NO leg
            // as a SELL (see `calculate_quotes`), so `side` doubles as the
            // leg tag needed for inventory-imbalance tracking.
            if q.side == Side::Buy {
                self.yes_fills_usd += fill_usd;
            } else {
                self.no_fills_usd += fill_usd;
            }
            info!(
                order_id = %q.order_id, price = q.price, size = q.size, fill_usd,
                "mm: fill detected"
            );
        }
    }

    async fn discover_markets(&self, now: DateTime<Utc>) -> Vec<TradeableMarket> {
        let markets = self.gamma.get_all_active_markets().await.unwrap_or_default();
        let mut out = Vec::new();
        for m in markets {
            let Some(condition_id) = m.condition_id.clone() else { continue };
            let Some(slug) = m.slug.as_deref() else { continue };
            if !slug.starts_with("btc-updown-") {
                continue;
            }
            if !m.active.unwrap_or(false) || m.closed.unwrap_or(true) {
                continue;
            }
            let liquidity = m
                .liquidity
                .as_deref()
                .and_then(|s| s.parse::<f64>().ok())
                .unwrap_or(0.0);
            if liquidity < self.config.size_usd_per_level {
                continue;
            }
            let Some(token_ids_raw) = m.clob_token_ids.as_deref() else { continue };
            let Some(token_ids) = parse_flexible::<Vec<String>>(&serde_json::Value::String(
                token_ids_raw.to_string(),
            )) else {
                continue;
            };
            if token_ids.len() < 2 {
                continue;
            }
            let Some(end_time) = m
                .end_date_iso
                .as_deref()
                .or(m.end_date.as_deref())
                .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                .map(|dt| dt.with_timezone(&Utc))
            else {
                continue;
            };
            if end_time <= now {
                continue;
            }
            out.push(TradeableMarket {
                condition_id,
                token_yes: token_ids[0].clone(),
                token_no: token_ids[1].clone(),
                liquidity,
                end_time,
            });
        }
        out
    }

    /// Quote levels around `mid`, filtered to the safe 0.25-0.75 band.
    fn calculate_quotes(&mut self, mid: f64) -> Vec<(Side, f64, f64)> {
        let mut quotes = Vec::new();
        for level in 0..self.config.levels {
            let offset = self.config.half_spread + (level as f64 * self.config.level_spacing);
            let yes_bid = ((mid - offset) * 100.0).round() / 100.0;
            let no_bid = ((1.0 - mid - offset) * 100.0).round() / 100.0;

            for (side, price) in [(Side::Buy, yes_bid), (Side::Sell, no_bid)] {
                if !(0.25..=0.75).contains(&price) {
                    self.stats.skipped_extreme_price += 1;
                    continue;
                }
                let shares = ((self.config.size_usd_per_level / price) * 10.0).round() / 10.0;
                let shares = shares.max(5.0);
                quotes.push((side, price, shares));
            }
        }
        quotes
    }

    async fn cancel_all_for_market(&mut self, condition_id: &str) {
        let to_cancel: Vec<String> = self
            .active_quotes
            .iter()
            .filter(|q| q.condition_id == condition_id && !q.order_id.is_empty())
            .map(|q| q.order_id.clone())
            .collect();
        for id in &to_cancel {
            self.mark_cancelled(id.clone());
        }
        if let Err(e) = self.trading.cancel_market_orders(Some(condition_id), None).await {
            debug!(condition_id, error = %e, "mm: cancel_market_orders failed");
        }
        let cancelled = self.active_quotes.iter().filter(|q| q.condition_id == condition_id).count();
        self.active_quotes.retain(|q| q.condition_id != condition_id);
        self.stats.quotes_cancelled += cancelled as u64;
    }

    async fn pull_expiring_quotes(&mut self, now: DateTime<Utc>, end_times: &std::collections::HashMap<String, DateTime<Utc>>) {
        let pull_before = chrono::Duration::seconds(self.config.pull_before_close_secs as i64);
        let mut pulled = HashSet::new();
        let conditions: Vec<String> = self
            .active_quotes
            .iter()
            .map(|q| q.condition_id.clone())
            .collect();
        for condition_id in conditions {
            if pulled.contains(&condition_id) {
                continue;
            }
            let Some(end_time) = end_times.get(&condition_id) else { continue };
            if *end_time - now <= pull_before {
                info!(condition_id = %condition_id, "mm: pulling quotes before close");
                self.cancel_all_for_market(&condition_id).await;
                pulled.insert(condition_id);
                self.stats.pulls_before_close += 1;
            }
        }
    }

    async fn post_quotes(&mut self, market: &TradeableMarket, mid: f64) {
        if self.daily_fills_usd >= self.config.max_daily_budget_usd {
            if self.cycle_count % 10 == 0 {
                info!(
                    spent = self.daily_fills_usd, budget = self.config.max_daily_budget_usd,
                    "mm: daily budget exhausted"
                );
            }
            return;
        }
        if self.active_quotes.len() as u32 >= self.config.max_open_orders {
            return;
        }

        let (imbalance_usd, heavy_side) = self.imbalance();
        let skip_side = if imbalance_usd >= self.config.max_imbalance_shares {
            Some(heavy_side)
        } else {
            None
        };

        let quotes = self.calculate_quotes(mid);
        for (side, price, shares) in quotes {
            if self.active_quotes.len() as u32 >= self.config.max_open_orders {
                break;
            }
            let this_side = if side == Side::Buy { "YES" } else { "NO" };
            if skip_side == Some(this_side) {
                self.stats.skipped_for_imbalance += 1;
                continue;
            }

            let token_id = if side == Side::Buy { &market.token_yes } else { &market.token_no };
            match place_post_only(&self.trading, token_id, price, shares).await {
                Ok(Some(order_id)) => {
                    self.active_quotes.push(ActiveQuote {
                        order_id,
                        token_id: token_id.clone(),
                        condition_id: market.condition_id.clone(),
                        side,
                        price,
                        size: shares,
                        posted_at: Utc::now(),
                    });
                    self.stats.quotes_posted += 1;
                }
                Ok(None) => self.stats.quotes_rejected += 1,
                Err(e) => {
                    debug!(token_id, error = %e, "mm: post-only order errored");
                    self.stats.quotes_rejected += 1;
                }
            }
        }
    }

    fn check_daily_reset(&mut self, now: DateTime<Utc>) {
        if (now - self.day_start).num_hours() >= 24 {
            info!(
                posted = self.stats.quotes_posted, filled = self.stats.quotes_filled,
                yes = self.yes_fills_usd, no = self.no_fills_usd,
                "mm: daily reset"
            );
            self.stats = MarketMakerStats::default();
            self.daily_fills_usd = 0.0;
            self.yes_fills_usd = 0.0;
            self.no_fills_usd = 0.0;
            self.cancelled_order_ids.clear();
            self.cancelled_order_id_set.clear();
            self.day_start = now;
        }
    }

    /// Main loop (§4.6): detect fills, pull expiring quotes, discover,
    /// pick the single most liquid market, cancel stale quotes, re-quote.
    pub async fn run(&mut self, shutdown: Arc<crate::infrastructure::ShutdownManager>) {
        info!(
            half_spread = self.config.half_spread, levels = self.config.levels,
            size = self.config.size_usd_per_level, budget = self.config.max_daily_budget_usd,
            "market maker started"
        );

        while shutdown.is_running() {
            let now = Utc::now();
            self.check_daily_reset(now);
            self.cycle_count += 1;

            self.detect_fills().await;

            let markets = self.discover_markets(now).await;
            let end_times: std::collections::HashMap<String, DateTime<Utc>> =
                markets.iter().map(|m| (m.condition_id.clone(), m.end_time)).collect();
            self.pull_expiring_quotes(now, &end_times).await;

            if markets.is_empty() {
                shutdown
                    .interruptible_sleep(std::time::Duration::from_secs(self.config.refresh_secs))
                    .await;
                continue;
            }

            let best = markets.iter().max_by(|a, b| a.liquidity.partial_cmp(&b.liquidity).unwrap());
            if let Some(market) = best {
                let pull_before = chrono::Duration::seconds(self.config.pull_before_close_secs as i64);
                if market.end_time - now <= pull_before {
                    shutdown
                        .interruptible_sleep(std::time::Duration::from_secs(self.config.refresh_secs))
                        .await;
                    continue;
                }

                let stale_conditions: HashSet<String> =
                    self.active_quotes.iter().map(|q| q.condition_id.clone()).collect();
                for cid in stale_conditions {
                    self.cancel_all_for_market(&cid).await;
                }

                if let Ok(Some(mid)) = self.trading.get_midpoint(&market.token_yes).await {
                    if mid > self.config.min_mid && mid < self.config.max_mid {
                        self.post_quotes(market, mid).await;
                    } else if self.cycle_count % 10 == 0 {
                        info!(mid, "mm: skipping market, mid too lopsided");
                    }
                }
            }

            if self.cycle_count % 10 == 0 {
                let (imbalance_usd, heavy_side) = self.imbalance();
                info!(
                    cycle = self.cycle_count, resting = self.resting_order_value(),
                    filled = self.stats.quotes_filled, rejected = self.stats.quotes_rejected,
                    imbalance_usd, heavy_side, "mm: cycle status"
                );
            }

            shutdown
                .interruptible_sleep(std::time::Duration::from_secs(self.config.refresh_secs))
                .await;
        }

        if let Err(e) = self.trading.cancel_all().await {
            debug!(error = %e, "mm: cancel_all on shutdown failed");
        }
        info!(
            posted = self.stats.quotes_posted, filled = self.stats.quotes_filled,
            "market maker stopped"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> MarketMakerConfig {
        MarketMakerConfig {
            enabled: true,
            refresh_secs: 20,
            pull_before_close_secs: 30,
            half_spread: 0.01,
            level_spacing: 0.01,
            levels: 3,
            size_usd_per_level: 10.0,
            max_imbalance_shares: 200.0,
            max_daily_budget_usd: 100.0,
            max_open_orders: 12,
            min_mid: 0.35,
            max_mid: 0.65,
        }
    }

    #[test]
    fn cancelled_id_pruning_keeps_most_recent_200_and_is_order_stable() {
        let mut order_ids = VecDeque::new();
        let mut order_id_set = HashSet::new();
        for i in 0..600 {
            push_cancelled(&mut order_ids, &mut order_id_set, format!("order-{}", i));
        }
        assert!(order_ids.len() <= 200);
        assert!(order_id_set.contains("order-599"));
        assert!(!order_id_set.contains("order-0"));
        assert!(!order_id_set.contains("order-399"));
        assert!(order_id_set.contains("order-400"));
    }

    #[test]
    fn duplicate_cancel_is_not_double_inserted() {
        let mut order_ids = VecDeque::new();
        let mut order_id_set = HashSet::new();
        push_cancelled(&mut order_ids, &mut order_id_set, "order-1".to_string());
        push_cancelled(&mut order_ids, &mut order_id_set, "order-1".to_string());
        assert_eq!(order_ids.len(), 1);
    }

    #[test]
    fn config_carries_expected_defaults() {
        let cfg = config();
        assert_eq!(cfg.levels, 3);
        assert!(cfg.min_mid < cfg.max_mid);
    }

    #[test]
    fn extreme_price_skip_is_tracked_separately_from_imbalance_skip() {
        let mut stats = MarketMakerStats::default();
        stats.skipped_extreme_price += 1;
        assert_eq!(stats.skipped_extreme_price, 1);
        assert_eq!(stats.skipped_for_imbalance, 0);
    }
}
