//! Arb Scanner (§4.5): an independent fast-polling loop that buys both
//! sides of a BTC up/down market whenever YES+NO trades below a
//! combined-price threshold, locking in a riskless spread.
//!
//! Runs alongside the directional engines in [`super::up_or_down`] but
//! shares none of their state - it keeps its own discovery cache, daily
//! budget, and per-market cooldowns.

use crate::domain::updown::Direction;
use crate::infrastructure::client::clob::TradingClient;
use crate::infrastructure::client::gamma::GammaClient;
use crate::infrastructure::config::ArbScannerConfig;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::up_or_down::execution::parse_flexible;

/// BTC up/down timeframes the scanner probes, mirroring the slug
/// template `{asset}-updown-{tf}-{boundary_ts}` used by discovery.
const TIMEFRAMES: [(&str, i64); 4] = [("5m", 5), ("15m", 15), ("30m", 30), ("1h", 60)];

/// Fee-aware taker-fee estimate: parabolic model maximal at price 0.5,
/// matching `execution::FeeCache`'s fallback shape.
fn estimate_taker_fee_pct(price: f64) -> f64 {
    1.56 * 4.0 * price * (1.0 - price)
}

/// Floor below which a market's stated liquidity is too thin to risk
/// both arb legs filling.
const MIN_LIQUIDITY_USD: f64 = 10.0;

/// A tracked market with its latest YES/NO quote.
#[derive(Debug, Clone)]
struct ArbMarket {
    condition_id: String,
    slug: String,
    timeframe: &'static str,
    token_yes: String,
    token_no: String,
    price_yes: f64,
    price_no: f64,
    liquidity: f64,
    end_time: DateTime<Utc>,
    last_price_update: DateTime<Utc>,
}

impl ArbMarket {
    fn combined(&self) -> f64 {
        self.price_yes + self.price_no
    }

    fn edge_pct(&self) -> f64 {
        (1.0 - self.combined()).max(0.0) * 100.0
    }

    fn time_remaining_secs(&self, now: DateTime<Utc>) -> f64 {
        (self.end_time - now).num_milliseconds().max(0) as f64 / 1000.0
    }
}

/// Outcome of one arb attempt, kept for `get_executions`/dashboard use.
#[derive(Debug, Clone)]
pub struct ArbExecution {
    pub ts: DateTime<Utc>,
    pub condition_id: String,
    pub timeframe: &'static str,
    pub combined: f64,
    pub edge_pct: f64,
    pub size_per_side_usd: f64,
    pub gross_profit: f64,
    pub net_profit: f64,
    pub status: ArbExecutionStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArbExecutionStatus {
    Filled,
    Partial,
    Failed,
}

#[derive(Debug, Clone, Default)]
pub struct ArbStats {
    pub scan_count: u64,
    pub markets_tracked: usize,
    pub opportunities_found: u64,
    pub daily_trades: u32,
    pub daily_profit: f64,
    pub daily_spent: f64,
    pub consecutive_errors: u32,
}

/// Independent arbitrage loop (§4.5). Discovery runs on its own cadence
/// separate from price refresh, per the original scanner's two-interval
/// design: full re-discovery is expensive, price polling is cheap.
pub struct ArbScanner {
    config: ArbScannerConfig,
    trading: Arc<TradingClient>,
    gamma: Arc<GammaClient>,
    markets: HashMap<String, ArbMarket>,
    cooldowns: HashMap<String, DateTime<Utc>>,
    day_start: DateTime<Utc>,
    stats: ArbStats,
    executions: Vec<ArbExecution>,
    last_discovery: Option<DateTime<Utc>>,
}

impl ArbScanner {
    pub fn new(config: ArbScannerConfig, trading: Arc<TradingClient>, gamma: Arc<GammaClient>) -> Self {
        Self {
            config,
            trading,
            gamma,
            markets: HashMap::new(),
            cooldowns: HashMap::new(),
            day_start: Utc::now(),
            stats: ArbStats::default(),
            executions: Vec::new(),
            last_discovery: None,
        }
    }

    pub fn stats(&self) -> ArbStats {
        ArbStats {
            markets_tracked: self.markets.len(),
            ..self.stats.clone()
        }
    }

    pub fn executions(&self) -> &[ArbExecution] {
        &self.executions
    }

    fn check_daily_reset(&mut self, now: DateTime<Utc>) {
        if (now - self.day_start).num_hours() >= 24 {
            info!(
                trades = self.stats.daily_trades,
                profit = self.stats.daily_profit,
                "arb scanner: daily reset"
            );
            self.stats.daily_trades = 0;
            self.stats.daily_profit = 0.0;
            self.stats.daily_spent = 0.0;
            self.day_start = now;
        }
    }

    /// Discover BTC up/down markets across every tracked timeframe via
    /// deterministic slugs, falling back to event pagination.
    async fn discover_markets(&mut self, now: DateTime<Utc>) {
        let mut slugs = Vec::new();
        for (tf, minutes) in TIMEFRAMES {
            let boundary = super::up_or_down::oracle::window_boundary(now, minutes);
            let next = boundary + chrono::Duration::minutes(minutes);
            slugs.push((tf, format!("btc-updown-{}-{}", tf, boundary.timestamp())));
            slugs.push((tf, format!("btc-updown-{}-{}", tf, next.timestamp())));
        }

        let slug_strs: Vec<String> = slugs.iter().map(|(_, s)| s.clone()).collect();
        let found = self.gamma.get_markets_by_slugs(&slug_strs).await;

        let mut discovered = 0usize;
        for m in found {
            let Some(condition_id) = m.condition_id.clone() else { continue };
            let Some(slug) = m.slug.clone() else { continue };
            let tf = slugs
                .iter()
                .find(|(_, s)| *s == slug)
                .map(|(tf, _)| *tf)
                .unwrap_or("?");
            let Some(token_ids_raw) = m.clob_token_ids.as_deref() else { continue };
            let Some(token_ids) = parse_flexible::<Vec<String>>(&serde_json::Value::String(
                token_ids_raw.to_string(),
            )) else {
                continue;
            };
            if token_ids.len() < 2 {
                continue;
            }
            if !m.active.unwrap_or(false) || m.closed.unwrap_or(true) {
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
            let liquidity = m
                .liquidity
                .as_deref()
                .and_then(|s| s.parse::<f64>().ok())
                .unwrap_or(0.0);
            let price_yes = m.best_ask.unwrap_or(0.5);

            self.markets.insert(
                condition_id.clone(),
                ArbMarket {
                    condition_id,
                    slug,
                    timeframe: tf,
                    token_yes: token_ids[0].clone(),
                    token_no: token_ids[1].clone(),
                    price_yes,
                    price_no: 1.0 - price_yes,
                    liquidity,
                    end_time,
                    last_price_update: now,
                },
            );
            discovered += 1;
        }

        self.markets.retain(|_, m| m.end_time > now);
        debug!(discovered, tracked = self.markets.len(), "arb scanner: discovery cycle");
        self.last_discovery = Some(now);
    }

    /// Refresh YES/NO quotes for already-known markets via the live
    /// order-book midpoint, cheaper than a full re-discovery.
    async fn refresh_prices(&mut self, now: DateTime<Utc>) {
        let ids: Vec<String> = self.markets.keys().cloned().collect();
        for id in ids {
            let (token_yes, stale) = {
                let m = &self.markets[&id];
                (
                    m.token_yes.clone(),
                    (now - m.last_price_update).num_milliseconds() as f64 / 1000.0
                        > self.config.poll_interval_secs * 0.8,
                )
            };
            if !stale {
                continue;
            }
            if let Ok(Some(mid)) = self.trading.get_midpoint(&token_yes).await {
                if let Some(m) = self.markets.get_mut(&id) {
                    m.price_yes = mid;
                    m.price_no = 1.0 - mid;
                    m.last_price_update = now;
                }
            }
        }
    }

    fn find_opportunities(&self, now: DateTime<Utc>) -> Vec<ArbMarket> {
        let mut opportunities: Vec<ArbMarket> = self
            .markets
            .values()
            .filter(|m| m.combined() < self.config.arb_threshold)
            .filter(|m| m.time_remaining_secs(now) > 30.0)
            .filter(|m| m.liquidity >= MIN_LIQUIDITY_USD)
            .filter(|m| {
                self.cooldowns
                    .get(&m.condition_id)
                    .map(|until| now >= *until)
                    .unwrap_or(true)
            })
            .filter(|m| m.edge_pct() >= self.config.min_edge_pct)
            .filter(|m| {
                let fee_yes = estimate_taker_fee_pct(m.price_yes);
                let fee_no = estimate_taker_fee_pct(m.price_no);
                let net_edge = m.edge_pct() - fee_yes - fee_no;
                net_edge > 0.0
            })
            .cloned()
            .collect();

        opportunities.sort_by(|a, b| {
            b.edge_pct()
                .partial_cmp(&a.edge_pct())
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        opportunities
    }

    /// Buy both YES and NO with FOK orders for `size_per_side_usd` each.
    async fn execute_arb(&mut self, market: &ArbMarket, now: DateTime<Utc>) {
        if self.stats.daily_trades >= self.config.max_daily_trades {
            return;
        }
        let size_per_side = self.config.size_per_side_usd;
        if self.stats.daily_spent + 2.0 * size_per_side > self.config.max_daily_budget_usd {
            return;
        }

        let shares_yes = (size_per_side / market.price_yes).max(5.0);
        let shares_no = (size_per_side / market.price_no).max(5.0);

        let yes_fill = self.trading.buy_fok(&market.token_yes, market.price_yes, shares_yes).await;
        let no_fill = self.trading.buy_fok(&market.token_no, market.price_no, shares_no).await;

        let yes_ok = yes_fill.as_ref().map(|r| r.success).unwrap_or(false);
        let no_ok = no_fill.as_ref().map(|r| r.success).unwrap_or(false);

        let status = match (yes_ok, no_ok) {
            (true, true) => ArbExecutionStatus::Filled,
            (false, false) => ArbExecutionStatus::Failed,
            _ => ArbExecutionStatus::Partial,
        };

        let spent = size_per_side * (yes_ok as u8 as f64 + no_ok as u8 as f64);
        let gross_profit = if matches!(status, ArbExecutionStatus::Filled) {
            size_per_side * (1.0 / market.combined() - 1.0)
        } else {
            0.0
        };
        let net_profit = match status {
            ArbExecutionStatus::Filled => gross_profit,
            ArbExecutionStatus::Partial => -size_per_side * 0.5,
            ArbExecutionStatus::Failed => 0.0,
        };

        self.stats.daily_trades += 1;
        self.stats.daily_spent += spent;
        self.stats.daily_profit += net_profit;
        self.cooldowns
            .insert(market.condition_id.clone(), now + chrono::Duration::seconds(self.config.market_cooldown_secs as i64));

        match status {
            ArbExecutionStatus::Filled => info!(
                condition_id = %market.condition_id, combined = market.combined(), net_profit,
                "arb: both legs filled"
            ),
            ArbExecutionStatus::Partial => warn!(
                condition_id = %market.condition_id, yes_ok, no_ok,
                "arb: only one leg filled, unwinding risk manually"
            ),
            ArbExecutionStatus::Failed => debug!(condition_id = %market.condition_id, "arb: both legs rejected"),
        }

        self.executions.push(ArbExecution {
            ts: now,
            condition_id: market.condition_id.clone(),
            timeframe: market.timeframe,
            combined: market.combined(),
            edge_pct: market.edge_pct(),
            size_per_side_usd: size_per_side,
            gross_profit,
            net_profit,
            status,
        });
    }

    /// Main loop: alternates discovery and price-refresh passes at their
    /// own cadences, executes sorted opportunities until the daily cap or
    /// budget is hit, and backs off exponentially on consecutive errors.
    pub async fn run(&mut self, shutdown: Arc<crate::infrastructure::ShutdownManager>) {
        info!(
            threshold = self.config.arb_threshold,
            poll_secs = self.config.poll_interval_secs,
            budget = self.config.max_daily_budget_usd,
            "arb scanner started"
        );

        while shutdown.is_running() {
            let now = Utc::now();
            self.check_daily_reset(now);
            self.stats.scan_count += 1;

            let needs_discovery = self
                .last_discovery
                .map(|at| (now - at).num_milliseconds() as f64 / 1000.0 >= self.config.discovery_interval_secs)
                .unwrap_or(true);

            let result: std::result::Result<(), ()> = async {
                if needs_discovery {
                    self.discover_markets(now).await;
                } else {
                    self.refresh_prices(now).await;
                }
                Ok(())
            }
            .await;

            if result.is_err() {
                self.stats.consecutive_errors += 1;
            } else {
                self.stats.consecutive_errors = 0;
            }

            let opportunities = self.find_opportunities(now);
            self.stats.opportunities_found += opportunities.len() as u64;
            for market in &opportunities {
                if self.stats.daily_trades >= self.config.max_daily_trades {
                    break;
                }
                if self.stats.daily_spent + 2.0 * self.config.size_per_side_usd
                    > self.config.max_daily_budget_usd
                {
                    break;
                }
                self.execute_arb(market, now).await;
            }

            let backoff = crate::infrastructure::backoff::exponential(
                std::time::Duration::from_secs_f64(self.config.poll_interval_secs),
                std::time::Duration::from_secs(300),
                self.stats.consecutive_errors,
            );
            shutdown.interruptible_sleep(backoff).await;
        }

        info!(
            trades = self.stats.daily_trades,
            profit = self.stats.daily_profit,
            "arb scanner stopped"
        );
    }

    pub fn stop_summary(&self) -> String {
        format!(
            "{} trades, ${:.2} profit, {} markets tracked",
            self.stats.daily_trades, self.stats.daily_profit, self.markets.len()
        )
    }
}

/// Declared winner for a resolved arb leg, reusing the same ≥0.99
/// settlement convention as the directional engines.
#[allow(dead_code)]
fn declared_winner_price(price: f64) -> Option<Direction> {
    if price >= 0.99 {
        Some(Direction::Up)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn market(price_yes: f64, liquidity: f64, secs_remaining: i64) -> ArbMarket {
        let now = Utc::now();
        ArbMarket {
            condition_id: "cond".into(),
            slug: "btc-updown-15m-1".into(),
            timeframe: "15m",
            token_yes: "yes".into(),
            token_no: "no".into(),
            price_yes,
            price_no: 1.0 - price_yes,
            liquidity,
            end_time: now + chrono::Duration::seconds(secs_remaining),
            last_price_update: now,
        }
    }

    #[test]
    fn combined_and_edge_match_spec_formula() {
        let m = market(0.48, 100.0, 600);
        assert!((m.combined() - 0.96).abs() < 1e-9);
        let edge = m.edge_pct();
        assert!((edge - 4.0).abs() < 1e-9);
    }

    #[test]
    fn edge_is_zero_when_combined_is_one() {
        let m = market(0.5, 100.0, 600);
        assert_eq!(m.edge_pct(), 0.0);
    }

    #[test]
    fn fee_estimate_peaks_at_half_price() {
        let at_half = estimate_taker_fee_pct(0.5);
        let at_quarter = estimate_taker_fee_pct(0.25);
        assert!(at_half > at_quarter);
        assert!((at_half - 1.56).abs() < 1e-9);
    }

    #[test]
    fn time_remaining_clamps_to_zero_after_expiry() {
        let m = market(0.45, 100.0, -10);
        assert_eq!(m.time_remaining_secs(Utc::now()), 0.0);
    }
}
