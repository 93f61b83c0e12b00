//! Orchestrator (§4.7): wires the Oracle, Signal, Risk, and Execution
//! layers into the 15m/5m dual-loop trading clock, the late-window
//! sweep, and the optional Arb Scanner / Market Maker background
//! engines. Owns every long-lived task handle and the one shared,
//! read-mostly price state the stream tasks write into.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use parking_lot::RwLock;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use uuid::Uuid;

use crate::domain::updown::{
    ConsensusPrice, DashboardMessage, Direction, EngineKind, Market as DomainMarket, PriceSource,
    StrategyDecision, TradeRecord,
};
use crate::infrastructure::client::binance::{spawn_binance_tracker, BinanceAsset, SharedBinancePrices};
use crate::infrastructure::client::clob::TradingClient;
use crate::infrastructure::client::gamma::GammaClient;
use crate::infrastructure::client::oracle::candlestick_api::CandlestickApiClient;
use crate::infrastructure::client::oracle::chainlink_ws::spawn_chainlink_tracker;
use crate::infrastructure::client::oracle::{OraclePriceManager, OracleType, SharedOraclePrices};
use crate::infrastructure::config::UpDownBotConfig;
use crate::infrastructure::logging::{write_performance_snapshot, JsonlWriter};
use crate::infrastructure::ShutdownManager;

use super::super::arb_scanner::ArbScanner;
use super::super::market_maker::MarketMaker;
use super::execution::{
    discover_market, parse_flexible, place_directional_order, poll_resolutions, PlacementOutcome,
};
use super::oracle::{
    compute_consensus, next_window_boundary, window_boundary, AnchorCache, CandleCache,
    Observation, OracleError,
};
use super::risk::RiskManager;
use super::signal::{decide, decide_late_window};

const ASSET: &str = "BTC";
/// Taker-side slippage allowance for the GTC fallback in `place_directional_order`.
const MAX_SLIPPAGE_PCT: f64 = 1.0;
/// Below this the late-window sweep won't chase a market that has already run.
const MIN_LATE_WINDOW_LIQUIDITY_USD: f64 = 10.0;

/// Top-level runtime for the standalone BTC up/down bot.
pub struct Orchestrator {
    config: UpDownBotConfig,
    trading: Arc<TradingClient>,
    gamma: Arc<GammaClient>,
    chainlink_prices: SharedOraclePrices,
    binance_prices: SharedBinancePrices,
    candles: CandleCache,
    anchors: AnchorCache,
    risk: Arc<RiskManager>,
    fallback_fee_pct: f64,
    shutdown: Arc<ShutdownManager>,
    dashboard_tx: broadcast::Sender<DashboardMessage>,
    trades_log: JsonlWriter,
    strategy_log: JsonlWriter,
    oracle_log: JsonlWriter,
    performance_path: PathBuf,
    pending_trades: Vec<TradeRecord>,
    trade_ids_by_engine: HashMap<EngineKind, HashSet<Uuid>>,
    late_window_traded: HashSet<String>,
    late_window_epoch: Option<DateTime<Utc>>,
    traded_this_window: bool,
    traded_5m_this_window: bool,
    directional_window_minutes: i64,
    cycle: u64,
    max_cycles: u64,
    arb_only: bool,
    sync_live_bankroll: bool,
    live_bankroll_poll_secs: u64,
    http: reqwest::Client,
}

impl Orchestrator {
    /// Assemble every client, stream task, and log sink the bot needs,
    /// and start the ChainLink/Binance price trackers in the background.
    pub async fn new(config: UpDownBotConfig, starting_capital: f64, data_dir: PathBuf) -> anyhow::Result<Self> {
        let trading = Arc::new(TradingClient::from_env().await?);
        let gamma = Arc::new(GammaClient::new(config.gamma_api_url.clone()));
        let candlestick_client = Arc::new(CandlestickApiClient::from_env()?);

        let shutdown = Arc::new(ShutdownManager::new());
        shutdown.spawn_signal_handler();

        let chainlink_prices: SharedOraclePrices = Arc::new(RwLock::new(OraclePriceManager::new()));
        {
            let prices = chainlink_prices.clone();
            let flag = shutdown.flag();
            tokio::spawn(async move {
                if let Err(e) = spawn_chainlink_tracker(prices, flag).await {
                    warn!(error = %e, "orchestrator: chainlink tracker exited");
                }
            });
        }
        let binance_prices = spawn_binance_tracker(shutdown.flag()).await?;

        let (dashboard_tx, _rx) = broadcast::channel(256);

        Ok(Self {
            risk: Arc::new(RiskManager::new(config.risk.clone(), starting_capital)),
            fallback_fee_pct: config.edge.fallback_fee_pct,
            trading,
            gamma,
            chainlink_prices,
            binance_prices,
            candles: CandleCache::new(candlestick_client),
            anchors: AnchorCache::new(),
            shutdown,
            dashboard_tx,
            trades_log: JsonlWriter::new(data_dir.join("trades.jsonl")),
            strategy_log: JsonlWriter::new(data_dir.join("strategy.jsonl")),
            oracle_log: JsonlWriter::new(data_dir.join("oracle.jsonl")),
            performance_path: data_dir.join("performance.json"),
            pending_trades: Vec::new(),
            trade_ids_by_engine: HashMap::new(),
            late_window_traded: HashSet::new(),
            late_window_epoch: None,
            traded_this_window: false,
            traded_5m_this_window: false,
            directional_window_minutes: 15,
            cycle: 0,
            max_cycles: 0,
            arb_only: false,
            sync_live_bankroll: false,
            live_bankroll_poll_secs: 60,
            http: reqwest::Client::new(),
            config,
        })
    }

    /// Bound `run()` to at most `n` trading cycles; 0 (the default) runs
    /// until shutdown.
    pub fn with_max_cycles(mut self, n: u64) -> Self {
        self.max_cycles = n;
        self
    }

    /// Disables the directional (15m/5m/late-window) loops entirely, so
    /// only the arb scanner / market maker background engines run.
    pub fn with_arb_only(mut self, arb_only: bool) -> Self {
        self.arb_only = arb_only;
        self
    }

    /// Periodically overwrites the tracked bankroll from the exchange's
    /// live USD balance instead of trusting the `--bankroll` figure for
    /// the whole run.
    pub fn with_live_bankroll_sync(mut self, enabled: bool, poll_secs: u64) -> Self {
        self.sync_live_bankroll = enabled;
        self.live_bankroll_poll_secs = poll_secs.max(1);
        self
    }

    pub fn subscribe_dashboard(&self) -> broadcast::Receiver<DashboardMessage> {
        self.dashboard_tx.subscribe()
    }

    fn broadcast_state(&self, oracle_price: f64, anchor: Option<f64>, decision: Option<StrategyDecision>) {
        let stats = self.risk.snapshot().into_iter().map(|(_, d)| d).collect();
        let _ = self.dashboard_tx.send(DashboardMessage::State {
            cycle: self.cycle,
            oracle_price,
            anchor,
            decision,
            stats,
        });
    }

    async fn notify_trade(&self, trade: TradeRecord) {
        self.trades_log.append(&trade).await.ok();
        let _ = self.dashboard_tx.send(DashboardMessage::TradeNotification { trade });
    }

    /// Observations from every wired price source, stale or not; callers
    /// filter by freshness in [`compute_consensus`].
    async fn observe(&self, now: DateTime<Utc>) -> Vec<Observation> {
        let mut obs = Vec::new();

        if let Some(entry) = self.chainlink_prices.read().get_price(OracleType::ChainLink, ASSET) {
            let age = ((now.timestamp_millis() - entry.timestamp as i64).max(0) as f64) / 1000.0;
            obs.push(Observation { source: PriceSource::ChainLink, price: entry.value, age_secs: age });
        }
        if let Some(entry) = self.binance_prices.read().get_price_by_asset(BinanceAsset::BTC) {
            obs.push(Observation {
                source: PriceSource::Binance,
                price: entry.value,
                age_secs: entry.age().as_secs_f64(),
            });
        }

        if obs.is_empty() || obs.iter().all(|o| o.age_secs > self.config.oracle.stale_after_secs) {
            if let Some(price) = fetch_exchange_rest_price(&self.http).await {
                obs.push(Observation { source: PriceSource::ExchangeRest, price, age_secs: 0.0 });
            }
        }

        obs
    }

    async fn consensus(&self, now: DateTime<Utc>) -> Result<ConsensusPrice, OracleError> {
        let obs = self.observe(now).await;
        compute_consensus(&obs, self.config.oracle.stale_after_secs, self.config.oracle.divergence_pct, now)
    }

    fn entry_instant(&self, now: DateTime<Utc>, window_minutes: i64) -> DateTime<Utc> {
        next_window_boundary(now, window_minutes)
            - ChronoDuration::seconds(self.config.active_5m.entry_lead_secs as i64)
    }

    fn is_in_entry_window(&self, now: DateTime<Utc>, window_minutes: i64) -> bool {
        let entry = self.entry_instant(now, window_minutes);
        let start = entry - ChronoDuration::seconds(self.config.active_5m.entry_window_secs as i64);
        now >= start && now <= entry
    }

    /// Re-probe which directional window (15m/1h) currently has a
    /// tradable market every 45s; locked to 15m whenever the 5m engine
    /// runs so the two never compete for the same window.
    async fn refresh_directional_interval(&mut self, now: DateTime<Utc>) {
        if self.config.active_5m.enabled {
            self.directional_window_minutes = 15;
            return;
        }
        for candidate in [15i64, 60] {
            if discover_market(&self.gamma, ASSET, candidate, now).await.is_ok() {
                self.directional_window_minutes = candidate;
                return;
            }
        }
    }

    /// The 9-phase directional trading cycle (§4.7), parametrized over
    /// the window length and owning engine so the 15m main loop and the
    /// 5m parallel loop share one implementation.
    async fn trading_cycle(&mut self, window_minutes: i64, engine: EngineKind) {
        self.cycle += 1;
        let now = Utc::now();
        let boundary = window_boundary(now, window_minutes);

        // 1. capture window anchor
        let consensus = match self.consensus(now).await {
            Ok(c) => c,
            Err(e) => {
                warn!(error = %e, ?engine, "orchestrator: no consensus price this cycle");
                self.broadcast_state(0.0, None, None);
                return;
            }
        };
        let anchor = self.anchors.get_or_capture(
            window_minutes,
            boundary,
            consensus.price,
            consensus.sources.first().copied().unwrap_or(PriceSource::Aggregator),
            now,
        );
        self.oracle_log.append(&consensus).await.ok();

        // 2. let price drift briefly before re-sampling
        let delay = self.config.active_5m.strategy_delay_secs;
        if delay > 0 {
            self.shutdown.interruptible_sleep(StdDuration::from_secs(delay)).await;
        }

        // 3. fresh consensus + candles
        let now2 = Utc::now();
        let consensus = match self.consensus(now2).await {
            Ok(c) => c,
            Err(e) => {
                warn!(error = %e, ?engine, "orchestrator: consensus lost after strategy delay");
                self.broadcast_state(consensus.price, Some(anchor.open_price), None);
                return;
            }
        };
        let candles = match self
            .candles
            .fetch(ASSET.to_string(), window_minutes, self.config.oracle.candle_min_count, now2)
            .await
        {
            Ok(c) => c,
            Err(e) => {
                warn!(error = %e, ?engine, "orchestrator: candle fetch failed");
                self.broadcast_state(consensus.price, Some(anchor.open_price), None);
                return;
            }
        };

        // 4. fee-aware decision. The per-token fee is only knowable once a
        // market is discovered, so the gate here uses the conservative
        // parabolic estimate and the real fee is logged afterward.
        let fee_estimate = self.fallback_fee_pct * 4.0 * consensus.price * (1.0 - consensus.price);
        let decision = match decide(&candles, consensus.price, Some(anchor.open_price), Some(fee_estimate), &self.config.strategy) {
            Ok(d) => d,
            Err(e) => {
                warn!(error = %e, ?engine, "orchestrator: signal engine rejected candle window");
                self.broadcast_state(consensus.price, Some(anchor.open_price), None);
                return;
            }
        };
        self.strategy_log.append(&decision).await.ok();
        self.broadcast_state(consensus.price, Some(anchor.open_price), Some(decision.clone()));

        if !decision.should_trade || !decision.direction.is_actionable() {
            return;
        }

        // 5. risk gate
        if let Err(e) = self.risk.can_trade(engine, now2) {
            info!(?engine, error = %e, "orchestrator: risk manager blocked entry");
            return;
        }

        // 6. market discovery for the current window
        let market = match discover_market(&self.gamma, ASSET, window_minutes, now2).await {
            Ok(m) => m,
            Err(e) => {
                warn!(error = %e, ?engine, "orchestrator: no tradable market for this window");
                return;
            }
        };
        if market.liquidity < MIN_LATE_WINDOW_LIQUIDITY_USD {
            info!(?engine, liquidity = market.liquidity, "orchestrator: market too thin, skipping");
            return;
        }

        // 7. hedge pass
        self.hedge_pass(engine, &market, &consensus, &decision).await;

        // 8. size and place
        let size_usd = self.risk.position_size(engine, decision.confidence);
        if size_usd <= 0.0 {
            return;
        }

        match place_directional_order(
            &self.trading,
            &market,
            decision.direction,
            size_usd,
            consensus.price,
            decision.confidence,
            MAX_SLIPPAGE_PCT,
            engine,
        )
        .await
        {
            Ok(PlacementOutcome::Filled(record)) => {
                info!(
                    ?engine, direction = ?record.direction, size_usd = record.size_usd,
                    market = %record.market_id, "orchestrator: directional trade filled"
                );
                self.trade_ids_by_engine.entry(engine).or_default().insert(record.id);
                self.notify_trade(record.clone()).await;
                self.pending_trades.push(record);
                if matches!(engine, EngineKind::Main | EngineKind::FiveMinute) {
                    // the caller flips the per-engine traded-this-window flag
                }
            }
            Ok(PlacementOutcome::NoFill(reason)) => {
                info!(?engine, reason, "orchestrator: order placement produced no fill");
            }
            Err(e) => {
                warn!(error = %e, ?engine, "orchestrator: order placement errored");
            }
        }
    }

    /// Hedge pass (§4.7 step 7): any open trade on this engine and market
    /// whose direction the fresh decision now contradicts with enough
    /// conviction gets an opposing order sized to lock in a fraction of
    /// its stake, rather than riding the original call to resolution.
    async fn hedge_pass(
        &mut self,
        engine: EngineKind,
        market: &DomainMarket,
        consensus: &ConsensusPrice,
        decision: &StrategyDecision,
    ) {
        if !self.config.hedge.enabled
            || !decision.direction.is_actionable()
            || decision.confidence < self.config.hedge.min_confidence
        {
            return;
        }

        let candidates: Vec<TradeRecord> = self
            .pending_trades
            .iter()
            .filter(|t| {
                t.engine == engine
                    && t.market_id == market.condition_id
                    && t.direction.opposes(decision.direction)
            })
            .cloned()
            .collect();

        for open in candidates {
            let hedge_size = open.size_usd * self.config.hedge.size_fraction;
            if hedge_size <= 0.0 {
                continue;
            }

            match place_directional_order(
                &self.trading,
                market,
                decision.direction,
                hedge_size,
                consensus.price,
                decision.confidence,
                MAX_SLIPPAGE_PCT,
                engine,
            )
            .await
            {
                Ok(PlacementOutcome::Filled(record)) => {
                    info!(
                        ?engine, against = %open.id, size_usd = record.size_usd,
                        market = %record.market_id, "orchestrator: hedge order filled"
                    );
                    self.trade_ids_by_engine.entry(engine).or_default().insert(record.id);
                    self.notify_trade(record.clone()).await;
                    self.pending_trades.push(record);
                }
                Ok(PlacementOutcome::NoFill(reason)) => {
                    info!(?engine, reason, "orchestrator: hedge order produced no fill");
                }
                Err(e) => warn!(error = %e, ?engine, "orchestrator: hedge order errored"),
            }
        }
    }

    /// Scans every discovered market outside the 5m timeframe for a
    /// strong late drift, entering on conviction alone once indicator
    /// lag would otherwise make the signal engine useless.
    async fn late_window_check(&mut self, now: DateTime<Utc>) {
        let cfg = self.config.late_window.clone();
        let current_15m_boundary = window_boundary(now, 15);
        if self.late_window_epoch != Some(current_15m_boundary) {
            self.late_window_traded.clear();
            self.late_window_epoch = Some(current_15m_boundary);
        }

        let markets = match self.gamma.get_all_active_markets().await {
            Ok(m) => m,
            Err(e) => {
                warn!(error = %e, "late_window: market listing failed");
                return;
            }
        };

        for m in markets {
            let Some(condition_id) = m.condition_id.clone() else { continue };
            let Some(slug) = m.slug.clone() else { continue };
            if !slug.starts_with("btc-updown-") {
                continue;
            }
            let Some(window_minutes) = parse_timeframe_minutes(&slug) else { continue };
            if window_minutes == 5 {
                continue;
            }
            if !m.active.unwrap_or(false) || m.closed.unwrap_or(true) {
                continue;
            }

            let key = format!("lw_{condition_id}");
            if self.late_window_traded.contains(&key) {
                continue;
            }

            let Some(end_time) = m
                .end_date_iso
                .as_deref()
                .or(m.end_date.as_deref())
                .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                .map(|d| d.with_timezone(&Utc))
            else {
                continue;
            };
            let remaining = (end_time - now).num_seconds();
            if remaining <= 30 || remaining > cfg.lead_secs as i64 {
                continue;
            }

            let Some(token_ids_raw) = m.clob_token_ids.as_deref() else { continue };
            let Some(token_ids) =
                parse_flexible::<Vec<String>>(&serde_json::Value::String(token_ids_raw.to_string()))
            else {
                continue;
            };
            if token_ids.len() < 2 {
                continue;
            }
            let liquidity = m
                .liquidity
                .as_deref()
                .and_then(|s| s.parse::<f64>().ok())
                .unwrap_or(0.0);
            if liquidity < MIN_LATE_WINDOW_LIQUIDITY_USD {
                continue;
            }

            let boundary = window_boundary(end_time - ChronoDuration::minutes(window_minutes), window_minutes);
            let Some(anchor) = self.anchors.get(window_minutes, boundary) else { continue };

            let consensus = match self.consensus(Utc::now()).await {
                Ok(c) => c,
                Err(_) => continue,
            };

            let decision = decide_late_window(
                consensus.price,
                anchor.open_price,
                remaining.max(0) as u64,
                cfg.min_drift_pct,
                cfg.drift_scale_pct,
                cfg.base_confidence,
                cfg.max_confidence,
            );
            if !decision.direction.is_actionable() {
                continue;
            }

            let prices_raw = m.outcome_prices.clone();
            let Some(token_index) = decision.direction.token_index() else { continue };
            let entry_price = prices_raw
                .and_then(|p| parse_flexible::<Vec<String>>(&serde_json::Value::String(p)))
                .and_then(|v| v.get(token_index).and_then(|s| s.parse::<f64>().ok()))
                .unwrap_or(1.0);
            if entry_price > cfg.max_entry_price {
                continue;
            }

            if self.risk.can_trade(EngineKind::LateWindow, Utc::now()).is_err() {
                continue;
            }
            let size_usd = self.risk.position_size(EngineKind::LateWindow, decision.confidence);
            if size_usd <= 0.0 {
                continue;
            }

            let market = DomainMarket {
                condition_id: condition_id.clone(),
                question: m.question.clone().unwrap_or_default(),
                slug: slug.clone(),
                token_ids: [token_ids[0].clone(), token_ids[1].clone()],
                prices: [entry_price, 1.0 - entry_price],
                liquidity,
                end_time,
                tradable: true,
            };

            match place_directional_order(
                &self.trading,
                &market,
                decision.direction,
                size_usd,
                consensus.price,
                decision.confidence,
                MAX_SLIPPAGE_PCT,
                EngineKind::LateWindow,
            )
            .await
            {
                Ok(PlacementOutcome::Filled(record)) => {
                    info!(market = %condition_id, "late_window: conviction trade filled");
                    self.trade_ids_by_engine.entry(EngineKind::LateWindow).or_default().insert(record.id);
                    self.late_window_traded.insert(key);
                    self.notify_trade(record.clone()).await;
                    self.pending_trades.push(record);
                }
                Ok(PlacementOutcome::NoFill(reason)) => {
                    info!(market = %condition_id, reason, "late_window: no fill");
                    self.late_window_traded.insert(key);
                }
                Err(e) => warn!(error = %e, market = %condition_id, "late_window: order errored"),
            }
        }
    }

    async fn poll_all_resolutions(&mut self, now: DateTime<Utc>) {
        if self.pending_trades.is_empty() {
            return;
        }
        let resolved = poll_resolutions(&self.trading, &mut self.pending_trades).await;
        for record in resolved {
            self.risk.record_trade(record.engine, record.pnl, record.size_usd, now);
            if let Some(ids) = self.trade_ids_by_engine.get_mut(&record.engine) {
                ids.remove(&record.id);
            }
            self.notify_trade(record).await;
        }
    }

    async fn shutdown_summary(&self) {
        let stats = self.risk.snapshot();
        let snapshot = serde_json::json!({
            "status": "shutdown",
            "cycle": self.cycle,
            "stats": stats,
        });
        if let Err(e) = write_performance_snapshot(&self.performance_path, &snapshot).await {
            warn!(error = %e, "orchestrator: failed to write performance snapshot");
        }
        info!(cycle = self.cycle, "orchestrator stopped");
    }

    /// Runs until shutdown: directional interval refresh, the 15m main
    /// loop, the optional 5m parallel loop, the late-window sweep, and
    /// the optional Arb Scanner / Market Maker background engines.
    pub async fn run(mut self) {
        info!(
            window_minutes = self.directional_window_minutes,
            arb = self.config.arb_scanner.enabled,
            market_maker = self.config.market_maker.enabled,
            active_5m = self.config.active_5m.enabled,
            "btc-updown-bot orchestrator starting"
        );

        let shutdown = self.shutdown.clone();
        let mut handles: Vec<JoinHandle<()>> = Vec::new();

        if self.config.arb_scanner.enabled {
            let mut scanner = ArbScanner::new(self.config.arb_scanner.clone(), self.trading.clone(), self.gamma.clone());
            let sd = shutdown.clone();
            handles.push(tokio::spawn(async move {
                scanner.run(sd).await;
            }));
        }

        if self.config.market_maker.enabled {
            let mut mm = MarketMaker::new(self.config.market_maker.clone(), self.trading.clone(), self.gamma.clone());
            let sd = shutdown.clone();
            handles.push(tokio::spawn(async move {
                mm.run(sd).await;
            }));
        }

        let mut last_interval_refresh = Utc::now() - ChronoDuration::days(1);
        let mut last_bankroll_sync = Utc::now() - ChronoDuration::days(1);

        while shutdown.is_running() {
            if self.max_cycles > 0 && self.cycle >= self.max_cycles {
                info!(cycle = self.cycle, max_cycles = self.max_cycles, "orchestrator: cycle bound reached");
                break;
            }

            let now = Utc::now();

            if self.sync_live_bankroll
                && (now - last_bankroll_sync).num_seconds() >= self.live_bankroll_poll_secs as i64
            {
                match self.trading.get_usd_balance().await {
                    Ok(balance) => {
                        self.risk.set_capital(balance);
                        info!(balance, "orchestrator: synced live bankroll");
                    }
                    Err(e) => warn!(error = %e, "orchestrator: live bankroll sync failed"),
                }
                last_bankroll_sync = now;
            }

            if self.arb_only {
                self.poll_all_resolutions(now).await;
                shutdown.interruptible_sleep(StdDuration::from_secs(2)).await;
                continue;
            }

            if (now - last_interval_refresh).num_seconds() >= 45 {
                self.refresh_directional_interval(now).await;
                last_interval_refresh = now;
            }

            if self.config.active_5m.enabled {
                if self.is_in_entry_window(now, 5) {
                    let boundary = next_window_boundary(now, 5);
                    let also_15m = boundary.timestamp() % (15 * 60) == 0;
                    if !also_15m && !self.traded_5m_this_window {
                        self.trading_cycle(5, EngineKind::FiveMinute).await;
                        self.traded_5m_this_window = true;
                    }
                } else {
                    self.traded_5m_this_window = false;
                }
            }

            if self.is_in_entry_window(now, self.directional_window_minutes) {
                if !self.traded_this_window {
                    self.trading_cycle(self.directional_window_minutes, EngineKind::Main).await;
                    self.traded_this_window = true;
                }
            } else {
                self.traded_this_window = false;
                if self.config.late_window.enabled {
                    self.late_window_check(now).await;
                }
            }

            self.poll_all_resolutions(now).await;
            self.anchors.prune_before(now - ChronoDuration::hours(6));

            shutdown.interruptible_sleep(StdDuration::from_secs(2)).await;
        }

        for handle in handles {
            handle.abort();
        }
        self.shutdown_summary().await;
    }
}

/// Parses the BTC up/down slug timeframe segment, e.g.
/// `btc-updown-15m-1730000000` -> `15`, `btc-updown-1h-1730000000` -> `60`.
fn parse_timeframe_minutes(slug: &str) -> Option<i64> {
    let idx = slug.find("updown-")? + "updown-".len();
    let rest = &slug[idx..];
    let digit_count = rest.chars().take_while(|c| c.is_ascii_digit()).count();
    if digit_count == 0 {
        return None;
    }
    let n: i64 = rest[..digit_count].parse().ok()?;
    match rest.as_bytes().get(digit_count) {
        Some(b'm') => Some(n),
        Some(b'h') => Some(n * 60),
        _ => None,
    }
}

/// REST aggregator fallback when both live oracle streams are stale,
/// ported from the CoinGecko/CoinCap pair the original price feed used.
async fn fetch_exchange_rest_price(http: &reqwest::Client) -> Option<f64> {
    if let Some(p) = fetch_coingecko(http).await {
        return Some(p);
    }
    fetch_coincap(http).await
}

async fn fetch_coingecko(http: &reqwest::Client) -> Option<f64> {
    let body: serde_json::Value = http
        .get("https://api.coingecko.com/api/v3/simple/price")
        .query(&[("ids", "bitcoin"), ("vs_currencies", "usd")])
        .send()
        .await
        .ok()?
        .json()
        .await
        .ok()?;
    body.get("bitcoin")?.get("usd")?.as_f64()
}

async fn fetch_coincap(http: &reqwest::Client) -> Option<f64> {
    let body: serde_json::Value = http
        .get("https://api.coincap.io/v2/assets/bitcoin")
        .send()
        .await
        .ok()?
        .json()
        .await
        .ok()?;
    body.get("data")?.get("priceUsd")?.as_str()?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minute_and_hour_timeframes() {
        assert_eq!(parse_timeframe_minutes("btc-updown-15m-1730000000"), Some(15));
        assert_eq!(parse_timeframe_minutes("btc-updown-1h-1730000000"), Some(60));
        assert_eq!(parse_timeframe_minutes("btc-updown-5m-1730000000"), Some(5));
    }

    #[test]
    fn rejects_unrelated_slugs() {
        assert_eq!(parse_timeframe_minutes("eth-price-daily"), None);
        assert_eq!(parse_timeframe_minutes("btc-updown-xm-123"), None);
    }
}
