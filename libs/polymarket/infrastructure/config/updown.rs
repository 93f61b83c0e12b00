//! Configuration for the BTC up/down prediction-market bot.
//!
//! Shares the same load/validate idiom as [`super::BotConfig`]: a YAML
//! body for tunables, `.env` for secrets, validate-on-load.

use super::{ConfigError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

/// Root configuration for `btc_updown_bot`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpDownBotConfig {
    #[serde(default)]
    pub oracle: OracleConfig,
    #[serde(default)]
    pub strategy: StrategyTuning,
    #[serde(default)]
    pub risk: UpDownRiskConfig,
    #[serde(default)]
    pub edge: EdgeConfig,
    #[serde(default)]
    pub late_window: LateWindowConfig,
    #[serde(default)]
    pub hedge: HedgeConfig,
    #[serde(default)]
    pub market_maker: MarketMakerConfig,
    #[serde(default)]
    pub arb_scanner: ArbScannerConfig,
    #[serde(default)]
    pub active_5m: Active5mConfig,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_gamma_api")]
    pub gamma_api_url: String,
    #[serde(default = "default_clob_url")]
    pub clob_url: String,

    /// RPC URL, from `.env` (`RPC_URL`)
    #[serde(skip)]
    pub rpc_url: String,
    /// Private key, from `.env` (`PRIVATE_KEY`)
    #[serde(skip)]
    pub private_key: String,
    /// Proxy/funder wallet address, from `.env` (`FUNDER_ADDRESS`)
    #[serde(skip)]
    pub funder_address: String,
    /// ERC1155/EOA signature type, from `.env` (`SIGNATURE_TYPE`), default 1 (POLY_PROXY)
    #[serde(skip)]
    pub signature_type: u8,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_gamma_api() -> String {
    "https://gamma-api.polymarket.com".to_string()
}

fn default_clob_url() -> String {
    "https://clob.polymarket.com".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OracleConfig {
    #[serde(default = "default_reconnect_base_secs")]
    pub reconnect_base_secs: u64,
    #[serde(default = "default_reconnect_max_secs")]
    pub reconnect_max_secs: u64,
    #[serde(default = "default_watchdog_interval_secs")]
    pub watchdog_interval_secs: u64,
    #[serde(default = "default_stale_after_secs")]
    pub stale_after_secs: u64,
    #[serde(default = "default_divergence_pct")]
    pub divergence_pct: f64,
    #[serde(default = "default_candle_min_count")]
    pub candle_min_count: usize,
    #[serde(default = "default_candidate_api_user_id")]
    pub candlestick_user_id: String,
}

fn default_reconnect_base_secs() -> u64 {
    5
}
fn default_reconnect_max_secs() -> u64 {
    120
}
fn default_watchdog_interval_secs() -> u64 {
    10
}
fn default_stale_after_secs() -> u64 {
    30
}
fn default_divergence_pct() -> f64 {
    1.0
}
fn default_candle_min_count() -> usize {
    30
}
fn default_candidate_api_user_id() -> String {
    String::new()
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            reconnect_base_secs: default_reconnect_base_secs(),
            reconnect_max_secs: default_reconnect_max_secs(),
            watchdog_interval_secs: default_watchdog_interval_secs(),
            stale_after_secs: default_stale_after_secs(),
            divergence_pct: default_divergence_pct(),
            candle_min_count: default_candle_min_count(),
            candlestick_user_id: default_candidate_api_user_id(),
        }
    }
}

/// Signal Engine weights and gates (§4.2).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyTuning {
    #[serde(default = "default_price_vs_open_threshold_pct")]
    pub price_vs_open_threshold_pct: f64,
    #[serde(default = "default_price_vs_open_scale_pct")]
    pub price_vs_open_scale_pct: f64,
    #[serde(default = "default_momentum_lookback")]
    pub momentum_lookback: usize,
    #[serde(default = "default_momentum_threshold_pct")]
    pub momentum_threshold_pct: f64,
    #[serde(default = "default_momentum_scale_pct")]
    pub momentum_scale_pct: f64,
    #[serde(default = "default_rsi_period")]
    pub rsi_period: usize,
    #[serde(default = "default_rsi_overbought")]
    pub rsi_overbought: f64,
    #[serde(default = "default_rsi_oversold")]
    pub rsi_oversold: f64,
    #[serde(default = "default_macd_fast")]
    pub macd_fast: usize,
    #[serde(default = "default_macd_slow")]
    pub macd_slow: usize,
    #[serde(default = "default_macd_signal")]
    pub macd_signal: usize,
    #[serde(default = "default_ema_cross_threshold_pct")]
    pub ema_cross_threshold_pct: f64,
    #[serde(default = "default_weight_price_vs_open")]
    pub weight_price_vs_open: f64,
    #[serde(default = "default_weight_momentum")]
    pub weight_momentum: f64,
    #[serde(default = "default_weight_rsi")]
    pub weight_rsi: f64,
    #[serde(default = "default_weight_macd")]
    pub weight_macd: f64,
    #[serde(default = "default_weight_ema_cross")]
    pub weight_ema_cross: f64,
    #[serde(default = "default_volatility_lookback")]
    pub volatility_lookback: usize,
    #[serde(default = "default_min_volatility_pct")]
    pub min_volatility_pct: f64,
    #[serde(default = "default_max_volatility_pct")]
    pub max_volatility_pct: f64,
    #[serde(default = "default_chop_drift_pct")]
    pub chop_drift_pct: f64,
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f64,
}

fn default_price_vs_open_threshold_pct() -> f64 {
    0.04
}
fn default_price_vs_open_scale_pct() -> f64 {
    0.15
}
fn default_momentum_lookback() -> usize {
    5
}
fn default_momentum_threshold_pct() -> f64 {
    0.02
}
fn default_momentum_scale_pct() -> f64 {
    0.5
}
fn default_rsi_period() -> usize {
    14
}
fn default_rsi_overbought() -> f64 {
    70.0
}
fn default_rsi_oversold() -> f64 {
    30.0
}
fn default_macd_fast() -> usize {
    12
}
fn default_macd_slow() -> usize {
    26
}
fn default_macd_signal() -> usize {
    9
}
fn default_ema_cross_threshold_pct() -> f64 {
    0.15
}
fn default_weight_price_vs_open() -> f64 {
    0.70
}
fn default_weight_momentum() -> f64 {
    0.40
}
fn default_weight_rsi() -> f64 {
    0.25
}
fn default_weight_macd() -> f64 {
    0.20
}
fn default_weight_ema_cross() -> f64 {
    0.15
}
fn default_volatility_lookback() -> usize {
    20
}
fn default_min_volatility_pct() -> f64 {
    0.01
}
fn default_max_volatility_pct() -> f64 {
    2.0
}
fn default_chop_drift_pct() -> f64 {
    0.12
}
fn default_confidence_threshold() -> f64 {
    0.55
}

impl Default for StrategyTuning {
    fn default() -> Self {
        Self {
            price_vs_open_threshold_pct: default_price_vs_open_threshold_pct(),
            price_vs_open_scale_pct: default_price_vs_open_scale_pct(),
            momentum_lookback: default_momentum_lookback(),
            momentum_threshold_pct: default_momentum_threshold_pct(),
            momentum_scale_pct: default_momentum_scale_pct(),
            rsi_period: default_rsi_period(),
            rsi_overbought: default_rsi_overbought(),
            rsi_oversold: default_rsi_oversold(),
            macd_fast: default_macd_fast(),
            macd_slow: default_macd_slow(),
            macd_signal: default_macd_signal(),
            ema_cross_threshold_pct: default_ema_cross_threshold_pct(),
            weight_price_vs_open: default_weight_price_vs_open(),
            weight_momentum: default_weight_momentum(),
            weight_rsi: default_weight_rsi(),
            weight_macd: default_weight_macd(),
            weight_ema_cross: default_weight_ema_cross(),
            volatility_lookback: default_volatility_lookback(),
            min_volatility_pct: default_min_volatility_pct(),
            max_volatility_pct: default_max_volatility_pct(),
            chop_drift_pct: default_chop_drift_pct(),
            confidence_threshold: default_confidence_threshold(),
        }
    }
}

/// Kelly-sizing Risk Manager tuning (§4.3), distinct from the legacy
/// oracle-proximity [`super::super::super::domain::RiskConfig`].
///
/// `kelly_fraction`, the daily-trade/loss/streak caps, and the cooldown
/// length are shared across engines (the original only ever tuned one
/// set of these); `max_trade_usd`/`max_trade_pct`/`budget_pct` are the
/// "independent per-engine risk budgets" §2 calls for, so each engine
/// gets its own [`EngineRiskProfile`] layered on top of these shared
/// defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpDownRiskConfig {
    #[serde(default = "default_max_daily_trades")]
    pub max_daily_trades: u32,
    #[serde(default = "default_daily_loss_cap_pct")]
    pub daily_loss_cap_pct: f64,
    #[serde(default = "default_consecutive_loss_cap")]
    pub consecutive_loss_cap: u32,
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: u64,
    #[serde(default = "default_kelly_fraction")]
    pub kelly_fraction: f64,
    #[serde(default = "default_min_trade_usd")]
    pub min_trade_usd: f64,
    #[serde(default = "default_max_trade_usd")]
    pub max_trade_usd: f64,
    #[serde(default = "default_max_trade_pct")]
    pub max_trade_pct: f64,
    #[serde(default = "default_budget_pct")]
    pub budget_pct: f64,
    #[serde(default)]
    pub main: EngineRiskProfile,
    #[serde(default)]
    pub late_window: EngineRiskProfile,
    #[serde(default)]
    pub five_minute: EngineRiskProfile,
}

/// Per-engine override of the position-size ceiling and the fraction of
/// start-of-day capital the engine may spend in a day (invariant I6).
/// `None` fields fall back to the shared [`UpDownRiskConfig`] value.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct EngineRiskProfile {
    #[serde(default)]
    pub max_trade_usd: Option<f64>,
    #[serde(default)]
    pub budget_pct: Option<f64>,
}

fn default_budget_pct() -> f64 {
    20.0
}

fn default_max_daily_trades() -> u32 {
    40
}
fn default_daily_loss_cap_pct() -> f64 {
    10.0
}
fn default_consecutive_loss_cap() -> u32 {
    4
}
fn default_cooldown_secs() -> u64 {
    900
}
fn default_kelly_fraction() -> f64 {
    0.25
}
fn default_min_trade_usd() -> f64 {
    1.0
}
fn default_max_trade_usd() -> f64 {
    25.0
}
fn default_max_trade_pct() -> f64 {
    5.0
}

impl Default for UpDownRiskConfig {
    fn default() -> Self {
        Self {
            max_daily_trades: default_max_daily_trades(),
            daily_loss_cap_pct: default_daily_loss_cap_pct(),
            consecutive_loss_cap: default_consecutive_loss_cap(),
            cooldown_secs: default_cooldown_secs(),
            kelly_fraction: default_kelly_fraction(),
            min_trade_usd: default_min_trade_usd(),
            max_trade_usd: default_max_trade_usd(),
            max_trade_pct: default_max_trade_pct(),
            budget_pct: default_budget_pct(),
            main: EngineRiskProfile::default(),
            late_window: EngineRiskProfile { max_trade_usd: None, budget_pct: Some(10.0) },
            five_minute: EngineRiskProfile { max_trade_usd: None, budget_pct: Some(10.0) },
        }
    }
}

/// Arb scanner tuning (§4.5), constants sourced from the original bot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArbScannerConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_arb_threshold")]
    pub arb_threshold: f64,
    #[serde(default = "default_min_edge_pct")]
    pub min_edge_pct: f64,
    #[serde(default = "default_arb_poll_secs")]
    pub poll_interval_secs: f64,
    #[serde(default = "default_arb_discovery_secs")]
    pub discovery_interval_secs: f64,
    #[serde(default = "default_arb_max_daily_trades")]
    pub max_daily_trades: u32,
    #[serde(default = "default_arb_max_daily_budget")]
    pub max_daily_budget_usd: f64,
    #[serde(default = "default_arb_market_cooldown_secs")]
    pub market_cooldown_secs: u64,
    #[serde(default = "default_arb_size_per_side_usd")]
    pub size_per_side_usd: f64,
}

fn default_arb_threshold() -> f64 {
    0.98
}
fn default_min_edge_pct() -> f64 {
    1.0
}
fn default_arb_poll_secs() -> f64 {
    8.0
}
fn default_arb_discovery_secs() -> f64 {
    45.0
}
fn default_arb_max_daily_trades() -> u32 {
    50
}
fn default_arb_max_daily_budget() -> f64 {
    20.0
}
fn default_arb_market_cooldown_secs() -> u64 {
    120
}
fn default_arb_size_per_side_usd() -> f64 {
    10.0
}

impl Default for ArbScannerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            arb_threshold: default_arb_threshold(),
            min_edge_pct: default_min_edge_pct(),
            poll_interval_secs: default_arb_poll_secs(),
            discovery_interval_secs: default_arb_discovery_secs(),
            max_daily_trades: default_arb_max_daily_trades(),
            max_daily_budget_usd: default_arb_max_daily_budget(),
            market_cooldown_secs: default_arb_market_cooldown_secs(),
            size_per_side_usd: default_arb_size_per_side_usd(),
        }
    }
}

/// Late-window directional sweep tuning (§4.7).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LateWindowConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_late_window_lead_secs")]
    pub lead_secs: u64,
    #[serde(default = "default_late_window_min_remaining_secs")]
    pub min_remaining_secs: u64,
    #[serde(default = "default_late_window_min_drift_pct")]
    pub min_drift_pct: f64,
    #[serde(default = "default_late_window_drift_scale_pct")]
    pub drift_scale_pct: f64,
    #[serde(default = "default_late_window_base_confidence")]
    pub base_confidence: f64,
    #[serde(default = "default_late_window_max_confidence")]
    pub max_confidence: f64,
    #[serde(default = "default_late_window_max_entry_price")]
    pub max_entry_price: f64,
}

fn default_late_window_lead_secs() -> u64 {
    90
}
fn default_late_window_min_remaining_secs() -> u64 {
    30
}
fn default_late_window_min_drift_pct() -> f64 {
    0.03
}
fn default_late_window_drift_scale_pct() -> f64 {
    0.20
}
fn default_late_window_base_confidence() -> f64 {
    0.55
}
fn default_late_window_max_confidence() -> f64 {
    0.85
}
fn default_late_window_max_entry_price() -> f64 {
    0.80
}

impl Default for LateWindowConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            lead_secs: default_late_window_lead_secs(),
            min_remaining_secs: default_late_window_min_remaining_secs(),
            min_drift_pct: default_late_window_min_drift_pct(),
            drift_scale_pct: default_late_window_drift_scale_pct(),
            base_confidence: default_late_window_base_confidence(),
            max_confidence: default_late_window_max_confidence(),
            max_entry_price: default_late_window_max_entry_price(),
        }
    }
}

/// Hedge pass tuning (§4.7 step 7): partial-profit locking on a fresh
/// decision that contradicts an open trade.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HedgeConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_hedge_min_confidence")]
    pub min_confidence: f64,
    #[serde(default = "default_hedge_size_fraction")]
    pub size_fraction: f64,
}

fn default_hedge_min_confidence() -> f64 {
    0.70
}
fn default_hedge_size_fraction() -> f64 {
    0.5
}

impl Default for HedgeConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            min_confidence: default_hedge_min_confidence(),
            size_fraction: default_hedge_size_fraction(),
        }
    }
}

/// Market maker tuning (§4.6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketMakerConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_mm_refresh_secs")]
    pub refresh_secs: u64,
    #[serde(default = "default_mm_pull_before_close_secs")]
    pub pull_before_close_secs: u64,
    #[serde(default = "default_mm_half_spread")]
    pub half_spread: f64,
    #[serde(default = "default_mm_level_spacing")]
    pub level_spacing: f64,
    #[serde(default = "default_mm_levels")]
    pub levels: u32,
    #[serde(default = "default_mm_size_usd")]
    pub size_usd_per_level: f64,
    #[serde(default = "default_mm_max_imbalance")]
    pub max_imbalance_shares: f64,
    #[serde(default = "default_mm_max_daily_budget")]
    pub max_daily_budget_usd: f64,
    #[serde(default = "default_mm_max_open_orders")]
    pub max_open_orders: u32,
    #[serde(default = "default_mm_min_mid")]
    pub min_mid: f64,
    #[serde(default = "default_mm_max_mid")]
    pub max_mid: f64,
}

fn default_mm_refresh_secs() -> u64 {
    20
}
fn default_mm_pull_before_close_secs() -> u64 {
    30
}
fn default_mm_half_spread() -> f64 {
    0.01
}
fn default_mm_level_spacing() -> f64 {
    0.01
}
fn default_mm_levels() -> u32 {
    3
}
fn default_mm_size_usd() -> f64 {
    10.0
}
fn default_mm_max_imbalance() -> f64 {
    200.0
}
fn default_mm_max_daily_budget() -> f64 {
    100.0
}
fn default_mm_max_open_orders() -> u32 {
    12
}
fn default_mm_min_mid() -> f64 {
    0.35
}
fn default_mm_max_mid() -> f64 {
    0.65
}

impl Default for MarketMakerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            refresh_secs: default_mm_refresh_secs(),
            pull_before_close_secs: default_mm_pull_before_close_secs(),
            half_spread: default_mm_half_spread(),
            level_spacing: default_mm_level_spacing(),
            levels: default_mm_levels(),
            size_usd_per_level: default_mm_size_usd(),
            max_imbalance_shares: default_mm_max_imbalance(),
            max_daily_budget_usd: default_mm_max_daily_budget(),
            max_open_orders: default_mm_max_open_orders(),
            min_mid: default_mm_min_mid(),
            max_mid: default_mm_max_mid(),
        }
    }
}

/// Tuning for the parallel 5-minute engine and the entry-window math
/// shared by both the 15m and 5m loops.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Active5mConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_entry_lead_secs")]
    pub entry_lead_secs: u64,
    #[serde(default = "default_entry_window_secs")]
    pub entry_window_secs: u64,
    #[serde(default = "default_strategy_delay_secs")]
    pub strategy_delay_secs: u64,
}

fn default_entry_lead_secs() -> u64 {
    45
}
fn default_entry_window_secs() -> u64 {
    30
}
fn default_strategy_delay_secs() -> u64 {
    0
}

impl Default for Active5mConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            entry_lead_secs: default_entry_lead_secs(),
            entry_window_secs: default_entry_window_secs(),
            strategy_delay_secs: default_strategy_delay_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdgeConfig {
    /// Fallback parabolic fee model (`fallback * 4 * p * (1-p)`) used
    /// when the live fee endpoint is unavailable.
    #[serde(default = "default_fallback_fee_pct")]
    pub fallback_fee_pct: f64,
    #[serde(default = "default_fee_cache_ttl_secs")]
    pub fee_cache_ttl_secs: u64,
}

fn default_fallback_fee_pct() -> f64 {
    2.0
}
fn default_fee_cache_ttl_secs() -> u64 {
    60
}

impl Default for EdgeConfig {
    fn default() -> Self {
        Self {
            fallback_fee_pct: default_fallback_fee_pct(),
            fee_cache_ttl_secs: default_fee_cache_ttl_secs(),
        }
    }
}

impl UpDownBotConfig {
    /// Load configuration from YAML file and `.env`.
    pub fn load(config_path: impl AsRef<Path>) -> Result<Self> {
        let yaml_content = std::fs::read_to_string(config_path)?;
        let mut config: UpDownBotConfig = serde_yaml::from_str(&yaml_content)?;

        dotenv::dotenv().ok();

        config.rpc_url = std::env::var("RPC_URL")
            .map_err(|_| ConfigError::EnvVarMissing("RPC_URL".to_string()))?;
        config.private_key = std::env::var("PRIVATE_KEY")
            .map_err(|_| ConfigError::EnvVarMissing("PRIVATE_KEY".to_string()))?;
        config.funder_address = std::env::var("FUNDER_ADDRESS")
            .map_err(|_| ConfigError::EnvVarMissing("FUNDER_ADDRESS".to_string()))?;
        config.signature_type = std::env::var("SIGNATURE_TYPE")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(1);

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        let valid_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_levels.contains(&self.log_level.to_lowercase().as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "log_level must be one of: {}",
                valid_levels.join(", ")
            )));
        }

        if self.strategy.weight_price_vs_open <= 0.0 {
            return Err(ConfigError::ValidationError(
                "strategy.weight_price_vs_open must be positive".to_string(),
            ));
        }
        if self.strategy.macd_fast >= self.strategy.macd_slow {
            return Err(ConfigError::ValidationError(
                "strategy.macd_fast must be less than strategy.macd_slow".to_string(),
            ));
        }
        if self.strategy.min_volatility_pct >= self.strategy.max_volatility_pct {
            return Err(ConfigError::ValidationError(
                "strategy.min_volatility_pct must be less than strategy.max_volatility_pct"
                    .to_string(),
            ));
        }

        if self.risk.kelly_fraction <= 0.0 || self.risk.kelly_fraction > 1.0 {
            return Err(ConfigError::ValidationError(
                "risk.kelly_fraction must be between 0 and 1".to_string(),
            ));
        }
        if self.risk.min_trade_usd > self.risk.max_trade_usd {
            return Err(ConfigError::ValidationError(
                "risk.min_trade_usd must be <= risk.max_trade_usd".to_string(),
            ));
        }

        if self.market_maker.min_mid >= self.market_maker.max_mid {
            return Err(ConfigError::ValidationError(
                "market_maker.min_mid must be less than market_maker.max_mid".to_string(),
            ));
        }

        if !self.private_key.starts_with("0x") || self.private_key.len() != 66 {
            return Err(ConfigError::ValidationError(
                "PRIVATE_KEY must be a valid hex string (0x followed by 64 hex characters)"
                    .to_string(),
            ));
        }
        if !self.funder_address.starts_with("0x") || self.funder_address.len() != 42 {
            return Err(ConfigError::ValidationError(
                "FUNDER_ADDRESS must be a valid Ethereum address (0x followed by 40 hex characters)"
                    .to_string(),
            ));
        }

        Ok(())
    }

    /// Log configuration summary.
    pub fn log(&self) {
        info!("Up/Down bot configuration loaded:");
        info!("  Log level: {}", self.log_level);
        info!("  Gamma API: {}", self.gamma_api_url);
        info!("  CLOB: {}", self.clob_url);
        info!(
            "  Risk: max_daily_trades={} daily_loss_cap={}% kelly_fraction={}",
            self.risk.max_daily_trades, self.risk.daily_loss_cap_pct, self.risk.kelly_fraction
        );
        info!(
            "  Arb scanner: enabled={} threshold={} min_edge={}%",
            self.arb_scanner.enabled, self.arb_scanner.arb_threshold, self.arb_scanner.min_edge_pct
        );
        info!(
            "  Market maker: enabled={} refresh={}s",
            self.market_maker.enabled, self.market_maker.refresh_secs
        );
        info!(
            "  Late window: enabled={} lead={}s",
            self.late_window.enabled, self.late_window.lead_secs
        );
        info!(
            "  Hedge pass: enabled={} min_confidence={} size_fraction={}",
            self.hedge.enabled, self.hedge.min_confidence, self.hedge.size_fraction
        );
        info!("  5m engine: enabled={}", self.active_5m.enabled);
    }
}

impl Default for UpDownBotConfig {
    fn default() -> Self {
        Self {
            oracle: OracleConfig::default(),
            strategy: StrategyTuning::default(),
            risk: UpDownRiskConfig::default(),
            edge: EdgeConfig::default(),
            late_window: LateWindowConfig::default(),
            hedge: HedgeConfig::default(),
            market_maker: MarketMakerConfig::default(),
            arb_scanner: ArbScannerConfig::default(),
            active_5m: Active5mConfig::default(),
            log_level: default_log_level(),
            gamma_api_url: default_gamma_api(),
            clob_url: default_clob_url(),
            rpc_url: String::new(),
            private_key: String::new(),
            funder_address: String::new(),
            signature_type: 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> UpDownBotConfig {
        let mut cfg = UpDownBotConfig::default();
        cfg.private_key = "0x1234567890123456789012345678901234567890123456789012345678901234"
            .to_string();
        cfg.funder_address = "0x1234567890123456789012345678901234567890".to_string();
        cfg
    }

    #[test]
    fn defaults_validate() {
        assert!(valid_config().validate().is_ok());
    }

    #[test]
    fn rejects_inverted_macd_periods() {
        let mut cfg = valid_config();
        cfg.strategy.macd_fast = 30;
        cfg.strategy.macd_slow = 26;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_bad_kelly_fraction() {
        let mut cfg = valid_config();
        cfg.risk.kelly_fraction = 1.5;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_inverted_mm_mid_bounds() {
        let mut cfg = valid_config();
        cfg.market_maker.min_mid = 0.7;
        cfg.market_maker.max_mid = 0.6;
        assert!(cfg.validate().is_err());
    }
}
