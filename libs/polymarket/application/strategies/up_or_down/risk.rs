//! Kelly-sizing Risk Manager for the Up/Down runtime (§4.3).
//!
//! Distinct from [`crate::application::strategy::RiskManager`], which
//! is the teacher's oracle-proximity guardian used by the legacy
//! tracker in [`super::strategy`] - that one stays in place as a
//! separate, never-bypassed safety net. This one tracks Kelly sizing
//! and per-engine daily limits for the new bot.

use crate::domain::updown::{DailyStats, EngineKind};
use crate::infrastructure::config::{EngineRiskProfile, UpDownRiskConfig};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error, PartialEq)]
pub enum RiskError {
    #[error("engine {0:?} is in cooldown until {1}")]
    Cooldown(EngineKind, DateTime<Utc>),

    #[error("engine {0:?} has reached its daily trade cap ({1})")]
    DailyTradeCapReached(EngineKind, u32),

    #[error("engine {0:?} has reached its daily loss cap ({1:.2}%)")]
    DailyLossCapReached(EngineKind, f64),

    #[error("engine {0:?} has hit the consecutive-loss streak cap ({1})")]
    ConsecutiveLossCap(EngineKind, u32),

    #[error("engine {0:?} has spent its daily budget ({1:.2}% of start-of-day capital)")]
    DailyBudgetExhausted(EngineKind, f64),

    #[error("capital depleted")]
    CapitalDepleted,
}

pub type Result<T> = std::result::Result<T, RiskError>;

/// Tracks per-engine daily counters and computes Kelly-fraction sizing.
pub struct RiskManager {
    config: UpDownRiskConfig,
    capital: RwLock<f64>,
    stats: RwLock<HashMap<EngineKind, DailyStats>>,
}

impl RiskManager {
    pub fn new(config: UpDownRiskConfig, starting_capital: f64) -> Self {
        Self {
            config,
            capital: RwLock::new(starting_capital),
            stats: RwLock::new(HashMap::new()),
        }
    }

    /// Current bankroll, as last synced from the exchange or updated by trades.
    pub fn capital(&self) -> f64 {
        *self.capital.read()
    }

    /// Overwrite the tracked bankroll (used when syncing live balance).
    pub fn set_capital(&self, capital: f64) {
        *self.capital.write() = capital;
    }

    /// The per-engine profile for `engine`, falling back to `main`'s for
    /// engines with no dedicated entry (arb/market-maker size themselves
    /// independently and don't consult this risk manager).
    fn profile_for(&self, engine: EngineKind) -> EngineRiskProfile {
        match engine {
            EngineKind::Main => self.config.main,
            EngineKind::LateWindow => self.config.late_window,
            EngineKind::FiveMinute => self.config.five_minute,
            EngineKind::Arb | EngineKind::MarketMaker => self.config.main,
        }
    }

    fn max_trade_usd(&self, engine: EngineKind) -> f64 {
        self.profile_for(engine).max_trade_usd.unwrap_or(self.config.max_trade_usd)
    }

    fn budget_pct(&self, engine: EngineKind) -> f64 {
        self.profile_for(engine).budget_pct.unwrap_or(self.config.budget_pct)
    }

    fn stats_for(&self, engine: EngineKind, now: DateTime<Utc>) -> DailyStats {
        let mut stats = self.stats.write();
        let capital = *self.capital.read();
        let entry = stats
            .entry(engine)
            .or_insert_with(|| DailyStats::new(now, capital));
        if !entry.is_same_utc_day(now) {
            *entry = DailyStats::new(now, capital);
        }
        entry.clone()
    }

    /// Gate per §4.3: cooldown, daily trade cap, daily loss cap,
    /// consecutive-loss streak cap, capital exhaustion - in that order.
    pub fn can_trade(&self, engine: EngineKind, now: DateTime<Utc>) -> Result<()> {
        let daily = self.stats_for(engine, now);

        if let Some(until) = daily.cooldown_until {
            if now < until {
                return Err(RiskError::Cooldown(engine, until));
            }
        }

        if daily.trades >= self.config.max_daily_trades {
            return Err(RiskError::DailyTradeCapReached(engine, self.config.max_daily_trades));
        }

        if daily.start_of_day_capital > 0.0 {
            let loss_pct = (-daily.pnl).max(0.0) / daily.start_of_day_capital * 100.0;
            if loss_pct >= self.config.daily_loss_cap_pct {
                return Err(RiskError::DailyLossCapReached(engine, self.config.daily_loss_cap_pct));
            }
        }

        if daily.consecutive_losses >= self.config.consecutive_loss_cap {
            self.set_cooldown(engine, now);
            return Err(RiskError::ConsecutiveLossCap(engine, self.config.consecutive_loss_cap));
        }

        if *self.capital.read() <= 0.0 {
            return Err(RiskError::CapitalDepleted);
        }

        let budget_pct = self.budget_pct(engine);
        if daily.start_of_day_capital > 0.0 {
            let spent_pct = daily.budget_spent / daily.start_of_day_capital * 100.0;
            if spent_pct >= budget_pct {
                return Err(RiskError::DailyBudgetExhausted(engine, budget_pct));
            }
        }

        Ok(())
    }

    fn set_cooldown(&self, engine: EngineKind, now: DateTime<Utc>) {
        let until = now + chrono::Duration::seconds(self.config.cooldown_secs as i64);
        let mut stats = self.stats.write();
        if let Some(entry) = stats.get_mut(&engine) {
            entry.cooldown_until = Some(until);
        }
        warn!(?engine, until = %until, "risk: cooldown engaged after consecutive-loss streak");
    }

    /// Fractional Kelly sizing: `kelly = max(0, 2*confidence - 1)`,
    /// `size = capital * kelly * kelly_fraction`, clamped to
    /// `[min_trade, max_trade]`, to `capital * max_trade_pct / 100`, and
    /// finally to `capital` itself.
    pub fn position_size(&self, engine: EngineKind, confidence: f64) -> f64 {
        let capital = *self.capital.read();
        let kelly = (2.0 * confidence - 1.0).max(0.0);
        let raw = capital * kelly * self.config.kelly_fraction;

        let max_trade = self.max_trade_usd(engine);
        let clamped_min_max = raw.clamp(self.config.min_trade_usd, max_trade);
        let pct_cap = capital * self.config.max_trade_pct / 100.0;
        clamped_min_max.min(pct_cap).min(capital).max(0.0)
    }

    /// Record a settled trade's PnL against its owning engine's daily stats.
    pub fn record_trade(&self, engine: EngineKind, pnl: f64, size_usd: f64, now: DateTime<Utc>) {
        let mut stats = self.stats.write();
        let capital_snapshot = *self.capital.read();
        let entry = stats
            .entry(engine)
            .or_insert_with(|| DailyStats::new(now, capital_snapshot));
        if !entry.is_same_utc_day(now) {
            *entry = DailyStats::new(now, capital_snapshot);
        }

        entry.trades += 1;
        entry.pnl += pnl;
        entry.budget_spent += size_usd;
        if pnl > 0.0 {
            entry.wins += 1;
            entry.consecutive_losses = 0;
        } else {
            entry.losses += 1;
            entry.consecutive_losses += 1;
        }
        drop(stats);

        *self.capital.write() += pnl;

        info!(
            ?engine,
            pnl,
            capital = *self.capital.read(),
            "risk: trade recorded"
        );
    }

    /// Snapshot of today's stats for every engine touched so far, for
    /// dashboard state pushes and `performance.json`.
    pub fn snapshot(&self) -> Vec<(EngineKind, DailyStats)> {
        self.stats
            .read()
            .iter()
            .map(|(k, v)| (*k, v.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> UpDownRiskConfig {
        UpDownRiskConfig {
            max_daily_trades: 40,
            daily_loss_cap_pct: 10.0,
            consecutive_loss_cap: 4,
            cooldown_secs: 900,
            kelly_fraction: 0.25,
            min_trade_usd: 1.0,
            max_trade_usd: 25.0,
            max_trade_pct: 5.0,
            budget_pct: 20.0,
            main: EngineRiskProfile::default(),
            late_window: EngineRiskProfile::default(),
            five_minute: EngineRiskProfile::default(),
        }
    }

    #[test]
    fn kelly_sizing_matches_spec_scenario() {
        let rm = RiskManager::new(cfg(), 500.0);
        // kelly = 2*0.85-1 = 0.70; raw = 500*0.70*0.25 = 87.5
        // clamp [1,25] -> 25; pct cap 500*5%=25 -> 25; capital 500 -> 25
        let size = rm.position_size(EngineKind::Main, 0.85);
        assert!((size - 25.0).abs() < 1e-9);
    }

    #[test]
    fn zero_edge_confidence_sizes_to_zero() {
        let rm = RiskManager::new(cfg(), 500.0);
        assert_eq!(rm.position_size(EngineKind::Main, 0.5), 0.0);
    }

    #[test]
    fn per_engine_max_trade_override_is_respected() {
        let mut config = cfg();
        config.late_window.max_trade_usd = Some(5.0);
        let rm = RiskManager::new(config, 500.0);
        // kelly = 0.70, raw = 87.5, but late_window caps at 5.0
        let size = rm.position_size(EngineKind::LateWindow, 0.85);
        assert!((size - 5.0).abs() < 1e-9);
    }

    #[test]
    fn daily_budget_cap_blocks_trading_independent_of_loss_cap() {
        let rm = RiskManager::new(cfg(), 500.0);
        let now = Utc::now();
        // Spend 20% of capital (the default budget_pct) with a winning trade
        // so the loss cap never trips, only the budget cap should.
        rm.record_trade(EngineKind::Main, 5.0, 100.0, now);
        let err = rm.can_trade(EngineKind::Main, now).unwrap_err();
        assert!(matches!(err, RiskError::DailyBudgetExhausted(EngineKind::Main, _)));
    }

    #[test]
    fn consecutive_losses_trigger_cooldown() {
        let rm = RiskManager::new(cfg(), 500.0);
        let now = Utc::now();
        for _ in 0..4 {
            rm.record_trade(EngineKind::Main, -10.0, 10.0, now);
        }
        let err = rm.can_trade(EngineKind::Main, now).unwrap_err();
        assert!(matches!(err, RiskError::ConsecutiveLossCap(EngineKind::Main, 4)));
    }

    #[test]
    fn daily_loss_cap_blocks_trading() {
        let rm = RiskManager::new(cfg(), 100.0);
        let now = Utc::now();
        rm.record_trade(EngineKind::Main, -15.0, 15.0, now);
        let err = rm.can_trade(EngineKind::Main, now).unwrap_err();
        assert!(matches!(err, RiskError::DailyLossCapReached(EngineKind::Main, _)));
    }

    #[test]
    fn engines_are_isolated() {
        let rm = RiskManager::new(cfg(), 500.0);
        let now = Utc::now();
        for _ in 0..4 {
            rm.record_trade(EngineKind::Main, -10.0, 10.0, now);
        }
        assert!(rm.can_trade(EngineKind::FiveMinute, now).is_ok());
    }
}
