//! Signal Engine: pure scoring functions over a candle window and the
//! current consensus price, producing a [`StrategyDecision`].
//!
//! Every function here is side-effect free so it can be exercised with
//! plain fixtures - all the I/O (fetching candles, consensus prices,
//! fees) happens one layer up in [`super::oracle`] and [`super::execution`].

use crate::domain::updown::{Candle, Direction, Signal, StrategyDecision};
use crate::infrastructure::config::StrategyTuning;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SignalError {
    #[error("not enough candles: need at least {need}, have {have}")]
    InsufficientCandles { need: usize, have: usize },
}

/// `(current - anchor) / anchor * 100`
fn price_vs_open_signal(current: f64, anchor: f64, cfg: &StrategyTuning) -> Signal {
    let drift_pct = (current - anchor) / anchor * 100.0;
    let direction = if drift_pct > cfg.price_vs_open_threshold_pct {
        Direction::Up
    } else if drift_pct < -cfg.price_vs_open_threshold_pct {
        Direction::Down
    } else {
        Direction::Hold
    };
    let strength = (drift_pct.abs() / cfg.price_vs_open_scale_pct).min(1.0);
    Signal {
        name: "price_vs_open",
        direction,
        strength,
        raw: drift_pct,
        description: format!("drift {:.4}% vs window open", drift_pct),
    }
}

/// K-candle close-to-close momentum.
fn momentum_signal(candles: &[Candle], cfg: &StrategyTuning) -> Signal {
    let k = cfg.momentum_lookback.min(candles.len().saturating_sub(1)).max(1);
    let recent = candles[candles.len() - 1].close;
    let past = candles[candles.len() - 1 - k].close;
    let pct = (recent - past) / past * 100.0;
    let direction = if pct.abs() <= cfg.momentum_threshold_pct {
        Direction::Hold
    } else if pct > 0.0 {
        Direction::Up
    } else {
        Direction::Down
    };
    let strength = (pct.abs() / cfg.momentum_scale_pct).min(1.0);
    Signal {
        name: "momentum",
        direction,
        strength,
        raw: pct,
        description: format!("{}-candle close change {:.4}%", k, pct),
    }
}

/// Wilder's smoothed RSI over closing prices.
fn rsi(candles: &[Candle], period: usize) -> Option<f64> {
    if candles.len() < period + 1 {
        return None;
    }
    let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
    let deltas: Vec<f64> = closes.windows(2).map(|w| w[1] - w[0]).collect();

    let mut avg_gain: f64 = deltas[..period].iter().filter(|d| **d > 0.0).sum::<f64>() / period as f64;
    let mut avg_loss: f64 =
        deltas[..period].iter().filter(|d| **d < 0.0).map(|d| -d).sum::<f64>() / period as f64;

    for delta in &deltas[period..] {
        let gain = delta.max(0.0);
        let loss = (-delta).max(0.0);
        avg_gain = (avg_gain * (period as f64 - 1.0) + gain) / period as f64;
        avg_loss = (avg_loss * (period as f64 - 1.0) + loss) / period as f64;
    }

    if avg_loss == 0.0 {
        return Some(100.0);
    }
    let rs = avg_gain / avg_loss;
    Some(100.0 - (100.0 / (1.0 + rs)))
}

/// Mean-reverting: overbought inverts to `Down`, oversold inverts to
/// `Up`; inside the bands a weaker bias still follows the reversion,
/// not the trend (e.g. RSI 55, below the 70 ceiling, leans `Up`).
fn rsi_signal(candles: &[Candle], cfg: &StrategyTuning) -> Option<Signal> {
    let value = rsi(candles, cfg.rsi_period)?;
    const CENTER: f64 = 50.0;

    let (direction, strength) = if value > cfg.rsi_overbought {
        (Direction::Down, ((value - cfg.rsi_overbought) / 15.0).min(1.0))
    } else if value < cfg.rsi_oversold {
        (Direction::Up, ((cfg.rsi_oversold - value) / 15.0).min(1.0))
    } else if value > CENTER {
        (Direction::Up, (value - CENTER) / (cfg.rsi_overbought - CENTER) * 0.3)
    } else {
        (Direction::Down, (CENTER - value) / (CENTER - cfg.rsi_oversold) * 0.3)
    };

    Some(Signal {
        name: "rsi",
        direction,
        strength,
        raw: value,
        description: format!("RSI({}) = {:.1}", cfg.rsi_period, value),
    })
}

fn ema_series(values: &[f64], period: usize) -> Vec<f64> {
    let alpha = 2.0 / (period as f64 + 1.0);
    let mut out = Vec::with_capacity(values.len());
    let mut prev = values[0];
    out.push(prev);
    for v in &values[1..] {
        prev = alpha * v + (1.0 - alpha) * prev;
        out.push(prev);
    }
    out
}

struct MacdSeries {
    macd: Vec<f64>,
    signal: Vec<f64>,
}

fn macd_series(candles: &[Candle], cfg: &StrategyTuning) -> Option<MacdSeries> {
    if candles.len() < cfg.macd_slow + cfg.macd_signal {
        return None;
    }
    let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
    let fast = ema_series(&closes, cfg.macd_fast);
    let slow = ema_series(&closes, cfg.macd_slow);
    let macd: Vec<f64> = fast.iter().zip(slow.iter()).map(|(f, s)| f - s).collect();
    let signal = ema_series(&macd, cfg.macd_signal);
    Some(MacdSeries { macd, signal })
}

fn macd_signal(candles: &[Candle], cfg: &StrategyTuning) -> Option<Signal> {
    let series = macd_series(candles, cfg)?;
    let n = series.macd.len();
    if n < 2 {
        return None;
    }
    let histogram = series.macd[n - 1] - series.signal[n - 1];
    let prev_histogram = series.macd[n - 2] - series.signal[n - 2];

    let direction = if histogram > 0.0 {
        Direction::Up
    } else if histogram < 0.0 {
        Direction::Down
    } else {
        Direction::Hold
    };

    let fresh_flip = (histogram > 0.0) != (prev_histogram > 0.0);
    let mut strength = (histogram.abs() / series.macd[n - 1].abs().max(1e-9)).min(1.0);
    if fresh_flip {
        strength = (strength * 1.5).min(1.0);
    }

    Some(Signal {
        name: "macd",
        direction,
        strength,
        raw: histogram,
        description: format!("MACD histogram {:.6} (fresh_flip={})", histogram, fresh_flip),
    })
}

fn ema_cross_signal(candles: &[Candle], cfg: &StrategyTuning) -> Option<Signal> {
    if candles.len() < cfg.macd_slow + 2 {
        return None;
    }
    let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
    let fast = ema_series(&closes, cfg.macd_fast);
    let slow = ema_series(&closes, cfg.macd_slow);
    let n = fast.len();

    let spread_pct = (fast[n - 1] - slow[n - 1]) / slow[n - 1] * 100.0;
    let prev_spread_pct = (fast[n - 2] - slow[n - 2]) / slow[n - 2] * 100.0;

    let direction = if spread_pct > 0.0 {
        Direction::Up
    } else if spread_pct < 0.0 {
        Direction::Down
    } else {
        Direction::Hold
    };

    let fresh_cross = (spread_pct > 0.0) != (prev_spread_pct > 0.0);
    let mut strength = (spread_pct.abs() / cfg.ema_cross_threshold_pct).min(1.0);
    if fresh_cross {
        strength = (strength * 2.0).min(1.0);
    }

    Some(Signal {
        name: "ema_cross",
        direction,
        strength,
        raw: spread_pct,
        description: format!("EMA spread {:.4}% (fresh_cross={})", spread_pct, fresh_cross),
    })
}

/// Standard deviation of simple returns over the last `lookback` candles.
fn realized_volatility_pct(candles: &[Candle], lookback: usize) -> f64 {
    let n = candles.len();
    let window = lookback.min(n.saturating_sub(1));
    if window == 0 {
        return 0.0;
    }
    let returns: Vec<f64> = candles[n - window - 1..]
        .windows(2)
        .map(|w| (w[1].close - w[0].close) / w[0].close * 100.0)
        .collect();
    let mean = returns.iter().sum::<f64>() / returns.len() as f64;
    let variance = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / returns.len() as f64;
    variance.sqrt()
}

/// Returns `(direction, winner_score, total_score, up_votes, down_votes)`.
/// Vote counts only tally the four technical indicators - `price_vs_open`
/// (when present) contributes to the score but is not one of "the four
/// indicators" the chop/agreement gates count noses on.
fn weighted_score(signals: &[Signal], weights: &[(&str, f64)]) -> (Direction, f64, f64, usize, usize) {
    let mut up_score = 0.0;
    let mut down_score = 0.0;
    let mut up_votes = 0;
    let mut down_votes = 0;

    for signal in signals {
        let weight = weights
            .iter()
            .find(|(name, _)| *name == signal.name)
            .map(|(_, w)| *w)
            .unwrap_or(0.0);
        let contribution = weight * signal.strength;
        match signal.direction {
            Direction::Up => {
                up_score += contribution;
                if signal.name != "price_vs_open" {
                    up_votes += 1;
                }
            }
            Direction::Down => {
                down_score += contribution;
                if signal.name != "price_vs_open" {
                    down_votes += 1;
                }
            }
            Direction::Hold => {}
        }
    }

    let total = up_score + down_score;
    if total <= 0.0 {
        return (Direction::Hold, 0.0, total, up_votes, down_votes);
    }
    if up_score >= down_score {
        (Direction::Up, up_score, total, up_votes, down_votes)
    } else {
        (Direction::Down, down_score, total, up_votes, down_votes)
    }
}

/// Full gated decision for the main (15m/1h) engine. `anchor` is the
/// window-open price, if already captured; `fee_pct` is the taker fee
/// for the side being considered, when known.
pub fn decide(
    candles: &[Candle],
    current_price: f64,
    anchor: Option<f64>,
    fee_pct: Option<f64>,
    cfg: &StrategyTuning,
) -> Result<StrategyDecision, SignalError> {
    let min_needed = cfg.macd_slow + cfg.macd_signal + 1;
    if candles.len() < min_needed {
        return Err(SignalError::InsufficientCandles {
            need: min_needed,
            have: candles.len(),
        });
    }

    let volatility = realized_volatility_pct(candles, cfg.volatility_lookback);
    let drift_pct = anchor
        .map(|a| (current_price - a) / a * 100.0)
        .unwrap_or(0.0);

    // Gate 1: volatility
    if volatility < cfg.min_volatility_pct || volatility > cfg.max_volatility_pct {
        let mut d = StrategyDecision::hold(current_price, anchor, "volatility_out_of_band");
        d.volatility_pct = volatility;
        d.drift_pct = drift_pct;
        return Ok(d);
    }

    let mut signals = vec![momentum_signal(candles, cfg)];
    if let Some(s) = rsi_signal(candles, cfg) {
        signals.push(s);
    }
    if let Some(s) = macd_signal(candles, cfg) {
        signals.push(s);
    }
    if let Some(s) = ema_cross_signal(candles, cfg) {
        signals.push(s);
    }

    let weights: Vec<(&str, f64)> = if let Some(anchor_price) = anchor {
        signals.insert(0, price_vs_open_signal(current_price, anchor_price, cfg));
        let secondary_total =
            cfg.weight_momentum + cfg.weight_rsi + cfg.weight_macd + cfg.weight_ema_cross;
        let scale = if secondary_total > 0.0 {
            0.30 / secondary_total
        } else {
            0.0
        };
        vec![
            ("price_vs_open", 0.70),
            ("momentum", cfg.weight_momentum * scale),
            ("rsi", cfg.weight_rsi * scale),
            ("macd", cfg.weight_macd * scale),
            ("ema_cross", cfg.weight_ema_cross * scale),
        ]
    } else {
        vec![
            ("momentum", cfg.weight_momentum),
            ("rsi", cfg.weight_rsi),
            ("macd", cfg.weight_macd),
            ("ema_cross", cfg.weight_ema_cross),
        ]
    };

    // Gate 2: chop filter (only meaningful with an anchor in play). Counts
    // only the four technical indicators, not price_vs_open itself.
    if let Some(_anchor_price) = anchor {
        let indicators = signals.iter().filter(|s| s.name != "price_vs_open");
        let up_votes = indicators.clone().filter(|s| s.direction == Direction::Up).count();
        let down_votes = indicators.filter(|s| s.direction == Direction::Down).count();
        if up_votes == 2 && down_votes == 2 && drift_pct.abs() < cfg.chop_drift_pct {
            let mut d = StrategyDecision::hold(current_price, anchor, "chop_filter");
            d.volatility_pct = volatility;
            d.drift_pct = drift_pct;
            d.signals = signals;
            return Ok(d);
        }
    }

    // Gate 3: weighted scoring. confidence = winner_score / total_score,
    // scaled down when the total score itself is thin (total < 0.5).
    let (direction, winner_score, total_score, up_votes, down_votes) = weighted_score(&signals, &weights);
    if direction == Direction::Hold {
        let mut d = StrategyDecision::hold(current_price, anchor, "no_weighted_majority");
        d.volatility_pct = volatility;
        d.drift_pct = drift_pct;
        d.signals = signals;
        return Ok(d);
    }
    let raw_confidence = winner_score / total_score.max(1e-9);
    let scaled = raw_confidence * (total_score / 0.5).min(1.0);
    let confidence = scaled.min(0.92);

    // Gate 4: agreement filter
    if anchor.is_some() {
        let opposing = match direction {
            Direction::Up => down_votes,
            Direction::Down => up_votes,
            Direction::Hold => 0,
        };
        if opposing >= 3 {
            let mut d = StrategyDecision::hold(current_price, anchor, "agreement_filter_3");
            d.volatility_pct = volatility;
            d.drift_pct = drift_pct;
            d.signals = signals;
            return Ok(d);
        }
        if opposing >= 2 && drift_pct.abs() < 0.10 {
            let mut d =
                StrategyDecision::hold(current_price, anchor, "agreement_filter_2_weak_drift");
            d.volatility_pct = volatility;
            d.drift_pct = drift_pct;
            d.signals = signals;
            return Ok(d);
        }
    }

    // Gate 5: fee-adjusted edge
    let raw_edge_pct = (confidence - 0.5).abs() * 200.0;
    if let Some(fee) = fee_pct {
        if raw_edge_pct < fee {
            let mut d = StrategyDecision::hold(current_price, anchor, "edge_below_fee");
            d.volatility_pct = volatility;
            d.drift_pct = drift_pct;
            d.signals = signals;
            return Ok(d);
        }
    }

    Ok(StrategyDecision {
        direction,
        confidence,
        signals,
        price: current_price,
        anchor,
        drift_pct,
        volatility_pct: volatility,
        should_trade: confidence >= cfg.confidence_threshold,
        reason: "weighted_signal".to_string(),
        position_size_pct: 0.0,
    })
}

/// Pure-drift decision used once a window is close enough to expiry
/// that indicator lag would otherwise dominate (§4.2 late-window variant).
pub fn decide_late_window(
    current_price: f64,
    anchor: f64,
    time_remaining_secs: u64,
    min_drift_pct: f64,
    drift_scale_pct: f64,
    base_confidence: f64,
    max_confidence: f64,
) -> StrategyDecision {
    let drift_pct = (current_price - anchor) / anchor * 100.0;
    if drift_pct.abs() < min_drift_pct {
        let mut d = StrategyDecision::hold(current_price, Some(anchor), "late_window_flat");
        d.drift_pct = drift_pct;
        return d;
    }

    let direction = if drift_pct > 0.0 { Direction::Up } else { Direction::Down };
    let t = ((drift_pct.abs() - min_drift_pct) / (drift_scale_pct - min_drift_pct).max(1e-9))
        .clamp(0.0, 1.0);
    let mut confidence = base_confidence + t * (max_confidence - base_confidence);
    if time_remaining_secs < 60 {
        confidence += 0.02;
    }
    let confidence = confidence.min(0.92);

    StrategyDecision {
        direction,
        confidence,
        signals: vec![],
        price: current_price,
        anchor: Some(anchor),
        drift_pct,
        volatility_pct: 0.0,
        should_trade: true,
        reason: "late_window_drift".to_string(),
        position_size_pct: 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flat_candles(n: usize, price: f64) -> Vec<Candle> {
        (0..n)
            .map(|i| Candle {
                ts: utc_ts(i as i64 * 60),
                open: price,
                high: price,
                low: price,
                close: price,
                volume: 0.0,
            })
            .collect()
    }

    fn trending_candles(n: usize, start: f64, step_pct: f64) -> Vec<Candle> {
        let mut price = start;
        (0..n)
            .map(|i| {
                let open = price;
                price *= 1.0 + step_pct / 100.0;
                Candle {
                    ts: utc_ts(i as i64 * 60),
                    open,
                    high: price.max(open),
                    low: price.min(open),
                    close: price,
                    volume: 0.0,
                }
            })
            .collect()
    }

    fn utc_ts(secs: i64) -> chrono::DateTime<chrono::Utc> {
        chrono::DateTime::from_timestamp(secs, 0).unwrap()
    }

    #[test]
    fn insufficient_candles_errors() {
        let cfg = StrategyTuning::default();
        let candles = flat_candles(5, 100.0);
        assert!(decide(&candles, 100.0, None, None, &cfg).is_err());
    }

    #[test]
    fn flat_market_holds_on_volatility_gate() {
        let cfg = StrategyTuning::default();
        let candles = flat_candles(60, 100.0);
        let decision = decide(&candles, 100.0, None, None, &cfg).unwrap();
        assert_eq!(decision.direction, Direction::Hold);
        assert!(!decision.should_trade);
    }

    #[test]
    fn strong_uptrend_produces_up_decision() {
        let cfg = StrategyTuning::default();
        let candles = trending_candles(60, 100.0, 0.15);
        let last_close = candles.last().unwrap().close;
        let decision = decide(&candles, last_close, Some(100.0), None, &cfg).unwrap();
        assert_eq!(decision.direction, Direction::Up);
        assert!(decision.confidence <= 0.92);
    }

    #[test]
    fn confidence_never_exceeds_cap() {
        let cfg = StrategyTuning::default();
        let candles = trending_candles(80, 100.0, 0.4);
        let last_close = candles.last().unwrap().close;
        let decision = decide(&candles, last_close, Some(100.0), None, &cfg).unwrap();
        assert!(decision.confidence <= 0.92);
    }

    #[test]
    fn late_window_holds_below_min_drift() {
        let d = decide_late_window(100.01, 100.0, 45, 0.03, 0.20, 0.55, 0.85);
        assert_eq!(d.direction, Direction::Hold);
    }

    #[test]
    fn late_window_scales_confidence_with_drift() {
        let small = decide_late_window(100.05, 100.0, 45, 0.03, 0.20, 0.55, 0.85);
        let large = decide_late_window(100.25, 100.0, 45, 0.03, 0.20, 0.55, 0.85);
        assert!(large.confidence >= small.confidence);
        assert!(large.confidence <= 0.92);
    }

    #[test]
    fn late_window_time_bonus_applies_under_60s() {
        let far = decide_late_window(100.10, 100.0, 90, 0.03, 0.20, 0.55, 0.85);
        let near = decide_late_window(100.10, 100.0, 45, 0.03, 0.20, 0.55, 0.85);
        assert!(near.confidence >= far.confidence);
    }
}
