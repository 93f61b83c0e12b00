//! Oracle Engine (§4.1): consensus price computation, window-anchor
//! capture/caching, and a candle cache wrapping the blocking
//! Candlestick API client.

use crate::domain::updown::{Candle as DomainCandle, ConsensusPrice, PriceSource, WindowAnchor};
use crate::infrastructure::client::oracle::candlestick_api::{
    Candle as ApiCandle, SharedCandlestickClient,
};
use chrono::{DateTime, TimeZone, Utc};
use std::collections::HashMap;
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum OracleError {
    #[error("no price source was fresh enough to form a consensus")]
    AllSourcesStale,
    #[error("candle fetch returned fewer than {need} candles (got {got})")]
    InsufficientCandles { need: usize, got: usize },
    #[error("candlestick API request failed: {0}")]
    ApiFailure(#[from] anyhow::Error),
    #[error("candle fetch task panicked: {0}")]
    TaskJoin(#[from] tokio::task::JoinError),
}

fn median(mut values: Vec<f64>) -> f64 {
    values.sort_by(|a, b| a.partial_cmp(b).unwrap());
    let n = values.len();
    if n == 0 {
        return 0.0;
    }
    if n % 2 == 1 {
        values[n / 2]
    } else {
        (values[n / 2 - 1] + values[n / 2]) / 2.0
    }
}

/// Observation of one source at a point in time, with its age (secs).
pub struct Observation {
    pub source: PriceSource,
    pub price: f64,
    pub age_secs: f64,
}

/// Pure consensus computation over the latest observation from each
/// source (§4.1): pick the authoritative resolution oracle if fresh,
/// else the exchange-native stream if fresh, else the median of
/// whatever remains. `stale_after_secs` bounds freshness.
pub fn compute_consensus(
    observations: &[Observation],
    stale_after_secs: f64,
    divergence_pct: f64,
    now: DateTime<Utc>,
) -> Result<ConsensusPrice, OracleError> {
    let fresh: Vec<&Observation> = observations
        .iter()
        .filter(|o| o.age_secs <= stale_after_secs)
        .collect();

    if fresh.is_empty() {
        return Err(OracleError::AllSourcesStale);
    }

    let authoritative = fresh
        .iter()
        .find(|o| o.source == PriceSource::ChainLink)
        .map(|o| o.price);

    let chosen_price = if let Some(price) = authoritative {
        price
    } else if let Some(exchange_native) = fresh.iter().find(|o| o.source == PriceSource::Binance) {
        exchange_native.price
    } else {
        median(fresh.iter().map(|o| o.price).collect())
    };

    let prices: Vec<f64> = fresh.iter().map(|o| o.price).collect();
    let max = prices.iter().cloned().fold(f64::MIN, f64::max);
    let min = prices.iter().cloned().fold(f64::MAX, f64::min);
    let spread_pct = if chosen_price > 0.0 {
        (max - min) / chosen_price * 100.0
    } else {
        0.0
    };

    let mut confidence = (fresh.len() as f64 / observations.len().max(1) as f64).min(1.0);
    if spread_pct > divergence_pct {
        warn!(spread_pct, "oracle: source divergence above threshold, lowering confidence");
        confidence *= 0.5;
    }

    Ok(ConsensusPrice {
        price: chosen_price,
        sources: fresh.iter().map(|o| o.source).collect(),
        spread_pct,
        confidence,
        authoritative,
        ts: now,
    })
}

/// `floor(now_minute / window_minutes) * window_minutes`, as a UTC instant.
pub fn window_boundary(now: DateTime<Utc>, window_minutes: i64) -> DateTime<Utc> {
    let total_minutes = now.timestamp() / 60;
    let floored = (total_minutes / window_minutes) * window_minutes;
    Utc.timestamp_opt(floored * 60, 0).single().unwrap_or(now)
}

/// The next window boundary at or after `now`.
pub fn next_window_boundary(now: DateTime<Utc>, window_minutes: i64) -> DateTime<Utc> {
    let total_minutes = now.timestamp() / 60;
    let ceiled = ((total_minutes + window_minutes - 1) / window_minutes) * window_minutes;
    Utc.timestamp_opt(ceiled * 60, 0).single().unwrap_or(now)
}

/// Caches one immutable anchor per (window length, boundary) pair
/// (invariant I1) - once captured for a boundary, the anchor never changes.
#[derive(Default)]
pub struct AnchorCache {
    anchors: HashMap<(i64, DateTime<Utc>), WindowAnchor>,
}

impl AnchorCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached anchor for this boundary, capturing a new one
    /// from `price`/`source` only if none exists yet.
    pub fn get_or_capture(
        &mut self,
        window_minutes: i64,
        boundary: DateTime<Utc>,
        price: f64,
        source: PriceSource,
        now: DateTime<Utc>,
    ) -> WindowAnchor {
        *self
            .anchors
            .entry((window_minutes, boundary))
            .or_insert_with(|| WindowAnchor {
                boundary,
                open_price: price,
                source,
                captured_at: now,
            })
    }

    pub fn get(&self, window_minutes: i64, boundary: DateTime<Utc>) -> Option<WindowAnchor> {
        self.anchors.get(&(window_minutes, boundary)).copied()
    }

    /// Drop anchors older than `older_than`, bounding memory growth.
    pub fn prune_before(&mut self, older_than: DateTime<Utc>) {
        self.anchors.retain(|(_, boundary), _| *boundary >= older_than);
    }
}

fn resolution_for_window(window_minutes: i64) -> &'static str {
    match window_minutes {
        ..=5 => "1m",
        6..=15 => "5m",
        16..=60 => "15m",
        _ => "1h",
    }
}

fn to_domain_candle(c: ApiCandle) -> DomainCandle {
    DomainCandle {
        ts: Utc.timestamp_opt(c.timestamp, 0).single().unwrap_or_else(Utc::now),
        open: c.open,
        high: c.high,
        low: c.low,
        close: c.close,
        volume: 0.0,
    }
}

/// Wraps the blocking [`CandlestickApiClient`] so callers can `.await`
/// candle fetches without stalling the async runtime.
pub struct CandleCache {
    client: SharedCandlestickClient,
}

impl CandleCache {
    pub fn new(client: SharedCandlestickClient) -> Self {
        Self { client }
    }

    /// Fetch the last `min_count` candles at a resolution matching
    /// `window_minutes`, ending at `now`.
    pub async fn fetch(
        &self,
        symbol: String,
        window_minutes: i64,
        min_count: usize,
        now: DateTime<Utc>,
    ) -> Result<Vec<DomainCandle>, OracleError> {
        let resolution = resolution_for_window(window_minutes);
        let resolution_secs = match resolution {
            "1m" => 60,
            "5m" => 300,
            "15m" => 900,
            _ => 3600,
        };
        let from = now.timestamp() - resolution_secs * (min_count as i64 + 5);
        let to = now.timestamp();

        let client = self.client.clone();
        let resolution = resolution.to_string();
        let candles = tokio::task::spawn_blocking(move || {
            client.get_candles(&symbol, &resolution, from, to)
        })
        .await??;

        if candles.len() < min_count {
            return Err(OracleError::InsufficientCandles {
                need: min_count,
                got: candles.len(),
            });
        }

        Ok(candles.into_iter().map(to_domain_candle).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefers_authoritative_chainlink_when_fresh() {
        let now = Utc::now();
        let obs = vec![
            Observation { source: PriceSource::ChainLink, price: 100.0, age_secs: 2.0 },
            Observation { source: PriceSource::Binance, price: 101.0, age_secs: 2.0 },
        ];
        let consensus = compute_consensus(&obs, 30.0, 1.0, now).unwrap();
        assert_eq!(consensus.price, 100.0);
        assert_eq!(consensus.authoritative, Some(100.0));
    }

    #[test]
    fn falls_back_to_binance_when_chainlink_stale() {
        let now = Utc::now();
        let obs = vec![
            Observation { source: PriceSource::ChainLink, price: 100.0, age_secs: 60.0 },
            Observation { source: PriceSource::Binance, price: 101.0, age_secs: 2.0 },
        ];
        let consensus = compute_consensus(&obs, 30.0, 1.0, now).unwrap();
        assert_eq!(consensus.price, 101.0);
        assert_eq!(consensus.authoritative, None);
    }

    #[test]
    fn falls_back_to_median_when_no_primary_sources_fresh() {
        let now = Utc::now();
        let obs = vec![
            Observation { source: PriceSource::ChainLink, price: 100.0, age_secs: 60.0 },
            Observation { source: PriceSource::Binance, price: 101.0, age_secs: 60.0 },
            Observation { source: PriceSource::ExchangeRest, price: 99.0, age_secs: 2.0 },
            Observation { source: PriceSource::Aggregator, price: 102.0, age_secs: 2.0 },
        ];
        let consensus = compute_consensus(&obs, 30.0, 1.0, now).unwrap();
        assert_eq!(consensus.price, median(vec![99.0, 102.0]));
    }

    #[test]
    fn all_stale_errors() {
        let now = Utc::now();
        let obs = vec![Observation { source: PriceSource::ChainLink, price: 100.0, age_secs: 90.0 }];
        assert!(compute_consensus(&obs, 30.0, 1.0, now).is_err());
    }

    #[test]
    fn anchor_is_immutable_once_captured() {
        let mut cache = AnchorCache::new();
        let now = Utc::now();
        let boundary = window_boundary(now, 15);
        let first = cache.get_or_capture(15, boundary, 100.0, PriceSource::ChainLink, now);
        let second = cache.get_or_capture(15, boundary, 999.0, PriceSource::Binance, now);
        assert_eq!(first.open_price, second.open_price);
        assert_eq!(second.open_price, 100.0);
    }

    #[test]
    fn window_boundary_floors_to_multiple() {
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 10, 37, 42).unwrap();
        let boundary = window_boundary(now, 15);
        assert_eq!(boundary, Utc.with_ymd_and_hms(2026, 1, 1, 10, 30, 0).unwrap());
    }

    #[test]
    fn next_window_boundary_ceils_to_multiple() {
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 10, 37, 42).unwrap();
        let boundary = next_window_boundary(now, 15);
        assert_eq!(boundary, Utc.with_ymd_and_hms(2026, 1, 1, 10, 45, 0).unwrap());
    }
}
