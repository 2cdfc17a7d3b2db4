//! Market features derived from a level series
//!
//! Treats the monitored values as prices and derives returns, rolling
//! volatility, momentum and a heuristic regime label per point. The
//! heuristic labels feed the report's regime distribution; the regime
//! classifier is fitted on `prices`.

use std::collections::BTreeMap;
use vigil_core::{Observation, RegimeLabel, Timestamp, stats};

/// Returns per rolling volatility window and momentum lookback
pub const LOOKBACK: usize = 20;

/// Points required before heuristic labels are assigned
const MIN_LABEL_POINTS: usize = 10;

/// Volatility used when the returns carry no spread at all
const FALLBACK_VOLATILITY: f64 = 0.01;

const BULLISH: usize = 0;
const BEARISH: usize = 1;
const CONSOLIDATION: usize = 2;
const HIGH_VOLATILITY: usize = 3;

#[derive(Debug, Clone, PartialEq)]
pub struct MarketFrame {
    pub timestamps: Vec<Timestamp>,
    pub prices: Vec<f64>,
    /// Simple returns, 0 for the first point
    pub returns: Vec<f64>,
    /// Sample std of the trailing 20 returns
    pub volatility: Vec<f64>,
    /// `p_t / p_{t-20} - 1`, 0 before 20 points of history
    pub momentum: Vec<f64>,
    /// Heuristic regime id per point
    pub regimes: Vec<usize>,
}

impl MarketFrame {
    pub fn from_observations(observations: &[Observation]) -> Self {
        let timestamps = observations.iter().map(|o| o.timestamp).collect();
        let prices: Vec<f64> = observations.iter().map(|o| o.value).collect();

        let mut returns = vec![0.0; prices.len()];
        for i in 1..prices.len() {
            let r = (prices[i] - prices[i - 1]) / prices[i - 1];
            returns[i] = if r.is_finite() { r } else { 0.0 };
        }

        let overall = stats::std_dev(&returns);
        let fallback = if overall.is_finite() && overall > 0.0 {
            overall
        } else {
            FALLBACK_VOLATILITY
        };
        let volatility: Vec<f64> = (0..returns.len())
            .map(|i| {
                if i + 1 < LOOKBACK {
                    return fallback;
                }
                let v = sample_std(&returns[i + 1 - LOOKBACK..=i]);
                if v.is_finite() && v > 0.0 { v } else { fallback }
            })
            .collect();

        let momentum = (0..prices.len())
            .map(|i| {
                if i < LOOKBACK {
                    return 0.0;
                }
                let m = prices[i] / prices[i - LOOKBACK] - 1.0;
                if m.is_finite() { m } else { 0.0 }
            })
            .collect();

        let regimes = heuristic_regimes(&returns, &volatility);

        Self {
            timestamps,
            prices,
            returns,
            volatility,
            momentum,
            regimes,
        }
    }

    pub fn len(&self) -> usize {
        self.prices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prices.is_empty()
    }

    /// Points per heuristic regime label
    pub fn regime_distribution(&self) -> BTreeMap<RegimeLabel, usize> {
        let mut counts = BTreeMap::new();
        for id in &self.regimes {
            *counts.entry(RegimeLabel::from_id(*id)).or_insert(0) += 1;
        }
        counts
    }

    /// Label changes within the last `lookback` steps, newest first
    pub fn recent_transitions(
        &self,
        lookback: usize,
        limit: usize,
    ) -> Vec<(RegimeLabel, RegimeLabel)> {
        let n = self.regimes.len();
        (1..lookback.min(n))
            .filter_map(|i| {
                let to = self.regimes[n - i];
                let from = self.regimes[n - i - 1];
                (from != to).then(|| (RegimeLabel::from_id(from), RegimeLabel::from_id(to)))
            })
            .take(limit)
            .collect()
    }
}

fn sample_std(values: &[f64]) -> f64 {
    let n = values.len();
    if n < 2 {
        return 0.0;
    }
    (stats::variance(values) * n as f64 / (n - 1) as f64).sqrt()
}

/// Label points by return and volatility quantiles
///
/// Volatility at or above its 75th percentile is High Volatility; otherwise
/// a return at or above the 65th percentile is Bullish, and one at or below
/// the 35th percentile with volatility at or above the 25th percentile is
/// Bearish. Everything else is Consolidation.
fn heuristic_regimes(returns: &[f64], volatility: &[f64]) -> Vec<usize> {
    if returns.len() < MIN_LABEL_POINTS {
        return vec![BULLISH; returns.len()];
    }
    let ret_high = stats::percentile(returns, 65.0);
    let ret_low = stats::percentile(returns, 35.0);
    let vol_high = stats::percentile(volatility, 75.0);
    let vol_low = stats::percentile(volatility, 25.0);

    returns
        .iter()
        .zip(volatility)
        .map(|(&r, &v)| {
            if v >= vol_high {
                HIGH_VOLATILITY
            } else if r >= ret_high {
                BULLISH
            } else if r <= ret_low && v >= vol_low {
                BEARISH
            } else {
                CONSOLIDATION
            }
        })
        .collect()
}
