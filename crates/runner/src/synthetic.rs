//! Synthetic streams
//!
//! Two generators for exercising the pipeline without live data:
//!
//! - [`generate_stream`]: trending seasonal signal with injected anomalies
//! - [`generate_regime_prices`]: price path that switches among the four
//!   market regimes

use chrono::{Duration, Utc};
use rand::prelude::*;
use rand::seq::index;
use rand_distr::{StandardNormal, Uniform};
use serde::{Deserialize, Serialize};
use vigil_core::{Observation, Timestamp};

/// Weight of the previous point in the autocorrelation pass
const CARRY: f64 = 0.3;

/// Regime switches in a generated price path
const REGIME_CHANGES: usize = 5;

/// (drift, volatility) per step for regime ids 0 to 3
const REGIME_DYNAMICS: [(f64, f64); 4] = [
    (0.0005, 0.01),  // bullish
    (-0.0003, 0.015), // bearish
    (0.0001, 0.005), // consolidation
    (0.0, 0.03),     // high volatility
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyntheticConfig {
    pub n_points: usize,
    pub with_anomalies: bool,
    /// Share of points that start an injected anomaly
    pub anomaly_rate: f64,
    /// Timestamp of the last point; now when absent
    pub end_time: Option<Timestamp>,
    /// Entropy when absent
    pub seed: Option<u64>,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            n_points: 500,
            with_anomalies: true,
            anomaly_rate: 0.05,
            end_time: None,
            seed: None,
        }
    }
}

/// Kind of injected anomaly
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InjectedAnomaly {
    /// Single point raised by 8 to 15
    Spike,
    /// Single point lowered by 8 to 15
    Dip,
    /// Next 10 points raised by 3 to 6
    Shift,
    /// Next 15 points scaled by 1.5 to 2.5
    Variance,
}

impl InjectedAnomaly {
    const ALL: [InjectedAnomaly; 4] = [
        InjectedAnomaly::Spike,
        InjectedAnomaly::Dip,
        InjectedAnomaly::Shift,
        InjectedAnomaly::Variance,
    ];
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyntheticStream {
    pub observations: Vec<Observation>,
    /// True where an anomaly was injected (first point of ranged kinds)
    pub injected: Vec<bool>,
}

impl SyntheticStream {
    pub fn values(&self) -> Vec<f64> {
        self.observations.iter().map(|o| o.value).collect()
    }

    pub fn injected_count(&self) -> usize {
        self.injected.iter().filter(|x| **x).count()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegimePrices {
    pub prices: Vec<f64>,
    /// True regime id of every price
    pub regimes: Vec<usize>,
}

fn rng_from(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    }
}

/// `n` evenly spaced points from `start` to `end` inclusive
fn linspace(start: f64, end: f64, n: usize) -> impl Iterator<Item = f64> {
    let step = if n > 1 {
        (end - start) / (n - 1) as f64
    } else {
        0.0
    };
    (0..n).map(move |i| start + step * i as f64)
}

/// One-minute timestamps ending at `end`
fn minute_timestamps(n: usize, end: Timestamp) -> impl Iterator<Item = Timestamp> {
    (0..n).map(move |i| end - Duration::minutes((n - 1 - i) as i64))
}

/// Trending seasonal series with optional injected anomalies
pub fn generate_stream(config: &SyntheticConfig) -> SyntheticStream {
    let n = config.n_points;
    let mut rng = rng_from(config.seed);

    let mut data: Vec<f64> = linspace(0.0, 10.0, n)
        .map(|t| {
            let trend = 100.0 + 0.5 * t;
            let season = 5.0 * (2.0 * std::f64::consts::PI * t / 2.0).sin();
            let noise: f64 = rng.sample(StandardNormal);
            trend + season + noise
        })
        .collect();
    for i in 1..n {
        data[i] = CARRY * data[i - 1] + (1.0 - CARRY) * data[i];
    }

    let mut injected = vec![false; n];
    if config.with_anomalies && n > 0 {
        let count = ((n as f64 * config.anomaly_rate.clamp(0.0, 1.0)) as usize).min(n);
        for idx in index::sample(&mut rng, n, count).into_vec() {
            let kind = InjectedAnomaly::ALL[rng.gen_range(0..InjectedAnomaly::ALL.len())];
            inject(&mut data, idx, kind, &mut rng);
            injected[idx] = true;
        }
    }

    let end = config.end_time.unwrap_or_else(Utc::now);
    let observations = minute_timestamps(n, end)
        .zip(data)
        .map(|(timestamp, value)| Observation::new(timestamp, value))
        .collect();

    SyntheticStream {
        observations,
        injected,
    }
}

fn inject(data: &mut [f64], idx: usize, kind: InjectedAnomaly, rng: &mut StdRng) {
    let n = data.len();
    match kind {
        InjectedAnomaly::Spike => data[idx] += rng.sample(Uniform::new(8.0, 15.0)),
        InjectedAnomaly::Dip => data[idx] -= rng.sample(Uniform::new(8.0, 15.0)),
        InjectedAnomaly::Shift => {
            let offset = rng.sample(Uniform::new(3.0, 6.0));
            let end = (idx + 10).min(n);
            data[idx..end].iter_mut().for_each(|x| *x += offset);
        }
        InjectedAnomaly::Variance => {
            let factor = rng.sample(Uniform::new(1.5, 2.5));
            let end = (idx + 15).min(n);
            data[idx..end].iter_mut().for_each(|x| *x *= factor);
        }
    }
}

/// Price path starting at 100 that switches regime at five random points
///
/// Regime ids cycle 0, 1, 2, 3, 0, 1 across the change points.
pub fn generate_regime_prices(n_points: usize, seed: Option<u64>) -> RegimePrices {
    let mut rng = rng_from(seed);
    let mut regimes = vec![0usize; n_points];

    let mut change_points =
        index::sample(&mut rng, n_points, REGIME_CHANGES.min(n_points)).into_vec();
    change_points.sort_unstable();
    for (i, cp) in change_points.into_iter().enumerate() {
        let id = (i + 1) % REGIME_DYNAMICS.len();
        regimes[cp..].iter_mut().for_each(|r| *r = id);
    }

    let mut prices = Vec::with_capacity(n_points);
    if n_points > 0 {
        prices.push(100.0);
    }
    for &regime in regimes.iter().skip(1) {
        let (drift, vol) = REGIME_DYNAMICS[regime];
        let shock: f64 = rng.sample(StandardNormal);
        let last = prices[prices.len() - 1];
        prices.push(last * (1.0 + drift + vol * shock));
    }

    RegimePrices { prices, regimes }
}
