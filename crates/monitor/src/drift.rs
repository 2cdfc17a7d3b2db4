//! Drift Monitor
//!
//! Compares the tail of the live stream against a frozen reference sample
//! with five measures and blends them into one score:
//!
//! | Measure | Weight | Saturates at |
//! |---|---|---|
//! | KS statistic | 0.25 | 1 |
//! | PSI | 0.25 | 0.25 |
//! | Jensen-Shannon divergence | 0.20 | 1 |
//! | mean shift (in reference stds) | 0.15 | 3 |
//! | log variance ratio | 0.15 | 2 |

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use vigil_clock::SystemClock;
use vigil_core::stats::{self, histogram_counts, histogram_edges};
use vigil_core::{
    DriftAssessment, DriftDetails, DriftRecord, EPSILON, ReferenceDistribution, RingBuffer,
};
use vigil_ports::Clock;

/// Points required in the current window
pub const MIN_CURRENT_SAMPLES: usize = 10;

/// Floor for empty histogram buckets
const BUCKET_FLOOR: f64 = 1e-10;

/// Floor for the variance ratio so constant windows stay finite
const VARIANCE_RATIO_FLOOR: f64 = 1e-12;

/// Configuration for drift monitoring
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriftConfig {
    /// Points kept from the data passed to `set_reference`
    pub reference_window: usize,
    /// Tail of the current data that is compared
    pub detection_window: usize,
    /// Score above which drift is reported
    pub drift_threshold: f64,
    /// Drift records retained
    pub history_capacity: usize,
    /// Histogram buckets for PSI and JS divergence
    pub buckets: usize,
}

impl Default for DriftConfig {
    fn default() -> Self {
        Self {
            reference_window: 500,
            detection_window: 50,
            drift_threshold: 0.1,
            history_capacity: 1000,
            buckets: 10,
        }
    }
}

/// Reference-versus-current distribution monitor
pub struct DriftMonitor {
    config: DriftConfig,
    clock: Arc<dyn Clock>,
    reference: Option<ReferenceDistribution>,
    history: RingBuffer<DriftRecord>,
}

impl DriftMonitor {
    pub fn new(config: DriftConfig, clock: Arc<dyn Clock>) -> Self {
        let history = RingBuffer::new(config.history_capacity);
        Self {
            config,
            clock,
            reference: None,
            history,
        }
    }

    pub fn config(&self) -> &DriftConfig {
        &self.config
    }

    /// Apply a new config; the reference is kept, history is trimmed to fit
    pub fn reconfigure(&mut self, config: DriftConfig) {
        self.history.set_capacity(config.history_capacity);
        self.config = config;
    }

    pub fn reference(&self) -> Option<&ReferenceDistribution> {
        self.reference.as_ref()
    }

    /// Drift records, oldest first
    pub fn history(&self) -> &RingBuffer<DriftRecord> {
        &self.history
    }

    /// Freeze the last `reference_window` points as the reference
    pub fn set_reference(&mut self, data: &[f64]) -> bool {
        let start = data.len().saturating_sub(self.config.reference_window);
        match ReferenceDistribution::from_sample(data[start..].to_vec()) {
            Ok(reference) => {
                info!(
                    "[DRIFT] Reference set: {} points, mean {:.4}, std {:.4}",
                    reference.len(),
                    reference.mean,
                    reference.std
                );
                self.reference = Some(reference);
                true
            }
            Err(e) => {
                warn!("[DRIFT] Reference rejected: {}", e);
                false
            }
        }
    }

    /// Compare the tail of `current` with the reference
    ///
    /// Not ready (no reference, or fewer than 10 points) gives a neutral
    /// assessment and leaves the history untouched.
    pub fn detect_drift(&mut self, current: &[f64]) -> DriftAssessment {
        let Some(reference) = &self.reference else {
            return DriftAssessment::not_ready();
        };
        if current.len() < MIN_CURRENT_SAMPLES {
            return DriftAssessment::not_ready();
        }

        let start = current.len().saturating_sub(self.config.detection_window);
        let window = &current[start..];
        let buckets = self.config.buckets;

        let (ks_statistic, ks_pvalue) = ks_two_sample(reference.sample(), window);
        let psi = finite_or_zero(population_stability_index(
            reference.sample(),
            window,
            buckets,
        ));
        let js_divergence = finite_or_zero(jensen_shannon(reference.sample(), window, buckets));

        let current_mean = stats::mean(window);
        let mean_shift =
            finite_or_zero((current_mean - reference.mean).abs() / (reference.std + EPSILON));

        let var_ratio = (stats::variance(window) / (reference.variance() + EPSILON))
            .max(VARIANCE_RATIO_FLOOR);
        let variance_drift = finite_or_zero(var_ratio.ln().abs());

        let score = (0.25 * ks_statistic
            + 0.25 * (psi / 0.25).min(1.0)
            + 0.20 * js_divergence.min(1.0)
            + 0.15 * (mean_shift / 3.0).min(1.0)
            + 0.15 * (variance_drift / 2.0).min(1.0))
        .clamp(0.0, 1.0);
        let detected = score > self.config.drift_threshold;

        debug!(
            "[DRIFT] score {:.4} (ks {:.3}, psi {:.3}, js {:.3}, shift {:.3}, var {:.3})",
            score, ks_statistic, psi, js_divergence, mean_shift, variance_drift
        );

        self.history.push(DriftRecord {
            timestamp: self.clock.now(),
            score,
            detected,
        });

        DriftAssessment {
            detected,
            score,
            details: Some(DriftDetails {
                ks_statistic,
                ks_pvalue,
                psi,
                js_divergence,
                mean_shift,
                variance_drift,
                current_mean,
                reference_mean: reference.mean,
            }),
        }
    }
}

impl Default for DriftMonitor {
    fn default() -> Self {
        Self::new(DriftConfig::default(), Arc::new(SystemClock::new()))
    }
}

fn finite_or_zero(x: f64) -> f64 {
    if x.is_finite() { x } else { 0.0 }
}

/// Two-sample Kolmogorov-Smirnov statistic and asymptotic p-value
pub fn ks_two_sample(a: &[f64], b: &[f64]) -> (f64, f64) {
    if a.is_empty() || b.is_empty() {
        return (0.0, 1.0);
    }
    let mut a = a.to_vec();
    let mut b = b.to_vec();
    a.sort_by(|x, y| x.total_cmp(y));
    b.sort_by(|x, y| x.total_cmp(y));
    let (n, m) = (a.len(), b.len());

    let (mut i, mut j) = (0usize, 0usize);
    let mut d: f64 = 0.0;
    while i < n && j < m {
        let v = a[i].min(b[j]);
        while i < n && a[i] <= v {
            i += 1;
        }
        while j < m && b[j] <= v {
            j += 1;
        }
        d = d.max((i as f64 / n as f64 - j as f64 / m as f64).abs());
    }

    let (nf, mf) = (n as f64, m as f64);
    let en = (nf * mf / (nf + mf)).sqrt();
    let p = kolmogorov_survival(en * d);
    (finite_or_zero(d), if p.is_finite() { p } else { 1.0 })
}

/// `P(K > x)` for the limiting Kolmogorov distribution
pub fn kolmogorov_survival(x: f64) -> f64 {
    if x <= 0.2 {
        return 1.0;
    }
    let mut sum = 0.0;
    for k in 1..=100 {
        let kf = k as f64;
        let term = (-2.0 * kf * kf * x * x).exp();
        sum += if k % 2 == 1 { term } else { -term };
        if term < 1e-16 {
            break;
        }
    }
    (2.0 * sum).clamp(0.0, 1.0)
}

/// Share of each bucket, floored so empty buckets stay in the log domain
fn bucket_shares(sample: &[f64], edges: &[f64]) -> Vec<f64> {
    let n = sample.len().max(1) as f64;
    histogram_counts(sample, edges)
        .into_iter()
        .map(|c| {
            let share = c as f64 / n;
            if share == 0.0 { BUCKET_FLOOR } else { share }
        })
        .collect()
}

/// Population stability index over buckets cut on the reference range
///
/// Current values outside the reference range are not counted.
pub fn population_stability_index(reference: &[f64], current: &[f64], buckets: usize) -> f64 {
    let Some(edges) = histogram_edges(reference, buckets) else {
        return 0.0;
    };
    let ref_shares = bucket_shares(reference, &edges);
    let cur_shares = bucket_shares(current, &edges);
    ref_shares
        .iter()
        .zip(&cur_shares)
        .map(|(r, c)| (c - r) * (c / r).ln())
        .sum::<f64>()
        .abs()
}

/// Jensen-Shannon divergence (natural log) of two samples over shared buckets
pub fn jensen_shannon(p: &[f64], q: &[f64], buckets: usize) -> f64 {
    let pooled: Vec<f64> = p.iter().chain(q).copied().collect();
    let Some(edges) = histogram_edges(&pooled, buckets) else {
        return 0.0;
    };
    let width = edges[1] - edges[0];
    let density = |sample: &[f64]| -> Vec<f64> {
        let counts = histogram_counts(sample, &edges);
        let total = counts.iter().sum::<usize>().max(1) as f64;
        counts
            .into_iter()
            .map(|c| c as f64 / (total * width) + BUCKET_FLOOR)
            .collect()
    };
    let p_density = density(p);
    let q_density = density(q);
    let m: Vec<f64> = p_density
        .iter()
        .zip(&q_density)
        .map(|(a, b)| 0.5 * (a + b))
        .collect();
    0.5 * kl_divergence(&p_density, &m) + 0.5 * kl_divergence(&q_density, &m)
}

/// `KL(p || q)` after normalizing both to sum to one
fn kl_divergence(p: &[f64], q: &[f64]) -> f64 {
    let p_total: f64 = p.iter().sum();
    let q_total: f64 = q.iter().sum();
    if p_total <= 0.0 || q_total <= 0.0 {
        return 0.0;
    }
    p.iter()
        .zip(q)
        .map(|(a, b)| {
            let pa = a / p_total;
            let qb = b / q_total;
            if pa > 0.0 { pa * (pa / qb).ln() } else { 0.0 }
        })
        .sum()
}
