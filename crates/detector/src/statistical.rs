//! Statistical Detector
//!
//! Scores each incoming value against the rolling window it joins, using
//! four classical tests:
//! - Z-score against the window mean and population std
//! - Tukey IQR fences
//! - Modified Z-score (median / MAD)
//! - Grubbs' test for a single outlier
//!
//! The four verdicts are blended into a score in [0, 1].

use log::debug;
use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF, StudentsT};
use vigil_core::stats;
use vigil_core::{EPSILON, RollingBuffer, StatisticalDetails, StatisticalDetection};

/// Values required in the window before any test runs
pub const MIN_SAMPLES: usize = 10;

/// Grubbs significance level (two-sided)
const GRUBBS_ALPHA: f64 = 0.05;

/// Scale factor making MAD consistent with the std of a normal
const MODIFIED_Z_FACTOR: f64 = 0.6745;

const Z_WEIGHT: f64 = 0.3;
const IQR_WEIGHT: f64 = 0.3;
const MODIFIED_Z_WEIGHT: f64 = 0.2;
const GRUBBS_WEIGHT: f64 = 0.2;

/// Score above which a value is reported as anomalous
const ANOMALY_SCORE: f64 = 0.5;

/// Configuration for the statistical detector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatisticalConfig {
    /// Rolling window length
    pub window_size: usize,
    /// Threshold shared by the z-score and modified z-score tests
    pub z_threshold: f64,
    /// IQR fence multiplier
    pub iqr_multiplier: f64,
}

impl Default for StatisticalConfig {
    fn default() -> Self {
        Self {
            window_size: 100,
            z_threshold: 3.0,
            iqr_multiplier: 1.5,
        }
    }
}

/// Streaming detector over a rolling window
#[derive(Debug, Clone)]
pub struct StatisticalDetector {
    config: StatisticalConfig,
    window: RollingBuffer,
}

impl StatisticalDetector {
    pub fn new(config: StatisticalConfig) -> Self {
        let window = RollingBuffer::new(config.window_size);
        Self { config, window }
    }

    pub fn config(&self) -> &StatisticalConfig {
        &self.config
    }

    /// Apply a new config, keeping the newest buffered values that still fit
    pub fn reconfigure(&mut self, config: StatisticalConfig) {
        self.window.resize(config.window_size);
        self.config = config;
    }

    /// Drop every buffered value
    pub fn reset(&mut self) {
        self.window.clear();
    }

    /// Number of buffered values
    pub fn len(&self) -> usize {
        self.window.len()
    }

    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }

    /// Buffer `value` and test it against the window including itself
    ///
    /// Non-finite values are not buffered and yield a neutral result.
    pub fn detect(&mut self, value: f64) -> StatisticalDetection {
        if !value.is_finite() {
            debug!("[STAT] Ignoring non-finite value {}", value);
            return StatisticalDetection::not_ready();
        }

        self.window.push(value);
        if self.window.len() < MIN_SAMPLES {
            return StatisticalDetection::not_ready();
        }

        let data = self.window.values();
        let z_thr = self.config.z_threshold;

        // Z-score
        let mean = stats::mean(&data);
        let std = stats::std_dev(&data);
        let z_score = (value - mean) / (std + EPSILON);
        let z_flag = z_score.abs() > z_thr;

        // IQR fences
        let q1 = stats::percentile(&data, 25.0);
        let q3 = stats::percentile(&data, 75.0);
        let iqr = q3 - q1;
        let iqr_lower = q1 - self.config.iqr_multiplier * iqr;
        let iqr_upper = q3 + self.config.iqr_multiplier * iqr;
        let iqr_flag = value < iqr_lower || value > iqr_upper;

        // Modified Z-score
        let median = stats::median(&data);
        let mad = stats::median_abs_deviation(&data);
        let modified_z = MODIFIED_Z_FACTOR * (value - median) / (mad + EPSILON);
        let modified_z_flag = modified_z.abs() > z_thr;

        // Grubbs
        let grubbs_statistic = grubbs_statistic(&data, mean, std);
        let grubbs_critical = grubbs_critical_value(data.len());
        let grubbs_flag = grubbs_critical.is_some_and(|c| grubbs_statistic > c);

        let score = blend_score(z_score, iqr_flag, modified_z, grubbs_flag, z_thr);

        let methods_triggered = [z_flag, iqr_flag, modified_z_flag, grubbs_flag]
            .iter()
            .filter(|&&f| f)
            .count() as u8;

        StatisticalDetection {
            is_anomaly: score > ANOMALY_SCORE,
            score,
            details: Some(StatisticalDetails {
                z_score,
                modified_z,
                iqr_lower,
                iqr_upper,
                grubbs_statistic,
                grubbs_critical: grubbs_critical.unwrap_or(f64::NAN),
                methods_triggered,
            }),
        }
    }
}

impl Default for StatisticalDetector {
    fn default() -> Self {
        Self::new(StatisticalConfig::default())
    }
}

/// Weighted blend of the four test verdicts, clamped to [0, 1]
///
/// The z-score enters as `min(|z| / threshold, 1)`, so it contributes at most
/// its weight. The modified z-score term is left uncapped and can saturate
/// the sum on its own; the final clamp bounds it.
fn blend_score(
    z_score: f64,
    iqr_flag: bool,
    modified_z: f64,
    grubbs_flag: bool,
    z_threshold: f64,
) -> f64 {
    let z_term = (z_score.abs() / z_threshold).min(1.0);
    let modified_z_term = modified_z.abs() / z_threshold;
    (Z_WEIGHT * z_term
        + IQR_WEIGHT * indicator(iqr_flag)
        + MODIFIED_Z_WEIGHT * modified_z_term
        + GRUBBS_WEIGHT * indicator(grubbs_flag))
    .clamp(0.0, 1.0)
}

fn indicator(flag: bool) -> f64 {
    if flag { 1.0 } else { 0.0 }
}

/// `max |x - mean| / std`, zero for a constant window
fn grubbs_statistic(data: &[f64], mean: f64, std: f64) -> f64 {
    if std <= 0.0 {
        return 0.0;
    }
    data.iter()
        .map(|x| (x - mean).abs())
        .fold(0.0, f64::max)
        / std
}

/// Two-sided Grubbs critical value for a window of `n` values
///
/// `None` when the Student-t quantile cannot be evaluated.
fn grubbs_critical_value(n: usize) -> Option<f64> {
    if n < 3 {
        return None;
    }
    let nf = n as f64;
    let dist = StudentsT::new(0.0, 1.0, nf - 2.0).ok()?;
    let t = dist.inverse_cdf(1.0 - GRUBBS_ALPHA / (2.0 * nf));
    if !t.is_finite() {
        debug!("[STAT] Student-t quantile not finite for n={}", n);
        return None;
    }
    let t2 = t * t;
    Some(((nf - 1.0) / nf.sqrt()) * (t2 / (nf - 2.0 + t2)).sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_warmup_is_neutral() {
        let mut detector = StatisticalDetector::default();
        for i in 0..9 {
            let result = detector.detect(i as f64);
            assert!(!result.is_anomaly);
            assert_eq!(result.score, 0.0);
            assert!(result.details.is_none());
        }
        assert!(detector.detect(9.0).details.is_some());
    }

    #[test]
    fn test_spike_after_flat_run_is_flagged() {
        let mut detector = StatisticalDetector::default();
        for _ in 0..20 {
            detector.detect(10.0);
        }
        let result = detector.detect(100.0);
        assert!(result.is_anomaly);
        assert!(result.score > 0.5);
        let details = result.details.unwrap();
        assert!(details.z_score > 3.0);
        assert!(details.methods_triggered >= 3);
    }

    #[test]
    fn test_constant_window_no_anomaly() {
        let mut detector = StatisticalDetector::default();
        let mut last = StatisticalDetection::not_ready();
        for _ in 0..30 {
            last = detector.detect(5.0);
        }
        assert!(!last.is_anomaly);
        assert_eq!(last.score, 0.0);
        let details = last.details.unwrap();
        assert_eq!(details.grubbs_statistic, 0.0);
        assert_eq!(details.methods_triggered, 0);
    }

    #[test]
    fn test_score_bounded() {
        let mut detector = StatisticalDetector::default();
        let values = [1.0, -50.0, 3.0, 1e6, 2.0, 0.0, -1e6, 7.0, 7.0, 7.0, 7.0, 1e9, -3.0];
        for v in values.iter().cycle().take(200) {
            let result = detector.detect(*v);
            assert!((0.0..=1.0).contains(&result.score));
        }
    }

    #[test]
    fn test_z_term_is_capped_at_its_weight() {
        assert_relative_eq!(blend_score(1.5, false, 0.0, false, 3.0), 0.15);
        assert_relative_eq!(blend_score(3.0, false, 0.0, false, 3.0), Z_WEIGHT);
        assert_relative_eq!(blend_score(-1e9, false, 0.0, false, 3.0), Z_WEIGHT);
        assert_relative_eq!(blend_score(1e9, true, 0.0, true, 3.0), 0.8);
    }

    #[test]
    fn test_uncapped_modified_z_is_clamped_by_total() {
        assert_relative_eq!(blend_score(0.0, false, 6.0, false, 3.0), 0.4);
        assert_eq!(blend_score(0.0, false, 1e9, false, 3.0), 1.0);
        assert_eq!(blend_score(1e9, true, 1e9, true, 3.0), 1.0);
    }

    #[test]
    fn test_window_is_bounded() {
        let mut detector = StatisticalDetector::new(StatisticalConfig {
            window_size: 15,
            ..Default::default()
        });
        for i in 0..40 {
            detector.detect(i as f64);
        }
        assert_eq!(detector.len(), 15);
    }

    #[test]
    fn test_reconfigure_keeps_newest() {
        let mut detector = StatisticalDetector::default();
        for i in 0..50 {
            detector.detect(i as f64);
        }
        detector.reconfigure(StatisticalConfig {
            window_size: 12,
            ..Default::default()
        });
        assert_eq!(detector.len(), 12);
        assert_eq!(detector.config().window_size, 12);

        detector.reset();
        assert!(detector.is_empty());
        assert!(detector.detect(1.0).details.is_none());
    }

    #[test]
    fn test_non_finite_not_buffered() {
        let mut detector = StatisticalDetector::default();
        let result = detector.detect(f64::NAN);
        assert!(!result.is_anomaly);
        assert!(detector.is_empty());
    }

    #[test]
    fn test_grubbs_critical_value() {
        // Tabulated two-sided critical value for n = 10 at alpha = 0.05
        let critical = grubbs_critical_value(10).unwrap();
        assert_relative_eq!(critical, 2.29, epsilon = 0.01);
    }
}
