//! ML Ensemble Detector
//!
//! Four unsupervised outlier models vote on every row of a batch:
//!
//! | Model | Idea |
//! |---|---|
//! | [`IsolationForest`] | short random-partition paths |
//! | [`RobustCovariance`] | large Mahalanobis distance from a robust fit |
//! | [`LocalOutlierFactor`] | lower density than the neighbours |
//! | [`OneClassSvm`] | outside the RBF support region |
//!
//! The ensemble score is the fraction of the four slots voting outlier. A
//! model that fails to fit or predict keeps its slot but votes inlier.

mod isolation_forest;
mod local_outlier;
mod one_class_svm;
mod robust_covariance;

pub use isolation_forest::IsolationForest;
pub use local_outlier::LocalOutlierFactor;
pub use one_class_svm::OneClassSvm;
pub use robust_covariance::RobustCovariance;

use log::{debug, info, warn};
use rand::prelude::*;
use rand::seq::index;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use vigil_core::{BatchDetection, StandardScaler, stats};
use vigil_ports::{ModelError, ModelResult, OutlierModel, Vote};

/// Samples required before the ensemble will fit
pub const MIN_FIT_SAMPLES: usize = 50;

/// Voting slots; fixed so scores stay on the quarter grid
pub const N_MODELS: usize = 4;

/// Fraction of outlier votes at which a row is labelled anomalous
const ANOMALY_SCORE: f64 = 0.5;

/// Configuration for the ML ensemble
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnsembleConfig {
    /// Expected share of outliers in the training data
    pub contamination: f64,
    /// Trees in the isolation forest
    pub n_estimators: usize,
    /// Neighbourhood size for the local outlier factor
    pub n_neighbors: usize,
    /// Seed for every randomized model
    pub seed: u64,
}

impl Default for EnsembleConfig {
    fn default() -> Self {
        Self {
            contamination: 0.1,
            n_estimators: 100,
            n_neighbors: 20,
            seed: 42,
        }
    }
}

/// Validate a batch of rows and return its feature count
pub(crate) fn check_rows(rows: &[Vec<f64>], expected: Option<usize>) -> ModelResult<usize> {
    let first = rows.first().ok_or(ModelError::InsufficientSamples {
        required: 1,
        found: 0,
    })?;
    let n_features = expected.unwrap_or(first.len());
    if n_features == 0 {
        return Err(ModelError::Degenerate("rows have no features".to_string()));
    }
    for row in rows {
        if row.len() != n_features {
            return Err(ModelError::DimensionMismatch {
                expected: n_features,
                found: row.len(),
            });
        }
        if row.iter().any(|v| !v.is_finite()) {
            return Err(ModelError::Degenerate("non-finite feature".to_string()));
        }
    }
    for feature in 0..n_features {
        let (lo, hi) = rows.iter().map(|r| r[feature]).fold(
            (f64::INFINITY, f64::NEG_INFINITY),
            |(lo, hi), v| (lo.min(v), hi.max(v)),
        );
        if !(hi - lo).is_finite() {
            return Err(ModelError::Degenerate(format!(
                "range of feature {} overflows",
                feature
            )));
        }
    }
    Ok(n_features)
}

/// At most `max_rows` rows drawn without replacement, in their original order
///
/// The batch is borrowed unchanged when it already fits.
pub(crate) fn subsample<'a>(
    rows: &'a [Vec<f64>],
    max_rows: usize,
    rng: &mut StdRng,
) -> Cow<'a, [Vec<f64>]> {
    if rows.len() <= max_rows {
        return Cow::Borrowed(rows);
    }
    let mut picked = index::sample(rng, rows.len(), max_rows).into_vec();
    picked.sort_unstable();
    Cow::Owned(picked.into_iter().map(|i| rows[i].clone()).collect())
}

/// Training score above which the `contamination` share of rows lies
pub(crate) fn contamination_threshold(scores: &[f64], contamination: f64) -> f64 {
    stats::percentile(scores, 100.0 * (1.0 - contamination.clamp(0.0, 0.5)))
}

/// How one model voted on a batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelVotes {
    pub name: String,
    /// `false` when the model was not fitted or failed on this batch
    pub available: bool,
    pub votes: Vec<Vote>,
}

/// Ensemble labels and scores with the per-model breakdown
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct EnsembleDetection {
    pub labels: Vec<bool>,
    /// Outlier vote share, one of 0, 0.25, 0.5, 0.75, 1
    pub scores: Vec<f64>,
    pub model_votes: Vec<ModelVotes>,
}

impl EnsembleDetection {
    pub fn neutral(n: usize) -> Self {
        Self {
            labels: vec![false; n],
            scores: vec![0.0; n],
            model_votes: Vec::new(),
        }
    }
}

impl From<EnsembleDetection> for BatchDetection {
    fn from(detection: EnsembleDetection) -> Self {
        BatchDetection {
            labels: detection.labels,
            scores: detection.scores,
        }
    }
}

struct Slot {
    model: Box<dyn OutlierModel>,
    fitted: bool,
}

/// Majority-vote detector over four outlier models
pub struct MlEnsembleDetector {
    config: EnsembleConfig,
    scaler: Option<StandardScaler>,
    slots: Vec<Slot>,
}

impl MlEnsembleDetector {
    pub fn new(config: EnsembleConfig) -> Self {
        let slots = Self::build_models(&config)
            .into_iter()
            .map(|model| Slot {
                model,
                fitted: false,
            })
            .collect();
        Self {
            config,
            scaler: None,
            slots,
        }
    }

    fn build_models(config: &EnsembleConfig) -> Vec<Box<dyn OutlierModel>> {
        vec![
            Box::new(IsolationForest::new(
                config.n_estimators,
                config.contamination,
                config.seed,
            )),
            Box::new(RobustCovariance::new(config.contamination, config.seed)),
            Box::new(LocalOutlierFactor::new(
                config.n_neighbors,
                config.contamination,
                config.seed,
            )),
            Box::new(OneClassSvm::new(config.contamination, config.seed)),
        ]
    }

    pub fn config(&self) -> &EnsembleConfig {
        &self.config
    }

    /// Replace the config; the detector must be fitted again
    pub fn reconfigure(&mut self, config: EnsembleConfig) {
        *self = Self::new(config);
    }

    pub fn is_fitted(&self) -> bool {
        self.scaler.is_some()
    }

    /// Names of the models that fitted successfully
    #[cfg(test)]
    fn fitted_models(&self) -> Vec<&str> {
        self.slots
            .iter()
            .filter(|s| s.fitted)
            .map(|s| s.model.name())
            .collect()
    }

    pub fn fit_series(&mut self, series: &[f64]) -> bool {
        self.fit_rows(&as_rows(series))
    }

    /// Fit the scaler and every model on feature rows
    ///
    /// Returns `false`, leaving the previous state untouched, when there are
    /// too few rows or no model could be fitted.
    pub fn fit_rows(&mut self, rows: &[Vec<f64>]) -> bool {
        if rows.len() < MIN_FIT_SAMPLES {
            debug!(
                "[ENSEMBLE] Need {} samples to fit, got {}",
                MIN_FIT_SAMPLES,
                rows.len()
            );
            return false;
        }

        let scaler = match StandardScaler::fit(rows) {
            Ok(scaler) => scaler,
            Err(e) => {
                warn!("[ENSEMBLE] Scaler fit failed: {}", e);
                return false;
            }
        };
        let scaled = match scaler.transform(rows) {
            Ok(scaled) => scaled,
            Err(e) => {
                warn!("[ENSEMBLE] Scaling failed: {}", e);
                return false;
            }
        };

        let mut slots: Vec<Slot> = Vec::with_capacity(N_MODELS);
        for mut model in Self::build_models(&self.config) {
            let fitted = match model.fit(&scaled) {
                Ok(()) => true,
                Err(e) => {
                    warn!("[ENSEMBLE] {} fit failed: {}", model.name(), e);
                    false
                }
            };
            slots.push(Slot { model, fitted });
        }

        let n_fitted = slots.iter().filter(|s| s.fitted).count();
        if n_fitted == 0 {
            warn!("[ENSEMBLE] No model could be fitted");
            return false;
        }

        info!(
            "[ENSEMBLE] Fitted {}/{} models on {} samples",
            n_fitted,
            N_MODELS,
            rows.len()
        );
        self.scaler = Some(scaler);
        self.slots = slots;
        true
    }

    pub fn detect_series(&self, series: &[f64]) -> EnsembleDetection {
        self.detect_rows(&as_rows(series))
    }

    /// Vote on every row; neutral when unfitted or on a dimension mismatch
    pub fn detect_rows(&self, rows: &[Vec<f64>]) -> EnsembleDetection {
        let n = rows.len();
        let Some(scaler) = &self.scaler else {
            return EnsembleDetection::neutral(n);
        };
        if n == 0 {
            return EnsembleDetection::default();
        }
        let scaled = match scaler.transform(rows) {
            Ok(scaled) => scaled,
            Err(e) => {
                warn!("[ENSEMBLE] Cannot score batch: {}", e);
                return EnsembleDetection::neutral(n);
            }
        };

        let model_votes: Vec<ModelVotes> = self
            .slots
            .iter()
            .map(|slot| {
                let name = slot.model.name().to_string();
                if !slot.fitted {
                    return ModelVotes {
                        name,
                        available: false,
                        votes: vec![Vote::Inlier; n],
                    };
                }
                match slot.model.predict(&scaled) {
                    Ok(votes) if votes.len() == n => ModelVotes {
                        name,
                        available: true,
                        votes,
                    },
                    Ok(votes) => {
                        warn!(
                            "[ENSEMBLE] {} returned {} votes for {} rows",
                            name,
                            votes.len(),
                            n
                        );
                        ModelVotes {
                            name,
                            available: false,
                            votes: vec![Vote::Inlier; n],
                        }
                    }
                    Err(e) => {
                        warn!("[ENSEMBLE] {} predict failed: {}", name, e);
                        ModelVotes {
                            name,
                            available: false,
                            votes: vec![Vote::Inlier; n],
                        }
                    }
                }
            })
            .collect();

        let scores: Vec<f64> = (0..n)
            .map(|i| {
                let outliers = model_votes
                    .iter()
                    .filter(|mv| mv.votes[i].is_outlier())
                    .count();
                outliers as f64 / N_MODELS as f64
            })
            .collect();
        let labels = scores.iter().map(|s| *s >= ANOMALY_SCORE).collect();

        EnsembleDetection {
            labels,
            scores,
            model_votes,
        }
    }
}

impl Default for MlEnsembleDetector {
    fn default() -> Self {
        Self::new(EnsembleConfig::default())
    }
}

fn as_rows(series: &[f64]) -> Vec<Vec<f64>> {
    series.iter().map(|v| vec![*v]).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::prelude::*;
    use rand_distr::Normal;
    use std::time::{Duration, Instant};

    fn noisy_series(n: usize, seed: u64) -> Vec<f64> {
        let mut rng = StdRng::seed_from_u64(seed);
        let normal = Normal::new(0.0, 1.0).unwrap();
        (0..n).map(|_| 50.0 + normal.sample(&mut rng)).collect()
    }

    #[test]
    fn test_too_few_samples_leaves_unfitted() {
        let mut detector = MlEnsembleDetector::default();
        assert!(!detector.fit_series(&noisy_series(49, 1)));
        assert!(!detector.is_fitted());

        let result = detector.detect_series(&[1.0, 2.0, 3.0]);
        assert_eq!(result.labels, vec![false; 3]);
        assert_eq!(result.scores, vec![0.0; 3]);
    }

    #[test]
    fn test_identical_samples_do_not_panic() {
        let mut detector = MlEnsembleDetector::default();
        let series = vec![7.0; 50];
        detector.fit_series(&series);
        let result = detector.detect_series(&series);
        assert_eq!(result.scores.len(), 50);
        assert!(result.scores.iter().all(|s| (0.0..=1.0).contains(s)));
    }

    #[test]
    fn test_overflowing_values_leave_unfitted() {
        let series: Vec<f64> = (0..60)
            .map(|i| if i % 2 == 0 { 1.7e308 } else { -1.7e308 })
            .collect();
        let mut detector = MlEnsembleDetector::default();
        assert!(!detector.fit_series(&series));
        assert!(!detector.is_fitted());

        let result = detector.detect_series(&series);
        assert_eq!(result.scores, vec![0.0; 60]);
        assert_eq!(result.labels, vec![false; 60]);
    }

    #[test]
    fn test_large_series_fits_within_bounded_time() {
        let mut series = noisy_series(20_000, 6);
        series[10_000] = 95.0;
        let mut detector = MlEnsembleDetector::default();

        let started = Instant::now();
        assert!(detector.fit_series(&series));
        assert!(started.elapsed() < Duration::from_secs(120));
        assert_eq!(detector.fitted_models().len(), N_MODELS);

        let result = detector.detect_series(&[95.0, 50.0]);
        assert!(result.labels[0]);
        assert!(!result.labels[1]);
    }

    #[test]
    fn test_subsample_keeps_order_and_borrows_small_batches() {
        let rows: Vec<Vec<f64>> = (0..10).map(|i| vec![i as f64]).collect();
        let mut rng = StdRng::seed_from_u64(1);
        assert!(matches!(subsample(&rows, 10, &mut rng), Cow::Borrowed(_)));

        let picked = subsample(&rows, 4, &mut rng);
        assert_eq!(picked.len(), 4);
        assert!(picked.windows(2).all(|w| w[0][0] < w[1][0]));
    }

    #[test]
    fn test_check_rows_rejects_overflowing_range() {
        let rows = vec![vec![1.0, 1.7e308], vec![2.0, -1.7e308]];
        assert!(matches!(
            check_rows(&rows, None),
            Err(ModelError::Degenerate(_))
        ));
        assert_eq!(check_rows(&[vec![1.0, 2.0], vec![3.0, 4.0]], None), Ok(2));
    }

    #[test]
    fn test_scores_on_quarter_grid() {
        let mut detector = MlEnsembleDetector::default();
        let mut series = noisy_series(200, 2);
        series[120] = 80.0;
        series[160] = 15.0;
        assert!(detector.fit_series(&series));

        let result = detector.detect_series(&series);
        assert_eq!(result.model_votes.len(), N_MODELS);
        for score in &result.scores {
            let quarters = score * 4.0;
            assert!((quarters - quarters.round()).abs() < 1e-12);
            assert!((0.0..=1.0).contains(score));
        }
        for (label, score) in result.labels.iter().zip(&result.scores) {
            assert_eq!(*label, *score >= 0.5);
        }
    }

    #[test]
    fn test_extreme_points_flagged() {
        let mut detector = MlEnsembleDetector::default();
        let mut series = noisy_series(300, 3);
        series[100] = 90.0;
        series[200] = 10.0;
        assert!(detector.fit_series(&series));
        assert_eq!(detector.fitted_models().len(), N_MODELS);

        let result = detector.detect_series(&[90.0, 50.0, 10.0]);
        assert!(result.labels[0]);
        assert!(result.labels[2]);
        assert!(result.scores[0] > result.scores[1]);
    }

    #[test]
    fn test_dimension_mismatch_is_neutral() {
        let mut detector = MlEnsembleDetector::default();
        assert!(detector.fit_series(&noisy_series(60, 4)));
        let result = detector.detect_rows(&[vec![1.0, 2.0]]);
        assert_eq!(result.scores, vec![0.0]);
        assert!(result.model_votes.is_empty());
    }

    #[test]
    fn test_multifeature_rows() {
        let mut rng = StdRng::seed_from_u64(5);
        let normal = Normal::new(0.0, 1.0).unwrap();
        let rows: Vec<Vec<f64>> = (0..120)
            .map(|_| vec![normal.sample(&mut rng), normal.sample(&mut rng)])
            .collect();
        let mut detector = MlEnsembleDetector::default();
        assert!(detector.fit_rows(&rows));
        let result = detector.detect_rows(&[vec![12.0, -12.0]]);
        assert!(result.labels[0]);
    }
}
