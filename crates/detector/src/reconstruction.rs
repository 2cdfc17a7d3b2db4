//! Reconstruction Detector
//!
//! Flags points whose reconstruction residual exceeds a percentile of the
//! residuals seen during calibration. The residual model is pluggable via
//! [`ResidualModel`]; the bundled [`JumpResidualModel`] is a stand-in for a
//! trained autoencoder.

use log::{info, warn};
use rand::prelude::*;
use rand_distr::{Exp, Uniform};
use serde::{Deserialize, Serialize};
use vigil_core::{BatchDetection, EPSILON, stats};
use vigil_ports::{BatchDetector, ModelError, ModelResult, ResidualModel};

/// Upper bound of the normalized residual score
pub const MAX_SCORE: f64 = 2.0;

/// Normalized residual above which a point is anomalous
const ANOMALY_SCORE: f64 = 1.0;

/// Rate of the exponential calibration residuals (mean 0.1)
const CALIBRATION_RATE: f64 = 10.0;

/// Placeholder residual model
///
/// Calibration residuals are exponential draws with mean 0.1; scoring
/// residuals are absolute first differences (0 for the first point) jittered
/// by a uniform factor in [0.5, 1.5). Seed it for reproducible output. Not a
/// production model.
#[derive(Debug, Clone)]
pub struct JumpResidualModel {
    rng: StdRng,
}

impl JumpResidualModel {
    pub fn from_entropy() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl Default for JumpResidualModel {
    fn default() -> Self {
        Self::from_entropy()
    }
}

impl ResidualModel for JumpResidualModel {
    fn fit(&mut self, samples: &[f64]) -> ModelResult<Vec<f64>> {
        if samples.is_empty() {
            return Err(ModelError::InsufficientSamples {
                required: 1,
                found: 0,
            });
        }
        let exp = Exp::new(CALIBRATION_RATE).map_err(|e| ModelError::Degenerate(e.to_string()))?;
        Ok((0..samples.len())
            .map(|_| exp.sample(&mut self.rng))
            .collect())
    }

    fn residuals(&mut self, samples: &[f64]) -> ModelResult<Vec<f64>> {
        let jitter = Uniform::new(0.5, 1.5);
        let mut previous = match samples.first() {
            Some(first) => *first,
            None => return Ok(Vec::new()),
        };
        Ok(samples
            .iter()
            .map(|&x| {
                let jump = (x - previous).abs();
                previous = x;
                jump * jitter.sample(&mut self.rng)
            })
            .collect())
    }

    fn name(&self) -> &str {
        "JumpResidual"
    }
}

/// Configuration for the reconstruction detector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconstructionConfig {
    /// Percentile of calibration residuals used as the threshold
    pub threshold_percentile: f64,
    /// Seed for the placeholder residual model; entropy when absent
    pub seed: Option<u64>,
}

impl Default for ReconstructionConfig {
    fn default() -> Self {
        Self {
            threshold_percentile: 95.0,
            seed: None,
        }
    }
}

/// Residual-threshold detector
pub struct ReconstructionDetector {
    config: ReconstructionConfig,
    model: Box<dyn ResidualModel>,
    threshold: Option<f64>,
}

impl ReconstructionDetector {
    /// Detector backed by [`JumpResidualModel`]
    pub fn new(config: ReconstructionConfig) -> Self {
        let model = match config.seed {
            Some(seed) => JumpResidualModel::seeded(seed),
            None => JumpResidualModel::from_entropy(),
        };
        Self::with_model(config, Box::new(model))
    }

    pub fn with_model(config: ReconstructionConfig, model: Box<dyn ResidualModel>) -> Self {
        Self {
            config,
            model,
            threshold: None,
        }
    }

    pub fn config(&self) -> &ReconstructionConfig {
        &self.config
    }

    /// Current reconstruction threshold, if calibrated
    pub fn threshold(&self) -> Option<f64> {
        self.threshold
    }

    pub fn is_fitted(&self) -> bool {
        self.threshold.is_some()
    }

    /// Calibrate the threshold from the model's training residuals
    pub fn fit(&mut self, series: &[f64]) -> bool {
        match self.model.fit(series) {
            Ok(residuals) if !residuals.is_empty() => {
                let threshold = stats::percentile(&residuals, self.config.threshold_percentile);
                info!(
                    "[RECON] {} calibrated, threshold {:.4}",
                    self.model.name(),
                    threshold
                );
                self.threshold = Some(threshold);
                true
            }
            Ok(_) => false,
            Err(e) => {
                warn!("[RECON] {} fit failed: {}", self.model.name(), e);
                false
            }
        }
    }

    /// Score every point as `residual / threshold`, clamped to [0, 2]
    ///
    /// An uncalibrated detector takes its threshold from this batch.
    pub fn detect(&mut self, series: &[f64]) -> BatchDetection {
        if series.is_empty() {
            return BatchDetection::default();
        }
        let residuals = match self.model.residuals(series) {
            Ok(r) if r.len() == series.len() => r,
            Ok(r) => {
                warn!(
                    "[RECON] {} returned {} residuals for {} points",
                    self.model.name(),
                    r.len(),
                    series.len()
                );
                return BatchDetection::neutral(series.len());
            }
            Err(e) => {
                warn!("[RECON] {} scoring failed: {}", self.model.name(), e);
                return BatchDetection::neutral(series.len());
            }
        };

        let threshold = match self.threshold {
            Some(t) => t,
            None => {
                let t = stats::percentile(&residuals, self.config.threshold_percentile);
                info!("[RECON] Self-calibrated threshold {:.4} from batch", t);
                self.threshold = Some(t);
                t
            }
        };

        let scores: Vec<f64> = residuals
            .iter()
            .map(|r| {
                let s = r / (threshold + EPSILON);
                if s.is_finite() { s.clamp(0.0, MAX_SCORE) } else { 0.0 }
            })
            .collect();
        let labels = scores.iter().map(|s| *s > ANOMALY_SCORE).collect();
        BatchDetection { labels, scores }
    }
}

impl Default for ReconstructionDetector {
    fn default() -> Self {
        Self::new(ReconstructionConfig::default())
    }
}

impl BatchDetector for ReconstructionDetector {
    fn fit(&mut self, series: &[f64]) -> bool {
        ReconstructionDetector::fit(self, series)
    }

    fn detect(&mut self, series: &[f64]) -> BatchDetection {
        ReconstructionDetector::detect(self, series)
    }

    fn is_fitted(&self) -> bool {
        ReconstructionDetector::is_fitted(self)
    }

    fn name(&self) -> &str {
        "Reconstruction"
    }
}
