//! Stream analysis pipeline
//!
//! Owns one instance of every detector and monitor and runs them over a
//! series of observations:
//!
//! ```text
//! observations ─┬─> StatisticalDetector (per value) ──┐
//!               ├─> MlEnsembleDetector (batch) ───────┼─> weighted score
//!               ├─> reconstruction (BatchDetector) ───┘
//!               ├─> DriftMonitor
//!               └─> MarketFrame ─> RegimeClassifier
//! ```
//!
//! The reconstruction slot takes any [`BatchDetector`]; the default is the
//! bundled [`ReconstructionDetector`].

use crate::config::VigilConfig;
use crate::market::MarketFrame;
use std::sync::Arc;
use vigil_core::{
    BatchDetection, DriftAssessment, Observation, RegimeAssignment, StatisticalDetection,
    validate_series, values_of,
};
use vigil_detector::{
    EnsembleDetection, MlEnsembleDetector, ReconstructionDetector, StatisticalDetector,
};
use vigil_monitor::{
    AlertDetails, AlertLog, AlertType, DriftMonitor, RegimeClassifier, Severity,
};
use vigil_ports::{BatchDetector, Clock};

/// Weight of the statistical score in the combined score
pub const STATISTICAL_WEIGHT: f64 = 0.35;
/// Weight of the ML ensemble score in the combined score
pub const ML_WEIGHT: f64 = 0.35;
/// Weight of the reconstruction score in the combined score
pub const RECONSTRUCTION_WEIGHT: f64 = 0.30;

/// Combined score above which a point is anomalous
pub const COMBINED_THRESHOLD: f64 = 0.5;

/// Trailing points checked for statistical and ensemble alerts
const ALERT_TAIL: usize = 5;

/// Statistical score above which an alert is critical
const CRITICAL_SCORE: f64 = 0.8;

/// Which models took part after `prepare`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PreparedModels {
    pub ml_ensemble: bool,
    pub reconstruction: bool,
    pub drift_reference: bool,
    pub regime: bool,
}

/// Output of one analysis pass
#[derive(Debug, Clone)]
pub struct AnalysisResult {
    pub observations: Vec<Observation>,
    /// Streaming detector output per point
    pub statistical: Vec<StatisticalDetection>,
    pub ml: EnsembleDetection,
    pub reconstruction: BatchDetection,
    /// Weighted blend of the three detectors
    pub combined: BatchDetection,
    pub drift: DriftAssessment,
    pub regime: Option<RegimeAssignment>,
    pub market: MarketFrame,
}

impl AnalysisResult {
    pub fn len(&self) -> usize {
        self.observations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    /// Statistical detections as a batch
    pub fn statistical_batch(&self) -> BatchDetection {
        BatchDetection {
            labels: self.statistical.iter().map(|d| d.is_anomaly).collect(),
            scores: self.statistical.iter().map(|d| d.score).collect(),
        }
    }
}

/// Blend the three per-point scores with the fixed weights
pub fn combine_scores(statistical: &[f64], ml: &[f64], reconstruction: &[f64]) -> BatchDetection {
    let scores: Vec<f64> = statistical
        .iter()
        .zip(ml)
        .zip(reconstruction)
        .map(|((s, m), r)| STATISTICAL_WEIGHT * s + ML_WEIGHT * m + RECONSTRUCTION_WEIGHT * r)
        .collect();
    let labels = scores.iter().map(|s| *s > COMBINED_THRESHOLD).collect();
    BatchDetection { labels, scores }
}

pub struct StreamAnalyzer {
    statistical: StatisticalDetector,
    ensemble: MlEnsembleDetector,
    reconstruction: Box<dyn BatchDetector>,
    drift: DriftMonitor,
    regime: RegimeClassifier,
    alerts: AlertLog,
    /// Regime seen by the previous `raise_alerts`
    last_regime: Option<RegimeAssignment>,
}

impl StreamAnalyzer {
    pub fn new(config: &VigilConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            statistical: StatisticalDetector::new(config.statistical.clone()),
            ensemble: MlEnsembleDetector::new(config.ensemble.clone()),
            reconstruction: Box::new(ReconstructionDetector::new(config.reconstruction.clone())),
            drift: DriftMonitor::new(config.drift.clone(), clock.clone()),
            regime: RegimeClassifier::new(config.regime.clone()),
            alerts: AlertLog::new(config.alerts.clone(), clock),
            last_regime: None,
        }
    }

    /// Replace the reconstruction detector; it must be fitted by `prepare`
    pub fn with_reconstruction(mut self, detector: Box<dyn BatchDetector>) -> Self {
        self.reconstruction = detector;
        self
    }

    /// Fit the batch models and freeze the drift reference
    ///
    /// The drift reference is the first half of the values.
    pub fn prepare(&mut self, observations: &[Observation]) -> vigil_core::Result<PreparedModels> {
        validate_series(observations)?;
        let values = values_of(observations);
        let market = MarketFrame::from_observations(observations);

        let prepared = PreparedModels {
            ml_ensemble: self.ensemble.fit_series(&values),
            reconstruction: self.reconstruction.fit(&values),
            drift_reference: self.drift.set_reference(&values[..values.len() / 2]),
            regime: self.regime.fit(&market.prices),
        };
        log::info!(
            "[PIPELINE] Prepared on {} points with {}: {:?}",
            values.len(),
            self.reconstruction.name(),
            prepared
        );
        Ok(prepared)
    }

    /// Run every component over the series
    ///
    /// An unfitted ML ensemble is fitted on the series first.
    pub fn analyze(&mut self, observations: &[Observation]) -> vigil_core::Result<AnalysisResult> {
        validate_series(observations)?;
        let values = values_of(observations);

        let statistical: Vec<StatisticalDetection> =
            values.iter().map(|v| self.statistical.detect(*v)).collect();

        if !self.ensemble.is_fitted() {
            self.ensemble.fit_series(&values);
        }
        let ml = self.ensemble.detect_series(&values);
        let reconstruction = self.reconstruction.detect(&values);

        let statistical_scores: Vec<f64> = statistical.iter().map(|d| d.score).collect();
        let combined = combine_scores(&statistical_scores, &ml.scores, &reconstruction.scores);

        let drift = self.drift.detect_drift(&values);
        let market = MarketFrame::from_observations(observations);
        let regime = self.regime.detect_regime(&market.prices);

        log::info!(
            "[PIPELINE] Analyzed {} points: {} combined anomalies, drift {} ({:.3})",
            values.len(),
            combined.anomaly_count(),
            drift.detected,
            drift.score
        );

        Ok(AnalysisResult {
            observations: observations.to_vec(),
            statistical,
            ml,
            reconstruction,
            combined,
            drift,
            regime,
            market,
        })
    }

    /// Push alerts for the notable events of an analysis
    ///
    /// Statistical and combined-score anomalies among the last five points
    /// raise alerts, as does detected drift or a regime change since the
    /// previous call. Returns the number of alerts raised.
    pub fn raise_alerts(&mut self, result: &AnalysisResult) -> usize {
        let mut raised = 0;

        let tail_start = result.len().saturating_sub(ALERT_TAIL);
        for (offset, detection) in result.statistical[tail_start..].iter().enumerate() {
            if !detection.is_anomaly {
                continue;
            }
            let index = tail_start + offset;
            let value = result.observations[index].value;
            let severity = if detection.score > CRITICAL_SCORE {
                Severity::Critical
            } else {
                Severity::Warning
            };
            self.alerts.add_alert(
                AlertType::StatisticalAnomaly,
                severity,
                format!(
                    "Statistical anomaly detected: value={:.2}, score={:.3}",
                    value, detection.score
                ),
                AlertDetails::Statistical {
                    index,
                    value,
                    score: detection.score,
                    details: detection.details.clone(),
                },
            );
            raised += 1;
        }

        for (offset, score) in result.combined.scores[tail_start..].iter().enumerate() {
            let index = tail_start + offset;
            if !result.combined.labels[index] {
                continue;
            }
            self.alerts.add_alert(
                AlertType::EnsembleAnomaly,
                Severity::Warning,
                format!(
                    "Ensemble anomaly detected: value={:.2}, combined score={:.3}",
                    result.observations[index].value, score
                ),
                AlertDetails::Ensemble {
                    index,
                    score: *score,
                },
            );
            raised += 1;
        }

        if result.drift.detected {
            if let Some(details) = &result.drift.details {
                self.alerts.add_alert(
                    AlertType::ModelDrift,
                    Severity::Critical,
                    format!("Model drift detected: score={:.3}", result.drift.score),
                    AlertDetails::Drift {
                        score: result.drift.score,
                        details: details.clone(),
                    },
                );
                raised += 1;
            }
        }

        if let Some(current) = &result.regime {
            if let Some(previous) = &self.last_regime {
                if previous.regime != current.regime {
                    self.alerts.add_alert(
                        AlertType::RegimeShift,
                        Severity::Info,
                        format!("Regime shift: {} -> {}", previous.label, current.label),
                        AlertDetails::Regime {
                            from: previous.label,
                            to: current.label,
                            confidence: current.confidence,
                        },
                    );
                    raised += 1;
                }
            }
            self.last_regime = Some(current.clone());
        }

        raised
    }

    pub fn alerts(&self) -> &AlertLog {
        &self.alerts
    }

    pub fn drift_monitor(&self) -> &DriftMonitor {
        &self.drift
    }

    pub fn regime_classifier(&self) -> &RegimeClassifier {
        &self.regime
    }

    pub fn ml_ensemble(&self) -> &MlEnsembleDetector {
        &self.ensemble
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use chrono::{Duration, TimeZone, Utc};
    use vigil_clock::ManualClock;

    /// Reconstruction stand-in that never flags anything
    struct QuietDetector {
        fitted: bool,
    }

    impl BatchDetector for QuietDetector {
        fn fit(&mut self, _series: &[f64]) -> bool {
            self.fitted = true;
            true
        }

        fn detect(&mut self, series: &[f64]) -> BatchDetection {
            BatchDetection {
                labels: vec![false; series.len()],
                scores: vec![0.0; series.len()],
            }
        }

        fn is_fitted(&self) -> bool {
            self.fitted
        }

        fn name(&self) -> &str {
            "Quiet"
        }
    }

    fn wave(n: usize) -> Vec<Observation> {
        let start = Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap();
        (0..n)
            .map(|i| {
                let t = i as f64;
                Observation::new(
                    start + Duration::minutes(i as i64),
                    100.0 + (t * 0.3).sin() + 0.01 * t,
                )
            })
            .collect()
    }

    #[test]
    fn test_weights_sum_to_one() {
        assert_relative_eq!(STATISTICAL_WEIGHT + ML_WEIGHT + RECONSTRUCTION_WEIGHT, 1.0);
    }

    #[test]
    fn test_combine_scores() {
        let combined = combine_scores(&[1.0, 0.0, 0.6], &[1.0, 0.25, 0.5], &[0.0, 2.0, 0.4]);
        assert_relative_eq!(combined.scores[0], 0.7);
        assert_relative_eq!(combined.scores[1], 0.6875);
        assert_relative_eq!(combined.scores[2], 0.505);
        assert_eq!(combined.labels, vec![true, true, true]);

        let quiet = combine_scores(&[0.4], &[0.4], &[0.4]);
        assert_relative_eq!(quiet.scores[0], 0.4);
        assert!(!quiet.labels[0]);
    }

    #[test]
    fn test_reconstruction_slot_accepts_any_batch_detector() {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 5, 2, 0, 0, 0).unwrap(),
        ));
        let mut analyzer = StreamAnalyzer::new(&VigilConfig::default(), clock)
            .with_reconstruction(Box::new(QuietDetector { fitted: false }));

        let observations = wave(200);
        let prepared = analyzer.prepare(&observations).unwrap();
        assert!(prepared.reconstruction);

        let result = analyzer.analyze(&observations).unwrap();
        assert_eq!(result.reconstruction.scores, vec![0.0; 200]);
        for (i, combined) in result.combined.scores.iter().enumerate() {
            let expected = STATISTICAL_WEIGHT * result.statistical[i].score
                + ML_WEIGHT * result.ml.scores[i];
            assert_relative_eq!(*combined, expected, epsilon = 1e-12);
        }
    }
}
