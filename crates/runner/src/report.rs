//! Analysis report
//!
//! Flattens an [`AnalysisResult`] and the alert tally into a summary that
//! renders as plain text or JSON.

use crate::pipeline::AnalysisResult;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use vigil_core::BatchDetection;
use vigil_monitor::{AlertLog, AlertType};

/// Steps scanned for recent regime transitions
const TRANSITION_LOOKBACK: usize = 10;
/// Transitions listed in the report
const MAX_TRANSITIONS: usize = 5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodSummary {
    pub method: String,
    pub anomalies: usize,
    pub mean_score: f64,
}

impl MethodSummary {
    fn from_batch(method: &str, batch: &BatchDetection) -> Self {
        Self {
            method: method.to_string(),
            anomalies: batch.anomaly_count(),
            mean_score: batch.mean_score(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriftSummary {
    pub detected: bool,
    pub score: f64,
    /// `false` while no reference is set or the window is too short
    pub assessed: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegimeSummary {
    pub regime: usize,
    pub name: String,
    pub color: String,
    pub confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub points_analyzed: usize,
    /// Statistical, ML ensemble, reconstruction, combined
    pub methods: Vec<MethodSummary>,
    pub max_combined_score: f64,
    /// Share of points flagged by the combined score
    pub anomaly_rate: f64,
    pub drift: DriftSummary,
    /// `None` until the regime classifier is fitted
    pub regime: Option<RegimeSummary>,
    /// Points per heuristic market regime
    pub regime_distribution: BTreeMap<String, usize>,
    /// Recent `from -> to` changes of the heuristic regime, newest first
    pub transitions: Vec<String>,
    pub alert_summary: BTreeMap<AlertType, u64>,
}

impl AnalysisReport {
    pub fn new(result: &AnalysisResult, alerts: &AlertLog) -> Self {
        let combined = &result.combined;
        let methods = vec![
            MethodSummary::from_batch("Statistical", &result.statistical_batch()),
            MethodSummary::from_batch("ML Ensemble", &result.ml.clone().into()),
            MethodSummary::from_batch("Reconstruction", &result.reconstruction),
            MethodSummary::from_batch("Combined", combined),
        ];

        let max_combined_score = combined.scores.iter().copied().fold(0.0, f64::max);
        let anomaly_rate = if combined.is_empty() {
            0.0
        } else {
            combined.anomaly_count() as f64 / combined.len() as f64
        };

        let regime = result.regime.as_ref().map(|r| RegimeSummary {
            regime: r.regime,
            name: r.label.name(),
            color: r.color().to_string(),
            confidence: r.confidence,
        });

        let regime_distribution = result
            .market
            .regime_distribution()
            .into_iter()
            .map(|(label, count)| (label.name(), count))
            .collect();

        let transitions = result
            .market
            .recent_transitions(TRANSITION_LOOKBACK, MAX_TRANSITIONS)
            .into_iter()
            .map(|(from, to)| format!("{} -> {}", from, to))
            .collect();

        Self {
            points_analyzed: result.len(),
            methods,
            max_combined_score,
            anomaly_rate,
            drift: DriftSummary {
                detected: result.drift.detected,
                score: result.drift.score,
                assessed: result.drift.details.is_some(),
            },
            regime,
            regime_distribution,
            transitions,
            alert_summary: alerts.get_summary(),
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn total_alerts(&self) -> u64 {
        self.alert_summary.values().sum()
    }
}

impl fmt::Display for AnalysisReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Vigil Analysis Report ===")?;
        writeln!(f, "Points analyzed: {}", self.points_analyzed)?;
        writeln!(f)?;

        writeln!(f, "Detection")?;
        for m in &self.methods {
            writeln!(
                f,
                "  {:<15} {:>5} anomalies  mean score {:.3}",
                m.method, m.anomalies, m.mean_score
            )?;
        }
        writeln!(f, "  Max combined score: {:.3}", self.max_combined_score)?;
        writeln!(f, "  Anomaly rate: {:.2}%", self.anomaly_rate * 100.0)?;
        writeln!(f)?;

        let drift_status = if !self.drift.assessed {
            "not assessed"
        } else if self.drift.detected {
            "DRIFT DETECTED"
        } else {
            "stable"
        };
        writeln!(f, "Drift: {} (score {:.3})", drift_status, self.drift.score)?;
        writeln!(f)?;

        match &self.regime {
            Some(r) => writeln!(
                f,
                "Regime: {} (confidence {:.1}%)",
                r.name,
                r.confidence * 100.0
            )?,
            None => writeln!(f, "Regime: unavailable")?,
        }
        for (name, count) in &self.regime_distribution {
            let share = if self.points_analyzed == 0 {
                0.0
            } else {
                100.0 * *count as f64 / self.points_analyzed as f64
            };
            writeln!(f, "  {}: {} periods ({:.1}%)", name, count, share)?;
        }
        if self.transitions.is_empty() {
            writeln!(f, "  No recent transitions")?;
        } else {
            for t in &self.transitions {
                writeln!(f, "  {}", t)?;
            }
        }
        writeln!(f)?;

        writeln!(f, "Alerts: {}", self.total_alerts())?;
        for (alert_type, count) in &self.alert_summary {
            writeln!(f, "  {}: {}", alert_type, count)?;
        }
        Ok(())
    }
}
