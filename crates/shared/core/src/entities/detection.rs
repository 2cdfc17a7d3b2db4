use serde::{Deserialize, Serialize};

/// Outcome of a single-point statistical check
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatisticalDetection {
    pub is_anomaly: bool,
    /// Combined score in [0, 1]
    pub score: f64,
    /// `None` while the detector is still warming up
    pub details: Option<StatisticalDetails>,
}

impl StatisticalDetection {
    /// Neutral result returned before enough samples are buffered
    pub fn not_ready() -> Self {
        Self {
            is_anomaly: false,
            score: 0.0,
            details: None,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.details.is_some()
    }
}

/// Per-test measurements behind a [`StatisticalDetection`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatisticalDetails {
    pub z_score: f64,
    pub modified_z: f64,
    pub iqr_lower: f64,
    pub iqr_upper: f64,
    pub grubbs_statistic: f64,
    pub grubbs_critical: f64,
    /// Number of the four tests that flagged the point
    pub methods_triggered: u8,
}

/// Per-point labels and scores for a batch
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct BatchDetection {
    pub labels: Vec<bool>,
    pub scores: Vec<f64>,
}

impl BatchDetection {
    /// All-clear result of length `n`
    pub fn neutral(n: usize) -> Self {
        Self {
            labels: vec![false; n],
            scores: vec![0.0; n],
        }
    }

    pub fn len(&self) -> usize {
        self.scores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }

    pub fn anomaly_count(&self) -> usize {
        self.labels.iter().filter(|&&l| l).count()
    }

    pub fn mean_score(&self) -> f64 {
        crate::stats::mean(&self.scores)
    }
}
