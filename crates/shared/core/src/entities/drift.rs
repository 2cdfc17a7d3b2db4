use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::stats;
use crate::values::Timestamp;

/// Frozen reference sample with cached summary statistics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceDistribution {
    sample: Vec<f64>,
    pub mean: f64,
    /// Population standard deviation
    pub std: f64,
    pub median: f64,
    pub q25: f64,
    pub q75: f64,
}

impl ReferenceDistribution {
    pub fn from_sample(sample: Vec<f64>) -> Result<Self> {
        if sample.is_empty() {
            return Err(Error::EmptyInput);
        }
        if let Some(index) = sample.iter().position(|v| !v.is_finite()) {
            return Err(Error::NonFiniteValue { index });
        }
        Ok(Self {
            mean: stats::mean(&sample),
            std: stats::std_dev(&sample),
            median: stats::median(&sample),
            q25: stats::percentile(&sample, 25.0),
            q75: stats::percentile(&sample, 75.0),
            sample,
        })
    }

    pub fn sample(&self) -> &[f64] {
        &self.sample
    }

    pub fn len(&self) -> usize {
        self.sample.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sample.is_empty()
    }

    pub fn variance(&self) -> f64 {
        self.std * self.std
    }
}

/// Result of comparing the current window against the reference
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriftAssessment {
    pub detected: bool,
    /// Weighted drift score in [0, 1]
    pub score: f64,
    pub details: Option<DriftDetails>,
}

impl DriftAssessment {
    pub fn not_ready() -> Self {
        Self {
            detected: false,
            score: 0.0,
            details: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriftDetails {
    pub ks_statistic: f64,
    pub ks_pvalue: f64,
    pub psi: f64,
    pub js_divergence: f64,
    pub mean_shift: f64,
    pub variance_drift: f64,
    pub current_mean: f64,
    pub reference_mean: f64,
}

/// One entry of the drift history
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DriftRecord {
    pub timestamp: Timestamp,
    pub score: f64,
    pub detected: bool,
}
