use serde::{Deserialize, Serialize};

use crate::error::ModelResult;

/// A single model's verdict on one row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Vote {
    Inlier,
    Outlier,
}

impl Vote {
    /// Signed form: `-1` for outliers, `+1` for inliers
    pub fn as_sign(&self) -> i8 {
        match self {
            Vote::Inlier => 1,
            Vote::Outlier => -1,
        }
    }

    pub fn is_outlier(&self) -> bool {
        matches!(self, Vote::Outlier)
    }
}

/// Port for unsupervised outlier models
///
/// Implementations are fitted on standardized feature rows and label each
/// row of a later batch. A model calibrates its own decision threshold
/// during `fit`.
pub trait OutlierModel: Send {
    /// Fit the model on training rows
    fn fit(&mut self, rows: &[Vec<f64>]) -> ModelResult<()>;

    /// Label every row; fails if called before a successful fit
    fn predict(&self, rows: &[Vec<f64>]) -> ModelResult<Vec<Vote>>;

    /// Get the name of the model
    fn name(&self) -> &str;
}

/// Port for models producing per-point reconstruction residuals
pub trait ResidualModel: Send {
    /// Fit on a series and return the calibration residuals
    fn fit(&mut self, samples: &[f64]) -> ModelResult<Vec<f64>>;

    /// Residual for each point of `samples`
    fn residuals(&mut self, samples: &[f64]) -> ModelResult<Vec<f64>>;

    /// Get the name of the model
    fn name(&self) -> &str;
}
