use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Per-column standardization to zero mean and unit variance
///
/// Columns with zero variance keep a unit scale so they map to zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    means: Vec<f64>,
    scales: Vec<f64>,
}

impl StandardScaler {
    pub fn fit(rows: &[Vec<f64>]) -> Result<Self> {
        let first = rows.first().ok_or(Error::EmptyInput)?;
        let n_features = first.len();
        if n_features == 0 {
            return Err(Error::EmptyInput);
        }
        for row in rows {
            if row.len() != n_features {
                return Err(Error::DimensionMismatch {
                    expected: n_features,
                    found: row.len(),
                });
            }
        }

        let n = rows.len() as f64;
        let mut means = vec![0.0; n_features];
        for row in rows {
            for (m, v) in means.iter_mut().zip(row) {
                *m += v;
            }
        }
        means.iter_mut().for_each(|m| *m /= n);

        let mut scales = vec![0.0; n_features];
        for row in rows {
            for ((s, v), m) in scales.iter_mut().zip(row).zip(&means) {
                *s += (v - m).powi(2);
            }
        }
        for s in scales.iter_mut() {
            let std = (*s / n).sqrt();
            *s = if std > 0.0 && std.is_finite() { std } else { 1.0 };
        }

        Ok(Self { means, scales })
    }

    pub fn n_features(&self) -> usize {
        self.means.len()
    }

    pub fn means(&self) -> &[f64] {
        &self.means
    }

    pub fn scales(&self) -> &[f64] {
        &self.scales
    }

    pub fn transform_row(&self, row: &[f64]) -> Result<Vec<f64>> {
        if row.len() != self.n_features() {
            return Err(Error::DimensionMismatch {
                expected: self.n_features(),
                found: row.len(),
            });
        }
        Ok(row
            .iter()
            .zip(&self.means)
            .zip(&self.scales)
            .map(|((v, m), s)| (v - m) / s)
            .collect())
    }

    pub fn transform(&self, rows: &[Vec<f64>]) -> Result<Vec<Vec<f64>>> {
        rows.iter().map(|row| self.transform_row(row)).collect()
    }

    /// Map a scaled row back to original units
    pub fn inverse_transform_row(&self, row: &[f64]) -> Result<Vec<f64>> {
        if row.len() != self.n_features() {
            return Err(Error::DimensionMismatch {
                expected: self.n_features(),
                found: row.len(),
            });
        }
        Ok(row
            .iter()
            .zip(&self.means)
            .zip(&self.scales)
            .map(|((v, m), s)| v * s + m)
            .collect())
    }
}
