//! Robust Covariance (Minimum Covariance Determinant)
//!
//! Fits a Gaussian envelope on the `h = (n + d + 1) / 2` most central points,
//! found by concentration steps from random starting subsets. The raw
//! estimate is rescaled for consistency under normality and then reweighted
//! on the points inside the 97.5% chi-squared contour. Rows are scored by
//! squared Mahalanobis distance to the final estimate.
//!
//! On large batches the random starts run on a subsample of
//! [`MAX_SEARCH_ROWS`] rows and only the best start is concentrated on the
//! full batch.

use log::debug;
use nalgebra::{Cholesky, DMatrix, DVector, Dyn};
use rand::prelude::*;
use rand::seq::index;
use statrs::distribution::{ChiSquared, ContinuousCDF};
use vigil_core::stats;
use vigil_ports::{ModelError, ModelResult, OutlierModel, Vote};

use super::{check_rows, contamination_threshold, subsample};

/// Rows the random-start search runs on
pub const MAX_SEARCH_ROWS: usize = 1500;

/// Random starting subsets
const N_STARTS: usize = 30;

/// Concentration steps per start before giving up on convergence
const MAX_C_STEPS: usize = 30;

/// Quantile of the chi-squared contour used for reweighting
const REWEIGHT_QUANTILE: f64 = 0.975;

/// Gaussian location/scatter pair with a factorized covariance
#[derive(Debug, Clone)]
struct Estimate {
    location: DVector<f64>,
    chol: Cholesky<f64, Dyn>,
    log_det: f64,
}

impl Estimate {
    /// Population mean and covariance of the selected rows
    ///
    /// `None` when the covariance is not positive definite.
    fn from_subset(rows: &[Vec<f64>], subset: &[usize]) -> Option<Self> {
        let first = subset.first()?;
        let d = rows[*first].len();
        let m = subset.len() as f64;

        let mut location: DVector<f64> = DVector::zeros(d);
        for &i in subset {
            location += DVector::from_column_slice(&rows[i]);
        }
        location /= m;

        let mut covariance: DMatrix<f64> = DMatrix::zeros(d, d);
        for &i in subset {
            let diff = DVector::from_column_slice(&rows[i]) - &location;
            covariance += &diff * diff.transpose();
        }
        covariance /= m;

        let chol = covariance.cholesky()?;
        let log_det = 2.0 * chol.l().diagonal().iter().map(|v| v.ln()).sum::<f64>();
        if !log_det.is_finite() {
            return None;
        }
        Some(Self {
            location,
            chol,
            log_det,
        })
    }

    fn sq_distance(&self, row: &[f64]) -> f64 {
        let diff = DVector::from_column_slice(row) - &self.location;
        let solved = self.chol.solve(&diff);
        diff.dot(&solved)
    }

    fn sq_distances(&self, rows: &[Vec<f64>]) -> Vec<f64> {
        rows.iter().map(|r| self.sq_distance(r)).collect()
    }
}

/// Indices of the `h` smallest distances
fn closest(distances: &[f64], h: usize) -> Vec<usize> {
    let mut order: Vec<usize> = (0..distances.len()).collect();
    order.sort_by(|&a, &b| distances[a].total_cmp(&distances[b]));
    order.truncate(h);
    order
}

/// C-steps from `current` until the determinant stops shrinking
fn concentrate(rows: &[Vec<f64>], mut current: Estimate, h: usize) -> Estimate {
    for _ in 0..MAX_C_STEPS {
        let next_subset = closest(&current.sq_distances(rows), h);
        let Some(next) = Estimate::from_subset(rows, &next_subset) else {
            break;
        };
        let improved = next.log_det < current.log_det - 1e-12;
        if next.log_det <= current.log_det {
            current = next;
        }
        if !improved {
            break;
        }
    }
    current
}

#[derive(Debug, Clone)]
struct FittedEnvelope {
    estimate: Estimate,
    n_features: usize,
    threshold: f64,
}

/// Minimum covariance determinant outlier model
#[derive(Debug, Clone)]
pub struct RobustCovariance {
    contamination: f64,
    seed: u64,
    fitted: Option<FittedEnvelope>,
}

impl RobustCovariance {
    pub fn new(contamination: f64, seed: u64) -> Self {
        Self {
            contamination,
            seed,
            fitted: None,
        }
    }

    /// Squared Mahalanobis distance to the fitted location
    #[cfg(test)]
    fn sq_mahalanobis(&self, row: &[f64]) -> Option<f64> {
        self.fitted.as_ref().map(|f| f.estimate.sq_distance(row))
    }

    fn raw_mcd(&self, rows: &[Vec<f64>], h: usize) -> Option<Estimate> {
        let mut rng = StdRng::seed_from_u64(self.seed);
        let search = subsample(rows, MAX_SEARCH_ROWS, &mut rng);
        let search_h = if search.len() == rows.len() {
            h
        } else {
            let d = rows[0].len();
            (search.len() + d + 1) / 2
        };

        let mut best: Option<Estimate> = None;
        for _ in 0..N_STARTS {
            let subset = index::sample(&mut rng, search.len(), search_h).into_vec();
            let Some(start) = Estimate::from_subset(&search, &subset) else {
                continue;
            };
            let current = concentrate(&search, start, search_h);
            if best.as_ref().is_none_or(|b| current.log_det < b.log_det) {
                best = Some(current);
            }
        }

        let best = best?;
        if search.len() == rows.len() {
            Some(best)
        } else {
            Some(concentrate(rows, best, h))
        }
    }
}

impl OutlierModel for RobustCovariance {
    fn fit(&mut self, rows: &[Vec<f64>]) -> ModelResult<()> {
        let d = check_rows(rows, None)?;
        let n = rows.len();
        if n < d + 2 {
            return Err(ModelError::InsufficientSamples {
                required: d + 2,
                found: n,
            });
        }
        let h = (n + d + 1) / 2;

        let raw = self.raw_mcd(rows, h).ok_or_else(|| {
            ModelError::Degenerate("covariance of every support subset is singular".to_string())
        })?;

        let chi2 = ChiSquared::new(d as f64).map_err(|e| ModelError::Degenerate(e.to_string()))?;

        // Consistency correction
        let raw_distances = raw.sq_distances(rows);
        let correction = stats::median(&raw_distances) / chi2.inverse_cdf(0.5);
        if !(correction.is_finite() && correction > 0.0) {
            return Err(ModelError::Degenerate(format!(
                "invalid consistency correction {}",
                correction
            )));
        }

        // Reweighting
        let cutoff = chi2.inverse_cdf(REWEIGHT_QUANTILE);
        let support: Vec<usize> = raw_distances
            .iter()
            .enumerate()
            .filter(|(_, dist)| *dist / correction < cutoff)
            .map(|(i, _)| i)
            .collect();
        debug!(
            "[MCD] Reweighting on {}/{} rows (raw support {})",
            support.len(),
            n,
            h
        );
        let estimate = Estimate::from_subset(rows, &support).ok_or_else(|| {
            ModelError::Degenerate("reweighted covariance is singular".to_string())
        })?;

        let distances = estimate.sq_distances(rows);
        self.fitted = Some(FittedEnvelope {
            threshold: contamination_threshold(&distances, self.contamination),
            estimate,
            n_features: d,
        });
        Ok(())
    }

    fn predict(&self, rows: &[Vec<f64>]) -> ModelResult<Vec<Vote>> {
        let fitted = self.fitted.as_ref().ok_or(ModelError::NotFitted)?;
        check_rows(rows, Some(fitted.n_features))?;
        Ok(rows
            .iter()
            .map(|r| {
                if fitted.estimate.sq_distance(r) > fitted.threshold {
                    Vote::Outlier
                } else {
                    Vote::Inlier
                }
            })
            .collect())
    }

    fn name(&self) -> &str {
        "RobustCovariance"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand_distr::{Distribution, Normal};

    fn gaussian_rows(n: usize, seed: u64) -> Vec<Vec<f64>> {
        let mut rng = StdRng::seed_from_u64(seed);
        let normal = Normal::new(0.0, 1.0).unwrap();
        (0..n)
            .map(|_| vec![normal.sample(&mut rng), normal.sample(&mut rng)])
            .collect()
    }

    #[test]
    fn test_contaminated_fit_stays_central() {
        let mut rows = gaussian_rows(200, 1);
        // 10% gross outliers pulling the mean
        for _ in 0..20 {
            rows.push(vec![25.0, 25.0]);
        }
        let mut model = RobustCovariance::new(0.1, 42);
        model.fit(&rows).unwrap();

        let center = model.sq_mahalanobis(&[0.0, 0.0]).unwrap();
        let far = model.sq_mahalanobis(&[25.0, 25.0]).unwrap();
        assert!(center < 1.0);
        assert!(far > 100.0);

        let votes = model.predict(&[vec![0.0, 0.0], vec![25.0, 25.0]]).unwrap();
        assert_eq!(votes, vec![Vote::Inlier, Vote::Outlier]);
    }

    #[test]
    fn test_large_batch_searches_subsample() {
        let mut rows = gaussian_rows(18_000, 4);
        for _ in 0..2_000 {
            rows.push(vec![30.0, -30.0]);
        }
        let mut model = RobustCovariance::new(0.1, 42);
        model.fit(&rows).unwrap();

        assert!(model.sq_mahalanobis(&[0.0, 0.0]).unwrap() < 1.0);
        let votes = model.predict(&[vec![0.0, 0.0], vec![30.0, -30.0]]).unwrap();
        assert_eq!(votes, vec![Vote::Inlier, Vote::Outlier]);
    }

    #[test]
    fn test_identical_rows_are_degenerate() {
        let rows = vec![vec![1.0]; 50];
        let mut model = RobustCovariance::new(0.1, 42);
        assert!(matches!(model.fit(&rows), Err(ModelError::Degenerate(_))));
        assert_eq!(model.predict(&rows), Err(ModelError::NotFitted));
    }

    #[test]
    fn test_too_few_rows() {
        let rows = vec![vec![1.0, 2.0], vec![2.0, 1.0]];
        let mut model = RobustCovariance::new(0.1, 42);
        assert_eq!(
            model.fit(&rows),
            Err(ModelError::InsufficientSamples {
                required: 4,
                found: 2
            })
        );
    }

    #[test]
    fn test_dimension_checked() {
        let rows = gaussian_rows(60, 3);
        let mut model = RobustCovariance::new(0.1, 42);
        model.fit(&rows).unwrap();
        assert!(matches!(
            model.predict(&[vec![0.0]]),
            Err(ModelError::DimensionMismatch { .. })
        ));
    }
}
