//! Gaussian Mixture Model
//!
//! Full-covariance mixture fitted by expectation-maximization. Components
//! are initialized from a k-means clustering seeded with k-means++, and every
//! covariance gets `REG_COVAR` added to its diagonal to stay positive
//! definite.

use log::{debug, warn};
use nalgebra::{Cholesky, DMatrix, DVector, Dyn};
use rand::prelude::*;
use std::f64::consts::PI;
use vigil_ports::{ModelError, ModelResult};

/// Lloyd iterations used for initialization
const KMEANS_MAX_ITER: usize = 100;

/// EM iterations before giving up on convergence
const MAX_ITER: usize = 100;

/// Lower-bound change that counts as converged
const TOL: f64 = 1e-3;

/// Added to every covariance diagonal
const REG_COVAR: f64 = 1e-6;

/// Keeps empty components from dividing by zero
const MIN_COMPONENT_WEIGHT: f64 = 10.0 * f64::EPSILON;

#[derive(Debug, Clone)]
struct Component {
    weight: f64,
    mean: DVector<f64>,
    chol: Cholesky<f64, Dyn>,
    log_det: f64,
}

impl Component {
    fn new(weight: f64, mean: DVector<f64>, covariance: DMatrix<f64>) -> ModelResult<Self> {
        let chol = covariance.cholesky().ok_or_else(|| {
            ModelError::Degenerate("component covariance is not positive definite".to_string())
        })?;
        let log_det = 2.0 * chol.l().diagonal().iter().map(|v| v.ln()).sum::<f64>();
        Ok(Self {
            weight,
            mean,
            chol,
            log_det,
        })
    }

    /// `ln(weight) + ln N(x | mean, cov)`
    fn weighted_log_pdf(&self, x: &DVector<f64>) -> f64 {
        let diff = x - &self.mean;
        let maha = diff.dot(&self.chol.solve(&diff));
        let d = x.len() as f64;
        self.weight.ln() - 0.5 * (d * (2.0 * PI).ln() + self.log_det + maha)
    }
}

/// Full-covariance Gaussian mixture
#[derive(Debug, Clone)]
pub struct GaussianMixture {
    n_components: usize,
    seed: u64,
    components: Vec<Component>,
    converged: bool,
    n_iter: usize,
}

fn log_sum_exp(values: &[f64]) -> f64 {
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if !max.is_finite() {
        return max;
    }
    max + values.iter().map(|v| (v - max).exp()).sum::<f64>().ln()
}

fn sq_dist(a: &DVector<f64>, b: &DVector<f64>) -> f64 {
    (a - b).norm_squared()
}

impl GaussianMixture {
    pub fn new(n_components: usize, seed: u64) -> Self {
        Self {
            n_components: n_components.max(1),
            seed,
            components: Vec::new(),
            converged: false,
            n_iter: 0,
        }
    }

    pub fn n_components(&self) -> usize {
        self.n_components
    }

    pub fn converged(&self) -> bool {
        self.converged
    }

    pub fn n_iter(&self) -> usize {
        self.n_iter
    }

    #[cfg(test)]
    fn weights(&self) -> Vec<f64> {
        self.components.iter().map(|c| c.weight).collect()
    }

    /// Component means in the space the mixture was fitted in
    pub fn means(&self) -> Vec<Vec<f64>> {
        self.components
            .iter()
            .map(|c| c.mean.iter().copied().collect())
            .collect()
    }

    pub fn fit(&mut self, rows: &[Vec<f64>]) -> ModelResult<()> {
        let k = self.n_components;
        if rows.len() < k {
            return Err(ModelError::InsufficientSamples {
                required: k,
                found: rows.len(),
            });
        }
        let d = rows[0].len();
        if d == 0 {
            return Err(ModelError::Degenerate("rows have no features".to_string()));
        }
        if let Some(bad) = rows.iter().find(|r| r.len() != d) {
            return Err(ModelError::DimensionMismatch {
                expected: d,
                found: bad.len(),
            });
        }
        let data: Vec<DVector<f64>> = rows.iter().map(|r| DVector::from_column_slice(r)).collect();

        let labels = self.kmeans_labels(&data);
        let mut resp = vec![vec![0.0; k]; data.len()];
        for (r, &label) in resp.iter_mut().zip(&labels) {
            r[label] = 1.0;
        }
        let mut components = self.m_step(&data, &resp)?;

        let mut lower_bound = f64::NEG_INFINITY;
        self.converged = false;
        self.n_iter = 0;
        for iter in 1..=MAX_ITER {
            let (log_likelihood, new_resp) = Self::e_step(&components, &data);
            resp = new_resp;
            components = self.m_step(&data, &resp)?;
            self.n_iter = iter;

            let change = log_likelihood - lower_bound;
            lower_bound = log_likelihood;
            if change.abs() < TOL {
                self.converged = true;
                break;
            }
        }

        if self.converged {
            debug!(
                "[GMM] Converged after {} iterations, mean log-likelihood {:.4}",
                self.n_iter, lower_bound
            );
        } else {
            warn!(
                "[GMM] Did not converge within {} iterations",
                MAX_ITER
            );
        }
        self.components = components;
        Ok(())
    }

    /// Posterior probability of each component for one row
    pub fn predict_proba(&self, row: &[f64]) -> ModelResult<Vec<f64>> {
        let first = self.components.first().ok_or(ModelError::NotFitted)?;
        if row.len() != first.mean.len() {
            return Err(ModelError::DimensionMismatch {
                expected: first.mean.len(),
                found: row.len(),
            });
        }
        let x = DVector::from_column_slice(row);
        let log_probs: Vec<f64> = self
            .components
            .iter()
            .map(|c| c.weighted_log_pdf(&x))
            .collect();
        let norm = log_sum_exp(&log_probs);
        if !norm.is_finite() {
            return Err(ModelError::Degenerate("row has zero likelihood".to_string()));
        }
        Ok(log_probs.iter().map(|lp| (lp - norm).exp()).collect())
    }

    /// Most probable component for one row
    pub fn predict(&self, row: &[f64]) -> ModelResult<usize> {
        let probs = self.predict_proba(row)?;
        Ok(vigil_core::stats::argmax(&probs).unwrap_or(0))
    }

    /// Mean log-likelihood and responsibilities
    fn e_step(components: &[Component], data: &[DVector<f64>]) -> (f64, Vec<Vec<f64>>) {
        let mut total = 0.0;
        let resp = data
            .iter()
            .map(|x| {
                let log_probs: Vec<f64> = components.iter().map(|c| c.weighted_log_pdf(x)).collect();
                let norm = log_sum_exp(&log_probs);
                total += norm;
                log_probs.iter().map(|lp| (lp - norm).exp()).collect()
            })
            .collect();
        (total / data.len() as f64, resp)
    }

    fn m_step(&self, data: &[DVector<f64>], resp: &[Vec<f64>]) -> ModelResult<Vec<Component>> {
        let n = data.len() as f64;
        let d = data[0].len();
        (0..self.n_components)
            .map(|k| {
                let nk: f64 = resp.iter().map(|r| r[k]).sum::<f64>() + MIN_COMPONENT_WEIGHT;

                let mut mean: DVector<f64> = DVector::zeros(d);
                for (x, r) in data.iter().zip(resp) {
                    mean += x * r[k];
                }
                mean /= nk;

                let mut covariance: DMatrix<f64> = DMatrix::zeros(d, d);
                for (x, r) in data.iter().zip(resp) {
                    let diff = x - &mean;
                    covariance += (&diff * diff.transpose()) * r[k];
                }
                covariance /= nk;
                for i in 0..d {
                    covariance[(i, i)] += REG_COVAR;
                }

                Component::new(nk / n, mean, covariance)
            })
            .collect()
    }

    /// Hard cluster labels from k-means++ seeded Lloyd iterations
    fn kmeans_labels(&self, data: &[DVector<f64>]) -> Vec<usize> {
        let mut rng = StdRng::seed_from_u64(self.seed);
        let k = self.n_components;

        let mut centers: Vec<DVector<f64>> = Vec::with_capacity(k);
        centers.push(data[rng.gen_range(0..data.len())].clone());
        while centers.len() < k {
            let dists: Vec<f64> = data
                .iter()
                .map(|x| {
                    centers
                        .iter()
                        .map(|c| sq_dist(x, c))
                        .fold(f64::INFINITY, f64::min)
                })
                .collect();
            let total: f64 = dists.iter().sum();
            let next = if total > 0.0 {
                let mut target = rng.gen_range(0.0..total);
                let mut chosen = dists.len() - 1;
                for (i, dist) in dists.iter().enumerate() {
                    if target < *dist {
                        chosen = i;
                        break;
                    }
                    target -= dist;
                }
                chosen
            } else {
                rng.gen_range(0..data.len())
            };
            centers.push(data[next].clone());
        }

        let mut labels = vec![0usize; data.len()];
        for _ in 0..KMEANS_MAX_ITER {
            let mut changed = false;
            for (label, x) in labels.iter_mut().zip(data) {
                let nearest = centers
                    .iter()
                    .enumerate()
                    .map(|(i, c)| (i, sq_dist(x, c)))
                    .fold((0, f64::INFINITY), |best, cur| if cur.1 < best.1 { cur } else { best })
                    .0;
                if nearest != *label {
                    *label = nearest;
                    changed = true;
                }
            }

            for (j, center) in centers.iter_mut().enumerate() {
                let members: Vec<&DVector<f64>> = data
                    .iter()
                    .zip(&labels)
                    .filter(|(_, l)| **l == j)
                    .map(|(x, _)| x)
                    .collect();
                if members.is_empty() {
                    continue;
                }
                let mut sum: DVector<f64> = DVector::zeros(center.len());
                for x in &members {
                    sum += *x;
                }
                *center = sum / members.len() as f64;
            }

            if !changed {
                break;
            }
        }
        labels
    }
}
