//! One-Class SVM
//!
//! Schölkopf's ν-formulation with an RBF kernel, trained by sequential
//! minimal optimization on the dual:
//!
//! ```text
//! min ½ αᵀQα   s.t.  0 ≤ αᵢ ≤ 1,  Σαᵢ = ν·n
//! ```
//!
//! The decision function is `f(x) = Σ αᵢ K(xᵢ, x) − ρ`; rows with
//! `f(x) < 0` fall outside the learned support and are outliers.
//!
//! The kernel matrix is dense, so training uses a seeded subsample of at
//! most [`MAX_TRAIN_ROWS`] rows.

use log::{debug, warn};
use rand::prelude::*;
use vigil_ports::{ModelError, ModelResult, OutlierModel, Vote};

use super::{check_rows, subsample};

/// Training rows kept for the kernel matrix
pub const MAX_TRAIN_ROWS: usize = 1024;

/// KKT violation tolerance
const TOLERANCE: f64 = 1e-3;

/// Floor for the second-order step denominator
const TAU: f64 = 1e-12;

#[derive(Debug, Clone)]
struct SupportVectors {
    rows: Vec<Vec<f64>>,
    alpha: Vec<f64>,
    rho: f64,
    gamma: f64,
}

/// One-class support vector machine outlier model
#[derive(Debug, Clone)]
pub struct OneClassSvm {
    nu: f64,
    seed: u64,
    fitted: Option<SupportVectors>,
}

fn rbf(a: &[f64], b: &[f64], gamma: f64) -> f64 {
    let sq: f64 = a.iter().zip(b).map(|(x, y)| (x - y).powi(2)).sum();
    (-gamma * sq).exp()
}

impl OneClassSvm {
    /// `nu` bounds the fraction of training rows left outside the support
    pub fn new(nu: f64, seed: u64) -> Self {
        Self {
            nu,
            seed,
            fitted: None,
        }
    }

    pub fn decision_function(&self, row: &[f64]) -> Option<f64> {
        let sv = self.fitted.as_ref()?;
        let sum: f64 = sv
            .rows
            .iter()
            .zip(&sv.alpha)
            .map(|(x, a)| a * rbf(x, row, sv.gamma))
            .sum();
        Some(sum - sv.rho)
    }

    pub fn n_support(&self) -> usize {
        self.fitted.as_ref().map_or(0, |sv| sv.rows.len())
    }
}

/// Dual solver state
struct Solver {
    q: Vec<Vec<f64>>,
    alpha: Vec<f64>,
    gradient: Vec<f64>,
}

impl Solver {
    fn new(q: Vec<Vec<f64>>, nu: f64) -> Self {
        let n = q.len();
        let total = nu * n as f64;
        let n_full = (total.floor() as usize).min(n);
        let mut alpha = vec![0.0; n];
        alpha.iter_mut().take(n_full).for_each(|a| *a = 1.0);
        if n_full < n {
            alpha[n_full] = total - n_full as f64;
        }

        let gradient = (0..n)
            .map(|i| (0..n).map(|j| q[i][j] * alpha[j]).sum())
            .collect();

        Self { q, alpha, gradient }
    }

    /// Maximal violating pair with second-order selection of the partner
    fn select_working_set(&self) -> Option<(usize, usize)> {
        let n = self.alpha.len();
        let mut g_max = f64::NEG_INFINITY;
        let mut i_sel = None;
        for t in 0..n {
            if self.alpha[t] < 1.0 && -self.gradient[t] >= g_max {
                g_max = -self.gradient[t];
                i_sel = Some(t);
            }
        }
        let i = i_sel?;

        let mut g_min = f64::INFINITY;
        let mut obj_min = f64::INFINITY;
        let mut j_sel = None;
        for t in 0..n {
            if self.alpha[t] <= 0.0 {
                continue;
            }
            g_min = g_min.min(-self.gradient[t]);
            let b = g_max + self.gradient[t];
            if b > 0.0 {
                let a = (self.q[i][i] + self.q[t][t] - 2.0 * self.q[i][t]).max(TAU);
                let obj = -(b * b) / a;
                if obj <= obj_min {
                    obj_min = obj;
                    j_sel = Some(t);
                }
            }
        }

        if g_max - g_min < TOLERANCE {
            return None;
        }
        j_sel.map(|j| (i, j))
    }

    fn update_pair(&mut self, i: usize, j: usize) {
        let quad = (self.q[i][i] + self.q[j][j] - 2.0 * self.q[i][j]).max(TAU);
        let delta = (self.gradient[i] - self.gradient[j]) / quad;
        let old_i = self.alpha[i];
        let old_j = self.alpha[j];
        let sum = old_i + old_j;

        let mut ai = old_i - delta;
        let mut aj = old_j + delta;
        if sum > 1.0 {
            if ai > 1.0 {
                ai = 1.0;
                aj = sum - 1.0;
            }
        } else if aj < 0.0 {
            aj = 0.0;
            ai = sum;
        }
        if sum > 1.0 {
            if aj > 1.0 {
                aj = 1.0;
                ai = sum - 1.0;
            }
        } else if ai < 0.0 {
            ai = 0.0;
            aj = sum;
        }

        self.alpha[i] = ai;
        self.alpha[j] = aj;
        let di = ai - old_i;
        let dj = aj - old_j;
        for (t, g) in self.gradient.iter_mut().enumerate() {
            *g += self.q[t][i] * di + self.q[t][j] * dj;
        }
    }

    /// Offset from the free support vectors, midpoint of the bounds otherwise
    fn rho(&self) -> f64 {
        let mut upper = f64::INFINITY;
        let mut lower = f64::NEG_INFINITY;
        let mut free_sum = 0.0;
        let mut n_free = 0usize;
        for (a, g) in self.alpha.iter().zip(&self.gradient) {
            if *a >= 1.0 {
                lower = lower.max(*g);
            } else if *a <= 0.0 {
                upper = upper.min(*g);
            } else {
                free_sum += g;
                n_free += 1;
            }
        }
        if n_free > 0 {
            free_sum / n_free as f64
        } else {
            (upper + lower) / 2.0
        }
    }
}

impl OutlierModel for OneClassSvm {
    fn fit(&mut self, rows: &[Vec<f64>]) -> ModelResult<()> {
        let d = check_rows(rows, None)?;
        if !(self.nu > 0.0 && self.nu <= 1.0) {
            return Err(ModelError::Degenerate(format!(
                "nu must lie in (0, 1], got {}",
                self.nu
            )));
        }
        let mut rng = StdRng::seed_from_u64(self.seed);
        let rows = subsample(rows, MAX_TRAIN_ROWS, &mut rng);
        let n = rows.len();
        let gamma = 1.0 / d as f64;

        let q: Vec<Vec<f64>> = rows
            .iter()
            .map(|a| rows.iter().map(|b| rbf(a, b, gamma)).collect())
            .collect();
        let mut solver = Solver::new(q, self.nu);

        let max_iter = (100 * n).max(10_000);
        let mut iterations = 0;
        while let Some((i, j)) = solver.select_working_set() {
            solver.update_pair(i, j);
            iterations += 1;
            if iterations >= max_iter {
                warn!("[OCSVM] Reached {} iterations without converging", max_iter);
                break;
            }
        }

        let rho = solver.rho();
        if !rho.is_finite() {
            return Err(ModelError::Degenerate("offset is not finite".to_string()));
        }

        let (sv_rows, alpha): (Vec<Vec<f64>>, Vec<f64>) = rows
            .iter()
            .zip(&solver.alpha)
            .filter(|(_, a)| **a > 0.0)
            .map(|(r, a)| (r.clone(), *a))
            .unzip();
        debug!(
            "[OCSVM] Converged after {} iterations with {} support vectors",
            iterations,
            sv_rows.len()
        );

        self.fitted = Some(SupportVectors {
            rows: sv_rows,
            alpha,
            rho,
            gamma,
        });
        Ok(())
    }

    fn predict(&self, rows: &[Vec<f64>]) -> ModelResult<Vec<Vote>> {
        let sv = self.fitted.as_ref().ok_or(ModelError::NotFitted)?;
        if let Some(first) = sv.rows.first() {
            check_rows(rows, Some(first.len()))?;
        }
        Ok(rows
            .iter()
            .map(|r| {
                let f = sv
                    .rows
                    .iter()
                    .zip(&sv.alpha)
                    .map(|(x, a)| a * rbf(x, r, sv.gamma))
                    .sum::<f64>()
                    - sv.rho;
                if f < 0.0 { Vote::Outlier } else { Vote::Inlier }
            })
            .collect())
    }

    fn name(&self) -> &str {
        "OneClassSvm"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::time::{Duration, Instant};

    fn ring_cluster() -> Vec<Vec<f64>> {
        (0..80)
            .map(|i| {
                let angle = i as f64 * 0.3;
                let radius = 0.2 + 0.01 * (i % 7) as f64;
                vec![radius * angle.cos(), radius * angle.sin()]
            })
            .collect()
    }

    #[test]
    fn test_far_point_is_outlier() {
        let mut model = OneClassSvm::new(0.1, 42);
        model.fit(&ring_cluster()).unwrap();
        assert!(model.n_support() > 0);

        let far = model.decision_function(&[5.0, 5.0]).unwrap();
        let near = model.decision_function(&[0.0, 0.0]).unwrap();
        assert!(far < 0.0);
        assert!(near > far);

        let votes = model.predict(&[vec![5.0, 5.0]]).unwrap();
        assert_eq!(votes, vec![Vote::Outlier]);
    }

    #[test]
    fn test_dual_constraint_holds() {
        let rows = ring_cluster();
        let mut model = OneClassSvm::new(0.1, 42);
        model.fit(&rows).unwrap();
        let sv = model.fitted.as_ref().unwrap();
        let total: f64 = sv.alpha.iter().sum();
        assert_relative_eq!(total, 0.1 * rows.len() as f64, epsilon = 1e-9);
        assert!(sv.alpha.iter().all(|a| *a > 0.0 && *a <= 1.0));
    }

    #[test]
    fn test_identical_rows_converge_immediately() {
        let rows = vec![vec![0.0]; 50];
        let mut model = OneClassSvm::new(0.1, 42);
        model.fit(&rows).unwrap();
        assert_eq!(model.predict(&rows).unwrap().len(), 50);
    }

    #[test]
    fn test_large_batch_trains_on_capped_subsample() {
        let rows: Vec<Vec<f64>> = (0..20_000)
            .map(|i| {
                let angle = i as f64 * 0.37;
                vec![angle.cos(), angle.sin() * 0.5]
            })
            .collect();
        let mut model = OneClassSvm::new(0.1, 42);
        let started = Instant::now();
        model.fit(&rows).unwrap();
        assert!(started.elapsed() < Duration::from_secs(60));

        assert!(model.n_support() > 0);
        assert!(model.n_support() <= MAX_TRAIN_ROWS);
        let total: f64 = model.fitted.as_ref().unwrap().alpha.iter().sum();
        assert_relative_eq!(total, 0.1 * MAX_TRAIN_ROWS as f64, epsilon = 1e-6);
        assert_eq!(model.predict(&[vec![6.0, 6.0]]).unwrap(), vec![Vote::Outlier]);
    }

    #[test]
    fn test_invalid_nu() {
        let mut model = OneClassSvm::new(0.0, 42);
        assert!(matches!(
            model.fit(&[vec![0.0], vec![1.0]]),
            Err(ModelError::Degenerate(_))
        ));
    }
}
