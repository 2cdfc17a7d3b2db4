//! Local Outlier Factor (novelty mode)
//!
//! The training set is kept as the reference population. A query row's LOF
//! is the mean local reachability density of its `k` nearest training
//! neighbours divided by its own; values well above 1 mark points sitting
//! in sparser regions than their neighbours.
//!
//! Every query scans the whole reference, so the reference is a seeded
//! subsample of at most [`MAX_REFERENCE_ROWS`] training rows.

use rand::prelude::*;
use vigil_ports::{ModelError, ModelResult, OutlierModel, Vote};

use super::{check_rows, contamination_threshold, subsample};

/// Training rows kept as the reference population
pub const MAX_REFERENCE_ROWS: usize = 2048;

/// Keeps reachability densities finite on duplicated points
const DENSITY_EPS: f64 = 1e-10;

#[derive(Debug, Clone)]
struct Reference {
    rows: Vec<Vec<f64>>,
    k_distance: Vec<f64>,
    lrd: Vec<f64>,
    k: usize,
    threshold: f64,
}

/// Local outlier factor model
#[derive(Debug, Clone)]
pub struct LocalOutlierFactor {
    n_neighbors: usize,
    contamination: f64,
    seed: u64,
    reference: Option<Reference>,
}

fn euclidean(a: &[f64], b: &[f64]) -> f64 {
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y).powi(2))
        .sum::<f64>()
        .sqrt()
}

/// `(index, distance)` of the `k` nearest rows, optionally skipping one index
fn nearest(rows: &[Vec<f64>], query: &[f64], k: usize, skip: Option<usize>) -> Vec<(usize, f64)> {
    let mut distances: Vec<(usize, f64)> = rows
        .iter()
        .enumerate()
        .filter(|(i, _)| Some(*i) != skip)
        .map(|(i, r)| (i, euclidean(query, r)))
        .collect();
    if k < distances.len() {
        distances.select_nth_unstable_by(k, |a, b| a.1.total_cmp(&b.1));
        distances.truncate(k);
    }
    distances.sort_by(|a, b| a.1.total_cmp(&b.1));
    distances
}

impl LocalOutlierFactor {
    pub fn new(n_neighbors: usize, contamination: f64, seed: u64) -> Self {
        Self {
            n_neighbors: n_neighbors.max(1),
            contamination,
            seed,
            reference: None,
        }
    }

    fn local_density(neighbors: &[(usize, f64)], k_distance: &[f64]) -> f64 {
        let mean_reach = neighbors
            .iter()
            .map(|&(j, d)| d.max(k_distance[j]))
            .sum::<f64>()
            / neighbors.len() as f64;
        1.0 / (mean_reach + DENSITY_EPS)
    }

    fn factor(neighbors: &[(usize, f64)], lrd: &[f64], own_lrd: f64) -> f64 {
        let mean_lrd =
            neighbors.iter().map(|&(j, _)| lrd[j]).sum::<f64>() / neighbors.len() as f64;
        mean_lrd / own_lrd
    }

    /// LOF of a query row against the fitted reference
    pub fn score(&self, row: &[f64]) -> Option<f64> {
        let reference = self.reference.as_ref()?;
        let neighbors = nearest(&reference.rows, row, reference.k, None);
        let own = Self::local_density(&neighbors, &reference.k_distance);
        Some(Self::factor(&neighbors, &reference.lrd, own))
    }
}

impl OutlierModel for LocalOutlierFactor {
    fn fit(&mut self, rows: &[Vec<f64>]) -> ModelResult<()> {
        check_rows(rows, None)?;
        if rows.len() < 2 {
            return Err(ModelError::InsufficientSamples {
                required: 2,
                found: rows.len(),
            });
        }
        let mut rng = StdRng::seed_from_u64(self.seed);
        let rows = subsample(rows, MAX_REFERENCE_ROWS, &mut rng);
        let k = self.n_neighbors.min(rows.len() - 1);

        let neighborhoods: Vec<Vec<(usize, f64)>> = rows
            .iter()
            .enumerate()
            .map(|(i, r)| nearest(&rows, r, k, Some(i)))
            .collect();
        let k_distance: Vec<f64> = neighborhoods
            .iter()
            .map(|n| n.last().map_or(0.0, |&(_, d)| d))
            .collect();
        let lrd: Vec<f64> = neighborhoods
            .iter()
            .map(|n| Self::local_density(n, &k_distance))
            .collect();
        let training_lof: Vec<f64> = neighborhoods
            .iter()
            .zip(&lrd)
            .map(|(n, &own)| Self::factor(n, &lrd, own))
            .collect();

        self.reference = Some(Reference {
            rows: rows.into_owned(),
            threshold: contamination_threshold(&training_lof, self.contamination),
            k_distance,
            lrd,
            k,
        });
        Ok(())
    }

    fn predict(&self, rows: &[Vec<f64>]) -> ModelResult<Vec<Vote>> {
        let reference = self.reference.as_ref().ok_or(ModelError::NotFitted)?;
        check_rows(rows, Some(reference.rows[0].len()))?;
        Ok(rows
            .iter()
            .map(|r| {
                let neighbors = nearest(&reference.rows, r, reference.k, None);
                let own = Self::local_density(&neighbors, &reference.k_distance);
                if Self::factor(&neighbors, &reference.lrd, own) > reference.threshold {
                    Vote::Outlier
                } else {
                    Vote::Inlier
                }
            })
            .collect())
    }

    fn name(&self) -> &str {
        "LocalOutlierFactor"
    }
}
