//! Isolation Forest
//!
//! Random partition trees grown on subsamples. Points that are isolated in
//! few splits get a score `2^(-E[h(x)] / c(psi))` close to 1.

use rand::prelude::*;
use rand::seq::index;
use vigil_ports::{ModelError, ModelResult, OutlierModel, Vote};

use super::{check_rows, contamination_threshold};

/// Subsample size per tree
const MAX_SAMPLES: usize = 256;

const EULER_GAMMA: f64 = 0.577_215_664_901_532_9;

#[derive(Debug, Clone)]
enum IsolationNode {
    Internal {
        feature: usize,
        split: f64,
        left: Box<IsolationNode>,
        right: Box<IsolationNode>,
    },
    Leaf {
        size: usize,
    },
}

#[derive(Debug, Clone)]
struct IsolationTree {
    root: IsolationNode,
}

impl IsolationTree {
    fn grow(rows: &[Vec<f64>], indices: &[usize], max_depth: usize, rng: &mut StdRng) -> Self {
        Self {
            root: Self::grow_node(rows, indices, 0, max_depth, rng),
        }
    }

    fn grow_node(
        rows: &[Vec<f64>],
        indices: &[usize],
        depth: usize,
        max_depth: usize,
        rng: &mut StdRng,
    ) -> IsolationNode {
        if depth >= max_depth || indices.len() <= 1 {
            return IsolationNode::Leaf {
                size: indices.len(),
            };
        }

        // Try features in random order until one still has a spread
        let n_features = rows[indices[0]].len();
        let mut features: Vec<usize> = (0..n_features).collect();
        features.shuffle(rng);

        for feature in features {
            let (lo, hi) = indices
                .iter()
                .map(|&i| rows[i][feature])
                .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
                    (lo.min(v), hi.max(v))
                });
            let spread = hi - lo;
            if !spread.is_finite() || spread <= f64::EPSILON * hi.abs().max(1.0) {
                continue;
            }

            let split = rng.gen_range(lo..hi);
            let (left, right): (Vec<usize>, Vec<usize>) =
                indices.iter().partition(|&&i| rows[i][feature] < split);
            if left.is_empty() || right.is_empty() {
                continue;
            }

            return IsolationNode::Internal {
                feature,
                split,
                left: Box::new(Self::grow_node(rows, &left, depth + 1, max_depth, rng)),
                right: Box::new(Self::grow_node(rows, &right, depth + 1, max_depth, rng)),
            };
        }

        IsolationNode::Leaf {
            size: indices.len(),
        }
    }

    fn path_length(&self, row: &[f64]) -> f64 {
        let mut node = &self.root;
        let mut depth = 0usize;
        loop {
            match node {
                IsolationNode::Leaf { size } => return depth as f64 + average_path_length(*size),
                IsolationNode::Internal {
                    feature,
                    split,
                    left,
                    right,
                } => {
                    node = if row[*feature] < *split { left } else { right };
                    depth += 1;
                }
            }
        }
    }
}

/// Average path length of an unsuccessful BST search over `n` points
fn average_path_length(n: usize) -> f64 {
    match n {
        0 | 1 => 0.0,
        2 => 1.0,
        _ => {
            let n = n as f64;
            2.0 * ((n - 1.0).ln() + EULER_GAMMA) - 2.0 * (n - 1.0) / n
        }
    }
}

/// Isolation forest outlier model
#[derive(Debug, Clone)]
pub struct IsolationForest {
    n_estimators: usize,
    contamination: f64,
    seed: u64,
    trees: Vec<IsolationTree>,
    sample_size: usize,
    n_features: usize,
    threshold: Option<f64>,
}

impl IsolationForest {
    pub fn new(n_estimators: usize, contamination: f64, seed: u64) -> Self {
        Self {
            n_estimators: n_estimators.max(1),
            contamination,
            seed,
            trees: Vec::new(),
            sample_size: 0,
            n_features: 0,
            threshold: None,
        }
    }

    /// Anomaly score in (0, 1], higher is more anomalous
    pub fn score(&self, row: &[f64]) -> f64 {
        if self.trees.is_empty() {
            return 0.5;
        }
        let mean_depth = self.trees.iter().map(|t| t.path_length(row)).sum::<f64>()
            / self.trees.len() as f64;
        let c = average_path_length(self.sample_size);
        if c <= 0.0 {
            return 0.5;
        }
        2f64.powf(-mean_depth / c)
    }

    pub fn threshold(&self) -> Option<f64> {
        self.threshold
    }
}

impl OutlierModel for IsolationForest {
    fn fit(&mut self, rows: &[Vec<f64>]) -> ModelResult<()> {
        let n_features = check_rows(rows, None)?;
        let mut rng = StdRng::seed_from_u64(self.seed);
        let sample_size = MAX_SAMPLES.min(rows.len());
        let max_depth = ((sample_size.max(2) as f64).log2().ceil() as usize).max(1);

        let trees = (0..self.n_estimators)
            .map(|_| {
                let sample = index::sample(&mut rng, rows.len(), sample_size).into_vec();
                IsolationTree::grow(rows, &sample, max_depth, &mut rng)
            })
            .collect();

        self.trees = trees;
        self.sample_size = sample_size;
        self.n_features = n_features;

        let scores: Vec<f64> = rows.iter().map(|r| self.score(r)).collect();
        self.threshold = Some(contamination_threshold(&scores, self.contamination));
        Ok(())
    }

    fn predict(&self, rows: &[Vec<f64>]) -> ModelResult<Vec<Vote>> {
        let threshold = self.threshold.ok_or(ModelError::NotFitted)?;
        check_rows(rows, Some(self.n_features))?;
        Ok(rows
            .iter()
            .map(|r| {
                if self.score(r) > threshold {
                    Vote::Outlier
                } else {
                    Vote::Inlier
                }
            })
            .collect())
    }

    fn name(&self) -> &str {
        "IsolationForest"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn cluster_with_outlier() -> Vec<Vec<f64>> {
        let mut rows: Vec<Vec<f64>> = (0..100)
            .map(|i| vec![(i % 10) as f64 * 0.1, (i / 10) as f64 * 0.1])
            .collect();
        rows.push(vec![8.0, 8.0]);
        rows
    }

    #[test]
    fn test_average_path_length() {
        assert_eq!(average_path_length(1), 0.0);
        assert_eq!(average_path_length(2), 1.0);
        assert_relative_eq!(average_path_length(256), 10.24, epsilon = 0.01);
    }

    #[test]
    fn test_isolated_point_scores_highest() {
        let rows = cluster_with_outlier();
        let mut forest = IsolationForest::new(100, 0.1, 42);
        forest.fit(&rows).unwrap();

        let outlier = forest.score(&[8.0, 8.0]);
        let inlier = forest.score(&[0.45, 0.45]);
        assert!(outlier > inlier);
        assert!(outlier > 0.6);

        let votes = forest.predict(&[vec![8.0, 8.0], vec![0.45, 0.45]]).unwrap();
        assert_eq!(votes, vec![Vote::Outlier, Vote::Inlier]);
    }

    #[test]
    fn test_seeded_fit_is_deterministic() {
        let rows = cluster_with_outlier();
        let mut a = IsolationForest::new(50, 0.1, 7);
        let mut b = IsolationForest::new(50, 0.1, 7);
        a.fit(&rows).unwrap();
        b.fit(&rows).unwrap();
        assert_eq!(a.score(&[1.0, 1.0]), b.score(&[1.0, 1.0]));
    }

    #[test]
    fn test_predict_before_fit() {
        let forest = IsolationForest::new(10, 0.1, 42);
        assert_eq!(forest.predict(&[vec![1.0]]), Err(ModelError::NotFitted));
    }

    #[test]
    fn test_overflowing_range_is_rejected() {
        let rows: Vec<Vec<f64>> = (0..60)
            .map(|i| vec![if i % 2 == 0 { 1.7e308 } else { -1.7e308 }])
            .collect();
        let mut forest = IsolationForest::new(10, 0.1, 42);
        assert!(matches!(forest.fit(&rows), Err(ModelError::Degenerate(_))));
        assert!(forest.threshold().is_none());
    }

    #[test]
    fn test_unsplittable_spread_becomes_leaf() {
        let rows = vec![vec![1.7e308], vec![-1.7e308]];
        let mut rng = StdRng::seed_from_u64(1);
        let tree = IsolationTree::grow(&rows, &[0, 1], 4, &mut rng);
        assert!(matches!(tree.root, IsolationNode::Leaf { size: 2 }));
    }

    #[test]
    fn test_identical_rows_are_inliers() {
        let rows = vec![vec![0.0]; 50];
        let mut forest = IsolationForest::new(20, 0.1, 42);
        forest.fit(&rows).unwrap();
        let votes = forest.predict(&rows).unwrap();
        assert!(votes.iter().all(|v| *v == Vote::Inlier));
    }
}
