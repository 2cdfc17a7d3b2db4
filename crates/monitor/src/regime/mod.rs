//! Regime Classification
//!
//! Market regimes are inferred from rolling return moments:
//!
//! ```text
//! prices -> simple returns -> [mean, std, skew, kurtosis] per window
//!        -> standardize -> Gaussian mixture -> regime id
//! ```
//!
//! Mixture components come out of EM in arbitrary order. With
//! [`LabelAlignment::ByMoments`] each fit maps components onto the static
//! regime ids from their mean return and volatility, so regime 0 is always
//! the strongest uptrend and regime 3 the most volatile component.

mod features;
mod gmm;

pub use features::{N_FEATURES, extract_features, simple_returns};
pub use gmm::GaussianMixture;

use features::{MEAN_RETURN, VOLATILITY};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use vigil_core::{RegimeAssignment, StandardScaler, stats};

/// Feature rows required per regime before fitting
pub const MIN_ROWS_PER_REGIME: usize = 10;

/// Extra prices featurized beyond the window when classifying the tail
const DETECTION_SLACK: usize = 10;

const BULLISH: usize = 0;
const BEARISH: usize = 1;
const CONSOLIDATION: usize = 2;
const HIGH_VOLATILITY: usize = 3;

/// How mixture components map onto regime ids
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LabelAlignment {
    /// Derive the mapping from component return/volatility after every fit
    #[default]
    ByMoments,
    /// Regime id is the raw component index
    ComponentOrder,
}

/// Configuration for regime classification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegimeConfig {
    pub n_regimes: usize,
    /// Returns per feature window
    pub window: usize,
    pub label_alignment: LabelAlignment,
    /// Seed for mixture initialization
    pub seed: u64,
}

impl Default for RegimeConfig {
    fn default() -> Self {
        Self {
            n_regimes: 4,
            window: 20,
            label_alignment: LabelAlignment::ByMoments,
            seed: 42,
        }
    }
}

struct FittedRegimes {
    scaler: StandardScaler,
    mixture: GaussianMixture,
    /// `component_regime[k]` is the regime id of component `k`
    component_regime: Vec<usize>,
}

/// Gaussian-mixture regime classifier
pub struct RegimeClassifier {
    config: RegimeConfig,
    fitted: Option<FittedRegimes>,
}

impl RegimeClassifier {
    pub fn new(config: RegimeConfig) -> Self {
        Self {
            config,
            fitted: None,
        }
    }

    pub fn config(&self) -> &RegimeConfig {
        &self.config
    }

    /// Replace the config; the classifier must be fitted again
    pub fn reconfigure(&mut self, config: RegimeConfig) {
        self.config = config;
        self.fitted = None;
    }

    pub fn is_fitted(&self) -> bool {
        self.fitted.is_some()
    }

    /// Regime id of each mixture component
    #[cfg(test)]
    fn component_regimes(&self) -> Option<&[usize]> {
        self.fitted.as_ref().map(|f| f.component_regime.as_slice())
    }

    /// Fit on a price series
    ///
    /// Needs `n_regimes * 10` feature rows; returns `false` and keeps the
    /// previous fit otherwise.
    pub fn fit(&mut self, prices: &[f64]) -> bool {
        let rows = extract_features(prices, self.config.window);
        let required = self.config.n_regimes.max(1) * MIN_ROWS_PER_REGIME;
        if rows.len() < required {
            debug!(
                "[REGIME] Need {} feature rows to fit, got {}",
                required,
                rows.len()
            );
            return false;
        }

        let scaler = match StandardScaler::fit(&rows) {
            Ok(scaler) => scaler,
            Err(e) => {
                warn!("[REGIME] Scaler fit failed: {}", e);
                return false;
            }
        };
        let scaled = match scaler.transform(&rows) {
            Ok(scaled) => scaled,
            Err(e) => {
                warn!("[REGIME] Scaling failed: {}", e);
                return false;
            }
        };

        let mut mixture = GaussianMixture::new(self.config.n_regimes, self.config.seed);
        if let Err(e) = mixture.fit(&scaled) {
            warn!("[REGIME] Mixture fit failed: {}", e);
            return false;
        }

        let component_regime = match self.config.label_alignment {
            LabelAlignment::ComponentOrder => (0..mixture.n_components()).collect(),
            LabelAlignment::ByMoments => {
                let means: Vec<Vec<f64>> = mixture
                    .means()
                    .iter()
                    .filter_map(|m| scaler.inverse_transform_row(m).ok())
                    .collect();
                if means.len() != mixture.n_components() {
                    warn!("[REGIME] Component means could not be unscaled");
                    return false;
                }
                align_by_moments(&means)
            }
        };

        info!(
            "[REGIME] Fitted {} regimes on {} feature rows in {} EM iterations (converged: {}, component map {:?})",
            self.config.n_regimes,
            rows.len(),
            mixture.n_iter(),
            mixture.converged(),
            component_regime
        );
        self.fitted = Some(FittedRegimes {
            scaler,
            mixture,
            component_regime,
        });
        true
    }

    /// Classify the most recent window of `prices`
    ///
    /// `None` before a successful fit or with fewer than `window + 1` prices.
    pub fn detect_regime(&self, prices: &[f64]) -> Option<RegimeAssignment> {
        let fitted = self.fitted.as_ref()?;
        let window = self.config.window;
        if prices.len() < window + 1 {
            return None;
        }
        let start = prices.len().saturating_sub(window + DETECTION_SLACK);
        let rows = extract_features(&prices[start..], window);
        let last = rows.last()?;
        self.classify(fitted, last)
    }

    /// Classify every feature row of `prices`
    ///
    /// Entry `i` describes the returns ending at price index `i + window`.
    pub fn regime_path(&self, prices: &[f64]) -> Vec<RegimeAssignment> {
        let Some(fitted) = self.fitted.as_ref() else {
            return Vec::new();
        };
        extract_features(prices, self.config.window)
            .iter()
            .filter_map(|row| self.classify(fitted, row))
            .collect()
    }

    fn classify(&self, fitted: &FittedRegimes, row: &[f64]) -> Option<RegimeAssignment> {
        let scaled = fitted.scaler.transform_row(row).ok()?;
        let posterior = match fitted.mixture.predict_proba(&scaled) {
            Ok(p) => p,
            Err(e) => {
                debug!("[REGIME] Cannot classify row: {}", e);
                return None;
            }
        };

        let mut probabilities = vec![0.0; posterior.len()];
        for (component, p) in posterior.iter().enumerate() {
            probabilities[fitted.component_regime[component]] = *p;
        }
        let regime = stats::argmax(&probabilities)?;
        Some(RegimeAssignment::new(
            regime,
            probabilities[regime],
            probabilities,
        ))
    }
}

impl Default for RegimeClassifier {
    fn default() -> Self {
        Self::new(RegimeConfig::default())
    }
}

/// Map components to regime ids from their unscaled feature means
///
/// With four or more components: the most volatile is High Volatility, then
/// the highest mean return is Bullish, the lowest Bearish, the calmest of the
/// rest Consolidation, and any remainder gets ids from 4 up in order of mean
/// return. With fewer, components are ranked by mean return so the top one
/// is Bullish and the bottom one Bearish.
fn align_by_moments(means: &[Vec<f64>]) -> Vec<usize> {
    let k = means.len();
    let ret = |c: usize| means[c][MEAN_RETURN];
    let vol = |c: usize| means[c][VOLATILITY];

    let mut by_return: Vec<usize> = (0..k).collect();
    by_return.sort_by(|&a, &b| ret(b).total_cmp(&ret(a)));

    let mut mapping = vec![0usize; k];
    match k {
        0 => {}
        1 => mapping[by_return[0]] = BULLISH,
        2 => {
            mapping[by_return[0]] = BULLISH;
            mapping[by_return[1]] = BEARISH;
        }
        3 => {
            mapping[by_return[0]] = BULLISH;
            mapping[by_return[1]] = CONSOLIDATION;
            mapping[by_return[2]] = BEARISH;
        }
        _ => {
            let mut remaining: Vec<usize> = (0..k).collect();
            mapping[take_max(&mut remaining, vol)] = HIGH_VOLATILITY;
            mapping[take_max(&mut remaining, ret)] = BULLISH;
            mapping[take_max(&mut remaining, |c| -ret(c))] = BEARISH;
            mapping[take_max(&mut remaining, |c| -vol(c))] = CONSOLIDATION;

            remaining.sort_by(|&a, &b| ret(b).total_cmp(&ret(a)));
            for (offset, c) in remaining.into_iter().enumerate() {
                mapping[c] = HIGH_VOLATILITY + 1 + offset;
            }
        }
    }
    mapping
}

/// Remove and return the candidate with the largest key (first on ties)
fn take_max(candidates: &mut Vec<usize>, key: impl Fn(usize) -> f64) -> usize {
    let mut best = 0;
    for pos in 1..candidates.len() {
        if key(candidates[pos]) > key(candidates[best]) {
            best = pos;
        }
    }
    candidates.remove(best)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::prelude::*;
    use rand_distr::Normal;

    /// Calm block followed by a volatile block
    fn two_regime_prices() -> Vec<f64> {
        let mut rng = StdRng::seed_from_u64(7);
        let calm = Normal::new(0.0, 0.002).unwrap();
        let wild = Normal::new(0.0, 0.03).unwrap();
        let mut prices = vec![100.0];
        for i in 0..600 {
            let r = if i < 300 {
                calm.sample(&mut rng)
            } else {
                wild.sample(&mut rng)
            };
            let last = prices[prices.len() - 1];
            prices.push(last * (1.0 + r));
        }
        prices
    }

    fn two_regime_classifier() -> RegimeClassifier {
        RegimeClassifier::new(RegimeConfig {
            n_regimes: 2,
            ..Default::default()
        })
    }

    /// Returns per block in [`trend_and_wild_prices`]
    const BLOCK: usize = 200;

    /// Alternating steady-uptrend and high-volatility blocks, trend first
    fn trend_and_wild_prices() -> Vec<f64> {
        let mut rng = StdRng::seed_from_u64(19);
        let trend = Normal::new(0.01, 0.002).unwrap();
        let wild = Normal::new(0.0, 0.03).unwrap();
        let mut prices = vec![100.0];
        for step in 0..4 * BLOCK {
            let r = if (step / BLOCK) % 2 == 0 {
                trend.sample(&mut rng)
            } else {
                wild.sample(&mut rng)
            };
            let last = prices[prices.len() - 1];
            prices.push(last * (1.0 + r));
        }
        prices
    }

    #[test]
    fn test_four_regimes_align_trend_and_volatility() {
        let prices = trend_and_wild_prices();
        let mut classifier = RegimeClassifier::default();
        assert!(classifier.fit(&prices));

        let window = classifier.config().window;
        let path = classifier.regime_path(&prices);
        let mut confidence = Vec::new();
        let (mut trend_bullish, mut wild_volatile) = (false, false);
        for (row, assignment) in path.iter().enumerate() {
            let block = row / BLOCK;
            // only windows whose returns all come from one block
            if (row + window - 1) / BLOCK != block {
                continue;
            }
            confidence.push(assignment.confidence);
            if block % 2 == 0 {
                assert_ne!(assignment.regime, HIGH_VOLATILITY, "trend window {}", row);
                trend_bullish |= assignment.regime == BULLISH;
            } else {
                assert_ne!(assignment.regime, BULLISH, "volatile window {}", row);
                wild_volatile |= assignment.regime == HIGH_VOLATILITY;
            }
        }
        assert!(trend_bullish);
        assert!(wild_volatile);
        assert!(confidence.iter().sum::<f64>() / confidence.len() as f64 > 0.5);

        let deep_trend = classifier.detect_regime(&prices[..BLOCK * 3 - 50]).unwrap();
        assert!(deep_trend.confidence > 0.5);
        assert_ne!(deep_trend.regime, HIGH_VOLATILITY);
    }

    #[test]
    fn test_none_before_fit() {
        let classifier = RegimeClassifier::default();
        assert!(classifier.detect_regime(&two_regime_prices()).is_none());
        assert!(classifier.regime_path(&two_regime_prices()).is_empty());
    }

    #[test]
    fn test_fit_requires_enough_rows() {
        let mut classifier = RegimeClassifier::default();
        // 4 regimes need 40 rows -> 60 prices
        let prices: Vec<f64> = (0..55).map(|i| 100.0 + (i as f64 * 0.7).sin()).collect();
        assert!(!classifier.fit(&prices));
        assert!(!classifier.is_fitted());
    }

    #[test]
    fn test_blocks_get_distinct_confident_regimes() {
        let prices = two_regime_prices();
        let mut classifier = two_regime_classifier();
        assert!(classifier.fit(&prices));

        let calm = classifier.detect_regime(&prices[..200]).unwrap();
        let wild = classifier.detect_regime(&prices[..550]).unwrap();
        assert_ne!(calm.regime, wild.regime);
        assert!(calm.confidence > 0.5);
        assert!(wild.confidence > 0.5);
        assert_relative_eq!(calm.probabilities.iter().sum::<f64>(), 1.0, epsilon = 1e-9);
        assert_eq!(calm.confidence, calm.probabilities[calm.regime]);
    }

    #[test]
    fn test_short_series_is_none() {
        let prices = two_regime_prices();
        let mut classifier = two_regime_classifier();
        classifier.fit(&prices);
        assert!(classifier.detect_regime(&prices[..20]).is_none());
        assert!(classifier.detect_regime(&prices[..21]).is_some());
    }

    #[test]
    fn test_regime_path_covers_feature_rows() {
        let prices = two_regime_prices();
        let mut classifier = two_regime_classifier();
        classifier.fit(&prices);
        let path = classifier.regime_path(&prices);
        assert_eq!(path.len(), prices.len() - 20);
    }

    #[test]
    fn test_component_order_is_identity() {
        let prices = two_regime_prices();
        let mut classifier = RegimeClassifier::new(RegimeConfig {
            n_regimes: 2,
            label_alignment: LabelAlignment::ComponentOrder,
            ..Default::default()
        });
        classifier.fit(&prices);
        assert_eq!(classifier.component_regimes(), Some(&[0, 1][..]));
    }

    #[test]
    fn test_align_four_components() {
        // [mean return, volatility, skew, kurtosis]
        let means = vec![
            vec![0.000, 0.004, 0.0, 0.0], // calm
            vec![0.001, 0.010, 0.0, 0.0], // uptrend
            vec![0.000, 0.030, 0.0, 0.0], // volatile
            vec![-0.001, 0.015, 0.0, 0.0], // downtrend
        ];
        assert_eq!(align_by_moments(&means), vec![2, 0, 3, 1]);
    }

    #[test]
    fn test_align_extra_components() {
        let means = vec![
            vec![0.002, 0.010, 0.0, 0.0],
            vec![0.001, 0.011, 0.0, 0.0],
            vec![0.000, 0.050, 0.0, 0.0],
            vec![-0.002, 0.012, 0.0, 0.0],
            vec![0.0005, 0.003, 0.0, 0.0],
        ];
        // volatile=2, bull=0, bear=3, calm=4, leftover=1 -> id 4
        assert_eq!(align_by_moments(&means), vec![0, 4, 3, 1, 2]);
    }

    #[test]
    fn test_align_by_return_when_few_components() {
        let means = vec![vec![-0.001, 0.01], vec![0.002, 0.01], vec![0.0, 0.01]];
        assert_eq!(align_by_moments(&means), vec![1, 0, 2]);
        let means = vec![vec![-0.001, 0.01], vec![0.002, 0.01]];
        assert_eq!(align_by_moments(&means), vec![1, 0]);
    }
}
