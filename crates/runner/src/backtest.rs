//! Regime backtest
//!
//! Fits the regime classifier on a generated regime-switching price path
//! and scores the classified path against the regimes that generated it.

use crate::synthetic::generate_regime_prices;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use vigil_core::RegimeLabel;
use vigil_monitor::{RegimeClassifier, RegimeConfig};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegimeBacktest {
    pub points: usize,
    pub fitted: bool,
    /// Feature rows classified
    pub windows: usize,
    /// Share of windows classified as the regime that generated their last price
    pub agreement: f64,
    /// Classified windows per regime name
    pub predicted: BTreeMap<String, usize>,
    /// Windows per generating regime name
    pub actual: BTreeMap<String, usize>,
}

impl RegimeBacktest {
    pub fn run(config: &RegimeConfig, n_points: usize, seed: Option<u64>) -> Self {
        let path = generate_regime_prices(n_points, seed);
        let mut classifier = RegimeClassifier::new(config.clone());
        let fitted = classifier.fit(&path.prices);
        if !fitted {
            warn!(
                "[BACKTEST] Regime classifier did not fit on {} prices",
                n_points
            );
        }

        let window = config.window;
        let classified = classifier.regime_path(&path.prices);
        let mut predicted = BTreeMap::new();
        let mut actual = BTreeMap::new();
        let mut matches = 0usize;
        for (row, assignment) in classified.iter().enumerate() {
            // row `i` ends at price index `i + window`
            let truth = path.regimes[row + window];
            *predicted.entry(assignment.label.name()).or_insert(0) += 1;
            *actual
                .entry(RegimeLabel::from_id(truth).name())
                .or_insert(0) += 1;
            if assignment.regime == truth {
                matches += 1;
            }
        }

        let windows = classified.len();
        let agreement = if windows == 0 {
            0.0
        } else {
            matches as f64 / windows as f64
        };
        info!(
            "[BACKTEST] {} windows classified, agreement {:.3}",
            windows, agreement
        );

        Self {
            points: n_points,
            fitted,
            windows,
            agreement,
            predicted,
            actual,
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

impl fmt::Display for RegimeBacktest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Vigil Regime Backtest ===")?;
        writeln!(f, "Prices generated: {}", self.points)?;
        if !self.fitted {
            return writeln!(f, "Classifier not fitted");
        }
        writeln!(f, "Windows classified: {}", self.windows)?;
        writeln!(f, "Agreement: {:.1}%", self.agreement * 100.0)?;
        writeln!(f)?;
        writeln!(f, "{:<18} {:>9} {:>9}", "Regime", "Actual", "Predicted")?;
        let mut names: Vec<&String> = self.actual.keys().chain(self.predicted.keys()).collect();
        names.sort();
        names.dedup();
        for name in names {
            writeln!(
                f,
                "{:<18} {:>9} {:>9}",
                name,
                self.actual.get(name).copied().unwrap_or(0),
                self.predicted.get(name).copied().unwrap_or(0)
            )?;
        }
        Ok(())
    }
}
