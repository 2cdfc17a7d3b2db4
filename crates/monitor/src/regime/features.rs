//! Rolling return features
//!
//! Each feature row describes `window` consecutive simple returns by their
//! mean, population std, skewness and excess kurtosis.

use vigil_core::stats;

pub const N_FEATURES: usize = 4;

/// Index of the volatility column in a feature row
pub const VOLATILITY: usize = 1;

/// Index of the mean-return column in a feature row
pub const MEAN_RETURN: usize = 0;

/// `(p_t - p_{t-1}) / p_{t-1}`, with non-finite returns replaced by 0
pub fn simple_returns(prices: &[f64]) -> Vec<f64> {
    prices
        .windows(2)
        .map(|w| {
            let r = (w[1] - w[0]) / w[0];
            if r.is_finite() { r } else { 0.0 }
        })
        .collect()
}

/// One row per full window of returns
///
/// Row `i` summarizes the returns ending at price index `i + window`. Fewer
/// than `window` prices yield no rows.
pub fn extract_features(prices: &[f64], window: usize) -> Vec<Vec<f64>> {
    if window == 0 || prices.len() < window {
        return Vec::new();
    }
    simple_returns(prices)
        .windows(window)
        .map(|w| {
            vec![
                stats::mean(w),
                stats::std_dev(w),
                stats::skewness(w),
                stats::excess_kurtosis(w),
            ]
        })
        .collect()
}
