//! Statistics
//!
//! Descriptive statistics follow the population (biased) conventions used by
//! the detectors: `std` divides by `n`, percentiles interpolate linearly
//! between closest ranks, skewness and kurtosis are moment ratios.

mod descriptive;
mod histogram;
mod scaler;

pub use descriptive::{
    argmax, excess_kurtosis, mean, median, median_abs_deviation, percentile, skewness, std_dev,
    variance,
};
pub use histogram::{histogram_counts, histogram_edges};
pub use scaler::StandardScaler;
