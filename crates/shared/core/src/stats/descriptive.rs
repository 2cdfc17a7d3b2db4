//! Descriptive statistics over `f64` slices
//!
//! Empty input yields 0.0 rather than NaN so callers can treat it as a
//! neutral measurement.

/// Arithmetic mean
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population variance
pub fn variance(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let m = mean(values);
    values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64
}

/// Population standard deviation
pub fn std_dev(values: &[f64]) -> f64 {
    variance(values).sqrt()
}

/// Percentile `q` in [0, 100] with linear interpolation between closest ranks
pub fn percentile(values: &[f64], q: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    percentile_of_sorted(&sorted, q)
}

fn percentile_of_sorted(sorted: &[f64], q: f64) -> f64 {
    let n = sorted.len();
    if n == 1 {
        return sorted[0];
    }
    let rank = (q.clamp(0.0, 100.0) / 100.0) * (n - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    let frac = rank - lower as f64;
    sorted[lower] + (sorted[upper] - sorted[lower]) * frac
}

pub fn median(values: &[f64]) -> f64 {
    percentile(values, 50.0)
}

/// Median absolute deviation from the median (unscaled)
pub fn median_abs_deviation(values: &[f64]) -> f64 {
    let med = median(values);
    let deviations: Vec<f64> = values.iter().map(|v| (v - med).abs()).collect();
    median(&deviations)
}

/// Biased sample skewness `m3 / m2^1.5`; 0.0 for constant input
pub fn skewness(values: &[f64]) -> f64 {
    let (m2, m3, _) = central_moments(values);
    if m2 <= f64::EPSILON * f64::EPSILON {
        return 0.0;
    }
    m3 / m2.powf(1.5)
}

/// Biased excess (Fisher) kurtosis `m4 / m2^2 - 3`; 0.0 for constant input
pub fn excess_kurtosis(values: &[f64]) -> f64 {
    let (m2, _, m4) = central_moments(values);
    if m2 <= f64::EPSILON * f64::EPSILON {
        return 0.0;
    }
    m4 / (m2 * m2) - 3.0
}

fn central_moments(values: &[f64]) -> (f64, f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0, 0.0);
    }
    let n = values.len() as f64;
    let m = mean(values);
    let (mut m2, mut m3, mut m4) = (0.0, 0.0, 0.0);
    for v in values {
        let d = v - m;
        let d2 = d * d;
        m2 += d2;
        m3 += d2 * d;
        m4 += d2 * d2;
    }
    (m2 / n, m3 / n, m4 / n)
}

/// Index of the largest value (first on ties)
pub fn argmax(values: &[f64]) -> Option<usize> {
    values
        .iter()
        .enumerate()
        .fold(None, |best: Option<(usize, f64)>, (i, &v)| match best {
            Some((_, bv)) if bv >= v => best,
            _ => Some((i, v)),
        })
        .map(|(i, _)| i)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_mean_and_population_std() {
        let data = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        assert_relative_eq!(mean(&data), 5.0);
        assert_relative_eq!(std_dev(&data), 2.0);
    }

    #[test]
    fn test_percentile_interpolates() {
        let data = [1.0, 2.0, 3.0, 4.0];
        assert_relative_eq!(percentile(&data, 25.0), 1.75);
        assert_relative_eq!(percentile(&data, 75.0), 3.25);
        assert_relative_eq!(median(&data), 2.5);
        assert_relative_eq!(percentile(&data, 0.0), 1.0);
        assert_relative_eq!(percentile(&data, 100.0), 4.0);
    }

    #[test]
    fn test_mad() {
        let data = [1.0, 1.0, 2.0, 2.0, 4.0, 6.0, 9.0];
        // median 2, deviations [1,1,0,0,2,4,7] -> median 1
        assert_relative_eq!(median_abs_deviation(&data), 1.0);
    }

    #[test]
    fn test_constant_moments_are_neutral() {
        let data = [3.0; 20];
        assert_eq!(skewness(&data), 0.0);
        assert_eq!(excess_kurtosis(&data), 0.0);
        assert_eq!(std_dev(&data), 0.0);
    }

    #[test]
    fn test_skew_sign() {
        let right_tail = [1.0, 1.0, 1.0, 1.0, 10.0];
        assert!(skewness(&right_tail) > 0.0);
        let left_tail = [10.0, 10.0, 10.0, 10.0, 1.0];
        assert!(skewness(&left_tail) < 0.0);
    }

    #[test]
    fn test_empty_is_neutral() {
        assert_eq!(mean(&[]), 0.0);
        assert_eq!(percentile(&[], 50.0), 0.0);
        assert_eq!(argmax(&[]), None);
    }

    #[test]
    fn test_argmax() {
        assert_eq!(argmax(&[0.1, 0.7, 0.2]), Some(1));
        assert_eq!(argmax(&[0.5, 0.5]), Some(0));
    }
}
