//! Equal-width histograms
//!
//! Bins are half-open `[e_i, e_{i+1})` except the last, which also includes
//! its right edge. Values outside the edges are not counted.

/// `bins + 1` equally spaced edges spanning the finite values
///
/// A constant sample gets the range `[v - 0.5, v + 0.5]`. Returns `None`
/// when there are no finite values or `bins` is zero.
pub fn histogram_edges(values: &[f64], bins: usize) -> Option<Vec<f64>> {
    if bins == 0 {
        return None;
    }
    let mut finite = values.iter().copied().filter(|v| v.is_finite());
    let first = finite.next()?;
    let (mut lo, mut hi) = finite.fold((first, first), |(lo, hi), v| (lo.min(v), hi.max(v)));
    if lo == hi {
        lo -= 0.5;
        hi += 0.5;
    }
    let width = hi - lo;
    let mut edges: Vec<f64> = (0..=bins)
        .map(|i| lo + width * i as f64 / bins as f64)
        .collect();
    edges[bins] = hi;
    Some(edges)
}

/// Count values into the bins described by `edges`
pub fn histogram_counts(values: &[f64], edges: &[f64]) -> Vec<usize> {
    if edges.len() < 2 {
        return Vec::new();
    }
    let bins = edges.len() - 1;
    let (lo, hi) = (edges[0], edges[bins]);
    let mut counts = vec![0usize; bins];
    for &v in values {
        if !v.is_finite() || v < lo || v > hi {
            continue;
        }
        let idx = edges.partition_point(|e| *e <= v).saturating_sub(1).min(bins - 1);
        counts[idx] += 1;
    }
    counts
}
