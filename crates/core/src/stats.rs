//! Cross-sectional statistics shared by processors.
//!
//! Ranks here are 1-based, matching the usual statistical convention.

use crate::error::{Error, Result};
use ordered_float::OrderedFloat;
use statrs::distribution::{ContinuousCDF, Normal};

/// Indices of `values` sorted ascending; equal values keep their original order.
fn stable_order(values: &[f64]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by_key(|&i| OrderedFloat(values[i]));
    order
}

/// Ordinal ranks with ties broken by first occurrence.
pub fn rank_first(values: &[f64]) -> Vec<f64> {
    let mut ranks = vec![0.0; values.len()];
    for (pos, idx) in stable_order(values).into_iter().enumerate() {
        ranks[idx] = (pos + 1) as f64;
    }
    ranks
}

/// Average ranks divided by the number of values, in (0, 1].
pub fn rank_pct_average(values: &[f64]) -> Vec<f64> {
    let n = values.len();
    let order = stable_order(values);
    let mut ranks = vec![0.0; n];

    let mut start = 0;
    while start < n {
        let mut end = start + 1;
        while end < n && values[order[end]] == values[order[start]] {
            end += 1;
        }
        // Positions start..end share the mean of ranks start+1..=end
        let avg = (start + 1 + end) as f64 / 2.0;
        for &idx in &order[start..end] {
            ranks[idx] = avg / n as f64;
        }
        start = end;
    }
    ranks
}

/// Map first-ordered ranks to `(rank - 0.5) / n`.
pub fn uniform_ranks(values: &[f64]) -> Vec<f64> {
    let n = values.len() as f64;
    rank_first(values).into_iter().map(|r| (r - 0.5) / n).collect()
}

/// Rank values, map them into (0, 1) and through the inverse normal CDF.
pub fn gaussianize(values: &[f64]) -> Result<Vec<f64>> {
    let normal = standard_normal()?;
    Ok(uniform_ranks(values)
        .into_iter()
        .map(|p| normal.inverse_cdf(p))
        .collect())
}

fn standard_normal() -> Result<Normal> {
    Normal::new(0.0, 1.0).map_err(|e| Error::numerical(format!("standard normal: {e}")))
}

/// Arithmetic mean. NaN for empty input.
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Standard deviation with `ddof` delta degrees of freedom.
///
/// Returns NaN when there are not more than `ddof` values.
pub fn std_dev(values: &[f64], ddof: usize) -> f64 {
    let n = values.len();
    if n <= ddof {
        return f64::NAN;
    }
    let m = mean(values);
    let ss: f64 = values.iter().map(|v| (v - m) * (v - m)).sum();
    (ss / (n - ddof) as f64).sqrt()
}

/// Bias-corrected sample skewness (adjusted Fisher-Pearson).
///
/// NaN for fewer than three values; zero when all values are equal.
pub fn skewness(values: &[f64]) -> f64 {
    let n = values.len();
    if n < 3 {
        return f64::NAN;
    }
    let nf = n as f64;
    let m = mean(values);
    let m2: f64 = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / nf;
    let m3: f64 = values.iter().map(|v| (v - m).powi(3)).sum::<f64>() / nf;
    if m2 == 0.0 {
        return 0.0;
    }
    let g1 = m3 / m2.powf(1.5);
    (nf * (nf - 1.0)).sqrt() / (nf - 2.0) * g1
}

/// Rescale to [0, 1] by `(x - min) / (max - min)`.
///
/// A constant input maps to all zeros. NaN values are ignored for the bounds
/// and stay NaN.
pub fn min_max_scale(values: &[f64]) -> Vec<f64> {
    let (min, max) = values
        .iter()
        .filter(|v| !v.is_nan())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        });
    let range = max - min;
    let scale = if range > 0.0 { range } else { 1.0 };
    values.iter().map(|v| (v - min) / scale).collect()
}
