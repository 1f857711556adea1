//! Realized volatility and quarticity estimators.
//!
//! Each estimator reduces a ticker's price series to one scalar, which is
//! broadcast back to every row of that ticker.

use std::f64::consts::PI;

use blocks_core::config::{DEFAULT_PRICE_COL, DEFAULT_TICKER_COL};
use blocks_core::dataset::gather;
use blocks_core::{Dataset, Processor, Result};
use serde::{Deserialize, Serialize};
use statrs::function::gamma::gamma;

/// Sum of products over every complete window of `window` consecutive values.
fn rolling_product_sum(values: &[f64], window: usize) -> f64 {
    values
        .windows(window)
        .map(|w| w.iter().product::<f64>())
        .sum()
}

fn sum_of_powers(values: &[f64], exp: i32) -> f64 {
    values.iter().map(|v| v.powi(exp)).sum()
}

/// `Γ(1/2)³ / Γ(7/6)³`
fn tripower_constant() -> f64 {
    gamma(0.5).powi(3) / gamma(7.0 / 6.0).powi(3)
}

/// Square root of the sum of squares.
pub fn simple_realized_vol(series: &[f64]) -> f64 {
    sum_of_powers(series, 2).sqrt()
}

/// Realized volatility from fourth moments, `sqrt(Σx⁴ / (6Σx²))`.
pub fn realized_2(series: &[f64]) -> f64 {
    (sum_of_powers(series, 4) / (6.0 * sum_of_powers(series, 2))).sqrt()
}

/// Quad-power estimator, `sqrt(π² Σ|x₁x₂x₃x₄| / (8Σx²))`.
pub fn realized_3(series: &[f64]) -> f64 {
    let quad: f64 = series
        .windows(4)
        .map(|w| w.iter().product::<f64>().abs())
        .sum();
    (PI.powi(2) * quad / (8.0 * sum_of_powers(series, 2))).sqrt()
}

/// Tri-power estimator on `|x|^(4/3)`.
pub fn realized_4(series: &[f64]) -> f64 {
    let scaled: Vec<f64> = series.iter().map(|v| v.abs().powf(4.0 / 3.0)).collect();
    let numerator = gamma(0.5).powi(3) * rolling_product_sum(&scaled, 3);
    let denominator = 8.0 * gamma(7.0 / 6.0).powi(3) * sum_of_powers(series, 2);
    (numerator / denominator).sqrt()
}

/// Realized fourth-power variation, `n Σx⁴ / 3`.
pub fn realized_quarticity(series: &[f64]) -> f64 {
    sum_of_powers(series, 4) * series.len() as f64 / 3.0
}

/// Quad-power quarticity. More robust to jumps than [`realized_quarticity`].
pub fn quadpower_quarticity(series: &[f64]) -> f64 {
    let quad: f64 = series
        .windows(4)
        .map(|w| w.iter().product::<f64>().abs())
        .sum();
    quad * series.len() as f64 * PI.powi(2) / 4.0
}

/// Tri-power quarticity, `n/4 · Γ(1/2)³/Γ(7/6)³ · Σ|x₁x₂x₃|^(4/3)`.
pub fn tripower_quarticity(series: &[f64]) -> f64 {
    let scaled: Vec<f64> = series.iter().map(|v| v.abs().powf(4.0 / 3.0)).collect();
    series.len() as f64 * 0.25 * tripower_constant() * rolling_product_sum(&scaled, 3)
}

/// Ticker and price columns shared by the volatility processors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PriceColumns {
    pub ticker_col: String,
    pub price_col: String,
}

impl Default for PriceColumns {
    fn default() -> Self {
        Self {
            ticker_col: DEFAULT_TICKER_COL.to_string(),
            price_col: DEFAULT_PRICE_COL.to_string(),
        }
    }
}

impl PriceColumns {
    /// Evaluate each estimator once per ticker and broadcast over its rows.
    fn broadcast(
        &self,
        dataset: &Dataset,
        estimators: &[(&str, fn(&[f64]) -> f64)],
    ) -> Result<Dataset> {
        let prices = dataset.float_column(&self.price_col)?;
        let tickers = dataset.groups(&self.ticker_col)?;

        let mut output = dataset.clone();
        for (name, estimator) in estimators {
            let mut column = vec![f64::NAN; dataset.n_rows()];
            for ticker in &tickers {
                let value = estimator(&gather(prices, &ticker.rows));
                for &row in &ticker.rows {
                    column[row] = value;
                }
            }
            output.insert_column(*name, column)?;
        }
        Ok(output)
    }
}

/// Adds `feature_vol2`, `feature_vol3` and `feature_vol4`.
#[derive(Debug, Clone, Default)]
pub struct RealizedVolFeatures {
    columns: PriceColumns,
}

impl RealizedVolFeatures {
    /// Read prices and tickers from `columns`.
    pub fn new(columns: PriceColumns) -> Self {
        Self { columns }
    }
}

impl Processor for RealizedVolFeatures {
    fn name(&self) -> &str {
        "RealizedVolFeatures"
    }

    fn transform(&self, dataset: &Dataset) -> Result<Dataset> {
        self.columns.broadcast(
            dataset,
            &[
                ("feature_vol2", realized_2),
                ("feature_vol3", realized_3),
                ("feature_vol4", realized_4),
            ],
        )
    }
}

/// Adds `feature_quadpower_quarticity` and `feature_tripower_quarticity`.
#[derive(Debug, Clone, Default)]
pub struct QuarticityFeatures {
    columns: PriceColumns,
}

impl QuarticityFeatures {
    /// Read prices and tickers from `columns`.
    pub fn new(columns: PriceColumns) -> Self {
        Self { columns }
    }
}

impl Processor for QuarticityFeatures {
    fn name(&self) -> &str {
        "QuarticityFeatures"
    }

    fn transform(&self, dataset: &Dataset) -> Result<Dataset> {
        self.columns.broadcast(
            dataset,
            &[
                ("feature_quadpower_quarticity", quadpower_quarticity),
                ("feature_tripower_quarticity", tripower_quarticity),
            ],
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use blocks_core::Metadata;

    fn make_dataset() -> Dataset {
        Dataset::new(Metadata::default())
            .with_column("ticker", vec!["AAA", "BBB", "AAA", "BBB", "AAA", "AAA"])
            .unwrap()
            .with_column("Close", vec![1.0, 2.0, 2.0, 2.0, 1.0, 2.0])
            .unwrap()
    }

    #[test]
    fn test_simple_estimators() {
        let x = [1.0, 2.0, 1.0, 2.0];
        assert_relative_eq!(simple_realized_vol(&x), 10f64.sqrt());
        // Σx⁴ = 34, Σx² = 10
        assert_relative_eq!(realized_2(&x), (34.0 / 60.0f64).sqrt());
        assert_relative_eq!(realized_quarticity(&x), 34.0 * 4.0 / 3.0);
    }

    #[test]
    fn test_rolling_estimators_skip_partial_windows() {
        let x = [1.0, 2.0, 1.0, 2.0];
        // One full window of four: product 4
        assert_relative_eq!(realized_3(&x), (PI * PI * 4.0 / 80.0).sqrt(), epsilon = 1e-12);
        assert_relative_eq!(quadpower_quarticity(&x), 4.0 * 4.0 * PI * PI / 4.0, epsilon = 1e-9);
        // Too short for any window
        assert_eq!(quadpower_quarticity(&[1.0, 2.0]), 0.0);
    }

    #[test]
    fn test_tripower_uses_absolute_values() {
        let pos = [1.0, 2.0, 3.0];
        let neg = [-1.0, 2.0, -3.0];
        assert_relative_eq!(tripower_quarticity(&pos), tripower_quarticity(&neg), epsilon = 1e-9);
        assert!(tripower_quarticity(&neg) > 0.0);
        assert_relative_eq!(realized_4(&pos), realized_4(&neg), epsilon = 1e-12);
    }

    #[test]
    fn test_tripower_quarticity_single_window() {
        // One window of three ones
        let x = [1.0, 1.0, 1.0];
        assert_relative_eq!(tripower_quarticity(&x), 0.75 * tripower_constant(), epsilon = 1e-12);
    }

    #[test]
    fn test_realized_vol_broadcast_per_ticker() {
        let out = RealizedVolFeatures::default().transform(&make_dataset()).unwrap();
        let vol2 = out.float_column("feature_vol2").unwrap();
        // AAA prices 1, 2, 1, 2
        let aaa = realized_2(&[1.0, 2.0, 1.0, 2.0]);
        for row in [0, 2, 4, 5] {
            assert_relative_eq!(vol2[row], aaa);
        }
        let bbb = realized_2(&[2.0, 2.0]);
        assert_relative_eq!(vol2[1], bbb);
        assert_relative_eq!(vol2[3], bbb);
        assert!(out.has_column("feature_vol3"));
        assert!(out.has_column("feature_vol4"));
    }

    #[test]
    fn test_quarticity_features() {
        let out = QuarticityFeatures::default().transform(&make_dataset()).unwrap();
        let quad = out.float_column("feature_quadpower_quarticity").unwrap();
        assert_relative_eq!(quad[0], quadpower_quarticity(&[1.0, 2.0, 1.0, 2.0]));
        assert_eq!(quad[1], 0.0);
        assert!(out.has_column("feature_tripower_quarticity"));
    }

    #[test]
    fn test_missing_price_column() {
        let columns = PriceColumns {
            price_col: "Adj Close".into(),
            ..PriceColumns::default()
        };
        assert!(RealizedVolFeatures::new(columns).transform(&make_dataset()).is_err());
    }
}
