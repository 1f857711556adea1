//! Row-wise ensembling of prediction columns.
//!
//! Every ensembler reads a list of source columns and writes one new
//! prediction column; the sources are left untouched.

use blocks_core::config::is_prediction_name;
use blocks_core::{Dataset, Error, Processor, Result};

/// Source columns and destination shared by all ensemblers.
#[derive(Debug, Clone)]
struct EnsembleColumns {
    cols: Vec<String>,
    final_col_name: String,
}

impl EnsembleColumns {
    fn new(cols: Vec<String>, final_col_name: String) -> Result<Self> {
        if cols.is_empty() {
            return Err(Error::configuration("ensembling needs at least one column"));
        }
        if !is_prediction_name(&final_col_name) {
            return Err(Error::configuration(format!(
                "final_col name should start with 'prediction'. Got '{final_col_name}'."
            )));
        }
        Ok(Self {
            cols,
            final_col_name,
        })
    }

    /// Combine each row's values with `combine` and store the result.
    fn apply<F>(&self, dataset: &Dataset, combine: F) -> Result<Dataset>
    where
        F: Fn(&[f64]) -> f64,
    {
        let sources = self
            .cols
            .iter()
            .map(|name| dataset.float_column(name))
            .collect::<Result<Vec<_>>>()?;

        let mut row = vec![0.0; sources.len()];
        let combined: Vec<f64> = (0..dataset.n_rows())
            .map(|i| {
                for (slot, col) in row.iter_mut().zip(&sources) {
                    *slot = col[i];
                }
                combine(&row)
            })
            .collect();

        dataset
            .clone()
            .with_column(self.final_col_name.clone(), combined)
    }
}

/// Simple mean of several columns. NaN values are skipped.
#[derive(Debug, Clone)]
pub struct MeanEnsembler {
    columns: EnsembleColumns,
}

impl MeanEnsembler {
    /// Average `cols` row-wise into `final_col_name`.
    ///
    /// Fails with a configuration error if `cols` is empty or
    /// `final_col_name` does not start with `prediction`.
    pub fn new(cols: Vec<String>, final_col_name: impl Into<String>) -> Result<Self> {
        Ok(Self {
            columns: EnsembleColumns::new(cols, final_col_name.into())?,
        })
    }
}

impl Processor for MeanEnsembler {
    fn name(&self) -> &str {
        "MeanEnsembler"
    }

    fn transform(&self, dataset: &Dataset) -> Result<Dataset> {
        let output = self.columns.apply(dataset, |row| {
            let (sum, count) = row
                .iter()
                .filter(|v| !v.is_nan())
                .fold((0.0, 0usize), |(s, c), v| (s + v, c + 1));
            if count == 0 {
                f64::NAN
            } else {
                sum / count as f64
            }
        })?;
        tracing::info!(
            cols = ?self.columns.cols,
            output = %self.columns.final_col_name,
            "ensembled with simple mean"
        );
        Ok(output)
    }
}

/// Weighted average after Donate et al.
///
/// With `n` columns the weights are `1 / 2^(n+1-j)` for `j = 1..n`, where the
/// first column reuses the weight of the second. Later columns weigh more, so
/// column order matters. For five columns: `[0.0625, 0.0625, 0.125, 0.25, 0.5]`.
#[derive(Debug, Clone)]
pub struct DonateWeightedEnsembler {
    columns: EnsembleColumns,
    weights: Vec<f64>,
}

impl DonateWeightedEnsembler {
    /// Weight `cols` by [`Self::donate_weights`], in the order given, into
    /// `final_col_name`.
    ///
    /// Fails with a configuration error if `cols` is empty or
    /// `final_col_name` does not start with `prediction`.
    pub fn new(cols: Vec<String>, final_col_name: impl Into<String>) -> Result<Self> {
        let weights = Self::donate_weights(cols.len());
        Ok(Self {
            columns: EnsembleColumns::new(cols, final_col_name.into())?,
            weights,
        })
    }

    /// Weight vector for `n` columns. Sums to one.
    pub fn donate_weights(n: usize) -> Vec<f64> {
        (1..=n)
            .map(|j| {
                let j = if j == 1 { 2 } else { j };
                1.0 / 2f64.powi((n + 1 - j) as i32)
            })
            .collect()
    }

    /// Weights in use, aligned with the column order.
    pub fn weights(&self) -> &[f64] {
        &self.weights
    }
}

impl Processor for DonateWeightedEnsembler {
    fn name(&self) -> &str {
        "DonateWeightedEnsembler"
    }

    fn transform(&self, dataset: &Dataset) -> Result<Dataset> {
        let total: f64 = self.weights.iter().sum();
        let output = self.columns.apply(dataset, |row| {
            row.iter().zip(&self.weights).map(|(v, w)| v * w).sum::<f64>() / total
        })?;
        tracing::info!(
            cols = ?self.columns.cols,
            output = %self.columns.final_col_name,
            "ensembled with DonateWeightedEnsembler"
        );
        Ok(output)
    }
}

/// Row-wise geometric mean.
///
/// Inputs must be strictly positive: a row containing a value `<= 0` (or NaN)
/// produces NaN rather than a misleading positive number.
#[derive(Debug, Clone)]
pub struct GeometricMeanEnsembler {
    columns: EnsembleColumns,
}

impl GeometricMeanEnsembler {
    /// Take the row-wise geometric mean of `cols` into `final_col_name`.
    ///
    /// Fails with a configuration error if `cols` is empty or
    /// `final_col_name` does not start with `prediction`.
    pub fn new(cols: Vec<String>, final_col_name: impl Into<String>) -> Result<Self> {
        Ok(Self {
            columns: EnsembleColumns::new(cols, final_col_name.into())?,
        })
    }
}

impl Processor for GeometricMeanEnsembler {
    fn name(&self) -> &str {
        "GeometricMeanEnsembler"
    }

    fn transform(&self, dataset: &Dataset) -> Result<Dataset> {
        let output = self.columns.apply(dataset, |row| {
            if row.iter().any(|v| !(*v > 0.0)) {
                return f64::NAN;
            }
            // Log space avoids overflow of the raw product
            let log_mean = row.iter().map(|v| v.ln()).sum::<f64>() / row.len() as f64;
            log_mean.exp()
        })?;
        tracing::info!(
            cols = ?self.columns.cols,
            output = %self.columns.final_col_name,
            "ensembled with GeometricMeanEnsembler"
        );
        Ok(output)
    }
}
