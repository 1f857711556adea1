//! Uniform standardization of prediction columns.

use blocks_core::dataset::{gather, scatter};
use blocks_core::stats::rank_pct_average;
use blocks_core::{Dataset, Error, Processor, Result};

/// Replaces each column by its per-era percentile rank.
///
/// All values must lie in [0, 1]. Ties get the average rank.
#[derive(Debug, Clone, Default)]
pub struct Standardizer {
    cols: Option<Vec<String>>,
}

impl Standardizer {
    /// Standardize every prediction column.
    pub fn new() -> Self {
        Self::default()
    }

    /// Standardize only the given columns.
    pub fn with_columns(cols: Vec<String>) -> Result<Self> {
        if cols.is_empty() {
            return Err(Error::configuration("Standardizer needs at least one column"));
        }
        Ok(Self { cols: Some(cols) })
    }

    fn check_range(name: &str, values: &[f64]) -> Result<()> {
        match values.iter().find(|v| !(0.0..=1.0).contains(*v)) {
            Some(&value) => Err(Error::ValueOutOfRange {
                column: name.to_string(),
                value,
                low: 0.0,
                high: 1.0,
            }),
            None => Ok(()),
        }
    }
}

impl Processor for Standardizer {
    fn name(&self) -> &str {
        "Standardizer"
    }

    fn transform(&self, dataset: &Dataset) -> Result<Dataset> {
        let cols = self.cols.clone().unwrap_or_else(|| dataset.prediction_cols());

        let mut inputs = Vec::with_capacity(cols.len());
        for name in &cols {
            let values = dataset.float_column(name)?;
            Self::check_range(name, values)?;
            inputs.push(values);
        }

        let eras = dataset.era_groups(dataset.era_col())?;
        let mut output = dataset.clone();
        for (name, values) in cols.iter().zip(inputs) {
            let mut ranked = vec![f64::NAN; values.len()];
            for era in &eras {
                scatter(&mut ranked, &era.rows, &rank_pct_average(&gather(values, &era.rows)));
            }
            output.insert_column(name.clone(), ranked)?;
        }
        Ok(output)
    }
}
