//! Classic feature neutralization.
//!
//! Within every era the prediction is gaussianized, then a `proportion` of its
//! projection onto the span of the neutralizer features is subtracted:
//!
//! `S' = S - proportion * E · pinv(E) · S`
//!
//! Each era is rescaled to unit standard deviation, the eras are reassembled
//! in original row order, and the whole column is min-max scaled to [0, 1].

use crate::exposure::{column_matrix, pseudo_inverse, require_finite};
use blocks_core::config::{is_prediction_name, DEFAULT_ERA_COL, DEFAULT_PRED_NAME};
use blocks_core::dataset::{gather, scatter};
use blocks_core::stats::{gaussianize, min_max_scale, std_dev};
use blocks_core::{Dataset, Error, Processor, Result};
use nalgebra::{DMatrix, DVector};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Feature neutralizer configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NeutralizerConfig {
    /// Columns to neutralize against. `None` uses every feature column.
    pub feature_names: Option<Vec<String>>,
    /// Prediction column to neutralize.
    pub pred_name: String,
    /// Era column.
    pub era_col: String,
    /// How much of the linear exposure to remove, in [0, 1].
    pub proportion: f64,
}

impl Default for NeutralizerConfig {
    fn default() -> Self {
        Self {
            feature_names: None,
            pred_name: DEFAULT_PRED_NAME.to_string(),
            era_col: DEFAULT_ERA_COL.to_string(),
            proportion: 0.5,
        }
    }
}

/// Per-era linear feature neutralization.
#[derive(Debug, Clone)]
pub struct FeatureNeutralizer {
    config: NeutralizerConfig,
    new_col_name: String,
}

impl FeatureNeutralizer {
    /// Create a neutralizer, validating the configuration.
    pub fn new(config: NeutralizerConfig) -> Result<Self> {
        if !(0.0..=1.0).contains(&config.proportion) {
            return Err(Error::configuration(format!(
                "'proportion' should be a float in range [0...1]. Got '{}'.",
                config.proportion
            )));
        }
        let new_col_name = format!("{}_neutralized_{:?}", config.pred_name, config.proportion);
        if !is_prediction_name(&new_col_name) {
            return Err(Error::configuration(format!(
                "final column name should start with 'prediction'. Got '{new_col_name}'."
            )));
        }
        if matches!(&config.feature_names, Some(names) if names.is_empty()) {
            return Err(Error::configuration("'feature_names' should not be empty"));
        }
        Ok(Self {
            config,
            new_col_name,
        })
    }

    /// Neutralizer with default columns and the given proportion.
    pub fn with_proportion(proportion: f64) -> Result<Self> {
        Self::new(NeutralizerConfig {
            proportion,
            ..NeutralizerConfig::default()
        })
    }

    /// Name of the column the neutralized prediction is written to.
    pub fn output_col(&self) -> &str {
        &self.new_col_name
    }

    /// Configuration in use.
    pub fn config(&self) -> &NeutralizerConfig {
        &self.config
    }

    /// Gaussianize one era's scores and remove their projection onto `exposures`.
    ///
    /// `exposures` holds the era's rows in the same order as `scores`. The
    /// result has unit sample standard deviation.
    pub fn neutralize_era(
        &self,
        scores: &[f64],
        exposures: &DMatrix<f64>,
    ) -> Result<Vec<f64>> {
        let s = DVector::from_vec(gaussianize(scores)?);
        let pinv = pseudo_inverse(exposures)?;
        let projection = exposures * (pinv * &s);
        let neutralized = s - projection * self.config.proportion;

        let std = std_dev(neutralized.as_slice(), 1);
        if !std.is_finite() || std == 0.0 {
            return Err(Error::numerical(format!(
                "neutralized scores have degenerate standard deviation ({std})"
            )));
        }
        Ok(neutralized.iter().map(|v| v / std).collect())
    }
}

impl Processor for FeatureNeutralizer {
    fn name(&self) -> &str {
        "FeatureNeutralizer"
    }

    fn transform(&self, dataset: &Dataset) -> Result<Dataset> {
        let feature_names = self
            .config
            .feature_names
            .clone()
            .unwrap_or_else(|| dataset.feature_cols());
        if feature_names.is_empty() {
            return Err(Error::precondition("no feature columns to neutralize against"));
        }

        let preds = dataset.float_column(&self.config.pred_name)?;
        let features = feature_names
            .iter()
            .map(|name| dataset.float_column(name))
            .collect::<Result<Vec<_>>>()?;
        let eras = dataset.era_groups(&self.config.era_col)?;

        let neutralized = eras
            .par_iter()
            .map(|era| {
                let scores = gather(preds, &era.rows);
                let exposures = column_matrix(&features, &era.rows);
                tracing::debug!(era = %era.label, rows = era.rows.len(), "neutralizing era");
                require_finite(&self.config.pred_name, &scores)
                    .and_then(|()| self.neutralize_era(&scores, &exposures))
                    .map_err(|e| e.in_era(&era.label))
            })
            .collect::<Result<Vec<_>>>()?;

        let mut column = vec![f64::NAN; dataset.n_rows()];
        for (era, values) in eras.iter().zip(&neutralized) {
            scatter(&mut column, &era.rows, values);
        }

        tracing::info!(
            pred = %self.config.pred_name,
            proportion = self.config.proportion,
            output = %self.new_col_name,
            eras = eras.len(),
            "neutralized prediction"
        );
        dataset
            .clone()
            .with_column(self.new_col_name.clone(), min_max_scale(&column))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exposure::exposures;
    use approx::assert_abs_diff_eq;
    use blocks_core::{ErrorKind, Metadata, Series};

    fn make_dataset() -> Dataset {
        Dataset::new(Metadata::default())
            .with_column("era", vec!["1", "1", "1", "1", "1", "2", "2", "2", "2", "2"])
            .unwrap()
            .with_column(
                "feature_a",
                vec![0.0, 0.25, 0.5, 0.75, 1.0, 1.0, 0.25, 0.75, 0.0, 0.5],
            )
            .unwrap()
            .with_column(
                "feature_b",
                vec![0.5, 0.0, 1.0, 0.25, 0.75, 0.25, 0.5, 0.0, 1.0, 0.75],
            )
            .unwrap()
            .with_column(
                "prediction",
                vec![0.1, 0.3, 0.45, 0.8, 0.9, 0.7, 0.2, 0.6, 0.15, 0.5],
            )
            .unwrap()
    }

    #[test]
    fn test_invalid_proportion() {
        for p in [-0.1, 1.1, f64::NAN] {
            let err = FeatureNeutralizer::with_proportion(p).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Configuration);
        }
    }

    #[test]
    fn test_invalid_pred_name() {
        let err = FeatureNeutralizer::new(NeutralizerConfig {
            pred_name: "score".into(),
            ..NeutralizerConfig::default()
        })
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }

    #[test]
    fn test_output_column_name() {
        let neutralizer = FeatureNeutralizer::with_proportion(0.5).unwrap();
        assert_eq!(neutralizer.output_col(), "prediction_neutralized_0.5");
        let neutralizer = FeatureNeutralizer::with_proportion(1.0).unwrap();
        assert_eq!(neutralizer.output_col(), "prediction_neutralized_1.0");
    }

    #[test]
    fn test_output_in_unit_interval() {
        let ds = make_dataset();
        let out = FeatureNeutralizer::with_proportion(0.5)
            .unwrap()
            .transform(&ds)
            .unwrap();
        let col = out.float_column("prediction_neutralized_0.5").unwrap();

        assert_eq!(col.len(), 10);
        assert!(col.iter().all(|v| (0.0..=1.0).contains(v)));
        assert_abs_diff_eq!(col.iter().cloned().fold(f64::INFINITY, f64::min), 0.0);
        assert_abs_diff_eq!(col.iter().cloned().fold(f64::NEG_INFINITY, f64::max), 1.0);
        // Input untouched
        assert!(!ds.has_column("prediction_neutralized_0.5"));
        assert_eq!(out.float_column("prediction").unwrap(), ds.float_column("prediction").unwrap());
    }

    #[test]
    fn test_zero_proportion_is_rescaled_gaussian_rank() {
        let scores = [0.1, 0.3, 0.45, 0.8, 0.9];
        let ds = Dataset::new(Metadata::default())
            .with_column("era", vec!["1"; 5])
            .unwrap()
            .with_column("feature_a", vec![0.0, 0.25, 0.5, 0.75, 1.0])
            .unwrap()
            .with_column("prediction", scores.to_vec())
            .unwrap();

        let out = FeatureNeutralizer::with_proportion(0.0)
            .unwrap()
            .transform(&ds)
            .unwrap();
        let expected = min_max_scale(&gaussianize(&scores).unwrap());
        let col = out.float_column("prediction_neutralized_0.0").unwrap();
        for (a, b) in col.iter().zip(&expected) {
            assert_abs_diff_eq!(a, b, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_full_proportion_removes_exposure() {
        let neutralizer = FeatureNeutralizer::with_proportion(1.0).unwrap();
        // Mean-zero columns, so orthogonality to E also means zero exposure
        let e = DMatrix::from_row_slice(
            6,
            2,
            &[-0.5, 0.2, -0.3, -0.4, -0.1, 0.1, 0.1, 0.3, 0.3, -0.5, 0.5, 0.3],
        );
        let scores = [0.3, 0.1, 0.8, 0.5, 0.9, 0.4];
        let out = neutralizer.neutralize_era(&scores, &e).unwrap();

        let exp = exposures(&e, &DVector::from_vec(out));
        for v in exp.iter() {
            assert_abs_diff_eq!(*v, 0.0, epsilon = 1e-8);
        }
    }

    #[test]
    fn test_era_rows_permutation_invariant() {
        let ds = make_dataset();
        let neutralizer = FeatureNeutralizer::with_proportion(0.7).unwrap();
        let out = neutralizer.transform(&ds).unwrap();
        let base = out.float_column(neutralizer.output_col()).unwrap().to_vec();

        // Reverse the rows of era "2" (rows 5..10)
        let perm: Vec<usize> = vec![0, 1, 2, 3, 4, 9, 8, 7, 6, 5];
        let mut permuted = Dataset::new(Metadata::default());
        for name in ["era", "feature_a", "feature_b", "prediction"] {
            let series = match ds.column(name).unwrap() {
                Series::Float(v) => Series::Float(perm.iter().map(|&i| v[i]).collect()),
                Series::Text(v) => Series::Text(perm.iter().map(|&i| v[i].clone()).collect()),
            };
            permuted.insert_column(name, series).unwrap();
        }
        let out = neutralizer.transform(&permuted).unwrap();
        let col = out.float_column(neutralizer.output_col()).unwrap();

        for (new_row, &old_row) in perm.iter().enumerate() {
            assert_abs_diff_eq!(col[new_row], base[old_row], epsilon = 1e-10);
        }
    }

    #[test]
    fn test_ties_follow_row_order() {
        let ds = Dataset::new(Metadata::default())
            .with_column("era", vec!["1"; 4])
            .unwrap()
            .with_column("feature_a", vec![0.1, 0.9, 0.4, 0.6])
            .unwrap()
            .with_column("prediction", vec![0.5, 0.5, 0.2, 0.8])
            .unwrap();
        let out = FeatureNeutralizer::with_proportion(0.0)
            .unwrap()
            .transform(&ds)
            .unwrap();
        let col = out.float_column("prediction_neutralized_0.0").unwrap();
        // Equal inputs, first one ranks lower
        assert!(col[0] < col[1]);
    }

    #[test]
    fn test_missing_feature_column() {
        let ds = make_dataset();
        let neutralizer = FeatureNeutralizer::new(NeutralizerConfig {
            feature_names: Some(vec!["feature_missing".into()]),
            ..NeutralizerConfig::default()
        })
        .unwrap();
        let err = neutralizer.transform(&ds).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Precondition);
    }

    #[test]
    fn test_single_row_era_is_numerical_error() {
        let ds = Dataset::new(Metadata::default())
            .with_column("era", vec!["1", "1", "2"])
            .unwrap()
            .with_column("feature_a", vec![0.1, 0.9, 0.4])
            .unwrap()
            .with_column("prediction", vec![0.5, 0.3, 0.2])
            .unwrap();
        let err = FeatureNeutralizer::with_proportion(0.5)
            .unwrap()
            .transform(&ds)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Numerical);
        assert!(err.to_string().contains("era '2'"));
    }

    #[test]
    fn test_nan_prediction_is_precondition_error() {
        let mut preds = make_dataset().float_column("prediction").unwrap().to_vec();
        preds[6] = f64::NAN;
        let ds = make_dataset().with_column("prediction", preds).unwrap();
        let err = FeatureNeutralizer::with_proportion(0.5)
            .unwrap()
            .transform(&ds)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Precondition);
        let msg = err.to_string();
        assert!(msg.contains("era '2'"), "{msg}");
        assert!(msg.contains("'prediction'"), "{msg}");
    }
}
