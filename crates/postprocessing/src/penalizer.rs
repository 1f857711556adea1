//! Feature penalization.
//!
//! Instead of projecting exposure away in closed form, the penalizer trains a
//! bias-free linear model `F·w` on the centred risky features so that the
//! residual `p - F·w` keeps its exposure to every feature inside a band
//! clipped to `[-max_exposure, max_exposure]`.
//!
//! For each feature `i` the loss is
//!
//! `relu(relu(eᵢ) - relu(tᵢ)) + relu(relu(-eᵢ) - relu(-tᵢ))`
//!
//! where `e` is the residual's exposure and `t` the clipped exposure of the
//! untouched prediction. Training runs Adamax on the analytic gradient with
//! respect to `w` until the loss drops below the tolerance or the iteration
//! ceiling is reached.

use crate::exposure::{column_matrix, exposures, normalize_columns, require_finite};
use crate::optimizer::{Adamax, AdamaxConfig};
use blocks_core::config::{is_prediction_name, DEFAULT_ERA_COL, DEFAULT_PRED_NAME};
use blocks_core::dataset::{gather, scatter};
use blocks_core::stats::{gaussianize, std_dev, uniform_ranks};
use blocks_core::{Dataset, Error, Processor, Result};
use nalgebra::{DMatrix, DVector};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Feature penalizer configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PenalizerConfig {
    /// Model identifiers; one output column is produced per entry.
    pub model_list: Vec<String>,
    /// Upper bound on absolute exposure, in [0, 1].
    pub max_exposure: f64,
    /// Features to limit exposure to. `None` uses every feature column.
    pub risky_feature_names: Option<Vec<String>>,
    /// Prediction column to penalize.
    pub pred_name: String,
    /// Era column.
    pub era_col: String,
    /// Map uniform ranks through the inverse normal CDF.
    pub gaussianize: bool,
    /// Optimizer settings and loop limits.
    pub optimizer: AdamaxConfig,
}

impl Default for PenalizerConfig {
    fn default() -> Self {
        Self {
            model_list: vec!["model".to_string()],
            max_exposure: 0.1,
            risky_feature_names: None,
            pred_name: DEFAULT_PRED_NAME.to_string(),
            era_col: DEFAULT_ERA_COL.to_string(),
            gaussianize: true,
            optimizer: AdamaxConfig::default(),
        }
    }
}

/// Result of training the correction model on one era.
#[derive(Debug, Clone)]
pub struct ExposureReduction {
    /// `p - F·w`.
    pub scores: DVector<f64>,
    /// Trained weights.
    pub weights: DVector<f64>,
    /// Optimizer steps taken.
    pub iterations: usize,
    /// Loss at the returned weights.
    pub loss: f64,
    /// Whether the loss dropped below the tolerance.
    pub converged: bool,
}

/// Per-era exposure reduction by gradient descent.
#[derive(Debug, Clone)]
pub struct FeaturePenalizer {
    config: PenalizerConfig,
}

impl FeaturePenalizer {
    /// Create a penalizer, validating the configuration.
    pub fn new(config: PenalizerConfig) -> Result<Self> {
        if !(0.0..=1.0).contains(&config.max_exposure) {
            return Err(Error::configuration(format!(
                "'max_exposure' should be a float in range [0...1]. Got '{}'.",
                config.max_exposure
            )));
        }
        if config.model_list.is_empty() {
            return Err(Error::configuration("'model_list' should not be empty"));
        }
        let final_col_name = format!("{}_penalized_{:?}", config.pred_name, config.max_exposure);
        if !is_prediction_name(&final_col_name) {
            return Err(Error::configuration(format!(
                "final column name should start with 'prediction'. Got '{final_col_name}'."
            )));
        }
        if matches!(&config.risky_feature_names, Some(names) if names.is_empty()) {
            return Err(Error::configuration("'risky_feature_names' should not be empty"));
        }
        config.optimizer.validate()?;
        Ok(Self { config })
    }

    /// Configuration in use.
    pub fn config(&self) -> &PenalizerConfig {
        &self.config
    }

    /// Output column for a model identifier.
    pub fn output_col(&self, model_name: &str) -> String {
        format!(
            "prediction_{}_{}_FP_{:?}",
            self.config.pred_name, model_name, self.config.max_exposure
        )
    }

    /// Map raw predictions to uniform ranks, optionally gaussianized.
    fn normalize(&self, scores: &[f64]) -> Result<Vec<f64>> {
        if self.config.gaussianize {
            gaussianize(scores)
        } else {
            Ok(uniform_ranks(scores))
        }
    }

    /// Hinge loss of `residual` against the target band, and its gradient in `w`.
    ///
    /// `normalized` is `features` with centred, unit-norm columns.
    fn loss_and_gradient(
        features: &DMatrix<f64>,
        normalized: &DMatrix<f64>,
        residual: &DVector<f64>,
        target: &DVector<f64>,
    ) -> (f64, DVector<f64>) {
        let k = features.ncols();
        let centered = residual.add_scalar(-residual.mean());
        let norm = centered.norm();
        if norm == 0.0 {
            return (0.0, DVector::zeros(k));
        }
        let yn = centered / norm;
        let exps = normalized.tr_mul(&yn);

        let relu = |x: f64| x.max(0.0);
        let mut loss = 0.0;
        let mut grad_exps = DVector::zeros(k);
        for i in 0..k {
            let (e, t) = (exps[i], target[i]);
            let above = relu(relu(e) - relu(t));
            let below = relu(relu(-e) - relu(-t));
            if above > 0.0 {
                loss += above;
                grad_exps[i] += 1.0;
            }
            if below > 0.0 {
                loss += below;
                grad_exps[i] -= 1.0;
            }
        }

        // d loss / d yn, then through the unit-norm projection back to the residual
        let a = normalized * &grad_exps;
        let grad_residual = (&a - &yn * yn.dot(&a)) / norm;
        // residual = p - F·w
        let grad_w = -features.tr_mul(&grad_residual);
        (loss, grad_w)
    }

    /// Train the correction model for one era.
    ///
    /// `features` must already be centred (`x - 0.5`).
    pub fn reduce_exposure(
        &self,
        prediction: &DVector<f64>,
        features: &DMatrix<f64>,
    ) -> ExposureReduction {
        let opt_config = &self.config.optimizer;
        let max_exposure = self.config.max_exposure;

        let normalized = normalize_columns(features);
        let target = exposures(features, prediction).map(|e| e.clamp(-max_exposure, max_exposure));

        let mut weights = DVector::zeros(features.ncols());
        let mut optimizer = Adamax::new(opt_config.clone(), features.ncols());
        let mut iterations = 0;
        let mut converged = false;
        let mut loss = f64::INFINITY;

        while iterations < opt_config.max_iterations {
            let residual = prediction - features * &weights;
            let (current, grad) =
                Self::loss_and_gradient(features, &normalized, &residual, &target);
            loss = current;
            if loss < opt_config.tolerance {
                converged = true;
                break;
            }
            optimizer.step(&mut weights, &grad);
            iterations += 1;
        }

        if !converged {
            let residual = prediction - features * &weights;
            loss = Self::loss_and_gradient(features, &normalized, &residual, &target).0;
            converged = loss < opt_config.tolerance;
        }

        ExposureReduction {
            scores: prediction - features * &weights,
            weights,
            iterations,
            loss,
            converged,
        }
    }

    /// Penalize one era and rescale its scores to [0, 1].
    fn penalize_era(&self, scores: &[f64], risky: &DMatrix<f64>) -> Result<Vec<f64>> {
        if risky.iter().any(|v| !v.is_finite()) {
            return Err(Error::numerical(
                "risky feature matrix contains non-finite values",
            ));
        }
        let prediction = DVector::from_vec(self.normalize(scores)?);
        let centered = risky.add_scalar(-0.5);
        let reduction = self.reduce_exposure(&prediction, &centered);
        if !reduction.converged {
            tracing::warn!(
                iterations = reduction.iterations,
                loss = reduction.loss,
                "exposure reduction hit the iteration ceiling"
            );
        }

        let std = std_dev(reduction.scores.as_slice(), 0);
        if !std.is_finite() || std == 0.0 {
            return Err(Error::numerical(format!(
                "penalized scores have degenerate standard deviation ({std})"
            )));
        }
        let mut out = reduction.scores / std;
        let min = out.min();
        out.add_scalar_mut(-min);
        let max = out.max();
        out /= max;
        Ok(out.iter().copied().collect())
    }

    /// Penalize every era of the prediction column, in original row order.
    fn penalize_column(&self, dataset: &Dataset, risky_names: &[String]) -> Result<Vec<f64>> {
        let preds = dataset.float_column(&self.config.pred_name)?;
        let risky = risky_names
            .iter()
            .map(|name| dataset.float_column(name))
            .collect::<Result<Vec<_>>>()?;
        let eras = dataset.era_groups(&self.config.era_col)?;

        let penalized = eras
            .par_iter()
            .map(|era| {
                tracing::debug!(era = %era.label, rows = era.rows.len(), "penalizing era");
                let scores = gather(preds, &era.rows);
                let matrix = column_matrix(&risky, &era.rows);
                require_finite(&self.config.pred_name, &scores)
                    .and_then(|()| self.penalize_era(&scores, &matrix))
                    .map_err(|e| e.in_era(&era.label))
            })
            .collect::<Result<Vec<_>>>()?;

        let mut column = vec![f64::NAN; dataset.n_rows()];
        for (era, values) in eras.iter().zip(&penalized) {
            scatter(&mut column, &era.rows, values);
        }
        Ok(column)
    }
}

impl Processor for FeaturePenalizer {
    fn name(&self) -> &str {
        "FeaturePenalizer"
    }

    fn transform(&self, dataset: &Dataset) -> Result<Dataset> {
        let risky_names = self
            .config
            .risky_feature_names
            .clone()
            .unwrap_or_else(|| dataset.feature_cols());
        if risky_names.is_empty() {
            return Err(Error::precondition("no risky feature columns to penalize against"));
        }
        dataset.require_columns(&risky_names)?;

        let mut output = dataset.clone();
        for model_name in &self.config.model_list {
            let column = self.penalize_column(dataset, &risky_names)?;
            let new_col = self.output_col(model_name);
            tracing::info!(
                model = %model_name,
                max_exposure = self.config.max_exposure,
                output = %new_col,
                "penalized prediction"
            );
            output.insert_column(new_col, column)?;
        }
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use blocks_core::{ErrorKind, Metadata, Series};

    /// Two eras of 30 rows; the prediction leans heavily on `feature_a`.
    fn make_dataset() -> Dataset {
        let n = 30;
        let mut era = Vec::new();
        let mut a = Vec::new();
        let mut b = Vec::new();
        let mut pred = Vec::new();
        for (label, offset) in [("era1", 0), ("era2", 4)] {
            for i in 0..n {
                let fa = ((i * 7 + offset) % n) as f64 / (n - 1) as f64;
                let fb = ((i * 11 + 3 + offset) % n) as f64 / (n - 1) as f64;
                let noise = ((i * 13 + 5) % n) as f64 / (n - 1) as f64;
                era.push(label.to_string());
                a.push(fa);
                b.push(fb);
                pred.push(0.7 * fa + 0.3 * noise);
            }
        }
        Dataset::new(Metadata::default())
            .with_column("era", era)
            .unwrap()
            .with_column("feature_a", a)
            .unwrap()
            .with_column("feature_b", b)
            .unwrap()
            .with_column("prediction", pred)
            .unwrap()
    }

    fn penalizer(max_exposure: f64) -> FeaturePenalizer {
        FeaturePenalizer::new(PenalizerConfig {
            max_exposure,
            ..PenalizerConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn test_invalid_max_exposure() {
        for m in [-0.01, 1.5, f64::NAN] {
            let err = FeaturePenalizer::new(PenalizerConfig {
                max_exposure: m,
                ..PenalizerConfig::default()
            })
            .unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Configuration);
        }
    }

    #[test]
    fn test_empty_model_list() {
        let err = FeaturePenalizer::new(PenalizerConfig {
            model_list: vec![],
            ..PenalizerConfig::default()
        })
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }

    #[test]
    fn test_output_column_name() {
        let p = penalizer(0.1);
        assert_eq!(p.output_col("lgbm"), "prediction_prediction_lgbm_FP_0.1");
    }

    #[test]
    fn test_exposure_bounded_per_era() {
        let ds = make_dataset();
        let p = penalizer(0.1);
        let out = p.transform(&ds).unwrap();
        let col = out.float_column(&p.output_col("model")).unwrap();

        let features = [
            ds.float_column("feature_a").unwrap(),
            ds.float_column("feature_b").unwrap(),
        ];
        for era in ds.era_groups("era").unwrap() {
            let x = column_matrix(&features, &era.rows);
            let y = DVector::from_vec(gather(col, &era.rows));
            for e in exposures(&x, &y).iter() {
                assert!(e.abs() <= 0.1 + 1e-4, "exposure {e} in era {}", era.label);
            }
        }
    }

    #[test]
    fn test_each_era_scaled_to_unit_interval() {
        let ds = make_dataset();
        let p = penalizer(0.3);
        let out = p.transform(&ds).unwrap();
        let col = out.float_column(&p.output_col("model")).unwrap();

        for era in ds.era_groups("era").unwrap() {
            let values = gather(col, &era.rows);
            let min = values.iter().cloned().fold(f64::INFINITY, f64::min);
            let max = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
            assert_abs_diff_eq!(min, 0.0, epsilon = 1e-12);
            assert_abs_diff_eq!(max, 1.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_reduce_exposure_converges() {
        let ds = make_dataset();
        let p = penalizer(0.1);
        let rows: Vec<usize> = (0..30).collect();
        let features = [
            ds.float_column("feature_a").unwrap(),
            ds.float_column("feature_b").unwrap(),
        ];
        let x = column_matrix(&features, &rows).add_scalar(-0.5);
        let pred = DVector::from_vec(
            gaussianize(&gather(ds.float_column("prediction").unwrap(), &rows)).unwrap(),
        );

        let start = exposures(&x, &pred);
        assert!(start[0] > 0.8);

        let reduction = p.reduce_exposure(&pred, &x);
        assert!(reduction.converged);
        assert!(reduction.iterations > 0);
        assert!(reduction.loss < 1e-7);
        assert!(reduction.weights[0] > 0.0);
    }

    #[test]
    fn test_no_training_when_already_within_bounds() {
        let ds = make_dataset();
        let p = penalizer(1.0);
        let rows: Vec<usize> = (0..30).collect();
        let features = [ds.float_column("feature_a").unwrap()];
        let x = column_matrix(&features, &rows).add_scalar(-0.5);
        let pred = DVector::from_vec(
            gaussianize(&gather(ds.float_column("prediction").unwrap(), &rows)).unwrap(),
        );

        let reduction = p.reduce_exposure(&pred, &x);
        assert!(reduction.converged);
        assert_eq!(reduction.iterations, 0);
        assert_eq!(reduction.scores, pred);
    }

    #[test]
    fn test_iteration_ceiling_is_not_an_error() {
        let ds = make_dataset();
        let p = FeaturePenalizer::new(PenalizerConfig {
            max_exposure: 0.0,
            optimizer: AdamaxConfig {
                max_iterations: 5,
                ..AdamaxConfig::default()
            },
            ..PenalizerConfig::default()
        })
        .unwrap();
        let out = p.transform(&ds).unwrap();
        assert!(out.has_column(&p.output_col("model")));
    }

    #[test]
    fn test_one_column_per_model() {
        let ds = make_dataset();
        let p = FeaturePenalizer::new(PenalizerConfig {
            model_list: vec!["a".into(), "b".into()],
            max_exposure: 0.5,
            ..PenalizerConfig::default()
        })
        .unwrap();
        let out = p.transform(&ds).unwrap();
        let col_a = out.float_column(&p.output_col("a")).unwrap();
        let col_b = out.float_column(&p.output_col("b")).unwrap();
        assert_eq!(col_a, col_b);
        assert_eq!(out.n_cols(), ds.n_cols() + 2);
    }

    #[test]
    fn test_missing_risky_feature() {
        let ds = make_dataset();
        let p = FeaturePenalizer::new(PenalizerConfig {
            risky_feature_names: Some(vec!["feature_zzz".into()]),
            ..PenalizerConfig::default()
        })
        .unwrap();
        let err = p.transform(&ds).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Precondition);
    }

    #[test]
    fn test_era_rows_permutation_invariant() {
        let ds = make_dataset();
        let p = penalizer(0.1);
        let out = p.transform(&ds).unwrap();
        let base = out.float_column(&p.output_col("model")).unwrap().to_vec();

        // Reverse the rows of "era2" (rows 30..60)
        let perm: Vec<usize> = (0..30).chain((30..60).rev()).collect();
        let mut permuted = Dataset::new(Metadata::default());
        for name in ["era", "feature_a", "feature_b", "prediction"] {
            let series = match ds.column(name).unwrap() {
                Series::Float(v) => Series::Float(perm.iter().map(|&i| v[i]).collect()),
                Series::Text(v) => Series::Text(perm.iter().map(|&i| v[i].clone()).collect()),
            };
            permuted.insert_column(name, series).unwrap();
        }
        let out = p.transform(&permuted).unwrap();
        let col = out.float_column(&p.output_col("model")).unwrap();

        for (new_row, &old_row) in perm.iter().enumerate() {
            assert_abs_diff_eq!(col[new_row], base[old_row], epsilon = 1e-6);
        }
    }

    #[test]
    fn test_nan_prediction_is_precondition_error() {
        let mut preds = make_dataset().float_column("prediction").unwrap().to_vec();
        preds[40] = f64::NAN;
        let ds = make_dataset().with_column("prediction", preds).unwrap();
        let err = penalizer(0.1).transform(&ds).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Precondition);
        let msg = err.to_string();
        assert!(msg.contains("era 'era2'"), "{msg}");
        assert!(msg.contains("'prediction'"), "{msg}");
    }

    #[test]
    fn test_non_finite_risky_feature_is_numerical_error() {
        let mut a = make_dataset().float_column("feature_a").unwrap().to_vec();
        a[3] = f64::INFINITY;
        let ds = make_dataset().with_column("feature_a", a).unwrap();
        let err = penalizer(0.1).transform(&ds).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Numerical);
        let msg = err.to_string();
        assert!(msg.contains("era 'era1'"), "{msg}");
        assert!(msg.contains("non-finite"), "{msg}");
    }
}
