//! Dataset copy and column selection.

use blocks_core::{Dataset, Error, Processor, Result};

/// Returns a copy with freshly allocated columns.
#[derive(Debug, Clone, Copy, Default)]
pub struct CopyPreProcessor;

impl Processor for CopyPreProcessor {
    fn name(&self) -> &str {
        "CopyPreProcessor"
    }

    fn transform(&self, dataset: &Dataset) -> Result<Dataset> {
        Ok(dataset.deep_copy())
    }
}

/// Keeps only the given features plus all target, prediction and aux columns.
#[derive(Debug, Clone)]
pub struct FeatureSelectionPreProcessor {
    feature_cols: Vec<String>,
}

impl FeatureSelectionPreProcessor {
    pub fn new(feature_cols: Vec<String>) -> Result<Self> {
        if feature_cols.is_empty() {
            return Err(Error::configuration("feature selection needs at least one feature"));
        }
        Ok(Self { feature_cols })
    }
}

impl Processor for FeatureSelectionPreProcessor {
    fn name(&self) -> &str {
        "FeatureSelectionPreProcessor"
    }

    fn transform(&self, dataset: &Dataset) -> Result<Dataset> {
        let keep: Vec<String> = self
            .feature_cols
            .iter()
            .cloned()
            .chain(dataset.target_cols())
            .chain(dataset.prediction_cols())
            .chain(dataset.aux_cols())
            .collect();
        tracing::info!(features = self.feature_cols.len(), "selected features");
        dataset.select(&keep)
    }
}

/// Keeps only the given targets plus all feature, prediction and aux columns.
#[derive(Debug, Clone)]
pub struct TargetSelectionPreProcessor {
    target_cols: Vec<String>,
}

impl TargetSelectionPreProcessor {
    pub fn new(target_cols: Vec<String>) -> Result<Self> {
        if target_cols.is_empty() {
            return Err(Error::configuration("target selection needs at least one target"));
        }
        Ok(Self { target_cols })
    }
}

impl Processor for TargetSelectionPreProcessor {
    fn name(&self) -> &str {
        "TargetSelectionPreProcessor"
    }

    fn transform(&self, dataset: &Dataset) -> Result<Dataset> {
        let keep: Vec<String> = dataset
            .feature_cols()
            .into_iter()
            .chain(self.target_cols.iter().cloned())
            .chain(dataset.prediction_cols())
            .chain(dataset.aux_cols())
            .collect();
        tracing::info!(targets = ?self.target_cols, "selected targets");
        dataset.select(&keep)
    }
}
