//! Declarative pipeline configuration.
//!
//! A pipeline is described as an ordered list of stages, each tagged with
//! its processor type:
//!
//! ```json
//! {
//!   "stages": [
//!     { "type": "feature_neutralizer", "proportion": 0.5 },
//!     { "type": "mean_ensembler", "cols": ["prediction_a", "prediction_b"],
//!       "final_col_name": "prediction_mean" }
//!   ]
//! }
//! ```

use std::path::Path;

use blocks_core::config::DEFAULT_TICKER_COL;
use blocks_core::{Error, Processor, Result};
use blocks_postprocessing::{
    DonateWeightedEnsembler, FeatureNeutralizer, FeaturePenalizer, GeometricMeanEnsembler,
    MeanEnsembler, NeutralizerConfig, PenalizerConfig, Standardizer,
};
use blocks_preprocessing::indicators::default_patterns;
use blocks_preprocessing::{
    CopyPreProcessor, FeatureSelectionPreProcessor, GroupStatsPreProcessor, OhlcvColumns,
    PatternFeatures, PriceColumns, QuarticityFeatures, RealizedVolFeatures,
    TargetSelectionPreProcessor, VolumeFeatures, VolumeFeaturesConfig,
};
use serde::{Deserialize, Serialize};

use crate::pipeline::Pipeline;

fn default_ticker_col() -> String {
    DEFAULT_TICKER_COL.to_string()
}

/// One pipeline stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StageConfig {
    Copy,
    FeatureSelection {
        feature_cols: Vec<String>,
    },
    TargetSelection {
        target_cols: Vec<String>,
    },
    GroupStats,
    PatternFeatures {
        #[serde(default = "default_ticker_col")]
        ticker_col: String,
        #[serde(default)]
        columns: OhlcvColumns,
    },
    VolumeFeatures(VolumeFeaturesConfig),
    RealizedVolFeatures(PriceColumns),
    QuarticityFeatures(PriceColumns),
    Standardizer {
        #[serde(default)]
        cols: Option<Vec<String>>,
    },
    MeanEnsembler {
        cols: Vec<String>,
        final_col_name: String,
    },
    DonateWeightedEnsembler {
        cols: Vec<String>,
        final_col_name: String,
    },
    GeometricMeanEnsembler {
        cols: Vec<String>,
        final_col_name: String,
    },
    FeatureNeutralizer(NeutralizerConfig),
    FeaturePenalizer(PenalizerConfig),
}

impl StageConfig {
    /// Construct the processor this stage describes.
    pub fn build(&self) -> Result<Box<dyn Processor>> {
        let processor: Box<dyn Processor> = match self {
            StageConfig::Copy => Box::new(CopyPreProcessor),
            StageConfig::FeatureSelection { feature_cols } => {
                Box::new(FeatureSelectionPreProcessor::new(feature_cols.clone())?)
            }
            StageConfig::TargetSelection { target_cols } => {
                Box::new(TargetSelectionPreProcessor::new(target_cols.clone())?)
            }
            StageConfig::GroupStats => Box::new(GroupStatsPreProcessor::new()),
            StageConfig::PatternFeatures {
                ticker_col,
                columns,
            } => Box::new(PatternFeatures::with_patterns(
                ticker_col.clone(),
                columns.clone(),
                default_patterns(),
            )),
            StageConfig::VolumeFeatures(config) => Box::new(VolumeFeatures::new(config.clone())?),
            StageConfig::RealizedVolFeatures(columns) => {
                Box::new(RealizedVolFeatures::new(columns.clone()))
            }
            StageConfig::QuarticityFeatures(columns) => {
                Box::new(QuarticityFeatures::new(columns.clone()))
            }
            StageConfig::Standardizer { cols: None } => Box::new(Standardizer::new()),
            StageConfig::Standardizer { cols: Some(cols) } => {
                Box::new(Standardizer::with_columns(cols.clone())?)
            }
            StageConfig::MeanEnsembler {
                cols,
                final_col_name,
            } => Box::new(MeanEnsembler::new(cols.clone(), final_col_name.clone())?),
            StageConfig::DonateWeightedEnsembler {
                cols,
                final_col_name,
            } => Box::new(DonateWeightedEnsembler::new(
                cols.clone(),
                final_col_name.clone(),
            )?),
            StageConfig::GeometricMeanEnsembler {
                cols,
                final_col_name,
            } => Box::new(GeometricMeanEnsembler::new(
                cols.clone(),
                final_col_name.clone(),
            )?),
            StageConfig::FeatureNeutralizer(config) => {
                Box::new(FeatureNeutralizer::new(config.clone())?)
            }
            StageConfig::FeaturePenalizer(config) => Box::new(FeaturePenalizer::new(config.clone())?),
        };
        Ok(processor)
    }
}

/// Ordered list of stages.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub stages: Vec<StageConfig>,
}

impl PipelineConfig {
    /// Parse from a JSON string.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load from a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            Error::configuration(format!("cannot read '{}': {e}", path.display()))
        })?;
        Self::from_json(&json)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

impl Pipeline {
    /// Build a pipeline reporting through `tracing`.
    pub fn from_config(config: &PipelineConfig) -> Result<Self> {
        Self::from_config_into(Pipeline::new(), config)
    }

    /// Append the configured stages to an existing pipeline.
    pub fn from_config_into(mut pipeline: Pipeline, config: &PipelineConfig) -> Result<Self> {
        for (index, stage) in config.stages.iter().enumerate() {
            let processor = stage.build().map_err(|e| match e {
                Error::Configuration(msg) => {
                    Error::configuration(format!("stage {index}: {msg}"))
                }
                other => other,
            })?;
            pipeline.push(processor);
        }
        tracing::debug!(stages = pipeline.len(), "pipeline assembled");
        Ok(pipeline)
    }

    /// Parse a JSON configuration and build the pipeline.
    pub fn from_json(json: &str) -> Result<Self> {
        Self::from_config(&PipelineConfig::from_json(json)?)
    }
}
