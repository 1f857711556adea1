//! Pre-processing for the era-blocks pipeline.
//!
//! This crate handles:
//! - Dataset copies and feature/target selection
//! - Row-wise feature group statistics (version 1 data)
//! - Per-ticker candlestick and volume indicators
//! - Per-ticker realized volatility and quarticity estimators

pub mod group_stats;
pub mod indicators;
pub mod selection;
pub mod volatility;

pub use group_stats::GroupStatsPreProcessor;
pub use indicators::{
    CandlePattern, OhlcvColumns, PatternFeatures, VolumeFeatures, VolumeFeaturesConfig,
};
pub use selection::{CopyPreProcessor, FeatureSelectionPreProcessor, TargetSelectionPreProcessor};
pub use volatility::{PriceColumns, QuarticityFeatures, RealizedVolFeatures};
