//! Post-processing for the era-blocks pipeline.
//!
//! This crate handles:
//! - Per-era rank standardization
//! - Ensembling of prediction columns (mean, Donate-weighted, geometric)
//! - Feature neutralization via pseudo-inverse projection
//! - Feature penalization via gradient-based exposure reduction

pub mod ensemble;
pub mod exposure;
pub mod neutralizer;
pub mod optimizer;
pub mod penalizer;
pub mod standardizer;

pub use ensemble::{DonateWeightedEnsembler, GeometricMeanEnsembler, MeanEnsembler};
pub use neutralizer::{FeatureNeutralizer, NeutralizerConfig};
pub use optimizer::{Adamax, AdamaxConfig};
pub use penalizer::{FeaturePenalizer, PenalizerConfig};
pub use standardizer::Standardizer;
