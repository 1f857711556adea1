//! Shared naming conventions and numerical defaults.
//!
//! Processor configuration structs live next to their processors; the values
//! here are the defaults they fall back to.

/// Default name of the era (grouping) column.
pub const DEFAULT_ERA_COL: &str = "era";

/// Default name of the prediction column consumed by post-processors.
pub const DEFAULT_PRED_NAME: &str = "prediction";

/// Default name of the ticker column used by per-instrument features.
pub const DEFAULT_TICKER_COL: &str = "ticker";

/// Default name of the price column used by volatility features.
pub const DEFAULT_PRICE_COL: &str = "Close";

/// Column-name prefix of feature columns.
pub const FEATURE_PREFIX: &str = "feature";

/// Column-name prefix of target columns.
pub const TARGET_PREFIX: &str = "target";

/// Column-name prefix of prediction columns.
pub const PREDICTION_PREFIX: &str = "prediction";

/// Relative singular-value cutoff for the pseudo-inverse.
pub const PINV_RCOND: f64 = 1e-15;

/// Iteration ceiling of the penalizer's optimization loop.
pub const DEFAULT_MAX_ITERATIONS: usize = 1_000_000;

/// Loss below which the penalizer's optimization loop stops.
pub const DEFAULT_LOSS_TOLERANCE: f64 = 1e-7;

/// Adamax learning rate.
pub const ADAMAX_LEARNING_RATE: f64 = 0.001;

/// Adamax exponential decay of the first moment.
pub const ADAMAX_BETA_1: f64 = 0.9;

/// Adamax exponential decay of the weighted infinity norm.
pub const ADAMAX_BETA_2: f64 = 0.999;

/// Adamax epsilon.
pub const ADAMAX_EPSILON: f64 = 1e-7;

/// Check that a destination column is named as a prediction column.
pub fn is_prediction_name(name: &str) -> bool {
    name.starts_with(PREDICTION_PREFIX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prediction_name() {
        assert!(is_prediction_name("prediction_ensemble"));
        assert!(!is_prediction_name("ensemble_prediction"));
    }
}
