//! Adamax optimizer used by the feature penalizer.

use blocks_core::config::{
    ADAMAX_BETA_1, ADAMAX_BETA_2, ADAMAX_EPSILON, ADAMAX_LEARNING_RATE, DEFAULT_LOSS_TOLERANCE,
    DEFAULT_MAX_ITERATIONS,
};
use blocks_core::{Error, Result};
use nalgebra::DVector;
use serde::{Deserialize, Serialize};

/// Adamax hyperparameters and loop limits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdamaxConfig {
    /// Step size.
    pub learning_rate: f64,
    /// Decay of the first moment estimate.
    pub beta_1: f64,
    /// Decay of the weighted infinity norm.
    pub beta_2: f64,
    /// Added to the denominator.
    pub epsilon: f64,
    /// Iteration ceiling.
    pub max_iterations: usize,
    /// Loss below which training stops.
    pub tolerance: f64,
}

impl Default for AdamaxConfig {
    fn default() -> Self {
        Self {
            learning_rate: ADAMAX_LEARNING_RATE,
            beta_1: ADAMAX_BETA_1,
            beta_2: ADAMAX_BETA_2,
            epsilon: ADAMAX_EPSILON,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            tolerance: DEFAULT_LOSS_TOLERANCE,
        }
    }
}

impl AdamaxConfig {
    /// Check hyperparameter ranges.
    pub fn validate(&self) -> Result<()> {
        if !(self.learning_rate > 0.0) {
            return Err(Error::configuration(format!(
                "'learning_rate' should be positive. Got '{}'.",
                self.learning_rate
            )));
        }
        for (name, beta) in [("beta_1", self.beta_1), ("beta_2", self.beta_2)] {
            if !(0.0..1.0).contains(&beta) {
                return Err(Error::configuration(format!(
                    "'{name}' should be in range [0...1). Got '{beta}'."
                )));
            }
        }
        if !(self.epsilon >= 0.0) || !(self.tolerance >= 0.0) {
            return Err(Error::configuration("'epsilon' and 'tolerance' should be non-negative"));
        }
        Ok(())
    }
}

/// Adamax state for a fixed number of parameters.
#[derive(Debug, Clone)]
pub struct Adamax {
    config: AdamaxConfig,
    m: DVector<f64>,
    u: DVector<f64>,
    t: i32,
}

impl Adamax {
    /// Create an optimizer for `n_params` parameters.
    pub fn new(config: AdamaxConfig, n_params: usize) -> Self {
        Self {
            config,
            m: DVector::zeros(n_params),
            u: DVector::zeros(n_params),
            t: 0,
        }
    }

    /// Number of steps taken so far.
    pub fn steps(&self) -> i32 {
        self.t
    }

    /// Apply one update to `weights` given the loss gradient.
    pub fn step(&mut self, weights: &mut DVector<f64>, grad: &DVector<f64>) {
        self.t += 1;
        let b1 = self.config.beta_1;
        let b2 = self.config.beta_2;
        let lr_t = self.config.learning_rate / (1.0 - b1.powi(self.t));

        for i in 0..weights.len() {
            let g = grad[i];
            self.m[i] = b1 * self.m[i] + (1.0 - b1) * g;
            self.u[i] = (b2 * self.u[i]).max(g.abs());
            weights[i] -= lr_t * self.m[i] / (self.u[i] + self.config.epsilon);
        }
    }
}
