//! Predictive filter settings.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Shortest history that still yields a full position training example.
pub const MIN_HISTORY_LENGTH: usize = 4;

/// Predictive filter configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PredictorConfig {
    /// Base history length. Each joint keeps `history_length + 2` samples.
    pub history_length: usize,
    /// Weight of the regression estimate in the published blend (0.0-1.0).
    pub regression_weight: f64,
    /// Training examples collected per joint before a retrain is started.
    pub train_batch_size: usize,
    /// Ridge regularization strength of the default trainer.
    pub ridge_lambda: f64,
    /// Substitute for zero or negative time steps, in seconds.
    pub default_dt: f64,
}

impl Default for PredictorConfig {
    fn default() -> Self {
        Self {
            history_length: 5,
            regression_weight: 0.3,
            train_batch_size: 500,
            ridge_lambda: 1e-3,
            default_dt: 0.01,
        }
    }
}

impl PredictorConfig {
    pub fn with_history_length(mut self, history_length: usize) -> Self {
        self.history_length = history_length;
        self
    }

    pub fn with_regression_weight(mut self, weight: f64) -> Self {
        self.regression_weight = weight;
        self
    }

    pub fn with_train_batch_size(mut self, batch: usize) -> Self {
        self.train_batch_size = batch;
        self
    }

    pub fn with_ridge_lambda(mut self, lambda: f64) -> Self {
        self.ridge_lambda = lambda;
        self
    }

    /// Samples kept per joint and per channel.
    pub fn history_capacity(&self) -> usize {
        self.history_length + 2
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), PredictorConfigError> {
        if self.history_length < MIN_HISTORY_LENGTH {
            return Err(PredictorConfigError::HistoryTooShort(self.history_length));
        }
        if !(0.0..=1.0).contains(&self.regression_weight) {
            return Err(PredictorConfigError::InvalidWeight(self.regression_weight));
        }
        if self.train_batch_size == 0 {
            return Err(PredictorConfigError::ZeroBatchSize);
        }
        if !(self.ridge_lambda >= 0.0 && self.ridge_lambda.is_finite()) {
            return Err(PredictorConfigError::InvalidLambda(self.ridge_lambda));
        }
        if !(self.default_dt > 0.0 && self.default_dt.is_finite()) {
            return Err(PredictorConfigError::InvalidDefaultDt(self.default_dt));
        }
        Ok(())
    }
}

/// Errors that can occur when validating a [`PredictorConfig`].
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PredictorConfigError {
    #[error("history_length must be at least {MIN_HISTORY_LENGTH}, got {0}")]
    HistoryTooShort(usize),
    #[error("regression_weight must be between 0 and 1, got {0}")]
    InvalidWeight(f64),
    #[error("train_batch_size must be at least 1")]
    ZeroBatchSize,
    #[error("ridge_lambda must be a non-negative number, got {0}")]
    InvalidLambda(f64),
    #[error("default_dt must be positive, got {0}")]
    InvalidDefaultDt(f64),
}
