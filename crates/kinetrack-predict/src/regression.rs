//! Regression contracts and the default ridge trainer.
//!
//! The predictive filter only needs two capabilities: turn a batch of
//! examples into a model, and turn a feature vector into an output vector.
//! Persisting models is left to the caller; [`LinearModel`] is serializable
//! for that purpose.

use std::sync::Arc;

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::features::TrainingExample;

/// Features with a standard deviation below this are left unscaled.
const MIN_SCALE: f64 = 1e-12;

/// A trained model.
pub trait Regressor: Send + Sync {
    /// Output for one feature vector, or `None` if the input has the wrong
    /// shape.
    fn predict(&self, features: &[f64]) -> Option<Vec<f64>>;
}

/// Builds a model from examples.
pub trait RegressionTrainer: Send + Sync {
    /// Fits a model, or returns `None` if the examples cannot support one.
    fn train(&self, examples: &[TrainingExample]) -> Option<Arc<dyn Regressor>>;
}

// =============================================================================
// Linear model
// =============================================================================

/// Multi-output affine model over standardized features:
/// `y_k = intercept_k + Σ_j weights[k][j] · (x_j − mean_j) / scale_j`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearModel {
    pub feature_means: Vec<f64>,
    pub feature_scales: Vec<f64>,
    /// One row per output.
    pub weights: Vec<Vec<f64>>,
    pub intercepts: Vec<f64>,
}

impl LinearModel {
    pub fn input_len(&self) -> usize {
        self.feature_means.len()
    }

    pub fn output_len(&self) -> usize {
        self.intercepts.len()
    }
}

impl Regressor for LinearModel {
    fn predict(&self, features: &[f64]) -> Option<Vec<f64>> {
        if features.len() != self.input_len() {
            return None;
        }
        let standardized: Vec<f64> = features
            .iter()
            .zip(&self.feature_means)
            .zip(&self.feature_scales)
            .map(|((x, mean), scale)| (x - mean) / scale)
            .collect();
        Some(
            self.weights
                .iter()
                .zip(&self.intercepts)
                .map(|(row, intercept)| {
                    intercept + row.iter().zip(&standardized).map(|(w, z)| w * z).sum::<f64>()
                })
                .collect(),
        )
    }
}

// =============================================================================
// Ridge trainer
// =============================================================================

/// Ridge regression solved through the regularized normal equations.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RidgeTrainer {
    pub lambda: f64,
}

impl Default for RidgeTrainer {
    fn default() -> Self {
        Self { lambda: 1e-3 }
    }
}

impl RidgeTrainer {
    pub fn new(lambda: f64) -> Self {
        Self { lambda }
    }

    /// Fits a [`LinearModel`]. Examples of inconsistent shape, non-finite
    /// values, or a singular system yield `None`.
    pub fn fit(&self, examples: &[TrainingExample]) -> Option<LinearModel> {
        let first = examples.first()?;
        let (d, k) = (first.features.len(), first.label.len());
        if d == 0 || k == 0 {
            return None;
        }
        let consistent = examples.iter().all(|e| {
            e.features.len() == d
                && e.label.len() == k
                && e.features.iter().chain(&e.label).all(|v| v.is_finite())
        });
        if !consistent {
            warn!(examples = examples.len(), "inconsistent training examples, skipping fit");
            return None;
        }

        let n = examples.len();
        let x = DMatrix::from_fn(n, d, |i, j| examples[i].features[j]);
        let y = DMatrix::from_fn(n, k, |i, j| examples[i].label[j]);

        let means: DVector<f64> = x.row_mean().transpose();
        let scales = DVector::from_iterator(
            d,
            x.column_iter().zip(means.iter()).map(|(column, mean)| {
                let variance = column.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n as f64;
                let std = variance.sqrt();
                if std > MIN_SCALE {
                    std
                } else {
                    1.0
                }
            }),
        );
        let y_means: DVector<f64> = y.row_mean().transpose();

        let z = DMatrix::from_fn(n, d, |i, j| (x[(i, j)] - means[j]) / scales[j]);
        let yc = DMatrix::from_fn(n, k, |i, j| y[(i, j)] - y_means[j]);

        let mut gram = z.transpose() * &z;
        for j in 0..d {
            gram[(j, j)] += self.lambda;
        }
        let rhs = z.transpose() * yc;
        let weights = gram.cholesky()?.solve(&rhs);
        if weights.iter().any(|w| !w.is_finite()) {
            return None;
        }

        Some(LinearModel {
            feature_means: means.iter().copied().collect(),
            feature_scales: scales.iter().copied().collect(),
            weights: (0..k)
                .map(|out| weights.column(out).iter().copied().collect())
                .collect(),
            intercepts: y_means.iter().copied().collect(),
        })
    }
}

impl RegressionTrainer for RidgeTrainer {
    fn train(&self, examples: &[TrainingExample]) -> Option<Arc<dyn Regressor>> {
        self.fit(examples)
            .map(|model| Arc::new(model) as Arc<dyn Regressor>)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn example(features: Vec<f64>, label: Vec<f64>) -> TrainingExample {
        TrainingExample { features, label }
    }

    #[test]
    fn test_recovers_affine_map() {
        // y0 = 2a - b + 1, y1 = 0.5b + 3
        let examples: Vec<_> = (0..50)
            .map(|i| {
                let a = (i as f64 * 0.37).sin() * 4.0;
                let b = (i as f64 * 0.91).cos() * 2.0;
                example(vec![a, b], vec![2.0 * a - b + 1.0, 0.5 * b + 3.0])
            })
            .collect();
        let model = RidgeTrainer::new(1e-9).fit(&examples).unwrap();
        let out = model.predict(&[1.5, -0.5]).unwrap();
        assert!((out[0] - 4.5).abs() < 1e-4, "{:?}", out);
        assert!((out[1] - 2.75).abs() < 1e-4, "{:?}", out);
    }

    #[test]
    fn test_constant_feature_is_tolerated() {
        let examples: Vec<_> = (0..20)
            .map(|i| example(vec![i as f64, 7.0], vec![i as f64 * 3.0]))
            .collect();
        let model = RidgeTrainer::default().fit(&examples).unwrap();
        assert_eq!(model.feature_scales[1], 1.0);
        let out = model.predict(&[10.0, 7.0]).unwrap();
        assert!((out[0] - 30.0).abs() < 0.1);
    }

    #[test]
    fn test_rejects_bad_input() {
        let trainer = RidgeTrainer::default();
        assert!(trainer.fit(&[]).is_none());
        let mixed = vec![example(vec![1.0], vec![1.0]), example(vec![1.0, 2.0], vec![1.0])];
        assert!(trainer.fit(&mixed).is_none());
        let nan = vec![example(vec![f64::NAN], vec![1.0])];
        assert!(trainer.fit(&nan).is_none());
        // Unregularized with a constant feature: singular.
        let flat: Vec<_> = (0..5).map(|_| example(vec![1.0], vec![2.0])).collect();
        assert!(RidgeTrainer::new(0.0).fit(&flat).is_none());
    }

    #[test]
    fn test_predict_checks_shape() {
        let examples: Vec<_> = (0..10)
            .map(|i| example(vec![i as f64], vec![i as f64]))
            .collect();
        let model = RidgeTrainer::default().train(&examples).unwrap();
        assert!(model.predict(&[1.0, 2.0]).is_none());
        assert_eq!(model.predict(&[1.0]).map(|v| v.len()), Some(1));
    }

    #[test]
    fn test_model_serde() {
        let model = LinearModel {
            feature_means: vec![0.5],
            feature_scales: vec![2.0],
            weights: vec![vec![1.0]],
            intercepts: vec![3.0],
        };
        let json = serde_json::to_string(&model).unwrap();
        let back: LinearModel = serde_json::from_str(&json).unwrap();
        assert_eq!(back, model);
        assert_eq!(back.predict(&[2.5]), Some(vec![4.0]));
    }
}
