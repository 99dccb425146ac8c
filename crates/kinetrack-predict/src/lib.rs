//! Kinetrack prediction library
//!
//! Short-horizon joint prediction for latency compensation: closed-form
//! kinematic extrapolation, blended with a per-joint regression model that is
//! retrained in the background from the joint's own history.
//!
//! # Example
//!
//! ```
//! use kinetrack_predict::{PredictiveFilter, PredictorConfig};
//! use kinetrack_rig::Vec3;
//!
//! let mut filter = PredictiveFilter::new(PredictorConfig::default()).unwrap();
//! for i in 0..6 {
//!     let t = i as f64 * 0.1;
//!     filter.update_position(0, Vec3::new(t, 0.0, 0.0), t);
//! }
//! let ahead = filter.predict_position(0, 0.1);
//! assert!((ahead.x - 0.6).abs() < 1e-9);
//! ```
//!
//! # Modules
//!
//! - [`config`]: predictor tuning
//! - [`history`]: timestamped samples and finite differences
//! - [`kinematic`]: constant-acceleration extrapolation
//! - [`features`]: feature vectors and training examples
//! - [`regression`]: model contracts and the ridge trainer
//! - [`filter`]: the per-joint predictive filter
//! - [`kalman`]: constant-velocity Kalman smoothing

pub mod config;
pub mod features;
pub mod filter;
pub mod history;
pub mod kalman;
pub mod kinematic;
pub mod regression;

pub use config::{PredictorConfig, PredictorConfigError};
pub use features::TrainingExample;
pub use filter::{Channel, JointId, PositionEstimate, PredictiveFilter, RotationEstimate};
pub use history::TimedSample;
pub use kalman::{KalmanConfig, KalmanFilter3};
pub use regression::{LinearModel, RegressionTrainer, Regressor, RidgeTrainer};
