//! Tracker configuration file.
//!
//! A single JSON document with every tunable of the tracking pipeline. Every
//! field is optional; missing fields take their defaults.

use std::fs;
use std::path::{Path, PathBuf};

use kinetrack_predict::{KalmanConfig, PredictorConfig, PredictorConfigError};
use kinetrack_rig::{
    AccumulatorConfig, AccumulatorConfigError, ConstraintError, ConstraintProfile,
    SmoothingCurve, Vec3,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Maps detector coordinates into rig space:
/// `p' = flip(p) * scale + offset`, where `flip` negates Y and Z.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CoordinateTransform {
    pub scale: f64,
    pub offset: Vec3,
    pub flip_yz: bool,
}

impl Default for CoordinateTransform {
    fn default() -> Self {
        Self {
            scale: 1.0,
            offset: Vec3::zeros(),
            flip_yz: true,
        }
    }
}

impl CoordinateTransform {
    pub fn apply(&self, position: &Vec3) -> Vec3 {
        let flipped = if self.flip_yz {
            Vec3::new(position.x, -position.y, -position.z)
        } else {
            *position
        };
        flipped * self.scale + self.offset
    }

    /// Inverse of [`apply`](Self::apply); used when writing recordings in
    /// detector space.
    pub fn invert(&self, position: &Vec3) -> Vec3 {
        let scaled = (position - self.offset) / self.scale;
        if self.flip_yz {
            Vec3::new(scaled.x, -scaled.y, -scaled.z)
        } else {
            scaled
        }
    }
}

/// Full tracker configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TrackerConfig {
    pub transform: CoordinateTransform,
    /// Seconds of silence before predictions stand in for observations.
    pub stall_after: f64,
    /// Seconds of silence before a limb is reported unobserved.
    pub timeout: f64,
    /// How far ahead predictions look, in seconds.
    pub lookahead: f64,
    /// Per-bone Kalman pre-filter; disabled when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kalman: Option<KalmanConfig>,
    pub accumulator: AccumulatorConfig,
    /// Smoothing used by the torso tracker.
    pub body_smoothing: SmoothingCurve,
    pub constraints: ConstraintProfile,
    pub predictor: PredictorConfig,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            transform: CoordinateTransform::default(),
            stall_after: 0.1,
            timeout: 1.0,
            lookahead: 0.05,
            kalman: None,
            accumulator: AccumulatorConfig::default(),
            body_smoothing: SmoothingCurve::Fixed { factor: 0.1 },
            constraints: ConstraintProfile::default(),
            predictor: PredictorConfig::default(),
        }
    }
}

impl TrackerConfig {
    pub fn with_transform(mut self, transform: CoordinateTransform) -> Self {
        self.transform = transform;
        self
    }

    pub fn with_timing(mut self, stall_after: f64, timeout: f64) -> Self {
        self.stall_after = stall_after;
        self.timeout = timeout;
        self
    }

    pub fn with_lookahead(mut self, lookahead: f64) -> Self {
        self.lookahead = lookahead;
        self
    }

    pub fn with_kalman(mut self, kalman: KalmanConfig) -> Self {
        self.kalman = Some(kalman);
        self
    }

    pub fn with_predictor(mut self, predictor: PredictorConfig) -> Self {
        self.predictor = predictor;
        self
    }

    /// Accumulator settings for the torso tracker.
    pub fn body_accumulator(&self) -> AccumulatorConfig {
        self.accumulator.clone().with_smoothing(self.body_smoothing)
    }

    /// Loads and validates a configuration file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: TrackerConfig =
            serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let t = &self.transform;
        if !t.scale.is_finite() || t.scale == 0.0 || !t.offset.iter().all(|c| c.is_finite()) {
            return Err(ConfigError::InvalidTransform);
        }
        if !(self.stall_after >= 0.0 && self.timeout > self.stall_after && self.timeout.is_finite())
        {
            return Err(ConfigError::InvalidTiming {
                stall_after: self.stall_after,
                timeout: self.timeout,
            });
        }
        if !(self.lookahead >= 0.0 && self.lookahead.is_finite()) {
            return Err(ConfigError::InvalidLookahead(self.lookahead));
        }
        if let Some(kalman) = &self.kalman {
            let positive = |v: f64| v > 0.0 && v.is_finite();
            if !positive(kalman.dt)
                || !positive(kalman.measurement_noise)
                || !(kalman.acceleration_noise >= 0.0)
            {
                return Err(ConfigError::InvalidKalman);
            }
        }
        self.accumulator.validate()?;
        self.body_accumulator().validate()?;
        self.constraints.validate()?;
        self.predictor.validate()?;
        Ok(())
    }
}

/// Errors that can occur while loading a [`TrackerConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("transform scale must be finite and non-zero, offset finite")]
    InvalidTransform,
    #[error("timing must satisfy 0 <= stall_after < timeout, got {stall_after} and {timeout}")]
    InvalidTiming { stall_after: f64, timeout: f64 },
    #[error("lookahead must be a non-negative number, got {0}")]
    InvalidLookahead(f64),
    #[error("kalman dt and measurement_noise must be positive, acceleration_noise non-negative")]
    InvalidKalman,
    #[error(transparent)]
    Accumulator(#[from] AccumulatorConfigError),
    #[error(transparent)]
    Constraint(#[from] ConstraintError),
    #[error(transparent)]
    Predictor(#[from] PredictorConfigError),
}
