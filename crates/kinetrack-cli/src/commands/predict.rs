//! Predict command implementation
//!
//! Scores the predictive filter on a recording. Each landmark trajectory is fed
//! sample by sample; after every sample the filter predicts ahead and the
//! prediction is compared with the recorded trajectory at that time.

use std::collections::BTreeMap;
use std::path::Path;
use std::process::ExitCode;

use anyhow::{Context, Result};
use colored::Colorize;
use kinetrack_predict::{Channel, JointId, PredictiveFilter, PredictorConfig};
use kinetrack_rig::math::lerp;
use kinetrack_rig::Vec3;

use crate::config::CoordinateTransform;
use crate::ingest::Stream;
use crate::recording::Recording;

use super::json_output::{error_codes, CommandOutput, JointError, JsonError, PredictResult};

#[derive(Debug, Default)]
struct Trajectory {
    bone: String,
    times: Vec<f64>,
    positions: Vec<Vec3>,
}

impl Trajectory {
    /// Position at `time` by linear interpolation, if within range.
    fn at(&self, time: f64) -> Option<Vec3> {
        let last = *self.times.last()?;
        if time > last || time < self.times[0] {
            return None;
        }
        let upper = self.times.partition_point(|t| *t < time);
        if upper == 0 || self.times[upper] == time {
            return Some(self.positions[upper]);
        }
        let (t0, t1) = (self.times[upper - 1], self.times[upper]);
        let s = if t1 > t0 { (time - t0) / (t1 - t0) } else { 1.0 };
        Some(lerp(&self.positions[upper - 1], &self.positions[upper], s))
    }
}

/// Per-joint trajectories in rig space, keyed by stream and joint id.
fn trajectories(
    recording: &Recording,
    transform: &CoordinateTransform,
) -> BTreeMap<(Stream, JointId), Trajectory> {
    let mut trajectories: BTreeMap<(Stream, JointId), Trajectory> = BTreeMap::new();
    for frame in recording.frames() {
        for landmark in &frame.landmarks {
            let (Some(bone), Some(stream)) = (landmark.bone_name(), Stream::route(landmark)) else {
                continue;
            };
            let trajectory = trajectories.entry((stream, landmark.joint_id())).or_default();
            // Keep one sample per timestamp.
            if trajectory.times.last() == Some(&frame.timestamp) {
                continue;
            }
            trajectory.bone = bone;
            trajectory.times.push(frame.timestamp);
            trajectory.positions.push(transform.apply(&landmark.position()));
        }
    }
    trajectories
}

#[derive(Debug, Default)]
struct ErrorSums {
    scored: usize,
    kinematic: f64,
    blended: f64,
}

impl ErrorSums {
    fn rmse(sum: f64, count: usize) -> f64 {
        if count == 0 {
            0.0
        } else {
            (sum / count as f64).sqrt()
        }
    }
}

/// Evaluates one filter per trajectory.
///
/// `lookahead` of `None` predicts exactly one recorded step ahead. Training
/// is awaited after every sample so results do not depend on thread timing.
pub fn evaluate(
    recording: &Recording,
    transform: &CoordinateTransform,
    predictor: &PredictorConfig,
    lookahead: Option<f64>,
) -> Result<PredictResult> {
    let mut joints = Vec::new();
    let mut total = ErrorSums::default();

    for ((stream, joint), trajectory) in trajectories(recording, transform) {
        let mut filter = PredictiveFilter::new(predictor.clone())
            .context("Invalid predictor configuration")?;
        let mut sums = ErrorSums::default();

        for (i, (time, position)) in trajectory.times.iter().zip(&trajectory.positions).enumerate() {
            filter.update_position(joint, *position, *time);
            filter.wait_for_training();

            let (delta, actual) = match lookahead {
                Some(delta) => (delta, trajectory.at(time + delta)),
                None => match trajectory.times.get(i + 1) {
                    Some(next) => (next - time, trajectory.positions.get(i + 1).copied()),
                    None => (0.0, None),
                },
            };
            let Some(actual) = actual else {
                continue;
            };
            let estimate = filter.estimate_position(joint, delta);
            sums.scored += 1;
            sums.kinematic += (estimate.kinematic - actual).norm_squared();
            sums.blended += (estimate.blended - actual).norm_squared();
        }

        total.scored += sums.scored;
        total.kinematic += sums.kinematic;
        total.blended += sums.blended;
        joints.push(JointError {
            stream: stream.to_string(),
            joint,
            bone: trajectory.bone,
            scored: sums.scored,
            kinematic_rmse: ErrorSums::rmse(sums.kinematic, sums.scored),
            blended_rmse: ErrorSums::rmse(sums.blended, sums.scored),
            model_trained: filter.has_model(Channel::Position, joint),
        });
    }

    Ok(PredictResult {
        input: String::new(),
        lookahead,
        joints,
        kinematic_rmse: ErrorSums::rmse(total.kinematic, total.scored),
        blended_rmse: ErrorSums::rmse(total.blended, total.scored),
    })
}

/// Run the predict command
///
/// # Arguments
/// * `input` - Path to the JSON lines recording
/// * `lookahead` - Fixed horizon in seconds; one recorded step when absent
/// * `batch` - Optional override of the training batch size
/// * `json_output` - Whether to output machine-readable JSON
pub fn run(
    input: &str,
    lookahead: Option<f64>,
    batch: Option<usize>,
    json_output: bool,
) -> Result<ExitCode> {
    let mut predictor = PredictorConfig::default();
    if let Some(batch) = batch {
        predictor = predictor.with_train_batch_size(batch);
    }
    let transform = CoordinateTransform::default();

    let recording = match Recording::load(Path::new(input)) {
        Ok(recording) => recording,
        Err(err) if json_output => {
            let error =
                JsonError::new(error_codes::RECORDING_READ, err.to_string()).with_file(input);
            let output: CommandOutput<PredictResult> = CommandOutput::failure(error);
            println!("{}", serde_json::to_string_pretty(&output)?);
            return Ok(ExitCode::from(1));
        }
        Err(err) => {
            return Err(err).with_context(|| format!("Failed to read recording: {}", input))
        }
    };

    let mut result = evaluate(&recording, &transform, &predictor, lookahead)?;
    result.input = input.to_string();

    if json_output {
        let json = serde_json::to_string_pretty(&CommandOutput::success(result))
            .context("Failed to serialize predict output")?;
        println!("{}", json);
        return Ok(ExitCode::SUCCESS);
    }

    println!("{} {}", "Prediction error:".cyan().bold(), input);
    match lookahead {
        Some(delta) => println!("  {} {:.3}s", "Horizon:".dimmed(), delta),
        None => println!("  {} one recorded step", "Horizon:".dimmed()),
    }
    println!(
        "\n  {:<12} {:>5} {:<16} {:>7} {:>12} {:>12}",
        "stream", "joint", "bone", "scored", "kinematic", "blended"
    );
    for joint in &result.joints {
        let blended = format!("{:.5}", joint.blended_rmse);
        let blended = if joint.blended_rmse < joint.kinematic_rmse {
            blended.green()
        } else {
            blended.normal()
        };
        println!(
            "  {:<12} {:>5} {:<16} {:>7} {:>12.5} {:>12}{}",
            joint.stream,
            joint.joint,
            joint.bone,
            joint.scored,
            joint.kinematic_rmse,
            blended,
            if joint.model_trained { " *" } else { "" }
        );
    }
    println!(
        "\n  {} kinematic {:.5}, blended {:.5}",
        "Overall RMSE:".dimmed(),
        result.kinematic_rmse,
        result.blended_rmse
    );
    if result.joints.iter().any(|j| j.model_trained) {
        println!("  {}", "* joint has a trained model".dimmed());
    }

    Ok(ExitCode::SUCCESS)
}
