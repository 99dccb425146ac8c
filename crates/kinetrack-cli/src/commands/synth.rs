//! Synth command implementation
//!
//! Generates a right-arm recording from the two-link arm model. A PD
//! controller chases slowly varying shoulder and elbow targets; the resulting
//! joint positions are written as pose and hand landmarks with seeded jitter.

use std::path::Path;
use std::process::ExitCode;

use anyhow::{Context, Result};
use colored::Colorize;
use kinetrack_rig::dynamics::{ELBOW_RANGE, SHOULDER_RANGE};
use kinetrack_rig::presets::{self, bone_name};
use kinetrack_rig::{ArmParameters, PdController, Side, TwoLinkArm, Vec3};
use nalgebra::Vector2;
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg32;

use crate::config::CoordinateTransform;
use crate::ingest::Landmark;
use crate::recording::{MotionRecorder, Recording};

use super::json_output::{error_codes, CommandOutput, JsonError, SynthResult};

/// Frames per second of the generated recording.
pub const FRAME_RATE: f64 = 50.0;
/// Physics substeps per frame.
const SUBSTEPS: usize = 10;

/// Synthetic recording settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SynthOptions {
    pub frames: usize,
    pub seed: u64,
    /// Half-width of the uniform jitter added to every coordinate, in meters.
    pub jitter: f64,
    /// Length of a landmark-free gap in the middle of the take, in seconds.
    pub dropout: f64,
}

impl Default for SynthOptions {
    fn default() -> Self {
        Self {
            frames: 500,
            seed: 42,
            jitter: 0.005,
            dropout: 0.0,
        }
    }
}

/// Joint targets sweeping inside the joint ranges.
fn target_angles(t: f64) -> Vector2<f64> {
    let mid = |(lo, hi): (f64, f64)| (lo + hi) / 2.0;
    let half = |(lo, hi): (f64, f64)| (hi - lo) / 2.0;
    Vector2::new(
        mid(SHOULDER_RANGE) + 0.8 * half(SHOULDER_RANGE) * (t * 0.9).sin(),
        mid(ELBOW_RANGE) + 0.6 * half(ELBOW_RANGE) * (t * 1.7).cos(),
    )
}

/// Simulates the arm and records shoulder, upper arm, forearm, and wrist
/// landmarks in detector coordinates.
pub fn synthesize(options: &SynthOptions) -> Result<Recording> {
    let mut rng = Pcg32::seed_from_u64(options.seed);
    let mut arm = TwoLinkArm::new(ArmParameters::default());
    let controller = PdController::default();
    let mut skeleton = presets::arm(Side::Right);
    let transform = CoordinateTransform::default();

    let upper = bone_name("upperArm", Side::Right);
    let forearm = bone_name("forearm", Side::Right);
    // Pose landmark ids that map onto these bones.
    let tracked = [
        (bone_name("shoulder", Side::Right), 12),
        (upper.clone(), 14),
        (forearm.clone(), 16),
    ];
    let wrist = bone_name("hand", Side::Right);

    let dt = 1.0 / FRAME_RATE;
    let gap_start = options.frames / 2;
    let gap_end = gap_start + (options.dropout.max(0.0) * FRAME_RATE).round() as usize;
    let mut jitter = |p: Vec3| {
        if options.jitter > 0.0 {
            p + Vec3::from_fn(|_, _| rng.gen_range(-options.jitter..options.jitter))
        } else {
            p
        }
    };

    let mut recorder = MotionRecorder::new();
    recorder.start(0.0);
    for i in 0..options.frames {
        let t = i as f64 * dt;
        controller.drive(&mut arm, &target_angles(t));
        for _ in 0..SUBSTEPS {
            arm.step(dt / SUBSTEPS as f64);
        }
        arm.pose_skeleton(&mut skeleton, &upper, &forearm);

        let mut landmarks = Vec::new();
        if !(gap_start..gap_end).contains(&i) {
            let positions = skeleton.world_positions();
            for (bone, id) in &tracked {
                if let Some(p) = positions.get(bone) {
                    let observed = transform.invert(&jitter(*p));
                    landmarks.push(Landmark::pose(Some(Side::Right), *id, observed));
                }
            }
            if let Some(p) = positions.get(&wrist) {
                landmarks.push(Landmark::hand(Side::Right, 0, transform.invert(&jitter(*p))));
            }
        }
        recorder.capture(t, &landmarks);
    }

    Ok(recorder.stop())
}

/// Run the synth command
///
/// # Arguments
/// * `output` - Path of the JSON lines recording to write
/// * `options` - Generation settings
/// * `json_output` - Whether to output machine-readable JSON
pub fn run(output: &str, options: &SynthOptions, json_output: bool) -> Result<ExitCode> {
    let recording = synthesize(options)?;
    let landmarks = recording.frames().iter().map(|f| f.landmarks.len()).sum();

    if let Err(err) = recording.save(Path::new(output)) {
        if json_output {
            let error =
                JsonError::new(error_codes::RECORDING_WRITE, err.to_string()).with_file(output);
            let out: CommandOutput<SynthResult> = CommandOutput::failure(error);
            println!("{}", serde_json::to_string_pretty(&out)?);
            return Ok(ExitCode::from(1));
        }
        return Err(err).with_context(|| format!("Failed to write recording: {}", output));
    }

    let result = SynthResult {
        output: output.to_string(),
        frames: recording.len(),
        landmarks,
        seed: options.seed,
        duration: recording.duration(),
    };

    if json_output {
        let json = serde_json::to_string_pretty(&CommandOutput::success(result))
            .context("Failed to serialize synth output")?;
        println!("{}", json);
    } else {
        println!("{} {}", "Wrote".green().bold(), output);
        println!(
            "  {} {} frames, {} landmarks, {:.2}s (seed {})",
            "Recording:".dimmed(),
            result.frames,
            result.landmarks,
            result.duration,
            result.seed
        );
    }
    Ok(ExitCode::SUCCESS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::LandmarkKind;

    #[test]
    fn test_same_seed_same_recording() {
        let options = SynthOptions {
            frames: 50,
            ..SynthOptions::default()
        };
        assert_eq!(synthesize(&options).unwrap(), synthesize(&options).unwrap());
        let other = SynthOptions { seed: 7, ..options };
        assert_ne!(synthesize(&options).unwrap(), synthesize(&other).unwrap());
    }

    #[test]
    fn test_frame_layout() {
        let options = SynthOptions {
            frames: 10,
            jitter: 0.0,
            ..SynthOptions::default()
        };
        let recording = synthesize(&options).unwrap();
        assert_eq!(recording.len(), 10);
        let frame = &recording.frames()[3];
        assert_eq!(frame.landmarks.len(), 4);
        assert_eq!(frame.landmarks[3].kind, LandmarkKind::Hand);
        assert!((frame.timestamp - 0.06).abs() < 1e-12);
        // Shoulder is a root and never moves.
        let shoulder = &frame.landmarks[0];
        assert!((shoulder.position() - Vec3::new(-0.18, 0.0, 0.0)).norm() < 1e-12);
    }

    #[test]
    fn test_dropout_leaves_empty_frames() {
        let options = SynthOptions {
            frames: 100,
            dropout: 0.2,
            ..SynthOptions::default()
        };
        let recording = synthesize(&options).unwrap();
        let empty = recording
            .frames()
            .iter()
            .filter(|f| f.landmarks.is_empty())
            .count();
        assert_eq!(empty, 10);
    }

    #[test]
    fn test_arm_stays_finite() {
        let recording = synthesize(&SynthOptions::default()).unwrap();
        assert!(recording
            .frames()
            .iter()
            .flat_map(|f| &f.landmarks)
            .all(|l| l.position().iter().all(|c| c.is_finite())));
    }
}
