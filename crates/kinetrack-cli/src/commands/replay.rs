//! Replay command implementation
//!
//! Feeds a recording through the full pipeline: a producer thread routes each
//! frame's landmarks onto the ingestion queues, and the frame loop drains them
//! into the left arm, right arm, and body trackers at the recording's frame
//! times.

use std::path::Path;
use std::process::ExitCode;
use std::thread;

use anyhow::{Context, Result};
use colored::Colorize;
use crossbeam_channel::bounded;
use kinetrack_predict::Channel;
use kinetrack_rig::Side;
use tracing::debug;

use crate::config::TrackerConfig;
use crate::ingest::IngestHub;
use crate::recording::{Recording, Replayer};
use crate::tracker::LimbTracker;

use super::json_output::{
    error_codes, skeleton_poses, CommandOutput, JsonError, ReplayResult, TrackerResult,
};

/// Trackers after a replay, plus routing counters.
#[derive(Debug)]
pub struct ReplayOutcome {
    pub trackers: Vec<LimbTracker>,
    pub routed: usize,
    pub dropped: usize,
}

/// Runs `recording` through fresh trackers built from `config`.
///
/// Producer and consumer advance in lockstep, one frame at a time, so every
/// tick sees exactly the landmarks of its own frame.
pub fn replay_recording(recording: &Recording, config: &TrackerConfig) -> Result<ReplayOutcome> {
    let mut trackers = vec![
        LimbTracker::arm(Side::Left, config)?,
        LimbTracker::arm(Side::Right, config)?,
        LimbTracker::body(config)?,
    ];

    let hub = IngestHub::new();
    let router = hub.router();
    let recording = recording.clone();
    let (clock_tx, clock_rx) = bounded::<f64>(0);
    let (ack_tx, ack_rx) = bounded::<()>(0);

    let producer = thread::Builder::new()
        .name("kinetrack-replay-producer".to_string())
        .spawn(move || {
            let (mut routed, mut dropped) = (0, 0);
            let mut replayer = Replayer::new(&recording);
            for now in recording.frames().iter().map(|f| f.timestamp) {
                // Frames sharing a timestamp are released together.
                let due = replayer.due(now);
                if due.is_empty() {
                    continue;
                }
                for frame in due {
                    let queued = router.route_all(&frame.landmarks);
                    routed += queued;
                    dropped += frame.landmarks.len() - queued;
                }
                if clock_tx.send(now).is_err() || ack_rx.recv().is_err() {
                    break;
                }
            }
            (routed, dropped)
        })
        .context("Failed to spawn replay producer")?;

    for now in clock_rx.iter() {
        for tracker in &mut trackers {
            let batch = hub.drain(tracker.streams());
            let report = tracker.tick(&batch, now);
            debug!(tracker = tracker.name(), now, ?report, "replayed frame");
        }
        if ack_tx.send(()).is_err() {
            break;
        }
    }

    let (routed, dropped) = producer
        .join()
        .map_err(|_| anyhow::anyhow!("Replay producer panicked"))?;
    for tracker in &mut trackers {
        tracker.wait_for_training();
    }

    Ok(ReplayOutcome {
        trackers,
        routed,
        dropped,
    })
}

fn tracker_result(tracker: &LimbTracker) -> TrackerResult {
    TrackerResult {
        name: tracker.name().to_string(),
        streams: tracker.streams().iter().map(|s| s.to_string()).collect(),
        ticks: tracker.stats(),
        trained_joints: tracker
            .joints()
            .keys()
            .copied()
            .filter(|joint| tracker.filter().has_model(Channel::Position, *joint))
            .collect(),
        poses: skeleton_poses(tracker.skeleton()),
    }
}

fn load_config(config_path: Option<&str>) -> Result<TrackerConfig> {
    match config_path {
        Some(path) => TrackerConfig::load(Path::new(path))
            .with_context(|| format!("Failed to load config: {}", path)),
        None => Ok(TrackerConfig::default()),
    }
}

/// Run the replay command
///
/// # Arguments
/// * `input` - Path to the JSON lines recording
/// * `config_path` - Optional tracker configuration file
/// * `json_output` - Whether to output machine-readable JSON
///
/// # Returns
/// Exit code: 0 on success, 1 on error
pub fn run(input: &str, config_path: Option<&str>, json_output: bool) -> Result<ExitCode> {
    if json_output {
        run_json(input, config_path)
    } else {
        run_human(input, config_path)
    }
}

fn run_human(input: &str, config_path: Option<&str>) -> Result<ExitCode> {
    let config = load_config(config_path)?;
    let recording = Recording::load(Path::new(input))
        .with_context(|| format!("Failed to read recording: {}", input))?;

    println!("{} {}", "Replaying:".cyan().bold(), input);
    println!(
        "  {} {} frames, {:.2}s",
        "Recording:".dimmed(),
        recording.len(),
        recording.duration()
    );

    let outcome = replay_recording(&recording, &config)?;
    println!(
        "  {} {} routed, {} dropped",
        "Landmarks:".dimmed(),
        outcome.routed,
        outcome.dropped
    );

    for tracker in &outcome.trackers {
        let result = tracker_result(tracker);
        let ticks = result.ticks;
        println!("\n{} {}", "Tracker".cyan().bold(), result.name.bold());
        println!(
            "  {} {} observed, {} predicted, {} timed out, {} idle",
            "Ticks:".dimmed(),
            ticks.observed.to_string().green(),
            ticks.predicted.to_string().yellow(),
            ticks.timed_out.to_string().red(),
            ticks.idle
        );
        println!(
            "  {} {} accepted, {} skipped",
            "Samples:".dimmed(),
            ticks.accepted,
            ticks.skipped
        );
        if !result.trained_joints.is_empty() {
            println!(
                "  {} {:?}",
                "Trained joints:".dimmed(),
                result.trained_joints
            );
        }
        if ticks.observed == 0 {
            continue;
        }
        for (name, pose) in &result.poses {
            let [x, y, z] = pose.position;
            println!("    {:<16} ({:>7.3}, {:>7.3}, {:>7.3})", name, x, y, z);
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn run_json(input: &str, config_path: Option<&str>) -> Result<ExitCode> {
    let config = match load_config(config_path) {
        Ok(config) => config,
        Err(err) => {
            let error = JsonError::new(error_codes::CONFIG_INVALID, format!("{:#}", err))
                .with_file(config_path.unwrap_or_default());
            return print_failure(error);
        }
    };
    let recording = match Recording::load(Path::new(input)) {
        Ok(recording) => recording,
        Err(err) => {
            let error =
                JsonError::new(error_codes::RECORDING_READ, err.to_string()).with_file(input);
            return print_failure(error);
        }
    };
    let outcome = match replay_recording(&recording, &config) {
        Ok(outcome) => outcome,
        Err(err) => {
            return print_failure(JsonError::new(error_codes::PIPELINE, format!("{:#}", err)));
        }
    };

    let result = ReplayResult {
        input: input.to_string(),
        frames: recording.len(),
        duration: recording.duration(),
        routed: outcome.routed,
        dropped: outcome.dropped,
        trackers: outcome.trackers.iter().map(tracker_result).collect(),
    };
    let json = serde_json::to_string_pretty(&CommandOutput::success(result))
        .context("Failed to serialize replay output")?;
    println!("{}", json);
    Ok(ExitCode::SUCCESS)
}

fn print_failure(error: JsonError) -> Result<ExitCode> {
    let output: CommandOutput<ReplayResult> = CommandOutput::failure(error);
    let json = serde_json::to_string_pretty(&output).context("Failed to serialize error")?;
    println!("{}", json);
    Ok(ExitCode::from(1))
}
