//! Motion recordings.
//!
//! A recording is a sequence of timestamped landmark frames, stored one JSON
//! object per line.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ingest::Landmark;

/// Landmarks captured at one instant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameRecord {
    /// Seconds since the start of the recording.
    pub timestamp: f64,
    pub landmarks: Vec<Landmark>,
}

/// Errors that can occur while reading or writing a recording.
#[derive(Debug, Error)]
pub enum RecordingError {
    #[error("failed to access recording {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid frame at {}:{line}: {source}", path.display())]
    Parse {
        path: PathBuf,
        line: usize,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to encode frame: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("frame {index} has a non-finite timestamp ({timestamp})")]
    NonFiniteTimestamp { index: usize, timestamp: f64 },
    #[error("frame {index} goes back in time ({timestamp} after {previous})")]
    OutOfOrder {
        index: usize,
        timestamp: f64,
        previous: f64,
    },
}

/// Ordered frames.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Recording {
    frames: Vec<FrameRecord>,
}

impl Recording {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a recording, rejecting frames whose timestamps are not finite
    /// or decrease.
    pub fn from_frames(frames: Vec<FrameRecord>) -> Result<Self, RecordingError> {
        if let Some((index, frame)) = frames
            .iter()
            .enumerate()
            .find(|(_, frame)| !frame.timestamp.is_finite())
        {
            return Err(RecordingError::NonFiniteTimestamp {
                index,
                timestamp: frame.timestamp,
            });
        }
        for (index, pair) in frames.windows(2).enumerate() {
            if pair[1].timestamp < pair[0].timestamp {
                return Err(RecordingError::OutOfOrder {
                    index: index + 1,
                    timestamp: pair[1].timestamp,
                    previous: pair[0].timestamp,
                });
            }
        }
        Ok(Self { frames })
    }

    pub fn frames(&self) -> &[FrameRecord] {
        &self.frames
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Timestamp of the last frame, or zero.
    pub fn duration(&self) -> f64 {
        self.frames.last().map_or(0.0, |f| f.timestamp)
    }

    /// Reads a JSON lines recording. Blank lines are skipped.
    pub fn load(path: &Path) -> Result<Self, RecordingError> {
        let io_error = |source| RecordingError::Io {
            path: path.to_path_buf(),
            source,
        };
        let reader = BufReader::new(File::open(path).map_err(io_error)?);
        let mut frames = Vec::new();
        for (index, line) in reader.lines().enumerate() {
            let line = line.map_err(io_error)?;
            if line.trim().is_empty() {
                continue;
            }
            let frame = serde_json::from_str(&line).map_err(|source| RecordingError::Parse {
                path: path.to_path_buf(),
                line: index + 1,
                source,
            })?;
            frames.push(frame);
        }
        Self::from_frames(frames)
    }

    /// Writes the recording as JSON lines.
    pub fn save(&self, path: &Path) -> Result<(), RecordingError> {
        let io_error = |source| RecordingError::Io {
            path: path.to_path_buf(),
            source,
        };
        let mut writer = BufWriter::new(File::create(path).map_err(io_error)?);
        for frame in &self.frames {
            serde_json::to_writer(&mut writer, frame)?;
            writer.write_all(b"\n").map_err(io_error)?;
        }
        writer.flush().map_err(io_error)
    }
}

// =============================================================================
// Recorder
// =============================================================================

/// Captures frames while recording is on.
#[derive(Debug, Default)]
pub struct MotionRecorder {
    frames: Vec<FrameRecord>,
    recording: bool,
    started_at: f64,
}

impl MotionRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a fresh take; timestamps are stored relative to `now`.
    pub fn start(&mut self, now: f64) {
        self.frames.clear();
        self.recording = true;
        self.started_at = now;
    }

    pub fn is_recording(&self) -> bool {
        self.recording
    }

    /// Stores a frame if recording. Returns whether it was stored.
    pub fn capture(&mut self, now: f64, landmarks: &[Landmark]) -> bool {
        if !self.recording {
            return false;
        }
        let timestamp = (now - self.started_at).max(0.0);
        let timestamp = self
            .frames
            .last()
            .map_or(timestamp, |last| timestamp.max(last.timestamp));
        self.frames.push(FrameRecord {
            timestamp,
            landmarks: landmarks.to_vec(),
        });
        true
    }

    /// Stops recording and hands over the take.
    pub fn stop(&mut self) -> Recording {
        self.recording = false;
        Recording {
            frames: std::mem::take(&mut self.frames),
        }
    }
}

// =============================================================================
// Replayer
// =============================================================================

/// Releases frames once their timestamp is due.
#[derive(Debug)]
pub struct Replayer<'a> {
    recording: &'a Recording,
    next: usize,
}

impl<'a> Replayer<'a> {
    pub fn new(recording: &'a Recording) -> Self {
        Self { recording, next: 0 }
    }

    /// Frames with `timestamp <= elapsed` not yet released.
    pub fn due(&mut self, elapsed: f64) -> &'a [FrameRecord] {
        let frames = self.recording.frames();
        let start = self.next;
        while self.next < frames.len() && frames[self.next].timestamp <= elapsed {
            self.next += 1;
        }
        &frames[start..self.next]
    }

    pub fn is_finished(&self) -> bool {
        self.next >= self.recording.len()
    }

    pub fn rewind(&mut self) {
        self.next = 0;
    }
}
