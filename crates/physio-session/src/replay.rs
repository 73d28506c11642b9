//! Offline replay of recorded SDK frames.
//!
//! A recording is JSON lines, one `{"timestamp_ms": .., "frame": ..}` per
//! line. Replay runs the live pipeline with the recording's timestamps as
//! the clock: the frames inside the first calibration window calibrate the
//! user, the rest drive the exercise at the configured tick spacing.

use std::fs::File;
use std::io::{BufRead, BufReader, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use physio_core::{Error, Result, Timestamp};
use physio_pose::{SdkFrame, SnapshotBuilder};

use crate::calibration::{is_valid_sample, CalibrationEngine, CalibrationOutcome};
use crate::exercise::ExerciseDefinition;
use crate::run::{ExerciseEvent, ExerciseRun, TickInput, TickReport};
use crate::settings::SessionConfig;

/// One line of a recording
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordedFrame {
    pub timestamp_ms: i64,
    pub frame: SdkFrame,
}

/// Parse a JSON-lines recording; blank lines are ignored
pub fn read_recording(reader: impl BufRead) -> Result<Vec<RecordedFrame>> {
    let mut frames = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let frame = serde_json::from_str(&line)
            .map_err(|e| Error::Serialization(format!("line {}: {}", index + 1, e)))?;
        frames.push(frame);
    }
    Ok(frames)
}

pub fn load_recording(path: impl AsRef<Path>) -> Result<Vec<RecordedFrame>> {
    let file = File::open(path.as_ref())?;
    read_recording(BufReader::new(file))
}

pub fn write_recording(mut writer: impl Write, frames: &[RecordedFrame]) -> Result<()> {
    for frame in frames {
        serde_json::to_writer(&mut writer, frame)?;
        writer.write_all(b"\n")?;
    }
    writer.flush()?;
    Ok(())
}

/// What happened during a replay
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReplaySummary {
    pub calibration: CalibrationOutcome,
    pub calibration_samples: usize,
    /// Frames consumed, calibration included
    pub frames: usize,
    pub reports: usize,
    pub events: Vec<ExerciseEvent>,
    pub completed: bool,
    pub final_step_index: usize,
    pub last_report: Option<TickReport>,
}

/// Calibrate on the start of `frames`, then run `exercise` over the rest
pub fn replay(
    frames: &[RecordedFrame],
    exercise: &ExerciseDefinition,
    config: &SessionConfig,
) -> Result<ReplaySummary> {
    exercise.validate()?;

    let mut builder = SnapshotBuilder::new();
    let start_ms = frames.first().map_or(0, |f| f.timestamp_ms);
    let window_end = start_ms + (config.calibration.window_secs * 1000.0).round() as i64;
    let sample_interval = config.calibration.sample_interval_ms as i64;

    let mut samples = Vec::new();
    let mut next_sample_at = start_ms;
    let mut consumed = 0;
    for recorded in frames.iter().take_while(|f| f.timestamp_ms < window_end) {
        consumed += 1;
        builder.ingest(&recorded.frame);
        if recorded.timestamp_ms < next_sample_at {
            continue;
        }
        next_sample_at = recorded.timestamp_ms + sample_interval;
        if let Some(skeleton) = builder.current() {
            if is_valid_sample(skeleton, config.calibration.min_joints) {
                samples.push(skeleton.clone());
            }
        }
    }

    let engine = CalibrationEngine::new(config.calibration.clone());
    let calibration = engine.evaluate_samples(&samples);
    let mut summary = ReplaySummary {
        calibration: calibration.clone(),
        calibration_samples: samples.len(),
        frames: consumed,
        reports: 0,
        events: Vec::new(),
        completed: false,
        final_step_index: 0,
        last_report: None,
    };

    let Ok(metrics) = calibration else {
        return Ok(summary);
    };

    let remaining = &frames[consumed..];
    let Some(first) = remaining.first() else {
        info!("Recording ended during calibration");
        return Ok(summary);
    };

    let mut run = ExerciseRun::new(exercise.clone(), &config.scoring);
    summary
        .events
        .push(run.start(Timestamp::from_millis(first.timestamp_ms)));

    let tick_interval = config.tick_interval_ms as i64;
    let mut next_tick_at = first.timestamp_ms;
    for recorded in remaining {
        summary.frames += 1;
        builder.ingest(&recorded.frame);
        if recorded.timestamp_ms < next_tick_at {
            continue;
        }
        next_tick_at = recorded.timestamp_ms + tick_interval;

        let input = TickInput {
            skeleton: builder.current(),
            previous: builder.previous(),
            metrics: Some(&metrics),
        };
        if let Some(report) = run.tick(input, Timestamp::from_millis(recorded.timestamp_ms)) {
            summary.reports += 1;
            summary.events.extend(report.events.iter().cloned());
            summary.last_report = Some(report);
        }
        if !run.is_active() {
            break;
        }
    }

    summary.completed = summary
        .events
        .iter()
        .any(|e| matches!(e, ExerciseEvent::ExerciseCompleted { .. }));
    summary.final_step_index = run.state().current_step_index;
    debug!(
        "Replay consumed {} of {} frames, {} reports",
        summary.frames,
        frames.len(),
        summary.reports
    );
    Ok(summary)
}
