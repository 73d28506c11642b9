//! Calibration: derive the user's body measurements from a few seconds of
//! neutral standing.
//!
//! The engine samples skeletons for a fixed wall-clock window, keeps the
//! ones where the key joints are confidently tracked, averages them and
//! checks the averaged pose for plausibility before deriving
//! [`UserMetrics`].

use std::collections::BTreeMap;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use physio_core::{
    Error, JointName, Position3D, Result, Skeleton, UserMetrics, CAPTURE_CONFIDENCE_THRESHOLD,
};
use physio_pose::SnapshotBuilder;

use crate::settings::CalibrationConfig;
use crate::source::FrameSource;

/// Joints every calibration sample must carry
pub const CALIBRATION_JOINTS: [JointName; 6] = [
    JointName::Head,
    JointName::Torso,
    JointName::LeftAnkle,
    JointName::RightAnkle,
    JointName::RightShoulder,
    JointName::RightWrist,
];

/// Why a calibration attempt produced no metrics
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum CalibrationFailure {
    #[error("only {collected} valid samples collected (need {required})")]
    InsufficientSamples { collected: usize, required: usize },

    #[error("torso off-center (x={x:.0}mm)")]
    OffCenter { x: f64 },

    #[error("torso at a bad distance (z={z:.0}mm)")]
    BadDistance { z: f64 },

    #[error("unrealistic height ({height:.0}mm)")]
    UnrealisticHeight { height: f64 },

    #[error("joint {joint} missing from sample {sample}")]
    MalformedSample { joint: JointName, sample: usize },
}

impl CalibrationFailure {
    /// Stable machine-readable reason
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InsufficientSamples { .. } => "insufficient-samples",
            Self::OffCenter { .. } => "off-center",
            Self::BadDistance { .. } => "bad-distance",
            Self::UnrealisticHeight { .. } => "unrealistic-height",
            Self::MalformedSample { .. } => "malformed-sample",
        }
    }

    /// What the user should change before retrying
    pub fn advice(&self) -> &'static str {
        match self {
            Self::InsufficientSamples { .. } => {
                "Make sure your whole body is visible. Stand still with arms down and feet together."
            }
            Self::OffCenter { .. } => "Move to the center of the frame.",
            Self::BadDistance { .. } => {
                "Stand about 1.5 to 2 meters from the camera, with the camera at chest height."
            }
            Self::UnrealisticHeight { .. } => {
                "Make sure your head and ankles are visible and tracked steadily."
            }
            Self::MalformedSample { .. } => "Calibration failed. Please try again.",
        }
    }
}

/// Result of one calibration attempt
pub type CalibrationOutcome = std::result::Result<UserMetrics, CalibrationFailure>;

/// Whether `skeleton` is usable as a calibration sample
pub fn is_valid_sample(skeleton: &Skeleton, min_joints: usize) -> bool {
    if skeleton.len() < min_joints {
        return false;
    }

    let missing: Vec<JointName> = CALIBRATION_JOINTS
        .iter()
        .copied()
        .filter(|&name| {
            skeleton
                .get(name)
                .map_or(true, |j| j.confidence < CAPTURE_CONFIDENCE_THRESHOLD)
        })
        .collect();

    if !missing.is_empty() {
        debug!("Calibration: missing or low-confidence joints: {:?}", missing);
        return false;
    }
    true
}

/// Per-joint mean position over `samples`.
///
/// The joints of the first sample define the average; every other sample
/// must carry all of them.
pub fn average_samples(
    samples: &[Skeleton],
) -> std::result::Result<BTreeMap<JointName, Position3D>, CalibrationFailure> {
    let mut averaged = BTreeMap::new();
    let Some(first) = samples.first() else {
        return Ok(averaged);
    };
    let n = samples.len() as f64;

    for name in first.names() {
        let mut sum = Position3D::origin();
        for (index, sample) in samples.iter().enumerate() {
            let Some(p) = sample.position(name) else {
                return Err(CalibrationFailure::MalformedSample {
                    joint: name,
                    sample: index,
                });
            };
            sum = Position3D::new(sum.x + p.x, sum.y + p.y, sum.z + p.z);
        }
        averaged.insert(name, Position3D::new(sum.x / n, sum.y / n, sum.z / n));
    }

    Ok(averaged)
}

/// Pulls skeletons for the sampling loop
pub trait SkeletonFeed {
    /// Latest skeleton, or `None` when nothing new is tracked.
    ///
    /// [`Error::Device`] aborts calibration; other errors are logged and
    /// the loop continues.
    fn next_skeleton(&mut self) -> Result<Option<Skeleton>>;
}

/// Feed that reads frames straight from a source
pub struct SourceFeed<'a> {
    source: &'a mut dyn FrameSource,
    builder: SnapshotBuilder,
}

impl<'a> SourceFeed<'a> {
    pub fn new(source: &'a mut dyn FrameSource) -> Self {
        Self {
            source,
            builder: SnapshotBuilder::new(),
        }
    }
}

impl SkeletonFeed for SourceFeed<'_> {
    fn next_skeleton(&mut self) -> Result<Option<Skeleton>> {
        let frame = self.source.next_frame()?;
        Ok(self.builder.ingest(&frame).cloned())
    }
}

/// Calibration procedure
#[derive(Debug, Clone, Default)]
pub struct CalibrationEngine {
    config: CalibrationConfig,
}

impl CalibrationEngine {
    pub fn new(config: CalibrationConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &CalibrationConfig {
        &self.config
    }

    /// Sample `feed` for the configured window, then derive metrics.
    ///
    /// Blocks the calling thread. The loop ends early when `is_active`
    /// returns false; the samples collected so far are still evaluated.
    pub fn run(
        &self,
        feed: &mut dyn SkeletonFeed,
        is_active: &dyn Fn() -> bool,
    ) -> Result<CalibrationOutcome> {
        let window = self.config.window();
        let interval = self.config.sample_interval();
        let start = Instant::now();
        let mut samples = Vec::new();

        info!("Calibration started ({:.1}s window)", window.as_secs_f64());

        while start.elapsed() < window && is_active() {
            match feed.next_skeleton() {
                Ok(Some(skeleton)) => {
                    if is_valid_sample(&skeleton, self.config.min_joints) {
                        samples.push(skeleton);
                    }
                }
                Ok(None) => {}
                Err(Error::Device(msg)) => {
                    error!("Calibration aborted by device failure: {}", msg);
                    return Err(Error::Device(msg));
                }
                Err(e) => warn!("Calibration update error: {}", e),
            }
            std::thread::sleep(interval);
        }

        Ok(self.evaluate_samples(&samples))
    }

    /// Validate collected samples and derive the user's metrics
    pub fn evaluate_samples(&self, samples: &[Skeleton]) -> CalibrationOutcome {
        let outcome = self.derive(samples);
        match &outcome {
            Ok(metrics) => info!(
                "Calibration successful: {} samples, height={:.0}mm, arm={:.0}mm, leg={:.0}mm",
                samples.len(),
                metrics.height,
                metrics.arm_length,
                metrics.leg_length
            ),
            Err(failure) => info!("Calibration failed: {}", failure),
        }
        outcome
    }

    fn derive(&self, samples: &[Skeleton]) -> CalibrationOutcome {
        let cfg = &self.config;
        if samples.len() < cfg.min_samples {
            return Err(CalibrationFailure::InsufficientSamples {
                collected: samples.len(),
                required: cfg.min_samples,
            });
        }

        let avg = average_samples(samples)?;
        let get = |name| avg.get(&name).copied();

        let torso_x = get(JointName::Torso).map_or(0.0, |p| p.x);
        let torso_z = get(JointName::Torso).map_or(1500.0, |p| p.z);
        if torso_x.abs() > cfg.max_torso_offset_x {
            return Err(CalibrationFailure::OffCenter { x: torso_x });
        }
        if !(torso_z > cfg.min_torso_z && torso_z < cfg.max_torso_z) {
            return Err(CalibrationFailure::BadDistance { z: torso_z });
        }

        let y = |name| get(name).map_or(0.0, |p: Position3D| p.y);
        let x = |name| get(name).map_or(0.0, |p: Position3D| p.x);

        let height = (y(JointName::Head) - y(JointName::LeftAnkle)).abs();
        if height < cfg.min_height || height > cfg.max_height {
            return Err(CalibrationFailure::UnrealisticHeight { height });
        }

        let arm_length = match (get(JointName::RightShoulder), get(JointName::RightWrist)) {
            (Some(shoulder), Some(wrist)) => shoulder.distance_to(&wrist),
            _ => 0.0,
        };
        let hip_width = (x(JointName::RightHip) - x(JointName::LeftHip)).abs();
        let shoulder_width = (x(JointName::RightShoulder) - x(JointName::LeftShoulder)).abs();

        let left_leg = (y(JointName::LeftHip) - y(JointName::LeftKnee)).abs();
        let right_leg = (y(JointName::RightHip) - y(JointName::RightKnee)).abs();
        let leg_length = if left_leg != 0.0 || right_leg != 0.0 {
            left_leg.max(right_leg)
        } else {
            cfg.default_leg_length
        };

        let head_y = get(JointName::Head).map_or(height * 0.8, |p| p.y);
        let standing_head_y = head_y - y(JointName::Torso);

        Ok(UserMetrics {
            height,
            arm_length,
            hip_width,
            shoulder_width,
            leg_length,
            standing_head_y,
        })
    }
}
