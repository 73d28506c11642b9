//! Session configuration.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use physio_core::{Error, Result};
use physio_pose::{MissingJointPolicy, DEFAULT_MOTION_THRESHOLD_MM};

/// Prefix for environment overrides, e.g. `PHYSIO_SCORING__MIN_ACCURACY=85`
pub const ENV_PREFIX: &str = "PHYSIO";

/// Complete session configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Period of the scoring/progress tick (milliseconds)
    pub tick_interval_ms: u64,

    /// Buffered events per subscriber before the slowest one lags
    pub event_capacity: usize,

    pub calibration: CalibrationConfig,

    pub scoring: ScoringConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    /// Sampling window (seconds)
    pub window_secs: f64,

    /// Pause between sampling attempts (milliseconds)
    pub sample_interval_ms: u64,

    /// Valid samples needed to derive metrics
    pub min_samples: usize,

    /// Tracked joints a sample needs
    pub min_joints: usize,

    /// Largest accepted sideways torso offset (mm)
    pub max_torso_offset_x: f64,

    /// Accepted torso depth, exclusive bounds (mm)
    pub min_torso_z: f64,
    pub max_torso_z: f64,

    /// Accepted head-to-ankle height, inclusive bounds (mm)
    pub min_height: f64,
    pub max_height: f64,

    /// Leg length used when neither leg could be measured (mm)
    pub default_leg_length: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    /// Accuracy a tick needs to count towards the hold (percent)
    pub min_accuracy: f64,

    /// Accuracy reported as excellent (percent)
    pub excellent_accuracy: f64,

    /// Foot displacement that counts as a jump (mm)
    pub motion_threshold_mm: f64,

    pub missing_joints: MissingJointPolicy,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 100,
            event_capacity: 256,
            calibration: CalibrationConfig::default(),
            scoring: ScoringConfig::default(),
        }
    }
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            window_secs: 5.0,
            sample_interval_ms: 50,
            min_samples: 5,
            min_joints: 6,
            max_torso_offset_x: 400.0,
            min_torso_z: 1000.0,
            max_torso_z: 3000.0,
            min_height: 1000.0,
            max_height: 2500.0,
            default_leg_length: 500.0,
        }
    }
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            min_accuracy: 80.0,
            excellent_accuracy: 90.0,
            motion_threshold_mm: DEFAULT_MOTION_THRESHOLD_MM,
            missing_joints: MissingJointPolicy::ZeroDefault,
        }
    }
}

impl SessionConfig {
    /// Load configuration from a file, with environment overrides
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_string_lossy();
        let settings = config::Config::builder()
            .add_source(config::File::with_name(&path))
            .add_source(environment())
            .build()
            .map_err(config_error)?;

        settings.try_deserialize().map_err(config_error)
    }

    /// Load from environment variables only
    pub fn from_env() -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(environment())
            .build()
            .map_err(config_error)?;

        settings.try_deserialize().map_err(config_error)
    }

    /// Load from `path` when given, otherwise from the environment
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => Self::from_env(),
        }
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }
}

impl CalibrationConfig {
    pub fn window(&self) -> Duration {
        Duration::from_secs_f64(self.window_secs.max(0.0))
    }

    pub fn sample_interval(&self) -> Duration {
        Duration::from_millis(self.sample_interval_ms)
    }
}

fn environment() -> config::Environment {
    config::Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true)
}

fn config_error(e: config::ConfigError) -> Error {
    Error::Config(e.to_string())
}
