//! Step tolerances and their conversion to absolute millimeters.

use serde::{Deserialize, Serialize};

use physio_core::UserMetrics;

/// Tolerances as declared by an exercise step
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StepTolerance {
    /// Allowed deviation from a target angle (degrees)
    #[serde(default = "default_angle_tolerance")]
    pub angle_tolerance: f64,
    /// Distance tolerance as a fraction of a body measurement
    #[serde(default = "default_distance_tolerance")]
    pub distance_tolerance: f64,
}

fn default_angle_tolerance() -> f64 {
    20.0
}

fn default_distance_tolerance() -> f64 {
    0.2
}

impl Default for StepTolerance {
    fn default() -> Self {
        Self {
            angle_tolerance: default_angle_tolerance(),
            distance_tolerance: default_distance_tolerance(),
        }
    }
}

/// Absolute tolerances in millimeters
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Tolerances {
    pub arm_tol: f64,
    pub hip_tol: f64,
    pub height_tol: f64,
    pub leg_tol: f64,
}

impl Tolerances {
    /// Scale a distance fraction by the user's measurements
    pub fn scale(distance_tolerance: f64, metrics: &UserMetrics) -> Self {
        Self {
            arm_tol: distance_tolerance * metrics.arm_length,
            hip_tol: distance_tolerance * metrics.hip_width,
            height_tol: distance_tolerance * metrics.height,
            leg_tol: distance_tolerance * metrics.leg_length,
        }
    }

    pub fn for_step(tolerance: &StepTolerance, metrics: &UserMetrics) -> Self {
        Self::scale(tolerance.distance_tolerance, metrics)
    }
}
