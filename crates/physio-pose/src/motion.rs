//! Frame-to-frame motion gate for jump-style steps.

use serde::{Deserialize, Serialize};
use tracing::debug;

use physio_core::{JointName, NormalizedSkeleton, Skeleton};

use crate::normalize::normalize;

/// Minimum average vertical foot displacement between frames (millimeters)
pub const DEFAULT_MOTION_THRESHOLD_MM: f64 = 20.0;

/// Exercise whose every step requires motion
pub const JUMP_EXERCISE_NAME: &str = "jumping jacks";

/// Whether a step of `exercise_name` needs the motion gate
pub fn requires_motion(exercise_name: &str, requires_jump: bool) -> bool {
    requires_jump || exercise_name.eq_ignore_ascii_case(JUMP_EXERCISE_NAME)
}

/// Average foot height: ankle, else knee, else torso, else 0 per side
fn feet_height(skeleton: &NormalizedSkeleton) -> f64 {
    use JointName::*;
    let right = skeleton
        .first_present(&[RightAnkle, RightKnee, Torso])
        .map_or(0.0, |p| p.y);
    let left = skeleton
        .first_present(&[LeftAnkle, LeftKnee, Torso])
        .map_or(0.0, |p| p.y);
    (right + left) / 2.0
}

/// Absolute change in average foot height between two frames
pub fn vertical_displacement(current: &NormalizedSkeleton, previous: &NormalizedSkeleton) -> f64 {
    (feet_height(current) - feet_height(previous)).abs()
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MotionGate {
    pub threshold_mm: f64,
}

impl MotionGate {
    pub fn new(threshold_mm: f64) -> Self {
        Self { threshold_mm }
    }

    /// Whether the gate is open for this tick.
    ///
    /// Steps that don't require motion, and the first frame after tracking
    /// starts, always pass. Feet are measured relative to the torso, so a
    /// whole-body translation (stepping or jumping in place) is not motion.
    pub fn detect(&self, required: bool, current: &Skeleton, previous: Option<&Skeleton>) -> bool {
        let Some(previous) = previous.filter(|_| required) else {
            return true;
        };

        let delta_y = vertical_displacement(&normalize(current), &normalize(previous));
        let detected = delta_y > self.threshold_mm;
        debug!("Jump motion: delta_y={:.0}mm, detected={}", delta_y, detected);
        detected
    }
}

impl Default for MotionGate {
    fn default() -> Self {
        Self::new(DEFAULT_MOTION_THRESHOLD_MM)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use physio_core::testing::{shifted, standing_skeleton, translated, without};

    fn lift_feet(dy: f64) -> Skeleton {
        let s = shifted(&standing_skeleton(), JointName::RightAnkle, 0.0, dy, 0.0);
        shifted(&s, JointName::LeftAnkle, 0.0, dy, 0.0)
    }

    #[test]
    fn test_requires_motion() {
        assert!(requires_motion("Jumping Jacks", false));
        assert!(requires_motion("Chin Tucks", true));
        assert!(!requires_motion("Chin Tucks", false));
    }

    #[test]
    fn test_gate_open_when_not_required() {
        let gate = MotionGate::default();
        let s = standing_skeleton();
        assert!(gate.detect(false, &s, Some(&s)));
        assert!(gate.detect(true, &s, None));
    }

    #[test]
    fn test_detects_foot_lift() {
        let gate = MotionGate::default();
        let still = standing_skeleton();
        assert!(!gate.detect(true, &still, Some(&still)));
        assert!(gate.detect(true, &lift_feet(50.0), Some(&still)));
        assert!(!gate.detect(true, &lift_feet(15.0), Some(&still)));
    }

    #[test]
    fn test_whole_body_shift_is_not_motion() {
        let gate = MotionGate::default();
        let moved = translated(&standing_skeleton(), 0.0, 200.0, 0.0);
        assert!(!gate.detect(true, &moved, Some(&standing_skeleton())));
    }

    #[test]
    fn test_knee_fallback() {
        let ankles = [JointName::RightAnkle, JointName::LeftAnkle];
        let prev = without(&standing_skeleton(), &ankles);
        let curr = shifted(&prev, JointName::RightKnee, 0.0, 100.0, 0.0);
        let delta = vertical_displacement(&normalize(&curr), &normalize(&prev));
        assert!((delta - 50.0).abs() < 1e-9);
    }
}
