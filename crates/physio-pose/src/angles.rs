//! Joint-angle measurement and scoring.
//!
//! Elbow angles are measured on the normalized skeleton and scored
//! pass/fail (0 or 100). Arm elevation and knee angles are measured on the
//! raw skeleton and earn linear partial credit within twice the tolerance.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use physio_core::{
    angle_between, angle_from_vertical, interior_angle, Joint, JointName, NormalizedSkeleton,
    Skeleton, CAPTURE_CONFIDENCE_THRESHOLD, NORMALIZE_CONFIDENCE_THRESHOLD,
};

use crate::tolerance::StepTolerance;

/// Angles a step may target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AngleName {
    #[serde(rename = "right_arm_angle")]
    RightArm,
    #[serde(rename = "left_arm_angle")]
    LeftArm,
    #[serde(rename = "right_elbow_angle")]
    RightElbow,
    #[serde(rename = "left_elbow_angle")]
    LeftElbow,
    #[serde(rename = "right_knee_angle")]
    RightKnee,
    #[serde(rename = "left_knee_angle")]
    LeftKnee,
}

impl AngleName {
    pub const ALL: [AngleName; 6] = [
        Self::RightArm,
        Self::LeftArm,
        Self::RightElbow,
        Self::LeftElbow,
        Self::RightKnee,
        Self::LeftKnee,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RightArm => "right_arm_angle",
            Self::LeftArm => "left_arm_angle",
            Self::RightElbow => "right_elbow_angle",
            Self::LeftElbow => "left_elbow_angle",
            Self::RightKnee => "right_knee_angle",
            Self::LeftKnee => "left_knee_angle",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|a| a.as_str() == name)
    }

    /// Joints that must be tracked before the angle is attempted
    pub fn required_joints(&self) -> &'static [JointName] {
        use JointName::*;
        match self {
            Self::RightArm => &[RightShoulder, RightWrist],
            Self::LeftArm => &[LeftShoulder, LeftWrist],
            Self::RightElbow => &[RightShoulder, RightElbow, RightWrist],
            Self::LeftElbow => &[LeftShoulder, LeftElbow, LeftWrist],
            Self::RightKnee => &[RightHip, RightKnee, RightAnkle],
            Self::LeftKnee => &[LeftHip, LeftKnee, LeftAnkle],
        }
    }

    pub fn is_elbow(&self) -> bool {
        matches!(self, Self::RightElbow | Self::LeftElbow)
    }

    fn correction_hint(&self) -> &'static str {
        match self {
            Self::RightArm | Self::LeftArm => "Raise your arm to shoulder level",
            Self::RightElbow | Self::LeftElbow => "Adjust your elbow bend",
            Self::RightKnee | Self::LeftKnee => "Adjust your knee bend",
        }
    }
}

impl fmt::Display for AngleName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one angle check
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AngleCheck {
    pub ok: bool,
    /// 0..=100
    pub score: f64,
    pub message: String,
    /// Measured angle in degrees, if it could be determined
    pub measured: Option<f64>,
}

impl AngleCheck {
    fn failed(message: String) -> Self {
        Self {
            ok: false,
            score: 0.0,
            message,
            measured: None,
        }
    }

    fn not_detected(name: &str) -> Self {
        Self::failed(format!("{name}: not detected ✗"))
    }
}

fn confident(joint: Option<&Joint>, threshold: f64) -> Option<&Joint> {
    joint.filter(|j| j.confidence >= threshold)
}

/// Elevation of the shoulder-to-wrist segment away from vertical-down.
///
/// 0° is an arm hanging straight down, 90° is horizontal.
pub fn arm_elevation_angle(shoulder: Option<&Joint>, wrist: Option<&Joint>) -> Option<f64> {
    let (Some(shoulder), Some(wrist)) = (
        confident(shoulder, CAPTURE_CONFIDENCE_THRESHOLD),
        confident(wrist, CAPTURE_CONFIDENCE_THRESHOLD),
    ) else {
        debug!("Skipping arm angle - shoulder or wrist missing or low confidence");
        return None;
    };

    let v = wrist.position.vector_from(&shoulder.position);
    let angle = angle_from_vertical(&v);
    if angle.is_none() {
        debug!("Zero vector in arm angle calculation");
    }
    angle
}

/// Angle at the knee between thigh and calf, 180° for a straight leg.
///
/// With the ankle missing or barely tracked, the calf is assumed vertical
/// and the thigh is measured against vertical-down instead. The knee targets
/// in [`evaluate_angle`] require a captured ankle, so only direct callers
/// reach the fallback.
pub fn knee_angle(hip: Option<&Joint>, knee: Option<&Joint>, ankle: Option<&Joint>) -> Option<f64> {
    let (Some(hip), Some(knee)) = (
        confident(hip, CAPTURE_CONFIDENCE_THRESHOLD),
        confident(knee, CAPTURE_CONFIDENCE_THRESHOLD),
    ) else {
        debug!("Skipping knee angle - hip or knee missing or low confidence");
        return None;
    };

    let thigh = hip.position.vector_from(&knee.position);
    match confident(ankle, NORMALIZE_CONFIDENCE_THRESHOLD) {
        Some(ankle) => {
            let calf = ankle.position.vector_from(&knee.position);
            angle_between(&thigh, &calf)
        }
        None => {
            debug!("Fallback knee angle: no ankle, assuming vertical calf");
            angle_from_vertical(&thigh)
        }
    }
}

/// Interior elbow angle from the torso-normalized skeleton
pub fn elbow_angle(skeleton: &NormalizedSkeleton, name: AngleName) -> Option<f64> {
    use JointName::*;
    let (shoulder, elbow, wrist) = match name {
        AngleName::RightElbow => (RightShoulder, RightElbow, RightWrist),
        AngleName::LeftElbow => (LeftShoulder, LeftElbow, LeftWrist),
        _ => return None,
    };
    interior_angle(
        &skeleton.position(shoulder)?,
        &skeleton.position(elbow)?,
        &skeleton.position(wrist)?,
    )
}

/// Linear partial credit: 100 on target, 50 at the tolerance edge, 0 at twice the tolerance
pub fn partial_credit(diff: f64, tolerance: f64) -> f64 {
    if tolerance <= 0.0 {
        return if diff == 0.0 { 100.0 } else { 0.0 };
    }
    (100.0 * (1.0 - diff / (2.0 * tolerance))).max(0.0)
}

/// Measure and score one target angle.
///
/// Always yields exactly one check; undeterminable angles fail with score 0.
pub fn evaluate_angle(
    name: &str,
    target: f64,
    raw: &Skeleton,
    normalized: &NormalizedSkeleton,
    tolerance: &StepTolerance,
) -> AngleCheck {
    let Some(angle_name) = AngleName::parse(name) else {
        debug!("Unknown angle {}", name);
        return AngleCheck::not_detected(name);
    };

    if !angle_name.required_joints().iter().all(|&j| raw.contains(j)) {
        debug!("{}: missing joints", angle_name);
        return AngleCheck::failed("✗ no skeleton data".to_string());
    }

    let tol = tolerance.angle_tolerance;

    if angle_name.is_elbow() {
        let Some(angle) = elbow_angle(normalized, angle_name) else {
            return AngleCheck::not_detected(name);
        };
        let ok = (angle - target).abs() <= tol;
        debug!("{}: measured={:.0}, target={}, ok={}", angle_name, angle, target, ok);
        return AngleCheck {
            ok,
            score: if ok { 100.0 } else { 0.0 },
            message: if ok {
                "✓".to_string()
            } else {
                format!("✗ {angle_name}: {angle:.0}° (target: {target}°)")
            },
            measured: Some(angle),
        };
    }

    use JointName::*;
    let measured = match angle_name {
        AngleName::RightArm => arm_elevation_angle(raw.get(RightShoulder), raw.get(RightWrist)),
        AngleName::LeftArm => arm_elevation_angle(raw.get(LeftShoulder), raw.get(LeftWrist)),
        AngleName::RightKnee => knee_angle(raw.get(RightHip), raw.get(RightKnee), raw.get(RightAnkle)),
        AngleName::LeftKnee => knee_angle(raw.get(LeftHip), raw.get(LeftKnee), raw.get(LeftAnkle)),
        AngleName::RightElbow | AngleName::LeftElbow => None,
    };
    let Some(angle) = measured else {
        return AngleCheck::not_detected(name);
    };

    let diff = (angle - target).abs();
    let ok = diff <= tol;
    let score = partial_credit(diff, tol);
    debug!("{}: {:.0}° (target {}°), score={:.1}", angle_name, angle, target, score);

    let verdict = if ok {
        "✓".to_string()
    } else {
        format!("✗ {}", angle_name.correction_hint())
    };
    AngleCheck {
        ok,
        score,
        message: format!("{angle:.0}° (target {target}° ±{tol}°) {verdict}"),
        measured: Some(angle),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::normalize;
    use physio_core::testing::{
        elbow_forward_offset, placed, shifted, standing_skeleton, without, STANDING_Z,
    };
    use physio_core::Position3D;

    fn eval(name: &str, target: f64, skeleton: &Skeleton) -> AngleCheck {
        evaluate_angle(
            name,
            target,
            skeleton,
            &normalize(skeleton),
            &StepTolerance::default(),
        )
    }

    /// Standing pose with the right elbow bent to `angle`
    fn right_elbow_at(angle: f64) -> Skeleton {
        placed(
            &standing_skeleton(),
            JointName::RightElbow,
            Position3D::new(180.0, 0.0, STANDING_Z - elbow_forward_offset(angle)),
        )
    }

    #[test]
    fn test_elbow_round_trip() {
        for target in [90.0, 120.0, 160.0] {
            let check = eval("right_elbow_angle", target, &right_elbow_at(target));
            assert!(check.ok, "target {target}");
            assert_eq!(check.score, 100.0);
            assert!((check.measured.unwrap() - target).abs() < 1e-6);
        }
    }

    #[test]
    fn test_elbow_scoring_is_binary() {
        let skeleton = right_elbow_at(150.0);
        let near = eval("right_elbow_angle", 165.0, &skeleton);
        assert!(near.ok);
        assert_eq!(near.score, 100.0);

        let far = eval("right_elbow_angle", 175.0, &right_elbow_at(120.0));
        assert!(!far.ok);
        assert_eq!(far.score, 0.0);
        assert!(far.message.starts_with("✗ right_elbow_angle: 120°"));
    }

    #[test]
    fn test_arm_elevation_round_trip() {
        // Arm straight out to the side: 90 degrees
        let skeleton = placed(
            &standing_skeleton(),
            JointName::RightWrist,
            Position3D::new(780.0, 300.0, STANDING_Z),
        );
        let check = eval("right_arm_angle", 90.0, &skeleton);
        assert!(check.ok);
        assert!((check.score - 100.0).abs() < 1e-6);
    }

    #[test]
    fn test_partial_credit() {
        assert_eq!(partial_credit(0.0, 20.0), 100.0);
        assert_eq!(partial_credit(20.0, 20.0), 50.0);
        assert_eq!(partial_credit(30.0, 20.0), 25.0);
        assert_eq!(partial_credit(50.0, 20.0), 0.0);
        assert_eq!(partial_credit(0.0, 0.0), 100.0);
        assert_eq!(partial_credit(1.0, 0.0), 0.0);
    }

    #[test]
    fn test_generic_partial_credit_outside_tolerance() {
        // Hanging arm measures 0 degrees; target 30 with tolerance 20
        let check = eval("left_arm_angle", 30.0, &standing_skeleton());
        assert!(!check.ok);
        assert!((check.score - 25.0).abs() < 1e-6);
        assert!(check.message.contains("✗ Raise your arm"));
    }

    #[test]
    fn test_knee_angle() {
        let straight = eval("right_knee_angle", 180.0, &standing_skeleton());
        assert!(straight.ok);
        assert!((straight.measured.unwrap() - 180.0).abs() < 1e-6);

        // Calf swung back to horizontal: right angle at the knee
        let bent = placed(
            &standing_skeleton(),
            JointName::LeftAnkle,
            Position3D::new(-120.0, -650.0, STANDING_Z + 450.0),
        );
        let check = eval("left_knee_angle", 90.0, &bent);
        assert!(check.ok);
        assert!((check.measured.unwrap() - 90.0).abs() < 1e-6);
    }

    #[test]
    fn test_knee_fallback_without_ankle() {
        let skeleton = standing_skeleton();
        let hip = skeleton.get(JointName::RightHip);
        let knee = skeleton.get(JointName::RightKnee);
        let angle = knee_angle(hip, knee, None).unwrap();
        assert!((angle - 180.0).abs() < 1e-6);

        let dim_ankle = Joint::new(JointName::RightAnkle, Position3D::new(0.0, 0.0, 0.0), 0.2);
        assert!((knee_angle(hip, knee, Some(&dim_ankle)).unwrap() - 180.0).abs() < 1e-6);
    }

    #[test]
    fn test_missing_joints_fail_one_check() {
        let skeleton = without(&standing_skeleton(), &[JointName::RightWrist]);
        let check = eval("right_elbow_angle", 160.0, &skeleton);
        assert!(!check.ok);
        assert_eq!(check.score, 0.0);
        assert_eq!(check.message, "✗ no skeleton data");
    }

    #[test]
    fn test_degenerate_and_unknown_angles() {
        // Wrist on top of the elbow: zero-length forearm
        let elbow = standing_skeleton().position(JointName::RightElbow).unwrap();
        let skeleton = placed(&standing_skeleton(), JointName::RightWrist, elbow);
        let check = eval("right_elbow_angle", 160.0, &skeleton);
        assert!(!check.ok);
        assert!(check.message.contains("not detected"));

        let coincident = shifted(&standing_skeleton(), JointName::RightWrist, 0.0, 600.0, 0.0);
        let check = eval("right_arm_angle", 0.0, &coincident);
        assert!(check.message.contains("not detected"));

        let unknown = eval("neck_angle", 10.0, &standing_skeleton());
        assert!(!unknown.ok);
        assert_eq!(unknown.score, 0.0);
        assert_eq!(unknown.message, "neck_angle: not detected ✗");
    }

    #[test]
    fn test_angle_name_parse() {
        for name in AngleName::ALL {
            assert_eq!(AngleName::parse(name.as_str()), Some(name));
        }
        assert_eq!(
            serde_json::to_string(&AngleName::LeftKnee).unwrap(),
            "\"left_knee_angle\""
        );
    }
}
