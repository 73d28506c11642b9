//! Synthetic skeletons for tests.
//!
//! The standing pose faces the camera 2 m away with arms hanging, elbows
//! bent to [`STANDING_ELBOW_ANGLE`], feet hip-width apart. Its calibration
//! yields exactly [`standard_metrics`].

use crate::skeleton::{Joint, JointName, Skeleton, UserMetrics};
use crate::types::Position3D;

pub const STANDING_Z: f64 = 2000.0;
pub const STANDING_ELBOW_ANGLE: f64 = 160.0;
pub const TEST_CONFIDENCE: f64 = 0.9;

/// Half of the shoulder-to-wrist span
const FOREARM_DROP: f64 = 300.0;

/// Forward (towards camera) elbow offset that bends a hanging arm to `angle` degrees
pub fn elbow_forward_offset(angle: f64) -> f64 {
    FOREARM_DROP * ((180.0 - angle) / 2.0).to_radians().tan()
}

/// Camera-space positions of the standing pose
pub fn standing_positions() -> Vec<(JointName, Position3D)> {
    use JointName::*;
    let z = STANDING_Z;
    let elbow_z = z - elbow_forward_offset(STANDING_ELBOW_ANGLE);
    vec![
        (Head, Position3D::new(0.0, 500.0, z)),
        (Neck, Position3D::new(0.0, 350.0, z)),
        (Torso, Position3D::new(0.0, 0.0, z)),
        (Waist, Position3D::new(0.0, -150.0, z)),
        (LeftCollar, Position3D::new(-60.0, 330.0, z)),
        (RightCollar, Position3D::new(60.0, 330.0, z)),
        (LeftShoulder, Position3D::new(-180.0, 300.0, z)),
        (RightShoulder, Position3D::new(180.0, 300.0, z)),
        (LeftElbow, Position3D::new(-180.0, 0.0, elbow_z)),
        (RightElbow, Position3D::new(180.0, 0.0, elbow_z)),
        (LeftWrist, Position3D::new(-180.0, -300.0, z)),
        (RightWrist, Position3D::new(180.0, -300.0, z)),
        (LeftHand, Position3D::new(-180.0, -380.0, z)),
        (RightHand, Position3D::new(180.0, -380.0, z)),
        (LeftHip, Position3D::new(-120.0, -200.0, z)),
        (RightHip, Position3D::new(120.0, -200.0, z)),
        (LeftKnee, Position3D::new(-120.0, -650.0, z)),
        (RightKnee, Position3D::new(120.0, -650.0, z)),
        (LeftAnkle, Position3D::new(-120.0, -1100.0, z)),
        (RightAnkle, Position3D::new(120.0, -1100.0, z)),
    ]
}

pub fn standing_skeleton() -> Skeleton {
    standing_positions()
        .into_iter()
        .map(|(name, position)| Joint::new(name, position, TEST_CONFIDENCE))
        .collect()
}

/// Metrics a calibration of [`standing_skeleton`] produces
pub fn standard_metrics() -> UserMetrics {
    UserMetrics {
        height: 1600.0,
        arm_length: 600.0,
        hip_width: 240.0,
        shoulder_width: 360.0,
        leg_length: 450.0,
        standing_head_y: 500.0,
    }
}

/// Copy of `skeleton` with `name` moved by the given offset
pub fn shifted(skeleton: &Skeleton, name: JointName, dx: f64, dy: f64, dz: f64) -> Skeleton {
    let mut out = skeleton.clone();
    if let Some(joint) = skeleton.get(name) {
        let p = joint.position;
        out.insert(Joint::new(
            name,
            Position3D::new(p.x + dx, p.y + dy, p.z + dz),
            joint.confidence,
        ));
    }
    out
}

/// Copy of `skeleton` with `name` placed at an absolute position
pub fn placed(skeleton: &Skeleton, name: JointName, position: Position3D) -> Skeleton {
    let mut out = skeleton.clone();
    out.insert(Joint::new(name, position, TEST_CONFIDENCE));
    out
}

/// Copy of `skeleton` without `names`
pub fn without(skeleton: &Skeleton, names: &[JointName]) -> Skeleton {
    let mut out = skeleton.clone();
    for &name in names {
        out.remove(name);
    }
    out
}

/// Copy of `skeleton` translated as a whole
pub fn translated(skeleton: &Skeleton, dx: f64, dy: f64, dz: f64) -> Skeleton {
    skeleton
        .iter()
        .map(|j| {
            let p = j.position;
            Joint::new(j.name, Position3D::new(p.x + dx, p.y + dy, p.z + dz), j.confidence)
        })
        .collect()
}
