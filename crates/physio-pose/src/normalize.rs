//! Torso-relative skeleton normalization.

use tracing::debug;

use physio_core::{
    Joint, JointName, NormalizedSkeleton, Position3D, Skeleton, NORMALIZE_CONFIDENCE_THRESHOLD,
};

/// Re-center `skeleton` on the torso (or the origin when the torso is
/// missing), dropping joints below the normalization confidence threshold.
pub fn normalize(skeleton: &Skeleton) -> NormalizedSkeleton {
    let reference = skeleton
        .position(JointName::Torso)
        .unwrap_or_else(Position3D::origin);

    let joints = skeleton.iter().filter_map(|joint| {
        if joint.confidence < NORMALIZE_CONFIDENCE_THRESHOLD {
            debug!(
                "Skipping joint {} - confidence={:.2}",
                joint.name, joint.confidence
            );
            return None;
        }
        Some(Joint::new(
            joint.name,
            joint.position.relative_to(&reference),
            joint.confidence,
        ))
    });

    NormalizedSkeleton::from_joints(joints)
}
