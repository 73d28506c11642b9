//! Vector geometry for joint-angle computations.

use nalgebra::Vector3;

use crate::types::Position3D;

/// Guards the elbow-angle denominator against division by zero
pub const ANGLE_EPSILON: f64 = 1e-10;

/// Unit vector pointing straight down in camera space
pub fn vertical_down() -> Vector3<f64> {
    Vector3::new(0.0, -1.0, 0.0)
}

/// Angle between two vectors in degrees, `None` for a zero-length input
pub fn angle_between(a: &Vector3<f64>, b: &Vector3<f64>) -> Option<f64> {
    let norm_a = a.norm();
    let norm_b = b.norm();
    if norm_a == 0.0 || norm_b == 0.0 {
        return None;
    }

    let cos_angle = (a / norm_a).dot(&(b / norm_b));
    Some(cos_angle.clamp(-1.0, 1.0).acos().to_degrees())
}

/// Angle of `v` away from vertical-down, in degrees
pub fn angle_from_vertical(v: &Vector3<f64>) -> Option<f64> {
    angle_between(v, &vertical_down())
}

/// Interior angle at `vertex` formed by the segments to `a` and `b`.
///
/// Uses `acos(dot / (|va||vb| + eps))`; the epsilon keeps near-degenerate
/// limbs finite. Exactly zero-length segments are undetermined.
pub fn interior_angle(a: &Position3D, vertex: &Position3D, b: &Position3D) -> Option<f64> {
    let va = a.vector_from(vertex);
    let vb = b.vector_from(vertex);
    let norms = va.norm() * vb.norm();
    if norms == 0.0 {
        return None;
    }

    let cos_angle = va.dot(&vb) / (norms + ANGLE_EPSILON);
    Some(cos_angle.clamp(-1.0, 1.0).acos().to_degrees())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_straight_and_right_angles() {
        let shoulder = Position3D::new(0.0, 300.0, 0.0);
        let elbow = Position3D::new(0.0, 0.0, 0.0);
        let wrist = Position3D::new(0.0, -300.0, 0.0);
        let straight = interior_angle(&shoulder, &elbow, &wrist).unwrap();
        // The epsilon in the denominator pulls collinear limbs a few
        // micro-degrees short of 180
        assert!(straight < 180.0);
        assert!((straight - 180.0).abs() < 1e-4);

        let bent = Position3D::new(0.0, 0.0, -300.0);
        let right = interior_angle(&shoulder, &elbow, &bent).unwrap();
        assert!((right - 90.0).abs() < 1e-6);
    }

    #[test]
    fn test_zero_length_is_undetermined() {
        let p = Position3D::new(1.0, 2.0, 3.0);
        assert!(interior_angle(&p, &p, &Position3D::origin()).is_none());
        assert!(angle_from_vertical(&Vector3::zeros()).is_none());
    }

    #[test]
    fn test_angle_from_vertical() {
        let down = Vector3::new(0.0, -10.0, 0.0);
        let side = Vector3::new(10.0, 0.0, 0.0);
        let up = Vector3::new(0.0, 4.0, 0.0);
        assert!(angle_from_vertical(&down).unwrap().abs() < 1e-9);
        assert!((angle_from_vertical(&side).unwrap() - 90.0).abs() < 1e-9);
        assert!((angle_from_vertical(&up).unwrap() - 180.0).abs() < 1e-9);
    }
}
