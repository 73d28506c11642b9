//! Depth-SDK frame adapter.
//!
//! SDK versions disagree on the joint record shape: newer builds expose
//! real-world coordinates under `real`, older ones a flat `x`/`y` pair with
//! optional depth. Both are folded into one canonical [`Joint`] here so that
//! nothing downstream ever sees an SDK record.

use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use physio_core::{
    Error, Joint, JointName, Position3D, Result, Skeleton, CAPTURE_CONFIDENCE_THRESHOLD,
};

/// Depth assumed for legacy records that carry no Z (millimeters)
pub const DEFAULT_DEPTH_MM: f64 = 1000.0;

/// Joint record as delivered by the depth SDK
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawJoint {
    /// Real-world coordinates in millimeters
    Real { real: [f64; 3], confidence: f64 },
    /// Legacy flat form
    Projective {
        x: f64,
        y: f64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        z: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        confidence: Option<f64>,
    },
    /// Any other shape the SDK emitted
    Unrecognized(serde_json::Value),
}

impl RawJoint {
    pub fn real(x: f64, y: f64, z: f64, confidence: f64) -> Self {
        Self::Real {
            real: [x, y, z],
            confidence,
        }
    }

    /// Fold the record into a canonical joint
    pub fn canonicalize(&self, index: usize, name: JointName) -> Result<Joint> {
        let (position, confidence) = match self {
            RawJoint::Real { real, confidence } => {
                (Position3D::new(real[0], real[1], real[2]), *confidence)
            }
            RawJoint::Projective {
                x,
                y,
                z,
                confidence,
            } => (
                Position3D::new(*x, *y, z.unwrap_or(DEFAULT_DEPTH_MM)),
                confidence.unwrap_or(1.0),
            ),
            RawJoint::Unrecognized(value) => {
                return Err(Error::MalformedJoint {
                    index,
                    reason: format!("unrecognized record {value}"),
                })
            }
        };

        if !position.is_finite() || !confidence.is_finite() {
            return Err(Error::MalformedJoint {
                index,
                reason: "non-finite coordinate or confidence".into(),
            });
        }

        Ok(Joint::new(name, position, confidence))
    }
}

/// One tracked person in a frame
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SkeletonRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<u32>,
    /// Joint records in SDK order
    pub joints: Vec<RawJoint>,
}

/// Everything the SDK reported for one update
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SdkFrame {
    #[serde(default)]
    pub skeletons: Vec<SkeletonRecord>,
}

impl SdkFrame {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn single(joints: Vec<RawJoint>) -> Self {
        Self {
            skeletons: vec![SkeletonRecord {
                user_id: Some(1),
                joints,
            }],
        }
    }

    /// Frame carrying `skeleton` in the real-coordinate form, joints in SDK order
    pub fn from_skeleton(skeleton: &Skeleton) -> Self {
        let joints = JointName::ALL
            .iter()
            .map(|&name| match skeleton.get(name) {
                Some(j) => RawJoint::real(j.position.x, j.position.y, j.position.z, j.confidence),
                None => RawJoint::real(0.0, 0.0, 0.0, 0.0),
            })
            .collect();
        Self::single(joints)
    }
}

/// Build a skeleton from one SDK record.
///
/// Records past the 20 known joints are ignored, malformed records are
/// skipped, and joints at or below the capture threshold are left out.
pub fn build_skeleton(record: &SkeletonRecord) -> Skeleton {
    let mut skeleton = Skeleton::new();

    for (index, raw) in record.joints.iter().enumerate() {
        let Some(name) = JointName::from_index(index) else {
            break;
        };

        let joint = match raw.canonicalize(index, name) {
            Ok(joint) => joint,
            Err(e) => {
                warn!("Skipping joint {}: {}", name, e);
                continue;
            }
        };

        if joint.confidence > CAPTURE_CONFIDENCE_THRESHOLD {
            trace!(
                joint = %name,
                x = joint.position.x,
                y = joint.position.y,
                z = joint.position.z,
                confidence = joint.confidence,
                "joint detected"
            );
            skeleton.insert(joint);
        }
    }

    skeleton
}

/// Keeps the current and previous frame's skeletons
#[derive(Debug, Clone, Default)]
pub struct SnapshotBuilder {
    current: Option<Skeleton>,
    previous: Option<Skeleton>,
}

impl SnapshotBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Process one SDK frame.
    ///
    /// An empty frame clears the current skeleton and leaves the previous
    /// one untouched; otherwise the current skeleton becomes the previous.
    pub fn ingest(&mut self, frame: &SdkFrame) -> Option<&Skeleton> {
        let Some(record) = frame.skeletons.first() else {
            debug!("No skeleton data available");
            self.current = None;
            return None;
        };

        let skeleton = build_skeleton(record);
        self.previous = self.current.take();
        self.current = Some(skeleton);
        self.current.as_ref()
    }

    pub fn current(&self) -> Option<&Skeleton> {
        self.current.as_ref()
    }

    pub fn previous(&self) -> Option<&Skeleton> {
        self.previous.as_ref()
    }

    pub fn reset(&mut self) {
        self.current = None;
        self.previous = None;
    }
}
