//! Skeleton types: named joints, per-frame skeletons and body measurements.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::types::Position3D;

/// A joint is kept at capture time only if its confidence is strictly above this
pub const CAPTURE_CONFIDENCE_THRESHOLD: f64 = 0.4;

/// A joint is dropped at normalization time if its confidence is below this
pub const NORMALIZE_CONFIDENCE_THRESHOLD: f64 = 0.3;

/// The 20 body landmarks reported by the depth SDK, in SDK order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(u8)]
pub enum JointName {
    Head = 0,
    Neck = 1,
    Torso = 2,
    Waist = 3,
    LeftCollar = 4,
    LeftShoulder = 5,
    LeftElbow = 6,
    LeftWrist = 7,
    LeftHand = 8,
    RightCollar = 9,
    RightShoulder = 10,
    RightElbow = 11,
    RightWrist = 12,
    RightHand = 13,
    LeftHip = 14,
    LeftKnee = 15,
    LeftAnkle = 16,
    RightHip = 17,
    RightKnee = 18,
    RightAnkle = 19,
}

impl JointName {
    pub const COUNT: usize = 20;

    pub const ALL: [JointName; Self::COUNT] = [
        Self::Head,
        Self::Neck,
        Self::Torso,
        Self::Waist,
        Self::LeftCollar,
        Self::LeftShoulder,
        Self::LeftElbow,
        Self::LeftWrist,
        Self::LeftHand,
        Self::RightCollar,
        Self::RightShoulder,
        Self::RightElbow,
        Self::RightWrist,
        Self::RightHand,
        Self::LeftHip,
        Self::LeftKnee,
        Self::LeftAnkle,
        Self::RightHip,
        Self::RightKnee,
        Self::RightAnkle,
    ];

    /// Position in the SDK's joint list
    pub fn from_index(idx: usize) -> Option<Self> {
        Self::ALL.get(idx).copied()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Head => "HEAD",
            Self::Neck => "NECK",
            Self::Torso => "TORSO",
            Self::Waist => "WAIST",
            Self::LeftCollar => "LEFT_COLLAR",
            Self::LeftShoulder => "LEFT_SHOULDER",
            Self::LeftElbow => "LEFT_ELBOW",
            Self::LeftWrist => "LEFT_WRIST",
            Self::LeftHand => "LEFT_HAND",
            Self::RightCollar => "RIGHT_COLLAR",
            Self::RightShoulder => "RIGHT_SHOULDER",
            Self::RightElbow => "RIGHT_ELBOW",
            Self::RightWrist => "RIGHT_WRIST",
            Self::RightHand => "RIGHT_HAND",
            Self::LeftHip => "LEFT_HIP",
            Self::LeftKnee => "LEFT_KNEE",
            Self::LeftAnkle => "LEFT_ANKLE",
            Self::RightHip => "RIGHT_HIP",
            Self::RightKnee => "RIGHT_KNEE",
            Self::RightAnkle => "RIGHT_ANKLE",
        }
    }
}

impl fmt::Display for JointName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single tracked landmark for one frame
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Joint {
    pub name: JointName,
    pub position: Position3D,
    pub confidence: f64,
}

impl Joint {
    pub fn new(name: JointName, position: Position3D, confidence: f64) -> Self {
        Self {
            name,
            position,
            confidence,
        }
    }
}

/// Joint map for one person in one camera frame.
///
/// Only joints that passed the capture confidence filter are present.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Skeleton {
    joints: BTreeMap<JointName, Joint>,
}

impl Skeleton {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, joint: Joint) {
        self.joints.insert(joint.name, joint);
    }

    pub fn remove(&mut self, name: JointName) -> Option<Joint> {
        self.joints.remove(&name)
    }

    pub fn get(&self, name: JointName) -> Option<&Joint> {
        self.joints.get(&name)
    }

    pub fn position(&self, name: JointName) -> Option<Position3D> {
        self.joints.get(&name).map(|j| j.position)
    }

    pub fn contains(&self, name: JointName) -> bool {
        self.joints.contains_key(&name)
    }

    pub fn len(&self) -> usize {
        self.joints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.joints.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Joint> {
        self.joints.values()
    }

    pub fn names(&self) -> impl Iterator<Item = JointName> + '_ {
        self.joints.keys().copied()
    }
}

impl FromIterator<Joint> for Skeleton {
    fn from_iter<I: IntoIterator<Item = Joint>>(iter: I) -> Self {
        let mut skeleton = Skeleton::new();
        for joint in iter {
            skeleton.insert(joint);
        }
        skeleton
    }
}

/// Skeleton re-centered on the torso.
///
/// Coordinate accessors read a missing joint as 0 on every axis; pose
/// predicates rely on that default.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NormalizedSkeleton {
    joints: BTreeMap<JointName, Joint>,
}

impl NormalizedSkeleton {
    pub fn from_joints<I: IntoIterator<Item = Joint>>(joints: I) -> Self {
        Self {
            joints: joints.into_iter().map(|j| (j.name, j)).collect(),
        }
    }

    pub fn get(&self, name: JointName) -> Option<&Joint> {
        self.joints.get(&name)
    }

    pub fn position(&self, name: JointName) -> Option<Position3D> {
        self.joints.get(&name).map(|j| j.position)
    }

    pub fn contains(&self, name: JointName) -> bool {
        self.joints.contains_key(&name)
    }

    /// Position, or the origin when the joint is absent
    pub fn position_or_origin(&self, name: JointName) -> Position3D {
        self.position(name).unwrap_or_default()
    }

    pub fn x(&self, name: JointName) -> f64 {
        self.position_or_origin(name).x
    }

    pub fn y(&self, name: JointName) -> f64 {
        self.position_or_origin(name).y
    }

    pub fn z(&self, name: JointName) -> f64 {
        self.position_or_origin(name).z
    }

    /// First present joint of `candidates`, in order
    pub fn first_present(&self, candidates: &[JointName]) -> Option<Position3D> {
        candidates.iter().find_map(|&name| self.position(name))
    }

    pub fn len(&self) -> usize {
        self.joints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.joints.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Joint> {
        self.joints.values()
    }
}

/// Anthropometric profile derived once per calibration (millimeters)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct UserMetrics {
    /// Vertical head-to-ankle extent
    pub height: f64,
    /// Shoulder-to-wrist distance, right side
    pub arm_length: f64,
    pub hip_width: f64,
    pub shoulder_width: f64,
    /// Vertical hip-to-knee extent of the longer leg
    pub leg_length: f64,
    /// Head height above the torso while standing
    pub standing_head_y: f64,
}
