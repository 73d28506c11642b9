//! Fundamental types for the physio-coach system.

use chrono::Utc;
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Session identifier attached to every emitted event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

/// Timestamp wrapper with nanosecond precision
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(pub i64);

impl Timestamp {
    pub fn now() -> Self {
        Self(Utc::now().timestamp_nanos_opt().unwrap_or(0))
    }

    pub fn from_millis(millis: i64) -> Self {
        Self(millis.saturating_mul(1_000_000))
    }

    pub fn from_secs_f64(secs: f64) -> Self {
        Self((secs * 1_000_000_000.0).round() as i64)
    }

    /// Seconds elapsed since `earlier`; negative if `earlier` is in the future
    pub fn secs_since(&self, earlier: Timestamp) -> f64 {
        (self.0 - earlier.0) as f64 / 1_000_000_000.0
    }

    pub fn add_secs(&self, secs: f64) -> Self {
        Self(self.0 + (secs * 1_000_000_000.0).round() as i64)
    }
}

/// 3D position in camera space (millimeters)
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position3D {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Position3D {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn origin() -> Self {
        Self::new(0.0, 0.0, 0.0)
    }

    /// Vector pointing from `origin` to `self`
    pub fn vector_from(&self, origin: &Position3D) -> Vector3<f64> {
        Vector3::new(self.x - origin.x, self.y - origin.y, self.z - origin.z)
    }

    pub fn distance_to(&self, other: &Self) -> f64 {
        self.vector_from(other).norm()
    }

    /// Component-wise difference, used for re-centering
    pub fn relative_to(&self, reference: &Position3D) -> Self {
        Self::new(self.x - reference.x, self.y - reference.y, self.z - reference.z)
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}
