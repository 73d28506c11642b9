//! # Physio-Pose
//!
//! Relative-pose evaluation engine. A raw depth-SDK frame flows through:
//!
//! 1. **Snapshot**: canonicalize SDK joint records into a [`Skeleton`](physio_core::Skeleton),
//!    dropping joints at or below 0.4 confidence
//! 2. **Normalization**: re-center on the torso
//! 3. **Tolerances**: scale a step's fractional distance tolerance by the
//!    user's calibrated body measurements
//! 4. **Predicates & angles**: independent geometric checks, each scored 0–100
//! 5. **Evaluation**: aggregate into an accuracy percentage and an all-ok flag
//!
//! Per-frame degeneracies (missing joints, zero-length limbs) never produce
//! errors; they produce failing checks.

pub mod angles;
pub mod evaluator;
pub mod motion;
pub mod normalize;
pub mod predicates;
pub mod snapshot;
pub mod tolerance;

pub use angles::*;
pub use evaluator::*;
pub use motion::*;
pub use normalize::*;
pub use predicates::*;
pub use snapshot::*;
pub use tolerance::*;
