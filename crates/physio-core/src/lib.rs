//! # Physio-Core
//!
//! Core types and utilities for the physio-coach relative-pose evaluation
//! engine: depth-camera skeletons, calibrated body measurements, vector
//! geometry and the shared error type.
//!
//! All positions are camera-space millimeters. The depth SDK reports Y up
//! and Z growing away from the camera, so a larger Z means "further back".

pub mod error;
pub mod geometry;
pub mod skeleton;
pub mod types;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use error::{Error, Result};
pub use geometry::*;
pub use skeleton::*;
pub use types::*;
