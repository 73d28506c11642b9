//! # Physio-Session
//!
//! Runs guided exercise sessions on top of the pose evaluation engine:
//!
//! - **Exercises**: declarative step sequences, with a built-in library
//! - **Calibration**: a bounded sampling window that derives the user's
//!   body measurements
//! - **Exercise runs**: the per-tick step/hold state machine
//! - **Session**: shared context plus the capture and tick threads
//! - **Replay**: the same pipeline driven by a recorded frame stream

pub mod calibration;
pub mod context;
pub mod exercise;
pub mod replay;
pub mod run;
pub mod session;
pub mod settings;
pub mod source;

pub use calibration::*;
pub use context::*;
pub use exercise::*;
pub use replay::*;
pub use run::*;
pub use session::*;
pub use settings::*;
pub use source::*;
