//! Error types for the physio-coach system.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Depth device error: {0}")]
    Device(String),

    #[error("Malformed joint record at index {index}: {reason}")]
    MalformedJoint { index: usize, reason: String },

    #[error("Calibration failed: {0}")]
    Calibration(String),

    #[error("Invalid exercise definition: {0}")]
    ExerciseDefinition(String),

    #[error("Unknown exercise: {0}")]
    UnknownExercise(String),

    #[error("No session is running")]
    SessionNotRunning,

    #[error("A session is already running")]
    SessionAlreadyRunning,

    #[error("User is not calibrated")]
    NotCalibrated,

    #[error("No exercise selected")]
    NoExerciseSelected,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("I/O error: {0}")]
    Io(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e.to_string())
    }
}
