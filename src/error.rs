//! Error types for the detection engine and its pipeline.

use thiserror::Error;

/// Malformed configuration. Raised while building a session, never mid-game.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("{exercise}: contracted bound {contracted}° must be {relation} extended bound {extended}°")]
    BoundOrder {
        exercise: &'static str,
        contracted: f32,
        extended: f32,
        relation: &'static str,
    },

    #[error("{name} = {value}° is outside 0..=180 degrees")]
    AngleRange { name: &'static str, value: f32 },

    #[error("rhythm pattern is empty but rhythm scoring is enabled")]
    EmptyPattern,

    #[error("rhythm pattern contains a negative or non-finite time: {0}")]
    InvalidPatternTime(f64),

    #[error("{name} must be positive, got {value}")]
    NonPositive { name: &'static str, value: f64 },

    #[error("minimum visibility {0} is outside 0..=1")]
    Visibility(f32),

    #[error("midpoint {0} is outside 0..1")]
    Midpoint(f32),

    #[error("unknown exercise in thresholds table: {0}")]
    UnknownExercise(String),

    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

#[derive(Error, Debug)]
pub enum CameraError {
    /// The device could not be opened or has gone away.
    #[error("camera unavailable: {0}")]
    Unavailable(String),

    /// The device is open but had no frame this time.
    #[error("no camera frame available")]
    ReadMiss,
}

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("pipeline has been stopped")]
    Stopped,

    #[error("command queue is full")]
    CommandQueueFull,
}
