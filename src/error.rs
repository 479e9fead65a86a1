//! Error types for the mixing engine

use thiserror::Error;

use crate::audio::nodes::NodeKind;
use crate::audio::track::TrackId;

/// Errors raised by the engine and its configuration surface
#[derive(Debug, Error)]
pub enum EngineError {
    /// The processing context (audio device / driver) could not be created.
    /// Fatal for the session.
    #[error("audio processing context unavailable: {0}")]
    ContextUnavailable(String),

    #[error("failed to create {kind} node: {reason}")]
    NodeCreation { kind: NodeKind, reason: String },

    #[error("invalid {name}: {reason}")]
    InvalidParameter { name: &'static str, reason: String },

    #[error("{name} out of range: {value} (expected {min}..={max})")]
    OutOfRange {
        name: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("unknown track {0}")]
    UnknownTrack(TrackId),

    #[error("invalid connection: {0}")]
    InvalidConnection(String),

    #[error("scheduler error: {0}")]
    Scheduler(String),

    #[error("audio engine not initialized")]
    NotInitialized,

    #[error("invalid settings: {0}")]
    Settings(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl EngineError {
    pub(crate) fn out_of_range(name: &'static str, value: impl Into<f64>, min: impl Into<f64>, max: impl Into<f64>) -> Self {
        Self::OutOfRange {
            name,
            value: value.into(),
            min: min.into(),
            max: max.into(),
        }
    }

    /// Whether a caller may retry the failed operation
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::NodeCreation { .. } | Self::Scheduler(_))
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
