// Engine error types
// Resolution and configuration problems; none of these are fatal to a session

use thiserror::Error;

/// Errors surfaced by the performance engine
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Unknown chord: {0}")]
    UnknownChord(String),

    #[error("Unknown pattern: {0}")]
    UnknownPattern(String),

    #[error("Invalid time signature: {0}")]
    InvalidTimeSignature(String),

    #[error("Invalid key: {0}")]
    InvalidKey(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("RON error: {0}")]
    Ron(#[from] ron::error::SpannedError),

    #[error("MIDI output error: {0}")]
    Midi(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl EngineError {
    /// Resolution errors are treated as no-ops by the engine
    pub fn is_resolution(&self) -> bool {
        matches!(
            self,
            EngineError::UnknownChord(_) | EngineError::UnknownPattern(_)
        )
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
