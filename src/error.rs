//! Error taxonomy for flare creation.
//!
//! Collector bodies work with `anyhow::Result`; the assembler folds their
//! failures into one of these variants before anything reaches the caller.

use thiserror::Error;

/// Errors surfaced by a flare run.
#[derive(Error, Debug)]
pub enum FlareError {
    /// The staging area could not be created
    #[error("failed to prepare staging area: {0}")]
    Setup(String),

    /// A collector designated as mandatory failed
    #[error("collector '{collector}' failed: {reason}")]
    FatalCollection { collector: String, reason: String },

    /// An optional collector failed; recorded, never returned as `Err` by the assembler
    #[error("collector '{collector}' degraded: {reason}")]
    DegradedCollection { collector: String, reason: String },

    /// Compression or writing the final archive failed
    #[error("failed to package archive: {0}")]
    Packaging(String),

    /// A redaction rule could not be compiled or was registered too late
    #[error("invalid redaction configuration: {0}")]
    RedactionConfig(String),

    /// The caller cancelled the run
    #[error("flare creation was cancelled")]
    Cancelled,

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl FlareError {
    /// Name of the collector involved, when the error came from one.
    pub fn collector(&self) -> Option<&str> {
        match self {
            FlareError::FatalCollection { collector, .. }
            | FlareError::DegradedCollection { collector, .. } => Some(collector),
            _ => None,
        }
    }

    /// Whether this error stops the run.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, FlareError::DegradedCollection { .. })
    }
}

/// Result type alias for flare operations.
pub type Result<T> = std::result::Result<T, FlareError>;
