//! Error types for the era-blocks pipeline.

use thiserror::Error;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Coarse classification of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Invalid constructor argument.
    Configuration,
    /// Data precondition violated at transform time.
    Precondition,
    /// Degenerate linear algebra or non-finite results.
    Numerical,
}

/// Main error type for the era-blocks pipeline.
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid processor configuration.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Runtime precondition on the data violated.
    #[error("Precondition error: {0}")]
    Precondition(String),

    /// A value fell outside the range a processor requires.
    #[error("Precondition error: column '{column}' contains {value}, expected values in [{low}, {high}]")]
    ValueOutOfRange {
        column: String,
        value: f64,
        low: f64,
        high: f64,
    },

    /// Degenerate linear algebra or non-finite normalization result.
    #[error("Numerical error: {0}")]
    Numerical(String),

    /// Error raised inside a named pipeline stage.
    #[error("stage '{stage}' failed: {source}")]
    Stage {
        stage: String,
        #[source]
        source: Box<Error>,
    },

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Create a configuration error.
    pub fn configuration(msg: impl Into<String>) -> Self {
        Error::Configuration(msg.into())
    }

    /// Create a precondition error.
    pub fn precondition(msg: impl Into<String>) -> Self {
        Error::Precondition(msg.into())
    }

    /// Create a numerical error.
    pub fn numerical(msg: impl Into<String>) -> Self {
        Error::Numerical(msg.into())
    }

    /// Create a precondition error for a missing column.
    pub fn missing_column(name: &str) -> Self {
        Error::Precondition(format!("column '{name}' not found in dataset"))
    }

    /// Wrap this error with the name of the stage that produced it.
    pub fn in_stage(self, stage: impl Into<String>) -> Self {
        Error::Stage {
            stage: stage.into(),
            source: Box::new(self),
        }
    }

    /// Prefix the message with the era it was raised for.
    pub fn in_era(self, era: &str) -> Self {
        match self {
            Error::Numerical(msg) => Error::Numerical(format!("era '{era}': {msg}")),
            Error::Precondition(msg) => Error::Precondition(format!("era '{era}': {msg}")),
            other => other,
        }
    }

    /// Classify the error, looking through stage context.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Configuration(_) | Error::Json(_) => ErrorKind::Configuration,
            Error::Precondition(_) | Error::ValueOutOfRange { .. } => ErrorKind::Precondition,
            Error::Numerical(_) => ErrorKind::Numerical,
            Error::Stage { source, .. } => source.kind(),
        }
    }

    /// Name of the stage that failed, if the error carries one.
    pub fn stage(&self) -> Option<&str> {
        match self {
            Error::Stage { stage, .. } => Some(stage),
            _ => None,
        }
    }
}
