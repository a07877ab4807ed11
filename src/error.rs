//! Error types for the ridgeline pipeline engine

use thiserror::Error;

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Main error type for the pipeline engine
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid state: {0}")]
    State(String),

    #[error("Directive list length {actual} does not match task sequence length {expected}")]
    LengthMismatch { expected: usize, actual: usize },

    #[error("Process '{0}' is already registered")]
    DuplicateName(String),

    #[error("Unrecognized directive '{0}' (expected compute, computeNsave, load or ignore)")]
    InvalidDirective(String),

    #[error("Stage '{stage}' requires output of a '{requires}' stage that was not produced in this run")]
    MissingDependency { stage: String, requires: String },

    #[error("No saved result for stage '{stage}' in this session")]
    NoSavedResult { stage: String },

    #[error("Field '{field}' was never populated for category '{category}'")]
    FieldNotFound { category: String, field: String },

    #[error("Dataset '{0}' is not registered")]
    DatasetNotFound(String),

    #[error("Data error: {0}")]
    Data(String),

    #[error("Invalid shape: expected {expected}, got {actual}")]
    Shape { expected: String, actual: String },

    #[error("Stage '{stage}' failed: {message}")]
    Stage { stage: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<polars::error::PolarsError> for PipelineError {
    fn from(err: polars::error::PolarsError) -> Self {
        PipelineError::Data(err.to_string())
    }
}

impl From<serde_json::Error> for PipelineError {
    fn from(err: serde_json::Error) -> Self {
        PipelineError::Serialization(err.to_string())
    }
}

impl From<ndarray::ShapeError> for PipelineError {
    fn from(err: ndarray::ShapeError) -> Self {
        PipelineError::Shape {
            expected: "valid shape".to_string(),
            actual: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = PipelineError::NoSavedResult {
            stage: "kernel:linear".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "No saved result for stage 'kernel:linear' in this session"
        );
    }

    #[test]
    fn test_length_mismatch_display() {
        let err = PipelineError::LengthMismatch {
            expected: 5,
            actual: 3,
        };
        assert!(err.to_string().contains("length 3"));
        assert!(err.to_string().contains("length 5"));
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: PipelineError = io_err.into();
        assert!(matches!(err, PipelineError::Io(_)));
    }
}
