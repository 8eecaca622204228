//! Error types for rust_dge

use thiserror::Error;

/// Main error type for the analysis pipeline
#[derive(Error, Debug)]
pub enum DgeError {
    #[error("Invalid count matrix: {reason}")]
    InvalidCountMatrix { reason: String },

    #[error("Invalid design table: {reason}")]
    InvalidDesign { reason: String },

    #[error("Dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: String, got: String },

    #[error("Parse error at line {line}: {reason}")]
    Parse { line: usize, reason: String },

    #[error("Insufficient data for {stage}: {reason}")]
    InsufficientData { stage: String, reason: String },

    #[error("Computation cancelled during {stage}")]
    Cancelled { stage: String },

    #[error("Invalid input: {reason}")]
    InvalidInput { reason: String },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

impl DgeError {
    /// Stage-scoped shortage of data (too few genes to cluster, empty universe, ...)
    pub fn insufficient(stage: &str, reason: impl Into<String>) -> Self {
        DgeError::InsufficientData {
            stage: stage.to_string(),
            reason: reason.into(),
        }
    }

    /// True for the errors that abort a run before any computation starts
    pub fn is_input_shape(&self) -> bool {
        matches!(
            self,
            DgeError::InvalidCountMatrix { .. }
                | DgeError::InvalidDesign { .. }
                | DgeError::DimensionMismatch { .. }
                | DgeError::Parse { .. }
        )
    }
}

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, DgeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insufficient_message_names_stage() {
        let err = DgeError::insufficient("clustering", "1 gene");
        assert_eq!(err.to_string(), "Insufficient data for clustering: 1 gene");
        assert!(!err.is_input_shape());
    }

    #[test]
    fn test_input_shape_classification() {
        let err = DgeError::InvalidDesign {
            reason: "missing sample".to_string(),
        };
        assert!(err.is_input_shape());
    }
}
