//! Error types for charcnn operations.
//!
//! The quantizer never fails; every other fallible operation returns
//! [`Result`] with a [`CharCnnError`] describing what went wrong.

use std::path::PathBuf;

use thiserror::Error;

/// Main error type for charcnn operations.
///
/// # Examples
///
/// ```
/// use charcnn::error::CharCnnError;
///
/// let err = CharCnnError::DimensionMismatch {
///     expected: "250 columns".to_string(),
///     actual: "100 columns".to_string(),
/// };
/// assert!(err.to_string().contains("dimension mismatch"));
/// ```
#[derive(Debug, Error)]
pub enum CharCnnError {
    /// Input or target dimensions don't match what the model expects.
    #[error("Matrix dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Expected dimensions description
        expected: String,
        /// Actual dimensions found
        actual: String,
    },

    /// The layer stack cannot be assembled for the given shapes.
    #[error("Invalid architecture at layer {layer}: {reason}")]
    InvalidArchitecture {
        /// Layer name where shape inference failed
        layer: String,
        /// What went wrong
        reason: String,
    },

    /// Training produced a non-finite loss.
    #[error("Convergence failure after {iterations} iterations, loss = {final_loss}")]
    ConvergenceFailure {
        /// Number of optimizer steps attempted
        iterations: usize,
        /// Final loss value
        final_loss: f64,
    },

    /// Invalid hyperparameter or option value provided.
    #[error("Invalid hyperparameter: {param} = {value}, expected {constraint}")]
    InvalidHyperparameter {
        /// Parameter name
        param: String,
        /// Provided value
        value: String,
        /// Constraint description
        constraint: String,
    },

    /// The search objective was not reported by a trial.
    #[error("Objective '{objective}' missing from trial {trial} metrics")]
    MissingObjective {
        /// Objective metric name
        objective: String,
        /// Trial identifier
        trial: usize,
    },

    /// The search finished without any completed trial.
    #[error("Search completed no trials")]
    NoTrials,

    /// Save or predict was called before any model was built.
    #[error("No model has been built yet")]
    ModelNotBuilt,

    /// Label is not part of the class list.
    #[error("Unknown class label: {0}")]
    UnknownLabel(String),

    /// Invalid or corrupt model file.
    #[error("Invalid model format in {path}: {message}")]
    FormatError {
        /// File that failed to parse
        path: PathBuf,
        /// Error description
        message: String,
    },

    /// I/O error (file not found, permission denied, etc.).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl CharCnnError {
    /// Create a dimension mismatch error with descriptive context
    #[must_use]
    pub fn dimension_mismatch(context: &str, expected: usize, actual: usize) -> Self {
        Self::DimensionMismatch {
            expected: format!("{context}={expected}"),
            actual: format!("{actual}"),
        }
    }

    /// Create an architecture error for the named layer.
    #[must_use]
    pub fn invalid_architecture(layer: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidArchitecture {
            layer: layer.into(),
            reason: reason.into(),
        }
    }
}

/// Convenience type alias for Results.
pub type Result<T> = std::result::Result<T, CharCnnError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dimension_mismatch_display() {
        let err = CharCnnError::dimension_mismatch("input_len", 250, 100);
        let msg = err.to_string();
        assert!(msg.contains("dimension mismatch"));
        assert!(msg.contains("input_len=250"));
        assert!(msg.contains("100"));
    }

    #[test]
    fn test_invalid_architecture_display() {
        let err = CharCnnError::invalid_architecture("conv1d_3", "kernel 7 exceeds length 5");
        let msg = err.to_string();
        assert!(msg.contains("conv1d_3"));
        assert!(msg.contains("kernel 7"));
    }

    #[test]
    fn test_convergence_failure_display() {
        let err = CharCnnError::ConvergenceFailure {
            iterations: 12,
            final_loss: f64::NAN,
        };
        assert!(err.to_string().contains("Convergence failure after 12"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: CharCnnError = io.into();
        assert!(matches!(err, CharCnnError::Io(_)));
        assert!(err.to_string().contains("missing"));
    }

    #[test]
    fn test_serde_error_conversion() {
        let parse = serde_json::from_str::<u32>("not json").unwrap_err();
        let err: CharCnnError = parse.into();
        assert!(matches!(err, CharCnnError::Serialization(_)));
    }

    #[test]
    fn test_missing_objective_display() {
        let err = CharCnnError::MissingObjective {
            objective: "val_accuracy".to_string(),
            trial: 3,
        };
        assert_eq!(
            err.to_string(),
            "Objective 'val_accuracy' missing from trial 3 metrics"
        );
    }
}
