use thiserror::Error;

/// Failures raised while fitting or evaluating a model
///
/// Detectors catch these and fall back to neutral output.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ModelError {
    #[error("Insufficient samples: required {required}, found {found}")]
    InsufficientSamples { required: usize, found: usize },

    #[error("Model has not been fitted")]
    NotFitted,

    #[error("Numerically degenerate input: {0}")]
    Degenerate(String),

    #[error("Dimension mismatch: expected {expected} features, found {found}")]
    DimensionMismatch { expected: usize, found: usize },
}

impl From<vigil_core::Error> for ModelError {
    fn from(err: vigil_core::Error) -> Self {
        match err {
            vigil_core::Error::DimensionMismatch { expected, found } => {
                ModelError::DimensionMismatch { expected, found }
            }
            vigil_core::Error::EmptyInput => ModelError::InsufficientSamples {
                required: 1,
                found: 0,
            },
            other => ModelError::Degenerate(other.to_string()),
        }
    }
}

pub type ModelResult<T> = std::result::Result<T, ModelError>;
