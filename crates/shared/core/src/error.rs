//! Core errors

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("Empty input")]
    EmptyInput,

    #[error("Dimension mismatch: expected {expected} features, found {found}")]
    DimensionMismatch { expected: usize, found: usize },

    #[error("Non-finite value at index {index}")]
    NonFiniteValue { index: usize },

    #[error("Timestamp at index {index} is earlier than its predecessor")]
    TimestampOutOfOrder { index: usize },
}

pub type Result<T> = std::result::Result<T, Error>;
