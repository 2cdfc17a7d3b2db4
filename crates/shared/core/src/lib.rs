//! Vigil Core Domain
//!
//! Pure domain types and numeric building blocks for the Vigil stream monitor.
//! This crate contains no I/O and no randomness, and is 100% unit testable.
//!
//! - **Entities**: observations and the typed result records every detector
//!   and monitor produces
//! - **Buffers**: capacity-bounded FIFO storage (`RingBuffer`, `RollingBuffer`)
//! - **Stats**: descriptive statistics, histograms and feature scaling

pub mod buffers;
pub mod entities;
pub mod error;
pub mod stats;
pub mod values;

// Re-export commonly used types at crate root
pub use buffers::{RingBuffer, RollingBuffer};
pub use entities::{
    BatchDetection, DriftAssessment, DriftDetails, DriftRecord, Observation,
    ReferenceDistribution, RegimeAssignment, RegimeLabel, StatisticalDetails,
    StatisticalDetection, validate_series, values_of,
};
pub use error::{Error, Result};
pub use stats::StandardScaler;
pub use values::{EPSILON, Timestamp};
