use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::values::Timestamp;

/// A single timestamped point of the monitored stream
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub timestamp: Timestamp,
    pub value: f64,
}

impl Observation {
    pub fn new(timestamp: Timestamp, value: f64) -> Self {
        Self { timestamp, value }
    }
}

/// Check that a series is non-empty, finite and ordered by time
///
/// Equal consecutive timestamps are accepted.
pub fn validate_series(observations: &[Observation]) -> Result<()> {
    if observations.is_empty() {
        return Err(Error::EmptyInput);
    }
    for (index, obs) in observations.iter().enumerate() {
        if !obs.value.is_finite() {
            return Err(Error::NonFiniteValue { index });
        }
        if index > 0 && obs.timestamp < observations[index - 1].timestamp {
            return Err(Error::TimestampOutOfOrder { index });
        }
    }
    Ok(())
}

/// Project a series onto its values
pub fn values_of(observations: &[Observation]) -> Vec<f64> {
    observations.iter().map(|o| o.value).collect()
}
