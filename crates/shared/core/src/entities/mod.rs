mod detection;
mod drift;
mod observation;
mod regime;

pub use detection::{BatchDetection, StatisticalDetails, StatisticalDetection};
pub use drift::{DriftAssessment, DriftDetails, DriftRecord, ReferenceDistribution};
pub use observation::{Observation, validate_series, values_of};
pub use regime::{RegimeAssignment, RegimeLabel};
