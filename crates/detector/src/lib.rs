//! Vigil Detectors
//!
//! Three independent anomaly detection strategies over a univariate stream:
//!
//! - [`StatisticalDetector`]: streaming, one value at a time, four classical
//!   outlier tests over a rolling window
//! - [`MlEnsembleDetector`]: batch, majority vote of four unsupervised
//!   outlier models
//! - [`ReconstructionDetector`]: batch, thresholded reconstruction residuals
//!
//! Detectors never fail: below their minimum sample counts, or before being
//! fitted, they return neutral output.

pub mod ensemble;
pub mod reconstruction;
pub mod statistical;

pub use ensemble::{
    EnsembleConfig, EnsembleDetection, IsolationForest, LocalOutlierFactor, MlEnsembleDetector,
    ModelVotes, OneClassSvm, RobustCovariance,
};
pub use reconstruction::{JumpResidualModel, ReconstructionConfig, ReconstructionDetector};
pub use statistical::{StatisticalConfig, StatisticalDetector};
