//! Vigil Monitors
//!
//! Stateful monitors that sit beside the anomaly detectors:
//!
//! - [`DriftMonitor`]: compares a frozen reference sample with the most
//!   recent window and keeps a bounded drift history
//! - [`RegimeClassifier`]: Gaussian mixture over rolling return moments
//! - [`AlertLog`]: bounded log of classified events with lifetime tallies

pub mod alerts;
pub mod drift;
pub mod regime;

pub use alerts::{Alert, AlertDetails, AlertLog, AlertLogConfig, AlertType, Severity};
pub use drift::{DriftConfig, DriftMonitor};
pub use regime::{GaussianMixture, LabelAlignment, RegimeClassifier, RegimeConfig, extract_features};
