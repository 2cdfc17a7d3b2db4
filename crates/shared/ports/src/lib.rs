//! Vigil Ports
//!
//! Port definitions (traits) for the Vigil stream monitor.
//! These define the boundaries between the detectors and the models and time
//! sources plugged into them.

mod clock;
mod detector;
mod error;
mod model;

pub use clock::Clock;
pub use detector::BatchDetector;
pub use error::{ModelError, ModelResult};
pub use model::{OutlierModel, ResidualModel, Vote};
