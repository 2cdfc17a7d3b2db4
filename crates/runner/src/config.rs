//! Runner configuration
//!
//! One JSON document carries every component config. Missing sections and
//! fields fall back to their defaults:
//!
//! ```json
//! {
//!   "statistical": { "z_threshold": 2.5 },
//!   "drift": { "drift_threshold": 0.2 },
//!   "synthetic": { "n_points": 1000 }
//! }
//! ```

use crate::synthetic::SyntheticConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use vigil_detector::{EnsembleConfig, ReconstructionConfig, StatisticalConfig};
use vigil_monitor::{AlertLogConfig, DriftConfig, RegimeConfig};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VigilConfig {
    pub statistical: StatisticalConfig,
    pub ensemble: EnsembleConfig,
    pub reconstruction: ReconstructionConfig,
    pub drift: DriftConfig,
    pub regime: RegimeConfig,
    pub alerts: AlertLogConfig,
    pub synthetic: SyntheticConfig,
}

impl VigilConfig {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&json)
    }

    pub fn to_json_pretty(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
