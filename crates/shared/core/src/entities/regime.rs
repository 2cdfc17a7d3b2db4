use serde::{Deserialize, Serialize};
use std::fmt;

/// Display label for a regime id
///
/// Ids 0 to 3 carry fixed names and colors; any higher id is `Other`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RegimeLabel {
    BullishMomentum,
    BearishDecline,
    Consolidation,
    HighVolatility,
    Other(usize),
}

impl RegimeLabel {
    pub fn from_id(id: usize) -> Self {
        match id {
            0 => RegimeLabel::BullishMomentum,
            1 => RegimeLabel::BearishDecline,
            2 => RegimeLabel::Consolidation,
            3 => RegimeLabel::HighVolatility,
            other => RegimeLabel::Other(other),
        }
    }

    pub fn id(&self) -> usize {
        match self {
            RegimeLabel::BullishMomentum => 0,
            RegimeLabel::BearishDecline => 1,
            RegimeLabel::Consolidation => 2,
            RegimeLabel::HighVolatility => 3,
            RegimeLabel::Other(id) => *id,
        }
    }

    pub fn name(&self) -> String {
        match self {
            RegimeLabel::BullishMomentum => "Bullish Momentum".to_string(),
            RegimeLabel::BearishDecline => "Bearish Decline".to_string(),
            RegimeLabel::Consolidation => "Consolidation".to_string(),
            RegimeLabel::HighVolatility => "High Volatility".to_string(),
            RegimeLabel::Other(id) => format!("Regime {}", id),
        }
    }

    /// Hex display color
    pub fn color(&self) -> &'static str {
        match self {
            RegimeLabel::BullishMomentum => "#00ff88",
            RegimeLabel::BearishDecline => "#ff3366",
            RegimeLabel::Consolidation => "#00aaff",
            RegimeLabel::HighVolatility => "#ffaa00",
            RegimeLabel::Other(_) => "#ffffff",
        }
    }
}

impl fmt::Display for RegimeLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

/// Regime classification of the most recent feature row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegimeAssignment {
    pub regime: usize,
    pub label: RegimeLabel,
    /// Largest posterior probability
    pub confidence: f64,
    /// Posterior indexed by regime id
    pub probabilities: Vec<f64>,
}

impl RegimeAssignment {
    pub fn new(regime: usize, confidence: f64, probabilities: Vec<f64>) -> Self {
        Self {
            regime,
            label: RegimeLabel::from_id(regime),
            confidence,
            probabilities,
        }
    }

    pub fn color(&self) -> &'static str {
        self.label.color()
    }
}
