//! Alert Log
//!
//! Bounded log of classified events. The oldest alert is evicted when the
//! log is full; the per-type tally keeps counting across evictions.

use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;
use vigil_clock::SystemClock;
use vigil_core::{DriftDetails, RegimeLabel, RingBuffer, StatisticalDetails, Timestamp};
use vigil_ports::Clock;

/// Kind of event an alert reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertType {
    StatisticalAnomaly,
    EnsembleAnomaly,
    ModelDrift,
    RegimeShift,
}

impl AlertType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertType::StatisticalAnomaly => "statistical_anomaly",
            AlertType::EnsembleAnomaly => "ensemble_anomaly",
            AlertType::ModelDrift => "model_drift",
            AlertType::RegimeShift => "regime_shift",
        }
    }
}

impl fmt::Display for AlertType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Critical,
    Warning,
    Info,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Critical => "critical",
            Severity::Warning => "warning",
            Severity::Info => "info",
        };
        f.write_str(s)
    }
}

/// Structured payload attached to an alert
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AlertDetails {
    #[default]
    None,
    Statistical {
        index: usize,
        value: f64,
        score: f64,
        details: Option<StatisticalDetails>,
    },
    Drift {
        score: f64,
        details: DriftDetails,
    },
    Regime {
        from: RegimeLabel,
        to: RegimeLabel,
        confidence: f64,
    },
    Ensemble {
        index: usize,
        score: f64,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub id: Uuid,
    pub timestamp: Timestamp,
    pub alert_type: AlertType,
    pub severity: Severity,
    pub message: String,
    pub details: AlertDetails,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertLogConfig {
    pub max_alerts: usize,
}

impl Default for AlertLogConfig {
    fn default() -> Self {
        Self { max_alerts: 100 }
    }
}

pub struct AlertLog {
    clock: Arc<dyn Clock>,
    alerts: RingBuffer<Alert>,
    counts: BTreeMap<AlertType, u64>,
}

impl AlertLog {
    pub fn new(config: AlertLogConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            alerts: RingBuffer::new(config.max_alerts),
            counts: BTreeMap::new(),
        }
    }

    /// Record an alert stamped with the injected clock
    pub fn add_alert(
        &mut self,
        alert_type: AlertType,
        severity: Severity,
        message: impl Into<String>,
        details: AlertDetails,
    ) -> Uuid {
        let alert = Alert {
            id: Uuid::new_v4(),
            timestamp: self.clock.now(),
            alert_type,
            severity,
            message: message.into(),
            details,
        };
        let id = alert.id;

        match severity {
            Severity::Critical => warn!("[ALERT] {} {}: {}", severity, alert_type, alert.message),
            _ => info!("[ALERT] {} {}: {}", severity, alert_type, alert.message),
        }

        *self.counts.entry(alert_type).or_insert(0) += 1;
        self.alerts.push(alert);
        id
    }

    /// Last `n` retained alerts, filtered by severity, most recent first
    ///
    /// The filter applies after taking the last `n`, so fewer than `n`
    /// alerts may come back even when older matches exist.
    pub fn get_recent(&self, n: usize, severity: Option<Severity>) -> Vec<&Alert> {
        self.alerts
            .iter_recent()
            .take(n)
            .filter(|a| severity.is_none_or(|s| a.severity == s))
            .collect()
    }

    /// Alerts raised per type over the lifetime of the log
    pub fn get_summary(&self) -> BTreeMap<AlertType, u64> {
        self.counts.clone()
    }

    pub fn len(&self) -> usize {
        self.alerts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.alerts.is_empty()
    }
}

impl Default for AlertLog {
    fn default() -> Self {
        Self::new(AlertLogConfig::default(), Arc::new(SystemClock::new()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use vigil_clock::ManualClock;

    fn log_with_capacity(max_alerts: usize) -> (AlertLog, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        ));
        let log = AlertLog::new(AlertLogConfig { max_alerts }, clock.clone());
        (log, clock)
    }

    #[test]
    fn test_keeps_newest_and_counts_all() {
        let (mut log, clock) = log_with_capacity(3);
        for i in 0..5 {
            log.add_alert(
                AlertType::StatisticalAnomaly,
                Severity::Warning,
                format!("alert {}", i),
                AlertDetails::None,
            );
            clock.advance(Duration::seconds(1));
        }

        assert_eq!(log.len(), 3);
        let recent = log.get_recent(10, None);
        let messages: Vec<&str> = recent.iter().map(|a| a.message.as_str()).collect();
        assert_eq!(messages, vec!["alert 4", "alert 3", "alert 2"]);
        assert!(recent[0].timestamp > recent[1].timestamp);
        assert_eq!(log.get_summary()[&AlertType::StatisticalAnomaly], 5);
    }

    #[test]
    fn test_default_log_starts_empty() {
        let mut log = AlertLog::default();
        assert!(log.is_empty());
        log.add_alert(AlertType::RegimeShift, Severity::Info, "shift", AlertDetails::None);
        assert!(!log.is_empty());
        assert_eq!(log.get_summary()[&AlertType::RegimeShift], 1);
    }

    #[test]
    fn test_filter_applies_after_limit() {
        let (mut log, _) = log_with_capacity(10);
        log.add_alert(AlertType::ModelDrift, Severity::Critical, "drift", AlertDetails::None);
        log.add_alert(AlertType::RegimeShift, Severity::Info, "shift", AlertDetails::None);
        log.add_alert(AlertType::RegimeShift, Severity::Info, "shift", AlertDetails::None);

        assert!(log.get_recent(2, Some(Severity::Critical)).is_empty());
        assert_eq!(log.get_recent(3, Some(Severity::Critical)).len(), 1);
        assert_eq!(log.get_recent(3, Some(Severity::Info)).len(), 2);
    }

    #[test]
    fn test_ids_are_unique() {
        let (mut log, _) = log_with_capacity(10);
        let a = log.add_alert(AlertType::EnsembleAnomaly, Severity::Info, "a", AlertDetails::None);
        let b = log.add_alert(AlertType::EnsembleAnomaly, Severity::Info, "b", AlertDetails::None);
        assert_ne!(a, b);
        assert_eq!(log.get_recent(1, None)[0].id, b);
    }

    #[test]
    fn test_summary_is_ordered_by_type() {
        let (mut log, _) = log_with_capacity(10);
        log.add_alert(AlertType::RegimeShift, Severity::Info, "r", AlertDetails::None);
        log.add_alert(AlertType::StatisticalAnomaly, Severity::Warning, "s", AlertDetails::None);
        let keys: Vec<AlertType> = log.get_summary().into_keys().collect();
        assert_eq!(keys, vec![AlertType::StatisticalAnomaly, AlertType::RegimeShift]);
    }

    #[test]
    fn test_alert_serializes_with_tagged_details() {
        let (mut log, _) = log_with_capacity(1);
        log.add_alert(
            AlertType::RegimeShift,
            Severity::Info,
            "shift",
            AlertDetails::Regime {
                from: RegimeLabel::Consolidation,
                to: RegimeLabel::HighVolatility,
                confidence: 0.9,
            },
        );
        let json = serde_json::to_value(log.get_recent(1, None)[0]).unwrap();
        assert_eq!(json["alert_type"], "regime_shift");
        assert_eq!(json["severity"], "info");
        assert_eq!(json["details"]["kind"], "regime");
    }
}
