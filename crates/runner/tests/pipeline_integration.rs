//! Stream Analysis Integration Test
//!
//! Runs the full pipeline over synthetic streams:
//! - fitting every batch model and the drift reference
//! - per-point detection and score combination
//! - alert generation and the final report

use chrono::{Duration, TimeZone, Utc};
use std::sync::Arc;
use vigil_clock::ManualClock;
use vigil_core::{Observation, RegimeAssignment};
use vigil_monitor::{AlertDetails, AlertType, Severity};
use vigil_runner::{
    AnalysisReport, StreamAnalyzer, SyntheticConfig, SyntheticStream, VigilConfig,
    generate_stream,
};

fn clock() -> Arc<ManualClock> {
    Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2024, 3, 1, 9, 30, 0).unwrap(),
    ))
}

fn config() -> VigilConfig {
    let mut config = VigilConfig::default();
    config.reconstruction.seed = Some(5);
    config
}

fn stream(with_anomalies: bool) -> SyntheticStream {
    generate_stream(&SyntheticConfig {
        n_points: 500,
        with_anomalies,
        seed: Some(21),
        end_time: Some(Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap()),
        ..Default::default()
    })
}

/// Test a full prepare/analyze pass over a seeded stream
#[test]
fn test_full_analysis() {
    let stream = stream(true);
    let mut analyzer = StreamAnalyzer::new(&config(), clock());

    let prepared = analyzer.prepare(&stream.observations).unwrap();
    assert!(prepared.ml_ensemble);
    assert!(prepared.reconstruction);
    assert!(prepared.drift_reference);
    assert!(prepared.regime);

    let result = analyzer.analyze(&stream.observations).unwrap();
    assert_eq!(result.len(), 500);
    assert_eq!(result.statistical.len(), 500);
    assert_eq!(result.ml.scores.len(), 500);
    assert_eq!(result.reconstruction.scores.len(), 500);
    assert_eq!(result.combined.len(), 500);

    // 0.35 + 0.35 + 0.30 * 2
    assert!(result.combined.scores.iter().all(|s| (0.0..=1.3).contains(s)));
    assert!(result.statistical.iter().all(|d| (0.0..=1.0).contains(&d.score)));
    // warmup
    assert!(result.statistical[..9].iter().all(|d| !d.is_ready()));

    let drift = result.drift.details.as_ref().expect("drift should be assessed");
    assert!((0.0..=1.0).contains(&result.drift.score));
    assert!(drift.ks_statistic >= 0.0 && drift.ks_statistic <= 1.0);
    assert_eq!(analyzer.drift_monitor().history().len(), 1);

    let regime = result.regime.as_ref().expect("regime classifier should be fitted");
    assert!(regime.confidence > 0.0 && regime.confidence <= 1.0);
    let total: f64 = regime.probabilities.iter().sum();
    assert!((total - 1.0).abs() < 1e-9);
}

/// Test that a final spike raises a critical statistical alert
#[test]
fn test_spike_raises_critical_alert() {
    let mut stream = stream(false);
    let last = stream.observations.len() - 1;
    stream.observations[last].value += 60.0;

    let mut analyzer = StreamAnalyzer::new(&config(), clock());
    analyzer.prepare(&stream.observations).unwrap();
    let result = analyzer.analyze(&stream.observations).unwrap();

    let spike = &result.statistical[last];
    assert!(spike.is_anomaly);
    assert!(spike.score > 0.8);

    let raised = analyzer.raise_alerts(&result);
    assert!(raised >= 1);

    let critical = analyzer.alerts().get_recent(100, Some(Severity::Critical));
    assert!(critical.iter().any(|a| {
        a.alert_type == AlertType::StatisticalAnomaly
            && matches!(a.details, AlertDetails::Statistical { index, .. } if index == last)
    }));

    assert!(result.combined.labels[last]);
    let warnings = analyzer.alerts().get_recent(100, Some(Severity::Warning));
    assert!(warnings.iter().any(|a| {
        a.alert_type == AlertType::EnsembleAnomaly
            && matches!(a.details, AlertDetails::Ensemble { index, score } if index == last && score > 0.5)
    }));
}

/// Test that a level shift after the reference raises a drift alert
#[test]
fn test_level_shift_raises_drift_alert() {
    let stream = stream(false);
    let mut analyzer = StreamAnalyzer::new(&config(), clock());
    analyzer.prepare(&stream.observations).unwrap();

    let shifted: Vec<Observation> = stream
        .observations
        .iter()
        .map(|o| Observation::new(o.timestamp, o.value + 25.0))
        .collect();
    let result = analyzer.analyze(&shifted).unwrap();
    assert!(result.drift.detected);
    assert!(result.drift.score > 0.5);

    analyzer.raise_alerts(&result);
    let summary = analyzer.alerts().get_summary();
    assert_eq!(summary.get(&AlertType::ModelDrift), Some(&1));
    let drift_alert = analyzer
        .alerts()
        .get_recent(100, None)
        .into_iter()
        .find(|a| a.alert_type == AlertType::ModelDrift)
        .unwrap();
    assert_eq!(drift_alert.severity, Severity::Critical);
}

/// Test that a regime change between analyses raises an info alert
#[test]
fn test_regime_change_raises_info_alert() {
    let stream = stream(false);
    let mut analyzer = StreamAnalyzer::new(&config(), clock());
    analyzer.prepare(&stream.observations).unwrap();
    let mut result = analyzer.analyze(&stream.observations).unwrap();
    result.drift.detected = false;
    result.statistical.iter_mut().for_each(|d| d.is_anomaly = false);
    result.combined.labels.iter_mut().for_each(|l| *l = false);

    result.regime = Some(RegimeAssignment::new(2, 0.8, vec![0.1, 0.05, 0.8, 0.05]));
    assert_eq!(analyzer.raise_alerts(&result), 0);

    result.regime = Some(RegimeAssignment::new(3, 0.7, vec![0.1, 0.1, 0.1, 0.7]));
    assert_eq!(analyzer.raise_alerts(&result), 1);

    let recent = analyzer.alerts().get_recent(1, Some(Severity::Info));
    assert_eq!(recent.len(), 1);
    assert_eq!(recent[0].alert_type, AlertType::RegimeShift);
    assert!(recent[0].message.contains("Consolidation"));
    assert!(recent[0].message.contains("High Volatility"));
}

/// Test report rendering as text and JSON
#[test]
fn test_report_renders() {
    let stream = stream(true);
    let clock = clock();
    let mut analyzer = StreamAnalyzer::new(&config(), clock.clone());
    analyzer.prepare(&stream.observations).unwrap();
    clock.advance(Duration::minutes(1));
    let result = analyzer.analyze(&stream.observations).unwrap();
    analyzer.raise_alerts(&result);

    let report = AnalysisReport::new(&result, analyzer.alerts());
    assert_eq!(report.points_analyzed, 500);
    assert_eq!(report.methods.len(), 4);
    assert_eq!(report.methods[3].anomalies, result.combined.anomaly_count());
    assert!(report.transitions.len() <= 5);
    assert_eq!(report.regime_distribution.values().sum::<usize>(), 500);

    let text = report.to_string();
    assert!(text.contains("Points analyzed: 500"));
    assert!(text.contains("Combined"));

    let json: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();
    assert_eq!(json["points_analyzed"], 500);
    assert_eq!(json["methods"][0]["method"], "Statistical");
}

/// Test that invalid input is rejected
#[test]
fn test_invalid_input_is_rejected() {
    let mut analyzer = StreamAnalyzer::new(&config(), clock());
    assert!(analyzer.analyze(&[]).is_err());

    let t = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    let out_of_order = vec![
        Observation::new(t, 1.0),
        Observation::new(t - Duration::minutes(1), 2.0),
    ];
    assert!(analyzer.prepare(&out_of_order).is_err());

    let non_finite = vec![Observation::new(t, f64::NAN)];
    assert!(analyzer.analyze(&non_finite).is_err());
}
