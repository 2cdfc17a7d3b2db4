//! Vigil Runner - Stream Analysis Orchestration
//!
//! Wires the detectors and monitors into one analysis pass:
//!
//! - **Config**: one JSON document with every component config
//! - **Synthetic**: generated streams and regime-switching price paths
//! - **Market**: returns, volatility, momentum and heuristic regimes
//! - **Pipeline**: [`StreamAnalyzer`] fits, analyzes and raises alerts
//! - **Report**: text and JSON summaries of a run
//! - **Backtest**: regime classification scored against a generated path
//!
//! ## Flow
//!
//! ```text
//!   observations
//!        │
//!        ▼
//! ┌──────────────────┐   prepare    ┌─────────────────────────────┐
//! │  StreamAnalyzer  │─────────────>│ fit ML / reconstruction,    │
//! │                  │              │ drift reference, regimes    │
//! │                  │   analyze    ├─────────────────────────────┤
//! │                  │─────────────>│ 0.35 stat + 0.35 ml         │
//! │                  │              │   + 0.30 recon, drift,      │
//! │                  │              │   current regime            │
//! │                  │ raise_alerts ├─────────────────────────────┤
//! │                  │─────────────>│ AlertLog                    │
//! └──────────────────┘              └─────────────────────────────┘
//!        │
//!        ▼
//!  AnalysisReport
//! ```

pub mod backtest;
pub mod config;
pub mod market;
pub mod pipeline;
pub mod report;
pub mod synthetic;

// Re-export main types
pub use backtest::RegimeBacktest;
pub use config::{ConfigError, VigilConfig};
pub use market::MarketFrame;
pub use pipeline::{AnalysisResult, PreparedModels, StreamAnalyzer, combine_scores};
pub use report::{AnalysisReport, DriftSummary, MethodSummary, RegimeSummary};
pub use synthetic::{
    InjectedAnomaly, RegimePrices, SyntheticConfig, SyntheticStream, generate_regime_prices,
    generate_stream,
};
