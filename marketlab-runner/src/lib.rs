//! Marketlab Runner — backtest orchestration, metrics, and optimization.
//!
//! This crate builds on `marketlab-core` to provide:
//! - Backtest configuration with content-addressed run ids
//! - The orchestrator driving the trading engine over a bar series
//! - Performance metrics (returns, drawdowns, risk-adjusted ratios,
//!   trade statistics, benchmark comparison)
//! - Grid search over strategy parameters with constraint filtering
//! - Walk-forward validation with overfit detection

pub mod config;
pub mod fitness;
pub mod grid_search;
pub mod metrics;
pub mod orchestrator;
pub mod walk_forward;

pub use config::{BacktestConfig, ConfigError};
pub use fitness::FitnessMetric;
pub use grid_search::{
    CandidateRow, Constraints, GridSearchError, GridSearchOptimizer, GridSearchResult, Heatmap,
    ParamGrid,
};
pub use metrics::{EquityPoint, PerformanceReport};
pub use orchestrator::{
    BacktestOrchestrator, BacktestResult, RunError, RunMetadata, StrategyFn,
};
pub use walk_forward::{
    WalkForwardError, WalkForwardReport, WalkForwardValidator, WindowResult, WindowSpec,
};
