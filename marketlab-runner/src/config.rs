//! Backtest configuration and content-addressed run ids.

use chrono::NaiveDate;
use marketlab_core::domain::{Channel, TradingEnvironment};
use marketlab_core::matching::FeeSchedule;
use marketlab_core::risk::RiskConfig;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

use crate::metrics::DEFAULT_RISK_FREE_RATE;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("start date {start} is after end date {end}")]
    InvertedDateRange { start: NaiveDate, end: NaiveDate },
    #[error("initial capital must be positive, got {0}")]
    NonPositiveCapital(f64),
    #[error("risk-free rate must be a finite non-negative fraction, got {0}")]
    BadRiskFreeRate(f64),
}

/// Everything that defines a run.
///
/// Strategy parameters are an ordered name -> value map so the run id is
/// stable under serialization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestConfig {
    pub symbol: String,
    /// Stock name, used for ST detection when classifying the environment.
    #[serde(default)]
    pub name: Option<String>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub initial_capital: f64,
    #[serde(default)]
    pub fees: FeeSchedule,
    #[serde(default)]
    pub risk: Option<RiskConfig>,
    /// Benchmark symbol, informational; benchmark returns arrive as data.
    #[serde(default)]
    pub benchmark: Option<String>,
    pub strategy: String,
    #[serde(default)]
    pub params: BTreeMap<String, f64>,
    #[serde(default)]
    pub channel: Channel,
    /// Explicit environment override; when absent the orchestrator
    /// classifies the symbol.
    #[serde(default)]
    pub environment: Option<TradingEnvironment>,
    #[serde(default = "default_risk_free_rate")]
    pub risk_free_rate: f64,
}

fn default_risk_free_rate() -> f64 {
    DEFAULT_RISK_FREE_RATE
}

impl BacktestConfig {
    pub fn new(
        symbol: impl Into<String>,
        start_date: NaiveDate,
        end_date: NaiveDate,
        initial_capital: f64,
        strategy: impl Into<String>,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            name: None,
            start_date,
            end_date,
            initial_capital,
            fees: FeeSchedule::default(),
            risk: None,
            benchmark: None,
            strategy: strategy.into(),
            params: BTreeMap::new(),
            channel: Channel::Direct,
            environment: None,
            risk_free_rate: DEFAULT_RISK_FREE_RATE,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.start_date > self.end_date {
            return Err(ConfigError::InvertedDateRange {
                start: self.start_date,
                end: self.end_date,
            });
        }
        if self.initial_capital <= 0.0 || !self.initial_capital.is_finite() {
            return Err(ConfigError::NonPositiveCapital(self.initial_capital));
        }
        if !self.risk_free_rate.is_finite() || self.risk_free_rate < 0.0 {
            return Err(ConfigError::BadRiskFreeRate(self.risk_free_rate));
        }
        Ok(())
    }

    /// Deterministic content hash: identical configs get identical run ids.
    pub fn run_id(&self) -> String {
        let json = serde_json::to_string(self).expect("BacktestConfig serialization failed");
        blake3::hash(json.as_bytes()).to_hex().to_string()
    }
}
