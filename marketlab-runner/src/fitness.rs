//! Fitness metric — configurable selector for ranking optimization candidates.

use crate::metrics::PerformanceReport;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Which metric to optimize/sort by.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FitnessMetric {
    #[default]
    Sharpe,
    Sortino,
    Calmar,
    TotalReturn,
    Cagr,
    AnnualReturn,
    WinRate,
    ProfitFactor,
    MaxDrawdown,
}

impl FitnessMetric {
    /// Extract the relevant value from a performance report.
    pub fn extract(&self, report: &PerformanceReport) -> f64 {
        match self {
            Self::Sharpe => report.sharpe,
            Self::Sortino => report.sortino,
            Self::Calmar => report.calmar,
            Self::TotalReturn => report.total_return,
            Self::Cagr => report.cagr,
            Self::AnnualReturn => report.annual_return,
            Self::WinRate => report.win_rate,
            Self::ProfitFactor => report.profit_factor,
            Self::MaxDrawdown => report.max_drawdown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sharpe => "sharpe",
            Self::Sortino => "sortino",
            Self::Calmar => "calmar",
            Self::TotalReturn => "total_return",
            Self::Cagr => "cagr",
            Self::AnnualReturn => "annual_return",
            Self::WinRate => "win_rate",
            Self::ProfitFactor => "profit_factor",
            Self::MaxDrawdown => "max_drawdown",
        }
    }

    /// Compare two scores. `a > b` is correct for every metric: max_drawdown
    /// is negative, and closer to zero is better.
    pub fn is_better(&self, a: f64, b: f64) -> bool {
        a > b
    }
}

impl FromStr for FitnessMetric {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sharpe" | "sharpe_ratio" => Ok(Self::Sharpe),
            "sortino" | "sortino_ratio" => Ok(Self::Sortino),
            "calmar" | "calmar_ratio" => Ok(Self::Calmar),
            "total_return" => Ok(Self::TotalReturn),
            "cagr" => Ok(Self::Cagr),
            "annual_return" => Ok(Self::AnnualReturn),
            "win_rate" => Ok(Self::WinRate),
            "profit_factor" => Ok(Self::ProfitFactor),
            "max_drawdown" => Ok(Self::MaxDrawdown),
            other => Err(format!("unknown fitness metric: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_report() -> PerformanceReport {
        PerformanceReport {
            total_return: 0.15,
            cagr: 0.12,
            annual_return: 0.13,
            volatility: 0.2,
            max_drawdown: -0.10,
            max_drawdown_duration: 14,
            sharpe: 1.5,
            sortino: 2.0,
            calmar: 1.2,
            total_trades: 20,
            win_rate: 0.55,
            profit_factor: 1.8,
            avg_trade_return: 0.01,
            avg_profit_amount: 500.0,
            avg_loss_amount: 300.0,
            turnover_rate: 3.5,
            avg_holding_days: 9.0,
            benchmark: None,
        }
    }

    #[test]
    fn extract_sharpe() {
        assert!((FitnessMetric::Sharpe.extract(&sample_report()) - 1.5).abs() < 1e-10);
    }

    #[test]
    fn default_is_sharpe() {
        assert_eq!(FitnessMetric::default(), FitnessMetric::Sharpe);
    }

    #[test]
    fn is_better_max_drawdown() {
        // -0.05 beats -0.20 (less negative)
        assert!(FitnessMetric::MaxDrawdown.is_better(-0.05, -0.20));
        assert!(!FitnessMetric::MaxDrawdown.is_better(-0.20, -0.05));
    }

    #[test]
    fn parse_round_trips_as_str() {
        for metric in [
            FitnessMetric::Sharpe,
            FitnessMetric::TotalReturn,
            FitnessMetric::MaxDrawdown,
        ] {
            assert_eq!(metric.as_str().parse::<FitnessMetric>().unwrap(), metric);
        }
        assert!("bogus".parse::<FitnessMetric>().is_err());
    }
}
