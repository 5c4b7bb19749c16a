//! Portfolio — cash plus open positions.

use super::position::Position;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PortfolioError {
    #[error("initial capital must be positive, got {0}")]
    NonPositiveCapital(f64),
}

/// Aggregate portfolio state.
///
/// The accounting identity `total_equity == cash + market_value` must hold
/// at every bar; positions are marked to the bar close before equity is read.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Portfolio {
    pub cash: f64,
    pub initial_capital: f64,
    pub positions: HashMap<String, Position>,
}

impl Portfolio {
    pub fn new(initial_capital: f64) -> Result<Self, PortfolioError> {
        if initial_capital <= 0.0 || !initial_capital.is_finite() {
            return Err(PortfolioError::NonPositiveCapital(initial_capital));
        }
        Ok(Self {
            cash: initial_capital,
            initial_capital,
            positions: HashMap::new(),
        })
    }

    /// Sum of position market values at their current marks.
    pub fn market_value(&self) -> f64 {
        self.positions.values().map(Position::market_value).sum()
    }

    /// Total equity = cash + sum of position market values.
    pub fn total_equity(&self) -> f64 {
        self.cash + self.market_value()
    }

    /// Return since inception as a fraction of initial capital.
    pub fn total_return_pct(&self) -> f64 {
        (self.total_equity() - self.initial_capital) / self.initial_capital
    }

    pub fn has_position(&self, symbol: &str) -> bool {
        self.positions
            .get(symbol)
            .is_some_and(|p| p.quantity > 0)
    }

    pub fn get_position(&self, symbol: &str) -> Option<&Position> {
        self.positions.get(symbol).filter(|p| p.quantity > 0)
    }

    pub fn get_position_mut(&mut self, symbol: &str) -> Option<&mut Position> {
        self.positions.get_mut(symbol).filter(|p| p.quantity > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn rejects_non_positive_capital() {
        assert!(Portfolio::new(0.0).is_err());
        assert!(Portfolio::new(-5.0).is_err());
        assert!(Portfolio::new(100_000.0).is_ok());
    }

    #[test]
    fn equity_with_no_positions() {
        let portfolio = Portfolio::new(100_000.0).unwrap();
        assert_eq!(portfolio.total_equity(), 100_000.0);
        assert_eq!(portfolio.total_return_pct(), 0.0);
    }

    #[test]
    fn equity_with_position() {
        let mut portfolio = Portfolio::new(100_000.0).unwrap();
        portfolio.cash = 90_000.0;
        let mut pos = Position::new(
            "600000",
            1000,
            10.0,
            NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
        );
        pos.current_price = 11.0;
        portfolio.positions.insert("600000".into(), pos);
        // 90_000 + 1000 * 11 = 101_000
        assert_eq!(portfolio.total_equity(), 101_000.0);
        assert!((portfolio.total_return_pct() - 0.01).abs() < 1e-12);
    }

    #[test]
    fn has_position_ignores_empty_entries() {
        let mut portfolio = Portfolio::new(100_000.0).unwrap();
        assert!(!portfolio.has_position("600000"));
        portfolio.positions.insert(
            "600000".into(),
            Position::new(
                "600000",
                0,
                10.0,
                NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
            ),
        );
        assert!(!portfolio.has_position("600000"));
    }
}
