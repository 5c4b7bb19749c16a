//! Open position state.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// A long position in one symbol.
///
/// `buy_date` drives the T+1 rule: shares entered on day D cannot leave the
/// portfolio until a later trading day. The engine only scales in once per
/// position (Flat -> Long), so `avg_cost` equals the entry fill price.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub symbol: String,
    pub quantity: u64,
    pub avg_cost: f64,
    pub current_price: f64,
    pub buy_date: NaiveDate,
}

impl Position {
    pub fn new(
        symbol: impl Into<String>,
        quantity: u64,
        avg_cost: f64,
        buy_date: NaiveDate,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            quantity,
            avg_cost,
            current_price: avg_cost,
            buy_date,
        }
    }

    /// Marked-to-market value at `current_price`.
    pub fn market_value(&self) -> f64 {
        self.quantity as f64 * self.current_price
    }

    /// Entry value at `avg_cost`.
    pub fn cost_basis(&self) -> f64 {
        self.quantity as f64 * self.avg_cost
    }

    pub fn unrealized_pnl(&self) -> f64 {
        self.market_value() - self.cost_basis()
    }

    /// Unrealized PnL as a fraction of cost basis.
    pub fn unrealized_pnl_pct(&self) -> f64 {
        let basis = self.cost_basis();
        if basis.abs() < f64::EPSILON {
            return 0.0;
        }
        self.unrealized_pnl() / basis
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_position() -> Position {
        Position::new(
            "600000",
            1000,
            10.0,
            NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
        )
    }

    #[test]
    fn new_position_marks_at_cost() {
        let pos = sample_position();
        assert_eq!(pos.market_value(), 10_000.0);
        assert_eq!(pos.unrealized_pnl(), 0.0);
    }

    #[test]
    fn pnl_tracks_current_price() {
        let mut pos = sample_position();
        pos.current_price = 11.0;
        assert_eq!(pos.unrealized_pnl(), 1_000.0);
        assert!((pos.unrealized_pnl_pct() - 0.10).abs() < 1e-12);
    }
}
