//! Orders and their lifecycle states.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Buy or sell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderSide {
    Buy,
    Sell,
}

/// Order lifecycle states.
///
/// The engine only ever moves Pending -> Filled or Pending -> Rejected;
/// Canceled exists for forced exits that become stale before execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Filled,
    Rejected,
    Canceled,
}

/// A single order submitted to the matching engine.
///
/// `limit_price` is the reference price used for cash sufficiency checks,
/// not an exchange limit order price; execution happens at the bar close
/// plus slippage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: u64,
    pub symbol: String,
    pub side: OrderSide,
    pub quantity: u64,
    pub limit_price: f64,
    pub created_at: NaiveDate,
    pub status: OrderStatus,
}

impl Order {
    pub fn new(
        id: u64,
        symbol: impl Into<String>,
        side: OrderSide,
        quantity: u64,
        limit_price: f64,
        created_at: NaiveDate,
    ) -> Self {
        Self {
            id,
            symbol: symbol.into(),
            side,
            quantity,
            limit_price,
            created_at,
            status: OrderStatus::Pending,
        }
    }

    /// Notional value at the reference price.
    pub fn notional(&self) -> f64 {
        self.quantity as f64 * self.limit_price
    }
}
