//! Executed trades and their fee breakdown.

use super::order::OrderSide;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Itemized fees charged on one fill.
///
/// Every component is always present and zero when it does not apply to the
/// environment (e.g. stamp duty on a buy, transfer fee outside Shanghai).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Commission {
    /// Broker commission after the per-order minimum.
    pub broker_fee: f64,
    /// Sell-side stamp duty.
    pub stamp_tax: f64,
    /// Shanghai transfer fee (CN symbols starting with '6').
    pub transfer_fee: f64,
    /// HK Connect settlement fee.
    pub settlement_fee: f64,
    /// HK Connect currency conversion fee.
    pub currency_fee: f64,
}

impl Commission {
    /// Sum of every fee component.
    pub fn total(&self) -> f64 {
        self.broker_fee + self.stamp_tax + self.transfer_fee + self.settlement_fee
            + self.currency_fee
    }

    /// All fees except stamp duty.
    pub fn ex_stamp(&self) -> f64 {
        self.total() - self.stamp_tax
    }
}

/// One fill produced by the matching engine.
///
/// `slippage` is the cost of moving off the close (`|price - close| * qty`);
/// it is recorded for attribution but never charged to cash.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trade {
    pub id: u64,
    pub order_id: u64,
    pub symbol: String,
    pub side: OrderSide,
    pub quantity: u64,
    pub price: f64,
    /// `price * quantity`.
    pub amount: f64,
    pub fees: Commission,
    pub slippage: f64,
    pub executed_at: NaiveDate,
}

impl Trade {
    /// Non-stamp fees (broker + transfer + settlement + currency).
    pub fn commission(&self) -> f64 {
        self.fees.ex_stamp()
    }

    /// Stamp duty charged on this fill.
    pub fn stamp_tax(&self) -> f64 {
        self.fees.stamp_tax
    }

    /// Cash a buy removes: amount plus all fees.
    pub fn total_cost(&self) -> f64 {
        self.amount + self.fees.total()
    }

    /// Cash a sell returns: amount minus all fees.
    pub fn net_proceeds(&self) -> f64 {
        self.amount - self.fees.total()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_trade(side: OrderSide) -> Trade {
        Trade {
            id: 1,
            order_id: 1,
            symbol: "600000".into(),
            side,
            quantity: 1000,
            price: 10.0,
            amount: 10_000.0,
            fees: Commission {
                broker_fee: 5.0,
                stamp_tax: if side == OrderSide::Sell { 10.0 } else { 0.0 },
                transfer_fee: 0.2,
                settlement_fee: 0.0,
                currency_fee: 0.0,
            },
            slippage: 5.0,
            executed_at: NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
        }
    }

    #[test]
    fn buy_total_cost_excludes_stamp() {
        let trade = sample_trade(OrderSide::Buy);
        assert!((trade.total_cost() - 10_005.2).abs() < 1e-9);
        assert!((trade.commission() - 5.2).abs() < 1e-9);
        assert_eq!(trade.stamp_tax(), 0.0);
    }

    #[test]
    fn sell_net_proceeds_includes_stamp() {
        let trade = sample_trade(OrderSide::Sell);
        assert!((trade.net_proceeds() - (10_000.0 - 5.0 - 10.0 - 0.2)).abs() < 1e-9);
        assert_eq!(trade.stamp_tax(), 10.0);
    }

    #[test]
    fn commission_total_sums_all_components() {
        let fees = Commission {
            broker_fee: 5.0,
            stamp_tax: 10.0,
            transfer_fee: 0.2,
            settlement_fee: 0.3,
            currency_fee: 1.0,
        };
        assert!((fees.total() - 16.5).abs() < 1e-9);
        assert!((fees.ex_stamp() - 6.5).abs() < 1e-9);
    }
}
