//! Matching engine: turns validated orders into fills with slippage and fees.

use crate::calendar::TradingCalendar;
use crate::domain::{
    Bar, Channel, Commission, ListingInfo, Market, Order, OrderSide, Trade, TradingEnvironment,
};
use crate::rules::validator::{price_limits, round_to_cents};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

/// Shanghai transfer fee, charged on CN symbols starting with '6'.
const TRANSFER_FEE_RATE: f64 = 0.00002;
/// HK Connect currency conversion fee.
const CONNECT_CURRENCY_FEE_RATE: f64 = 0.0001;
/// HK Connect settlement fee.
const CONNECT_SETTLEMENT_FEE_RATE: f64 = 0.00002;

/// Tunable cost assumptions for a run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeeSchedule {
    /// Broker commission rate, both sides.
    pub commission_rate: f64,
    /// Per-order commission floor.
    pub min_commission: f64,
    /// Stamp duty rate, sell side only.
    pub stamp_tax_rate: f64,
    /// Assumed slippage off the close, in basis points.
    pub slippage_bps: f64,
}

impl Default for FeeSchedule {
    fn default() -> Self {
        Self {
            commission_rate: 0.0003,
            min_commission: 5.0,
            stamp_tax_rate: 0.001,
            slippage_bps: 5.0,
        }
    }
}

/// Fill simulator for one environment.
///
/// Fail-closed: anything that cannot execute under the bar's conditions
/// (suspension, board hit in the adverse direction) returns `None` rather
/// than a degraded fill.
#[derive(Debug, Clone)]
pub struct MatchingEngine {
    env: TradingEnvironment,
    fees: FeeSchedule,
    calendar: Arc<TradingCalendar>,
    next_trade_id: u64,
}

impl MatchingEngine {
    pub fn new(env: TradingEnvironment, fees: FeeSchedule, calendar: Arc<TradingCalendar>) -> Self {
        Self {
            env,
            fees,
            calendar,
            next_trade_id: 1,
        }
    }

    /// Attempt to fill `order` against `bar`.
    pub fn match_order(
        &mut self,
        order: &Order,
        bar: &Bar,
        listing: Option<&ListingInfo>,
    ) -> Option<Trade> {
        if bar.is_suspended {
            debug!(order_id = order.id, symbol = %order.symbol, "no fill: suspended");
            return None;
        }

        let limits = price_limits(bar.prev_close, self.env.board, listing, bar.date, &self.calendar);
        if limits.has_limit {
            // One-sided board at the limit: no liquidity in the adverse direction.
            match order.side {
                OrderSide::Buy if bar.is_limit_up => {
                    debug!(order_id = order.id, symbol = %order.symbol, "no fill: limit-up");
                    return None;
                }
                OrderSide::Sell if bar.is_limit_down => {
                    debug!(order_id = order.id, symbol = %order.symbol, "no fill: limit-down");
                    return None;
                }
                _ => {}
            }
        }

        let slip = self.fees.slippage_bps / 10_000.0;
        let mut price = match order.side {
            OrderSide::Buy => bar.close * (1.0 + slip),
            OrderSide::Sell => bar.close * (1.0 - slip),
        };
        if limits.has_limit {
            if let (OrderSide::Buy, Some(upper)) = (order.side, limits.upper) {
                price = price.min(upper);
            }
            if let (OrderSide::Sell, Some(lower)) = (order.side, limits.lower) {
                price = price.max(lower);
            }
        }
        let price = round_to_cents(price);

        let amount = price * order.quantity as f64;
        let fees = self.calculate_fees(&order.symbol, order.side, amount);
        let slippage = (price - bar.close).abs() * order.quantity as f64;

        let trade = Trade {
            id: self.next_trade_id,
            order_id: order.id,
            symbol: order.symbol.clone(),
            side: order.side,
            quantity: order.quantity,
            price,
            amount,
            fees,
            slippage,
            executed_at: bar.date,
        };
        self.next_trade_id += 1;

        info!(
            trade_id = trade.id,
            order_id = order.id,
            symbol = %order.symbol,
            side = ?order.side,
            quantity = order.quantity,
            price,
            fees = trade.fees.total(),
            "order matched"
        );
        Some(trade)
    }

    /// Worst-case cash outlay for buying `quantity` at the slippage-adjusted
    /// close, fees included. Band clipping can only lower a buy fill, so the
    /// real cost never exceeds this.
    pub fn estimated_buy_cost(&self, symbol: &str, quantity: u64, close: f64) -> f64 {
        let price = round_to_cents(close * (1.0 + self.fees.slippage_bps / 10_000.0));
        let amount = price * quantity as f64;
        amount + self.calculate_fees(symbol, OrderSide::Buy, amount).total()
    }

    fn calculate_fees(&self, symbol: &str, side: OrderSide, amount: f64) -> Commission {
        let mut fees = Commission {
            broker_fee: (amount * self.fees.commission_rate).max(self.fees.min_commission),
            ..Commission::default()
        };

        if side == OrderSide::Sell {
            fees.stamp_tax = amount * self.fees.stamp_tax_rate;
        }

        if self.env.market == Market::Cn && symbol.starts_with('6') {
            fees.transfer_fee = amount * TRANSFER_FEE_RATE;
        }

        if self.env.market == Market::Hk && self.env.channel == Channel::Connect {
            fees.currency_fee = amount * CONNECT_CURRENCY_FEE_RATE;
            fees.settlement_fee = amount * CONNECT_SETTLEMENT_FEE_RATE;
        }

        fees
    }
}
