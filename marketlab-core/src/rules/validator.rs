//! Trading-rules validator: price-limit bands and pre-trade order checks.

use crate::calendar::TradingCalendar;
use crate::domain::{
    Bar, Board, ListingInfo, Order, OrderSide, Portfolio, TradingEnvironment, ValidationResult,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

/// Daily price band derived from the previous close.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceLimits {
    pub upper: Option<f64>,
    pub lower: Option<f64>,
    pub has_limit: bool,
}

impl PriceLimits {
    pub fn none() -> Self {
        Self {
            upper: None,
            lower: None,
            has_limit: false,
        }
    }
}

/// Band width per board. HK and US boards have no daily limit.
fn board_limit_pct(board: Board) -> Option<(f64, f64)> {
    match board {
        Board::Main => Some((0.10, 0.10)),
        Board::Gem | Board::Star => Some((0.20, 0.20)),
        Board::Bse => Some((0.30, 0.30)),
        Board::St => Some((0.05, 0.05)),
        Board::HkMain | Board::HkGem | Board::UsNyse | Board::UsNasdaq => None,
    }
}

/// Round to 2 decimals, half away from zero (exchange price convention).
pub fn round_to_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// New listings trade without a band for their first days:
/// ChiNext/STAR 5 trading days, main board the listing day only.
fn in_listing_grace(
    listing: Option<&ListingInfo>,
    current_date: NaiveDate,
    board: Board,
    calendar: &TradingCalendar,
) -> bool {
    let Some(info) = listing else {
        return false;
    };
    let grace_days = match board {
        Board::Gem | Board::Star => 5,
        Board::Main => 1,
        _ => return false,
    };
    let elapsed = calendar.count_trading_days(info.listing_date, current_date);
    elapsed <= grace_days
}

/// Compute the active price band for a bar.
pub fn price_limits(
    prev_close: f64,
    board: Board,
    listing: Option<&ListingInfo>,
    current_date: NaiveDate,
    calendar: &TradingCalendar,
) -> PriceLimits {
    let Some((up_pct, down_pct)) = board_limit_pct(board) else {
        return PriceLimits::none();
    };
    if in_listing_grace(listing, current_date, board, calendar) {
        debug!(board = %board, %current_date, "listing grace period, no price band");
        return PriceLimits::none();
    }
    PriceLimits {
        upper: Some(round_to_cents(prev_close * (1.0 + up_pct))),
        lower: Some(round_to_cents(prev_close * (1.0 - down_pct))),
        has_limit: true,
    }
}

/// Pre-trade validation for one environment.
///
/// Violations are accumulated into a `ValidationResult`; a rejected order is
/// a normal outcome, not an error.
#[derive(Debug, Clone)]
pub struct TradingRulesValidator {
    env: TradingEnvironment,
    calendar: Arc<TradingCalendar>,
}

impl TradingRulesValidator {
    pub fn new(env: TradingEnvironment, calendar: Arc<TradingCalendar>) -> Self {
        Self { env, calendar }
    }

    pub fn environment(&self) -> TradingEnvironment {
        self.env
    }

    /// The active band for `bar` under this validator's board.
    pub fn limits_for(
        &self,
        bar: &Bar,
        listing: Option<&ListingInfo>,
        current_date: NaiveDate,
    ) -> PriceLimits {
        price_limits(
            bar.prev_close,
            self.env.board,
            listing,
            current_date,
            &self.calendar,
        )
    }

    /// Run every rule and accumulate violations.
    ///
    /// Checks, in order: suspension, trading day, T+1 (sells in T+1
    /// markets), limit-up buy / limit-down sell, cash or position
    /// sufficiency.
    pub fn validate_order(
        &self,
        order: &Order,
        bar: &Bar,
        portfolio: &Portfolio,
        current_date: NaiveDate,
        listing: Option<&ListingInfo>,
    ) -> ValidationResult {
        let mut result = ValidationResult::valid();

        if bar.is_suspended {
            result.add_error(format!("{} is suspended, cannot trade", order.symbol));
        }

        if !self.calendar.is_trading_day(current_date) {
            result.add_error(format!("{current_date} is not a trading day"));
        }

        if order.side == OrderSide::Sell && self.env.is_t_plus_one() {
            if let Some(position) = portfolio.get_position(&order.symbol) {
                // Day granularity: bought today means not sellable today.
                if position.buy_date >= current_date {
                    result.add_error(format!(
                        "T+1: {} bought on {}, cannot sell on {}",
                        order.symbol, position.buy_date, current_date
                    ));
                }
            }
        }

        let limits = self.limits_for(bar, listing, current_date);
        if limits.has_limit {
            match order.side {
                OrderSide::Buy if bar.is_limit_up => {
                    result.add_error(format!("{} is limit-up, cannot buy", order.symbol));
                }
                OrderSide::Sell if bar.is_limit_down => {
                    result.add_error(format!("{} is limit-down, cannot sell", order.symbol));
                }
                _ => {}
            }
        }

        match order.side {
            OrderSide::Buy => {
                let required = order.notional();
                if portfolio.cash < required {
                    result.add_error(format!(
                        "insufficient cash: need {:.2}, have {:.2}",
                        required, portfolio.cash
                    ));
                }
            }
            OrderSide::Sell => {
                let available = portfolio
                    .get_position(&order.symbol)
                    .map_or(0, |p| p.quantity);
                if available < order.quantity {
                    result.add_error(format!(
                        "insufficient position: need {} shares, have {}",
                        order.quantity, available
                    ));
                }
            }
        }

        if !result.is_valid {
            debug!(
                order_id = order.id,
                symbol = %order.symbol,
                errors = %result.error_message(),
                "order rejected by trading rules"
            );
        }
        result
    }
}
