//! Trading engine: the per-bar Flat -> Long -> Flat state machine.
//!
//! Every order runs the same gauntlet: risk pre-check (strategy buys only),
//! trading-rules validation, then matching. Rejections are recorded and the
//! run continues; fills mutate the portfolio immediately.

use crate::calendar::TradingCalendar;
use crate::domain::{
    Bar, ListingInfo, Order, OrderSide, OrderStatus, Portfolio, PortfolioError, Position, Signal,
    SignalAction, Trade, TradingEnvironment,
};
use crate::matching::{FeeSchedule, MatchingEngine};
use crate::risk::{RiskManager, RiskStats};
use crate::rules::lot_size::LotSizeRules;
use crate::rules::validator::TradingRulesValidator;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

/// A rejected order and why, for the run's audit trail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderRejection {
    pub order_id: u64,
    pub symbol: String,
    pub reason: String,
}

/// Summary counts for a finished run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct EngineStats {
    pub total_orders: u64,
    pub filled_orders: u64,
    pub rejected_orders: u64,
    pub total_trades: u64,
    pub cash: f64,
    pub equity: f64,
    pub position_count: usize,
}

pub struct TradingEngine {
    env: TradingEnvironment,
    portfolio: Portfolio,
    validator: TradingRulesValidator,
    matcher: MatchingEngine,
    risk: Option<RiskManager>,
    orders: Vec<Order>,
    trades: Vec<Trade>,
    rejections: Vec<OrderRejection>,
    next_order_id: u64,
}

impl TradingEngine {
    pub fn new(
        env: TradingEnvironment,
        initial_capital: f64,
        fees: FeeSchedule,
        risk: Option<RiskManager>,
        calendar: Arc<TradingCalendar>,
    ) -> Result<Self, PortfolioError> {
        Ok(Self {
            env,
            portfolio: Portfolio::new(initial_capital)?,
            validator: TradingRulesValidator::new(env, calendar.clone()),
            matcher: MatchingEngine::new(env, fees, calendar),
            risk,
            orders: Vec::new(),
            trades: Vec::new(),
            rejections: Vec::new(),
            next_order_id: 1,
        })
    }

    pub fn portfolio(&self) -> &Portfolio {
        &self.portfolio
    }

    pub fn orders(&self) -> &[Order] {
        &self.orders
    }

    pub fn trades(&self) -> &[Trade] {
        &self.trades
    }

    pub fn rejections(&self) -> &[OrderRejection] {
        &self.rejections
    }

    pub fn risk_stats(&self) -> Option<RiskStats> {
        self.risk.as_ref().map(RiskManager::stats)
    }

    pub fn risk_manager(&self) -> Option<&RiskManager> {
        self.risk.as_ref()
    }

    pub fn equity(&self) -> f64 {
        self.portfolio.total_equity()
    }

    /// Advance one bar: mark positions, run forced-exit scan, then the signal.
    pub fn on_bar(&mut self, bar: &Bar, signal: Option<&Signal>, listing: Option<&ListingInfo>) {
        self.mark_position(bar);

        // Forced exits bypass the risk pre-check but still pass validation
        // and matching; a T+1-blocked exit is rescanned next bar because the
        // position survives.
        if let Some(risk) = &mut self.risk {
            let exits = risk.check_exit_signals(bar.date, &self.portfolio);
            for exit in exits {
                if exit.symbol != bar.symbol {
                    continue;
                }
                let order = Order::new(
                    self.next_order_id,
                    exit.symbol.clone(),
                    OrderSide::Sell,
                    exit.quantity,
                    bar.close,
                    bar.date,
                );
                self.next_order_id += 1;
                info!(symbol = %exit.symbol, reason = ?exit.reason, "forced exit order");
                self.execute_order(order, bar, listing);
            }
        }

        let Some(signal) = signal else {
            return;
        };
        match signal.action {
            SignalAction::Hold => {}
            SignalAction::Buy => self.process_buy(signal, bar, listing),
            SignalAction::Sell => self.process_sell(signal, bar, listing),
        }
    }

    pub fn statistics(&self) -> EngineStats {
        let filled = self
            .orders
            .iter()
            .filter(|o| o.status == OrderStatus::Filled)
            .count() as u64;
        let rejected = self
            .orders
            .iter()
            .filter(|o| o.status == OrderStatus::Rejected)
            .count() as u64;
        EngineStats {
            total_orders: self.orders.len() as u64,
            filled_orders: filled,
            rejected_orders: rejected,
            total_trades: self.trades.len() as u64,
            cash: self.portfolio.cash,
            equity: self.portfolio.total_equity(),
            position_count: self
                .portfolio
                .positions
                .values()
                .filter(|p| p.quantity > 0)
                .count(),
        }
    }

    fn mark_position(&mut self, bar: &Bar) {
        if let Some(position) = self.portfolio.get_position_mut(&bar.symbol) {
            position.current_price = bar.close;
        }
    }

    fn process_buy(&mut self, signal: &Signal, bar: &Bar, listing: Option<&ListingInfo>) {
        // One position per symbol: a buy while long is a no-op.
        if self.portfolio.has_position(&signal.symbol) {
            debug!(symbol = %signal.symbol, "already long, ignoring buy signal");
            return;
        }

        // Size against the bar close: execution is close plus slippage, not
        // the signal price.
        let Some(quantity) = self.buy_quantity(&signal.symbol, bar.close) else {
            debug!(symbol = %signal.symbol, "cannot afford one lot, ignoring buy signal");
            return;
        };
        let price = signal.price.unwrap_or(bar.close);

        let order = Order::new(
            self.next_order_id,
            signal.symbol.clone(),
            OrderSide::Buy,
            quantity,
            price,
            bar.date,
        );
        self.next_order_id += 1;

        if let Some(risk) = &mut self.risk {
            let check =
                risk.check_order_risk(bar.date, &order.symbol, order.notional(), &self.portfolio);
            if !check.approved {
                let reason = check.reason.unwrap_or_else(|| "risk veto".to_string());
                self.reject_order(order, reason);
                return;
            }
        }

        self.execute_order(order, bar, listing);
    }

    fn process_sell(&mut self, signal: &Signal, bar: &Bar, listing: Option<&ListingInfo>) {
        // A sell while flat is a no-op.
        let Some(position) = self.portfolio.get_position(&signal.symbol) else {
            debug!(symbol = %signal.symbol, "no position, ignoring sell signal");
            return;
        };
        let quantity = position.quantity;

        let order = Order::new(
            self.next_order_id,
            signal.symbol.clone(),
            OrderSide::Sell,
            quantity,
            signal.price.unwrap_or(bar.close),
            bar.date,
        );
        self.next_order_id += 1;
        self.execute_order(order, bar, listing);
    }

    /// Largest whole-lot quantity whose worst-case execution cost, slippage
    /// and fees included, fits in cash. `None` when that is less than a lot.
    fn buy_quantity(&self, symbol: &str, close: f64) -> Option<u64> {
        if close <= 0.0 {
            return None;
        }
        let cash = self.portfolio.cash;
        let lot = LotSizeRules::lot_size(symbol, self.env.market);
        let raw = (cash / close).floor() as u64;
        // lot comes from a table of positive constants
        let mut quantity = LotSizeRules::round_down_to_lot(raw, lot).ok()?;
        while quantity > 0 && self.matcher.estimated_buy_cost(symbol, quantity, close) > cash {
            quantity -= lot;
        }
        (quantity > 0).then_some(quantity)
    }

    fn execute_order(&mut self, mut order: Order, bar: &Bar, listing: Option<&ListingInfo>) {
        let validation =
            self.validator
                .validate_order(&order, bar, &self.portfolio, bar.date, listing);
        if !validation.is_valid {
            self.reject_order(order, validation.error_message());
            return;
        }

        let Some(trade) = self.matcher.match_order(&order, bar, listing) else {
            self.reject_order(order, "no fill under bar conditions".to_string());
            return;
        };

        // Cash can never go negative: a fill we cannot pay for in full is
        // dropped, not partially settled.
        if trade.side == OrderSide::Buy && trade.total_cost() > self.portfolio.cash {
            self.reject_order(order, "execution cost exceeds available cash".to_string());
            return;
        }

        order.status = OrderStatus::Filled;
        self.apply_fill(&trade, bar);
        self.orders.push(order);
        self.trades.push(trade);
    }

    fn apply_fill(&mut self, trade: &Trade, bar: &Bar) {
        match trade.side {
            OrderSide::Buy => {
                self.portfolio.cash -= trade.total_cost();
                let mut position = Position::new(
                    trade.symbol.clone(),
                    trade.quantity,
                    trade.price,
                    trade.executed_at,
                );
                position.current_price = bar.close;
                self.portfolio.positions.insert(trade.symbol.clone(), position);
            }
            OrderSide::Sell => {
                self.portfolio.cash += trade.net_proceeds();
                self.portfolio.positions.remove(&trade.symbol);
            }
        }
        debug!(
            symbol = %trade.symbol,
            side = ?trade.side,
            cash = self.portfolio.cash,
            equity = self.portfolio.total_equity(),
            "portfolio updated"
        );
    }

    fn reject_order(&mut self, mut order: Order, reason: String) {
        info!(order_id = order.id, symbol = %order.symbol, reason, "order rejected");
        order.status = OrderStatus::Rejected;
        self.rejections.push(OrderRejection {
            order_id: order.id,
            symbol: order.symbol.clone(),
            reason,
        });
        self.orders.push(order);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Board, Channel, Market};
    use crate::risk::RiskConfig;
    use chrono::NaiveDate;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn cn_engine(initial_capital: f64, risk: Option<RiskManager>) -> TradingEngine {
        TradingEngine::new(
            TradingEnvironment::new(Market::Cn, Board::Main, Channel::Direct),
            initial_capital,
            FeeSchedule::default(),
            risk,
            Arc::new(TradingCalendar::for_market(Market::Cn)),
        )
        .unwrap()
    }

    fn bar(date: NaiveDate, close: f64, prev_close: f64) -> Bar {
        Bar {
            symbol: "600000".into(),
            date,
            open: prev_close,
            high: close.max(prev_close),
            low: close.min(prev_close),
            close,
            volume: 1_000_000,
            prev_close,
            is_suspended: false,
            is_limit_up: false,
            is_limit_down: false,
        }
    }

    fn buy(date: NaiveDate) -> Signal {
        Signal::new("600000", date, SignalAction::Buy)
    }

    fn sell(date: NaiveDate) -> Signal {
        Signal::new("600000", date, SignalAction::Sell)
    }

    #[test]
    fn buy_uses_nearly_all_cash_in_whole_lots() {
        let mut engine = cn_engine(100_000.0, None);
        let date = ymd(2024, 1, 2);
        engine.on_bar(&bar(date, 10.0, 10.0), Some(&buy(date)), None);

        let position = engine.portfolio().get_position("600000").unwrap();
        assert_eq!(position.quantity % 100, 0);
        // ~100k at ~10/share, minus the commission reserve: 9900 shares.
        assert_eq!(position.quantity, 9900);
        assert!(engine.portfolio().cash >= 0.0);
        assert_eq!(engine.statistics().filled_orders, 1);
    }

    #[test]
    fn buy_never_drives_cash_negative() {
        // Sized at the raw close this capital would fill 8000 shares, but
        // the slipped fill at 10.02 plus fees would overdraw the account.
        let mut engine = cn_engine(80_133.17, None);
        let date = ymd(2024, 1, 2);
        engine.on_bar(&bar(date, 10.01, 10.01), Some(&buy(date)), None);

        let position = engine.portfolio().get_position("600000").unwrap();
        assert_eq!(position.quantity, 7900);
        assert!(engine.portfolio().cash >= 0.0);
        assert_eq!(engine.statistics().rejected_orders, 0);
    }

    #[test]
    fn buy_while_long_is_noop() {
        let mut engine = cn_engine(100_000.0, None);
        let d1 = ymd(2024, 1, 2);
        let d2 = ymd(2024, 1, 3);
        engine.on_bar(&bar(d1, 10.0, 10.0), Some(&buy(d1)), None);
        engine.on_bar(&bar(d2, 10.5, 10.0), Some(&buy(d2)), None);
        assert_eq!(engine.statistics().total_orders, 1);
        assert_eq!(engine.trades().len(), 1);
    }

    #[test]
    fn sell_while_flat_is_noop() {
        let mut engine = cn_engine(100_000.0, None);
        let date = ymd(2024, 1, 2);
        engine.on_bar(&bar(date, 10.0, 10.0), Some(&sell(date)), None);
        assert_eq!(engine.statistics().total_orders, 0);
    }

    #[test]
    fn same_day_sell_blocked_next_day_fills() {
        let mut engine = cn_engine(100_000.0, None);
        let d1 = ymd(2024, 1, 2);
        engine.on_bar(&bar(d1, 10.0, 10.0), Some(&buy(d1)), None);
        // Same-day sell violates T+1 and is recorded as a rejection.
        engine.on_bar(&bar(d1, 10.0, 10.0), Some(&sell(d1)), None);
        assert_eq!(engine.statistics().rejected_orders, 1);
        assert!(engine.rejections()[0].reason.contains("T+1"));

        let d2 = ymd(2024, 1, 3);
        engine.on_bar(&bar(d2, 11.0, 10.0), Some(&sell(d2)), None);
        assert!(!engine.portfolio().has_position("600000"));
        assert_eq!(engine.statistics().total_trades, 2);
    }

    #[test]
    fn round_trip_accounting_identity() {
        let mut engine = cn_engine(100_000.0, None);
        let d1 = ymd(2024, 1, 2);
        let d2 = ymd(2024, 1, 3);
        engine.on_bar(&bar(d1, 10.0, 10.0), Some(&buy(d1)), None);
        engine.on_bar(&bar(d2, 11.0, 10.0), Some(&sell(d2)), None);

        let stats = engine.statistics();
        assert_eq!(stats.position_count, 0);
        // Flat again: equity is all cash, and the round trip at a higher
        // close is profitable net of fees.
        assert_eq!(stats.cash, stats.equity);
        assert!(stats.equity > 100_000.0);
    }

    #[test]
    fn equity_reflects_mark_to_market() {
        let mut engine = cn_engine(100_000.0, None);
        let d1 = ymd(2024, 1, 2);
        engine.on_bar(&bar(d1, 10.0, 10.0), Some(&buy(d1)), None);
        let equity_at_entry = engine.equity();

        let d2 = ymd(2024, 1, 3);
        engine.on_bar(&bar(d2, 11.0, 10.0), None, None);
        assert!(engine.equity() > equity_at_entry);
    }

    #[test]
    fn stop_loss_forces_exit_without_signal() {
        let risk = RiskManager::new(RiskConfig::new(1.0, 1.0, Some(0.05), None, None).unwrap());
        let mut engine = cn_engine(100_000.0, Some(risk));
        let d1 = ymd(2024, 1, 2);
        engine.on_bar(&bar(d1, 10.0, 10.0), Some(&buy(d1)), None);
        assert!(engine.portfolio().has_position("600000"));

        // 6% drop breaches the 5% stop; no strategy signal needed.
        let d2 = ymd(2024, 1, 3);
        engine.on_bar(&bar(d2, 9.4, 10.0), None, None);
        assert!(!engine.portfolio().has_position("600000"));
        assert_eq!(engine.risk_stats().unwrap().forced_exits, 1);
    }

    #[test]
    fn risk_veto_records_rejection() {
        // 10% single-position cap vetoes the all-in sizing.
        let risk = RiskManager::new(RiskConfig::new(0.10, 1.0, None, None, None).unwrap());
        let mut engine = cn_engine(100_000.0, Some(risk));
        let d1 = ymd(2024, 1, 2);
        engine.on_bar(&bar(d1, 10.0, 10.0), Some(&buy(d1)), None);
        assert!(!engine.portfolio().has_position("600000"));
        assert_eq!(engine.statistics().rejected_orders, 1);
        assert_eq!(engine.risk_stats().unwrap().order_rejections, 1);
    }

    #[test]
    fn suspended_bar_rejects_and_run_continues() {
        let mut engine = cn_engine(100_000.0, None);
        let d1 = ymd(2024, 1, 2);
        let mut suspended = bar(d1, 10.0, 10.0);
        suspended.is_suspended = true;
        engine.on_bar(&suspended, Some(&buy(d1)), None);
        assert_eq!(engine.statistics().rejected_orders, 1);

        let d2 = ymd(2024, 1, 3);
        engine.on_bar(&bar(d2, 10.0, 10.0), Some(&buy(d2)), None);
        assert!(engine.portfolio().has_position("600000"));
    }
}
