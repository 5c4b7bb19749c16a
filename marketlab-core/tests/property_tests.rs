//! Property tests for trading-rule invariants.
//!
//! Uses proptest to verify:
//! 1. Price bands — upper >= prev_close >= lower, widths per board
//! 2. Lot rounding — result is a multiple of the lot and never exceeds input
//! 3. Execution prices — fills always land inside the active band
//! 4. Cash — a matched buy never overdraws the account
//! 5. Portfolio accounting — equity identity holds after buys and sells

use chrono::NaiveDate;
use marketlab_core::calendar::TradingCalendar;
use marketlab_core::domain::{
    Bar, Board, Channel, Market, Order, OrderSide, Portfolio, Position, Signal, SignalAction,
    TradingEnvironment,
};
use marketlab_core::engine::TradingEngine;
use marketlab_core::matching::{FeeSchedule, MatchingEngine};
use marketlab_core::rules::validator::{price_limits, round_to_cents};
use marketlab_core::rules::LotSizeRules;
use proptest::prelude::*;
use std::sync::Arc;

fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

// A Wednesday, so the calendar always counts it as a trading day.
fn trading_date() -> NaiveDate {
    ymd(2024, 1, 10)
}

// ── Strategies (proptest) ────────────────────────────────────────────

fn arb_price() -> impl Strategy<Value = f64> {
    (1.0..500.0_f64).prop_map(round_to_cents)
}

fn arb_quantity() -> impl Strategy<Value = u64> {
    1u64..100_000
}

fn arb_banded_board() -> impl Strategy<Value = Board> {
    prop_oneof![
        Just(Board::Main),
        Just(Board::Gem),
        Just(Board::Star),
        Just(Board::Bse),
        Just(Board::St),
    ]
}

// ── 1. Price bands ───────────────────────────────────────────────────

proptest! {
    /// The band always brackets the previous close, with the advertised
    /// width per board.
    #[test]
    fn band_brackets_prev_close(prev in arb_price(), board in arb_banded_board()) {
        let calendar = TradingCalendar::for_market(Market::Cn);
        let limits = price_limits(prev, board, None, trading_date(), &calendar);
        prop_assert!(limits.has_limit);
        let upper = limits.upper.unwrap();
        let lower = limits.lower.unwrap();
        prop_assert!(lower <= prev + 0.005);
        prop_assert!(upper >= prev - 0.005);

        let pct = match board {
            Board::Main => 0.10,
            Board::Gem | Board::Star => 0.20,
            Board::Bse => 0.30,
            Board::St => 0.05,
            _ => unreachable!(),
        };
        prop_assert!((upper - round_to_cents(prev * (1.0 + pct))).abs() < 1e-9);
        prop_assert!((lower - round_to_cents(prev * (1.0 - pct))).abs() < 1e-9);
    }

    /// HK and US boards never have a band.
    #[test]
    fn overseas_boards_have_no_band(prev in arb_price()) {
        let calendar = TradingCalendar::for_market(Market::Hk);
        for board in [Board::HkMain, Board::HkGem, Board::UsNyse, Board::UsNasdaq] {
            let limits = price_limits(prev, board, None, trading_date(), &calendar);
            prop_assert!(!limits.has_limit);
            prop_assert!(limits.upper.is_none());
            prop_assert!(limits.lower.is_none());
        }
    }

    /// Cent rounding is idempotent.
    #[test]
    fn cent_rounding_is_idempotent(value in 0.0..10_000.0_f64) {
        let once = round_to_cents(value);
        prop_assert_eq!(once, round_to_cents(once));
    }
}

// ── 2. Lot rounding ──────────────────────────────────────────────────

proptest! {
    #[test]
    fn lot_rounding_never_exceeds_input(qty in arb_quantity(), lot in 1u64..1000) {
        let rounded = LotSizeRules::round_down_to_lot(qty, lot).unwrap();
        prop_assert!(rounded <= qty);
        prop_assert_eq!(rounded % lot, 0);
        // Never off by a whole lot.
        prop_assert!(qty - rounded < lot);
    }
}

// ── 3. Execution prices stay inside the band ─────────────────────────

proptest! {
    #[test]
    fn fill_price_stays_inside_band(
        prev in arb_price(),
        move_pct in -0.09..0.09_f64,
        qty in 100u64..10_000,
        is_buy in any::<bool>(),
    ) {
        let env = TradingEnvironment::new(Market::Cn, Board::Main, Channel::Direct);
        let calendar = Arc::new(TradingCalendar::for_market(Market::Cn));
        let mut engine = MatchingEngine::new(env, FeeSchedule::default(), calendar.clone());

        let close = round_to_cents(prev * (1.0 + move_pct));
        let date = trading_date();
        let bar = Bar {
            symbol: "600000".into(),
            date,
            open: prev,
            high: close.max(prev),
            low: close.min(prev),
            close,
            volume: 1_000_000,
            prev_close: prev,
            is_suspended: false,
            is_limit_up: false,
            is_limit_down: false,
        };
        let lot = qty / 100 * 100;
        prop_assume!(lot > 0);
        let side = if is_buy { OrderSide::Buy } else { OrderSide::Sell };
        let order = Order::new(1, "600000", side, lot, close, date);

        if let Some(trade) = engine.match_order(&order, &bar, None) {
            let limits = price_limits(prev, Board::Main, None, date, &calendar);
            prop_assert!(trade.price <= limits.upper.unwrap() + 1e-9);
            prop_assert!(trade.price >= limits.lower.unwrap() - 1e-9);
            prop_assert!((trade.amount - trade.price * lot as f64).abs() < 1e-6);
            prop_assert!(trade.fees.total() > 0.0);
        }
    }
}

// ── 4. Cash never goes negative ──────────────────────────────────────

proptest! {
    /// Whatever the capital and price, a matched buy fits in cash with
    /// slippage and fees included.
    #[test]
    fn matched_buy_never_overdraws_cash(
        capital in 5_000.0..500_000.0_f64,
        close in arb_price(),
    ) {
        let mut engine = TradingEngine::new(
            TradingEnvironment::new(Market::Cn, Board::Main, Channel::Direct),
            capital,
            FeeSchedule::default(),
            None,
            Arc::new(TradingCalendar::for_market(Market::Cn)),
        ).unwrap();
        let date = trading_date();
        let bar = Bar {
            symbol: "600000".into(),
            date,
            open: close,
            high: close,
            low: close,
            close,
            volume: 1_000_000,
            prev_close: close,
            is_suspended: false,
            is_limit_up: false,
            is_limit_down: false,
        };
        let signal = Signal::new("600000", date, SignalAction::Buy);
        engine.on_bar(&bar, Some(&signal), None);
        prop_assert!(engine.portfolio().cash >= 0.0);
        if let Some(position) = engine.portfolio().get_position("600000") {
            prop_assert_eq!(position.quantity % 100, 0);
        }
    }
}

// ── 5. Portfolio accounting identity ─────────────────────────────────

proptest! {
    /// cash + market value == equity, and a buy moves cash down by exactly
    /// the position's entry value.
    #[test]
    fn equity_identity_after_buy(
        capital in 10_000.0..1_000_000.0_f64,
        price in arb_price(),
        lots in 1u64..50,
    ) {
        let mut portfolio = Portfolio::new(capital).unwrap();
        let qty = lots * 100;
        let cost = price * qty as f64;
        prop_assume!(cost < capital);

        portfolio.cash -= cost;
        portfolio.positions.insert(
            "600000".into(),
            Position::new("600000", qty, price, trading_date()),
        );

        let equity = portfolio.total_equity();
        prop_assert!((equity - (portfolio.cash + portfolio.market_value())).abs() < 1e-9);
        // Entry at cost: equity unchanged.
        prop_assert!((equity - capital).abs() < 1e-6);
    }
}
