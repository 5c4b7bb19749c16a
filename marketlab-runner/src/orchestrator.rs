//! Backtest orchestrator: environment resolution, the bar loop, and results.

use crate::config::{BacktestConfig, ConfigError};
use crate::metrics::{self, EquityPoint, PerformanceReport};
use chrono::{DateTime, NaiveDate, Utc};
use marketlab_core::calendar::{CalendarRegistry, TradingCalendar};
use marketlab_core::domain::{
    Bar, ListingInfo, Order, PortfolioError, Signal, Trade, TradingEnvironment,
};
use marketlab_core::engine::{OrderRejection, TradingEngine};
use marketlab_core::risk::{RiskEvent, RiskManager, RiskStats};
use marketlab_core::rules::classifier::{ClassifyError, SymbolClassifier};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::info;

pub const ENGINE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Signal-generating callback used by the optimizers: bars + parameters in,
/// dated signals out.
pub type StrategyFn = dyn Fn(&[Bar], &BTreeMap<String, f64>) -> Vec<Signal> + Send + Sync;

#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Classify(#[from] ClassifyError),
    #[error(transparent)]
    Portfolio(#[from] PortfolioError),
    #[error("no bars on trading days within {start}..={end}")]
    NoData { start: NaiveDate, end: NaiveDate },
}

/// Provenance and counters for one finished run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunMetadata {
    pub run_id: String,
    pub engine_version: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub execution_time_seconds: f64,
    pub data_points: usize,
    pub trading_days: usize,
    pub total_orders: u64,
    pub total_trades: u64,
    pub risk_stats: Option<RiskStats>,
    pub risk_events: Vec<RiskEvent>,
}

/// Everything a run produces.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestResult {
    pub config: BacktestConfig,
    pub environment: TradingEnvironment,
    pub equity_curve: Vec<EquityPoint>,
    pub trades: Vec<Trade>,
    pub orders: Vec<Order>,
    pub rejections: Vec<OrderRejection>,
    pub metrics: PerformanceReport,
    pub metadata: RunMetadata,
}

/// Drives one backtest end to end: resolve environment, merge signals onto
/// bars, run the engine, compute metrics, stamp metadata.
pub struct BacktestOrchestrator {
    config: BacktestConfig,
    environment: TradingEnvironment,
    calendar: Arc<TradingCalendar>,
}

impl BacktestOrchestrator {
    /// Validate the config and resolve the trading environment, classifying
    /// the symbol when no explicit environment is given.
    pub fn new(config: BacktestConfig, registry: &mut CalendarRegistry) -> Result<Self, RunError> {
        config.validate()?;
        let environment = match config.environment {
            Some(env) => env,
            None => SymbolClassifier::trading_environment(
                &config.symbol,
                config.name.as_deref(),
                config.channel,
            )?,
        };
        let calendar = registry.get(environment.market);
        Ok(Self {
            config,
            environment,
            calendar,
        })
    }

    pub fn environment(&self) -> TradingEnvironment {
        self.environment
    }

    pub fn config(&self) -> &BacktestConfig {
        &self.config
    }

    /// Run with a precomputed signal series. Dates without a signal hold.
    ///
    /// Benchmark returns are date-indexed; the metrics layer joins them with
    /// the equity curve on shared dates.
    pub fn run(
        &self,
        bars: &[Bar],
        signals: &[Signal],
        listing: Option<&ListingInfo>,
        benchmark_returns: Option<&[(NaiveDate, f64)]>,
    ) -> Result<BacktestResult, RunError> {
        let started_at = Utc::now();
        let clock = Instant::now();

        let signal_by_date: HashMap<NaiveDate, &Signal> =
            signals.iter().map(|s| (s.date, s)).collect();

        let risk = self.config.risk.map(RiskManager::new);
        let mut engine = TradingEngine::new(
            self.environment,
            self.config.initial_capital,
            self.config.fees,
            risk,
            self.calendar.clone(),
        )?;

        info!(
            symbol = %self.config.symbol,
            environment = %self.environment,
            start = %self.config.start_date,
            end = %self.config.end_date,
            "starting backtest"
        );

        let mut equity_curve = Vec::new();
        for bar in bars {
            if bar.date < self.config.start_date || bar.date > self.config.end_date {
                continue;
            }
            if !self.calendar.is_trading_day(bar.date) {
                continue;
            }
            let signal = signal_by_date.get(&bar.date).copied();
            engine.on_bar(bar, signal, listing);

            let portfolio = engine.portfolio();
            equity_curve.push(EquityPoint {
                date: bar.date,
                equity: portfolio.total_equity(),
                cash: portfolio.cash,
                position_value: portfolio.market_value(),
            });
        }

        if equity_curve.is_empty() {
            return Err(RunError::NoData {
                start: self.config.start_date,
                end: self.config.end_date,
            });
        }

        let report: PerformanceReport = metrics::calculate_all(
            &equity_curve,
            engine.trades(),
            benchmark_returns,
            self.config.risk_free_rate,
        );

        let stats = engine.statistics();
        let completed_at = Utc::now();
        let metadata = RunMetadata {
            run_id: self.config.run_id(),
            engine_version: ENGINE_VERSION.to_string(),
            started_at,
            completed_at,
            execution_time_seconds: clock.elapsed().as_secs_f64(),
            data_points: bars.len(),
            trading_days: equity_curve.len(),
            total_orders: stats.total_orders,
            total_trades: stats.total_trades,
            risk_stats: engine.risk_stats(),
            risk_events: engine
                .risk_manager()
                .map(|r| r.events().to_vec())
                .unwrap_or_default(),
        };

        info!(
            run_id = %metadata.run_id,
            trading_days = metadata.trading_days,
            trades = metadata.total_trades,
            total_return = report.total_return,
            "backtest finished"
        );

        Ok(BacktestResult {
            config: self.config.clone(),
            environment: self.environment,
            equity_curve,
            trades: engine.trades().to_vec(),
            orders: engine.orders().to_vec(),
            rejections: engine.rejections().to_vec(),
            metrics: report,
            metadata,
        })
    }

    /// Generate signals from a strategy callback, then run.
    pub fn run_with_strategy(
        &self,
        bars: &[Bar],
        strategy: &StrategyFn,
        listing: Option<&ListingInfo>,
        benchmark_returns: Option<&[(NaiveDate, f64)]>,
    ) -> Result<BacktestResult, RunError> {
        let signals = strategy(bars, &self.config.params);
        self.run(bars, &signals, listing, benchmark_returns)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use marketlab_core::domain::SignalAction;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
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

    fn config() -> BacktestConfig {
        BacktestConfig::new(
            "600000",
            ymd(2024, 1, 2),
            ymd(2024, 1, 31),
            100_000.0,
            "scripted",
        )
    }

    fn week_of_bars() -> Vec<Bar> {
        vec![
            bar(ymd(2024, 1, 2), 10.0, 10.0),
            bar(ymd(2024, 1, 3), 10.2, 10.0),
            bar(ymd(2024, 1, 4), 10.4, 10.2),
            bar(ymd(2024, 1, 5), 10.8, 10.4),
            bar(ymd(2024, 1, 8), 11.0, 10.8),
        ]
    }

    #[test]
    fn classifies_environment_from_symbol() {
        let mut registry = CalendarRegistry::new();
        let orch = BacktestOrchestrator::new(config(), &mut registry).unwrap();
        assert_eq!(orch.environment().to_string(), "CN_MAIN");
    }

    #[test]
    fn explicit_environment_wins() {
        use marketlab_core::domain::{Board, Channel, Market};
        let mut cfg = config();
        cfg.environment = Some(TradingEnvironment::new(
            Market::Cn,
            Board::St,
            Channel::Direct,
        ));
        let mut registry = CalendarRegistry::new();
        let orch = BacktestOrchestrator::new(cfg, &mut registry).unwrap();
        assert_eq!(orch.environment().to_string(), "CN_ST");
    }

    #[test]
    fn all_hold_run_keeps_initial_equity() {
        let mut registry = CalendarRegistry::new();
        let orch = BacktestOrchestrator::new(config(), &mut registry).unwrap();
        let result = orch.run(&week_of_bars(), &[], None, None).unwrap();
        assert_eq!(result.trades.len(), 0);
        assert_eq!(result.metadata.total_orders, 0);
        for point in &result.equity_curve {
            assert_eq!(point.equity, 100_000.0);
        }
        assert_eq!(result.metrics.total_return, 0.0);
    }

    #[test]
    fn buy_then_sell_produces_round_trip() {
        let mut registry = CalendarRegistry::new();
        let orch = BacktestOrchestrator::new(config(), &mut registry).unwrap();
        let signals = vec![
            Signal::new("600000", ymd(2024, 1, 2), SignalAction::Buy),
            Signal::new("600000", ymd(2024, 1, 5), SignalAction::Sell),
        ];
        let result = orch.run(&week_of_bars(), &signals, None, None).unwrap();
        assert_eq!(result.trades.len(), 2);
        assert_eq!(result.metadata.total_trades, 2);
        assert!(result.rejections.is_empty());
        assert!(result.metrics.total_return > 0.0);
        // Equity rows cover every trading day in range.
        assert_eq!(result.equity_curve.len(), 5);
    }

    #[test]
    fn weekend_bars_are_skipped() {
        let mut registry = CalendarRegistry::new();
        let orch = BacktestOrchestrator::new(config(), &mut registry).unwrap();
        let mut bars = week_of_bars();
        bars.push(bar(ymd(2024, 1, 6), 11.0, 11.0)); // Saturday
        let result = orch.run(&bars, &[], None, None).unwrap();
        assert_eq!(result.equity_curve.len(), 5);
    }

    #[test]
    fn empty_window_is_an_error() {
        let mut cfg = config();
        cfg.start_date = ymd(2025, 1, 1);
        cfg.end_date = ymd(2025, 1, 31);
        let mut registry = CalendarRegistry::new();
        let orch = BacktestOrchestrator::new(cfg, &mut registry).unwrap();
        assert!(matches!(
            orch.run(&week_of_bars(), &[], None, None),
            Err(RunError::NoData { .. })
        ));
    }

    #[test]
    fn strategy_callback_receives_params() {
        let mut cfg = config();
        cfg.params.insert("buy_on_bar".into(), 1.0);
        let mut registry = CalendarRegistry::new();
        let orch = BacktestOrchestrator::new(cfg, &mut registry).unwrap();

        let strategy = |bars: &[Bar], params: &BTreeMap<String, f64>| -> Vec<Signal> {
            let idx = params.get("buy_on_bar").copied().unwrap_or(0.0) as usize;
            bars.get(idx)
                .map(|b| vec![Signal::new(b.symbol.clone(), b.date, SignalAction::Buy)])
                .unwrap_or_default()
        };
        let result = orch
            .run_with_strategy(&week_of_bars(), &strategy, None, None)
            .unwrap();
        assert_eq!(result.trades.len(), 1);
        assert_eq!(result.trades[0].executed_at, ymd(2024, 1, 3));
    }
}
