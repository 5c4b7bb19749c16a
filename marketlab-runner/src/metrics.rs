//! Performance metrics — pure functions over the equity curve and trade tape.
//!
//! Conventions: 252 trading days per year, annualized risk-free rate of 3%
//! by default, epsilon guards return 0.0 rather than propagating NaN. The
//! one deliberate exception is `profit_factor`, which returns +inf when
//! there are gains and no losses.

use chrono::NaiveDate;
use marketlab_core::domain::{OrderSide, Trade};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const TRADING_DAYS_PER_YEAR: f64 = 252.0;
pub const DEFAULT_RISK_FREE_RATE: f64 = 0.03;

const EPSILON: f64 = 1e-10;

/// One row of the equity curve.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EquityPoint {
    pub date: NaiveDate,
    pub equity: f64,
    pub cash: f64,
    pub position_value: f64,
}

/// Daily simple returns from the equity column.
pub fn daily_returns(equity: &[f64]) -> Vec<f64> {
    equity
        .windows(2)
        .map(|w| if w[0].abs() < EPSILON { 0.0 } else { w[1] / w[0] - 1.0 })
        .collect()
}

pub fn total_return(equity: &[f64]) -> f64 {
    match (equity.first(), equity.last()) {
        (Some(&initial), Some(&last)) if initial.abs() > EPSILON => (last - initial) / initial,
        _ => 0.0,
    }
}

/// Compound annual growth rate, with years = bars / 252.
pub fn cagr(equity: &[f64]) -> f64 {
    if equity.len() < 2 {
        return 0.0;
    }
    let initial = equity[0];
    let last = equity[equity.len() - 1];
    let years = equity.len() as f64 / TRADING_DAYS_PER_YEAR;
    if initial.abs() < EPSILON || years.abs() < EPSILON {
        return 0.0;
    }
    (last / initial).powf(1.0 / years) - 1.0
}

/// Arithmetic annualization of mean daily return.
pub fn annual_return(returns: &[f64]) -> f64 {
    if returns.is_empty() {
        return 0.0;
    }
    mean(returns) * TRADING_DAYS_PER_YEAR
}

/// Annualized standard deviation of daily returns (sample std).
pub fn volatility(returns: &[f64]) -> f64 {
    if returns.len() < 2 {
        return 0.0;
    }
    sample_std(returns) * TRADING_DAYS_PER_YEAR.sqrt()
}

/// Max drawdown as a negative fraction of the running peak.
pub fn max_drawdown(equity: &[f64]) -> f64 {
    let mut peak = f64::MIN;
    let mut worst = 0.0_f64;
    for &value in equity {
        peak = peak.max(value);
        if peak.abs() > EPSILON {
            worst = worst.min((value - peak) / peak);
        }
    }
    worst
}

/// Longest run of consecutive days spent below the running peak.
pub fn max_drawdown_duration(equity: &[f64]) -> u32 {
    let mut peak = f64::MIN;
    let mut longest = 0u32;
    let mut current = 0u32;
    for &value in equity {
        peak = peak.max(value);
        if value < peak {
            current += 1;
            longest = longest.max(current);
        } else {
            current = 0;
        }
    }
    longest
}

pub fn sharpe_ratio(returns: &[f64], risk_free_rate: f64) -> f64 {
    if returns.len() < 2 {
        return 0.0;
    }
    let daily_rf = risk_free_rate / TRADING_DAYS_PER_YEAR;
    let excess: Vec<f64> = returns.iter().map(|r| r - daily_rf).collect();
    let std = sample_std(&excess);
    if std < EPSILON {
        return 0.0;
    }
    TRADING_DAYS_PER_YEAR.sqrt() * mean(&excess) / std
}

/// Like Sharpe but divides by the deviation of negative-return days only.
pub fn sortino_ratio(returns: &[f64], risk_free_rate: f64) -> f64 {
    if returns.len() < 2 {
        return 0.0;
    }
    let daily_rf = risk_free_rate / TRADING_DAYS_PER_YEAR;
    let excess_mean = mean(returns) - daily_rf;
    let downside: Vec<f64> = returns.iter().copied().filter(|r| *r < 0.0).collect();
    if downside.is_empty() {
        return 0.0;
    }
    let downside_std = sample_std(&downside);
    if downside_std < EPSILON {
        return 0.0;
    }
    TRADING_DAYS_PER_YEAR.sqrt() * excess_mean / downside_std
}

pub fn calmar_ratio(equity: &[f64]) -> f64 {
    if equity.len() < 2 {
        return 0.0;
    }
    let max_dd = max_drawdown(equity);
    if max_dd.abs() < EPSILON {
        return 0.0;
    }
    cagr(equity) / max_dd.abs()
}

/// Pair the i-th buy with the i-th sell. The engine is a single-position
/// Flat -> Long -> Flat machine, so positional pairing is exact.
fn round_trips(trades: &[Trade]) -> Vec<(&Trade, &Trade)> {
    let buys: Vec<&Trade> = trades.iter().filter(|t| t.side == OrderSide::Buy).collect();
    let sells: Vec<&Trade> = trades.iter().filter(|t| t.side == OrderSide::Sell).collect();
    buys.into_iter().zip(sells).collect()
}

fn pair_pnl(buy: &Trade, sell: &Trade) -> (f64, f64) {
    let buy_cost = buy.amount + buy.commission();
    let sell_proceeds = sell.amount - sell.commission() - sell.stamp_tax();
    (sell_proceeds - buy_cost, buy_cost)
}

/// Fraction of round trips whose sell price beat the buy price.
pub fn win_rate(trades: &[Trade]) -> f64 {
    let pairs = round_trips(trades);
    if pairs.is_empty() {
        return 0.0;
    }
    let wins = pairs.iter().filter(|(b, s)| s.price > b.price).count();
    wins as f64 / pairs.len() as f64
}

/// Gross profit over gross loss. +inf when there are gains and no losses.
pub fn profit_factor(trades: &[Trade]) -> f64 {
    let pairs = round_trips(trades);
    if pairs.is_empty() {
        return 0.0;
    }
    let mut profit = 0.0;
    let mut loss = 0.0;
    for (buy, sell) in pairs {
        let (pnl, _) = pair_pnl(buy, sell);
        if pnl > 0.0 {
            profit += pnl;
        } else {
            loss += pnl.abs();
        }
    }
    if loss < EPSILON {
        return if profit > 0.0 { f64::INFINITY } else { 0.0 };
    }
    profit / loss
}

/// Mean fee-adjusted return per round trip.
pub fn avg_trade_return(trades: &[Trade]) -> f64 {
    let pairs = round_trips(trades);
    if pairs.is_empty() {
        return 0.0;
    }
    let returns: Vec<f64> = pairs
        .iter()
        .map(|(buy, sell)| {
            let (pnl, buy_cost) = pair_pnl(buy, sell);
            pnl / buy_cost
        })
        .collect();
    mean(&returns)
}

pub fn avg_profit_amount(trades: &[Trade]) -> f64 {
    let profits: Vec<f64> = round_trips(trades)
        .iter()
        .map(|(b, s)| pair_pnl(b, s).0)
        .filter(|pnl| *pnl > 0.0)
        .collect();
    if profits.is_empty() {
        0.0
    } else {
        mean(&profits)
    }
}

pub fn avg_loss_amount(trades: &[Trade]) -> f64 {
    let losses: Vec<f64> = round_trips(trades)
        .iter()
        .map(|(b, s)| pair_pnl(b, s).0)
        .filter(|pnl| *pnl < 0.0)
        .map(f64::abs)
        .collect();
    if losses.is_empty() {
        0.0
    } else {
        mean(&losses)
    }
}

/// Annualized turnover: half the traded notional over mean equity per year.
pub fn turnover_rate(trades: &[Trade], equity: &[f64]) -> f64 {
    if trades.is_empty() || equity.is_empty() {
        return 0.0;
    }
    let total_volume: f64 = trades.iter().map(|t| t.amount).sum();
    let avg_equity = mean(equity);
    let years = equity.len() as f64 / TRADING_DAYS_PER_YEAR;
    if avg_equity.abs() < EPSILON || years.abs() < EPSILON {
        return 0.0;
    }
    total_volume / 2.0 / avg_equity / years
}

/// Mean calendar days between paired entry and exit.
pub fn avg_holding_days(trades: &[Trade]) -> f64 {
    let pairs = round_trips(trades);
    if pairs.is_empty() {
        return 0.0;
    }
    let days: Vec<f64> = pairs
        .iter()
        .map(|(buy, sell)| (sell.executed_at - buy.executed_at).num_days() as f64)
        .collect();
    mean(&days)
}

// ─── Benchmark comparison ────────────────────────────────────────────────────

pub fn beta(returns: &[f64], benchmark_returns: &[f64]) -> f64 {
    let n = returns.len().min(benchmark_returns.len());
    if n < 2 {
        return 0.0;
    }
    let (r, b) = (&returns[..n], &benchmark_returns[..n]);
    let (mr, mb) = (mean(r), mean(b));
    let covariance: f64 = r
        .iter()
        .zip(b)
        .map(|(x, y)| (x - mr) * (y - mb))
        .sum::<f64>()
        / n as f64;
    let variance: f64 = b.iter().map(|y| (y - mb).powi(2)).sum::<f64>() / n as f64;
    if variance < EPSILON {
        return 0.0;
    }
    covariance / variance
}

/// CAPM alpha on arithmetic annualized returns.
pub fn alpha(returns: &[f64], benchmark_returns: &[f64], risk_free_rate: f64) -> f64 {
    if returns.len() < 2 || benchmark_returns.len() < 2 {
        return 0.0;
    }
    let strategy_annual = annual_return(returns);
    let benchmark_annual = annual_return(benchmark_returns);
    let b = beta(returns, benchmark_returns);
    strategy_annual - (risk_free_rate + b * (benchmark_annual - risk_free_rate))
}

pub fn tracking_error(returns: &[f64], benchmark_returns: &[f64]) -> f64 {
    let n = returns.len().min(benchmark_returns.len());
    if n < 2 {
        return 0.0;
    }
    let excess: Vec<f64> = returns[..n]
        .iter()
        .zip(&benchmark_returns[..n])
        .map(|(r, b)| r - b)
        .collect();
    sample_std(&excess) * TRADING_DAYS_PER_YEAR.sqrt()
}

pub fn information_ratio(returns: &[f64], benchmark_returns: &[f64]) -> f64 {
    let n = returns.len().min(benchmark_returns.len());
    if n < 2 {
        return 0.0;
    }
    let excess: Vec<f64> = returns[..n]
        .iter()
        .zip(&benchmark_returns[..n])
        .map(|(r, b)| r - b)
        .collect();
    let std = sample_std(&excess);
    if std < EPSILON {
        return 0.0;
    }
    mean(&excess) / std * TRADING_DAYS_PER_YEAR.sqrt()
}

// ─── Aggregate report ────────────────────────────────────────────────────────

/// Benchmark-relative block, present only when benchmark returns were given.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkMetrics {
    pub alpha: f64,
    pub beta: f64,
    pub information_ratio: f64,
    pub tracking_error: f64,
}

/// Everything the metrics layer computes for one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceReport {
    pub total_return: f64,
    pub cagr: f64,
    pub annual_return: f64,
    pub volatility: f64,
    pub max_drawdown: f64,
    pub max_drawdown_duration: u32,
    pub sharpe: f64,
    pub sortino: f64,
    pub calmar: f64,
    /// Number of round trips opened (buy fills).
    pub total_trades: u64,
    pub win_rate: f64,
    pub profit_factor: f64,
    pub avg_trade_return: f64,
    pub avg_profit_amount: f64,
    pub avg_loss_amount: f64,
    pub turnover_rate: f64,
    pub avg_holding_days: f64,
    pub benchmark: Option<BenchmarkMetrics>,
}

impl PerformanceReport {
    /// Named lookup, used by grid-search constraints.
    pub fn value(&self, name: &str) -> Option<f64> {
        let value = match name {
            "total_return" => self.total_return,
            "cagr" => self.cagr,
            "annual_return" => self.annual_return,
            "volatility" => self.volatility,
            "max_drawdown" => self.max_drawdown,
            "max_drawdown_duration" => self.max_drawdown_duration as f64,
            "sharpe" | "sharpe_ratio" => self.sharpe,
            "sortino" | "sortino_ratio" => self.sortino,
            "calmar" | "calmar_ratio" => self.calmar,
            "total_trades" => self.total_trades as f64,
            "win_rate" => self.win_rate,
            "profit_factor" => self.profit_factor,
            "avg_trade_return" => self.avg_trade_return,
            "avg_profit_amount" => self.avg_profit_amount,
            "avg_loss_amount" => self.avg_loss_amount,
            "turnover_rate" => self.turnover_rate,
            "avg_holding_days" => self.avg_holding_days,
            "alpha" => self.benchmark?.alpha,
            "beta" => self.benchmark?.beta,
            "information_ratio" => self.benchmark?.information_ratio,
            "tracking_error" => self.benchmark?.tracking_error,
            _ => return None,
        };
        Some(value)
    }
}

/// Compute the full report for one run.
///
/// Benchmark returns are date-indexed and joined with the equity curve on
/// shared dates; rows on either side without a match drop out of the
/// benchmark-relative block.
pub fn calculate_all(
    equity_curve: &[EquityPoint],
    trades: &[Trade],
    benchmark_returns: Option<&[(NaiveDate, f64)]>,
    risk_free_rate: f64,
) -> PerformanceReport {
    let equity: Vec<f64> = equity_curve.iter().map(|p| p.equity).collect();
    let returns = daily_returns(&equity);
    let buys = trades.iter().filter(|t| t.side == OrderSide::Buy).count() as u64;

    let benchmark = benchmark_returns.and_then(|bench| {
        let by_date: BTreeMap<NaiveDate, f64> = bench.iter().copied().collect();
        let mut strat = Vec::new();
        let mut market = Vec::new();
        // returns[i] covers the move into equity_curve[i + 1].
        for (pair, r) in equity_curve.windows(2).zip(&returns) {
            if let Some(b) = by_date.get(&pair[1].date) {
                strat.push(*r);
                market.push(*b);
            }
        }
        (!market.is_empty()).then(|| BenchmarkMetrics {
            alpha: alpha(&strat, &market, risk_free_rate),
            beta: beta(&strat, &market),
            information_ratio: information_ratio(&strat, &market),
            tracking_error: tracking_error(&strat, &market),
        })
    });

    PerformanceReport {
        total_return: total_return(&equity),
        cagr: cagr(&equity),
        annual_return: annual_return(&returns),
        volatility: volatility(&returns),
        max_drawdown: max_drawdown(&equity),
        max_drawdown_duration: max_drawdown_duration(&equity),
        sharpe: sharpe_ratio(&returns, risk_free_rate),
        sortino: sortino_ratio(&returns, risk_free_rate),
        calmar: calmar_ratio(&equity),
        total_trades: buys,
        win_rate: win_rate(trades),
        profit_factor: profit_factor(trades),
        avg_trade_return: avg_trade_return(trades),
        avg_profit_amount: avg_profit_amount(trades),
        avg_loss_amount: avg_loss_amount(trades),
        turnover_rate: turnover_rate(trades, &equity),
        avg_holding_days: avg_holding_days(trades),
        benchmark,
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Sample standard deviation (n - 1 denominator).
fn sample_std(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    let var = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    var.sqrt()
}
