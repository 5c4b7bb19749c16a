//! Marketlab CLI — run backtests and grid searches from CSV/TOML inputs.
//!
//! Commands:
//! - `run` — execute one backtest from a TOML config and a bar CSV, with
//!   signals from a CSV file or the built-in moving-average crossover
//! - `grid` — sweep strategy parameters from a grid TOML over the built-in
//!   crossover and report the best candidate

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use marketlab_core::domain::{Bar, Signal, SignalAction};
use marketlab_runner::{
    BacktestConfig, BacktestOrchestrator, BacktestResult, Constraints, FitnessMetric,
    GridSearchOptimizer, GridSearchResult, ParamGrid,
};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "marketlab", about = "Marketlab CLI — equity backtesting engine")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute one backtest from a TOML config file.
    Run {
        /// Path to a TOML backtest config.
        #[arg(long)]
        config: PathBuf,

        /// Bar data CSV (date,open,high,low,close,volume[,prev_close,...]).
        #[arg(long)]
        bars: PathBuf,

        /// Signal CSV (date,action[,price,reason]). Without it the built-in
        /// moving-average crossover generates signals from config params.
        #[arg(long)]
        signals: Option<PathBuf>,

        /// Benchmark daily-return CSV (date,value).
        #[arg(long)]
        benchmark: Option<PathBuf>,

        /// Output directory for result JSON and trade/equity CSVs.
        #[arg(long, default_value = "results")]
        output_dir: PathBuf,
    },
    /// Sweep strategy parameters over the built-in crossover.
    Grid {
        /// Path to a TOML backtest config.
        #[arg(long)]
        config: PathBuf,

        /// Bar data CSV.
        #[arg(long)]
        bars: PathBuf,

        /// Grid TOML: `metric`, `[params]` axes, optional `[constraints]`.
        #[arg(long)]
        grid: PathBuf,

        /// Output directory for the sweep result JSON.
        #[arg(long, default_value = "results")]
        output_dir: PathBuf,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Run {
            config,
            bars,
            signals,
            benchmark,
            output_dir,
        } => run_cmd(&config, &bars, signals.as_deref(), benchmark.as_deref(), &output_dir),
        Commands::Grid {
            config,
            bars,
            grid,
            output_dir,
        } => grid_cmd(&config, &bars, &grid, &output_dir),
    }
}

// ─── Commands ──────────────────────────────────────────────────────────────

fn run_cmd(
    config_path: &Path,
    bars_path: &Path,
    signals_path: Option<&Path>,
    benchmark_path: Option<&Path>,
    output_dir: &Path,
) -> Result<()> {
    let config = load_config(config_path)?;
    let bars = load_bars(bars_path, &config.symbol)?;
    let benchmark = benchmark_path.map(load_benchmark).transpose()?;
    info!(symbol = %config.symbol, bars = bars.len(), "inputs loaded");

    let mut registry = marketlab_core::calendar::CalendarRegistry::new();
    let orchestrator = BacktestOrchestrator::new(config, &mut registry)?;

    let result = match signals_path {
        Some(path) => {
            let signals = load_signals(path, &orchestrator.config().symbol)?;
            orchestrator.run(&bars, &signals, None, benchmark.as_deref())?
        }
        None => orchestrator.run_with_strategy(
            &bars,
            &ma_crossover_signals,
            None,
            benchmark.as_deref(),
        )?,
    };

    print_summary(&result);
    let run_dir = save_artifacts(&result, output_dir)?;
    println!("Artifacts saved to: {}", run_dir.display());
    Ok(())
}

fn grid_cmd(
    config_path: &Path,
    bars_path: &Path,
    grid_path: &Path,
    output_dir: &Path,
) -> Result<()> {
    let config = load_config(config_path)?;
    let bars = load_bars(bars_path, &config.symbol)?;
    let spec = load_grid_spec(grid_path)?;

    let grid = ParamGrid::new(spec.params)?;
    info!(
        symbol = %config.symbol,
        combinations = grid.total_combinations(),
        "starting parameter sweep"
    );
    let optimizer = GridSearchOptimizer::new(config, grid, spec.metric)
        .with_constraints(Constraints(spec.constraints));
    let result = optimizer.run(&bars, &ma_crossover_signals, None);

    print_grid_summary(&result);

    fs::create_dir_all(output_dir)
        .with_context(|| format!("creating {}", output_dir.display()))?;
    let path = output_dir.join("grid_search.json");
    fs::write(&path, serde_json::to_string_pretty(&result)?)?;
    println!("Sweep result saved to: {}", path.display());
    Ok(())
}

// ─── Input loading ─────────────────────────────────────────────────────────

fn load_config(path: &Path) -> Result<BacktestConfig> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("reading config {}", path.display()))?;
    let config: BacktestConfig =
        toml::from_str(&text).with_context(|| format!("parsing config {}", path.display()))?;
    config.validate()?;
    Ok(config)
}

#[derive(Debug, Deserialize)]
struct CsvBar {
    date: NaiveDate,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: u64,
    #[serde(default)]
    prev_close: Option<f64>,
    #[serde(default)]
    is_suspended: bool,
    #[serde(default)]
    is_limit_up: bool,
    #[serde(default)]
    is_limit_down: bool,
}

fn load_bars(path: &Path, symbol: &str) -> Result<Vec<Bar>> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("opening bar CSV {}", path.display()))?;
    let mut bars = Vec::new();
    let mut last_close: Option<f64> = None;
    for record in reader.deserialize() {
        let row: CsvBar = record.context("parsing bar row")?;
        // Missing prev_close falls back to the previous row's close.
        let prev_close = row.prev_close.or(last_close).unwrap_or(row.open);
        bars.push(Bar {
            symbol: symbol.to_string(),
            date: row.date,
            open: row.open,
            high: row.high,
            low: row.low,
            close: row.close,
            volume: row.volume,
            prev_close,
            is_suspended: row.is_suspended,
            is_limit_up: row.is_limit_up,
            is_limit_down: row.is_limit_down,
        });
        last_close = Some(row.close);
    }
    if bars.is_empty() {
        bail!("bar CSV {} has no rows", path.display());
    }
    bars.sort_by_key(|b| b.date);
    Ok(bars)
}

#[derive(Debug, Deserialize)]
struct CsvSignal {
    date: NaiveDate,
    action: SignalAction,
    #[serde(default)]
    price: Option<f64>,
    #[serde(default)]
    reason: Option<String>,
}

fn load_signals(path: &Path, symbol: &str) -> Result<Vec<Signal>> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("opening signal CSV {}", path.display()))?;
    let mut signals = Vec::new();
    for record in reader.deserialize() {
        let row: CsvSignal = record.context("parsing signal row")?;
        signals.push(Signal {
            symbol: symbol.to_string(),
            date: row.date,
            action: row.action,
            price: row.price,
            reason: row.reason,
        });
    }
    Ok(signals)
}

#[derive(Debug, Deserialize)]
struct CsvReturn {
    date: NaiveDate,
    value: f64,
}

fn load_benchmark(path: &Path) -> Result<Vec<(NaiveDate, f64)>> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("opening benchmark CSV {}", path.display()))?;
    let mut returns = Vec::new();
    for record in reader.deserialize() {
        let row: CsvReturn = record.context("parsing benchmark row")?;
        returns.push((row.date, row.value));
    }
    Ok(returns)
}

#[derive(Debug, Deserialize)]
struct GridSpec {
    #[serde(default)]
    metric: FitnessMetric,
    params: BTreeMap<String, Vec<f64>>,
    #[serde(default)]
    constraints: BTreeMap<String, f64>,
}

fn load_grid_spec(path: &Path) -> Result<GridSpec> {
    let text =
        fs::read_to_string(path).with_context(|| format!("reading grid {}", path.display()))?;
    toml::from_str(&text).with_context(|| format!("parsing grid {}", path.display()))
}

// ─── Built-in strategy ─────────────────────────────────────────────────────

/// Moving-average crossover: buy when the short average crosses above the
/// long, sell when it crosses back below. Params `short_period` and
/// `long_period` (defaults 5 and 20).
fn ma_crossover_signals(bars: &[Bar], params: &BTreeMap<String, f64>) -> Vec<Signal> {
    let short = params.get("short_period").copied().unwrap_or(5.0).max(1.0) as usize;
    let long = params.get("long_period").copied().unwrap_or(20.0).max(1.0) as usize;
    if bars.len() <= long || short >= long {
        return Vec::new();
    }

    let sma = |end: usize, window: usize| -> f64 {
        let start = end + 1 - window;
        bars[start..=end].iter().map(|b| b.close).sum::<f64>() / window as f64
    };

    let mut signals = Vec::new();
    let mut above = false;
    for i in long - 1..bars.len() {
        let now_above = sma(i, short) > sma(i, long);
        if now_above && !above {
            signals.push(
                Signal::new(bars[i].symbol.clone(), bars[i].date, SignalAction::Buy)
                    .with_reason("short MA crossed above long MA"),
            );
        } else if !now_above && above {
            signals.push(
                Signal::new(bars[i].symbol.clone(), bars[i].date, SignalAction::Sell)
                    .with_reason("short MA crossed below long MA"),
            );
        }
        above = now_above;
    }
    signals
}

// ─── Output ────────────────────────────────────────────────────────────────

fn print_summary(result: &BacktestResult) {
    let m = &result.metrics;
    println!("Run {}", result.metadata.run_id);
    println!("  Environment:     {}", result.environment);
    println!(
        "  Period:          {} .. {} ({} trading days)",
        result.config.start_date, result.config.end_date, result.metadata.trading_days
    );
    println!("  Total return:    {:.2}%", m.total_return * 100.0);
    println!("  CAGR:            {:.2}%", m.cagr * 100.0);
    println!("  Max drawdown:    {:.2}%", m.max_drawdown * 100.0);
    println!("  Sharpe:          {:.3}", m.sharpe);
    println!("  Sortino:         {:.3}", m.sortino);
    println!(
        "  Trades:          {} ({} rejections)",
        m.total_trades,
        result.rejections.len()
    );
    println!("  Win rate:        {:.1}%", m.win_rate * 100.0);
    if let Some(bench) = &m.benchmark {
        println!("  Alpha / beta:    {:.4} / {:.4}", bench.alpha, bench.beta);
    }
}

fn print_grid_summary(result: &GridSearchResult) {
    println!(
        "Grid search: {} combinations in {:.2}s",
        result.total_combinations, result.elapsed_seconds
    );
    match &result.best_params {
        Some(params) => {
            println!("  Best score: {:.4}", result.best_score);
            for (name, value) in params {
                println!("    {name} = {value}");
            }
        }
        None => println!("  No candidate survived"),
    }
}

/// Write result JSON plus trade and equity CSVs under a run-id directory.
fn save_artifacts(result: &BacktestResult, output_dir: &Path) -> Result<PathBuf> {
    let run_dir = output_dir.join(&result.metadata.run_id);
    fs::create_dir_all(&run_dir).with_context(|| format!("creating {}", run_dir.display()))?;

    fs::write(
        run_dir.join("result.json"),
        serde_json::to_string_pretty(result)?,
    )?;

    let mut trades = csv::Writer::from_path(run_dir.join("trades.csv"))?;
    trades.write_record([
        "id", "symbol", "side", "quantity", "price", "amount", "commission", "stamp_tax",
        "slippage", "executed_at",
    ])?;
    for trade in &result.trades {
        trades.write_record([
            trade.id.to_string(),
            trade.symbol.clone(),
            format!("{:?}", trade.side).to_lowercase(),
            trade.quantity.to_string(),
            format!("{:.4}", trade.price),
            format!("{:.2}", trade.amount),
            format!("{:.2}", trade.commission()),
            format!("{:.2}", trade.stamp_tax()),
            format!("{:.2}", trade.slippage),
            trade.executed_at.to_string(),
        ])?;
    }
    trades.flush()?;

    let mut equity = csv::Writer::from_path(run_dir.join("equity.csv"))?;
    equity.write_record(["date", "equity", "cash", "position_value"])?;
    for point in &result.equity_curve {
        equity.write_record([
            point.date.to_string(),
            format!("{:.2}", point.equity),
            format!("{:.2}", point.cash),
            format!("{:.2}", point.position_value),
        ])?;
    }
    equity.flush()?;

    Ok(run_dir)
}
