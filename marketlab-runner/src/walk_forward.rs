//! Walk-forward validation: rolling train/test windows that expose
//! parameter sets tuned to one period and broken in the next.

use crate::config::BacktestConfig;
use crate::fitness::FitnessMetric;
use crate::grid_search::{GridSearchOptimizer, ParamGrid};
use crate::orchestrator::{BacktestOrchestrator, BacktestResult, StrategyFn};
use chrono::{Duration, NaiveDate};
use marketlab_core::calendar::CalendarRegistry;
use marketlab_core::domain::{Bar, ListingInfo};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::{info, warn};

/// Months are fixed 30-day blocks; window math stays calendar-free.
const DAYS_PER_MONTH: i64 = 30;

/// Average sharpe degradation below this marks the strategy as overfit.
const OVERFIT_DEGRADATION_THRESHOLD: f64 = -0.3;

#[derive(Debug, Error)]
pub enum WalkForwardError {
    #[error("window months must be positive: train {train}, test {test}, step {step}")]
    BadWindow { train: u32, test: u32, step: u32 },
    #[error("no bars supplied")]
    NoBars,
    #[error("data range too short for one train+test window")]
    RangeTooShort,
    #[error("every window failed to evaluate")]
    AllWindowsFailed,
}

/// One rolling train/test split.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct WindowSpec {
    pub index: usize,
    pub train_start: NaiveDate,
    pub train_end: NaiveDate,
    pub test_start: NaiveDate,
    pub test_end: NaiveDate,
}

/// Outcome of one window: parameters chosen on the train slice, scored on
/// both slices.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindowResult {
    pub spec: WindowSpec,
    pub params: BTreeMap<String, f64>,
    pub train_sharpe: f64,
    pub train_return: f64,
    pub test_sharpe: f64,
    pub test_return: f64,
    /// (test - train) / train sharpe; 0.0 when the train sharpe is ~zero.
    pub sharpe_degradation: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalkForwardReport {
    pub windows: Vec<WindowResult>,
    pub failed_windows: usize,
    pub avg_train_sharpe: f64,
    pub avg_test_sharpe: f64,
    pub avg_train_return: f64,
    pub avg_test_return: f64,
    pub min_test_sharpe: f64,
    pub max_test_sharpe: f64,
    pub avg_sharpe_degradation: f64,
    pub is_overfitting: bool,
}

/// Rolling-window validator. With a grid, each train slice is optimized and
/// the winner evaluated out of sample; without one, the base config's
/// parameters are scored on every window.
pub struct WalkForwardValidator {
    base_config: BacktestConfig,
    train_months: u32,
    test_months: u32,
    step_months: u32,
    grid: Option<ParamGrid>,
    metric: FitnessMetric,
}

impl WalkForwardValidator {
    pub fn new(
        base_config: BacktestConfig,
        train_months: u32,
        test_months: u32,
        step_months: u32,
    ) -> Result<Self, WalkForwardError> {
        if train_months == 0 || test_months == 0 || step_months == 0 {
            return Err(WalkForwardError::BadWindow {
                train: train_months,
                test: test_months,
                step: step_months,
            });
        }
        Ok(Self {
            base_config,
            train_months,
            test_months,
            step_months,
            grid: None,
            metric: FitnessMetric::Sharpe,
        })
    }

    pub fn with_grid(mut self, grid: ParamGrid, metric: FitnessMetric) -> Self {
        self.grid = Some(grid);
        self.metric = metric;
        self
    }

    /// Enumerate windows over the bar range. The last window is the one whose
    /// test end still fits inside the data.
    pub fn windows(&self, first: NaiveDate, last: NaiveDate) -> Vec<WindowSpec> {
        let train = Duration::days(self.train_months as i64 * DAYS_PER_MONTH);
        let test = Duration::days(self.test_months as i64 * DAYS_PER_MONTH);
        let step = Duration::days(self.step_months as i64 * DAYS_PER_MONTH);

        let mut specs = Vec::new();
        let mut train_start = first;
        loop {
            let train_end = train_start + train - Duration::days(1);
            let test_start = train_end + Duration::days(1);
            let test_end = test_start + test - Duration::days(1);
            if test_end > last {
                break;
            }
            specs.push(WindowSpec {
                index: specs.len(),
                train_start,
                train_end,
                test_start,
                test_end,
            });
            train_start += step;
        }
        specs
    }

    pub fn run(
        &self,
        bars: &[Bar],
        strategy: &StrategyFn,
        listing: Option<&ListingInfo>,
    ) -> Result<WalkForwardReport, WalkForwardError> {
        let first = bars.iter().map(|b| b.date).min().ok_or(WalkForwardError::NoBars)?;
        let last = bars
            .iter()
            .map(|b| b.date)
            .max()
            .ok_or(WalkForwardError::NoBars)?;

        let specs = self.windows(first, last);
        if specs.is_empty() {
            return Err(WalkForwardError::RangeTooShort);
        }
        info!(windows = specs.len(), "starting walk-forward validation");

        let outcomes: Vec<Option<WindowResult>> = specs
            .par_iter()
            .map(|spec| self.evaluate_window(*spec, bars, strategy, listing))
            .collect();

        let failed_windows = outcomes.iter().filter(|o| o.is_none()).count();
        let windows: Vec<WindowResult> = outcomes.into_iter().flatten().collect();
        if windows.is_empty() {
            return Err(WalkForwardError::AllWindowsFailed);
        }

        let n = windows.len() as f64;
        let avg = |f: fn(&WindowResult) -> f64| windows.iter().map(f).sum::<f64>() / n;
        let avg_train_sharpe = avg(|w| w.train_sharpe);
        let avg_test_sharpe = avg(|w| w.test_sharpe);
        let avg_train_return = avg(|w| w.train_return);
        let avg_test_return = avg(|w| w.test_return);
        let min_test_sharpe = windows
            .iter()
            .map(|w| w.test_sharpe)
            .fold(f64::INFINITY, f64::min);
        let max_test_sharpe = windows
            .iter()
            .map(|w| w.test_sharpe)
            .fold(f64::NEG_INFINITY, f64::max);

        let avg_sharpe_degradation = avg(|w| w.sharpe_degradation);
        let is_overfitting = avg_sharpe_degradation < OVERFIT_DEGRADATION_THRESHOLD;

        info!(
            windows = windows.len(),
            failed_windows,
            avg_test_sharpe,
            avg_sharpe_degradation,
            is_overfitting,
            "walk-forward finished"
        );

        Ok(WalkForwardReport {
            windows,
            failed_windows,
            avg_train_sharpe,
            avg_test_sharpe,
            avg_train_return,
            avg_test_return,
            min_test_sharpe,
            max_test_sharpe,
            avg_sharpe_degradation,
            is_overfitting,
        })
    }

    fn evaluate_window(
        &self,
        spec: WindowSpec,
        bars: &[Bar],
        strategy: &StrategyFn,
        listing: Option<&ListingInfo>,
    ) -> Option<WindowResult> {
        let (params, train_result) = match &self.grid {
            Some(grid) => {
                let mut train_config = self.base_config.clone();
                train_config.start_date = spec.train_start;
                train_config.end_date = spec.train_end;
                let sweep =
                    GridSearchOptimizer::new(train_config, grid.clone(), self.metric);
                let outcome = sweep.run(bars, strategy, listing);
                let params = outcome.best_params?;
                let train_result = outcome.best_result?;
                (params, train_result)
            }
            None => {
                let params = self.base_config.params.clone();
                let train_result =
                    self.run_slice(spec.train_start, spec.train_end, &params, bars, strategy, listing)?;
                (params, train_result)
            }
        };

        let test_result =
            self.run_slice(spec.test_start, spec.test_end, &params, bars, strategy, listing)?;

        let train_sharpe = train_result.metrics.sharpe;
        let test_sharpe = test_result.metrics.sharpe;
        // A ~zero train sharpe leaves nothing to degrade from; the window
        // still counts, at zero, in the degradation average.
        let sharpe_degradation = if train_sharpe.abs() > f64::EPSILON {
            (test_sharpe - train_sharpe) / train_sharpe
        } else {
            0.0
        };

        Some(WindowResult {
            spec,
            params,
            train_sharpe,
            train_return: train_result.metrics.total_return,
            test_sharpe,
            test_return: test_result.metrics.total_return,
            sharpe_degradation,
        })
    }

    fn run_slice(
        &self,
        start: NaiveDate,
        end: NaiveDate,
        params: &BTreeMap<String, f64>,
        bars: &[Bar],
        strategy: &StrategyFn,
        listing: Option<&ListingInfo>,
    ) -> Option<BacktestResult> {
        let mut config = self.base_config.clone();
        config.start_date = start;
        config.end_date = end;
        config.params = params.clone();
        let mut registry = CalendarRegistry::new();
        let orchestrator = match BacktestOrchestrator::new(config, &mut registry) {
            Ok(o) => o,
            Err(error) => {
                warn!(%start, %end, %error, "walk-forward window setup failed");
                return None;
            }
        };
        match orchestrator.run_with_strategy(bars, strategy, listing, None) {
            Ok(result) => Some(result),
            Err(error) => {
                warn!(%start, %end, %error, "walk-forward window failed");
                None
            }
        }
    }
}
