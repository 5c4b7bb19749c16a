//! Grid search: exhaustive Cartesian sweep over strategy parameters.

use crate::config::BacktestConfig;
use crate::fitness::FitnessMetric;
use crate::metrics::PerformanceReport;
use crate::orchestrator::{BacktestOrchestrator, BacktestResult, StrategyFn};
use marketlab_core::calendar::CalendarRegistry;
use marketlab_core::domain::{Bar, ListingInfo};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum GridSearchError {
    #[error("parameter grid is empty")]
    EmptyGrid,
    #[error("parameter {0} has no values")]
    EmptyAxis(String),
}

/// Ordered parameter axes: name -> candidate values.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParamGrid {
    axes: BTreeMap<String, Vec<f64>>,
}

impl ParamGrid {
    pub fn new(axes: BTreeMap<String, Vec<f64>>) -> Result<Self, GridSearchError> {
        if axes.is_empty() {
            return Err(GridSearchError::EmptyGrid);
        }
        for (name, values) in &axes {
            if values.is_empty() {
                return Err(GridSearchError::EmptyAxis(name.clone()));
            }
        }
        Ok(Self { axes })
    }

    pub fn axes(&self) -> &BTreeMap<String, Vec<f64>> {
        &self.axes
    }

    pub fn param_count(&self) -> usize {
        self.axes.len()
    }

    pub fn total_combinations(&self) -> usize {
        self.axes.values().map(Vec::len).product()
    }

    /// Every point in the Cartesian product, in row-major axis order.
    pub fn combinations(&self) -> Vec<BTreeMap<String, f64>> {
        let mut combos: Vec<BTreeMap<String, f64>> = vec![BTreeMap::new()];
        for (name, values) in &self.axes {
            let mut expanded = Vec::with_capacity(combos.len() * values.len());
            for combo in &combos {
                for &value in values {
                    let mut next = combo.clone();
                    next.insert(name.clone(), value);
                    expanded.push(next);
                }
            }
            combos = expanded;
        }
        combos
    }
}

/// Bounds on report metrics, parsed from `min_<metric>` / `max_<metric>`
/// keys. A violated constraint zeroes the candidate's score to -inf without
/// removing it from the result table.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Constraints(pub BTreeMap<String, f64>);

impl Constraints {
    fn satisfied(&self, report: &PerformanceReport) -> bool {
        for (name, &bound) in &self.0 {
            let (is_min, metric_name) = if let Some(rest) = name.strip_prefix("min_") {
                (true, rest)
            } else if let Some(rest) = name.strip_prefix("max_") {
                (false, rest)
            } else {
                warn!(constraint = %name, "constraint without min_/max_ prefix ignored");
                continue;
            };
            let Some(value) = report.value(metric_name) else {
                warn!(metric = metric_name, "constraint metric not found, ignored");
                continue;
            };
            if is_min && value < bound {
                return false;
            }
            if !is_min && value > bound {
                return false;
            }
        }
        true
    }
}

/// One evaluated grid point.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateRow {
    pub params: BTreeMap<String, f64>,
    /// Fitness score; -inf for failed or constraint-violating candidates.
    pub score: f64,
    pub metrics: Option<PerformanceReport>,
    pub error: Option<String>,
}

/// Score matrix for 2-parameter grids: columns follow the sorted first
/// axis, rows the sorted second axis. `None` cells failed or were
/// constrained out.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Heatmap {
    pub x_param: String,
    pub x_values: Vec<f64>,
    pub y_param: String,
    pub y_values: Vec<f64>,
    pub scores: Vec<Vec<Option<f64>>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GridSearchResult {
    pub best_params: Option<BTreeMap<String, f64>>,
    pub best_score: f64,
    pub best_result: Option<BacktestResult>,
    pub all_results: Vec<CandidateRow>,
    pub heatmap: Option<Heatmap>,
    pub total_combinations: usize,
    pub elapsed_seconds: f64,
}

/// Exhaustive sweep executor.
pub struct GridSearchOptimizer {
    base_config: BacktestConfig,
    grid: ParamGrid,
    metric: FitnessMetric,
    constraints: Constraints,
}

impl GridSearchOptimizer {
    pub fn new(base_config: BacktestConfig, grid: ParamGrid, metric: FitnessMetric) -> Self {
        Self {
            base_config,
            grid,
            metric,
            constraints: Constraints::default(),
        }
    }

    pub fn with_constraints(mut self, constraints: Constraints) -> Self {
        self.constraints = constraints;
        self
    }

    /// Evaluate every combination in parallel. A panicking or erroring
    /// candidate becomes a -inf row; the sweep always completes.
    pub fn run(
        &self,
        bars: &[Bar],
        strategy: &StrategyFn,
        listing: Option<&ListingInfo>,
    ) -> GridSearchResult {
        let clock = Instant::now();
        let combos = self.grid.combinations();
        let total = combos.len();
        info!(
            combinations = total,
            metric = self.metric.as_str(),
            "starting grid search"
        );

        let all_results: Vec<CandidateRow> = combos
            .into_par_iter()
            .map(|params| self.evaluate(params, bars, strategy, listing))
            .collect();

        let mut best_score = f64::NEG_INFINITY;
        let mut best: Option<&CandidateRow> = None;
        for row in &all_results {
            if row.score.is_finite() || row.score == f64::INFINITY {
                if best.is_none() || self.metric.is_better(row.score, best_score) {
                    best_score = row.score;
                    best = Some(row);
                }
            }
        }

        // Re-run the winner to carry its full result out; candidates drop
        // theirs to keep the sweep's memory flat.
        let best_params = best.map(|row| row.params.clone());
        let best_result = best_params.as_ref().and_then(|params| {
            self.run_candidate(params.clone(), bars, strategy, listing).ok()
        });

        let heatmap = self.build_heatmap(&all_results);
        let elapsed = clock.elapsed().as_secs_f64();
        info!(
            best_score,
            elapsed_seconds = elapsed,
            "grid search finished"
        );

        GridSearchResult {
            best_params,
            best_score: if best.is_some() {
                best_score
            } else {
                f64::NEG_INFINITY
            },
            best_result,
            all_results,
            heatmap,
            total_combinations: total,
            elapsed_seconds: elapsed,
        }
    }

    fn run_candidate(
        &self,
        params: BTreeMap<String, f64>,
        bars: &[Bar],
        strategy: &StrategyFn,
        listing: Option<&ListingInfo>,
    ) -> Result<BacktestResult, String> {
        let mut config = self.base_config.clone();
        config.params = params;
        let mut registry = CalendarRegistry::new();
        let orchestrator =
            BacktestOrchestrator::new(config, &mut registry).map_err(|e| e.to_string())?;
        orchestrator
            .run_with_strategy(bars, strategy, listing, None)
            .map_err(|e| e.to_string())
    }

    fn evaluate(
        &self,
        params: BTreeMap<String, f64>,
        bars: &[Bar],
        strategy: &StrategyFn,
        listing: Option<&ListingInfo>,
    ) -> CandidateRow {
        match self.run_candidate(params.clone(), bars, strategy, listing) {
            Ok(result) => {
                let mut score = self.metric.extract(&result.metrics);
                if !self.constraints.satisfied(&result.metrics) {
                    debug!(?params, "candidate failed constraints");
                    score = f64::NEG_INFINITY;
                }
                CandidateRow {
                    params,
                    score,
                    metrics: Some(result.metrics),
                    error: None,
                }
            }
            Err(error) => {
                warn!(?params, error, "grid candidate failed");
                CandidateRow {
                    params,
                    score: f64::NEG_INFINITY,
                    metrics: None,
                    error: Some(error),
                }
            }
        }
    }

    fn build_heatmap(&self, all_results: &[CandidateRow]) -> Option<Heatmap> {
        if self.grid.param_count() != 2 {
            return None;
        }
        let mut names = self.grid.axes().keys();
        let x_param = names.next()?.clone();
        let y_param = names.next()?.clone();

        let sorted = |axis: &str| -> Vec<f64> {
            let mut values = self.grid.axes()[axis].clone();
            values.sort_by(|a, b| a.total_cmp(b));
            values
        };
        let x_values = sorted(&x_param);
        let y_values = sorted(&y_param);

        let scores = y_values
            .iter()
            .map(|&y| {
                x_values
                    .iter()
                    .map(|&x| {
                        all_results
                            .iter()
                            .find(|row| {
                                row.params.get(&x_param) == Some(&x)
                                    && row.params.get(&y_param) == Some(&y)
                            })
                            .and_then(|row| {
                                (row.score != f64::NEG_INFINITY).then_some(row.score)
                            })
                    })
                    .collect()
            })
            .collect();

        Some(Heatmap {
            x_param,
            x_values,
            y_param,
            y_values,
            scores,
        })
    }
}
