//! Deterministic parameter grid search over backtest configurations. Runs
//! fan out across rayon workers, but expansion order and result collection
//! are fixed, so the same grid always yields the same rows and winner.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use intel_core::cancel::CancelToken;
use intel_core::config::{ByHorizon, CoreConfig};
use intel_core::error::CoreError;

use crate::engine::BacktestEngine;
use crate::models::{BacktestInput, BacktestReport};

/// What the caller optimizes for. Sharpe is the default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Objective {
    Sharpe,
    Sortino,
    TotalReturn,
    Cagr,
    Calmar,
}

impl Default for Objective {
    fn default() -> Self {
        Objective::Sharpe
    }
}

impl Objective {
    fn measure(&self, report: &BacktestReport) -> Option<f64> {
        match self {
            Objective::Sharpe => report.sharpe,
            Objective::Sortino => report.sortino,
            Objective::TotalReturn => Some(report.total_return),
            Objective::Cagr => report.cagr,
            // Calmar = CAGR over drawdown magnitude; undefined on a
            // drawdown-free run.
            Objective::Calmar => match report.cagr {
                Some(cagr) if report.max_drawdown < 0.0 => {
                    Some(cagr / report.max_drawdown.abs())
                }
                _ => None,
            },
        }
    }
}

/// Dimensions to sweep. An empty dimension keeps the base configuration's
/// value.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParamGrid {
    pub stop_atr_multiples: Vec<f64>,
    pub rebalance_periods: Vec<usize>,
    pub sizing_k: Vec<f64>,
    pub w_max: Vec<f64>,
}

fn dimension<T: Copy>(values: &[T]) -> Vec<Option<T>> {
    if values.is_empty() {
        vec![None]
    } else {
        values.iter().map(|v| Some(*v)).collect()
    }
}

impl ParamGrid {
    /// Cartesian expansion in fixed nested order: stop multiple, rebalance
    /// period, sizing slope, weight cap.
    pub fn expand(&self, base: &CoreConfig) -> Vec<CoreConfig> {
        let mut configs = Vec::new();
        for stop in dimension(&self.stop_atr_multiples) {
            for period in dimension(&self.rebalance_periods) {
                for k in dimension(&self.sizing_k) {
                    for w_max in dimension(&self.w_max) {
                        let mut config = base.clone();
                        if let Some(multiple) = stop {
                            config.risk_bands.stop_atr_multiple = ByHorizon {
                                short: multiple,
                                medium: multiple,
                                long: multiple,
                            };
                        }
                        if let Some(period) = period {
                            config.rebalance_period_days = period;
                        }
                        if let Some(k) = k {
                            config.position_sizing.k = k;
                        }
                        if let Some(w_max) = w_max {
                            config.position_sizing.w_max = w_max;
                        }
                        configs.push(config);
                    }
                }
            }
        }
        configs
    }
}

pub struct GridSearchRow {
    pub config: CoreConfig,
    pub report: BacktestReport,
}

pub struct GridSearchResult {
    pub rows: Vec<GridSearchRow>,
    /// Index of the best row under the objective; `None` when the objective
    /// is undefined for every row.
    pub best: Option<usize>,
}

/// Run the simulator across the expanded grid and pick the best row. Rows
/// come back in expansion order regardless of which worker ran them; ties
/// keep the earliest row.
pub fn grid_search(
    base: &CoreConfig,
    input: &BacktestInput,
    grid: &ParamGrid,
    objective: Objective,
    cancel: Option<&CancelToken>,
) -> Result<GridSearchResult, CoreError> {
    base.validate()?;
    let configs = grid.expand(base);
    tracing::info!(runs = configs.len(), "starting grid search");

    let reports: Vec<Result<BacktestReport, CoreError>> = configs
        .par_iter()
        .map(|config| BacktestEngine::new(config.clone()).run(input, cancel))
        .collect();

    let mut rows = Vec::with_capacity(configs.len());
    for (config, report) in configs.into_iter().zip(reports) {
        rows.push(GridSearchRow {
            config,
            report: report?,
        });
    }

    let mut best: Option<(usize, f64)> = None;
    for (i, row) in rows.iter().enumerate() {
        if let Some(measure) = objective.measure(&row.report) {
            if measure.is_finite() && best.map_or(true, |(_, current)| measure > current) {
                best = Some((i, measure));
            }
        }
    }

    Ok(GridSearchResult {
        rows,
        best: best.map(|(i, _)| i),
    })
}
