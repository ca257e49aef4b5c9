use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use intel_core::error::CoreError;
use intel_core::types::{Horizon, Series};

/// Inputs to one simulation run. Candidate order never matters: symbols are
/// keyed and iterated in sorted order.
pub struct BacktestInput {
    pub candidates: BTreeMap<String, Series>,
    pub benchmark: Series,
    pub initial_cash: f64,
    pub horizon: Horizon,
    /// Trading days to simulate, normally supplied by a `Calendar` port.
    /// `None` derives the calendar from the union of bar dates.
    pub trading_days: Option<Vec<NaiveDate>>,
}

/// Why a position was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    StopLoss,
    TakeProfit,
    Signal,
    Rebalance,
    EndOfRun,
}

/// A realized round trip (possibly a partial trim of a larger position).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trade {
    pub symbol: String,
    pub entry_date: NaiveDate,
    pub exit_date: NaiveDate,
    pub entry_price: f64,
    pub exit_price: f64,
    pub quantity: u64,
    /// Net of commissions (entry share allocated pro-rata).
    pub pnl: f64,
    /// Fill-to-fill price return, before commissions.
    pub return_pct: f64,
    pub commission: f64,
    pub exit_reason: ExitReason,
    pub holding_days: i64,
}

/// One point of the daily equity curve, appended exactly once per trading
/// day after mark-to-market.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EquityPoint {
    pub date: NaiveDate,
    pub equity: f64,
    pub cash: f64,
}

/// An open long position. Quantity is integral shares.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub symbol: String,
    pub quantity: u64,
    /// Average fill price per share (slippage included, commissions not).
    pub cost_basis: f64,
    pub opened_at: NaiveDate,
    pub stop: f64,
    pub target: f64,
    /// Entry commissions not yet allocated to a realized trade.
    pub entry_commission: f64,
}

/// Portfolio state; lives only inside a backtest run and is consumed into a
/// [`BacktestReport`] at the end.
#[derive(Debug, Clone)]
pub struct Portfolio {
    pub cash: f64,
    pub positions: BTreeMap<String, Position>,
    pub history: Vec<EquityPoint>,
}

impl Portfolio {
    pub fn new(cash: f64) -> Self {
        Self {
            cash,
            positions: BTreeMap::new(),
            history: Vec::new(),
        }
    }

    /// `cash + sum(quantity x last close)` over the supplied marks.
    pub fn equity(&self, last_close: &BTreeMap<String, f64>) -> f64 {
        let mut total = self.cash;
        for (symbol, position) in &self.positions {
            if let Some(close) = last_close.get(symbol) {
                total += position.quantity as f64 * close;
            } else {
                total += position.quantity as f64 * position.cost_basis;
            }
        }
        total
    }
}

/// Final output of a simulation. Undefined metrics stay `None`; the
/// `require_*` accessors surface them as `InsufficientData` when a caller
/// demands a scalar.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestReport {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub initial_cash: f64,
    pub final_equity: f64,
    pub total_return: f64,
    pub cagr: Option<f64>,
    pub volatility: Option<f64>,
    pub sharpe: Option<f64>,
    pub sortino: Option<f64>,
    pub max_drawdown: f64,
    pub win_rate: Option<f64>,
    pub profit_factor: Option<f64>,
    pub alpha_vs_benchmark: Option<f64>,
    pub beta_vs_benchmark: Option<f64>,
    pub trades: Vec<Trade>,
    pub equity_curve: Vec<EquityPoint>,
    pub advisories: Vec<String>,
    pub incomplete: bool,
}

fn require(value: Option<f64>, name: &str) -> Result<f64, CoreError> {
    value.ok_or_else(|| CoreError::InsufficientData(format!("{} is undefined for this run", name)))
}

impl BacktestReport {
    pub fn require_sharpe(&self) -> Result<f64, CoreError> {
        require(self.sharpe, "sharpe")
    }

    pub fn require_sortino(&self) -> Result<f64, CoreError> {
        require(self.sortino, "sortino")
    }

    pub fn require_volatility(&self) -> Result<f64, CoreError> {
        require(self.volatility, "volatility")
    }

    pub fn require_cagr(&self) -> Result<f64, CoreError> {
        require(self.cagr, "cagr")
    }

    pub fn require_win_rate(&self) -> Result<f64, CoreError> {
        require(self.win_rate, "win_rate")
    }

    pub fn require_profit_factor(&self) -> Result<f64, CoreError> {
        require(self.profit_factor, "profit_factor")
    }
}
