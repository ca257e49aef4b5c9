//! End-of-run report assembly: return, risk, and trade statistics plus the
//! OLS benchmark regression. Undefined metrics stay `None` rather than
//! degenerating to zero.

use chrono::NaiveDate;
use statrs::statistics::Statistics;
use std::collections::BTreeMap;

use intel_core::config::CoreConfig;
use intel_core::series;
use intel_core::types::Series;

use crate::models::{BacktestReport, EquityPoint, Trade};

#[allow(clippy::too_many_arguments)]
pub fn build_report(
    config: &CoreConfig,
    start: NaiveDate,
    end: NaiveDate,
    initial_cash: f64,
    final_equity: f64,
    equity_curve: Vec<EquityPoint>,
    trades: Vec<Trade>,
    benchmark: &Series,
    advisories: Vec<String>,
    incomplete: bool,
) -> BacktestReport {
    let ppy = config.periods_per_year as f64;
    let rf_daily = config.risk_free_rate / ppy;

    let daily_returns: Vec<f64> = equity_curve
        .windows(2)
        .filter_map(|w| {
            if w[0].equity > 0.0 {
                Some(w[1].equity / w[0].equity - 1.0)
            } else {
                None
            }
        })
        .collect();

    let total_return = if initial_cash > 0.0 {
        final_equity / initial_cash - 1.0
    } else {
        0.0
    };

    let periods = equity_curve.len().saturating_sub(1);
    let cagr = if periods >= 1 && initial_cash > 0.0 && final_equity > 0.0 {
        Some((final_equity / initial_cash).powf(ppy / periods as f64) - 1.0)
    } else {
        None
    };

    let (volatility, sharpe) = if daily_returns.len() >= 2 {
        let std = daily_returns.as_slice().std_dev();
        let mean = daily_returns.as_slice().mean();
        let vol = std * ppy.sqrt();
        let sharpe = if std > 0.0 {
            Some((mean - rf_daily) / std * ppy.sqrt())
        } else {
            None
        };
        (Some(vol), sharpe)
    } else {
        (None, None)
    };

    let sortino = downside_deviation(&daily_returns, rf_daily).and_then(|dd| {
        if dd > 0.0 {
            let mean = daily_returns.as_slice().mean();
            Some((mean - rf_daily) / dd * ppy.sqrt())
        } else {
            None
        }
    });

    let equity_values: Vec<f64> = equity_curve.iter().map(|p| p.equity).collect();
    let max_drawdown = series::max_drawdown(&equity_values);

    let (win_rate, profit_factor) = trade_stats(&trades);
    let (alpha_vs_benchmark, beta_vs_benchmark) =
        benchmark_regression(&equity_curve, benchmark, ppy);

    BacktestReport {
        start,
        end,
        initial_cash,
        final_equity,
        total_return,
        cagr,
        volatility,
        sharpe,
        sortino,
        max_drawdown,
        win_rate,
        profit_factor,
        alpha_vs_benchmark,
        beta_vs_benchmark,
        trades,
        equity_curve,
        advisories,
        incomplete,
    }
}

/// Downside deviation against the daily risk-free rate, full-sample
/// denominator. `None` under two samples or with no below-target returns.
fn downside_deviation(returns: &[f64], rf_daily: f64) -> Option<f64> {
    if returns.len() < 2 {
        return None;
    }
    let shortfalls: Vec<f64> = returns
        .iter()
        .filter(|r| **r < rf_daily)
        .map(|r| (r - rf_daily).powi(2))
        .collect();
    if shortfalls.is_empty() {
        return None;
    }
    Some((shortfalls.iter().sum::<f64>() / returns.len() as f64).sqrt())
}

fn trade_stats(trades: &[Trade]) -> (Option<f64>, Option<f64>) {
    if trades.is_empty() {
        return (None, None);
    }
    let wins = trades.iter().filter(|t| t.pnl > 0.0).count();
    let win_rate = Some(wins as f64 / trades.len() as f64);

    let gross_profit: f64 = trades.iter().filter(|t| t.pnl > 0.0).map(|t| t.pnl).sum();
    let gross_loss: f64 = trades
        .iter()
        .filter(|t| t.pnl < 0.0)
        .map(|t| -t.pnl)
        .sum();
    let profit_factor = if gross_loss > 0.0 {
        Some(gross_profit / gross_loss)
    } else {
        None
    };
    (win_rate, profit_factor)
}

/// Daily OLS of strategy returns on benchmark returns over the days where
/// both are observable. Alpha is annualized.
fn benchmark_regression(
    equity_curve: &[EquityPoint],
    benchmark: &Series,
    ppy: f64,
) -> (Option<f64>, Option<f64>) {
    if equity_curve.len() < 3 {
        return (None, None);
    }
    let bench_close: BTreeMap<NaiveDate, f64> = benchmark
        .bars()
        .iter()
        .map(|b| (b.timestamp, b.close))
        .collect();

    let mut strategy_returns = Vec::new();
    let mut bench_returns = Vec::new();
    for w in equity_curve.windows(2) {
        let (Some(b0), Some(b1)) = (bench_close.get(&w[0].date), bench_close.get(&w[1].date))
        else {
            continue;
        };
        if w[0].equity <= 0.0 || *b0 <= 0.0 {
            continue;
        }
        strategy_returns.push(w[1].equity / w[0].equity - 1.0);
        bench_returns.push(b1 / b0 - 1.0);
    }

    let beta = series::beta(&strategy_returns, &bench_returns);
    let alpha = beta.map(|beta| {
        let mean_s = strategy_returns.as_slice().mean();
        let mean_b = bench_returns.as_slice().mean();
        (mean_s - beta * mean_b) * ppy
    });
    (alpha, beta)
}
