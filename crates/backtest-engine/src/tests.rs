use std::collections::BTreeMap;

use chrono::NaiveDate;

use intel_core::cancel::CancelToken;
use intel_core::config::CoreConfig;
use intel_core::error::CoreError;
use intel_core::types::{Action, Bar, Horizon, Recommendation, Series};

use crate::engine::{exit_for_bar, BacktestEngine};
use crate::models::*;
use crate::optimizer::{grid_search, Objective, ParamGrid};
use crate::strategy::{Evaluation, Strategy};

fn day(i: usize) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, 1).unwrap() + chrono::Duration::days(i as i64)
}

fn bar(i: usize, open: f64, high: f64, low: f64, close: f64) -> Bar {
    Bar {
        timestamp: day(i),
        open,
        high,
        low,
        close,
        volume: 1_000_000.0,
    }
}

/// Flat series: every field pinned to `level`.
fn flat_series(symbol: &str, level: f64, days: usize) -> Series {
    let bars: Vec<Bar> = (0..days).map(|i| bar(i, level, level, level, level)).collect();
    Series::new(symbol, "USD", bars).unwrap()
}

/// Series with the given closes and a narrow range around each.
fn series_from_closes(symbol: &str, closes: &[f64]) -> Series {
    let bars: Vec<Bar> = closes
        .iter()
        .enumerate()
        .map(|(i, &c)| bar(i, c, c + 0.5, c - 0.5, c))
        .collect();
    Series::new(symbol, "USD", bars).unwrap()
}

fn input_for(candidates: Vec<Series>, benchmark: Series, cash: f64) -> BacktestInput {
    let candidates = candidates
        .into_iter()
        .map(|s| (s.symbol().to_string(), s))
        .collect();
    BacktestInput {
        candidates,
        benchmark,
        initial_cash: cash,
        horizon: Horizon::Medium,
        trading_days: None,
    }
}

/// Daily-rebalance, zero-cost configuration for scripted tests.
fn scripted_config() -> CoreConfig {
    CoreConfig {
        rebalance_period_days: 1,
        ..CoreConfig::default()
    }
}

/// A strategy that replays `(action, score, target_weight)` per symbol/day,
/// with a fixed default play and stop/target levels.
struct ScriptedStrategy {
    plays: BTreeMap<(String, NaiveDate), (Action, f64, f64)>,
    default_play: (Action, f64, f64),
    stop: f64,
    target: f64,
}

impl ScriptedStrategy {
    fn new(default_play: (Action, f64, f64), stop: f64, target: f64) -> Self {
        Self {
            plays: BTreeMap::new(),
            default_play,
            stop,
            target,
        }
    }

    fn play(mut self, symbol: &str, i: usize, action: Action, score: f64, weight: f64) -> Self {
        self.plays
            .insert((symbol.to_string(), day(i)), (action, score, weight));
        self
    }
}

impl Strategy for ScriptedStrategy {
    fn evaluate(&mut self, symbol: &str, history: &Series) -> Result<Evaluation, CoreError> {
        let last = history.last().expect("scripted strategy needs bars");
        let (action, score, weight) = *self
            .plays
            .get(&(symbol.to_string(), last.timestamp))
            .unwrap_or(&self.default_play);
        Ok(Evaluation {
            recommendation: Recommendation {
                symbol: symbol.to_string(),
                as_of: last.timestamp,
                action,
                conviction: 0.8,
                target_weight: weight,
                entry_low: last.close,
                entry_high: last.close,
                take_profit: self.target,
                stop_loss: self.stop,
                horizon: Horizon::Medium,
                rationale: "scripted".to_string(),
            },
            score,
        })
    }
}

// =============================================================================
// S4: a flat universe is a strict no-op
// =============================================================================

#[test]
fn flat_universe_is_a_no_op() {
    let input = input_for(
        vec![flat_series("FLAT", 100.0, 252)],
        flat_series("BENCH", 100.0, 252),
        100_000.0,
    );
    let report = BacktestEngine::new(CoreConfig::default())
        .run(&input, None)
        .unwrap();

    assert!(report.trades.is_empty());
    assert_eq!(report.total_return, 0.0);
    assert_eq!(report.volatility, Some(0.0));
    assert_eq!(report.max_drawdown, 0.0);
    assert!(report.sharpe.is_none());
    assert!(matches!(
        report.require_sharpe(),
        Err(CoreError::InsufficientData(_))
    ));
    // With no positions the equity invariant collapses to equity == cash.
    assert_eq!(report.equity_curve.len(), 252);
    for point in &report.equity_curve {
        assert_eq!(point.equity, 100_000.0);
        assert_eq!(point.cash, 100_000.0);
    }
}

// =============================================================================
// T+1: orders decided on day T fill at day T+1's open
// =============================================================================

#[test]
fn orders_fill_at_next_day_open() {
    // Distinct opens so the fill day is identifiable.
    let bars: Vec<Bar> = (0..8)
        .map(|i| bar(i, 100.0 + i as f64, 100.5 + i as f64, 99.5 + i as f64, 100.0 + i as f64))
        .collect();
    let series = Series::new("ACME", "USD", bars).unwrap();
    let input = input_for(vec![series], flat_series("BENCH", 100.0, 8), 100_000.0);

    let mut strategy = ScriptedStrategy::new((Action::Hold, 0.65, 0.10), 1.0, 100_000.0)
        .play("ACME", 0, Action::Hold, 0.55, 0.0)
        .play("ACME", 1, Action::Buy, 0.65, 0.10);

    let report = BacktestEngine::new(scripted_config())
        .run_with_strategy(&input, &mut strategy, None)
        .unwrap();

    // Signal crossed on day 1, so the entry fills at day 2's open (102).
    assert_eq!(report.trades.len(), 1);
    let trade = &report.trades[0];
    assert_eq!(trade.entry_date, day(2));
    assert!((trade.entry_price - 102.0).abs() < 1e-9);
    assert_eq!(trade.exit_reason, ExitReason::EndOfRun);
}

// =============================================================================
// S5: stop fires before target when both touch in the same bar
// =============================================================================

#[test]
fn exit_for_bar_prefers_the_stop() {
    let wide = bar(0, 100.0, 111.0, 94.0, 100.0);
    let (price, reason) = exit_for_bar(95.0, 110.0, &wide).unwrap();
    assert_eq!(price, 95.0);
    assert_eq!(reason, ExitReason::StopLoss);

    let upper_only = bar(0, 100.0, 111.0, 99.0, 100.0);
    let (price, reason) = exit_for_bar(95.0, 110.0, &upper_only).unwrap();
    assert_eq!(price, 110.0);
    assert_eq!(reason, ExitReason::TakeProfit);

    let quiet = bar(0, 100.0, 101.0, 99.0, 100.0);
    assert!(exit_for_bar(95.0, 110.0, &quiet).is_none());
}

#[test]
fn stop_precedence_inside_one_bar() {
    let bars = vec![
        bar(0, 100.0, 100.5, 99.5, 100.0),
        bar(1, 100.0, 100.5, 99.5, 100.0),
        bar(2, 100.0, 100.5, 99.5, 100.0), // entry fills here at 100
        bar(3, 100.0, 111.0, 94.0, 100.0), // both stop and target touch
        bar(4, 100.0, 100.5, 99.5, 100.0),
    ];
    let series = Series::new("ACME", "USD", bars).unwrap();
    let input = input_for(vec![series], flat_series("BENCH", 100.0, 5), 100_000.0);

    let mut strategy = ScriptedStrategy::new((Action::Hold, 0.65, 0.10), 95.0, 110.0)
        .play("ACME", 0, Action::Hold, 0.55, 0.0)
        .play("ACME", 1, Action::Buy, 0.65, 0.10);

    let report = BacktestEngine::new(scripted_config())
        .run_with_strategy(&input, &mut strategy, None)
        .unwrap();

    assert_eq!(report.trades.len(), 1);
    let trade = &report.trades[0];
    assert_eq!(trade.exit_reason, ExitReason::StopLoss);
    assert_eq!(trade.exit_date, day(3));
    assert!((trade.exit_price - 95.0).abs() < 1e-9);
    // -5% before costs on 100 shares.
    assert!((trade.return_pct + 0.05).abs() < 1e-9);
    assert!((trade.pnl + 500.0).abs() < 1e-9);
}

// =============================================================================
// Signal-driven exits fire on any day, not just rebalance days
// =============================================================================

#[test]
fn sell_signal_exits_the_position() {
    let series = flat_series("ACME", 100.0, 10);
    let input = input_for(vec![series], flat_series("BENCH", 100.0, 10), 100_000.0);

    let mut strategy = ScriptedStrategy::new((Action::Hold, 0.65, 0.10), 1.0, 100_000.0)
        .play("ACME", 0, Action::Hold, 0.55, 0.0)
        .play("ACME", 1, Action::Buy, 0.65, 0.10)
        .play("ACME", 5, Action::Sell, 0.40, 0.0);

    let report = BacktestEngine::new(scripted_config())
        .run_with_strategy(&input, &mut strategy, None)
        .unwrap();

    assert_eq!(report.trades.len(), 1);
    let trade = &report.trades[0];
    assert_eq!(trade.exit_reason, ExitReason::Signal);
    // Decided on day 5, filled on day 6's open.
    assert_eq!(trade.exit_date, day(6));
}

#[test]
fn rebalance_trims_toward_the_target_weight() {
    let series = flat_series("ACME", 100.0, 10);
    let input = input_for(vec![series], flat_series("BENCH", 100.0, 10), 100_000.0);

    let mut strategy = ScriptedStrategy::new((Action::Hold, 0.65, 0.10), 1.0, 100_000.0)
        .play("ACME", 0, Action::Hold, 0.55, 0.0)
        .play("ACME", 1, Action::Buy, 0.65, 0.10)
        .play("ACME", 5, Action::Hold, 0.65, 0.02);

    let report = BacktestEngine::new(scripted_config())
        .run_with_strategy(&input, &mut strategy, None)
        .unwrap();

    let trim = report
        .trades
        .iter()
        .find(|t| t.exit_reason == ExitReason::Rebalance)
        .expect("expected a rebalance trim");
    assert_eq!(trim.exit_date, day(6));
    // 10% -> 2% of 100k equity at price 100: 80 shares sold.
    assert_eq!(trim.quantity, 80);
}

// =============================================================================
// Property 5: no look-ahead; truncated reruns reproduce the equity prefix
// =============================================================================

#[test]
fn truncated_rerun_matches_equity_prefix() {
    let closes: Vec<f64> = (0..150)
        .map(|i| 100.0 + 10.0 * (i as f64 * 0.11).sin() + i as f64 * 0.05)
        .collect();
    let series = series_from_closes("WAVE", &closes);
    let benchmark = flat_series("BENCH", 100.0, 150);

    let full = BacktestEngine::new(CoreConfig::default())
        .run(
            &input_for(vec![series.clone()], benchmark.clone(), 100_000.0),
            None,
        )
        .unwrap();

    let cut = day(99);
    let truncated = BacktestEngine::new(CoreConfig::default())
        .run(
            &input_for(vec![series.through(cut)], benchmark.through(cut), 100_000.0),
            None,
        )
        .unwrap();

    assert_eq!(truncated.equity_curve.len(), 100);
    for (full_point, trunc_point) in full.equity_curve.iter().zip(&truncated.equity_curve) {
        assert_eq!(full_point.date, trunc_point.date);
        assert_eq!(full_point.equity, trunc_point.equity);
        assert_eq!(full_point.cash, trunc_point.cash);
    }
}

// =============================================================================
// S6 + property 6: determinism under candidate reordering and across runs
// =============================================================================

#[test]
fn candidate_order_and_reruns_are_byte_identical() {
    let a = flat_series("AAA", 100.0, 10);
    let b = flat_series("BBB", 100.0, 10);
    let benchmark = flat_series("BENCH", 100.0, 10);

    let strategy_for_run = || {
        ScriptedStrategy::new((Action::Hold, 0.65, 0.10), 1.0, 100_000.0)
            .play("AAA", 0, Action::Hold, 0.55, 0.0)
            .play("AAA", 1, Action::Buy, 0.65, 0.10)
            .play("BBB", 0, Action::Hold, 0.55, 0.0)
            .play("BBB", 1, Action::Buy, 0.65, 0.10)
    };

    let engine = BacktestEngine::new(scripted_config());
    let input_ab = input_for(vec![a.clone(), b.clone()], benchmark.clone(), 100_000.0);
    let input_ba = input_for(vec![b, a], benchmark, 100_000.0);

    let report_ab = engine
        .run_with_strategy(&input_ab, &mut strategy_for_run(), None)
        .unwrap();
    let report_ba = engine
        .run_with_strategy(&input_ba, &mut strategy_for_run(), None)
        .unwrap();
    let report_again = engine
        .run_with_strategy(&input_ab, &mut strategy_for_run(), None)
        .unwrap();

    let json_ab = serde_json::to_string(&report_ab).unwrap();
    let json_ba = serde_json::to_string(&report_ba).unwrap();
    let json_again = serde_json::to_string(&report_again).unwrap();
    assert_eq!(json_ab, json_ba);
    assert_eq!(json_ab, json_again);

    // Trades come out sorted by (entry_time, symbol).
    let symbols: Vec<&str> = report_ab.trades.iter().map(|t| t.symbol.as_str()).collect();
    assert_eq!(symbols, vec!["AAA", "BBB"]);
}

// =============================================================================
// Property 7: cash never goes negative; overdrawing orders scale down
// =============================================================================

#[test]
fn overdrawing_orders_scale_down_pro_rata() {
    let a = flat_series("AAA", 100.0, 6);
    let b = flat_series("BBB", 100.0, 6);
    let c = flat_series("CCC", 100.0, 6);
    let input = input_for(vec![a, b, c], flat_series("BENCH", 100.0, 6), 100_000.0);

    let mut strategy = ScriptedStrategy::new((Action::Hold, 0.65, 0.9), 1.0, 100_000.0);
    for symbol in ["AAA", "BBB", "CCC"] {
        strategy = strategy
            .play(symbol, 0, Action::Hold, 0.55, 0.0)
            .play(symbol, 1, Action::Buy, 0.65, 0.9);
    }

    let report = BacktestEngine::new(scripted_config())
        .run_with_strategy(&input, &mut strategy, None)
        .unwrap();

    for point in &report.equity_curve {
        assert!(point.cash >= 0.0, "cash went negative: {:?}", point);
    }
    // 90k fills fully, the second order scales to the remaining 10k, the
    // third cannot fill at all.
    let filled: Vec<(&str, u64)> = report
        .trades
        .iter()
        .map(|t| (t.symbol.as_str(), t.quantity))
        .collect();
    assert_eq!(filled, vec![("AAA", 900), ("BBB", 100)]);
}

// =============================================================================
// Advisory path: a too-short candidate is excluded, never fatal
// =============================================================================

#[test]
fn short_candidate_records_an_advisory() {
    let short = flat_series("TINY", 100.0, 30);
    let input = input_for(vec![short], flat_series("BENCH", 100.0, 30), 100_000.0);
    let report = BacktestEngine::new(CoreConfig::default())
        .run(&input, None)
        .unwrap();

    assert!(report.trades.is_empty());
    assert!(report
        .advisories
        .iter()
        .any(|a| a.contains("TINY") && a.contains("insufficient data")));
    assert!(!report.incomplete);
}

// =============================================================================
// Cooperative cancellation returns a partial report
// =============================================================================

#[test]
fn cancellation_marks_the_report_incomplete() {
    let input = input_for(
        vec![flat_series("FLAT", 100.0, 60)],
        flat_series("BENCH", 100.0, 60),
        100_000.0,
    );
    let token = CancelToken::new();
    token.cancel();
    let report = BacktestEngine::new(CoreConfig::default())
        .run(&input, Some(&token))
        .unwrap();

    assert!(report.incomplete);
    assert!(report.equity_curve.is_empty());
    assert!(report.advisories.iter().any(|a| a.contains("canceled")));
}

// =============================================================================
// Input validation
// =============================================================================

#[test]
fn rejects_non_positive_cash() {
    let input = input_for(
        vec![flat_series("FLAT", 100.0, 10)],
        flat_series("BENCH", 100.0, 10),
        0.0,
    );
    let result = BacktestEngine::new(CoreConfig::default()).run(&input, None);
    assert!(matches!(result, Err(CoreError::InvalidInput(_))));
}

#[test]
fn rejects_invalid_config() {
    let mut config = CoreConfig::default();
    config.action_thresholds.buy = 0.9; // above strong_buy
    let input = input_for(
        vec![flat_series("FLAT", 100.0, 10)],
        flat_series("BENCH", 100.0, 10),
        100_000.0,
    );
    let result = BacktestEngine::new(config).run(&input, None);
    assert!(matches!(result, Err(CoreError::ConfigurationError(_))));
}

// =============================================================================
// An explicit calendar reproduces the derived one
// =============================================================================

#[test]
fn explicit_calendar_matches_derived_calendar() {
    let series = flat_series("FLAT", 100.0, 60);
    let days: Vec<NaiveDate> = series.bars().iter().map(|b| b.timestamp).collect();
    let mut input = input_for(vec![series], flat_series("BENCH", 100.0, 60), 100_000.0);

    input.trading_days = Some(days);
    let with_calendar = BacktestEngine::new(CoreConfig::default())
        .run(&input, None)
        .unwrap();
    input.trading_days = None;
    let derived = BacktestEngine::new(CoreConfig::default())
        .run(&input, None)
        .unwrap();

    assert_eq!(
        serde_json::to_string(&with_calendar).unwrap(),
        serde_json::to_string(&derived).unwrap()
    );
}

// =============================================================================
// Grid search: deterministic expansion, stable winner
// =============================================================================

#[test]
fn grid_search_is_deterministic() {
    let input = input_for(
        vec![flat_series("FLAT", 100.0, 120)],
        flat_series("BENCH", 100.0, 120),
        100_000.0,
    );
    let grid = ParamGrid {
        stop_atr_multiples: vec![2.0, 3.0],
        sizing_k: vec![0.3, 0.4],
        ..ParamGrid::default()
    };

    let first = grid_search(
        &CoreConfig::default(),
        &input,
        &grid,
        Objective::TotalReturn,
        None,
    )
    .unwrap();
    let second = grid_search(
        &CoreConfig::default(),
        &input,
        &grid,
        Objective::TotalReturn,
        None,
    )
    .unwrap();

    assert_eq!(first.rows.len(), 4);
    assert_eq!(first.rows[0].config.risk_bands.stop_atr_multiple.medium, 2.0);
    assert_eq!(first.rows[0].config.position_sizing.k, 0.3);
    assert_eq!(first.rows[3].config.risk_bands.stop_atr_multiple.medium, 3.0);

    // Flat universe: every total return is 0; ties keep the first row.
    assert_eq!(first.best, Some(0));
    assert_eq!(second.best, first.best);

    // Sharpe is undefined on every row here, so no winner exists; Calmar is
    // likewise undefined without a drawdown.
    let by_sharpe = grid_search(
        &CoreConfig::default(),
        &input,
        &grid,
        Objective::Sharpe,
        None,
    )
    .unwrap();
    assert_eq!(by_sharpe.best, None);

    let by_calmar = grid_search(
        &CoreConfig::default(),
        &input,
        &grid,
        Objective::Calmar,
        None,
    )
    .unwrap();
    assert_eq!(by_calmar.best, None);
}
