use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;

use intel_core::cancel::CancelToken;
use intel_core::config::CoreConfig;
use intel_core::error::CoreError;
use intel_core::types::Bar;
use recommendation::{PositionState, PositionStateMachine, Transition};

use crate::metrics;
use crate::models::*;
use crate::strategy::{CompositeStrategy, Evaluation, Strategy};

/// Deterministic daily simulator. Orders decided on day T fill at day T+1's
/// open; slippage is applied in the adverse direction and commission is a
/// fixed fee plus a percentage of notional.
pub struct BacktestEngine {
    config: CoreConfig,
}

enum PendingOrder {
    Buy {
        symbol: String,
        notional: f64,
        stop: f64,
        target: f64,
    },
    Sell {
        symbol: String,
        quantity: u64,
        reason: ExitReason,
    },
}

/// Intra-bar exit evaluation. When both levels could fill in the same bar
/// the stop is assumed to fire first (worst case).
pub fn exit_for_bar(stop: f64, target: f64, bar: &Bar) -> Option<(f64, ExitReason)> {
    if bar.low <= stop {
        return Some((stop, ExitReason::StopLoss));
    }
    if bar.high >= target {
        return Some((target, ExitReason::TakeProfit));
    }
    None
}

impl BacktestEngine {
    pub fn new(config: CoreConfig) -> Self {
        Self { config }
    }

    /// Run with the default composite strategy.
    pub fn run(
        &self,
        input: &BacktestInput,
        cancel: Option<&CancelToken>,
    ) -> Result<BacktestReport, CoreError> {
        let mut strategy = CompositeStrategy::new(self.config.clone(), input.horizon);
        self.run_with_strategy(input, &mut strategy, cancel)
    }

    /// Run with an injected signal source. The per-day step order is fixed:
    /// fills at the open, mark-to-market and one equity snapshot, stop/target
    /// exits, candidate evaluation, then order generation.
    pub fn run_with_strategy(
        &self,
        input: &BacktestInput,
        strategy: &mut dyn Strategy,
        cancel: Option<&CancelToken>,
    ) -> Result<BacktestReport, CoreError> {
        self.config.validate()?;
        if !input.initial_cash.is_finite() || input.initial_cash <= 0.0 {
            return Err(CoreError::InvalidInput(
                "initial cash must be a positive finite amount".into(),
            ));
        }

        let calendar: BTreeSet<NaiveDate> = match &input.trading_days {
            Some(days) => days.iter().copied().collect(),
            None => {
                let mut days: BTreeSet<NaiveDate> =
                    input.benchmark.bars().iter().map(|b| b.timestamp).collect();
                for series in input.candidates.values() {
                    days.extend(series.bars().iter().map(|b| b.timestamp));
                }
                days
            }
        };
        if calendar.is_empty() {
            return Err(CoreError::InsufficientData(
                "no trading days across candidates and benchmark".into(),
            ));
        }
        let start = *calendar.iter().next().unwrap();
        let end = *calendar.iter().next_back().unwrap();

        let mut bars_by_symbol: BTreeMap<String, BTreeMap<NaiveDate, Bar>> = BTreeMap::new();
        for (symbol, series) in &input.candidates {
            let by_date = series.bars().iter().map(|b| (b.timestamp, *b)).collect();
            bars_by_symbol.insert(symbol.clone(), by_date);
        }

        let costs = self.config.backtest_costs.clone();
        let mut portfolio = Portfolio::new(input.initial_cash);
        let mut machines: BTreeMap<String, PositionStateMachine> = BTreeMap::new();
        let mut pending: Vec<PendingOrder> = Vec::new();
        let mut trades: Vec<Trade> = Vec::new();
        let mut advisories: Vec<String> = Vec::new();
        let mut excluded_days: BTreeMap<String, usize> = BTreeMap::new();
        let mut last_close: BTreeMap<String, f64> = BTreeMap::new();
        let mut incomplete = false;
        let mut days_since_rebalance = self.config.rebalance_period_days;

        for &date in &calendar {
            if cancel.map_or(false, CancelToken::is_canceled) {
                incomplete = true;
                advisories.push(format!("run canceled at {}", date));
                break;
            }

            // Orders queued on the previous day fill at today's open.
            let due = std::mem::take(&mut pending);
            for order in due {
                self.execute_order(
                    order,
                    date,
                    &bars_by_symbol,
                    &mut portfolio,
                    &mut trades,
                    &mut advisories,
                );
            }

            // 1. Mark-to-market on today's closes; exactly one snapshot per
            // trading day, before any order decision.
            for (symbol, bars) in &bars_by_symbol {
                if let Some(bar) = bars.get(&date) {
                    last_close.insert(symbol.clone(), bar.close);
                }
            }
            let equity = portfolio.equity(&last_close);
            portfolio.history.push(EquityPoint {
                date,
                equity,
                cash: portfolio.cash,
            });

            // 2. Stop/target exits against today's range, stop first. Exits
            // fill at the touched level less slippage.
            let held: Vec<String> = portfolio.positions.keys().cloned().collect();
            for symbol in held {
                let Some(bar) = bars_by_symbol.get(&symbol).and_then(|m| m.get(&date)) else {
                    continue;
                };
                let position = &portfolio.positions[&symbol];
                if let Some((touched, reason)) = exit_for_bar(position.stop, position.target, bar) {
                    let fill = touched * (1.0 - costs.slippage_pct);
                    let quantity = position.quantity;
                    self.close_shares(
                        &mut portfolio,
                        &symbol,
                        quantity,
                        fill,
                        date,
                        reason,
                        &mut trades,
                    );
                    if let Some(machine) = machines.get_mut(&symbol) {
                        machine.force_exit();
                    }
                    tracing::debug!(%symbol, %date, ?reason, fill, "intra-bar exit");
                }
            }

            // 3. Evaluate every candidate on its prefix through today.
            // Sell-side transitions queue immediately; entries wait for a
            // rebalance day.
            let mut evaluations: BTreeMap<String, Evaluation> = BTreeMap::new();
            for (symbol, bars) in &bars_by_symbol {
                if !bars.contains_key(&date) {
                    continue;
                }
                let history = input.candidates[symbol].through(date);
                match strategy.evaluate(symbol, &history) {
                    Ok(eval) => {
                        let machine = machines.entry(symbol.clone()).or_insert_with(|| {
                            PositionStateMachine::new(
                                self.config.action_thresholds.buy,
                                self.config.exit_hysteresis,
                            )
                        });
                        let transition =
                            machine.on_recommendation(eval.recommendation.action, eval.score);
                        if transition == Transition::ExitLong {
                            if let Some(position) = portfolio.positions.get(symbol) {
                                pending.push(PendingOrder::Sell {
                                    symbol: symbol.clone(),
                                    quantity: position.quantity,
                                    reason: ExitReason::Signal,
                                });
                            }
                        }
                        evaluations.insert(symbol.clone(), eval);
                    }
                    Err(CoreError::InsufficientData(_)) => {
                        *excluded_days.entry(symbol.clone()).or_default() += 1;
                    }
                    Err(other) => return Err(other),
                }
            }

            // 4. On rebalance days, diff desired weights against current
            // weights and queue orders for tomorrow's open.
            if days_since_rebalance >= self.config.rebalance_period_days {
                days_since_rebalance = 0;
                self.plan_rebalance(
                    &evaluations,
                    &machines,
                    &portfolio,
                    &last_close,
                    &mut pending,
                );
            }
            days_since_rebalance += 1;
        }

        // Liquidate what is still open at the final close so trade
        // statistics cover all capital at risk. Canceled runs keep their
        // open positions and report as partial.
        if !incomplete {
            let held: Vec<String> = portfolio.positions.keys().cloned().collect();
            for symbol in held {
                let Some(close) = last_close.get(&symbol).copied() else {
                    continue;
                };
                let fill = close * (1.0 - costs.slippage_pct);
                let quantity = portfolio.positions[&symbol].quantity;
                self.close_shares(
                    &mut portfolio,
                    &symbol,
                    quantity,
                    fill,
                    end,
                    ExitReason::EndOfRun,
                    &mut trades,
                );
            }
        }

        trades.sort_by(|a, b| {
            (a.entry_date, &a.symbol, a.exit_date).cmp(&(b.entry_date, &b.symbol, b.exit_date))
        });
        for (symbol, days) in excluded_days {
            advisories.push(format!(
                "{}: excluded from {} day(s): insufficient data",
                symbol, days
            ));
        }

        let final_equity = portfolio.equity(&last_close);
        Ok(metrics::build_report(
            &self.config,
            start,
            end,
            input.initial_cash,
            final_equity,
            portfolio.history,
            trades,
            &input.benchmark,
            advisories,
            incomplete,
        ))
    }

    fn execute_order(
        &self,
        order: PendingOrder,
        date: NaiveDate,
        bars_by_symbol: &BTreeMap<String, BTreeMap<NaiveDate, Bar>>,
        portfolio: &mut Portfolio,
        trades: &mut Vec<Trade>,
        advisories: &mut Vec<String>,
    ) {
        let costs = &self.config.backtest_costs;
        match order {
            PendingOrder::Buy {
                symbol,
                notional,
                stop,
                target,
            } => {
                let Some(bar) = bars_by_symbol.get(&symbol).and_then(|m| m.get(&date)) else {
                    advisories.push(format!("{}: buy order dropped, no bar on {}", symbol, date));
                    return;
                };
                let price = bar.open * (1.0 + costs.slippage_pct);
                if price <= 0.0 {
                    return;
                }
                let mut quantity = (notional / price).floor() as u64;

                // Cash non-negativity: an overdrawing order scales down to
                // the affordable whole-share quantity.
                let available = portfolio.cash - costs.commission_per_trade;
                if available <= 0.0 {
                    return;
                }
                let affordable = (available / (price * (1.0 + costs.commission_pct))).floor() as u64;
                quantity = quantity.min(affordable);
                if quantity == 0 {
                    return;
                }
                let filled_notional = quantity as f64 * price;
                if filled_notional < self.config.position_sizing.min_notional {
                    return;
                }
                let commission = costs.commission_per_trade + costs.commission_pct * filled_notional;
                portfolio.cash -= filled_notional + commission;

                match portfolio.positions.get_mut(&symbol) {
                    Some(position) => {
                        let total = position.quantity + quantity;
                        position.cost_basis = (position.cost_basis * position.quantity as f64
                            + filled_notional)
                            / total as f64;
                        position.quantity = total;
                        position.stop = stop;
                        position.target = target;
                        position.entry_commission += commission;
                    }
                    None => {
                        portfolio.positions.insert(
                            symbol.clone(),
                            Position {
                                symbol: symbol.clone(),
                                quantity,
                                cost_basis: price,
                                opened_at: date,
                                stop,
                                target,
                                entry_commission: commission,
                            },
                        );
                    }
                }
                tracing::debug!(%symbol, %date, quantity, price, "buy filled");
            }
            PendingOrder::Sell {
                symbol,
                quantity,
                reason,
            } => {
                let Some(bar) = bars_by_symbol.get(&symbol).and_then(|m| m.get(&date)) else {
                    advisories.push(format!("{}: sell order dropped, no bar on {}", symbol, date));
                    return;
                };
                let fill = bar.open * (1.0 - costs.slippage_pct);
                self.close_shares(portfolio, &symbol, quantity, fill, date, reason, trades);
            }
        }
    }

    /// Realize `quantity` shares of an open position at `fill_price`,
    /// recording the trade. Entry commissions are allocated pro-rata to the
    /// closed fraction.
    fn close_shares(
        &self,
        portfolio: &mut Portfolio,
        symbol: &str,
        quantity: u64,
        fill_price: f64,
        date: NaiveDate,
        reason: ExitReason,
        trades: &mut Vec<Trade>,
    ) {
        let costs = &self.config.backtest_costs;
        let Some(position) = portfolio.positions.get_mut(symbol) else {
            return;
        };
        let quantity = quantity.min(position.quantity);
        if quantity == 0 {
            return;
        }

        let gross = quantity as f64 * fill_price;
        let exit_commission = costs.commission_per_trade + costs.commission_pct * gross;
        let entry_share =
            position.entry_commission * quantity as f64 / position.quantity as f64;
        let pnl = (fill_price - position.cost_basis) * quantity as f64
            - exit_commission
            - entry_share;

        portfolio.cash += gross - exit_commission;
        trades.push(Trade {
            symbol: symbol.to_string(),
            entry_date: position.opened_at,
            exit_date: date,
            entry_price: position.cost_basis,
            exit_price: fill_price,
            quantity,
            pnl,
            return_pct: fill_price / position.cost_basis - 1.0,
            commission: exit_commission + entry_share,
            exit_reason: reason,
            holding_days: (date - position.opened_at).num_days(),
        });

        position.entry_commission -= entry_share;
        position.quantity -= quantity;
        if position.quantity == 0 {
            portfolio.positions.remove(symbol);
        }
    }

    /// Queue the orders that shrink the L1 distance between desired and
    /// current weights, respecting breadth and minimum-notional limits. New
    /// entries are admitted by descending desired weight (symbol as
    /// tie-break) so candidate ordering can never matter.
    fn plan_rebalance(
        &self,
        evaluations: &BTreeMap<String, Evaluation>,
        machines: &BTreeMap<String, PositionStateMachine>,
        portfolio: &Portfolio,
        last_close: &BTreeMap<String, f64>,
        pending: &mut Vec<PendingOrder>,
    ) {
        let equity = portfolio.equity(last_close);
        if equity <= 0.0 {
            return;
        }
        let sizing = &self.config.position_sizing;

        let selling: BTreeSet<String> = pending
            .iter()
            .filter_map(|order| match order {
                PendingOrder::Sell { symbol, .. } => Some(symbol.clone()),
                _ => None,
            })
            .collect();

        let mut buys: Vec<(f64, String, f64, f64, f64)> = Vec::new();
        for (symbol, eval) in evaluations {
            let long = machines
                .get(symbol)
                .map_or(false, |m| m.state() == PositionState::Long);
            let desired_weight = if long {
                eval.recommendation.target_weight
            } else {
                0.0
            };

            let price = last_close.get(symbol).copied().unwrap_or(0.0);
            let current_notional = portfolio
                .positions
                .get(symbol)
                .map_or(0.0, |p| p.quantity as f64 * price);
            let delta = desired_weight * equity - current_notional;

            if delta >= sizing.min_notional {
                buys.push((
                    desired_weight,
                    symbol.clone(),
                    delta,
                    eval.recommendation.stop_loss,
                    eval.recommendation.take_profit,
                ));
            } else if -delta >= sizing.min_notional && price > 0.0 && !selling.contains(symbol) {
                let held = portfolio.positions.get(symbol).map_or(0, |p| p.quantity);
                let quantity = ((-delta) / price).floor() as u64;
                let quantity = quantity.min(held);
                if quantity > 0 {
                    pending.push(PendingOrder::Sell {
                        symbol: symbol.clone(),
                        quantity,
                        reason: ExitReason::Rebalance,
                    });
                }
            }
        }

        buys.sort_by(|a, b| {
            b.0.partial_cmp(&a.0)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.1.cmp(&b.1))
        });
        let mut open_count = portfolio.positions.len();
        for (_, symbol, notional, stop, target) in buys {
            let is_new = !portfolio.positions.contains_key(&symbol);
            if is_new {
                if open_count >= sizing.max_positions {
                    continue;
                }
                open_count += 1;
            }
            pending.push(PendingOrder::Buy {
                symbol,
                notional,
                stop,
                target,
            });
        }
    }
}
