//! Maps a composite score plus risk context into an actionable trade plan,
//! and tracks per-symbol position state with entry/exit hysteresis.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use intel_core::config::{ActionThresholds, CoreConfig, PositionSizing, RiskBands};
use intel_core::error::CoreError;
use intel_core::types::{Action, CompositeScore, Horizon, Recommendation};

pub struct RecommendationEngine {
    thresholds: ActionThresholds,
    sizing: PositionSizing,
    bands: RiskBands,
}

impl RecommendationEngine {
    pub fn new(config: &CoreConfig) -> Self {
        Self {
            thresholds: config.action_thresholds.clone(),
            sizing: config.position_sizing.clone(),
            bands: config.risk_bands.clone(),
        }
    }

    fn action_for(&self, composite: &CompositeScore) -> Action {
        let t = &self.thresholds;
        let mut action = if composite.score >= t.strong_buy {
            Action::StrongBuy
        } else if composite.score >= t.buy {
            Action::Buy
        } else if composite.score >= t.hold {
            Action::Hold
        } else if composite.score >= t.sell {
            Action::Sell
        } else {
            Action::StrongSell
        };
        if composite.has_hard_flag() && composite.confidence < 0.5 {
            action = action.downgraded();
        }
        action
    }

    /// Build the trade plan. `atr` is the latest ATR(14); without it the stop
    /// sits at the maximum-loss floor.
    pub fn recommend(
        &self,
        symbol: &str,
        as_of: NaiveDate,
        composite: &CompositeScore,
        close: f64,
        atr: Option<f64>,
        horizon: Horizon,
    ) -> Result<Recommendation, CoreError> {
        if !close.is_finite() || close <= 0.0 {
            return Err(CoreError::InvalidInput(format!(
                "non-positive close {} for {}",
                close, symbol
            )));
        }

        let action = self.action_for(composite);
        let score = composite.score;
        let confidence = composite.confidence;
        let conviction = ((score - 0.5).abs() * 2.0 * confidence).clamp(0.0, 1.0);

        // Long-only: only buy actions carry weight, floored at w_min.
        let target_weight = if action.is_buy() {
            let sized = (self.sizing.k * (score - 0.5) * confidence).clamp(0.0, self.sizing.w_max);
            sized.max(self.sizing.w_min.min(self.sizing.w_max))
        } else {
            0.0
        };

        let e = self.bands.entry_band.get(horizon);
        let (entry_low, entry_high) = if action.is_buy() {
            (close * (1.0 - e), close)
        } else if action.is_sell() {
            (close, close * (1.0 + e))
        } else {
            (close, close)
        };

        let stop_floor = close * (1.0 - self.bands.max_loss_frac);
        let stop_loss = match atr {
            Some(a) if a > 0.0 => {
                (close - self.bands.stop_atr_multiple.get(horizon) * a).max(stop_floor)
            }
            _ => stop_floor,
        };
        let reward_risk = self.bands.reward_risk.get(horizon);
        let take_profit = close + reward_risk * (close - stop_loss);

        let rationale = build_rationale(composite);

        Ok(Recommendation {
            symbol: symbol.to_string(),
            as_of,
            action,
            conviction,
            target_weight,
            entry_low,
            entry_high,
            take_profit,
            stop_loss,
            horizon,
            rationale,
        })
    }
}

/// Top three weighted contributions, largest first with name as tie-break,
/// then any active risk flags.
fn build_rationale(composite: &CompositeScore) -> String {
    let mut ranked: Vec<(&intel_core::types::SubScoreName, &f64)> =
        composite.contributions.iter().collect();
    ranked.sort_by(|a, b| {
        b.1.partial_cmp(a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.0.cmp(b.0))
    });
    let drivers: Vec<String> = ranked
        .iter()
        .take(3)
        .map(|(name, value)| format!("{} {:.2}", name, value))
        .collect();

    let mut rationale = format!("drivers: {}", drivers.join(", "));
    if !composite.risk_flags.is_empty() {
        let flags: Vec<String> = composite.risk_flags.iter().map(|f| f.to_string()).collect();
        rationale.push_str(&format!("; flags: {}", flags.join(", ")));
    }
    rationale
}

/// Per-symbol holding state consumed by the backtester.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PositionState {
    Flat,
    Long,
}

/// What the state machine wants done after seeing a recommendation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    EnterLong,
    ExitLong,
    Stay,
}

/// FLAT -> LONG only on an actual upward cross of the buy threshold;
/// LONG -> FLAT on a sell-family action once the score has fallen through
/// the hysteresis band. HOLD never transitions.
#[derive(Debug, Clone)]
pub struct PositionStateMachine {
    state: PositionState,
    prev_score: Option<f64>,
    buy_threshold: f64,
    hysteresis: f64,
}

impl PositionStateMachine {
    pub fn new(buy_threshold: f64, hysteresis: f64) -> Self {
        Self {
            state: PositionState::Flat,
            prev_score: None,
            buy_threshold,
            hysteresis,
        }
    }

    pub fn state(&self) -> PositionState {
        self.state
    }

    pub fn on_recommendation(&mut self, action: Action, score: f64) -> Transition {
        let crossed_up = matches!(self.prev_score, Some(prev)
            if prev < self.buy_threshold && score >= self.buy_threshold);
        let transition = match self.state {
            PositionState::Flat => {
                if action.is_buy() && crossed_up {
                    self.state = PositionState::Long;
                    Transition::EnterLong
                } else {
                    Transition::Stay
                }
            }
            PositionState::Long => {
                if action.is_sell() && score < self.buy_threshold - self.hysteresis {
                    self.state = PositionState::Flat;
                    Transition::ExitLong
                } else {
                    Transition::Stay
                }
            }
        };
        self.prev_score = Some(score);
        transition
    }

    /// A stop or target fill flattened the position outside the signal path.
    pub fn force_exit(&mut self) {
        self.state = PositionState::Flat;
    }
}
