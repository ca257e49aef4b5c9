use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::Horizon;

/// Lookback and smoothing parameters for the technical indicators.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndicatorParams {
    pub sma_short: usize,
    pub sma_long: usize,
    pub rsi_period: usize,
    pub macd_fast: usize,
    pub macd_slow: usize,
    pub macd_signal: usize,
    pub bb_period: usize,
    pub bb_std: f64,
    pub stoch_k: usize,
    pub stoch_d: usize,
    pub atr_period: usize,
    /// Half-width, in bars, of the extremum window for support/resistance.
    pub sr_window: usize,
    /// Relative tolerance for clustering nearby price levels.
    pub sr_tolerance: f64,
}

impl Default for IndicatorParams {
    fn default() -> Self {
        Self {
            sma_short: 20,
            sma_long: 50,
            rsi_period: 14,
            macd_fast: 12,
            macd_slow: 26,
            macd_signal: 9,
            bb_period: 20,
            bb_std: 2.0,
            stoch_k: 14,
            stoch_d: 3,
            atr_period: 14,
            sr_window: 5,
            sr_tolerance: 0.01,
        }
    }
}

/// Fusion weights over the five sub-score axes. Renormalized at fusion time
/// over whichever sub-scores are present; risk enters inverted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FusionWeights {
    pub fundamental: f64,
    pub technical: f64,
    pub sentiment: f64,
    pub momentum: f64,
    pub risk: f64,
}

impl Default for FusionWeights {
    fn default() -> Self {
        Self {
            fundamental: 0.40,
            technical: 0.20,
            sentiment: 0.15,
            momentum: 0.15,
            risk: 0.10,
        }
    }
}

impl FusionWeights {
    pub fn as_array(&self) -> [f64; 5] {
        [
            self.fundamental,
            self.technical,
            self.sentiment,
            self.momentum,
            self.risk,
        ]
    }
}

/// Composite-score cutoffs for each action, descending.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionThresholds {
    pub strong_buy: f64,
    pub buy: f64,
    pub hold: f64,
    pub sell: f64,
}

impl Default for ActionThresholds {
    fn default() -> Self {
        Self {
            strong_buy: 0.80,
            buy: 0.60,
            hold: 0.40,
            sell: 0.20,
        }
    }
}

/// Target-weight sizing and portfolio breadth limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionSizing {
    /// Slope applied to (score - 0.5) * confidence.
    pub k: f64,
    /// Cap on any single target weight.
    pub w_max: f64,
    /// Floor on buy-action target weights.
    pub w_min: f64,
    pub max_positions: usize,
    /// Orders below this notional are skipped.
    pub min_notional: f64,
}

impl Default for PositionSizing {
    fn default() -> Self {
        Self {
            k: 0.4,
            w_max: 0.10,
            w_min: 0.01,
            max_positions: 20,
            min_notional: 500.0,
        }
    }
}

/// A value per holding-period class.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ByHorizon {
    pub short: f64,
    pub medium: f64,
    pub long: f64,
}

impl ByHorizon {
    pub fn get(&self, horizon: Horizon) -> f64 {
        match horizon {
            Horizon::Short => self.short,
            Horizon::Medium => self.medium,
            Horizon::Long => self.long,
        }
    }
}

/// Stop, reward/risk, and entry-band parameters per horizon.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskBands {
    pub stop_atr_multiple: ByHorizon,
    pub reward_risk: ByHorizon,
    pub entry_band: ByHorizon,
    /// Stops never sit further than this fraction below the close.
    pub max_loss_frac: f64,
}

impl Default for RiskBands {
    fn default() -> Self {
        Self {
            stop_atr_multiple: ByHorizon {
                short: 2.0,
                medium: 3.0,
                long: 4.0,
            },
            reward_risk: ByHorizon {
                short: 2.0,
                medium: 3.0,
                long: 4.0,
            },
            entry_band: ByHorizon {
                short: 0.01,
                medium: 0.03,
                long: 0.05,
            },
            max_loss_frac: 0.15,
        }
    }
}

/// Transaction cost model for the simulator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestCosts {
    pub commission_per_trade: f64,
    pub commission_pct: f64,
    /// Applied in the adverse direction of every fill.
    pub slippage_pct: f64,
}

impl Default for BacktestCosts {
    fn default() -> Self {
        Self {
            commission_per_trade: 0.0,
            commission_pct: 0.0,
            slippage_pct: 0.0,
        }
    }
}

/// Band thresholds and targets for the fundamental component scores.
/// Valuation bands read "at or below `*_low` scores 1, at or above `*_high`
/// scores 0, linear between".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FundamentalThresholds {
    pub pe_low: f64,
    pub pe_high: f64,
    pub peg_low: f64,
    pub peg_high: f64,
    pub pb_low: f64,
    pub pb_high: f64,
    pub ev_ebitda_low: f64,
    pub ev_ebitda_high: f64,
    pub de_good: f64,
    pub de_moderate: f64,
    pub current_ratio_good: f64,
    pub quick_ratio_good: f64,
    pub roe_target: f64,
    pub roa_target: f64,
    pub roic_target: f64,
    pub gross_margin_target: f64,
    pub operating_margin_target: f64,
    pub net_margin_target: f64,
    /// Saturation constant for the growth mapping g / (g + k).
    pub growth_k: f64,
}

impl Default for FundamentalThresholds {
    fn default() -> Self {
        Self {
            pe_low: 15.0,
            pe_high: 30.0,
            peg_low: 1.0,
            peg_high: 2.5,
            pb_low: 1.5,
            pb_high: 5.0,
            ev_ebitda_low: 8.0,
            ev_ebitda_high: 16.0,
            de_good: 1.0,
            de_moderate: 2.0,
            current_ratio_good: 1.5,
            quick_ratio_good: 1.0,
            roe_target: 0.15,
            roa_target: 0.07,
            roic_target: 0.12,
            gross_margin_target: 0.40,
            operating_margin_target: 0.15,
            net_margin_target: 0.10,
            growth_k: 0.10,
        }
    }
}

/// Weights over the four fundamental component scores.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FundamentalWeights {
    pub valuation: f64,
    pub health: f64,
    pub profitability: f64,
    pub growth: f64,
}

impl Default for FundamentalWeights {
    fn default() -> Self {
        Self {
            valuation: 0.35,
            health: 0.25,
            profitability: 0.20,
            growth: 0.20,
        }
    }
}

/// Discounted cash flow projection parameters.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DcfParams {
    pub horizon_years: u32,
    pub growth: f64,
    pub terminal_growth: f64,
    pub discount: f64,
}

impl Default for DcfParams {
    fn default() -> Self {
        Self {
            horizon_years: 5,
            growth: 0.05,
            terminal_growth: 0.025,
            discount: 0.10,
        }
    }
}

/// Cutoffs for the fusion layer's risk flags.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskFlagThresholds {
    /// Annualized volatility above this flags high_volatility.
    pub high_volatility: f64,
    /// Max drawdown below this (more negative) flags deep_drawdown.
    pub deep_drawdown: f64,
    /// Median daily volume below this flags thin_liquidity.
    pub thin_liquidity_volume: f64,
    /// Intrinsic/market ratio below this flags valuation_stretched.
    pub valuation_stretched: f64,
}

impl Default for RiskFlagThresholds {
    fn default() -> Self {
        Self {
            high_volatility: 0.40,
            deep_drawdown: -0.25,
            thin_liquidity_volume: 100_000.0,
            valuation_stretched: 0.7,
        }
    }
}

/// Explicit configuration for every calculator and the simulator. Passed by
/// reference into each operation; the core holds no global state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreConfig {
    pub indicator_params: IndicatorParams,
    pub fusion_weights: FusionWeights,
    pub action_thresholds: ActionThresholds,
    pub position_sizing: PositionSizing,
    pub risk_bands: RiskBands,
    pub backtest_costs: BacktestCosts,
    pub fundamental_thresholds: FundamentalThresholds,
    pub fundamental_weights: FundamentalWeights,
    pub dcf: DcfParams,
    pub risk_flag_thresholds: RiskFlagThresholds,
    pub rebalance_period_days: usize,
    pub periods_per_year: u32,
    pub risk_free_rate: f64,
    /// Score slack below the buy threshold before a held position is sold.
    pub exit_hysteresis: f64,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            indicator_params: IndicatorParams::default(),
            fusion_weights: FusionWeights::default(),
            action_thresholds: ActionThresholds::default(),
            position_sizing: PositionSizing::default(),
            risk_bands: RiskBands::default(),
            backtest_costs: BacktestCosts::default(),
            fundamental_thresholds: FundamentalThresholds::default(),
            fundamental_weights: FundamentalWeights::default(),
            dcf: DcfParams::default(),
            risk_flag_thresholds: RiskFlagThresholds::default(),
            rebalance_period_days: 21,
            periods_per_year: 252,
            risk_free_rate: 0.0,
            exit_hysteresis: 0.05,
        }
    }
}

impl CoreConfig {
    /// Validate cross-field invariants. Called at the entry of every public
    /// pipeline operation; violations are never repaired.
    pub fn validate(&self) -> Result<(), CoreError> {
        let w = self.fusion_weights.as_array();
        if w.iter().any(|x| *x < 0.0 || !x.is_finite()) {
            return Err(CoreError::ConfigurationError(
                "fusion weights must be finite and non-negative".into(),
            ));
        }
        if w.iter().sum::<f64>() <= 0.0 {
            return Err(CoreError::ConfigurationError(
                "fusion weights must sum to a positive value".into(),
            ));
        }

        let t = &self.action_thresholds;
        if !(t.sell < t.hold && t.hold < t.buy && t.buy < t.strong_buy) {
            return Err(CoreError::ConfigurationError(
                "action thresholds must be strictly ordered sell < hold < buy < strong_buy".into(),
            ));
        }
        if t.sell <= 0.0 || t.strong_buy >= 1.0 {
            return Err(CoreError::ConfigurationError(
                "action thresholds must lie strictly inside (0, 1)".into(),
            ));
        }

        let s = &self.position_sizing;
        if s.k <= 0.0 || s.w_max <= 0.0 || s.w_max > 1.0 || s.w_min < 0.0 || s.w_min > s.w_max {
            return Err(CoreError::ConfigurationError(
                "position sizing requires k > 0 and 0 <= w_min <= w_max <= 1".into(),
            ));
        }
        if s.max_positions == 0 {
            return Err(CoreError::ConfigurationError(
                "max_positions must be at least 1".into(),
            ));
        }

        let rb = &self.risk_bands;
        for m in [
            rb.stop_atr_multiple.short,
            rb.stop_atr_multiple.medium,
            rb.stop_atr_multiple.long,
            rb.reward_risk.short,
            rb.reward_risk.medium,
            rb.reward_risk.long,
        ] {
            if m <= 0.0 {
                return Err(CoreError::ConfigurationError(
                    "stop multiples and reward/risk ratios must be positive".into(),
                ));
            }
        }
        if rb.max_loss_frac <= 0.0 || rb.max_loss_frac >= 1.0 {
            return Err(CoreError::ConfigurationError(
                "max_loss_frac must lie in (0, 1)".into(),
            ));
        }

        let c = &self.backtest_costs;
        if c.commission_per_trade < 0.0 || c.commission_pct < 0.0 || c.slippage_pct < 0.0 {
            return Err(CoreError::ConfigurationError(
                "transaction costs must be non-negative".into(),
            ));
        }

        if self.dcf.discount <= self.dcf.terminal_growth {
            return Err(CoreError::ConfigurationError(
                "DCF discount rate must exceed terminal growth".into(),
            ));
        }
        if self.rebalance_period_days == 0 {
            return Err(CoreError::ConfigurationError(
                "rebalance_period_days must be at least 1".into(),
            ));
        }
        if self.periods_per_year == 0 {
            return Err(CoreError::ConfigurationError(
                "periods_per_year must be at least 1".into(),
            ));
        }
        Ok(())
    }
}
