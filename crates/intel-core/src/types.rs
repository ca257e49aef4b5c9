use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::error::CoreError;

/// OHLCV bar for one symbol on one trading day.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub timestamp: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Bar {
    pub fn typical_price(&self) -> f64 {
        (self.high + self.low + self.close) / 3.0
    }

    fn validate(&self) -> Result<(), CoreError> {
        let fields = [self.open, self.high, self.low, self.close, self.volume];
        if fields.iter().any(|v| !v.is_finite()) {
            return Err(CoreError::InvalidInput(format!(
                "non-finite field in bar at {}",
                self.timestamp
            )));
        }
        if self.low > self.open
            || self.low > self.close
            || self.high < self.open
            || self.high < self.close
            || self.low > self.high
        {
            return Err(CoreError::InvalidInput(format!(
                "bar at {} violates low <= open,close <= high",
                self.timestamp
            )));
        }
        if self.volume < 0.0 {
            return Err(CoreError::InvalidInput(format!(
                "negative volume at {}",
                self.timestamp
            )));
        }
        Ok(())
    }
}

/// Validated, immutable daily price series for a single symbol and currency.
///
/// Construction checks every bar invariant and strict timestamp ordering;
/// the core never mutates a series after that.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Series {
    symbol: String,
    currency: String,
    bars: Vec<Bar>,
}

impl Series {
    pub fn new(
        symbol: impl Into<String>,
        currency: impl Into<String>,
        bars: Vec<Bar>,
    ) -> Result<Self, CoreError> {
        for bar in &bars {
            bar.validate()?;
        }
        for pair in bars.windows(2) {
            if pair[1].timestamp <= pair[0].timestamp {
                return Err(CoreError::InvalidInput(format!(
                    "timestamps not strictly increasing at {}",
                    pair[1].timestamp
                )));
            }
        }
        Ok(Self {
            symbol: symbol.into(),
            currency: currency.into(),
            bars,
        })
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn currency(&self) -> &str {
        &self.currency
    }

    pub fn bars(&self) -> &[Bar] {
        &self.bars
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn last(&self) -> Option<&Bar> {
        self.bars.last()
    }

    pub fn closes(&self) -> Vec<f64> {
        self.bars.iter().map(|b| b.close).collect()
    }

    pub fn volumes(&self) -> Vec<f64> {
        self.bars.iter().map(|b| b.volume).collect()
    }

    /// The prefix of this series with timestamps `<= through`. Validation is
    /// skipped: a prefix of a valid series is valid.
    pub fn through(&self, through: NaiveDate) -> Series {
        let end = self.bars.partition_point(|b| b.timestamp <= through);
        Series {
            symbol: self.symbol.clone(),
            currency: self.currency.clone(),
            bars: self.bars[..end].to_vec(),
        }
    }
}

/// Point-in-time fundamental snapshot. Any metric may be absent; absent
/// never means zero.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FundamentalSnapshot {
    pub symbol: String,
    pub as_of: NaiveDate,
    pub pe: Option<f64>,
    pub peg: Option<f64>,
    pub pb: Option<f64>,
    pub ps: Option<f64>,
    pub ev_ebitda: Option<f64>,
    pub de_ratio: Option<f64>,
    pub current_ratio: Option<f64>,
    pub quick_ratio: Option<f64>,
    pub roe: Option<f64>,
    pub roa: Option<f64>,
    pub roic: Option<f64>,
    pub gross_margin: Option<f64>,
    pub operating_margin: Option<f64>,
    pub net_margin: Option<f64>,
    pub revenue_growth: Option<f64>,
    pub earnings_growth: Option<f64>,
    pub fcf: Option<f64>,
    pub shares_outstanding: Option<f64>,
    pub dividend_yield: Option<f64>,
}

impl FundamentalSnapshot {
    fn metric_fields(&self) -> [Option<f64>; 19] {
        [
            self.pe,
            self.peg,
            self.pb,
            self.ps,
            self.ev_ebitda,
            self.de_ratio,
            self.current_ratio,
            self.quick_ratio,
            self.roe,
            self.roa,
            self.roic,
            self.gross_margin,
            self.operating_margin,
            self.net_margin,
            self.revenue_growth,
            self.earnings_growth,
            self.fcf,
            self.shares_outstanding,
            self.dividend_yield,
        ]
    }

    /// Fraction of metric fields that are present, used as the fundamental
    /// confidence.
    pub fn present_fraction(&self) -> f64 {
        let fields = self.metric_fields();
        let present = fields.iter().filter(|f| f.is_some()).count();
        present as f64 / fields.len() as f64
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        if self.metric_fields().iter().flatten().any(|v| !v.is_finite()) {
            return Err(CoreError::InvalidInput(format!(
                "non-finite fundamental metric for {}",
                self.symbol
            )));
        }
        Ok(())
    }
}

/// Discrete per-indicator signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndicatorSignal {
    StrongBuy,
    Buy,
    Hold,
    Sell,
    StrongSell,
}

impl IndicatorSignal {
    pub fn is_buy_leaning(self) -> bool {
        matches!(self, IndicatorSignal::StrongBuy | IndicatorSignal::Buy)
    }

    pub fn is_sell_leaning(self) -> bool {
        matches!(self, IndicatorSignal::StrongSell | IndicatorSignal::Sell)
    }
}

/// The five evaluation axes a composite is fused from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubScoreName {
    Technical,
    Fundamental,
    Sentiment,
    Momentum,
    Risk,
}

impl fmt::Display for SubScoreName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SubScoreName::Technical => "technical",
            SubScoreName::Fundamental => "fundamental",
            SubScoreName::Sentiment => "sentiment",
            SubScoreName::Momentum => "momentum",
            SubScoreName::Risk => "risk",
        };
        f.write_str(name)
    }
}

/// One axis of evaluation, normalized to [0,1].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubScore {
    pub name: SubScoreName,
    pub value: f64,
    pub confidence: f64,
    pub rationale: String,
}

impl SubScore {
    pub fn new(
        name: SubScoreName,
        value: f64,
        confidence: f64,
        rationale: impl Into<String>,
    ) -> Self {
        Self {
            name,
            value: value.clamp(0.0, 1.0),
            confidence: confidence.clamp(0.0, 1.0),
            rationale: rationale.into(),
        }
    }
}

/// Conditions the fusion layer flags for the recommendation engine. Flags
/// never move the composite score themselves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskFlag {
    HighVolatility,
    DeepDrawdown,
    ThinLiquidity,
    ValuationStretched,
}

impl RiskFlag {
    /// Hard flags force an action downgrade at low confidence.
    pub fn is_hard(self) -> bool {
        matches!(self, RiskFlag::HighVolatility | RiskFlag::DeepDrawdown)
    }
}

impl fmt::Display for RiskFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RiskFlag::HighVolatility => "high_volatility",
            RiskFlag::DeepDrawdown => "deep_drawdown",
            RiskFlag::ThinLiquidity => "thin_liquidity",
            RiskFlag::ValuationStretched => "valuation_stretched",
        };
        f.write_str(name)
    }
}

/// Weighted combination of sub-scores. Contributions are keyed by axis so
/// they enumerate in a stable order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompositeScore {
    pub score: f64,
    pub confidence: f64,
    pub contributions: BTreeMap<SubScoreName, f64>,
    pub risk_flags: BTreeSet<RiskFlag>,
}

impl CompositeScore {
    pub fn has_hard_flag(&self) -> bool {
        self.risk_flags.iter().any(|f| f.is_hard())
    }
}

/// Recommendation action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Action {
    StrongBuy,
    Buy,
    Hold,
    Sell,
    StrongSell,
}

impl Action {
    pub fn is_buy(self) -> bool {
        matches!(self, Action::StrongBuy | Action::Buy)
    }

    pub fn is_sell(self) -> bool {
        matches!(self, Action::StrongSell | Action::Sell)
    }

    /// One level toward the sell end.
    pub fn downgraded(self) -> Action {
        match self {
            Action::StrongBuy => Action::Buy,
            Action::Buy => Action::Hold,
            Action::Hold => Action::Sell,
            Action::Sell | Action::StrongSell => Action::StrongSell,
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Action::StrongBuy => "STRONG_BUY",
            Action::Buy => "BUY",
            Action::Hold => "HOLD",
            Action::Sell => "SELL",
            Action::StrongSell => "STRONG_SELL",
        };
        f.write_str(name)
    }
}

/// Intended holding period class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Horizon {
    Short,
    Medium,
    Long,
}

/// Actionable trade plan for one symbol at one as-of date.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recommendation {
    pub symbol: String,
    pub as_of: NaiveDate,
    pub action: Action,
    pub conviction: f64,
    pub target_weight: f64,
    pub entry_low: f64,
    pub entry_high: f64,
    pub take_profit: f64,
    pub stop_loss: f64,
    pub horizon: Horizon,
    pub rationale: String,
}

/// Externally supplied sentiment reading.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SentimentScore {
    pub value: f64,
    pub confidence: f64,
}
