//! Signal fusion: derives the momentum and risk sub-scores from price
//! history, raises risk flags, and combines whichever sub-scores are present
//! into a weighted composite with bounded confidence.

use std::collections::{BTreeMap, BTreeSet};

use statrs::statistics::{Data, OrderStatistics};

use intel_core::config::{FusionWeights, RiskFlagThresholds};
use intel_core::error::CoreError;
use intel_core::series;
use intel_core::types::{CompositeScore, RiskFlag, Series, SubScore, SubScoreName};
use technical_analysis::indicators::{macd, sma};

const MOMENTUM_SMA_PERIOD: usize = 200;
/// Saturation constant for the price-distance component.
const PRICE_DISTANCE_K: f64 = 0.10;
/// Saturation constant for the histogram-slope component (relative to price).
const HIST_SLOPE_K: f64 = 0.001;

/// Map a signed reading into (0, 1) through x / (|x| + k), centered at 0.5.
fn saturate_signed(x: f64, k: f64) -> f64 {
    0.5 + 0.5 * (x / (x.abs() + k))
}

fn depth_confidence(samples: usize) -> f64 {
    if samples >= 252 {
        0.9
    } else if samples >= 200 {
        0.8
    } else if samples >= 100 {
        0.6
    } else if samples >= 35 {
        0.4
    } else {
        0.3
    }
}

/// Momentum sub-score: MACD histogram slope blended with the distance of
/// price from its long moving average. `None` when neither component has
/// warmed up.
pub fn momentum_sub_score(series_data: &Series) -> Option<SubScore> {
    let closes = series_data.closes();
    let price = *closes.last()?;
    if price <= 0.0 {
        return None;
    }

    let mut components: Vec<f64> = Vec::new();
    let mut notes: Vec<String> = Vec::new();

    let macd_out = macd(&closes, 12, 26, 9);
    let n = macd_out.histogram.len();
    if n >= 2 {
        if let (Some(now), Some(prev)) = (macd_out.histogram[n - 1], macd_out.histogram[n - 2]) {
            let slope = (now - prev) / price;
            components.push(saturate_signed(slope, HIST_SLOPE_K));
            notes.push(format!("macd histogram slope {:.4}", now - prev));
        }
    }

    let long_sma = sma(&closes, MOMENTUM_SMA_PERIOD);
    if let Some(Some(anchor)) = long_sma.last() {
        if *anchor > 0.0 {
            let distance = price / anchor - 1.0;
            components.push(saturate_signed(distance, PRICE_DISTANCE_K));
            notes.push(format!("price {:.1}% from SMA200", distance * 100.0));
        }
    }

    if components.is_empty() {
        return None;
    }
    let value = components.iter().sum::<f64>() / components.len() as f64;
    Some(SubScore::new(
        SubScoreName::Momentum,
        value,
        depth_confidence(closes.len()),
        notes.join(", "),
    ))
}

const VOL_SATURATION: f64 = 0.60;
const DD_SATURATION: f64 = 0.50;

/// Risk sub-score in [0,1], higher meaning riskier: annualized volatility and
/// drawdown severity, each scaled against a saturation level. `None` under
/// two return samples.
pub fn risk_sub_score(series_data: &Series, periods_per_year: u32) -> Option<SubScore> {
    let closes = series_data.closes();
    let returns = series::defined(&series::simple_returns(&closes));
    let vol = series::volatility(&returns, true, periods_per_year)?;
    let drawdown = series::max_drawdown(&closes);

    let vol_component = (vol / VOL_SATURATION).clamp(0.0, 1.0);
    let dd_component = (-drawdown / DD_SATURATION).clamp(0.0, 1.0);
    let value = (vol_component + dd_component) / 2.0;

    Some(SubScore::new(
        SubScoreName::Risk,
        value,
        depth_confidence(returns.len()),
        format!("annualized vol {:.2}, max drawdown {:.2}", vol, drawdown),
    ))
}

/// Derive the composite's risk flags from price history and the intrinsic
/// valuation ratio. Flags attach to the composite but never move its score.
pub fn risk_flags(
    series_data: &Series,
    intrinsic_to_market: Option<f64>,
    thresholds: &RiskFlagThresholds,
    periods_per_year: u32,
) -> BTreeSet<RiskFlag> {
    let mut flags = BTreeSet::new();
    let closes = series_data.closes();
    let returns = series::defined(&series::simple_returns(&closes));

    if let Some(vol) = series::volatility(&returns, true, periods_per_year) {
        if vol > thresholds.high_volatility {
            flags.insert(RiskFlag::HighVolatility);
        }
    }
    if series::max_drawdown(&closes) < thresholds.deep_drawdown {
        flags.insert(RiskFlag::DeepDrawdown);
    }

    let volumes = series_data.volumes();
    if !volumes.is_empty() {
        let mut volume_data = Data::new(volumes);
        if volume_data.median() < thresholds.thin_liquidity_volume {
            flags.insert(RiskFlag::ThinLiquidity);
        }
    }

    if let Some(ratio) = intrinsic_to_market {
        if ratio < thresholds.valuation_stretched {
            flags.insert(RiskFlag::ValuationStretched);
        }
    }

    flags
}

/// Combines sub-scores into a composite under the configured weights.
pub struct SignalFusion {
    weights: FusionWeights,
}

impl SignalFusion {
    pub fn new(weights: FusionWeights) -> Self {
        Self { weights }
    }

    fn weight_for(&self, name: SubScoreName) -> f64 {
        match name {
            SubScoreName::Fundamental => self.weights.fundamental,
            SubScoreName::Technical => self.weights.technical,
            SubScoreName::Sentiment => self.weights.sentiment,
            SubScoreName::Momentum => self.weights.momentum,
            SubScoreName::Risk => self.weights.risk,
        }
    }

    /// Weighted composite over the present sub-scores. Weights renormalize
    /// over what is present; risk enters inverted. Confidence is
    /// min(sub-confidences) x presence fraction, capped when fundamental or
    /// sentiment is absent.
    pub fn fuse(
        &self,
        sub_scores: &[SubScore],
        flags: BTreeSet<RiskFlag>,
    ) -> Result<CompositeScore, CoreError> {
        let w = self.weights.as_array();
        if w.iter().any(|x| *x < 0.0 || !x.is_finite()) || w.iter().sum::<f64>() <= 0.0 {
            return Err(CoreError::ConfigurationError(
                "fusion weights must be non-negative and sum to a positive value".into(),
            ));
        }
        if sub_scores.is_empty() {
            return Err(CoreError::InsufficientData(
                "no sub-scores to fuse".into(),
            ));
        }

        let mut seen: BTreeSet<SubScoreName> = BTreeSet::new();
        for sub in sub_scores {
            if !seen.insert(sub.name) {
                return Err(CoreError::InvalidInput(format!(
                    "duplicate sub-score: {}",
                    sub.name
                )));
            }
        }

        let weight_sum: f64 = sub_scores.iter().map(|s| self.weight_for(s.name)).sum();
        if weight_sum <= 0.0 {
            return Err(CoreError::ConfigurationError(
                "present sub-scores carry zero total weight".into(),
            ));
        }

        let mut score = 0.0;
        let mut contributions: BTreeMap<SubScoreName, f64> = BTreeMap::new();
        let mut min_confidence = f64::INFINITY;
        for sub in sub_scores {
            let weight = self.weight_for(sub.name) / weight_sum;
            let value = match sub.name {
                SubScoreName::Risk => 1.0 - sub.value,
                _ => sub.value,
            };
            let contribution = weight * value;
            score += contribution;
            contributions.insert(sub.name, contribution);
            min_confidence = min_confidence.min(sub.confidence);
        }

        let presence = seen.len() as f64 / 5.0;
        let mut confidence = min_confidence * presence;

        let has_fundamental = seen.contains(&SubScoreName::Fundamental);
        let has_sentiment = seen.contains(&SubScoreName::Sentiment);
        if !has_fundamental && !has_sentiment {
            confidence = confidence.min(0.4);
        } else if !has_fundamental || !has_sentiment {
            confidence = confidence.min(0.6);
        }

        let composite = CompositeScore {
            score: score.clamp(0.0, 1.0),
            confidence: confidence.clamp(0.0, 1.0),
            contributions,
            risk_flags: flags,
        };
        tracing::debug!(
            score = composite.score,
            confidence = composite.confidence,
            flags = composite.risk_flags.len(),
            "fused composite"
        );
        Ok(composite)
    }
}
