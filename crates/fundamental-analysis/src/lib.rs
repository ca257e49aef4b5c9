//! Fundamental scoring: valuation, balance-sheet health, profitability, and
//! growth component scores, a DCF intrinsic value, and their weighted
//! combination into the fundamental sub-score.

use serde::{Deserialize, Serialize};

use intel_core::config::{DcfParams, FundamentalThresholds, FundamentalWeights};
use intel_core::error::CoreError;
use intel_core::types::{FundamentalSnapshot, SubScore, SubScoreName};

/// Discrete balance-sheet quality grade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthGrade {
    Excellent,
    Good,
    Moderate,
    Poor,
}

/// Full output of one fundamental evaluation. Component scores are `None`
/// when every metric feeding them was absent.
#[derive(Debug, Clone)]
pub struct FundamentalAssessment {
    pub sub_score: SubScore,
    pub grade: HealthGrade,
    pub valuation: Option<f64>,
    pub health: Option<f64>,
    pub profitability: Option<f64>,
    pub growth: Option<f64>,
    /// DCF value per share; undefined without positive FCF and share count,
    /// or when discount <= terminal growth.
    pub intrinsic_value_per_share: Option<f64>,
    /// Intrinsic value over current price; the valuation-stretched flag and
    /// part of the valuation score.
    pub intrinsic_to_market: Option<f64>,
}

pub struct FundamentalAnalyzer {
    thresholds: FundamentalThresholds,
    weights: FundamentalWeights,
    dcf: DcfParams,
}

/// Lower-is-better band: 1 at or below `low`, 0 at or above `high`.
fn band_down(value: f64, low: f64, high: f64) -> f64 {
    if high <= low {
        return if value <= low { 1.0 } else { 0.0 };
    }
    ((high - value) / (high - low)).clamp(0.0, 1.0)
}

/// Higher-is-better band: 0 at or below `low`, 1 at or above `high`.
fn band_up(value: f64, low: f64, high: f64) -> f64 {
    if high <= low {
        return if value >= high { 1.0 } else { 0.0 };
    }
    ((value - low) / (high - low)).clamp(0.0, 1.0)
}

/// Progress toward a target, capped at 1. Non-positive values score 0.
fn target_ratio(value: f64, target: f64) -> f64 {
    if target <= 0.0 || value <= 0.0 {
        0.0
    } else {
        (value / target).min(1.0)
    }
}

/// Mean over the defined entries; `None` when all are absent (0 weight, not
/// 0 score).
fn mean_present(values: &[Option<f64>]) -> Option<f64> {
    let present: Vec<f64> = values.iter().flatten().copied().collect();
    if present.is_empty() {
        None
    } else {
        Some(present.iter().sum::<f64>() / present.len() as f64)
    }
}

impl FundamentalAnalyzer {
    pub fn new(
        thresholds: FundamentalThresholds,
        weights: FundamentalWeights,
        dcf: DcfParams,
    ) -> Self {
        Self {
            thresholds,
            weights,
            dcf,
        }
    }

    /// Score a snapshot. `current_price` feeds the intrinsic-to-market ratio;
    /// everything else comes from the snapshot alone.
    pub fn analyze(
        &self,
        snapshot: &FundamentalSnapshot,
        current_price: Option<f64>,
    ) -> Result<FundamentalAssessment, CoreError> {
        snapshot.validate()?;

        let intrinsic_value_per_share = self.intrinsic_per_share(snapshot);
        let intrinsic_to_market = match (intrinsic_value_per_share, current_price) {
            (Some(iv), Some(price)) if price > 0.0 => Some(iv / price),
            _ => None,
        };

        let valuation = self.valuation_score(snapshot, intrinsic_to_market);
        let health = self.health_score(snapshot);
        let profitability = self.profitability_score(snapshot);
        let growth = self.growth_score(snapshot);

        let components = [
            (valuation, self.weights.valuation),
            (health, self.weights.health),
            (profitability, self.weights.profitability),
            (growth, self.weights.growth),
        ];
        let mut weighted = 0.0;
        let mut weight_sum = 0.0;
        for (score, weight) in components {
            if let Some(score) = score {
                weighted += score * weight;
                weight_sum += weight;
            }
        }
        if weight_sum <= 0.0 {
            return Err(CoreError::InsufficientData(format!(
                "no fundamental metrics present for {}",
                snapshot.symbol
            )));
        }
        let score = weighted / weight_sum;
        let confidence = snapshot.present_fraction();

        let grade = if score >= 0.75 {
            HealthGrade::Excellent
        } else if score >= 0.55 {
            HealthGrade::Good
        } else if score >= 0.35 {
            HealthGrade::Moderate
        } else {
            HealthGrade::Poor
        };

        let mut parts: Vec<String> = Vec::new();
        if let Some(v) = valuation {
            parts.push(format!("valuation {:.2}", v));
        }
        if let Some(v) = health {
            parts.push(format!("health {:.2}", v));
        }
        if let Some(v) = profitability {
            parts.push(format!("profitability {:.2}", v));
        }
        if let Some(v) = growth {
            parts.push(format!("growth {:.2}", v));
        }
        if let Some(ratio) = intrinsic_to_market {
            parts.push(format!("intrinsic/market {:.2}", ratio));
        }
        let rationale = parts.join(", ");

        Ok(FundamentalAssessment {
            sub_score: SubScore::new(SubScoreName::Fundamental, score, confidence, rationale),
            grade,
            valuation,
            health,
            profitability,
            growth,
            intrinsic_value_per_share,
            intrinsic_to_market,
        })
    }

    /// Present value of `horizon_years` of projected FCF plus the terminal
    /// value. Undefined when `discount <= terminal_growth` or FCF is not a
    /// positive number.
    pub fn intrinsic_value(&self, fcf: f64) -> Option<f64> {
        let DcfParams {
            horizon_years,
            growth,
            terminal_growth,
            discount,
        } = self.dcf;
        if discount <= terminal_growth || fcf <= 0.0 {
            return None;
        }

        let mut value = 0.0;
        let mut projected = fcf;
        let mut discount_factor = 1.0;
        for _ in 0..horizon_years {
            projected *= 1.0 + growth;
            discount_factor *= 1.0 + discount;
            value += projected / discount_factor;
        }
        let terminal = projected * (1.0 + terminal_growth) / (discount - terminal_growth);
        value += terminal / discount_factor;
        Some(value)
    }

    fn intrinsic_per_share(&self, snapshot: &FundamentalSnapshot) -> Option<f64> {
        let fcf = snapshot.fcf?;
        let shares = snapshot.shares_outstanding?;
        if shares <= 0.0 {
            return None;
        }
        Some(self.intrinsic_value(fcf)? / shares)
    }

    fn valuation_score(
        &self,
        snapshot: &FundamentalSnapshot,
        intrinsic_to_market: Option<f64>,
    ) -> Option<f64> {
        let t = &self.thresholds;
        mean_present(&[
            snapshot.pe.map(|v| band_down(v, t.pe_low, t.pe_high)),
            snapshot.peg.map(|v| band_down(v, t.peg_low, t.peg_high)),
            snapshot.pb.map(|v| band_down(v, t.pb_low, t.pb_high)),
            snapshot
                .ev_ebitda
                .map(|v| band_down(v, t.ev_ebitda_low, t.ev_ebitda_high)),
            intrinsic_to_market.map(|r| band_up(r, 0.7, 1.3)),
        ])
    }

    fn health_score(&self, snapshot: &FundamentalSnapshot) -> Option<f64> {
        let t = &self.thresholds;
        mean_present(&[
            snapshot.de_ratio.map(|v| {
                if v < t.de_good {
                    1.0
                } else if v < t.de_moderate {
                    0.5
                } else {
                    0.0
                }
            }),
            snapshot
                .current_ratio
                .map(|v| if v > t.current_ratio_good { 1.0 } else { 0.0 }),
            snapshot
                .quick_ratio
                .map(|v| if v > t.quick_ratio_good { 1.0 } else { 0.0 }),
        ])
    }

    fn profitability_score(&self, snapshot: &FundamentalSnapshot) -> Option<f64> {
        let t = &self.thresholds;
        mean_present(&[
            snapshot.roe.map(|v| target_ratio(v, t.roe_target)),
            snapshot.roa.map(|v| target_ratio(v, t.roa_target)),
            snapshot.roic.map(|v| target_ratio(v, t.roic_target)),
            snapshot
                .gross_margin
                .map(|v| target_ratio(v, t.gross_margin_target)),
            snapshot
                .operating_margin
                .map(|v| target_ratio(v, t.operating_margin_target)),
            snapshot
                .net_margin
                .map(|v| target_ratio(v, t.net_margin_target)),
        ])
    }

    fn growth_score(&self, snapshot: &FundamentalSnapshot) -> Option<f64> {
        let k = self.thresholds.growth_k;
        let saturate = |g: f64| if g <= 0.0 { 0.0 } else { g / (g + k) };
        mean_present(&[
            snapshot.revenue_growth.map(saturate),
            snapshot.earnings_growth.map(saturate),
        ])
    }
}
