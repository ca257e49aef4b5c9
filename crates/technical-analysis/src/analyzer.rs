use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use intel_core::config::IndicatorParams;
use intel_core::error::CoreError;
use intel_core::types::{IndicatorSignal, Series, SubScore, SubScoreName};

use crate::indicators::*;

/// Indicator identity. Declaration order doubles as the tie-break priority
/// for equal votes: MACD > RSI > Bollinger > Stochastic > MA-cross, with the
/// volume and level studies after those.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndicatorKind {
    Macd,
    Rsi,
    Bollinger,
    Stochastic,
    MaCross,
    Obv,
    Vwap,
    SupportResistance,
}

/// Everything computed for one symbol at one as-of date: full indicator
/// series (aligned, `None` during warm-up), the discrete signal per
/// indicator, and the values the downstream layers consume.
pub struct IndicatorBundle {
    pub symbol: String,
    pub as_of: NaiveDate,
    pub close: f64,
    pub sma_short: Vec<Option<f64>>,
    pub sma_long: Vec<Option<f64>>,
    pub ema_short: Vec<Option<f64>>,
    pub ema_long: Vec<Option<f64>>,
    pub rsi: Vec<Option<f64>>,
    pub macd: MacdOutput,
    pub bollinger: BollingerOutput,
    pub stochastic: StochasticOutput,
    pub atr: Vec<Option<f64>>,
    pub obv: Vec<Option<f64>>,
    pub vwap: Vec<Option<f64>>,
    pub support_resistance: SupportResistance,
    pub signals: BTreeMap<IndicatorKind, IndicatorSignal>,
}

impl IndicatorBundle {
    pub fn latest_atr(&self) -> Option<f64> {
        self.atr.last().copied().flatten()
    }

    pub fn latest_rsi(&self) -> Option<f64> {
        self.rsi.last().copied().flatten()
    }
}

fn last_defined(xs: &[Option<f64>]) -> Option<f64> {
    xs.last().copied().flatten()
}

/// The last `N` values when they are all defined and contiguous at the tail.
fn tail<const N: usize>(xs: &[Option<f64>]) -> Option<[f64; N]> {
    if xs.len() < N {
        return None;
    }
    let mut out = [0.0; N];
    for (i, slot) in xs[xs.len() - N..].iter().enumerate() {
        out[i] = (*slot)?;
    }
    Some(out)
}

/// Computes the indicator bundle and the technical sub-score for a series.
pub struct TechnicalAnalyzer {
    params: IndicatorParams,
}

impl TechnicalAnalyzer {
    pub fn new(params: IndicatorParams) -> Self {
        Self { params }
    }

    /// Compute every indicator and its discrete signal as of the last bar.
    pub fn compute_bundle(&self, series: &Series) -> Result<IndicatorBundle, CoreError> {
        let last = series.last().ok_or_else(|| {
            CoreError::InsufficientData(format!("empty series for {}", series.symbol()))
        })?;
        let bars = series.bars();
        let closes = series.closes();
        let p = &self.params;

        let sma_short = sma(&closes, p.sma_short);
        let sma_long = sma(&closes, p.sma_long);
        let ema_short = ema(&closes, p.sma_short);
        let ema_long = ema(&closes, p.sma_long);
        let rsi_series = rsi(&closes, p.rsi_period);
        let macd_out = macd(&closes, p.macd_fast, p.macd_slow, p.macd_signal);
        let bb = bollinger(&closes, p.bb_period, p.bb_std);
        let stoch = stochastic(bars, p.stoch_k, p.stoch_d);
        let atr_series = atr(bars, p.atr_period);
        let obv_series = obv(bars);
        let vwap_series = vwap(bars);
        let sr = support_resistance(bars, p.sr_window, p.sr_tolerance);

        let close = last.close;
        let mut signals = BTreeMap::new();
        signals.insert(IndicatorKind::Macd, macd_signal(&macd_out));
        signals.insert(IndicatorKind::Rsi, rsi_signal(last_defined(&rsi_series)));
        signals.insert(
            IndicatorKind::Bollinger,
            bollinger_signal(close, last_defined(&bb.upper), last_defined(&bb.lower)),
        );
        signals.insert(
            IndicatorKind::Stochastic,
            stochastic_signal(last_defined(&stoch.k)),
        );
        signals.insert(
            IndicatorKind::MaCross,
            ma_cross_signal(&sma_short, &sma_long),
        );
        signals.insert(
            IndicatorKind::Obv,
            obv_signal(&obv_series, &closes),
        );
        signals.insert(
            IndicatorKind::Vwap,
            vwap_signal(close, last_defined(&vwap_series)),
        );
        signals.insert(
            IndicatorKind::SupportResistance,
            level_signal(close, sr.support, sr.resistance),
        );

        Ok(IndicatorBundle {
            symbol: series.symbol().to_string(),
            as_of: last.timestamp,
            close,
            sma_short,
            sma_long,
            ema_short,
            ema_long,
            rsi: rsi_series,
            macd: macd_out,
            bollinger: bb,
            stochastic: stoch,
            atr: atr_series,
            obv: obv_series,
            vwap: vwap_series,
            support_resistance: sr,
            signals,
        })
    }

    /// Technical sub-score: `0.5 + 0.5 * (buy - sell) / total` over the
    /// discrete signals, with a data-depth confidence.
    pub fn sub_score(&self, bundle: &IndicatorBundle) -> SubScore {
        let total = bundle.signals.len();
        let buys = bundle
            .signals
            .values()
            .filter(|s| s.is_buy_leaning())
            .count();
        let sells = bundle
            .signals
            .values()
            .filter(|s| s.is_sell_leaning())
            .count();

        let value = if total == 0 {
            0.5
        } else {
            0.5 + 0.5 * (buys as f64 - sells as f64) / total as f64
        };

        let defined = [
            last_defined(&bundle.sma_long).is_some(),
            last_defined(&bundle.rsi).is_some(),
            last_defined(&bundle.macd.histogram).is_some(),
            last_defined(&bundle.bollinger.upper).is_some(),
            last_defined(&bundle.stochastic.d).is_some(),
            last_defined(&bundle.obv).is_some(),
            last_defined(&bundle.vwap).is_some(),
            !bundle.support_resistance.levels.is_empty(),
        ];
        let confidence = defined.iter().filter(|d| **d).count() as f64 / defined.len() as f64;

        let directional: Vec<String> = bundle
            .signals
            .iter()
            .filter(|(_, s)| !matches!(s, IndicatorSignal::Hold))
            .map(|(k, s)| format!("{:?} {:?}", k, s).to_lowercase())
            .collect();
        let rationale = if directional.is_empty() {
            "no directional indicator signals".to_string()
        } else {
            directional.join(", ")
        };

        SubScore::new(SubScoreName::Technical, value, confidence, rationale)
    }

    /// Headline signal for the bundle: majority of buy vs sell votes, with
    /// the declared indicator priority breaking exact ties.
    pub fn headline_signal(&self, bundle: &IndicatorBundle) -> IndicatorSignal {
        let buys = bundle
            .signals
            .values()
            .filter(|s| s.is_buy_leaning())
            .count();
        let sells = bundle
            .signals
            .values()
            .filter(|s| s.is_sell_leaning())
            .count();

        if buys > sells {
            if bundle
                .signals
                .values()
                .any(|s| matches!(s, IndicatorSignal::StrongBuy))
            {
                IndicatorSignal::StrongBuy
            } else {
                IndicatorSignal::Buy
            }
        } else if sells > buys {
            if bundle
                .signals
                .values()
                .any(|s| matches!(s, IndicatorSignal::StrongSell))
            {
                IndicatorSignal::StrongSell
            } else {
                IndicatorSignal::Sell
            }
        } else {
            // BTreeMap iterates in priority order.
            bundle
                .signals
                .values()
                .find(|s| !matches!(s, IndicatorSignal::Hold))
                .copied()
                .unwrap_or(IndicatorSignal::Hold)
        }
    }
}

fn rsi_signal(latest: Option<f64>) -> IndicatorSignal {
    match latest {
        Some(v) if v <= 20.0 => IndicatorSignal::StrongBuy,
        Some(v) if v <= 30.0 => IndicatorSignal::Buy,
        Some(v) if v >= 80.0 => IndicatorSignal::StrongSell,
        Some(v) if v >= 70.0 => IndicatorSignal::Sell,
        _ => IndicatorSignal::Hold,
    }
}

fn macd_signal(out: &MacdOutput) -> IndicatorSignal {
    let Some([h2, h1, h0]) = tail::<3>(&out.histogram) else {
        // Fall back to a plain two-point cross when only two values exist.
        if let Some([prev, now]) = tail::<2>(&out.histogram) {
            if now > 0.0 && prev <= 0.0 {
                return IndicatorSignal::Buy;
            }
            if now < 0.0 && prev >= 0.0 {
                return IndicatorSignal::Sell;
            }
        }
        return IndicatorSignal::Hold;
    };

    if h0 > 0.0 && h1 <= 0.0 {
        // Line crossed above signal; strong when the histogram accelerates.
        if h0 - h1 > h1 - h2 {
            IndicatorSignal::StrongBuy
        } else {
            IndicatorSignal::Buy
        }
    } else if h0 < 0.0 && h1 >= 0.0 {
        if h0 - h1 < h1 - h2 {
            IndicatorSignal::StrongSell
        } else {
            IndicatorSignal::Sell
        }
    } else {
        IndicatorSignal::Hold
    }
}

fn bollinger_signal(close: f64, upper: Option<f64>, lower: Option<f64>) -> IndicatorSignal {
    match (upper, lower) {
        (Some(u), Some(l)) => {
            if close < l {
                IndicatorSignal::Buy
            } else if close > u {
                IndicatorSignal::Sell
            } else {
                IndicatorSignal::Hold
            }
        }
        _ => IndicatorSignal::Hold,
    }
}

fn stochastic_signal(latest_k: Option<f64>) -> IndicatorSignal {
    match latest_k {
        Some(k) if k < 20.0 => IndicatorSignal::Buy,
        Some(k) if k > 80.0 => IndicatorSignal::Sell,
        _ => IndicatorSignal::Hold,
    }
}

fn ma_cross_signal(short: &[Option<f64>], long: &[Option<f64>]) -> IndicatorSignal {
    let (Some([s1, s0]), Some([l1, l0])) = (tail::<2>(short), tail::<2>(long)) else {
        return IndicatorSignal::Hold;
    };
    if s0 > l0 && s1 <= l1 {
        IndicatorSignal::Buy
    } else if s0 < l0 && s1 >= l1 {
        IndicatorSignal::Sell
    } else {
        IndicatorSignal::Hold
    }
}

const OBV_LOOKBACK: usize = 20;

/// OBV divergence against price over a short lookback: volume flow fighting
/// the price trend leans the other way.
fn obv_signal(obv: &[Option<f64>], closes: &[f64]) -> IndicatorSignal {
    if obv.len() < OBV_LOOKBACK + 1 || closes.len() < OBV_LOOKBACK + 1 {
        return IndicatorSignal::Hold;
    }
    let (Some(now), Some(then)) = (
        obv[obv.len() - 1],
        obv[obv.len() - 1 - OBV_LOOKBACK],
    ) else {
        return IndicatorSignal::Hold;
    };
    let obv_change = now - then;
    let price_change = closes[closes.len() - 1] - closes[closes.len() - 1 - OBV_LOOKBACK];
    if price_change > 0.0 && obv_change < 0.0 {
        IndicatorSignal::Sell
    } else if price_change < 0.0 && obv_change > 0.0 {
        IndicatorSignal::Buy
    } else {
        IndicatorSignal::Hold
    }
}

fn vwap_signal(close: f64, latest_vwap: Option<f64>) -> IndicatorSignal {
    match latest_vwap {
        Some(v) if close > v => IndicatorSignal::Buy,
        Some(v) if close < v => IndicatorSignal::Sell,
        _ => IndicatorSignal::Hold,
    }
}

const LEVEL_PROXIMITY: f64 = 0.02;

fn level_signal(close: f64, support: Option<f64>, resistance: Option<f64>) -> IndicatorSignal {
    if close <= 0.0 {
        return IndicatorSignal::Hold;
    }
    let near_support = support
        .map(|s| (close - s) / close < LEVEL_PROXIMITY)
        .unwrap_or(false);
    let near_resistance = resistance
        .map(|r| (r - close) / close < LEVEL_PROXIMITY)
        .unwrap_or(false);
    match (near_support, near_resistance) {
        (true, false) => IndicatorSignal::Buy,
        (false, true) => IndicatorSignal::Sell,
        _ => IndicatorSignal::Hold,
    }
}
