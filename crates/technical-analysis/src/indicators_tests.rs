use chrono::NaiveDate;

use crate::indicators::*;
use intel_core::types::Bar;

fn day(i: usize) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, 1).unwrap() + chrono::Duration::days(i as i64)
}

// Helper: bars with a fixed range around each close.
fn bars_from_closes(closes: &[f64]) -> Vec<Bar> {
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| Bar {
            timestamp: day(i),
            open: close,
            high: close + 1.0,
            low: close - 1.0,
            close,
            volume: 1_000_000.0,
        })
        .collect()
}

fn sample_prices() -> Vec<f64> {
    vec![
        44.34, 44.09, 44.15, 43.61, 44.33, 44.83, 45.10, 45.42, 45.84, 46.08, 45.89, 46.03, 45.61,
        46.28, 46.28, 46.00, 46.03, 46.41, 46.22, 45.64,
    ]
}

#[test]
fn sma_warm_up_and_values() {
    let data = vec![1.0, 2.0, 3.0, 4.0, 5.0];
    let result = sma(&data, 3);
    assert_eq!(result.len(), data.len());
    assert_eq!(result[0], None);
    assert_eq!(result[1], None);
    assert!((result[2].unwrap() - 2.0).abs() < 1e-12);
    assert!((result[4].unwrap() - 4.0).abs() < 1e-12);
}

#[test]
fn sma_insufficient_data_stays_undefined() {
    let result = sma(&[1.0, 2.0], 5);
    assert!(result.iter().all(|v| v.is_none()));
}

#[test]
fn ema_seeds_with_sma() {
    let data = vec![22.0, 24.0, 23.0, 25.0, 26.0];
    let result = ema(&data, 3);
    assert_eq!(result[0], None);
    assert_eq!(result[1], None);
    let seed = (22.0 + 24.0 + 23.0) / 3.0;
    assert!((result[2].unwrap() - seed).abs() < 1e-12);
    // alpha = 0.5 for period 3
    assert!((result[3].unwrap() - (0.5 * 25.0 + 0.5 * seed)).abs() < 1e-12);
}

#[test]
fn ema_tracks_an_uptrend() {
    let data: Vec<f64> = (1..=10).map(|i| i as f64).collect();
    let result = ema(&data, 3);
    let values: Vec<f64> = result.iter().flatten().copied().collect();
    for pair in values.windows(2) {
        assert!(pair[1] > pair[0]);
    }
}

// S1: RSI on a monotone +1/day series is exactly 100 once defined.
#[test]
fn rsi_monotone_series_is_100() {
    let closes: Vec<f64> = (0..15).map(|i| 100.0 + i as f64).collect();
    let result = rsi(&closes, 14);
    for value in &result[..14] {
        assert_eq!(*value, None);
    }
    assert_eq!(result[14], Some(100.0));
}

#[test]
fn rsi_constant_series_is_undefined() {
    let closes = vec![100.0; 30];
    let result = rsi(&closes, 14);
    assert!(result.iter().all(|v| v.is_none()));
}

#[test]
fn rsi_stays_in_band() {
    let result = rsi(&sample_prices(), 14);
    for value in result.iter().flatten() {
        assert!((0.0..=100.0).contains(value));
    }
}

// S2: symmetric 30-up/30-down trend; the histogram flips sign exactly once,
// within three days of the break.
#[test]
fn macd_histogram_flips_once_at_trend_break() {
    let mut closes: Vec<f64> = (0..30).map(|i| 100.0 + i as f64).collect();
    for i in 0..30 {
        closes.push(129.0 - (i + 1) as f64);
    }
    let result = macd(&closes, 12, 26, 9);

    let defined: Vec<(usize, f64)> = result
        .histogram
        .iter()
        .enumerate()
        .filter_map(|(i, h)| h.map(|h| (i, h)))
        .collect();
    assert!(!defined.is_empty());

    let mut flips = Vec::new();
    for pair in defined.windows(2) {
        if (pair[0].1 > 0.0) != (pair[1].1 > 0.0) {
            flips.push(pair[1].0);
        }
    }
    assert_eq!(flips.len(), 1, "expected one sign change, got {:?}", flips);
    let flip = flips[0] as i64;
    assert!((flip - 30).abs() <= 3, "flip at {} outside break window", flip);
}

#[test]
fn macd_histogram_is_line_minus_signal() {
    let closes: Vec<f64> = (0..60).map(|i| 100.0 + (i as f64 * 0.7).sin() * 5.0).collect();
    let result = macd(&closes, 12, 26, 9);
    for i in 0..closes.len() {
        if let (Some(l), Some(s), Some(h)) = (result.line[i], result.signal[i], result.histogram[i])
        {
            assert!((h - (l - s)).abs() < 1e-12);
        }
    }
}

#[test]
fn bollinger_band_ordering() {
    let result = bollinger(&sample_prices(), 10, 2.0);
    for i in 0..result.upper.len() {
        if let (Some(u), Some(m), Some(l)) = (result.upper[i], result.middle[i], result.lower[i]) {
            assert!(u >= m && m >= l);
        }
    }
}

#[test]
fn bollinger_constant_series_collapses() {
    let result = bollinger(&vec![100.0; 25], 20, 2.0);
    assert_eq!(result.upper[19], Some(100.0));
    assert_eq!(result.lower[19], Some(100.0));
}

#[test]
fn stochastic_warm_up_and_range() {
    let bars = bars_from_closes(&sample_prices());
    let result = stochastic(&bars, 14, 3);
    for value in &result.k[..13] {
        assert_eq!(*value, None);
    }
    assert!(result.k[13].is_some());
    for value in result.k.iter().flatten() {
        assert!((0.0..=100.0).contains(value));
    }
    // %D needs d_period defined %K values.
    assert_eq!(result.d[14], None);
    assert!(result.d[15].is_some());
}

#[test]
fn atr_warm_up_and_positivity() {
    let closes: Vec<f64> = (0..20).map(|i| 100.0 + i as f64).collect();
    let bars = bars_from_closes(&closes);
    let result = atr(&bars, 14);
    for value in &result[..14] {
        assert_eq!(*value, None);
    }
    for value in result.iter().flatten() {
        assert!(*value > 0.0);
    }
}

#[test]
fn obv_accumulates_signed_volume() {
    let closes = vec![10.0, 11.0, 10.5, 10.5, 12.0];
    let bars = bars_from_closes(&closes);
    let result = obv(&bars);
    assert_eq!(result[0], None);
    assert_eq!(result[1], Some(1_000_000.0));
    assert_eq!(result[2], Some(0.0));
    // Flat close leaves OBV unchanged.
    assert_eq!(result[3], Some(0.0));
    assert_eq!(result[4], Some(1_000_000.0));
}

#[test]
fn obv_ignores_zero_volume_days() {
    let closes = vec![10.0, 11.0, 12.0];
    let mut bars = bars_from_closes(&closes);
    bars[2].volume = 0.0;
    let result = obv(&bars);
    assert_eq!(result[1], result[2]);
}

#[test]
fn vwap_zero_volume_falls_back_to_previous() {
    let closes = vec![10.0, 11.0, 12.0];
    let mut bars = bars_from_closes(&closes);
    bars[2].volume = 0.0;
    let result = vwap(&bars);
    assert_eq!(result[1], result[2]);
}

#[test]
fn vwap_undefined_until_volume_arrives() {
    let closes = vec![10.0, 11.0];
    let mut bars = bars_from_closes(&closes);
    bars[0].volume = 0.0;
    let result = vwap(&bars);
    assert_eq!(result[0], None);
    assert!(result[1].is_some());
}

#[test]
fn vwap_stays_inside_session_range() {
    let bars = bars_from_closes(&sample_prices());
    let low = bars.iter().map(|b| b.low).fold(f64::INFINITY, f64::min);
    let high = bars.iter().map(|b| b.high).fold(f64::NEG_INFINITY, f64::max);
    for value in vwap(&bars).iter().flatten() {
        assert!((low..=high).contains(value));
    }
}

#[test]
fn support_resistance_brackets_the_close() {
    // V-bottom at 91, peak at 112, finish at 100.
    let mut closes: Vec<f64> = Vec::new();
    for i in 0..10 {
        closes.push(100.0 - i as f64); // down to 91
    }
    for i in 0..21 {
        closes.push(92.0 + i as f64); // up to 112
    }
    for i in 0..12 {
        closes.push(111.0 - i as f64); // back down to 100
    }
    let bars = bars_from_closes(&closes);
    let result = support_resistance(&bars, 5, 0.01);
    let close = closes[closes.len() - 1];
    if let Some(s) = result.support {
        assert!(s < close);
    }
    if let Some(r) = result.resistance {
        assert!(r > close);
    }
    assert!(!result.levels.is_empty());
}

#[test]
fn support_resistance_needs_full_window() {
    let bars = bars_from_closes(&[1.0, 2.0, 3.0]);
    let result = support_resistance(&bars, 5, 0.01);
    assert!(result.support.is_none() && result.resistance.is_none());
}
