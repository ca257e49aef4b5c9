//! Indicator calculators. Every function returns a vector aligned to its
//! input length, with `None` at positions still inside the warm-up window.

use intel_core::types::Bar;

/// Simple Moving Average, defined from index `period - 1`.
pub fn sma(data: &[f64], period: usize) -> Vec<Option<f64>> {
    let mut out = vec![None; data.len()];
    if period == 0 {
        return out;
    }
    let mut sum = 0.0;
    for i in 0..data.len() {
        sum += data[i];
        if i >= period {
            sum -= data[i - period];
        }
        if i + 1 >= period {
            out[i] = Some(sum / period as f64);
        }
    }
    out
}

/// Exponential Moving Average, seeded with SMA(period) at index `period - 1`,
/// smoothing factor `alpha = 2 / (period + 1)`.
pub fn ema(data: &[f64], period: usize) -> Vec<Option<f64>> {
    let mut out = vec![None; data.len()];
    if period == 0 || data.len() < period {
        return out;
    }
    let alpha = 2.0 / (period as f64 + 1.0);
    let mut value = data[..period].iter().sum::<f64>() / period as f64;
    out[period - 1] = Some(value);
    for i in period..data.len() {
        value = alpha * data[i] + (1.0 - alpha) * value;
        out[i] = Some(value);
    }
    out
}

fn rsi_value(avg_gain: f64, avg_loss: f64) -> Option<f64> {
    // No movement at all in the window: RSI is undefined, not 50.
    if avg_gain == 0.0 && avg_loss == 0.0 {
        return None;
    }
    if avg_loss == 0.0 {
        return Some(100.0);
    }
    let rs = avg_gain / avg_loss;
    Some(100.0 - 100.0 / (1.0 + rs))
}

/// Relative Strength Index with Wilder's smoothing, defined from index
/// `period`.
pub fn rsi(data: &[f64], period: usize) -> Vec<Option<f64>> {
    let mut out = vec![None; data.len()];
    if period == 0 || data.len() < period + 1 {
        return out;
    }

    let mut gains = 0.0;
    let mut losses = 0.0;
    for i in 1..=period {
        let change = data[i] - data[i - 1];
        if change > 0.0 {
            gains += change;
        } else {
            losses -= change;
        }
    }
    let mut avg_gain = gains / period as f64;
    let mut avg_loss = losses / period as f64;
    out[period] = rsi_value(avg_gain, avg_loss);

    for i in period + 1..data.len() {
        let change = data[i] - data[i - 1];
        let (gain, loss) = if change > 0.0 {
            (change, 0.0)
        } else {
            (0.0, -change)
        };
        avg_gain = (avg_gain * (period - 1) as f64 + gain) / period as f64;
        avg_loss = (avg_loss * (period - 1) as f64 + loss) / period as f64;
        out[i] = rsi_value(avg_gain, avg_loss);
    }
    out
}

/// MACD line, signal line, and histogram, all aligned to the input.
pub struct MacdOutput {
    pub line: Vec<Option<f64>>,
    pub signal: Vec<Option<f64>>,
    pub histogram: Vec<Option<f64>>,
}

pub fn macd(data: &[f64], fast: usize, slow: usize, signal_period: usize) -> MacdOutput {
    let n = data.len();
    let empty = MacdOutput {
        line: vec![None; n],
        signal: vec![None; n],
        histogram: vec![None; n],
    };
    if fast == 0 || slow == 0 || signal_period == 0 || slow <= fast {
        return empty;
    }

    let ema_fast = ema(data, fast);
    let ema_slow = ema(data, slow);
    let mut line = vec![None; n];
    for i in 0..n {
        if let (Some(f), Some(s)) = (ema_fast[i], ema_slow[i]) {
            line[i] = Some(f - s);
        }
    }

    // Signal = EMA(signal_period) over the defined stretch of the line. The
    // SMA seed backfills the first signal_period slots so the signal (and
    // histogram) spans the whole line.
    let line_start = slow.saturating_sub(1);
    let line_values: Vec<f64> = line[line_start.min(n)..].iter().flatten().copied().collect();

    let mut signal = vec![None; n];
    let mut histogram = vec![None; n];
    if line_values.len() >= signal_period {
        let alpha = 2.0 / (signal_period as f64 + 1.0);
        let seed = line_values[..signal_period].iter().sum::<f64>() / signal_period as f64;
        let mut value = seed;
        for (j, line_value) in line_values.iter().enumerate() {
            if j >= signal_period {
                value = alpha * line_value + (1.0 - alpha) * value;
            }
            let i = line_start + j;
            signal[i] = Some(value);
            histogram[i] = Some(line_value - value);
        }
    }

    MacdOutput {
        line,
        signal,
        histogram,
    }
}

/// Bollinger Bands: SMA(period) middle, upper/lower at `std_mult` population
/// standard deviations.
pub struct BollingerOutput {
    pub upper: Vec<Option<f64>>,
    pub middle: Vec<Option<f64>>,
    pub lower: Vec<Option<f64>>,
}

pub fn bollinger(data: &[f64], period: usize, std_mult: f64) -> BollingerOutput {
    let n = data.len();
    let mut out = BollingerOutput {
        upper: vec![None; n],
        middle: vec![None; n],
        lower: vec![None; n],
    };
    if period == 0 {
        return out;
    }
    for i in 0..n {
        if i + 1 < period {
            continue;
        }
        let window = &data[i + 1 - period..=i];
        let mean = window.iter().sum::<f64>() / period as f64;
        let variance = window.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / period as f64;
        let std = variance.sqrt();
        out.middle[i] = Some(mean);
        out.upper[i] = Some(mean + std_mult * std);
        out.lower[i] = Some(mean - std_mult * std);
    }
    out
}

/// Stochastic oscillator: raw %K over `k_period`, %D = SMA(d_period) of %K.
pub struct StochasticOutput {
    pub k: Vec<Option<f64>>,
    pub d: Vec<Option<f64>>,
}

pub fn stochastic(bars: &[Bar], k_period: usize, d_period: usize) -> StochasticOutput {
    let n = bars.len();
    let mut out = StochasticOutput {
        k: vec![None; n],
        d: vec![None; n],
    };
    if k_period == 0 || d_period == 0 {
        return out;
    }

    for i in 0..n {
        if i + 1 < k_period {
            continue;
        }
        let window = &bars[i + 1 - k_period..=i];
        let highest = window.iter().map(|b| b.high).fold(f64::NEG_INFINITY, f64::max);
        let lowest = window.iter().map(|b| b.low).fold(f64::INFINITY, f64::min);
        out.k[i] = if highest == lowest {
            // Degenerate flat range: price sits mid-band.
            Some(50.0)
        } else {
            Some(100.0 * (bars[i].close - lowest) / (highest - lowest))
        };
    }

    let k_start = k_period - 1;
    if n > k_start {
        let k_values: Vec<f64> = out.k[k_start..].iter().flatten().copied().collect();
        let d_inner = sma(&k_values, d_period);
        for (j, value) in d_inner.iter().enumerate() {
            out.d[k_start + j] = *value;
        }
    }
    out
}

/// Average True Range with Wilder smoothing, defined from index `period`.
pub fn atr(bars: &[Bar], period: usize) -> Vec<Option<f64>> {
    let n = bars.len();
    let mut out = vec![None; n];
    if period == 0 || n < period + 1 {
        return out;
    }

    let mut true_ranges = Vec::with_capacity(n - 1);
    for i in 1..n {
        let high_low = bars[i].high - bars[i].low;
        let high_close = (bars[i].high - bars[i - 1].close).abs();
        let low_close = (bars[i].low - bars[i - 1].close).abs();
        true_ranges.push(high_low.max(high_close).max(low_close));
    }

    let mut value = true_ranges[..period].iter().sum::<f64>() / period as f64;
    out[period] = Some(value);
    for (j, tr) in true_ranges.iter().enumerate().skip(period) {
        value = (value * (period - 1) as f64 + tr) / period as f64;
        out[j + 1] = Some(value);
    }
    out
}

/// On-Balance Volume: cumulative signed volume from the first
/// close-over-close comparison. Flat closes and zero-volume days leave it
/// unchanged.
pub fn obv(bars: &[Bar]) -> Vec<Option<f64>> {
    let mut out = vec![None; bars.len()];
    let mut cumulative = 0.0;
    for i in 1..bars.len() {
        if bars[i].close > bars[i - 1].close {
            cumulative += bars[i].volume;
        } else if bars[i].close < bars[i - 1].close {
            cumulative -= bars[i].volume;
        }
        out[i] = Some(cumulative);
    }
    out
}

/// Running Volume-Weighted Average Price over the supplied session. While
/// cumulative volume is zero the value falls back to the previous one.
pub fn vwap(bars: &[Bar]) -> Vec<Option<f64>> {
    let mut out = vec![None; bars.len()];
    let mut cumulative_tpv = 0.0;
    let mut cumulative_volume = 0.0;
    for (i, bar) in bars.iter().enumerate() {
        cumulative_tpv += bar.typical_price() * bar.volume;
        cumulative_volume += bar.volume;
        out[i] = if cumulative_volume > 0.0 {
            Some(cumulative_tpv / cumulative_volume)
        } else if i > 0 {
            out[i - 1]
        } else {
            None
        };
    }
    out
}

/// Clustered support and resistance levels from local extrema.
pub struct SupportResistance {
    /// Highest clustered level below the last close.
    pub support: Option<f64>,
    /// Lowest clustered level above the last close.
    pub resistance: Option<f64>,
    /// All clustered levels, ascending.
    pub levels: Vec<f64>,
}

/// Swing highs/lows confirmed by `window` bars on each side, clustered
/// within relative `tolerance`.
pub fn support_resistance(bars: &[Bar], window: usize, tolerance: f64) -> SupportResistance {
    let empty = SupportResistance {
        support: None,
        resistance: None,
        levels: Vec::new(),
    };
    if window == 0 || bars.len() < 2 * window + 1 {
        return empty;
    }

    let mut raw: Vec<f64> = Vec::new();
    for i in window..bars.len() - window {
        let left = &bars[i - window..i];
        let right = &bars[i + 1..=i + window];
        let is_high = left.iter().chain(right).all(|b| b.high < bars[i].high);
        let is_low = left.iter().chain(right).all(|b| b.low > bars[i].low);
        if is_high {
            raw.push(bars[i].high);
        }
        if is_low {
            raw.push(bars[i].low);
        }
    }
    if raw.is_empty() {
        return empty;
    }
    raw.sort_by(|a, b| a.partial_cmp(b).unwrap());

    // Merge runs of levels within relative tolerance into their mean.
    let mut levels: Vec<f64> = Vec::new();
    let mut cluster_sum = raw[0];
    let mut cluster_len = 1usize;
    let mut cluster_anchor = raw[0];
    for &level in &raw[1..] {
        if cluster_anchor > 0.0 && (level - cluster_anchor) / cluster_anchor <= tolerance {
            cluster_sum += level;
            cluster_len += 1;
        } else {
            levels.push(cluster_sum / cluster_len as f64);
            cluster_sum = level;
            cluster_len = 1;
            cluster_anchor = level;
        }
    }
    levels.push(cluster_sum / cluster_len as f64);

    let close = bars[bars.len() - 1].close;
    let support = levels.iter().rev().find(|&&l| l < close).copied();
    let resistance = levels.iter().find(|&&l| l > close).copied();

    SupportResistance {
        support,
        resistance,
        levels,
    }
}
