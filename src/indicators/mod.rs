//! Technical indicators
//!
//! Pure functions over ordered series. Every output has the same length as its
//! input and holds `NaN` wherever there is not enough history yet.

use crate::types::Candle;

/// Williams %R over `length` bars, in the range [-100, 0]
pub fn williams_r(candles: &[Candle], length: usize) -> Vec<f64> {
    let mut out = vec![f64::NAN; candles.len()];
    if length == 0 || candles.len() < length {
        return out;
    }

    for i in (length - 1)..candles.len() {
        let window = &candles[i + 1 - length..=i];
        let highest = window.iter().map(|c| c.high).fold(f64::NEG_INFINITY, f64::max);
        let lowest = window.iter().map(|c| c.low).fold(f64::INFINITY, f64::min);
        let range = highest - lowest;
        if range > 0.0 && range.is_finite() {
            out[i] = 100.0 * (candles[i].close - highest) / range;
        }
    }
    out
}

/// Exponential moving average seeded with the SMA of the first `length` values
///
/// Leading `NaN`s are skipped; the seed is taken from the first `length`
/// finite values after them.
pub fn ema(values: &[f64], length: usize) -> Vec<f64> {
    let mut out = vec![f64::NAN; values.len()];
    if length == 0 {
        return out;
    }

    let start = match values.iter().position(|v| !v.is_nan()) {
        Some(i) => i,
        None => return out,
    };
    if values.len() - start < length {
        return out;
    }

    let seed_end = start + length - 1;
    let seed = &values[start..=seed_end];
    if seed.iter().any(|v| v.is_nan()) {
        return out;
    }

    let alpha = 2.0 / (length as f64 + 1.0);
    let mut prev = seed.iter().sum::<f64>() / length as f64;
    out[seed_end] = prev;

    for i in (seed_end + 1)..values.len() {
        if values[i].is_nan() {
            continue;
        }
        prev = alpha * values[i] + (1.0 - alpha) * prev;
        out[i] = prev;
    }
    out
}

/// Relative Strength Index using Wilder's smoothing
pub fn rsi(closes: &[f64], length: usize) -> Vec<f64> {
    let mut out = vec![f64::NAN; closes.len()];
    if length == 0 || closes.len() <= length {
        return out;
    }

    let mut avg_gain = 0.0;
    let mut avg_loss = 0.0;
    for i in 1..=length {
        let change = closes[i] - closes[i - 1];
        if change > 0.0 {
            avg_gain += change;
        } else {
            avg_loss -= change;
        }
    }
    avg_gain /= length as f64;
    avg_loss /= length as f64;
    out[length] = rsi_value(avg_gain, avg_loss);

    let n = length as f64;
    for i in (length + 1)..closes.len() {
        let change = closes[i] - closes[i - 1];
        let (gain, loss) = if change > 0.0 { (change, 0.0) } else { (0.0, -change) };
        avg_gain = (avg_gain * (n - 1.0) + gain) / n;
        avg_loss = (avg_loss * (n - 1.0) + loss) / n;
        out[i] = rsi_value(avg_gain, avg_loss);
    }
    out
}

fn rsi_value(avg_gain: f64, avg_loss: f64) -> f64 {
    if avg_loss == 0.0 {
        if avg_gain == 0.0 {
            50.0
        } else {
            100.0
        }
    } else {
        100.0 - 100.0 / (1.0 + avg_gain / avg_loss)
    }
}

/// MACD line, signal line and histogram
#[derive(Debug, Clone, PartialEq)]
pub struct Macd {
    pub macd: Vec<f64>,
    pub signal: Vec<f64>,
    pub histogram: Vec<f64>,
}

pub fn macd(closes: &[f64], fast: usize, slow: usize, signal: usize) -> Macd {
    let fast_ema = ema(closes, fast);
    let slow_ema = ema(closes, slow);
    let line: Vec<f64> = fast_ema
        .iter()
        .zip(&slow_ema)
        .map(|(f, s)| f - s)
        .collect();
    let signal_line = ema(&line, signal);
    let histogram = line
        .iter()
        .zip(&signal_line)
        .map(|(m, s)| m - s)
        .collect();

    Macd {
        macd: line,
        signal: signal_line,
        histogram,
    }
}

/// Finite values only, order preserved
pub fn drop_nan(values: &[f64]) -> Vec<f64> {
    values.iter().copied().filter(|v| !v.is_nan()).collect()
}

/// Latest value of a series, `None` if empty or `NaN`
pub fn last_value(values: &[f64]) -> Option<f64> {
    values.last().copied().filter(|v| !v.is_nan())
}
