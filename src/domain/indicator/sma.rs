//! Simple moving average and mean absolute deviation.

use super::{rolling, Series};

/// Arithmetic mean of the last `period` values. Warmup: first `period - 1` are undefined.
pub fn sma(values: &[f64], period: usize) -> Series {
    rolling(values, period, |w| w.iter().sum::<f64>() / w.len() as f64)
}

/// Mean absolute deviation from the rolling mean.
pub fn avedev(values: &[f64], period: usize) -> Series {
    rolling(values, period, |w| {
        let mean = w.iter().sum::<f64>() / w.len() as f64;
        w.iter().map(|v| (v - mean).abs()).sum::<f64>() / w.len() as f64
    })
}
