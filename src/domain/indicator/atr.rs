//! Average True Range.

use super::{rolling, Series};
use crate::domain::ohlcv::OhlcvBar;

pub const DEFAULT_PERIOD: usize = 14;

/// True range per bar; the first bar uses high - low.
pub fn true_ranges(bars: &[OhlcvBar]) -> Vec<f64> {
    bars.iter()
        .enumerate()
        .map(|(i, bar)| {
            if i == 0 {
                bar.high - bar.low
            } else {
                bar.true_range(bars[i - 1].close)
            }
        })
        .collect()
}

/// Wilder ATR: seeded with the mean of the first n true ranges, then
/// ATR = (prev * (n-1) + TR) / n. Warmup: first (n-1) values are undefined.
pub fn atr(bars: &[OhlcvBar], period: usize) -> Series {
    let mut out = vec![None; bars.len()];
    if period == 0 || bars.len() < period {
        return out;
    }

    let tr = true_ranges(bars);
    let mut prev = tr[..period].iter().sum::<f64>() / period as f64;
    out[period - 1] = Some(prev);
    for i in period..bars.len() {
        prev = (prev * (period - 1) as f64 + tr[i]) / period as f64;
        out[i] = Some(prev);
    }
    out
}

/// Plain rolling mean of true range.
pub fn atr_simple(bars: &[OhlcvBar], period: usize) -> Series {
    rolling(&true_ranges(bars), period, |w| w.iter().sum::<f64>() / w.len() as f64)
}
