//! Kaufman adaptive moving average.
//!
//! The efficiency ratio ER = |close - close[n]| / Σ|Δclose| over n bars scales
//! the smoothing constant between the fast and slow EMA constants:
//! sc = (ER * (fast_sc - slow_sc) + slow_sc)^2. The average itself is a
//! [`dma`] fold seeded with the first close.

use super::smoothing::dma;
use super::{safe_div, Series};

pub const DEFAULT_EFFICIENCY_PERIOD: usize = 10;
pub const DEFAULT_FAST: usize = 2;
pub const DEFAULT_SLOW: usize = 30;

pub fn efficiency_ratio(closes: &[f64], period: usize) -> Series {
    (0..closes.len())
        .map(|i| {
            if period == 0 || i < period {
                return None;
            }
            let change = (closes[i] - closes[i - period]).abs();
            let volatility: f64 = closes[i - period..=i]
                .windows(2)
                .map(|w| (w[1] - w[0]).abs())
                .sum();
            Some(safe_div(change, volatility).clamp(0.0, 1.0))
        })
        .collect()
}

pub fn kama(closes: &[f64], efficiency_period: usize, fast: usize, slow: usize) -> Series {
    let fast_sc = 2.0 / (fast as f64 + 1.0);
    let slow_sc = 2.0 / (slow as f64 + 1.0);

    let weights: Series = efficiency_ratio(closes, efficiency_period)
        .into_iter()
        .map(|er| er.map(|er| (er * (fast_sc - slow_sc) + slow_sc).powi(2)))
        .collect();
    let inputs: Series = closes.iter().copied().map(Some).collect();

    dma(&inputs, &weights)
        .into_iter()
        .enumerate()
        .map(|(i, v)| if i < efficiency_period { None } else { v })
        .collect()
}
