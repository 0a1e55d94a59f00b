//! MACD (Moving Average Convergence Divergence).
//!
//! MACD line = EMA(fast) - EMA(slow)
//! Signal line = EMA(signal) of the MACD line
//! Histogram = MACD line - signal line
//!
//! Default parameters: fast=12, slow=26, signal=9.

use super::ema::ema;
use super::{on_defined, Series};

pub const DEFAULT_FAST: usize = 12;
pub const DEFAULT_SLOW: usize = 26;
pub const DEFAULT_SIGNAL: usize = 9;

#[derive(Debug, Clone, PartialEq)]
pub struct Macd {
    pub line: Series,
    pub signal: Series,
    pub histogram: Series,
}

pub fn macd(closes: &[f64], fast: usize, slow: usize, signal_period: usize) -> Macd {
    let fast_ema = ema(closes, fast);
    let slow_ema = ema(closes, slow);

    let line: Series = fast_ema
        .iter()
        .zip(&slow_ema)
        .map(|(f, s)| Some((*f)? - (*s)?))
        .collect();
    let signal = on_defined(&line, |v| ema(v, signal_period));
    let histogram = line
        .iter()
        .zip(&signal)
        .map(|(l, s)| Some((*l)? - (*s)?))
        .collect();

    Macd {
        line,
        signal,
        histogram,
    }
}

/// Bars needed before the histogram is defined.
pub fn warmup(slow: usize, signal_period: usize) -> usize {
    slow + signal_period - 1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn macd_warmup_alignment() {
        let closes: Vec<f64> = (0..40).map(|i| 100.0 + i as f64).collect();
        let m = macd(&closes, 3, 5, 2);
        assert!(m.line[3].is_none());
        assert!(m.line[4].is_some());
        assert!(m.signal[4].is_none());
        assert!(m.signal[5].is_some());
        assert!(m.histogram[5].is_some());
        assert_eq!(warmup(5, 2), 6);
    }

    #[test]
    fn macd_positive_in_uptrend() {
        let closes: Vec<f64> = (0..60).map(|i| 100.0 + i as f64).collect();
        let m = macd(&closes, 12, 26, 9);
        assert!(m.line[59].unwrap() > 0.0);
    }

    #[test]
    fn macd_flat_is_zero() {
        let m = macd(&[50.0; 40], 12, 26, 9);
        assert!(m.line[39].unwrap().abs() < 1e-12);
        assert!(m.histogram[39].unwrap().abs() < 1e-12);
    }
}
