//! Bounded oscillators: KDJ stochastic and the commodity channel index.

use super::sma::{avedev, sma};
use super::smoothing::sma_recursive;
use super::{rolling_max, rolling_min, safe_div, Series};
use crate::domain::ohlcv::OhlcvBar;

#[derive(Debug, Clone, PartialEq)]
pub struct Kdj {
    pub k: Series,
    pub d: Series,
    pub j: Series,
}

/// RSV = (C - LLV(L, n)) / (HHV(H, n) - LLV(L, n)) * 100,
/// K = SMA(RSV, m1, 1), D = SMA(K, m2, 1), J = 3K - 2D.
pub fn kdj(bars: &[OhlcvBar], n: usize, m1: usize, m2: usize) -> Kdj {
    let highs: Vec<f64> = bars.iter().map(|b| b.high).collect();
    let lows: Vec<f64> = bars.iter().map(|b| b.low).collect();
    let hhv = rolling_max(&highs, n);
    let llv = rolling_min(&lows, n);

    let rsv: Series = bars
        .iter()
        .enumerate()
        .map(|(i, bar)| {
            let (hi, lo) = (hhv[i]?, llv[i]?);
            Some(100.0 * safe_div(bar.close - lo, hi - lo))
        })
        .collect();

    let k = sma_recursive(&rsv, m1, 1);
    let d = sma_recursive(&k, m2, 1);
    let j = k
        .iter()
        .zip(&d)
        .map(|(k, d)| Some(3.0 * (*k)? - 2.0 * (*d)?))
        .collect();

    Kdj { k, d, j }
}

/// CCI = (TP - MA(TP, n)) / (0.015 * AVEDEV(TP, n)).
pub fn cci(bars: &[OhlcvBar], n: usize) -> Series {
    let typical: Vec<f64> = bars.iter().map(OhlcvBar::typical_price).collect();
    let ma = sma(&typical, n);
    let dev = avedev(&typical, n);
    typical
        .iter()
        .enumerate()
        .map(|(i, tp)| Some(safe_div(tp - ma[i]?, 0.015 * dev[i]?)))
        .collect()
}
