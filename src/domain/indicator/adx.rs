//! Average Directional Index.
//!
//! +DM/-DM follow Wilder's rule (only the larger move counts), DI lines and DX
//! use rolling means over `period`, and ADX is the rolling mean of DX.
//! Warmup: 2 * period - 1 bars.

use super::{rolling, safe_div, Series};
use crate::domain::indicator::atr::true_ranges;
use crate::domain::ohlcv::OhlcvBar;

pub const DEFAULT_PERIOD: usize = 14;

#[derive(Debug, Clone, PartialEq)]
pub struct Adx {
    pub adx: Series,
    pub plus_di: Series,
    pub minus_di: Series,
}

pub fn adx(bars: &[OhlcvBar], period: usize) -> Adx {
    let n = bars.len();
    let mut plus_dm = vec![0.0; n];
    let mut minus_dm = vec![0.0; n];
    for i in 1..n {
        let up = bars[i].high - bars[i - 1].high;
        let down = bars[i - 1].low - bars[i].low;
        if up > down && up > 0.0 {
            plus_dm[i] = up;
        }
        if down > up && down > 0.0 {
            minus_dm[i] = down;
        }
    }

    let mean = |w: &[f64]| w.iter().sum::<f64>() / w.len() as f64;
    let atr = rolling(&true_ranges(bars), period, mean);
    let plus_avg = rolling(&plus_dm, period, mean);
    let minus_avg = rolling(&minus_dm, period, mean);

    let plus_di: Series = (0..n)
        .map(|i| Some(100.0 * safe_div(plus_avg[i]?, atr[i]?)))
        .collect();
    let minus_di: Series = (0..n)
        .map(|i| Some(100.0 * safe_div(minus_avg[i]?, atr[i]?)))
        .collect();

    let dx: Vec<Option<f64>> = (0..n)
        .map(|i| {
            let (p, m) = (plus_di[i]?, minus_di[i]?);
            Some(100.0 * safe_div((p - m).abs(), p + m))
        })
        .collect();

    let adx = super::on_defined(&dx, |v| rolling(v, period, mean));

    Adx {
        adx,
        plus_di,
        minus_di,
    }
}
