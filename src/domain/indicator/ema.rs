//! Exponential moving average.
//!
//! k = 2/(n+1), seeded with the SMA of the first n values, then
//! EMA[i] = x[i]*k + EMA[i-1]*(1-k). Warmup: first (n-1) values are undefined.

use super::Series;

pub fn ema(values: &[f64], period: usize) -> Series {
    let mut out = Vec::with_capacity(values.len());
    if period == 0 {
        out.resize(values.len(), None);
        return out;
    }

    let k = 2.0 / (period as f64 + 1.0);
    let mut sum = 0.0;
    let mut prev = 0.0;

    for (i, &x) in values.iter().enumerate() {
        if i < period - 1 {
            sum += x;
            out.push(None);
        } else if i == period - 1 {
            sum += x;
            prev = sum / period as f64;
            out.push(Some(prev));
        } else {
            prev = x * k + prev * (1.0 - k);
            out.push(Some(prev));
        }
    }
    out
}
