//! Numeric indicator kernels.
//!
//! Every kernel is a left-to-right pass over a slice and returns one value per
//! input element. `None` marks warmup positions where the indicator is not yet
//! defined. Ratios whose denominator can vanish go through [`safe_div`].

pub mod adx;
pub mod atr;
pub mod channel;
pub mod ema;
pub mod kama;
pub mod macd;
pub mod oscillator;
pub mod rsi;
pub mod sma;
pub mod smoothing;
pub mod zigzag;

/// Indicator output aligned with its input.
pub type Series = Vec<Option<f64>>;

/// Substitute denominator for ratios that would otherwise divide by zero.
pub const EPSILON: f64 = 1e-10;

pub fn safe_div(numerator: f64, denominator: f64) -> f64 {
    if denominator.abs() < EPSILON {
        numerator / EPSILON.copysign(denominator)
    } else {
        numerator / denominator
    }
}

/// Last value of a series, if defined.
pub fn last(series: &[Option<f64>]) -> Option<f64> {
    series.last().copied().flatten()
}

/// Value `back` positions before the last one, if defined.
pub fn nth_back(series: &[Option<f64>], back: usize) -> Option<f64> {
    let len = series.len();
    if back >= len {
        return None;
    }
    series[len - 1 - back]
}

/// Rolling maximum over `period` elements ending at each index.
pub fn rolling_max(values: &[f64], period: usize) -> Series {
    rolling(values, period, |w| w.iter().copied().fold(f64::MIN, f64::max))
}

/// Rolling minimum over `period` elements ending at each index.
pub fn rolling_min(values: &[f64], period: usize) -> Series {
    rolling(values, period, |w| w.iter().copied().fold(f64::MAX, f64::min))
}

pub(crate) fn rolling<F>(values: &[f64], period: usize, f: F) -> Series
where
    F: Fn(&[f64]) -> f64,
{
    if period == 0 {
        return vec![None; values.len()];
    }
    (0..values.len())
        .map(|i| {
            if i + 1 < period {
                None
            } else {
                Some(f(&values[i + 1 - period..=i]))
            }
        })
        .collect()
}

/// Apply a kernel to the defined tail of a series and re-align the output.
///
/// The series must be `None` only in a leading warmup run; anything after the
/// first defined value is treated as defined.
pub fn on_defined<F>(series: &[Option<f64>], kernel: F) -> Series
where
    F: Fn(&[f64]) -> Series,
{
    let Some(start) = series.iter().position(Option::is_some) else {
        return vec![None; series.len()];
    };
    let tail: Vec<f64> = series[start..].iter().map(|v| v.unwrap_or(f64::NAN)).collect();
    let mut out = vec![None; start];
    out.extend(kernel(&tail));
    out
}

/// `a` moved from at-or-below `b` to above `b` on the last element.
pub fn crossed_above(a: &[Option<f64>], b: &[Option<f64>]) -> bool {
    match (nth_back(a, 1), last(a), nth_back(b, 1), last(b)) {
        (Some(a0), Some(a1), Some(b0), Some(b1)) => a0 <= b0 && a1 > b1,
        _ => false,
    }
}

/// `a` moved from at-or-above `b` to below `b` on the last element.
pub fn crossed_below(a: &[Option<f64>], b: &[Option<f64>]) -> bool {
    match (nth_back(a, 1), last(a), nth_back(b, 1), last(b)) {
        (Some(a0), Some(a1), Some(b0), Some(b1)) => a0 >= b0 && a1 < b1,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn safe_div_guards_zero() {
        assert!((safe_div(1.0, 0.0) - 1e10).abs() < 1.0);
        assert!((safe_div(6.0, 3.0) - 2.0).abs() < f64::EPSILON);
        assert!(safe_div(1.0, -1e-12) < 0.0);
    }

    #[test]
    fn rolling_extremes() {
        let v = [3.0, 1.0, 4.0, 1.0, 5.0];
        assert_eq!(rolling_max(&v, 3), vec![None, None, Some(4.0), Some(4.0), Some(5.0)]);
        assert_eq!(rolling_min(&v, 3), vec![None, None, Some(1.0), Some(1.0), Some(1.0)]);
    }

    #[test]
    fn on_defined_realigns() {
        let s = vec![None, None, Some(1.0), Some(2.0), Some(3.0)];
        let out = on_defined(&s, |v| v.iter().map(|x| Some(x * 10.0)).collect());
        assert_eq!(out, vec![None, None, Some(10.0), Some(20.0), Some(30.0)]);
    }

    #[test]
    fn cross_detection() {
        let fast = vec![Some(1.0), Some(3.0)];
        let slow = vec![Some(2.0), Some(2.0)];
        assert!(crossed_above(&fast, &slow));
        assert!(!crossed_below(&fast, &slow));
        assert!(crossed_below(&slow, &fast));
        assert!(!crossed_above(&vec![None, Some(3.0)], &slow));
    }

    #[test]
    fn nth_back_out_of_range() {
        let s = vec![Some(1.0)];
        assert_eq!(nth_back(&s, 0), Some(1.0));
        assert_eq!(nth_back(&s, 1), None);
    }
}
