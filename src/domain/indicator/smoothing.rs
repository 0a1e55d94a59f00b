//! Recursive smoothing expressed as explicit folds.
//!
//! Both kernels carry a single state value from left to right. The state is
//! seeded with the first defined input; undefined positions before the seed
//! stay undefined.

use super::Series;

/// `SMA(X, N, M)`: y = (M*x + (N-M)*y') / N, seeded with the first defined x.
///
/// Undefined inputs after the seed leave the state unchanged.
pub fn sma_recursive(values: &[Option<f64>], n: usize, m: usize) -> Series {
    if n == 0 || m > n {
        return vec![None; values.len()];
    }
    let (n, m) = (n as f64, m as f64);

    values
        .iter()
        .scan(None::<f64>, |state, x| {
            let next = match (*state, x.filter(|v| v.is_finite())) {
                (None, Some(v)) => Some(v),
                (Some(prev), Some(v)) => Some((m * v + (n - m) * prev) / n),
                (prev, None) => prev,
            };
            *state = next;
            Some(next)
        })
        .collect()
}

/// `DMA(X, W)`: y = W*x + (1-W)*y', seeded with the first defined x.
///
/// A missing or non-finite weight or input carries the previous value forward.
pub fn dma(values: &[Option<f64>], weights: &[Option<f64>]) -> Series {
    values
        .iter()
        .enumerate()
        .scan(None::<f64>, |state, (i, x)| {
            let x = x.filter(|v| v.is_finite());
            let w = weights.get(i).copied().flatten().filter(|w| w.is_finite());
            let next = match (*state, x, w) {
                (None, Some(v), _) => Some(v),
                (Some(prev), Some(v), Some(w)) => Some(w * v + (1.0 - w) * prev),
                (prev, _, _) => prev,
            };
            *state = next;
            Some(next)
        })
        .collect()
}
