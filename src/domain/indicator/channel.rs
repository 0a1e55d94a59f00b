//! Price channels: Donchian (rolling extremes) and Keltner (ATR bands).

use super::atr::atr_simple;
use super::sma::sma;
use super::{rolling_max, rolling_min, Series};
use crate::domain::ohlcv::OhlcvBar;

pub const DEFAULT_DONCHIAN_PERIOD: usize = 20;
pub const DEFAULT_KELTNER_MA_PERIOD: usize = 56;
pub const DEFAULT_KELTNER_ATR_PERIOD: usize = 3;
pub const DEFAULT_KELTNER_MULTIPLIER: f64 = 1.0;

#[derive(Debug, Clone, PartialEq)]
pub struct Donchian {
    pub upper: Series,
    pub lower: Series,
}

/// Highest high and lowest low over the last `period` bars, including the current one.
pub fn donchian(bars: &[OhlcvBar], period: usize) -> Donchian {
    let highs: Vec<f64> = bars.iter().map(|b| b.high).collect();
    let lows: Vec<f64> = bars.iter().map(|b| b.low).collect();
    Donchian {
        upper: rolling_max(&highs, period),
        lower: rolling_min(&lows, period),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Keltner {
    pub middle: Series,
    pub upper: Series,
    pub lower: Series,
}

/// middle = SMA(typical price, ma_period); bands = middle ± multiplier * ATR(atr_period).
pub fn keltner(bars: &[OhlcvBar], ma_period: usize, atr_period: usize, multiplier: f64) -> Keltner {
    let typical: Vec<f64> = bars.iter().map(OhlcvBar::typical_price).collect();
    let middle = sma(&typical, ma_period);
    let atr = atr_simple(bars, atr_period);

    let band = |sign: f64| -> Series {
        middle
            .iter()
            .zip(&atr)
            .map(|(m, a)| Some((*m)? + sign * multiplier * (*a)?))
            .collect()
    };
    let upper = band(1.0);
    let lower = band(-1.0);

    Keltner {
        middle,
        upper,
        lower,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate};

    fn bar(i: usize, high: f64, low: f64, close: f64) -> OhlcvBar {
        OhlcvBar {
            symbol: "TEST".into(),
            time: NaiveDate::from_ymd_opt(2024, 1, 1)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap()
                + Duration::days(i as i64),
            open: close,
            high,
            low,
            close,
            volume: 1.0,
        }
    }

    #[test]
    fn donchian_tracks_extremes() {
        let bars = vec![
            bar(0, 10.0, 8.0, 9.0),
            bar(1, 12.0, 9.0, 11.0),
            bar(2, 11.0, 7.0, 8.0),
        ];
        let d = donchian(&bars, 2);
        assert_eq!(d.upper, vec![None, Some(12.0), Some(12.0)]);
        assert_eq!(d.lower, vec![None, Some(8.0), Some(7.0)]);
    }

    #[test]
    fn keltner_bands_symmetric() {
        let bars: Vec<OhlcvBar> = (0..10).map(|i| bar(i, 11.0, 9.0, 10.0)).collect();
        let k = keltner(&bars, 3, 3, 1.5);
        assert!(k.middle[1].is_none());
        assert!((k.middle[9].unwrap() - 10.0).abs() < 1e-12);
        assert!((k.upper[9].unwrap() - 13.0).abs() < 1e-12);
        assert!((k.lower[9].unwrap() - 7.0).abs() < 1e-12);
    }
}
