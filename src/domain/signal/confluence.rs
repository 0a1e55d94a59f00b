//! Multi-indicator confluence.
//!
//! Six independent bullish conditions are evaluated on the last bar:
//!
//! 1. trend line above its EMA signal, where the trend line is
//!    `100 - EMA((HHV(H,34) - C) / (HHV(H,34) - LLV(L,34)) * 100, 34)`
//!    and the signal is `EMA(trend, 21)`
//! 2. MACD DIF above DEA
//! 3. KDJ K above D
//! 4. CCI(14) above 100
//! 5. close above MA(5)
//! 6. RSI(14) above 50
//!
//! At least `threshold` of them fire a BUY with confidence `count / 6`. The
//! strict mirrors of each condition count toward a SELL.

use super::{Signal, SignalGenerator, SignalType};
use crate::domain::indicator::ema::ema;
use crate::domain::indicator::macd::macd;
use crate::domain::indicator::oscillator::{cci, kdj};
use crate::domain::indicator::rsi::rsi;
use crate::domain::indicator::sma::sma;
use crate::domain::indicator::{last, on_defined, rolling_max, rolling_min, safe_div, Series};
use crate::domain::ohlcv::{closes, highs, lows, OhlcvBar};

const CONDITIONS: usize = 6;
const TREND_PERIOD: usize = 34;
const TREND_SIGNAL_PERIOD: usize = 21;
pub const DEFAULT_THRESHOLD: usize = 5;

#[derive(Debug, Clone)]
pub struct Confluence {
    pub threshold: usize,
}

impl Default for Confluence {
    fn default() -> Self {
        Confluence {
            threshold: DEFAULT_THRESHOLD,
        }
    }
}

/// Bullish and bearish condition counts for the last bar of a window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tally {
    pub bullish: usize,
    pub bearish: usize,
}

fn trend_lines(window: &[OhlcvBar]) -> (Series, Series) {
    let hhv = rolling_max(&highs(window), TREND_PERIOD);
    let llv = rolling_min(&lows(window), TREND_PERIOD);
    let raw: Series = window
        .iter()
        .enumerate()
        .map(|(i, bar)| {
            let (hi, lo) = (hhv[i]?, llv[i]?);
            Some(100.0 * safe_div(hi - bar.close, hi - lo))
        })
        .collect();
    let trend: Series = on_defined(&raw, |v| ema(v, TREND_PERIOD))
        .into_iter()
        .map(|v| v.map(|x| 100.0 - x))
        .collect();
    let signal = on_defined(&trend, |v| ema(v, TREND_SIGNAL_PERIOD));
    (trend, signal)
}

impl Confluence {
    pub fn new(threshold: usize) -> Self {
        Confluence { threshold }
    }

    pub fn tally(&self, window: &[OhlcvBar]) -> Option<Tally> {
        if window.len() < self.lookback() {
            return None;
        }
        let closes = closes(window);
        let close = *closes.last()?;

        let (trend, trend_signal) = trend_lines(window);
        let m = macd(&closes, 12, 26, 9);
        let k = kdj(window, 9, 3, 3);
        let cci = last(&cci(window, 14))?;
        let ma5 = last(&sma(&closes, 5))?;
        let rsi = last(&rsi(&closes, 14))?;

        let pairs = [
            (last(&trend)?, last(&trend_signal)?),
            (last(&m.line)?, last(&m.signal)?),
            (last(&k.k)?, last(&k.d)?),
            (cci, 100.0),
            (close, ma5),
            (rsi, 50.0),
        ];
        let bullish = pairs.iter().filter(|(a, b)| a > b).count();
        let mirrored = [
            pairs[0],
            pairs[1],
            pairs[2],
            (cci, -100.0),
            pairs[4],
            pairs[5],
        ];
        let bearish = mirrored.iter().filter(|(a, b)| a < b).count();
        Some(Tally { bullish, bearish })
    }
}

impl SignalGenerator for Confluence {
    fn name(&self) -> &str {
        "confluence"
    }

    /// The trend signal line is the deepest chain: HHV(34) -> EMA(34) -> EMA(21).
    fn lookback(&self) -> usize {
        TREND_PERIOD + TREND_PERIOD + TREND_SIGNAL_PERIOD - 2
    }

    fn evaluate(&self, symbol: &str, window: &[OhlcvBar]) -> Option<Signal> {
        let tally = self.tally(window)?;
        let threshold = self.threshold.max(1);

        let (signal_type, count) = if tally.bullish >= threshold && tally.bullish > tally.bearish {
            (SignalType::Buy, tally.bullish)
        } else if tally.bearish >= threshold && tally.bearish > tally.bullish {
            (SignalType::Sell, tally.bearish)
        } else {
            return None;
        };

        let side = if signal_type == SignalType::Buy {
            "bullish"
        } else {
            "bearish"
        };
        Some(
            Signal::new(
                symbol,
                signal_type,
                count as f64 / CONDITIONS as f64,
                format!("{count}/{CONDITIONS} {side} conditions agree"),
                window.last()?.time,
            )
            .with_indicator("bullish_count", tally.bullish as f64)
            .with_indicator("bearish_count", tally.bearish as f64),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::signal::test_bars::from_closes;

    fn accelerating(up: bool) -> Vec<OhlcvBar> {
        let closes: Vec<f64> = (0..100)
            .map(|i| {
                let bend = 0.05 * (i * i) as f64;
                if up { 100.0 + bend } else { 700.0 - bend }
            })
            .collect();
        from_closes(&closes)
    }

    #[test]
    fn lookback_matches_trend_chain() {
        assert_eq!(Confluence::default().lookback(), 87);
        let bars = accelerating(true);
        assert!(Confluence::default().tally(&bars[..86]).is_none());
        assert!(Confluence::default().tally(&bars[..87]).is_some());
    }

    #[test]
    fn accelerating_rally_meets_all_six() {
        let s = Confluence::default().evaluate("TEST", &accelerating(true)).unwrap();
        assert_eq!(s.signal_type, SignalType::Buy);
        assert!((s.confidence - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn accelerating_decline_sells() {
        let s = Confluence::default().evaluate("TEST", &accelerating(false)).unwrap();
        assert_eq!(s.signal_type, SignalType::Sell);
        assert!((s.indicators["bearish_count"] - 6.0).abs() < f64::EPSILON);
    }

    #[test]
    fn threshold_is_configurable() {
        // rally, then a sharp last-bar drop splits the vote
        let mut closes: Vec<f64> = (0..99).map(|i| 100.0 + 0.05 * (i * i) as f64).collect();
        let top = closes[98];
        closes.push(top - 30.0);
        let bars = from_closes(&closes);

        let tally = Confluence::default().tally(&bars).unwrap();
        let count = tally.bullish.max(tally.bearish);
        assert!(count < CONDITIONS);

        if tally.bullish != tally.bearish && count > 0 {
            let at = Confluence::new(count).evaluate("TEST", &bars).unwrap();
            assert!((at.confidence - count as f64 / 6.0).abs() < 1e-12);
            assert!(Confluence::new(count + 1).evaluate("TEST", &bars).is_none());
        }
    }
}
