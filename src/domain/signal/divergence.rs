//! Price/MACD divergence.
//!
//! Top divergence: the close sets a `lookback`-bar high while the MACD line
//! stays below its own high of the previous `lookback` bars. Bottom divergence
//! mirrors it at the lows.

use super::{Signal, SignalGenerator, SignalType};
use crate::domain::indicator::macd::{self, macd};
use crate::domain::indicator::{last, nth_back, rolling_max, rolling_min};
use crate::domain::ohlcv::{closes, OhlcvBar};

const CONFIDENCE: f64 = 0.70;

#[derive(Debug, Clone)]
pub struct Divergence {
    pub fast: usize,
    pub slow: usize,
    pub signal: usize,
    pub lookback: usize,
}

impl Default for Divergence {
    fn default() -> Self {
        Divergence {
            fast: macd::DEFAULT_FAST,
            slow: macd::DEFAULT_SLOW,
            signal: macd::DEFAULT_SIGNAL,
            lookback: 10,
        }
    }
}

impl SignalGenerator for Divergence {
    fn name(&self) -> &str {
        "divergence"
    }

    fn lookback(&self) -> usize {
        self.slow.max(self.fast) + self.lookback
    }

    fn evaluate(&self, symbol: &str, window: &[OhlcvBar]) -> Option<Signal> {
        if self.lookback == 0 || window.len() < self.lookback() {
            return None;
        }
        let closes = closes(window);
        let close = *closes.last()?;
        let tail = &closes[closes.len() - self.lookback..];
        let price_high = tail.iter().copied().fold(f64::MIN, f64::max);
        let price_low = tail.iter().copied().fold(f64::MAX, f64::min);

        let line = macd(&closes, self.fast, self.slow, self.signal).line;
        let current = last(&line)?;
        // MACD extremes over the bars before this one
        let defined: Vec<f64> = line.iter().flatten().copied().collect();
        let prior_max = nth_back(&rolling_max(&defined, self.lookback), 1)?;
        let prior_min = nth_back(&rolling_min(&defined, self.lookback), 1)?;

        let (signal_type, reason) = if close >= price_high && current < prior_max {
            (SignalType::Sell, "price at new high without MACD confirmation")
        } else if close <= price_low && current > prior_min {
            (SignalType::Buy, "price at new low without MACD confirmation")
        } else {
            return None;
        };

        Some(
            Signal::new(symbol, signal_type, CONFIDENCE, reason, window.last()?.time)
                .with_indicator("macd", current)
                .with_indicator("macd_prior_max", prior_max)
                .with_indicator("macd_prior_min", prior_min),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::signal::test_bars::from_closes;

    #[test]
    fn slowing_rally_is_top_divergence() {
        // strong rally, then a crawl to a marginal new high
        let mut closes: Vec<f64> = (0..40).map(|i| 100.0 + 2.0 * i as f64).collect();
        closes.extend((1..=8).map(|i| 178.0 + 0.1 * i as f64));
        let s = Divergence::default()
            .evaluate("TEST", &from_closes(&closes))
            .unwrap();
        assert_eq!(s.signal_type, SignalType::Sell);
        assert!(s.indicators["macd"] < s.indicators["macd_prior_max"]);
    }

    #[test]
    fn slowing_decline_is_bottom_divergence() {
        let mut closes: Vec<f64> = (0..40).map(|i| 200.0 - 2.0 * i as f64).collect();
        closes.extend((1..=8).map(|i| 122.0 - 0.1 * i as f64));
        let s = Divergence::default()
            .evaluate("TEST", &from_closes(&closes))
            .unwrap();
        assert_eq!(s.signal_type, SignalType::Buy);
    }

    #[test]
    fn mid_range_close_abstains() {
        let mut closes: Vec<f64> = (0..40).map(|i| 100.0 + 2.0 * i as f64).collect();
        closes.push(170.0);
        assert!(Divergence::default()
            .evaluate("TEST", &from_closes(&closes))
            .is_none());
    }
}
