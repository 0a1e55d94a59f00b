//! ADX rising through a trend threshold.

use super::{Signal, SignalGenerator, SignalType};
use crate::domain::indicator::adx::{self, adx};
use crate::domain::indicator::{last, nth_back};
use crate::domain::ohlcv::OhlcvBar;

const CONFIDENCE: f64 = 0.65;

#[derive(Debug, Clone)]
pub struct TrendStrength {
    pub period: usize,
    pub threshold: f64,
}

impl Default for TrendStrength {
    fn default() -> Self {
        TrendStrength {
            period: adx::DEFAULT_PERIOD,
            threshold: 20.0,
        }
    }
}

impl SignalGenerator for TrendStrength {
    fn name(&self) -> &str {
        "trend_strength"
    }

    /// ADX is first defined at index `2 * period - 2`; one more bar gives a slope.
    fn lookback(&self) -> usize {
        2 * self.period
    }

    fn evaluate(&self, symbol: &str, window: &[OhlcvBar]) -> Option<Signal> {
        if self.period == 0 || window.len() < self.lookback() {
            return None;
        }
        let a = adx(window, self.period);
        let (prev, cur) = (nth_back(&a.adx, 1)?, last(&a.adx)?);
        if !(prev < self.threshold && cur >= self.threshold) {
            return None;
        }

        Some(
            Signal::new(
                symbol,
                SignalType::Buy,
                CONFIDENCE,
                format!("ADX rose through {:.0} ({cur:.1})", self.threshold),
                window.last()?.time,
            )
            .with_indicator("adx", cur)
            .with_indicator("plus_di", last(&a.plus_di)?)
            .with_indicator("minus_di", last(&a.minus_di)?),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::signal::test_bars::from_closes;

    fn choppy_then_trending() -> Vec<f64> {
        let mut closes: Vec<f64> = (0..40)
            .map(|i| 100.0 + if i % 2 == 0 { 1.0 } else { -1.0 })
            .collect();
        closes.extend((1..=30).map(|i| 100.0 + 1.5 * i as f64));
        closes
    }

    #[test]
    fn fires_once_when_trend_emerges() {
        let bars = from_closes(&choppy_then_trending());
        let r#gen = TrendStrength::default();
        let hits: Vec<Signal> = (r#gen.lookback()..=bars.len())
            .filter_map(|n| r#gen.evaluate("TEST", &bars[..n]))
            .collect();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].signal_type, SignalType::Buy);
        assert!(hits[0].indicators["adx"] >= 20.0);
    }

    #[test]
    fn choppy_market_abstains() {
        let closes: Vec<f64> = (0..60)
            .map(|i| 100.0 + if i % 2 == 0 { 1.0 } else { -1.0 })
            .collect();
        let bars = from_closes(&closes);
        let r#gen = TrendStrength::default();
        assert!((r#gen.lookback()..=bars.len()).all(|n| r#gen.evaluate("TEST", &bars[..n]).is_none()));
    }
}
