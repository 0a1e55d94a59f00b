//! MACD line / signal line crossover.

use super::{Signal, SignalGenerator, SignalType};
use crate::domain::indicator::macd::{self, macd};
use crate::domain::indicator::{crossed_above, crossed_below, last};
use crate::domain::ohlcv::{closes, OhlcvBar};

const CONFIDENCE: f64 = 0.7;

#[derive(Debug, Clone)]
pub struct MacdCrossover {
    pub fast: usize,
    pub slow: usize,
    pub signal: usize,
}

impl Default for MacdCrossover {
    fn default() -> Self {
        MacdCrossover {
            fast: macd::DEFAULT_FAST,
            slow: macd::DEFAULT_SLOW,
            signal: macd::DEFAULT_SIGNAL,
        }
    }
}

impl SignalGenerator for MacdCrossover {
    fn name(&self) -> &str {
        "macd_cross"
    }

    fn lookback(&self) -> usize {
        macd::warmup(self.slow, self.signal) + 1
    }

    fn evaluate(&self, symbol: &str, window: &[OhlcvBar]) -> Option<Signal> {
        if window.len() < self.lookback() {
            return None;
        }
        let m = macd(&closes(window), self.fast, self.slow, self.signal);
        let (line, signal, hist) = (last(&m.line)?, last(&m.signal)?, last(&m.histogram)?);

        let (signal_type, reason) = if crossed_above(&m.line, &m.signal) && hist > 0.0 {
            (SignalType::Buy, "MACD crossed above signal line")
        } else if crossed_below(&m.line, &m.signal) && hist < 0.0 {
            (SignalType::Sell, "MACD crossed below signal line")
        } else {
            return None;
        };

        Some(
            Signal::new(symbol, signal_type, CONFIDENCE, reason, window.last()?.time)
                .with_indicator("macd", line)
                .with_indicator("signal", signal)
                .with_indicator("histogram", hist),
        )
    }
}
