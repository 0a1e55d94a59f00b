//! RSI overbought/oversold.

use super::{Signal, SignalGenerator, SignalType};
use crate::domain::indicator::last;
use crate::domain::indicator::rsi::{self, rsi};
use crate::domain::ohlcv::{closes, OhlcvBar};

const CONFIDENCE: f64 = 0.5;

#[derive(Debug, Clone)]
pub struct RsiExtreme {
    pub period: usize,
    pub oversold: f64,
    pub overbought: f64,
}

impl Default for RsiExtreme {
    fn default() -> Self {
        RsiExtreme {
            period: rsi::DEFAULT_PERIOD,
            oversold: 30.0,
            overbought: 70.0,
        }
    }
}

impl SignalGenerator for RsiExtreme {
    fn name(&self) -> &str {
        "rsi_extreme"
    }

    fn lookback(&self) -> usize {
        self.period + 1
    }

    fn evaluate(&self, symbol: &str, window: &[OhlcvBar]) -> Option<Signal> {
        if window.len() < self.lookback() {
            return None;
        }
        let value = last(&rsi(&closes(window), self.period))?;

        let (signal_type, reason) = if value < self.oversold {
            (SignalType::Buy, format!("RSI oversold ({value:.1})"))
        } else if value > self.overbought {
            (SignalType::Sell, format!("RSI overbought ({value:.1})"))
        } else {
            return None;
        };

        Some(
            Signal::new(symbol, signal_type, CONFIDENCE, reason, window.last()?.time)
                .with_indicator("rsi", value),
        )
    }
}
