//! Fast/slow simple moving average crossover.

use super::{Signal, SignalGenerator, SignalType};
use crate::domain::indicator::sma::sma;
use crate::domain::indicator::{crossed_above, crossed_below, last};
use crate::domain::ohlcv::{closes, OhlcvBar};

const CONFIDENCE: f64 = 0.6;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MaMode {
    /// Fire only on the bar where the fast average crosses the slow one.
    #[default]
    Cross,
    /// Fire on every bar according to which average is on top.
    Alignment,
}

#[derive(Debug, Clone)]
pub struct MaCrossover {
    pub fast: usize,
    pub slow: usize,
    pub mode: MaMode,
}

impl Default for MaCrossover {
    fn default() -> Self {
        MaCrossover {
            fast: 5,
            slow: 20,
            mode: MaMode::Cross,
        }
    }
}

impl MaCrossover {
    pub fn new(fast: usize, slow: usize, mode: MaMode) -> Self {
        MaCrossover { fast, slow, mode }
    }
}

impl SignalGenerator for MaCrossover {
    fn name(&self) -> &str {
        "ma_crossover"
    }

    fn lookback(&self) -> usize {
        match self.mode {
            MaMode::Cross => self.slow.max(self.fast) + 1,
            MaMode::Alignment => self.slow.max(self.fast),
        }
    }

    fn evaluate(&self, symbol: &str, window: &[OhlcvBar]) -> Option<Signal> {
        if window.len() < self.lookback() || self.fast == 0 || self.slow == 0 {
            return None;
        }
        let closes = closes(window);
        let fast = sma(&closes, self.fast);
        let slow = sma(&closes, self.slow);
        let (f, s) = (last(&fast)?, last(&slow)?);

        let (signal_type, reason) = match self.mode {
            MaMode::Cross if crossed_above(&fast, &slow) => {
                (SignalType::Buy, "fast MA crossed above slow MA")
            }
            MaMode::Cross if crossed_below(&fast, &slow) => {
                (SignalType::Sell, "fast MA crossed below slow MA")
            }
            MaMode::Alignment if f > s => (SignalType::Buy, "fast MA above slow MA"),
            MaMode::Alignment if f < s => (SignalType::Sell, "fast MA below slow MA"),
            _ => return None,
        };

        let ts = window.last()?.time;
        Some(
            Signal::new(symbol, signal_type, CONFIDENCE, reason, ts)
                .with_indicator("ma_fast", f)
                .with_indicator("ma_slow", s),
        )
    }
}
