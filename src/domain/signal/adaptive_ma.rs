//! Close crossing a Kaufman adaptive moving average.

use super::{Signal, SignalGenerator, SignalType};
use crate::domain::indicator::kama::{self, efficiency_ratio, kama};
use crate::domain::indicator::{last, nth_back};
use crate::domain::ohlcv::{closes, OhlcvBar};

const CONFIDENCE: f64 = 0.65;

#[derive(Debug, Clone)]
pub struct AdaptiveMaCross {
    pub efficiency_period: usize,
    pub fast: usize,
    pub slow: usize,
}

impl Default for AdaptiveMaCross {
    fn default() -> Self {
        AdaptiveMaCross {
            efficiency_period: kama::DEFAULT_EFFICIENCY_PERIOD,
            fast: kama::DEFAULT_FAST,
            slow: kama::DEFAULT_SLOW,
        }
    }
}

impl SignalGenerator for AdaptiveMaCross {
    fn name(&self) -> &str {
        "adaptive_ma"
    }

    fn lookback(&self) -> usize {
        self.efficiency_period + 2
    }

    fn evaluate(&self, symbol: &str, window: &[OhlcvBar]) -> Option<Signal> {
        if window.len() < self.lookback() {
            return None;
        }
        let closes = closes(window);
        let ama = kama(&closes, self.efficiency_period, self.fast, self.slow);
        let (prev_ama, cur_ama) = (nth_back(&ama, 1)?, last(&ama)?);
        let (prev, cur) = (closes[closes.len() - 2], closes[closes.len() - 1]);

        let (signal_type, reason) = if prev <= prev_ama && cur > cur_ama {
            (SignalType::Buy, "close crossed above adaptive MA")
        } else if prev >= prev_ama && cur < cur_ama {
            (SignalType::Sell, "close crossed below adaptive MA")
        } else {
            return None;
        };

        let mut signal = Signal::new(symbol, signal_type, CONFIDENCE, reason, window.last()?.time)
            .with_indicator("ama", cur_ama);
        if let Some(er) = last(&efficiency_ratio(&closes, self.efficiency_period)) {
            signal = signal.with_indicator("efficiency_ratio", er);
        }
        Some(signal)
    }
}
