//! Channel breakouts: Donchian (price extremes) and Keltner (ATR bands).
//!
//! Both compare the last bar against the channel as it stood on the previous
//! bar, so a bar can never break out of a channel that already includes it.

use super::{Signal, SignalGenerator, SignalType};
use crate::domain::indicator::channel::{self, keltner};
use crate::domain::indicator::nth_back;
use crate::domain::ohlcv::OhlcvBar;

#[derive(Debug, Clone)]
pub struct ChannelBreakout {
    pub period: usize,
}

impl Default for ChannelBreakout {
    fn default() -> Self {
        ChannelBreakout {
            period: channel::DEFAULT_DONCHIAN_PERIOD,
        }
    }
}

impl SignalGenerator for ChannelBreakout {
    fn name(&self) -> &str {
        "channel_breakout"
    }

    fn lookback(&self) -> usize {
        self.period + 1
    }

    fn evaluate(&self, symbol: &str, window: &[OhlcvBar]) -> Option<Signal> {
        if self.period == 0 || window.len() < self.lookback() {
            return None;
        }
        let (bar, prior) = window.split_last()?;
        let prior = &prior[prior.len() - self.period..];
        let upper = prior.iter().map(|b| b.high).fold(f64::MIN, f64::max);
        let lower = prior.iter().map(|b| b.low).fold(f64::MAX, f64::min);

        let (signal_type, reason) = if bar.high > upper {
            (SignalType::Buy, format!("high broke {}-bar channel top", self.period))
        } else if bar.low < lower {
            (SignalType::Sell, format!("low broke {}-bar channel bottom", self.period))
        } else {
            return None;
        };

        Some(
            Signal::new(symbol, signal_type, 0.75, reason, bar.time)
                .with_indicator("donchian_upper", upper)
                .with_indicator("donchian_lower", lower),
        )
    }
}

#[derive(Debug, Clone)]
pub struct VolatilityBreakout {
    pub ma_period: usize,
    pub atr_period: usize,
    pub multiplier: f64,
}

impl Default for VolatilityBreakout {
    fn default() -> Self {
        VolatilityBreakout {
            ma_period: channel::DEFAULT_KELTNER_MA_PERIOD,
            atr_period: channel::DEFAULT_KELTNER_ATR_PERIOD,
            multiplier: channel::DEFAULT_KELTNER_MULTIPLIER,
        }
    }
}

impl SignalGenerator for VolatilityBreakout {
    fn name(&self) -> &str {
        "volatility_breakout"
    }

    fn lookback(&self) -> usize {
        self.ma_period.max(self.atr_period) + 1
    }

    fn evaluate(&self, symbol: &str, window: &[OhlcvBar]) -> Option<Signal> {
        if window.len() < self.lookback() {
            return None;
        }
        let k = keltner(window, self.ma_period, self.atr_period, self.multiplier);
        let upper = nth_back(&k.upper, 1)?;
        let lower = nth_back(&k.lower, 1)?;
        let bar = window.last()?;

        let (signal_type, reason) = if bar.close > upper {
            (SignalType::Buy, "close above Keltner upper band")
        } else if bar.close < lower {
            (SignalType::Sell, "close below Keltner lower band")
        } else {
            return None;
        };

        Some(
            Signal::new(symbol, signal_type, 0.70, reason, bar.time)
                .with_indicator("keltner_upper", upper)
                .with_indicator("keltner_lower", lower),
        )
    }
}
