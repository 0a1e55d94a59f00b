//! Signal generators.
//!
//! A generator looks at a window of bars ending at the bar being evaluated and
//! either abstains (`None`) or emits a [`Signal`]. Generators are pure: the
//! same window always yields the same signal, and nothing after the last bar
//! of the window is ever read.

pub mod adaptive_ma;
pub mod breakout;
pub mod confluence;
pub mod divergence;
pub mod ma_crossover;
pub mod macd_cross;
pub mod pivot_reversal;
pub mod rsi_extreme;
pub mod trend_strength;

use chrono::NaiveDateTime;
use serde::Serialize;
use std::collections::BTreeMap;

use super::ohlcv::OhlcvBar;

pub use adaptive_ma::AdaptiveMaCross;
pub use breakout::{ChannelBreakout, VolatilityBreakout};
pub use confluence::Confluence;
pub use divergence::Divergence;
pub use ma_crossover::{MaCrossover, MaMode};
pub use macd_cross::MacdCrossover;
pub use pivot_reversal::PivotReversal;
pub use rsi_extreme::RsiExtreme;
pub use trend_strength::TrendStrength;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SignalType {
    StrongSell,
    Sell,
    Neutral,
    Buy,
    StrongBuy,
}

impl SignalType {
    /// Ordinal in -2..=2.
    pub fn value(self) -> i32 {
        match self {
            SignalType::StrongSell => -2,
            SignalType::Sell => -1,
            SignalType::Neutral => 0,
            SignalType::Buy => 1,
            SignalType::StrongBuy => 2,
        }
    }

    pub fn from_value(value: i32) -> Option<Self> {
        match value {
            -2 => Some(SignalType::StrongSell),
            -1 => Some(SignalType::Sell),
            0 => Some(SignalType::Neutral),
            1 => Some(SignalType::Buy),
            2 => Some(SignalType::StrongBuy),
            _ => None,
        }
    }

    pub fn is_bullish(self) -> bool {
        self.value() > 0
    }

    pub fn is_bearish(self) -> bool {
        self.value() < 0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Signal {
    pub symbol: String,
    pub signal_type: SignalType,
    /// Always within [0, 1].
    pub confidence: f64,
    pub reason: String,
    pub indicators: BTreeMap<String, f64>,
    pub timestamp: NaiveDateTime,
}

impl Signal {
    pub fn new(
        symbol: &str,
        signal_type: SignalType,
        confidence: f64,
        reason: impl Into<String>,
        timestamp: NaiveDateTime,
    ) -> Self {
        Signal {
            symbol: symbol.to_string(),
            signal_type,
            confidence: if confidence.is_finite() {
                confidence.clamp(0.0, 1.0)
            } else {
                0.0
            },
            reason: reason.into(),
            indicators: BTreeMap::new(),
            timestamp,
        }
    }

    pub fn with_indicator(mut self, name: &str, value: f64) -> Self {
        self.indicators.insert(name.to_string(), value);
        self
    }
}

pub trait SignalGenerator: Send + Sync {
    /// Stable identifier, also used to prefix indicator names when fusing.
    fn name(&self) -> &str;

    /// Minimum window length before the generator can emit anything.
    fn lookback(&self) -> usize;

    fn evaluate(&self, symbol: &str, window: &[OhlcvBar]) -> Option<Signal>;
}

/// Evaluate every generator on the same window, dropping abstentions.
/// Returns `(generator name, signal)` pairs in generator order.
pub fn evaluate_all<'a>(
    generators: &'a [Box<dyn SignalGenerator>],
    symbol: &str,
    window: &[OhlcvBar],
) -> Vec<(&'a str, Signal)> {
    generators
        .iter()
        .filter(|g| window.len() >= g.lookback())
        .filter_map(|g| g.evaluate(symbol, window).map(|s| (g.name(), s)))
        .collect()
}

#[cfg(test)]
pub(crate) mod test_bars {
    use super::OhlcvBar;
    use chrono::{Duration, NaiveDate};

    /// Daily bars with a one-unit range around each close.
    pub fn from_closes(closes: &[f64]) -> Vec<OhlcvBar> {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        closes
            .iter()
            .enumerate()
            .map(|(i, &c)| OhlcvBar {
                symbol: "TEST".into(),
                time: start + Duration::days(i as i64),
                open: c,
                high: c + 0.5,
                low: c - 0.5,
                close: c,
                volume: 1000.0,
            })
            .collect()
    }
}
