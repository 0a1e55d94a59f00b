//! Zigzag pivot confirmations.

use super::{Signal, SignalGenerator, SignalType};
use crate::domain::indicator::zigzag::{find_pivots, PivotKind, TieBreak};
use crate::domain::ohlcv::{closes, OhlcvBar};

const CONFIDENCE: f64 = 0.6;

#[derive(Debug, Clone)]
pub struct PivotReversal {
    /// Minimum retracement, in percent, that confirms a pivot.
    pub pct: f64,
    pub tie_break: TieBreak,
}

impl Default for PivotReversal {
    fn default() -> Self {
        PivotReversal {
            pct: 5.0,
            tie_break: TieBreak::FirstOccurrence,
        }
    }
}

impl SignalGenerator for PivotReversal {
    fn name(&self) -> &str {
        "pivot_reversal"
    }

    fn lookback(&self) -> usize {
        3
    }

    fn evaluate(&self, symbol: &str, window: &[OhlcvBar]) -> Option<Signal> {
        if window.len() < self.lookback() {
            return None;
        }
        let last_index = window.len() - 1;
        let pivot = find_pivots(&closes(window), self.pct, self.tie_break)
            .into_iter()
            .rev()
            .find(|p| p.confirmed_at == last_index)?;

        let (signal_type, reason) = match pivot.kind {
            PivotKind::Trough => (SignalType::Buy, "zigzag trough confirmed"),
            PivotKind::Peak => (SignalType::Sell, "zigzag peak confirmed"),
        };

        Some(
            Signal::new(symbol, signal_type, CONFIDENCE, reason, window[last_index].time)
                .with_indicator("pivot_price", pivot.price)
                .with_indicator("bars_since_pivot", (last_index - pivot.index) as f64),
        )
    }
}
