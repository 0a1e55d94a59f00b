//! Weighted fusion of generator signals into one decision.
//!
//! score = Σ type_value × weight × confidence. The score maps onto a discrete
//! [`SignalType`] through fixed thresholds; the fused confidence is the
//! weight-averaged source confidence, capped at 1.

use chrono::NaiveDateTime;
use serde::Serialize;
use std::collections::BTreeMap;

use super::signal::{Signal, SignalType};

pub const STRONG_THRESHOLD: f64 = 1.5;
pub const THRESHOLD: f64 = 0.5;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FusedSignal {
    pub symbol: String,
    pub signal_type: SignalType,
    pub confidence: f64,
    pub reason: String,
    pub indicators: BTreeMap<String, f64>,
    /// Latest source timestamp; `None` when nothing was fused.
    pub timestamp: Option<NaiveDateTime>,
    pub score: f64,
    pub bullish_count: usize,
    pub bearish_count: usize,
    pub neutral_count: usize,
    pub source_count: usize,
}

impl FusedSignal {
    fn empty(symbol: &str) -> Self {
        FusedSignal {
            symbol: symbol.to_string(),
            signal_type: SignalType::Neutral,
            confidence: 0.0,
            reason: "no signals to fuse".to_string(),
            indicators: BTreeMap::new(),
            timestamp: None,
            score: 0.0,
            bullish_count: 0,
            bearish_count: 0,
            neutral_count: 0,
            source_count: 0,
        }
    }
}

pub fn classify(score: f64) -> SignalType {
    if score > STRONG_THRESHOLD {
        SignalType::StrongBuy
    } else if score > THRESHOLD {
        SignalType::Buy
    } else if score < -STRONG_THRESHOLD {
        SignalType::StrongSell
    } else if score < -THRESHOLD {
        SignalType::Sell
    } else {
        SignalType::Neutral
    }
}

/// Fuse `(generator name, signal)` pairs.
///
/// Missing weights default to `1/N`; negative or non-finite weights count as
/// zero. An empty input is a NEUTRAL decision with zero confidence.
pub fn fuse(symbol: &str, signals: &[(&str, Signal)], weights: Option<&[f64]>) -> FusedSignal {
    if signals.is_empty() {
        return FusedSignal::empty(symbol);
    }

    let n = signals.len() as f64;
    let weight_of = |i: usize| -> f64 {
        let w = weights.and_then(|ws| ws.get(i).copied()).unwrap_or(1.0 / n);
        if w.is_finite() { w.max(0.0) } else { 0.0 }
    };

    let mut fused = FusedSignal::empty(symbol);
    fused.source_count = signals.len();
    let mut weight_sum = 0.0;
    let mut weighted_confidence = 0.0;
    let mut reasons = Vec::with_capacity(signals.len());

    for (i, (source, signal)) in signals.iter().enumerate() {
        let w = weight_of(i);
        fused.score += f64::from(signal.signal_type.value()) * w * signal.confidence;
        weight_sum += w;
        weighted_confidence += w * signal.confidence;

        match signal.signal_type {
            t if t.is_bullish() => fused.bullish_count += 1,
            t if t.is_bearish() => fused.bearish_count += 1,
            _ => fused.neutral_count += 1,
        }

        reasons.push(format!(
            "{} (conf={:.2}%)",
            signal.reason,
            signal.confidence * 100.0
        ));
        for (name, value) in &signal.indicators {
            fused.indicators.insert(format!("{source}.{name}"), *value);
        }
        fused.timestamp = fused.timestamp.max(Some(signal.timestamp));
    }

    fused.signal_type = classify(fused.score);
    fused.confidence = if weight_sum > 0.0 {
        (weighted_confidence / weight_sum).clamp(0.0, 1.0)
    } else {
        0.0
    };
    fused.reason = reasons.join(" | ");
    fused
}

/// Weights proportional to each source's confidence, summing to 1.
/// Falls back to equal weights when every confidence is zero.
pub fn confidence_weights(signals: &[(&str, Signal)]) -> Vec<f64> {
    let total: f64 = signals.iter().map(|(_, s)| s.confidence).sum();
    if total <= 0.0 {
        let n = signals.len().max(1) as f64;
        return vec![1.0 / n; signals.len()];
    }
    signals.iter().map(|(_, s)| s.confidence / total).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn ts(day: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, day)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    fn sig(t: SignalType, confidence: f64) -> Signal {
        Signal::new("AAPL", t, confidence, format!("{t:?}"), ts(1))
    }

    #[test]
    fn opposite_signals_cancel_to_neutral() {
        let signals = vec![
            ("a", sig(SignalType::Buy, 0.7)),
            ("b", sig(SignalType::Sell, 0.7)),
        ];
        let fused = fuse("AAPL", &signals, Some(&[0.5, 0.5]));
        assert!(fused.score.abs() < 1e-12);
        assert_eq!(fused.signal_type, SignalType::Neutral);
        assert!((fused.confidence - 0.7).abs() < 1e-12);
        assert_eq!((fused.bullish_count, fused.bearish_count), (1, 1));
    }

    #[test]
    fn empty_input_never_fails() {
        let fused = fuse("AAPL", &[], None);
        assert_eq!(fused.signal_type, SignalType::Neutral);
        assert_eq!(fused.confidence, 0.0);
        assert_eq!(fused.reason, "no signals to fuse");
        assert!(fused.timestamp.is_none());
    }

    #[test]
    fn default_weights_are_equal() {
        let signals = vec![
            ("a", sig(SignalType::StrongBuy, 1.0)),
            ("b", sig(SignalType::Buy, 1.0)),
        ];
        let fused = fuse("AAPL", &signals, None);
        // 2 * 0.5 + 1 * 0.5
        assert!((fused.score - 1.5).abs() < 1e-12);
        assert_eq!(fused.signal_type, SignalType::Buy);
    }

    #[test]
    fn unnormalized_weights_can_reach_strong() {
        let signals = vec![
            ("a", sig(SignalType::StrongBuy, 0.9)),
            ("b", sig(SignalType::Buy, 0.8)),
        ];
        let fused = fuse("AAPL", &signals, Some(&[1.0, 1.0]));
        assert_eq!(fused.signal_type, SignalType::StrongBuy);
        assert!(fused.confidence <= 1.0);
    }

    #[test]
    fn negative_weight_counts_as_zero() {
        let signals = vec![
            ("a", sig(SignalType::Sell, 1.0)),
            ("b", sig(SignalType::Buy, 1.0)),
        ];
        let fused = fuse("AAPL", &signals, Some(&[-5.0, 1.0]));
        assert!((fused.score - 1.0).abs() < 1e-12);
        assert_eq!(fused.signal_type, SignalType::Buy);
    }

    #[test]
    fn zero_weights_give_zero_confidence() {
        let signals = vec![("a", sig(SignalType::Buy, 0.9))];
        let fused = fuse("AAPL", &signals, Some(&[0.0]));
        assert_eq!(fused.confidence, 0.0);
        assert_eq!(fused.signal_type, SignalType::Neutral);
    }

    #[test]
    fn indicators_prefixed_and_reasons_joined() {
        let mut late = sig(SignalType::Buy, 0.5).with_indicator("rsi", 25.0);
        late.timestamp = ts(9);
        let signals = vec![
            ("ma_crossover", sig(SignalType::Buy, 0.6).with_indicator("ma_fast", 10.0)),
            ("rsi_extreme", late),
        ];
        let fused = fuse("AAPL", &signals, None);
        assert_eq!(fused.indicators["ma_crossover.ma_fast"], 10.0);
        assert_eq!(fused.indicators["rsi_extreme.rsi"], 25.0);
        assert_eq!(fused.reason, "Buy (conf=60.00%) | Buy (conf=50.00%)");
        assert_eq!(fused.timestamp, Some(ts(9)));
    }

    #[test]
    fn confidence_weights_sum_to_one() {
        let signals = vec![
            ("a", sig(SignalType::Buy, 0.6)),
            ("b", sig(SignalType::Sell, 0.2)),
        ];
        let w = confidence_weights(&signals);
        assert!((w[0] - 0.75).abs() < 1e-12);
        assert!((w.iter().sum::<f64>() - 1.0).abs() < 1e-12);

        let zero = vec![("a", sig(SignalType::Buy, 0.0)), ("b", sig(SignalType::Buy, 0.0))];
        assert_eq!(confidence_weights(&zero), vec![0.5, 0.5]);
    }

    #[test]
    fn classify_thresholds_are_strict() {
        assert_eq!(classify(0.5), SignalType::Neutral);
        assert_eq!(classify(0.51), SignalType::Buy);
        assert_eq!(classify(1.5), SignalType::Buy);
        assert_eq!(classify(-1.51), SignalType::StrongSell);
        assert_eq!(classify(-0.6), SignalType::Sell);
    }
}
