//! Strategies and the explicit strategy registry.
//!
//! A [`Strategy`] is an ordered set of signal generators plus a weighting
//! scheme for fusing their output. Strategies are looked up by identifier in a
//! [`StrategyRegistry`] the caller builds and owns.

use std::collections::BTreeMap;
use std::fmt;

use super::error::FusetraderError;
use super::fusion::{confidence_weights, fuse, FusedSignal};
use super::ohlcv::OhlcvBar;
use super::params::SignalParameters;
use super::signal::{
    AdaptiveMaCross, ChannelBreakout, Confluence, Divergence, MaCrossover, MaMode, MacdCrossover,
    PivotReversal, RsiExtreme, Signal, SignalGenerator, TrendStrength, VolatilityBreakout,
};

/// How fired signals are weighted when fused.
#[derive(Debug, Clone, PartialEq)]
pub enum WeightScheme {
    /// `1/N` over the signals that fired.
    Equal,
    /// One weight per generator, in generator order.
    Fixed(Vec<f64>),
    /// Proportional to each signal's confidence.
    Confidence,
}

pub struct Strategy {
    pub id: String,
    pub description: String,
    generators: Vec<Box<dyn SignalGenerator>>,
    weights: WeightScheme,
}

impl fmt::Debug for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Strategy")
            .field("id", &self.id)
            .field("generators", &self.generator_names())
            .field("weights", &self.weights)
            .finish()
    }
}

impl Strategy {
    pub fn new(
        id: &str,
        description: &str,
        generators: Vec<Box<dyn SignalGenerator>>,
        weights: WeightScheme,
    ) -> Self {
        Strategy {
            id: id.to_string(),
            description: description.to_string(),
            generators,
            weights,
        }
    }

    pub fn generator_names(&self) -> Vec<&str> {
        self.generators.iter().map(|g| g.name()).collect()
    }

    pub fn weights(&self) -> &WeightScheme {
        &self.weights
    }

    /// Longest generator lookback; shorter windows can never produce a trade.
    pub fn lookback(&self) -> usize {
        self.generators
            .iter()
            .map(|g| g.lookback())
            .max()
            .unwrap_or(0)
    }

    /// Run every generator over `window` and fuse what fires.
    pub fn decide(&self, symbol: &str, window: &[OhlcvBar]) -> FusedSignal {
        let mut fired: Vec<(&str, Signal)> = Vec::with_capacity(self.generators.len());
        let mut fixed = Vec::new();

        for (i, generator) in self.generators.iter().enumerate() {
            if window.len() < generator.lookback() {
                continue;
            }
            let Some(signal) = generator.evaluate(symbol, window) else {
                continue;
            };
            if let WeightScheme::Fixed(weights) = &self.weights {
                if let Some(&w) = weights.get(i) {
                    fixed.push(w);
                }
            }
            fired.push((generator.name(), signal));
        }

        match &self.weights {
            WeightScheme::Equal => fuse(symbol, &fired, None),
            WeightScheme::Fixed(_) => fuse(symbol, &fired, Some(&fixed)),
            WeightScheme::Confidence => {
                let weights = confidence_weights(&fired);
                fuse(symbol, &fired, Some(&weights))
            }
        }
    }
}

pub type StrategyFactory = fn(&SignalParameters) -> Strategy;

#[derive(Clone)]
struct RegistryEntry {
    description: &'static str,
    factory: StrategyFactory,
}

/// Strategy identifier to factory. Iteration order is by identifier.
#[derive(Clone, Default)]
pub struct StrategyRegistry {
    entries: BTreeMap<String, RegistryEntry>,
}

impl fmt::Debug for StrategyRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.entries.keys()).finish()
    }
}

impl StrategyRegistry {
    pub fn new() -> Self {
        StrategyRegistry::default()
    }

    pub fn with_builtins() -> Self {
        let mut registry = StrategyRegistry::new();
        registry.register(
            "ma_crossover",
            "fast/slow moving average alignment",
            ma_crossover,
        );
        registry.register("macd", "MACD line crossing its signal line", macd);
        registry.register(
            "mean_reversion",
            "RSI extremes, MACD divergence and zigzag reversals",
            mean_reversion,
        );
        registry.register(
            "trend_following",
            "channel and volatility breakouts, adaptive MA and ADX",
            trend_following,
        );
        registry.register(
            "seven_signal",
            "seven generators fused by confidence",
            seven_signal,
        );
        registry.register(
            "confluence",
            "six-condition confluence count with zigzag reversals",
            confluence,
        );
        registry
    }

    /// Add or replace a strategy. Returns true if `id` was already registered.
    pub fn register(&mut self, id: &str, description: &'static str, factory: StrategyFactory) -> bool {
        self.entries
            .insert(id.to_string(), RegistryEntry { description, factory })
            .is_some()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    pub fn ids(&self) -> Vec<&str> {
        self.entries.keys().map(String::as_str).collect()
    }

    /// `(id, description)` pairs.
    pub fn list(&self) -> Vec<(&str, &str)> {
        self.entries
            .iter()
            .map(|(id, entry)| (id.as_str(), entry.description))
            .collect()
    }

    /// Build strategy `id`. Configured `weights` replace the strategy's own
    /// scheme and must give one weight per generator.
    pub fn build(&self, id: &str, params: &SignalParameters) -> Result<Strategy, FusetraderError> {
        let entry = self
            .entries
            .get(id)
            .ok_or_else(|| FusetraderError::UnknownStrategy { id: id.to_string() })?;
        let mut strategy = (entry.factory)(params);

        if let Some(weights) = &params.weights {
            if weights.len() != strategy.generators.len() {
                return Err(FusetraderError::invalid(
                    "signals",
                    "weights",
                    format!(
                        "strategy {id} has {} generators but {} weights were given",
                        strategy.generators.len(),
                        weights.len()
                    ),
                ));
            }
            strategy.weights = WeightScheme::Fixed(weights.clone());
        }
        Ok(strategy)
    }
}

fn ma_signal(p: &SignalParameters, mode: MaMode) -> MaCrossover {
    MaCrossover::new(p.ma_fast_period, p.ma_slow_period, mode)
}

fn macd_signal(p: &SignalParameters) -> MacdCrossover {
    MacdCrossover {
        fast: p.macd_fast,
        slow: p.macd_slow,
        signal: p.macd_signal,
    }
}

fn rsi_signal(p: &SignalParameters) -> RsiExtreme {
    RsiExtreme {
        period: p.rsi_period,
        oversold: p.rsi_oversold,
        overbought: p.rsi_overbought,
    }
}

fn divergence_signal(p: &SignalParameters) -> Divergence {
    Divergence {
        fast: p.macd_fast,
        slow: p.macd_slow,
        signal: p.macd_signal,
        lookback: p.macd_divergence_lookback,
    }
}

fn pivot_signal(p: &SignalParameters) -> PivotReversal {
    PivotReversal {
        pct: p.zigzag_pct,
        tie_break: p.zigzag_tie_break,
    }
}

fn channel_signal(p: &SignalParameters) -> ChannelBreakout {
    ChannelBreakout {
        period: p.donchian_period,
    }
}

fn keltner_signal(p: &SignalParameters) -> VolatilityBreakout {
    VolatilityBreakout {
        ma_period: p.keltner_ma_period,
        atr_period: p.keltner_atr_period,
        multiplier: p.keltner_multiplier,
    }
}

fn kama_signal(p: &SignalParameters) -> AdaptiveMaCross {
    AdaptiveMaCross {
        efficiency_period: p.ama_efficiency_period,
        fast: p.ama_fast_period,
        slow: p.ama_slow_period,
    }
}

fn adx_signal(p: &SignalParameters) -> TrendStrength {
    TrendStrength {
        period: p.adx_period,
        threshold: p.adx_threshold,
    }
}

fn ma_crossover(p: &SignalParameters) -> Strategy {
    Strategy::new(
        "ma_crossover",
        "fast/slow moving average alignment",
        vec![Box::new(ma_signal(p, MaMode::Alignment))],
        WeightScheme::Equal,
    )
}

fn macd(p: &SignalParameters) -> Strategy {
    Strategy::new(
        "macd",
        "MACD line crossing its signal line",
        vec![Box::new(macd_signal(p))],
        WeightScheme::Equal,
    )
}

// Unit weights: a lone RSI extreme (0.5) stays neutral, a second vote tips it.
fn mean_reversion(p: &SignalParameters) -> Strategy {
    Strategy::new(
        "mean_reversion",
        "RSI extremes, MACD divergence and zigzag reversals",
        vec![
            Box::new(rsi_signal(p)),
            Box::new(divergence_signal(p)),
            Box::new(pivot_signal(p)),
        ],
        WeightScheme::Fixed(vec![1.0; 3]),
    )
}

fn trend_following(p: &SignalParameters) -> Strategy {
    Strategy::new(
        "trend_following",
        "channel and volatility breakouts, adaptive MA and ADX",
        vec![
            Box::new(channel_signal(p)),
            Box::new(keltner_signal(p)),
            Box::new(kama_signal(p)),
            Box::new(adx_signal(p)),
        ],
        WeightScheme::Equal,
    )
}

fn seven_signal(p: &SignalParameters) -> Strategy {
    Strategy::new(
        "seven_signal",
        "seven generators fused by confidence",
        vec![
            Box::new(channel_signal(p)),
            Box::new(ma_signal(p, MaMode::Alignment)),
            Box::new(kama_signal(p)),
            Box::new(keltner_signal(p)),
            Box::new(rsi_signal(p)),
            Box::new(divergence_signal(p)),
            Box::new(adx_signal(p)),
        ],
        WeightScheme::Confidence,
    )
}

fn confluence(p: &SignalParameters) -> Strategy {
    Strategy::new(
        "confluence",
        "six-condition confluence count with zigzag reversals",
        vec![
            Box::new(Confluence::new(p.confluence_threshold)),
            Box::new(pivot_signal(p)),
        ],
        WeightScheme::Equal,
    )
}
