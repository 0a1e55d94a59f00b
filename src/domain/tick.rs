//! Intra-bar tick synthesis.
//!
//! Each OHLCV bar is expanded into `k` ticks that walk the bar's price path:
//! open -> low -> high -> close for an up (or flat) candle, open -> high -> low -> close
//! for a down candle. Prices are sampled evenly along the three legs of that path,
//! so `k = 4` reproduces the four path prices exactly.

use chrono::{Duration, NaiveDateTime};
use serde::{Deserialize, Serialize};

use super::error::FusetraderError;
use super::ohlcv::OhlcvBar;

pub const DEFAULT_SPREAD: f64 = 0.001;
pub const DEFAULT_DEPTH_MULTIPLIER: f64 = 5.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tick {
    pub symbol: String,
    pub timestamp: NaiveDateTime,
    pub price: f64,
    pub volume: f64,
    pub bid: f64,
    pub ask: f64,
    pub bid_volume: f64,
    pub ask_volume: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TickConfig {
    /// Synthetic bid/ask spread as a fraction of price.
    pub spread: f64,
    /// Quoted size at the touch, as a multiple of tick volume.
    pub depth_multiplier: f64,
}

impl Default for TickConfig {
    fn default() -> Self {
        TickConfig {
            spread: DEFAULT_SPREAD,
            depth_multiplier: DEFAULT_DEPTH_MULTIPLIER,
        }
    }
}

/// Lazy, finite tick sequence for a single bar.
#[derive(Debug, Clone)]
pub struct BarTicks {
    symbol: String,
    start: NaiveDateTime,
    duration_ms: i64,
    path: [f64; 4],
    tick_volume: f64,
    count: usize,
    next: usize,
    config: TickConfig,
}

impl BarTicks {
    pub fn new(
        bar: &OhlcvBar,
        count: usize,
        duration: Duration,
        config: TickConfig,
    ) -> Result<Self, FusetraderError> {
        if count == 0 {
            return Err(FusetraderError::invalid(
                "execution",
                "ticks_per_bar",
                "ticks_per_bar must be at least 1",
            ));
        }
        let duration_ms = duration.num_milliseconds();
        if duration_ms <= 0 {
            return Err(FusetraderError::DataSource {
                reason: format!("bar for {} at {} has non-positive duration", bar.symbol, bar.time),
            });
        }

        let path = if bar.is_bullish() {
            [bar.open, bar.low, bar.high, bar.close]
        } else {
            [bar.open, bar.high, bar.low, bar.close]
        };

        Ok(BarTicks {
            symbol: bar.symbol.clone(),
            start: bar.time,
            duration_ms,
            path,
            tick_volume: bar.volume.max(0.0) / count as f64,
            count,
            next: 0,
            config,
        })
    }

    fn price_at(&self, i: usize) -> f64 {
        if self.count == 1 {
            return self.path[3];
        }
        let pos = i as f64 * 3.0 / (self.count - 1) as f64;
        let leg = (pos.floor() as usize).min(2);
        let frac = pos - leg as f64;
        self.path[leg] + (self.path[leg + 1] - self.path[leg]) * frac
    }

    fn tick_at(&self, i: usize) -> Tick {
        let price = self.price_at(i);
        let half_spread = price * self.config.spread / 2.0;
        let offset_ms = self.duration_ms * i as i64 / self.count as i64;
        let depth = self.tick_volume * self.config.depth_multiplier;

        Tick {
            symbol: self.symbol.clone(),
            timestamp: self.start + Duration::milliseconds(offset_ms),
            price,
            volume: self.tick_volume,
            bid: price - half_spread,
            ask: price + half_spread,
            bid_volume: depth,
            ask_volume: depth,
        }
    }
}

impl Iterator for BarTicks {
    type Item = Tick;

    fn next(&mut self) -> Option<Tick> {
        if self.next >= self.count {
            return None;
        }
        let tick = self.tick_at(self.next);
        self.next += 1;
        Some(tick)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.count - self.next;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for BarTicks {}

/// Duration of bar `i`, taken from the gap to the following bar (or the
/// preceding gap for the last bar, one day for a lone bar).
pub fn bar_duration(bars: &[OhlcvBar], i: usize) -> Duration {
    if i + 1 < bars.len() {
        bars[i + 1].time - bars[i].time
    } else if i > 0 {
        bars[i].time - bars[i - 1].time
    } else {
        Duration::days(1)
    }
}

/// Ticks for a whole bar series, in time order.
pub fn ticks_for_bars(
    bars: &[OhlcvBar],
    count: usize,
    config: TickConfig,
) -> Result<impl Iterator<Item = Tick>, FusetraderError> {
    let mut sources = Vec::with_capacity(bars.len());
    for (i, bar) in bars.iter().enumerate() {
        sources.push(BarTicks::new(bar, count, bar_duration(bars, i), config)?);
    }
    Ok(sources.into_iter().flatten())
}
