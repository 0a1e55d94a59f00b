//! Top-of-book tracking.
//!
//! Infinite depth is assumed at the best price; there is no queue or partial-fill modelling.

use serde::Serialize;

use super::tick::Tick;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct OrderBookSnapshot {
    pub best_bid: f64,
    pub best_ask: f64,
}

#[derive(Debug, Clone, Default)]
pub struct OrderBook {
    snapshot: OrderBookSnapshot,
    updated: bool,
}

impl OrderBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, tick: &Tick) {
        self.snapshot.best_bid = tick.bid;
        self.snapshot.best_ask = tick.ask;
        self.updated = true;
    }

    /// Price a market sell executes at.
    pub fn best_bid(&self) -> f64 {
        self.snapshot.best_bid
    }

    /// Price a market buy executes at.
    pub fn best_ask(&self) -> f64 {
        self.snapshot.best_ask
    }

    pub fn mid(&self) -> f64 {
        (self.snapshot.best_bid + self.snapshot.best_ask) / 2.0
    }

    pub fn spread(&self) -> f64 {
        self.snapshot.best_ask - self.snapshot.best_bid
    }

    pub fn is_ready(&self) -> bool {
        self.updated
    }

    pub fn snapshot(&self) -> OrderBookSnapshot {
        self.snapshot
    }
}
