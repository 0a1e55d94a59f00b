//! Time-weighted average price execution.
//!
//! The order is cut into `slice_count` equal slices, one per `slice_interval`,
//! starting at `start_time`. A slice fills in full at the touch on the first
//! tick at or after its scheduled boundary.

use chrono::{Duration, NaiveDateTime};
use tracing::debug;

use super::{AlgoFill, AlgoStatus, ExecutionAlgorithm};
use crate::domain::error::FusetraderError;
use crate::domain::order_book::OrderBook;
use crate::domain::position::Side;
use crate::domain::tick::Tick;

#[derive(Debug, Clone, PartialEq)]
pub struct TwapConfig {
    pub total_quantity: f64,
    pub side: Side,
    pub start_time: NaiveDateTime,
    pub end_time: NaiveDateTime,
    pub slice_count: usize,
}

#[derive(Debug, Clone)]
pub struct Twap {
    config: TwapConfig,
    slice_quantity: f64,
    slice_interval: Duration,
    next_slice_time: NaiveDateTime,
    slices_done: usize,
    filled: f64,
    fills: Vec<AlgoFill>,
    status: AlgoStatus,
}

impl Twap {
    pub fn new(config: TwapConfig) -> Result<Self, FusetraderError> {
        if config.slice_count == 0 || config.slice_count > i32::MAX as usize {
            return Err(FusetraderError::invalid(
                "execution",
                "twap_slices",
                "slice count must be positive",
            ));
        }
        if config.total_quantity <= 0.0 || !config.total_quantity.is_finite() {
            return Err(FusetraderError::invalid(
                "execution",
                "total_quantity",
                "total quantity must be positive",
            ));
        }
        if config.end_time <= config.start_time {
            return Err(FusetraderError::invalid(
                "execution",
                "end_time",
                "end time must be after start time",
            ));
        }

        let slice_quantity = config.total_quantity / config.slice_count as f64;
        let slice_interval = (config.end_time - config.start_time) / config.slice_count as i32;

        Ok(Twap {
            slice_quantity,
            slice_interval,
            next_slice_time: config.start_time,
            slices_done: 0,
            filled: 0.0,
            fills: Vec::with_capacity(config.slice_count),
            status: AlgoStatus::Pending,
            config,
        })
    }

    pub fn config(&self) -> &TwapConfig {
        &self.config
    }

    pub fn slice_quantity(&self) -> f64 {
        self.slice_quantity
    }

    pub fn slices_done(&self) -> usize {
        self.slices_done
    }

    pub fn remaining_quantity(&self) -> f64 {
        (self.config.total_quantity - self.filled).max(0.0)
    }

    /// Volume-weighted price over the fills so far.
    pub fn average_price(&self) -> Option<f64> {
        if self.filled <= 0.0 {
            return None;
        }
        let notional: f64 = self.fills.iter().map(|f| f.price * f.quantity).sum();
        Some(notional / self.filled)
    }
}

impl ExecutionAlgorithm for Twap {
    fn on_tick(&mut self, tick: &Tick, book: &OrderBook) -> Vec<AlgoFill> {
        if self.status == AlgoStatus::Finished || tick.timestamp < self.config.start_time {
            return Vec::new();
        }
        self.status = AlgoStatus::Running;

        if tick.timestamp < self.next_slice_time || self.slices_done >= self.config.slice_count {
            return Vec::new();
        }

        let price = match (self.config.side, book.is_ready()) {
            (Side::Buy, true) => book.best_ask(),
            (Side::Sell, true) => book.best_bid(),
            (Side::Buy, false) => tick.ask,
            (Side::Sell, false) => tick.bid,
        };

        // last slice takes the exact remainder
        let quantity = if self.slices_done + 1 == self.config.slice_count {
            self.remaining_quantity()
        } else {
            self.slice_quantity.min(self.remaining_quantity())
        };

        let fill = AlgoFill {
            time: tick.timestamp,
            price,
            quantity,
            side: self.config.side,
        };
        self.fills.push(fill.clone());
        self.filled += quantity;
        self.slices_done += 1;
        self.next_slice_time += self.slice_interval;

        debug!(
            slice = self.slices_done,
            price, quantity, "twap slice filled"
        );

        if self.slices_done >= self.config.slice_count
            || self.filled >= self.config.total_quantity
        {
            self.status = AlgoStatus::Finished;
        }

        vec![fill]
    }

    fn status(&self) -> AlgoStatus {
        self.status
    }

    fn fills(&self) -> &[AlgoFill] {
        &self.fills
    }

    fn filled_quantity(&self) -> f64 {
        self.filled
    }
}
