//! Stateful execution algorithms driven by ticks.
//!
//! Every algorithm moves through `Pending -> Running -> Finished` and records an
//! append-only fill log. Fills are assumed to be satisfied in full at the price
//! reported; there is no market-impact model.

pub mod grid;
pub mod twap;

use chrono::NaiveDateTime;
use serde::Serialize;

use super::order_book::OrderBook;
use super::position::Side;
use super::tick::Tick;

pub use grid::{Grid, GridConfig, GridOrder};
pub use twap::{Twap, TwapConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AlgoStatus {
    Pending,
    Running,
    Finished,
}

/// One entry of an algorithm's fill log.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlgoFill {
    pub time: NaiveDateTime,
    pub price: f64,
    pub quantity: f64,
    pub side: Side,
}

pub trait ExecutionAlgorithm {
    /// Feed one tick. Returns the fills produced by this tick, in order.
    fn on_tick(&mut self, tick: &Tick, book: &OrderBook) -> Vec<AlgoFill>;

    fn status(&self) -> AlgoStatus;

    fn fills(&self) -> &[AlgoFill];

    fn filled_quantity(&self) -> f64;
}

/// Drive an algorithm over a tick stream, keeping the book current.
pub fn drive<A, I>(algo: &mut A, book: &mut OrderBook, ticks: I) -> Vec<AlgoFill>
where
    A: ExecutionAlgorithm + ?Sized,
    I: IntoIterator<Item = Tick>,
{
    let mut produced = Vec::new();
    for tick in ticks {
        book.update(&tick);
        produced.extend(algo.on_tick(&tick, book));
        if algo.status() == AlgoStatus::Finished {
            break;
        }
    }
    produced
}
