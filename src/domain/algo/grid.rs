//! Grid trading.
//!
//! Resting limit orders sit on evenly spaced price lines between `lower_limit`
//! and `upper_limit`. A filled buy is replaced by a sell one step above, and a
//! filled sell by a buy one step below, so the number of resting orders never
//! changes. The grid never finishes on its own.

use chrono::NaiveDateTime;
use serde::Serialize;
use tracing::debug;

use super::{AlgoFill, AlgoStatus, ExecutionAlgorithm};
use crate::domain::error::FusetraderError;
use crate::domain::order_book::OrderBook;
use crate::domain::position::Side;
use crate::domain::tick::Tick;

#[derive(Debug, Clone, PartialEq)]
pub struct GridConfig {
    pub lower_limit: f64,
    pub upper_limit: f64,
    pub grid_count: usize,
    pub capital_per_grid: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GridOrder {
    pub price: f64,
    pub quantity: f64,
    pub side: Side,
}

#[derive(Debug, Clone)]
pub struct Grid {
    config: GridConfig,
    step: f64,
    orders: Vec<GridOrder>,
    fills: Vec<AlgoFill>,
    inventory: f64,
    filled: f64,
    status: AlgoStatus,
}

impl Grid {
    pub fn new(config: GridConfig, initial_price: f64) -> Result<Self, FusetraderError> {
        validate(&config, initial_price)?;

        let step = (config.upper_limit - config.lower_limit) / config.grid_count as f64;
        let orders = (0..=config.grid_count)
            .map(|i| config.lower_limit + i as f64 * step)
            .filter(|&level| level < initial_price)
            .map(|level| GridOrder {
                price: level,
                quantity: config.capital_per_grid / level,
                side: Side::Buy,
            })
            .collect();

        Ok(Grid {
            config,
            step,
            orders,
            fills: Vec::new(),
            inventory: 0.0,
            filled: 0.0,
            status: AlgoStatus::Pending,
        })
    }

    pub fn step(&self) -> f64 {
        self.step
    }

    pub fn config(&self) -> &GridConfig {
        &self.config
    }

    pub fn active_orders(&self) -> &[GridOrder] {
        &self.orders
    }

    /// Net quantity bought minus sold.
    pub fn inventory(&self) -> f64 {
        self.inventory
    }

    fn record(&mut self, time: NaiveDateTime, order: &GridOrder) -> AlgoFill {
        let fill = AlgoFill {
            time,
            price: order.price,
            quantity: order.quantity,
            side: order.side,
        };
        match order.side {
            Side::Buy => self.inventory += order.quantity,
            Side::Sell => self.inventory -= order.quantity,
        }
        self.filled += order.quantity;
        self.fills.push(fill.clone());
        fill
    }
}

fn validate(config: &GridConfig, initial_price: f64) -> Result<(), FusetraderError> {
    if !config.lower_limit.is_finite() || config.lower_limit <= 0.0 {
        return Err(FusetraderError::invalid(
            "grid",
            "lower_limit",
            "lower limit must be a positive price",
        ));
    }
    if !config.upper_limit.is_finite() || config.upper_limit <= config.lower_limit {
        return Err(FusetraderError::invalid(
            "grid",
            "upper_limit",
            "upper limit must be above lower limit",
        ));
    }
    if config.grid_count == 0 {
        return Err(FusetraderError::invalid(
            "grid",
            "grid_count",
            "grid count must be positive",
        ));
    }
    if config.capital_per_grid <= 0.0 || !config.capital_per_grid.is_finite() {
        return Err(FusetraderError::invalid(
            "grid",
            "capital_per_grid",
            "capital per grid must be positive",
        ));
    }
    if initial_price <= config.lower_limit || initial_price > config.upper_limit {
        return Err(FusetraderError::invalid(
            "grid",
            "initial_price",
            "initial price must lie inside (lower_limit, upper_limit]",
        ));
    }
    Ok(())
}

impl ExecutionAlgorithm for Grid {
    fn on_tick(&mut self, tick: &Tick, _book: &OrderBook) -> Vec<AlgoFill> {
        self.status = AlgoStatus::Running;

        let price = tick.price;
        let step = self.step;
        let mut produced = Vec::new();

        // replace in place: orders created by this tick are not re-evaluated until the next one
        for i in 0..self.orders.len() {
            let order = self.orders[i].clone();
            let replacement = match order.side {
                Side::Buy if order.price >= price => GridOrder {
                    price: order.price + step,
                    quantity: order.quantity,
                    side: Side::Sell,
                },
                Side::Sell if order.price <= price => GridOrder {
                    price: order.price - step,
                    quantity: order.quantity,
                    side: Side::Buy,
                },
                _ => continue,
            };
            produced.push(self.record(tick.timestamp, &order));
            debug!(side = ?order.side, price = order.price, "grid order filled");
            self.orders[i] = replacement;
        }

        produced
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
