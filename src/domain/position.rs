//! Position tracking and the per-symbol position state machine.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Long,
    Short,
}

impl Direction {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "long" | "buy" => Some(Direction::Long),
            "short" | "sell" => Some(Direction::Short),
            _ => None,
        }
    }
}

/// `Flat -> Open -> Flat`; at most one open position per symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PositionState {
    Flat,
    Open,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    OppositeSignal,
    StopLoss,
    TakeProfit,
    TimeStop,
}

impl ExitReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExitReason::OppositeSignal => "opposite_signal",
            ExitReason::StopLoss => "stop_loss",
            ExitReason::TakeProfit => "take_profit",
            ExitReason::TimeStop => "time_stop",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Position {
    pub symbol: String,
    /// Signed: positive is long, negative is short.
    pub quantity: f64,
    pub average_cost: f64,
    pub entry_time: NaiveDateTime,
    pub stop_loss: f64,
    pub take_profit: f64,
    pub bars_held: usize,
    /// Commission paid on entry fills not yet released by a close.
    pub entry_commission: f64,
}

impl Position {
    pub fn is_long(&self) -> bool {
        self.quantity > 0.0
    }

    pub fn is_short(&self) -> bool {
        self.quantity < 0.0
    }

    pub fn market_value(&self, price: f64) -> f64 {
        self.quantity * price
    }

    pub fn unrealized_pnl(&self, price: f64) -> f64 {
        self.quantity * (price - self.average_cost)
    }

    /// Unrealized P&L as a fraction of cost basis.
    pub fn unrealized_pnl_pct(&self, price: f64) -> f64 {
        let basis = self.quantity.abs() * self.average_cost;
        if basis <= 0.0 {
            return 0.0;
        }
        self.unrealized_pnl(price) / basis
    }

    pub fn should_stop_loss(&self, price: f64) -> bool {
        if self.stop_loss == 0.0 {
            return false;
        }
        if self.is_long() {
            price <= self.stop_loss
        } else {
            price >= self.stop_loss
        }
    }

    pub fn should_take_profit(&self, price: f64) -> bool {
        if self.take_profit == 0.0 {
            return false;
        }
        if self.is_long() {
            price >= self.take_profit
        } else {
            price <= self.take_profit
        }
    }

    /// Fold another fill of the same direction into the position's average cost.
    pub fn add_fill(&mut self, quantity: f64, price: f64) {
        let total = self.quantity + quantity;
        if total.abs() > 0.0 {
            self.average_cost =
                (self.quantity * self.average_cost + quantity * price) / total;
        }
        self.quantity = total;
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClosedTrade {
    pub symbol: String,
    pub quantity: f64,
    pub entry_price: f64,
    pub exit_price: f64,
    pub entry_time: NaiveDateTime,
    pub exit_time: NaiveDateTime,
    pub pnl: f64,
    pub exit_reason: ExitReason,
    /// Quantity still held after this exit; zero for a full close.
    pub remaining_quantity: f64,
}

impl ClosedTrade {
    pub fn is_partial(&self) -> bool {
        self.remaining_quantity > 0.0
    }
}
