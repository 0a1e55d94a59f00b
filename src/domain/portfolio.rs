//! Portfolio ledger: cash, positions, trade log and equity curve.
//!
//! Every accepted order mutates the ledger exactly once. Orders that would
//! overdraw cash or sell more than is held are rejected whole.

use chrono::NaiveDateTime;
use serde::Serialize;
use std::collections::BTreeMap;

use super::error::FusetraderError;
use super::position::{ClosedTrade, ExitReason, Position, PositionState, Side};

/// Quantities closer than this to zero are treated as flat.
const QTY_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EquityPoint {
    pub time: NaiveDateTime,
    pub value: f64,
}

/// Append-only trade log entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Trade {
    pub time: NaiveDateTime,
    pub side: Side,
    pub price: f64,
    pub quantity: f64,
    pub commission: f64,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Portfolio {
    pub cash: f64,
    pub initial_capital: f64,
    pub positions: BTreeMap<String, Position>,
    pub trades: Vec<Trade>,
    pub closed_trades: Vec<ClosedTrade>,
    pub equity_curve: Vec<EquityPoint>,
}

impl Portfolio {
    pub fn new(initial_capital: f64) -> Self {
        Portfolio {
            cash: initial_capital,
            initial_capital,
            positions: BTreeMap::new(),
            trades: Vec::new(),
            closed_trades: Vec::new(),
            equity_curve: Vec::new(),
        }
    }

    pub fn get_position(&self, symbol: &str) -> Option<&Position> {
        self.positions.get(symbol)
    }

    pub fn get_position_mut(&mut self, symbol: &str) -> Option<&mut Position> {
        self.positions.get_mut(symbol)
    }

    pub fn has_position(&self, symbol: &str) -> bool {
        self.positions.contains_key(symbol)
    }

    pub fn position_state(&self, symbol: &str) -> PositionState {
        if self.has_position(symbol) {
            PositionState::Open
        } else {
            PositionState::Flat
        }
    }

    pub fn position_count(&self) -> usize {
        self.positions.len()
    }

    pub fn held_quantity(&self, symbol: &str) -> f64 {
        self.positions.get(symbol).map_or(0.0, |p| p.quantity)
    }

    /// Buy `quantity` at `price`, opening or adding to a long position.
    pub fn buy(
        &mut self,
        symbol: &str,
        time: NaiveDateTime,
        price: f64,
        quantity: f64,
        commission: f64,
        reason: &str,
    ) -> Result<(), FusetraderError> {
        if quantity <= 0.0 || !quantity.is_finite() || price <= 0.0 {
            return Err(FusetraderError::InvalidOrder {
                reason: format!("buy {symbol}: quantity {quantity} at {price} is not tradeable"),
            });
        }
        let total_cost = quantity * price + commission;
        if total_cost > self.cash {
            return Err(FusetraderError::InvalidOrder {
                reason: format!(
                    "buy {symbol}: cost {total_cost:.2} exceeds cash {:.2}",
                    self.cash
                ),
            });
        }

        self.cash -= total_cost;
        match self.positions.get_mut(symbol) {
            Some(position) => {
                position.add_fill(quantity, price);
                position.entry_commission += commission;
            }
            None => {
                self.positions.insert(
                    symbol.to_string(),
                    Position {
                        symbol: symbol.to_string(),
                        quantity,
                        average_cost: price,
                        entry_time: time,
                        stop_loss: 0.0,
                        take_profit: 0.0,
                        bars_held: 0,
                        entry_commission: commission,
                    },
                );
            }
        }

        self.trades.push(Trade {
            time,
            side: Side::Buy,
            price,
            quantity,
            commission,
            reason: reason.to_string(),
        });
        Ok(())
    }

    /// Sell up to the held quantity and record the realized part as a
    /// [`ClosedTrade`]. A partial sell leaves the rest of the position open.
    pub fn sell(
        &mut self,
        symbol: &str,
        time: NaiveDateTime,
        price: f64,
        quantity: f64,
        commission: f64,
        exit_reason: ExitReason,
    ) -> Result<ClosedTrade, FusetraderError> {
        let held = self.held_quantity(symbol);
        if quantity <= 0.0 || !quantity.is_finite() || price <= 0.0 {
            return Err(FusetraderError::InvalidOrder {
                reason: format!("sell {symbol}: quantity {quantity} at {price} is not tradeable"),
            });
        }
        if quantity > held + QTY_EPSILON {
            return Err(FusetraderError::InvalidOrder {
                reason: format!("sell {symbol}: quantity {quantity} exceeds held {held}"),
            });
        }
        let quantity = quantity.min(held);
        let proceeds = quantity * price - commission;
        if self.cash + proceeds < 0.0 {
            return Err(FusetraderError::InvalidOrder {
                reason: format!("sell {symbol}: commission {commission:.2} overdraws cash"),
            });
        }

        let Some(position) = self.positions.get_mut(symbol) else {
            return Err(FusetraderError::InvalidOrder {
                reason: format!("sell {symbol}: no open position"),
            });
        };

        let fraction = quantity / position.quantity;
        let entry_commission = position.entry_commission * fraction;
        let pnl = quantity * (price - position.average_cost) - commission - entry_commission;

        position.quantity -= quantity;
        position.entry_commission -= entry_commission;
        let snapshot = position.clone();
        self.cash += proceeds;

        self.trades.push(Trade {
            time,
            side: Side::Sell,
            price,
            quantity,
            commission,
            reason: exit_reason.as_str().to_string(),
        });

        let remaining_quantity = if snapshot.quantity.abs() > QTY_EPSILON {
            snapshot.quantity
        } else {
            self.positions.remove(symbol);
            0.0
        };

        let closed = ClosedTrade {
            symbol: symbol.to_string(),
            quantity,
            entry_price: snapshot.average_cost,
            exit_price: price,
            entry_time: snapshot.entry_time,
            exit_time: time,
            pnl,
            exit_reason,
            remaining_quantity,
        };
        self.closed_trades.push(closed.clone());
        Ok(closed)
    }

    /// cash + Σ quantity × mark. Positions without a mark are valued at cost.
    pub fn total_equity(&self, marks: &BTreeMap<String, f64>) -> f64 {
        let position_value: f64 = self
            .positions
            .values()
            .map(|pos| {
                let mark = marks.get(&pos.symbol).copied().unwrap_or(pos.average_cost);
                pos.market_value(mark)
            })
            .sum();
        self.cash + position_value
    }

    /// Record a mark-to-market equity point and return its value.
    pub fn mark_to_market(&mut self, time: NaiveDateTime, marks: &BTreeMap<String, f64>) -> f64 {
        let value = self.total_equity(marks);
        self.equity_curve.push(EquityPoint { time, value });
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(day: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, day)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    fn marks(price: f64) -> BTreeMap<String, f64> {
        BTreeMap::from([("BTCUSDT".to_string(), price)])
    }

    #[test]
    fn new_portfolio() {
        let portfolio = Portfolio::new(100_000.0);
        assert!((portfolio.cash - 100_000.0).abs() < f64::EPSILON);
        assert!(portfolio.positions.is_empty());
        assert!(portfolio.trades.is_empty());
        assert!(portfolio.equity_curve.is_empty());
    }

    #[test]
    fn buy_opens_position_and_debits_cash() {
        let mut p = Portfolio::new(10_000.0);
        p.buy("BTCUSDT", at(1), 100.0, 10.0, 5.0, "entry").unwrap();
        assert!((p.cash - 8_995.0).abs() < 1e-9);
        assert!((p.held_quantity("BTCUSDT") - 10.0).abs() < f64::EPSILON);
        assert_eq!(p.trades.len(), 1);
        assert_eq!(p.trades[0].side, Side::Buy);
    }

    #[test]
    fn overdrawing_buy_is_rejected_whole() {
        let mut p = Portfolio::new(1_000.0);
        let err = p.buy("BTCUSDT", at(1), 100.0, 11.0, 0.0, "entry").unwrap_err();
        assert!(matches!(err, FusetraderError::InvalidOrder { .. }));
        assert!((p.cash - 1_000.0).abs() < f64::EPSILON);
        assert!(!p.has_position("BTCUSDT"));
        assert!(p.trades.is_empty());
    }

    #[test]
    fn overselling_is_rejected() {
        let mut p = Portfolio::new(10_000.0);
        p.buy("BTCUSDT", at(1), 100.0, 10.0, 0.0, "entry").unwrap();
        let err = p
            .sell("BTCUSDT", at(2), 110.0, 11.0, 0.0, ExitReason::OppositeSignal)
            .unwrap_err();
        assert!(matches!(err, FusetraderError::InvalidOrder { .. }));
        assert!((p.held_quantity("BTCUSDT") - 10.0).abs() < f64::EPSILON);
    }

    #[test]
    fn selling_without_position_is_rejected() {
        let mut p = Portfolio::new(10_000.0);
        assert!(p
            .sell("BTCUSDT", at(2), 110.0, 1.0, 0.0, ExitReason::StopLoss)
            .is_err());
    }

    #[test]
    fn full_sell_closes_trade_with_round_trip_commission() {
        let mut p = Portfolio::new(10_000.0);
        p.buy("BTCUSDT", at(1), 100.0, 10.0, 5.0, "entry").unwrap();
        let closed = p
            .sell("BTCUSDT", at(3), 110.0, 10.0, 5.0, ExitReason::TakeProfit)
            .unwrap();
        // 10 * 10 - 5 - 5
        assert!((closed.pnl - 90.0).abs() < 1e-9);
        assert_eq!(closed.exit_reason, ExitReason::TakeProfit);
        assert!(!p.has_position("BTCUSDT"));
        assert_eq!(p.position_state("BTCUSDT"), PositionState::Flat);
        assert!(!closed.is_partial());
        assert!((p.cash - 10_090.0).abs() < 1e-9);
        assert_eq!(p.closed_trades.len(), 1);
    }

    #[test]
    fn partial_sell_keeps_position_and_records_realized_pnl() {
        let mut p = Portfolio::new(10_000.0);
        p.buy("BTCUSDT", at(1), 100.0, 10.0, 2.0, "entry").unwrap();
        assert_eq!(p.position_state("BTCUSDT"), PositionState::Open);
        let closed = p
            .sell("BTCUSDT", at(2), 105.0, 4.0, 1.0, ExitReason::OppositeSignal)
            .unwrap();

        assert!(closed.is_partial());
        assert!((closed.remaining_quantity - 6.0).abs() < 1e-9);
        // 4 * 5 - 1 exit commission - 0.8 of the entry commission
        assert!((closed.pnl - 18.2).abs() < 1e-9);
        assert_eq!(p.closed_trades.len(), 1);
        assert!((p.held_quantity("BTCUSDT") - 6.0).abs() < 1e-9);
        assert_eq!(p.position_state("BTCUSDT"), PositionState::Open);

        let rest = p
            .sell("BTCUSDT", at(3), 110.0, 6.0, 1.0, ExitReason::TakeProfit)
            .unwrap();
        assert!(!rest.is_partial());
        assert_eq!(p.closed_trades.len(), 2);
        let realized: f64 = p.closed_trades.iter().map(|t| t.pnl).sum();
        assert!((p.cash - (10_000.0 + realized)).abs() < 1e-9);
    }

    #[test]
    fn ledger_identity_holds_at_every_mark() {
        let mut p = Portfolio::new(10_000.0);
        p.buy("BTCUSDT", at(1), 100.0, 10.0, 1.0, "entry").unwrap();
        let value = p.mark_to_market(at(1), &marks(120.0));
        let expected = p.cash + 10.0 * 120.0;
        assert!((value - expected).abs() < 1e-9);
        assert_eq!(p.equity_curve.len(), 1);
        assert!((p.equity_curve[0].value - expected).abs() < 1e-9);
    }
}
