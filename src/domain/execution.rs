//! Fill arithmetic: slippage, commission and quantity sizing.
//!
//! Applies bar-close and algorithm fills to the [`Portfolio`]. Commission is a
//! flat fee plus a percentage of notional; slippage moves the execution price
//! against the trader by `slippage_pct` percent.

use chrono::NaiveDateTime;

use super::algo::AlgoFill;
use super::error::FusetraderError;
use super::portfolio::Portfolio;
use super::position::{ClosedTrade, ExitReason, Side};

#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionConfig {
    pub commission_per_trade: f64,
    pub commission_pct: f64,
    pub slippage_pct: f64,
    /// Quantities are rounded down to a multiple of this.
    pub lot_size: f64,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        ExecutionConfig {
            commission_per_trade: 0.0,
            commission_pct: 0.0,
            slippage_pct: 0.0,
            lot_size: 1.0,
        }
    }
}

/// flat_fee + (trade_value * pct / 100)
pub fn calculate_commission(trade_value: f64, config: &ExecutionConfig) -> f64 {
    config.commission_per_trade + (trade_value * config.commission_pct / 100.0)
}

/// Buys execute above the quoted price, sells below.
pub fn apply_slippage(market_price: f64, side: Side, slippage_pct: f64) -> f64 {
    match side {
        Side::Buy => market_price * (1.0 + slippage_pct / 100.0),
        Side::Sell => market_price * (1.0 - slippage_pct / 100.0),
    }
}

/// Largest multiple of `lot_size` whose notional at `price` fits in `notional`.
pub fn lot_quantity(notional: f64, price: f64, lot_size: f64) -> f64 {
    if notional <= 0.0 || price <= 0.0 || !notional.is_finite() {
        return 0.0;
    }
    let raw = notional / price;
    if lot_size > 0.0 {
        (raw / lot_size).floor() * lot_size
    } else {
        raw
    }
}

/// Largest lot-rounded quantity whose cost at `execution_price`, plus the
/// commission charged on each of `fills` fills, fits in `notional`.
pub fn affordable_quantity(
    notional: f64,
    execution_price: f64,
    fills: usize,
    config: &ExecutionConfig,
) -> f64 {
    let net = notional - config.commission_per_trade * fills.max(1) as f64;
    let gross_price = execution_price * (1.0 + config.commission_pct / 100.0);
    let quantity = lot_quantity(net, gross_price, config.lot_size);
    if config.lot_size > 0.0 {
        quantity
    } else {
        // unrounded quantities can land a rounding error above `notional`
        quantity * (1.0 - 1e-10)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EntryResult {
    pub quantity: f64,
    pub execution_price: f64,
    pub cost: f64,
    pub commission: f64,
}

/// Buy `quantity` of `symbol` at the slipped market price.
pub fn enter_long(
    portfolio: &mut Portfolio,
    symbol: &str,
    market_price: f64,
    time: NaiveDateTime,
    quantity: f64,
    reason: &str,
    config: &ExecutionConfig,
) -> Result<EntryResult, FusetraderError> {
    let execution_price = apply_slippage(market_price, Side::Buy, config.slippage_pct);
    let cost = quantity * execution_price;
    let commission = calculate_commission(cost, config);
    portfolio.buy(symbol, time, execution_price, quantity, commission, reason)?;

    Ok(EntryResult {
        quantity,
        execution_price,
        cost,
        commission,
    })
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExitResult {
    pub quantity: f64,
    pub exit_price: f64,
    pub exit_value: f64,
    pub exit_commission: f64,
    pub pnl: f64,
}

/// Close the entire holding of `symbol`.
pub fn exit_long(
    portfolio: &mut Portfolio,
    symbol: &str,
    market_price: f64,
    time: NaiveDateTime,
    exit_reason: ExitReason,
    config: &ExecutionConfig,
) -> Result<ExitResult, FusetraderError> {
    let quantity = portfolio.held_quantity(symbol);
    let exit_price = apply_slippage(market_price, Side::Sell, config.slippage_pct);
    let exit_value = quantity * exit_price;
    let exit_commission = calculate_commission(exit_value, config);

    let closed: ClosedTrade =
        portfolio.sell(symbol, time, exit_price, quantity, exit_commission, exit_reason)?;

    Ok(ExitResult {
        quantity,
        exit_price,
        exit_value,
        exit_commission,
        pnl: closed.pnl,
    })
}

/// Book an execution-algorithm fill against the portfolio.
pub fn apply_algo_fill(
    portfolio: &mut Portfolio,
    symbol: &str,
    fill: &AlgoFill,
    reason: &str,
    config: &ExecutionConfig,
) -> Result<(), FusetraderError> {
    let commission = calculate_commission(fill.quantity * fill.price, config);
    match fill.side {
        Side::Buy => portfolio.buy(symbol, fill.time, fill.price, fill.quantity, commission, reason),
        Side::Sell => portfolio
            .sell(
                symbol,
                fill.time,
                fill.price,
                fill.quantity,
                commission,
                ExitReason::OppositeSignal,
            )
            .map(|_| ()),
    }
}
