//! Backtest engine and event loop.
//!
//! A run replays one symbol's bars in time order against a fresh portfolio,
//! order book and risk manager. Each bar:
//!
//! 1. fills a TWAP entry scheduled on the previous bar,
//! 2. checks stop-loss, take-profit and time-stop exits,
//! 3. fuses the strategy's signals over the bars seen so far,
//! 4. closes on an opposing decision,
//! 5. opens a long position on a bullish decision the risk manager accepts,
//! 6. records equity.
//!
//! Entries are sized on the expected execution price with commission taken
//! out first, so a full allocation stays within cash. Rejected orders are
//! logged and the run continues.

use chrono::{Datelike, NaiveDateTime};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

use super::algo::{drive, AlgoFill, Twap, TwapConfig};
use super::batch::CancelToken;
use super::config_validation::{validate_backtest_config, validate_risk_parameters};
use super::error::FusetraderError;
use super::execution::{
    affordable_quantity, apply_algo_fill, apply_slippage, enter_long, exit_long, ExecutionConfig,
};
use super::indicator::atr::{self, atr};
use super::metrics::PerformanceMetrics;
use super::ohlcv::OhlcvBar;
use super::order_book::OrderBook;
use super::portfolio::{EquityPoint, Portfolio, Trade};
use super::position::{ClosedTrade, Direction, ExitReason, Position, PositionState, Side};
use super::risk::{RiskManager, RiskParameters, SizingMethod, StopMethod};
use super::strategy::Strategy;
use super::tick::{bar_duration, BarTicks, TickConfig};

/// How an accepted entry reaches the market.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "snake_case", tag = "mode")]
pub enum ExecutionMode {
    /// Fill at the signal bar's close.
    BarClose,
    /// Slice the order across the next bar's synthesized ticks.
    Twap {
        slices: usize,
        ticks_per_bar: usize,
        spread: f64,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct BacktestConfig {
    pub initial_capital: f64,
    pub execution: ExecutionConfig,
    pub risk_free_rate: f64,
    pub atr_period: usize,
    /// Minimum fused type value that opens a position.
    pub entry_threshold: i32,
    /// A fused type value at or below the negation closes one.
    pub exit_threshold: i32,
    pub stop_method: StopMethod,
    pub mode: ExecutionMode,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        BacktestConfig {
            initial_capital: 100_000.0,
            execution: ExecutionConfig::default(),
            risk_free_rate: 0.05,
            atr_period: atr::DEFAULT_PERIOD,
            entry_threshold: 1,
            exit_threshold: 1,
            stop_method: StopMethod::Atr,
            mode: ExecutionMode::BarClose,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BacktestResult {
    pub symbol: String,
    pub strategy: String,
    pub trades: Vec<Trade>,
    pub closed_trades: Vec<ClosedTrade>,
    pub equity_curve: Vec<EquityPoint>,
    pub metrics: PerformanceMetrics,
    pub final_equity: f64,
    /// Position still held after the last bar, marked at its close.
    pub open_position: Option<Position>,
}

#[derive(Debug, Clone)]
struct PendingEntry {
    quantity: f64,
    atr: f64,
    reason: String,
}

struct RunState {
    portfolio: Portfolio,
    risk: RiskManager,
    book: OrderBook,
    pending: Option<PendingEntry>,
}

#[derive(Debug)]
pub struct BacktestEngine<'a> {
    config: BacktestConfig,
    strategy: &'a Strategy,
    risk: RiskParameters,
}

impl<'a> BacktestEngine<'a> {
    pub fn new(
        config: BacktestConfig,
        strategy: &'a Strategy,
        risk: RiskParameters,
    ) -> Result<Self, FusetraderError> {
        validate_backtest_config(&config)?;
        validate_risk_parameters(&risk)?;
        Ok(BacktestEngine {
            config,
            strategy,
            risk,
        })
    }

    pub fn config(&self) -> &BacktestConfig {
        &self.config
    }

    pub fn strategy(&self) -> &Strategy {
        self.strategy
    }

    pub fn run(&self, symbol: &str, bars: &[OhlcvBar]) -> Result<BacktestResult, FusetraderError> {
        self.run_with_cancel(symbol, bars, &CancelToken::new())
    }

    pub fn run_with_cancel(
        &self,
        symbol: &str,
        bars: &[OhlcvBar],
        cancel: &CancelToken,
    ) -> Result<BacktestResult, FusetraderError> {
        if bars.is_empty() {
            return Err(FusetraderError::NoData {
                symbol: symbol.to_string(),
            });
        }
        let minimum = self.strategy.lookback().max(1);
        if bars.len() < minimum {
            return Err(FusetraderError::InsufficientData {
                symbol: symbol.to_string(),
                bars: bars.len(),
                minimum,
            });
        }

        info!(
            symbol,
            strategy = %self.strategy.id,
            bars = bars.len(),
            "backtest started"
        );

        let atr_series = atr(bars, self.config.atr_period);
        let mut state = RunState {
            portfolio: Portfolio::new(self.config.initial_capital),
            risk: RiskManager::new(self.risk.clone()),
            book: OrderBook::new(),
            pending: None,
        };

        for (i, bar) in bars.iter().enumerate() {
            if cancel.is_cancelled() {
                warn!(symbol, bar = i, "backtest cancelled");
                return Err(FusetraderError::Cancelled {
                    symbol: symbol.to_string(),
                });
            }

            let entered = match state.pending.take() {
                Some(pending) => self.fill_pending(&mut state, symbol, bars, i, pending)?,
                None => false,
            };
            if !entered {
                self.check_exits(&mut state, symbol, bar);
            }

            let decision = self.strategy.decide(symbol, &bars[..=i]);
            let value = decision.signal_type.value();

            let position_state = state.portfolio.position_state(symbol);
            if position_state == PositionState::Open && value <= -self.config.exit_threshold {
                self.close(
                    &mut state.portfolio,
                    symbol,
                    bar.time,
                    bar.close,
                    ExitReason::OppositeSignal,
                );
            }

            if state.portfolio.position_state(symbol) == PositionState::Flat
                && state.pending.is_none()
                && value >= self.config.entry_threshold
            {
                self.try_enter(&mut state, symbol, bars, i, atr_series[i], &decision.reason);
            }

            let marks = BTreeMap::from([(symbol.to_string(), bar.close)]);
            let equity = state.portfolio.mark_to_market(bar.time, &marks);
            state.risk.check_drawdown_limit(equity);
        }

        if state.pending.is_some() {
            debug!(symbol, "entry signalled on the final bar was never executed");
        }

        let metrics = PerformanceMetrics::compute(
            &state.portfolio.equity_curve,
            &state.portfolio.closed_trades,
            self.config.initial_capital,
            self.config.risk_free_rate,
        );
        let final_equity = state
            .portfolio
            .equity_curve
            .last()
            .map_or(self.config.initial_capital, |p| p.value);

        info!(
            symbol,
            trades = state.portfolio.closed_trades.len(),
            final_equity,
            total_return = metrics.total_return,
            "backtest finished"
        );

        let mut portfolio = state.portfolio;
        Ok(BacktestResult {
            symbol: symbol.to_string(),
            strategy: self.strategy.id.clone(),
            open_position: portfolio.positions.remove(symbol),
            trades: portfolio.trades,
            closed_trades: portfolio.closed_trades,
            equity_curve: portfolio.equity_curve,
            metrics,
            final_equity,
        })
    }

    /// Drive a scheduled TWAP entry across bar `i`. Returns true if anything filled.
    fn fill_pending(
        &self,
        state: &mut RunState,
        symbol: &str,
        bars: &[OhlcvBar],
        i: usize,
        pending: PendingEntry,
    ) -> Result<bool, FusetraderError> {
        let ExecutionMode::Twap {
            slices,
            ticks_per_bar,
            spread,
        } = self.config.mode
        else {
            return Ok(false);
        };

        let bar = &bars[i];
        let duration = bar_duration(bars, i);
        let mut twap = Twap::new(TwapConfig {
            total_quantity: pending.quantity,
            side: Side::Buy,
            start_time: bar.time,
            end_time: bar.time + duration,
            slice_count: slices,
        })?;
        let ticks = BarTicks::new(
            bar,
            ticks_per_bar,
            duration,
            TickConfig {
                spread,
                ..TickConfig::default()
            },
        )?;

        let fills = drive(&mut twap, &mut state.book, ticks);
        for fill in fills {
            // later slices can print above the price the entry was sized on
            let affordable =
                affordable_quantity(state.portfolio.cash, fill.price, 1, &self.config.execution);
            let quantity = fill.quantity.min(affordable);
            if quantity <= 0.0 {
                warn!(symbol, price = fill.price, quantity = fill.quantity, "twap slice skipped: cash exhausted");
                continue;
            }
            if quantity < fill.quantity {
                debug!(symbol, requested = fill.quantity, quantity, "twap slice trimmed to cash");
            }
            let fill = AlgoFill { quantity, ..fill };
            if let Err(e) =
                apply_algo_fill(&mut state.portfolio, symbol, &fill, &pending.reason, &self.config.execution)
            {
                warn!(symbol, price = fill.price, quantity = fill.quantity, error = %e, "twap slice rejected");
            }
        }

        let Some(average_cost) = state.portfolio.get_position(symbol).map(|p| p.average_cost) else {
            return Ok(false);
        };
        let stops = state.risk.calculate_stops(
            average_cost,
            pending.atr,
            Direction::Long,
            self.config.stop_method,
        );
        if let Some(position) = state.portfolio.get_position_mut(symbol) {
            position.stop_loss = stops.stop_loss;
            position.take_profit = stops.take_profit;
            debug!(
                symbol,
                quantity = position.quantity,
                average_cost,
                stop_loss = stops.stop_loss,
                take_profit = stops.take_profit,
                "twap entry filled"
            );
        }
        Ok(true)
    }

    /// Stop-loss beats take-profit when one bar touches both; the time stop
    /// is judged on the close.
    fn check_exits(&self, state: &mut RunState, symbol: &str, bar: &OhlcvBar) {
        let Some(position) = state.portfolio.get_position_mut(symbol) else {
            return;
        };
        position.bars_held += 1;

        let exit = if position.should_stop_loss(bar.low) {
            Some((position.stop_loss.min(bar.open), ExitReason::StopLoss))
        } else if position.should_take_profit(bar.high) {
            Some((position.take_profit.max(bar.open), ExitReason::TakeProfit))
        } else if state
            .risk
            .should_time_stop(position.bars_held, position.unrealized_pnl_pct(bar.close))
        {
            Some((bar.close, ExitReason::TimeStop))
        } else {
            None
        };

        if let Some((price, reason)) = exit {
            self.close(&mut state.portfolio, symbol, bar.time, price, reason);
        }
    }

    fn close(
        &self,
        portfolio: &mut Portfolio,
        symbol: &str,
        time: NaiveDateTime,
        price: f64,
        reason: ExitReason,
    ) {
        match exit_long(portfolio, symbol, price, time, reason, &self.config.execution) {
            Ok(exit) => debug!(
                symbol,
                reason = reason.as_str(),
                price = exit.exit_price,
                quantity = exit.quantity,
                pnl = exit.pnl,
                "position closed"
            ),
            Err(e) => warn!(symbol, reason = reason.as_str(), error = %e, "exit rejected"),
        }
    }

    fn try_enter(
        &self,
        state: &mut RunState,
        symbol: &str,
        bars: &[OhlcvBar],
        i: usize,
        atr_value: Option<f64>,
        reason: &str,
    ) {
        let bar = &bars[i];
        let marks = BTreeMap::from([(symbol.to_string(), bar.close)]);
        let equity = state.portfolio.total_equity(&marks);

        if !state
            .risk
            .can_open_position(state.portfolio.position_count(), equity)
        {
            return;
        }
        if !period_limits_allow(state, bar.time, equity) {
            debug!(symbol, bar = i, "period loss limit blocks entry");
            return;
        }

        let atr_value = match (self.config.stop_method, atr_value) {
            (StopMethod::Atr, None) => {
                debug!(symbol, bar = i, "ATR still warming up; entry skipped");
                return;
            }
            (_, value) => value.unwrap_or(0.0),
        };

        let stops = state
            .risk
            .calculate_stops(bar.close, atr_value, Direction::Long, self.config.stop_method);
        let method = state.risk.params().position_size_method;
        let size = match method {
            SizingMethod::Volatility => state
                .risk
                .calculate_position_size_by_volatility(bar.close, atr_value),
            _ => state
                .risk
                .calculate_position_size(equity, bar.close, stops.stop_loss, method),
        };
        let fraction = size * state.risk.get_exposure_limit(equity);
        let notional = (equity * fraction).min(state.portfolio.cash);
        let execution = &self.config.execution;
        let (price, fills) = match self.config.mode {
            ExecutionMode::BarClose => (apply_slippage(bar.close, Side::Buy, execution.slippage_pct), 1),
            ExecutionMode::Twap { slices, spread, .. } => (bar.close * (1.0 + spread / 2.0), slices),
        };
        let quantity = affordable_quantity(notional, price, fills, execution);
        if quantity <= 0.0 {
            debug!(symbol, bar = i, fraction, "position size rounds to zero; entry skipped");
            return;
        }

        match self.config.mode {
            ExecutionMode::BarClose => {
                match enter_long(
                    &mut state.portfolio,
                    symbol,
                    bar.close,
                    bar.time,
                    quantity,
                    reason,
                    &self.config.execution,
                ) {
                    Ok(entry) => {
                        let stops = state.risk.calculate_stops(
                            entry.execution_price,
                            atr_value,
                            Direction::Long,
                            self.config.stop_method,
                        );
                        if let Some(position) = state.portfolio.get_position_mut(symbol) {
                            position.stop_loss = stops.stop_loss;
                            position.take_profit = stops.take_profit;
                        }
                        debug!(
                            symbol,
                            quantity,
                            price = entry.execution_price,
                            stop_loss = stops.stop_loss,
                            take_profit = stops.take_profit,
                            "position opened"
                        );
                    }
                    Err(e) => warn!(symbol, quantity, error = %e, "entry rejected"),
                }
            }
            ExecutionMode::Twap { .. } => {
                if i + 1 < bars.len() {
                    state.pending = Some(PendingEntry {
                        quantity,
                        atr: atr_value,
                        reason: reason.to_string(),
                    });
                    debug!(symbol, quantity, "twap entry scheduled for next bar");
                }
            }
        }
    }
}

/// Year-to-date and month-to-date guards, each checked only when configured.
fn period_limits_allow(state: &RunState, time: NaiveDateTime, equity: f64) -> bool {
    let params = state.risk.params();
    let curve = &state.portfolio.equity_curve;
    if let Some(limit) = params.max_monthly_drawdown {
        let returns = returns_since(curve, equity, |t| {
            t.year() == time.year() && t.month() == time.month()
        });
        if !state.risk.check_monthly_drawdown(&returns, limit) {
            return false;
        }
    }
    if let Some(target) = params.min_yearly_return {
        let returns = returns_since(curve, equity, |t| t.year() == time.year());
        if !state.risk.check_yearly_loss(&returns, target) {
            return false;
        }
    }
    true
}

/// Per-bar returns from the last point before the current period up to
/// `equity`. Without an earlier period the first point is the base.
fn returns_since(
    curve: &[EquityPoint],
    equity: f64,
    in_period: impl Fn(&NaiveDateTime) -> bool,
) -> Vec<f64> {
    let base = curve.iter().rposition(|p| !in_period(&p.time)).unwrap_or(0);
    let values: Vec<f64> = curve[base..]
        .iter()
        .map(|p| p.value)
        .chain(std::iter::once(equity))
        .collect();
    values
        .windows(2)
        .map(|w| if w[0] > 0.0 { w[1] / w[0] - 1.0 } else { 0.0 })
        .collect()
}
