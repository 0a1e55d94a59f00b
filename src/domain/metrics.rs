//! Performance metrics computed once at the end of a run.

use chrono::Datelike;
use serde::Serialize;

use super::portfolio::EquityPoint;
use super::position::ClosedTrade;

pub const TRADING_DAYS_PER_YEAR: f64 = 252.0;
const VAR_CONFIDENCE: f64 = 0.95;
/// Window of the rolling peak the ulcer index measures drawdowns from.
pub const ULCER_LOOKBACK: usize = 14;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PerformanceMetrics {
    pub total_return: f64,
    pub annualized_return: f64,
    pub volatility: f64,
    pub sharpe_ratio: f64,
    pub sortino_ratio: f64,
    pub calmar_ratio: f64,
    pub max_drawdown: f64,
    /// Longest run of bars spent below a prior equity peak.
    pub max_drawdown_duration: usize,
    pub total_trades: usize,
    pub trades_won: usize,
    pub trades_lost: usize,
    pub win_rate: f64,
    /// Gross profit over gross loss. `None` when there are winners but no
    /// losers, where the ratio is unbounded; zero when nothing was won.
    pub profit_factor: Option<f64>,
    pub avg_win: f64,
    pub avg_loss: f64,
    pub max_consecutive_wins: usize,
    pub max_consecutive_losses: usize,
    pub value_at_risk_95: f64,
    pub conditional_var_95: f64,
    /// Root mean square of percentage drawdowns from a rolling
    /// [`ULCER_LOOKBACK`]-bar peak.
    pub ulcer_index: f64,
    /// Best and worst calendar-month return; zero without a full month of data.
    pub best_month: f64,
    pub worst_month: f64,
}

impl PerformanceMetrics {
    pub fn compute(
        equity_curve: &[EquityPoint],
        closed_trades: &[ClosedTrade],
        initial_capital: f64,
        risk_free_rate: f64,
    ) -> Self {
        let final_equity = equity_curve.last().map_or(initial_capital, |p| p.value);

        let total_return = if initial_capital > 0.0 {
            final_equity / initial_capital - 1.0
        } else {
            0.0
        };

        let bars = equity_curve.len() as f64;
        let growth = 1.0 + total_return;
        let annualized_return = if bars > 0.0 && growth > 0.0 {
            growth.powf(TRADING_DAYS_PER_YEAR / bars) - 1.0
        } else if growth <= 0.0 && bars > 0.0 {
            -1.0
        } else {
            0.0
        };

        let returns = bar_returns(equity_curve);
        let daily_rf = risk_free_rate / TRADING_DAYS_PER_YEAR;
        let risk = compute_risk_adjusted(&returns, daily_rf);
        let (max_drawdown, max_drawdown_duration) = compute_drawdown(equity_curve);

        let calmar_ratio = if max_drawdown > 0.0 {
            annualized_return / max_drawdown
        } else {
            0.0
        };

        let trades = TradeStats::from_trades(closed_trades);
        let (value_at_risk_95, conditional_var_95) = value_at_risk(&returns, VAR_CONFIDENCE);
        let months = monthly_returns(equity_curve);
        let best_month = months.iter().copied().reduce(f64::max).unwrap_or(0.0);
        let worst_month = months.iter().copied().reduce(f64::min).unwrap_or(0.0);

        PerformanceMetrics {
            total_return,
            annualized_return,
            volatility: risk.volatility,
            sharpe_ratio: risk.sharpe,
            sortino_ratio: risk.sortino,
            calmar_ratio,
            max_drawdown,
            max_drawdown_duration,
            total_trades: trades.total,
            trades_won: trades.won,
            trades_lost: trades.lost,
            win_rate: trades.win_rate,
            profit_factor: trades.profit_factor,
            avg_win: trades.avg_win,
            avg_loss: trades.avg_loss,
            max_consecutive_wins: trades.max_consecutive_wins,
            max_consecutive_losses: trades.max_consecutive_losses,
            value_at_risk_95,
            conditional_var_95,
            ulcer_index: ulcer_index(equity_curve, ULCER_LOOKBACK),
            best_month,
            worst_month,
        }
    }
}

fn bar_returns(equity_curve: &[EquityPoint]) -> Vec<f64> {
    equity_curve
        .windows(2)
        .map(|w| {
            let (prev, curr) = (w[0].value, w[1].value);
            if prev > 0.0 { (curr - prev) / prev } else { 0.0 }
        })
        .collect()
}

struct RiskAdjusted {
    volatility: f64,
    sharpe: f64,
    sortino: f64,
}

/// Population statistics of per-bar returns, annualized by sqrt(252).
fn compute_risk_adjusted(returns: &[f64], daily_rf: f64) -> RiskAdjusted {
    if returns.is_empty() {
        return RiskAdjusted {
            volatility: 0.0,
            sharpe: 0.0,
            sortino: 0.0,
        };
    }

    let n = returns.len() as f64;
    let annualizer = TRADING_DAYS_PER_YEAR.sqrt();
    let mean = returns.iter().sum::<f64>() / n;
    let variance = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / n;
    let stddev = variance.sqrt();
    let excess = mean - daily_rf;

    let sharpe = if stddev > 0.0 {
        excess / stddev * annualizer
    } else {
        0.0
    };

    let downside = returns
        .iter()
        .filter(|&&r| r < daily_rf)
        .map(|&r| (r - daily_rf).powi(2))
        .sum::<f64>()
        / n;
    let downside_stddev = downside.sqrt();
    let sortino = if downside_stddev > 0.0 {
        excess / downside_stddev * annualizer
    } else {
        0.0
    };

    RiskAdjusted {
        volatility: stddev * annualizer,
        sharpe,
        sortino,
    }
}

fn compute_drawdown(equity_curve: &[EquityPoint]) -> (f64, usize) {
    let Some(first) = equity_curve.first() else {
        return (0.0, 0);
    };

    let mut peak = first.value;
    let mut max_dd = 0.0_f64;
    let mut current_duration = 0usize;
    let mut max_duration = 0usize;

    for point in equity_curve {
        if point.value >= peak {
            peak = point.value;
            current_duration = 0;
        } else if peak > 0.0 {
            max_dd = max_dd.max((peak - point.value) / peak);
            current_duration += 1;
            max_duration = max_duration.max(current_duration);
        }
    }

    (max_dd, max_duration)
}

fn ulcer_index(equity_curve: &[EquityPoint], lookback: usize) -> f64 {
    let lookback = lookback.max(1);
    if equity_curve.len() < lookback {
        return 0.0;
    }
    let squares: Vec<f64> = equity_curve
        .windows(lookback)
        .filter_map(|window| {
            let peak = window.iter().map(|p| p.value).fold(f64::MIN, f64::max);
            let last = window[lookback - 1].value;
            (peak > 0.0).then(|| ((last - peak) / peak * 100.0).powi(2))
        })
        .collect();
    if squares.is_empty() {
        return 0.0;
    }
    (squares.iter().sum::<f64>() / squares.len() as f64).sqrt()
}

/// Month-over-month returns, each month ending at its last equity point.
/// The first month is measured from the first point of the curve.
fn monthly_returns(equity_curve: &[EquityPoint]) -> Vec<f64> {
    let Some(first) = equity_curve.first() else {
        return Vec::new();
    };
    let mut month_ends: Vec<f64> = Vec::new();
    let mut current = (first.time.year(), first.time.month());
    let mut last_value = first.value;
    for point in equity_curve {
        let key = (point.time.year(), point.time.month());
        if key != current {
            month_ends.push(last_value);
            current = key;
        }
        last_value = point.value;
    }
    month_ends.push(last_value);

    let mut base = first.value;
    month_ends
        .into_iter()
        .map(|end| {
            let r = if base > 0.0 { end / base - 1.0 } else { 0.0 };
            base = end;
            r
        })
        .collect()
}

/// Historical VaR (the `1 - confidence` quantile, linearly interpolated) and
/// the mean of returns at or below it.
fn value_at_risk(returns: &[f64], confidence: f64) -> (f64, f64) {
    if returns.is_empty() {
        return (0.0, 0.0);
    }
    let mut sorted = returns.to_vec();
    sorted.sort_by(f64::total_cmp);

    let pos = (sorted.len() - 1) as f64 * (1.0 - confidence);
    let (lo, hi) = (pos.floor() as usize, pos.ceil() as usize);
    let var = sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64);

    let tail: Vec<f64> = sorted.iter().copied().take_while(|&r| r <= var).collect();
    let cvar = if tail.is_empty() {
        var
    } else {
        tail.iter().sum::<f64>() / tail.len() as f64
    };
    (var, cvar)
}

#[derive(Default)]
struct TradeStats {
    total: usize,
    won: usize,
    lost: usize,
    win_rate: f64,
    profit_factor: Option<f64>,
    avg_win: f64,
    avg_loss: f64,
    max_consecutive_wins: usize,
    max_consecutive_losses: usize,
}

impl TradeStats {
    fn from_trades(trades: &[ClosedTrade]) -> Self {
        let mut stats = TradeStats {
            total: trades.len(),
            ..TradeStats::default()
        };
        let (mut gross_win, mut gross_loss) = (0.0_f64, 0.0_f64);
        let (mut win_streak, mut loss_streak) = (0usize, 0usize);

        for trade in trades {
            if trade.pnl > 0.0 {
                stats.won += 1;
                gross_win += trade.pnl;
                win_streak += 1;
                loss_streak = 0;
            } else if trade.pnl < 0.0 {
                stats.lost += 1;
                gross_loss += trade.pnl.abs();
                loss_streak += 1;
                win_streak = 0;
            } else {
                win_streak = 0;
                loss_streak = 0;
            }
            stats.max_consecutive_wins = stats.max_consecutive_wins.max(win_streak);
            stats.max_consecutive_losses = stats.max_consecutive_losses.max(loss_streak);
        }

        if stats.total > 0 {
            stats.win_rate = stats.won as f64 / stats.total as f64;
        }
        stats.profit_factor = if gross_loss > 0.0 {
            Some(gross_win / gross_loss)
        } else if gross_win > 0.0 {
            None
        } else {
            Some(0.0)
        };
        if stats.won > 0 {
            stats.avg_win = gross_win / stats.won as f64;
        }
        if stats.lost > 0 {
            stats.avg_loss = gross_loss / stats.lost as f64;
        }
        stats
    }
}
