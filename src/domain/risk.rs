//! Risk management: stop placement, position sizing and portfolio limits.
//!
//! The manager is owned by a single run. It tracks the running equity peak so
//! drawdown checks and the exposure scale stay consistent across bars.
//!
//! [`RiskManager::check_correlated_exposure`] and [`RiskManager::is_leverage_safe`]
//! judge a multi-asset book. The backtest engine replays one symbol at a time
//! and never calls them; they are for callers that hold several positions.

use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{debug, warn};

use super::position::Direction;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopMethod {
    Atr,
    Fixed,
}

impl StopMethod {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "atr" => Some(StopMethod::Atr),
            "fixed" => Some(StopMethod::Fixed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SizingMethod {
    Fixed,
    Kelly,
    RiskPerTrade,
    Volatility,
}

impl SizingMethod {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "fixed" => Some(SizingMethod::Fixed),
            "kelly" => Some(SizingMethod::Kelly),
            "risk_per_trade" => Some(SizingMethod::RiskPerTrade),
            "volatility" => Some(SizingMethod::Volatility),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RiskParameters {
    pub max_drawdown: f64,
    pub single_trade_risk: f64,
    pub position_size_method: SizingMethod,
    pub position_size_fixed: f64,
    pub kelly_win_rate: f64,
    pub kelly_payoff_ratio: f64,
    pub stop_loss_atr_multiplier: f64,
    pub take_profit_atr_multiplier: f64,
    pub stop_loss_fixed_pct: f64,
    pub take_profit_fixed_pct: f64,
    pub time_stop_bars: usize,
    pub time_stop_profit_threshold: f64,
    pub max_concurrent_positions: usize,
    pub max_correlated_exposure: f64,
    pub correlation_threshold: f64,
    /// Upper bound for any sizing result, as a fraction of equity.
    pub leverage: f64,
    pub max_margin_ratio: f64,
    /// Block new entries once the year-to-date return falls below this.
    pub min_yearly_return: Option<f64>,
    /// Block new entries once the month-to-date drawdown exceeds this.
    pub max_monthly_drawdown: Option<f64>,
}

impl Default for RiskParameters {
    fn default() -> Self {
        RiskParameters {
            max_drawdown: 0.10,
            single_trade_risk: 0.03,
            position_size_method: SizingMethod::Kelly,
            position_size_fixed: 0.05,
            kelly_win_rate: 0.55,
            kelly_payoff_ratio: 1.5,
            stop_loss_atr_multiplier: 2.0,
            take_profit_atr_multiplier: 3.0,
            stop_loss_fixed_pct: 0.01,
            take_profit_fixed_pct: 0.0075,
            time_stop_bars: 30,
            time_stop_profit_threshold: 0.0002,
            max_concurrent_positions: 5,
            max_correlated_exposure: 0.20,
            correlation_threshold: 0.7,
            leverage: 1.0,
            max_margin_ratio: 0.8,
            min_yearly_return: None,
            max_monthly_drawdown: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct StopLevels {
    pub stop_loss: f64,
    pub take_profit: f64,
    pub stop_distance: f64,
    pub target_distance: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DrawdownStatus {
    pub exceeded: bool,
    pub drawdown: f64,
    pub peak: f64,
}

/// `(p*b - q) / b`. Negative when the edge is negative.
pub fn kelly_fraction(win_rate: f64, payoff_ratio: f64) -> f64 {
    if payoff_ratio <= 0.0 {
        return 0.0;
    }
    let q = 1.0 - win_rate;
    (win_rate * payoff_ratio - q) / payoff_ratio
}

/// Sample Pearson correlation over the common prefix of `a` and `b`.
/// Returns 0 when either side has no variance or fewer than two points.
pub fn pearson_correlation(a: &[f64], b: &[f64]) -> f64 {
    let n = a.len().min(b.len());
    if n < 2 {
        return 0.0;
    }
    let (a, b) = (&a[..n], &b[..n]);
    let mean_a = a.iter().sum::<f64>() / n as f64;
    let mean_b = b.iter().sum::<f64>() / n as f64;

    let (mut cov, mut var_a, mut var_b) = (0.0, 0.0, 0.0);
    for (x, y) in a.iter().zip(b) {
        let (dx, dy) = (x - mean_a, y - mean_b);
        cov += dx * dy;
        var_a += dx * dx;
        var_b += dy * dy;
    }
    if var_a <= 0.0 || var_b <= 0.0 {
        return 0.0;
    }
    cov / (var_a.sqrt() * var_b.sqrt())
}

#[derive(Debug, Clone)]
pub struct RiskManager {
    params: RiskParameters,
    peak: Option<f64>,
}

impl RiskManager {
    pub fn new(params: RiskParameters) -> Self {
        RiskManager { params, peak: None }
    }

    pub fn params(&self) -> &RiskParameters {
        &self.params
    }

    pub fn peak_equity(&self) -> Option<f64> {
        self.peak
    }

    /// Stop-loss and take-profit around `entry`.
    ///
    /// With [`StopMethod::Atr`] the distances are multiples of `atr_or_pct`;
    /// with [`StopMethod::Fixed`] they are the configured fractions of entry and
    /// `atr_or_pct` is ignored.
    pub fn calculate_stops(
        &self,
        entry: f64,
        atr_or_pct: f64,
        direction: Direction,
        method: StopMethod,
    ) -> StopLevels {
        let (stop_distance, target_distance) = match method {
            StopMethod::Atr => (
                self.params.stop_loss_atr_multiplier * atr_or_pct,
                self.params.take_profit_atr_multiplier * atr_or_pct,
            ),
            StopMethod::Fixed => (
                entry * self.params.stop_loss_fixed_pct,
                entry * self.params.take_profit_fixed_pct,
            ),
        };

        let (stop_loss, take_profit) = match direction {
            Direction::Long => (entry - stop_distance, entry + target_distance),
            Direction::Short => (entry + stop_distance, entry - target_distance),
        };

        StopLevels {
            stop_loss,
            take_profit,
            stop_distance,
            target_distance,
        }
    }

    /// Fraction of equity to commit, within `[0, leverage]`.
    ///
    /// [`SizingMethod::Volatility`] reads the ATR off the stop distance, which
    /// assumes the stop sits `stop_loss_atr_multiplier` ATRs from entry. Use
    /// [`Self::calculate_position_size_by_volatility`] when the ATR is known.
    pub fn calculate_position_size(
        &self,
        _balance: f64,
        entry: f64,
        stop: f64,
        method: SizingMethod,
    ) -> f64 {
        let cap = self.params.leverage.max(0.0);
        let raw = match method {
            SizingMethod::Fixed => self.params.position_size_fixed,
            SizingMethod::Kelly => {
                kelly_fraction(self.params.kelly_win_rate, self.params.kelly_payoff_ratio)
            }
            SizingMethod::RiskPerTrade => {
                let distance = (entry - stop).abs();
                if distance <= 0.0 || entry <= 0.0 {
                    0.0
                } else {
                    self.params.single_trade_risk * entry / distance
                }
            }
            SizingMethod::Volatility => {
                let atr = (entry - stop).abs() / self.params.stop_loss_atr_multiplier;
                return self.calculate_position_size_by_volatility(entry, atr);
            }
        };
        if raw.is_finite() { raw.clamp(0.0, cap) } else { 0.0 }
    }

    /// Fraction of equity at which a one-ATR move costs `single_trade_risk`
    /// of equity: `single_trade_risk × entry / atr`, within `[0, leverage]`.
    pub fn calculate_position_size_by_volatility(&self, entry: f64, atr: f64) -> f64 {
        if atr <= 0.0 || entry <= 0.0 || !atr.is_finite() {
            debug!(entry, atr, "no volatility to size against");
            return 0.0;
        }
        let raw = self.params.single_trade_risk * entry / atr;
        if raw.is_finite() {
            raw.clamp(0.0, self.params.leverage.max(0.0))
        } else {
            0.0
        }
    }

    /// Update the running peak with `equity` and report the drawdown from it.
    pub fn check_drawdown_limit(&mut self, equity: f64) -> DrawdownStatus {
        let peak = match self.peak {
            Some(p) if p >= equity => p,
            _ => equity,
        };
        self.peak = Some(peak);

        let drawdown = if peak > 0.0 {
            (peak - equity) / peak
        } else {
            0.0
        };
        let exceeded = drawdown > self.params.max_drawdown;
        if exceeded {
            debug!(drawdown, limit = self.params.max_drawdown, "drawdown limit exceeded");
        }

        DrawdownStatus {
            exceeded,
            drawdown,
            peak,
        }
    }

    /// Linear exposure scale: 1 at the peak, 0 at the drawdown limit.
    pub fn get_exposure_limit(&mut self, equity: f64) -> f64 {
        let status = self.check_drawdown_limit(equity);
        if self.params.max_drawdown <= 0.0 {
            return if status.drawdown > 0.0 { 0.0 } else { 1.0 };
        }
        (1.0 - status.drawdown / self.params.max_drawdown).max(0.0)
    }

    pub fn can_open_position(&mut self, open_count: usize, equity: f64) -> bool {
        if open_count >= self.params.max_concurrent_positions {
            warn!(
                open_count,
                limit = self.params.max_concurrent_positions,
                "concurrent position limit reached"
            );
            return false;
        }
        let status = self.check_drawdown_limit(equity);
        if status.exceeded {
            warn!(drawdown = status.drawdown, "drawdown limit blocks new positions");
        }
        !status.exceeded
    }

    pub fn should_time_stop(&self, bars_held: usize, unrealized_pnl_pct: f64) -> bool {
        bars_held >= self.params.time_stop_bars
            && unrealized_pnl_pct.abs() <= self.params.time_stop_profit_threshold
    }

    /// True when the compounded return of `returns` is at least `target_min_return`.
    pub fn check_yearly_loss(&self, returns: &[f64], target_min_return: f64) -> bool {
        let yearly_return = returns.iter().fold(1.0, |acc, r| acc * (1.0 + r)) - 1.0;
        let ok = yearly_return >= target_min_return;
        if !ok {
            warn!(yearly_return, target = target_min_return, "yearly return below target");
        }
        ok
    }

    /// True when the compounded path of `returns` never falls more than
    /// `max_acceptable_drawdown` below its running peak. The path starts at 1.
    pub fn check_monthly_drawdown(&self, returns: &[f64], max_acceptable_drawdown: f64) -> bool {
        let mut value = 1.0_f64;
        let mut peak = 1.0_f64;
        let mut drawdown = 0.0_f64;
        for r in returns {
            value *= 1.0 + r;
            peak = peak.max(value);
            if peak > 0.0 {
                drawdown = drawdown.max((peak - value) / peak);
            }
        }
        let ok = drawdown <= max_acceptable_drawdown;
        if !ok {
            warn!(drawdown, limit = max_acceptable_drawdown, "monthly drawdown over limit");
        }
        ok
    }

    /// Groups of highly correlated holdings whose combined exposure is too large.
    ///
    /// Each held symbol anchors a group made of itself and every other held
    /// symbol whose return correlation with it exceeds `correlation_threshold`.
    /// Returns anchor -> group exposure for groups with at least one peer that
    /// exceed `max_correlated_exposure`. Symbols without a return series are
    /// skipped.
    pub fn check_correlated_exposure(
        &self,
        exposures: &BTreeMap<String, f64>,
        returns: &BTreeMap<String, Vec<f64>>,
    ) -> BTreeMap<String, f64> {
        let mut over = BTreeMap::new();
        for (anchor, exposure) in exposures {
            let Some(anchor_returns) = returns.get(anchor) else {
                continue;
            };
            let peers: Vec<f64> = exposures
                .iter()
                .filter(|(sym, _)| *sym != anchor)
                .filter_map(|(sym, exp)| {
                    let r = returns.get(sym)?;
                    (pearson_correlation(anchor_returns, r) > self.params.correlation_threshold)
                        .then_some(*exp)
                })
                .collect();
            if peers.is_empty() {
                continue;
            }
            let total = exposure + peers.iter().sum::<f64>();
            if total > self.params.max_correlated_exposure {
                over.insert(anchor.clone(), total);
            }
        }
        over
    }

    pub fn is_leverage_safe(&self, equity: f64, margin_used: f64) -> bool {
        if equity <= 0.0 {
            return margin_used <= 0.0;
        }
        let ratio = margin_used / equity;
        let safe = ratio <= self.params.max_margin_ratio;
        if !safe {
            warn!(ratio, limit = self.params.max_margin_ratio, "margin ratio too high");
        }
        safe
    }
}
