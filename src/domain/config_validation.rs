//! Configuration validation.
//!
//! Every check here is fatal and runs before any replay starts. The typed
//! validators are also called by [`BacktestEngine::new`](super::backtest::BacktestEngine::new).

use crate::domain::backtest::{BacktestConfig, ExecutionMode};
use crate::domain::error::FusetraderError;
use crate::domain::params::{
    build_backtest_config, build_max_concurrency, build_risk_parameters, build_run_settings,
    SignalParameters,
};
use crate::domain::risk::RiskParameters;
use crate::domain::strategy::StrategyRegistry;
use crate::ports::config_port::ConfigPort;

/// Build and check every section, including that the configured strategy
/// exists and accepts the configured weights.
pub fn validate_config(
    config: &dyn ConfigPort,
    registry: &StrategyRegistry,
) -> Result<(), FusetraderError> {
    let signals = SignalParameters::from_config(config)?;
    validate_signal_parameters(&signals)?;
    validate_risk_parameters(&build_risk_parameters(config)?)?;
    validate_backtest_config(&build_backtest_config(config)?)?;

    let run = build_run_settings(config)?;
    if let (Some(start), Some(end)) = (run.start_date, run.end_date) {
        if start > end {
            return Err(FusetraderError::invalid(
                "backtest",
                "start_date",
                "start_date must not be after end_date",
            ));
        }
    }
    registry.build(&run.strategy, &signals)?;

    if build_max_concurrency(config)? == 0 {
        return Err(FusetraderError::invalid(
            "batch",
            "max_concurrency",
            "max_concurrency must be at least 1",
        ));
    }
    Ok(())
}

pub fn validate_backtest_config(config: &BacktestConfig) -> Result<(), FusetraderError> {
    if !(config.initial_capital > 0.0) || !config.initial_capital.is_finite() {
        return Err(FusetraderError::invalid(
            "backtest",
            "initial_capital",
            "initial_capital must be positive",
        ));
    }
    non_negative("backtest", "commission_per_trade", config.execution.commission_per_trade)?;
    non_negative("backtest", "commission_pct", config.execution.commission_pct)?;
    non_negative("backtest", "slippage_pct", config.execution.slippage_pct)?;
    if !(config.execution.lot_size > 0.0) {
        return Err(FusetraderError::invalid(
            "backtest",
            "lot_size",
            "lot_size must be positive",
        ));
    }
    if !(0.0..1.0).contains(&config.risk_free_rate) {
        return Err(FusetraderError::invalid(
            "backtest",
            "risk_free_rate",
            "risk_free_rate must be between 0 and 1",
        ));
    }
    positive_period("backtest", "atr_period", config.atr_period)?;
    if !(1..=2).contains(&config.entry_threshold) {
        return Err(FusetraderError::invalid(
            "backtest",
            "entry_threshold",
            "entry_threshold must be 1 (buy) or 2 (strong buy)",
        ));
    }
    if !(1..=2).contains(&config.exit_threshold) {
        return Err(FusetraderError::invalid(
            "backtest",
            "exit_threshold",
            "exit_threshold must be 1 (sell) or 2 (strong sell)",
        ));
    }

    if let ExecutionMode::Twap {
        slices,
        ticks_per_bar,
        spread,
    } = config.mode
    {
        positive_period("execution", "twap_slices", slices)?;
        positive_period("execution", "ticks_per_bar", ticks_per_bar)?;
        if ticks_per_bar < slices {
            return Err(FusetraderError::invalid(
                "execution",
                "ticks_per_bar",
                "ticks_per_bar must be at least twap_slices",
            ));
        }
        if !(0.0..1.0).contains(&spread) {
            return Err(FusetraderError::invalid(
                "execution",
                "spread",
                "spread must be between 0 and 1",
            ));
        }
    }
    Ok(())
}

pub fn validate_risk_parameters(risk: &RiskParameters) -> Result<(), FusetraderError> {
    if !(risk.max_drawdown > 0.0 && risk.max_drawdown <= 1.0) {
        return Err(FusetraderError::invalid(
            "risk",
            "max_drawdown",
            "max_drawdown must be in (0, 1]",
        ));
    }
    fraction("risk", "single_trade_risk", risk.single_trade_risk)?;
    fraction("risk", "position_size_fixed", risk.position_size_fixed)?;
    fraction("risk", "kelly_win_rate", risk.kelly_win_rate)?;
    positive("risk", "kelly_payoff_ratio", risk.kelly_payoff_ratio)?;
    positive("risk", "stop_loss_atr_multiplier", risk.stop_loss_atr_multiplier)?;
    positive("risk", "take_profit_atr_multiplier", risk.take_profit_atr_multiplier)?;
    fraction("risk", "stop_loss_fixed_pct", risk.stop_loss_fixed_pct)?;
    fraction("risk", "take_profit_fixed_pct", risk.take_profit_fixed_pct)?;
    non_negative(
        "risk",
        "time_stop_profit_threshold",
        risk.time_stop_profit_threshold,
    )?;
    if risk.max_concurrent_positions < 1 {
        return Err(FusetraderError::invalid(
            "risk",
            "max_concurrent_positions",
            "max_concurrent_positions must be at least 1",
        ));
    }
    fraction("risk", "max_correlated_exposure", risk.max_correlated_exposure)?;
    if !(-1.0..=1.0).contains(&risk.correlation_threshold) {
        return Err(FusetraderError::invalid(
            "risk",
            "correlation_threshold",
            "correlation_threshold must be between -1 and 1",
        ));
    }
    positive("risk", "leverage", risk.leverage)?;
    positive("risk", "max_margin_ratio", risk.max_margin_ratio)?;
    if let Some(limit) = risk.max_monthly_drawdown {
        fraction("risk", "max_monthly_drawdown", limit)?;
    }
    if risk.min_yearly_return.is_some_and(|target| target <= -1.0) {
        return Err(FusetraderError::invalid(
            "risk",
            "min_yearly_return",
            "min_yearly_return must be above -1",
        ));
    }
    Ok(())
}

pub fn validate_signal_parameters(p: &SignalParameters) -> Result<(), FusetraderError> {
    let s = "signals";
    for (key, value) in [
        ("ma_fast_period", p.ma_fast_period),
        ("ma_slow_period", p.ma_slow_period),
        ("macd_fast", p.macd_fast),
        ("macd_slow", p.macd_slow),
        ("macd_signal", p.macd_signal),
        ("rsi_period", p.rsi_period),
        ("donchian_period", p.donchian_period),
        ("keltner_ma_period", p.keltner_ma_period),
        ("keltner_atr_period", p.keltner_atr_period),
        ("ama_efficiency_period", p.ama_efficiency_period),
        ("ama_fast_period", p.ama_fast_period),
        ("ama_slow_period", p.ama_slow_period),
        ("macd_divergence_lookback", p.macd_divergence_lookback),
        ("adx_period", p.adx_period),
    ] {
        positive_period(s, key, value)?;
    }

    if p.ma_fast_period >= p.ma_slow_period {
        return Err(FusetraderError::invalid(
            s,
            "ma_fast_period",
            "ma_fast_period must be less than ma_slow_period",
        ));
    }
    if p.macd_fast >= p.macd_slow {
        return Err(FusetraderError::invalid(
            s,
            "macd_fast",
            "macd_fast must be less than macd_slow",
        ));
    }
    if p.ama_fast_period >= p.ama_slow_period {
        return Err(FusetraderError::invalid(
            s,
            "ama_fast_period",
            "ama_fast_period must be less than ama_slow_period",
        ));
    }
    if !(0.0 <= p.rsi_oversold && p.rsi_oversold < p.rsi_overbought && p.rsi_overbought <= 100.0)
    {
        return Err(FusetraderError::invalid(
            s,
            "rsi_oversold",
            "need 0 <= rsi_oversold < rsi_overbought <= 100",
        ));
    }
    positive(s, "keltner_multiplier", p.keltner_multiplier)?;
    non_negative(s, "adx_threshold", p.adx_threshold)?;
    if !(1..=6).contains(&p.confluence_threshold) {
        return Err(FusetraderError::invalid(
            s,
            "confluence_threshold",
            "confluence_threshold must be between 1 and 6",
        ));
    }
    positive(s, "zigzag_pct", p.zigzag_pct)?;

    if let Some(weights) = &p.weights {
        if weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err(FusetraderError::invalid(
                s,
                "weights",
                "weights must be finite and non-negative",
            ));
        }
        if weights.iter().sum::<f64>() <= 0.0 {
            return Err(FusetraderError::invalid(
                s,
                "weights",
                "at least one weight must be positive",
            ));
        }
    }
    Ok(())
}

fn positive_period(section: &str, key: &str, value: usize) -> Result<(), FusetraderError> {
    if value == 0 {
        return Err(FusetraderError::invalid(
            section,
            key,
            format!("{key} must be at least 1"),
        ));
    }
    Ok(())
}

fn positive(section: &str, key: &str, value: f64) -> Result<(), FusetraderError> {
    if !(value > 0.0) || !value.is_finite() {
        return Err(FusetraderError::invalid(
            section,
            key,
            format!("{key} must be positive"),
        ));
    }
    Ok(())
}

fn non_negative(section: &str, key: &str, value: f64) -> Result<(), FusetraderError> {
    if !(value >= 0.0) || !value.is_finite() {
        return Err(FusetraderError::invalid(
            section,
            key,
            format!("{key} must be non-negative"),
        ));
    }
    Ok(())
}

fn fraction(section: &str, key: &str, value: f64) -> Result<(), FusetraderError> {
    if !(0.0..=1.0).contains(&value) {
        return Err(FusetraderError::invalid(
            section,
            key,
            format!("{key} must be between 0 and 1"),
        ));
    }
    Ok(())
}
