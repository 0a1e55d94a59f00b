//! Typed parameter sections built from the parameter store.
//!
//! Missing keys fall back to the defaults below and unknown keys are ignored.
//! Builders only convert types; range checks live in
//! [`config_validation`](super::config_validation).

use chrono::NaiveDate;
use serde::Serialize;

use super::backtest::{BacktestConfig, ExecutionMode};
use super::error::FusetraderError;
use super::execution::ExecutionConfig;
use super::indicator::zigzag::TieBreak;
use super::indicator::{adx, channel, kama, macd, rsi};
use super::risk::{RiskParameters, SizingMethod, StopMethod};
use super::signal::confluence;
use super::tick::{TickConfig, DEFAULT_SPREAD};
use super::universe::parse_codes;
use crate::ports::config_port::ConfigPort;

pub const DEFAULT_STRATEGY: &str = "ma_crossover";
pub const DEFAULT_MAX_CONCURRENCY: usize = 4;
pub const DEFAULT_TWAP_SLICES: usize = 4;
pub const DEFAULT_TICKS_PER_BAR: usize = 16;

/// `[signals]`: generator periods and thresholds.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SignalParameters {
    pub ma_fast_period: usize,
    pub ma_slow_period: usize,
    pub macd_fast: usize,
    pub macd_slow: usize,
    pub macd_signal: usize,
    pub rsi_period: usize,
    pub rsi_oversold: f64,
    pub rsi_overbought: f64,
    pub donchian_period: usize,
    pub keltner_ma_period: usize,
    pub keltner_atr_period: usize,
    pub keltner_multiplier: f64,
    pub ama_efficiency_period: usize,
    pub ama_fast_period: usize,
    pub ama_slow_period: usize,
    pub macd_divergence_lookback: usize,
    pub adx_period: usize,
    pub adx_threshold: f64,
    pub confluence_threshold: usize,
    pub zigzag_pct: f64,
    #[serde(skip)]
    pub zigzag_tie_break: TieBreak,
    /// Fixed per-generator weights overriding the strategy's own scheme.
    pub weights: Option<Vec<f64>>,
}

impl Default for SignalParameters {
    fn default() -> Self {
        SignalParameters {
            ma_fast_period: 5,
            ma_slow_period: 20,
            macd_fast: macd::DEFAULT_FAST,
            macd_slow: macd::DEFAULT_SLOW,
            macd_signal: macd::DEFAULT_SIGNAL,
            rsi_period: rsi::DEFAULT_PERIOD,
            rsi_oversold: 30.0,
            rsi_overbought: 70.0,
            donchian_period: channel::DEFAULT_DONCHIAN_PERIOD,
            keltner_ma_period: channel::DEFAULT_KELTNER_MA_PERIOD,
            keltner_atr_period: channel::DEFAULT_KELTNER_ATR_PERIOD,
            keltner_multiplier: channel::DEFAULT_KELTNER_MULTIPLIER,
            ama_efficiency_period: kama::DEFAULT_EFFICIENCY_PERIOD,
            ama_fast_period: kama::DEFAULT_FAST,
            ama_slow_period: kama::DEFAULT_SLOW,
            macd_divergence_lookback: 10,
            adx_period: adx::DEFAULT_PERIOD,
            adx_threshold: 20.0,
            confluence_threshold: confluence::DEFAULT_THRESHOLD,
            zigzag_pct: 5.0,
            zigzag_tie_break: TieBreak::FirstOccurrence,
            weights: None,
        }
    }
}

impl SignalParameters {
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, FusetraderError> {
        let d = SignalParameters::default();
        let s = "signals";

        let zigzag_tie_break = match config.get_string(s, "zigzag_tie_break") {
            None => d.zigzag_tie_break,
            Some(raw) => TieBreak::parse(&raw).ok_or_else(|| {
                FusetraderError::invalid(s, "zigzag_tie_break", "expected first or last")
            })?,
        };
        let weights = match config.get_string(s, "weights") {
            None => None,
            Some(raw) => Some(parse_weights(&raw)?),
        };

        Ok(SignalParameters {
            ma_fast_period: get_usize(config, s, "ma_fast_period", d.ma_fast_period)?,
            ma_slow_period: get_usize(config, s, "ma_slow_period", d.ma_slow_period)?,
            macd_fast: get_usize(config, s, "macd_fast", d.macd_fast)?,
            macd_slow: get_usize(config, s, "macd_slow", d.macd_slow)?,
            macd_signal: get_usize(config, s, "macd_signal", d.macd_signal)?,
            rsi_period: get_usize(config, s, "rsi_period", d.rsi_period)?,
            rsi_oversold: config.get_double(s, "rsi_oversold", d.rsi_oversold),
            rsi_overbought: config.get_double(s, "rsi_overbought", d.rsi_overbought),
            donchian_period: get_usize(config, s, "donchian_period", d.donchian_period)?,
            keltner_ma_period: get_usize(config, s, "keltner_ma_period", d.keltner_ma_period)?,
            keltner_atr_period: get_usize(config, s, "keltner_atr_period", d.keltner_atr_period)?,
            keltner_multiplier: config.get_double(s, "keltner_multiplier", d.keltner_multiplier),
            ama_efficiency_period: get_usize(
                config,
                s,
                "ama_efficiency_period",
                d.ama_efficiency_period,
            )?,
            ama_fast_period: get_usize(config, s, "ama_fast_period", d.ama_fast_period)?,
            ama_slow_period: get_usize(config, s, "ama_slow_period", d.ama_slow_period)?,
            macd_divergence_lookback: get_usize(
                config,
                s,
                "macd_divergence_lookback",
                d.macd_divergence_lookback,
            )?,
            adx_period: get_usize(config, s, "adx_period", d.adx_period)?,
            adx_threshold: config.get_double(s, "adx_threshold", d.adx_threshold),
            confluence_threshold: get_usize(
                config,
                s,
                "confluence_threshold",
                d.confluence_threshold,
            )?,
            zigzag_pct: config.get_double(s, "zigzag_pct", d.zigzag_pct),
            zigzag_tie_break,
            weights,
        })
    }
}

/// `[risk]` section over [`RiskParameters::default`].
pub fn build_risk_parameters(config: &dyn ConfigPort) -> Result<RiskParameters, FusetraderError> {
    let d = RiskParameters::default();
    let s = "risk";

    let position_size_method = match config.get_string(s, "position_size_method") {
        None => d.position_size_method,
        Some(raw) => SizingMethod::parse(&raw).ok_or_else(|| {
            FusetraderError::invalid(
                s,
                "position_size_method",
                "expected kelly, fixed, risk_per_trade or volatility",
            )
        })?,
    };

    Ok(RiskParameters {
        max_drawdown: config.get_double(s, "max_drawdown", d.max_drawdown),
        single_trade_risk: config.get_double(s, "single_trade_risk", d.single_trade_risk),
        position_size_method,
        position_size_fixed: config.get_double(s, "position_size_fixed", d.position_size_fixed),
        kelly_win_rate: config.get_double(s, "kelly_win_rate", d.kelly_win_rate),
        kelly_payoff_ratio: config.get_double(s, "kelly_payoff_ratio", d.kelly_payoff_ratio),
        stop_loss_atr_multiplier: config.get_double(
            s,
            "stop_loss_atr_multiplier",
            d.stop_loss_atr_multiplier,
        ),
        take_profit_atr_multiplier: config.get_double(
            s,
            "take_profit_atr_multiplier",
            d.take_profit_atr_multiplier,
        ),
        stop_loss_fixed_pct: config.get_double(s, "stop_loss_fixed_pct", d.stop_loss_fixed_pct),
        take_profit_fixed_pct: config.get_double(
            s,
            "take_profit_fixed_pct",
            d.take_profit_fixed_pct,
        ),
        time_stop_bars: get_usize(config, s, "time_stop_bars", d.time_stop_bars)?,
        time_stop_profit_threshold: config.get_double(
            s,
            "time_stop_profit_threshold",
            d.time_stop_profit_threshold,
        ),
        max_concurrent_positions: get_usize(
            config,
            s,
            "max_concurrent_positions",
            d.max_concurrent_positions,
        )?,
        max_correlated_exposure: config.get_double(
            s,
            "max_correlated_exposure",
            d.max_correlated_exposure,
        ),
        correlation_threshold: config.get_double(
            s,
            "correlation_threshold",
            d.correlation_threshold,
        ),
        leverage: config.get_double(s, "leverage", d.leverage),
        max_margin_ratio: config.get_double(s, "max_margin_ratio", d.max_margin_ratio),
        min_yearly_return: get_optional_double(config, s, "min_yearly_return")?,
        max_monthly_drawdown: get_optional_double(config, s, "max_monthly_drawdown")?,
    })
}

/// A value that is absent unless configured.
fn get_optional_double(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
) -> Result<Option<f64>, FusetraderError> {
    let Some(raw) = config.get_string(section, key) else {
        return Ok(None);
    };
    match raw.trim().parse::<f64>() {
        Ok(value) if value.is_finite() => Ok(Some(value)),
        _ => Err(FusetraderError::invalid(
            section,
            key,
            format!("{key} must be a number, got {raw:?}"),
        )),
    }
}

/// `[backtest]` and `[execution]` sections.
pub fn build_backtest_config(config: &dyn ConfigPort) -> Result<BacktestConfig, FusetraderError> {
    let d = BacktestConfig::default();

    let stop_method = match config.get_string("backtest", "stop_method") {
        None => d.stop_method,
        Some(raw) => StopMethod::parse(&raw).ok_or_else(|| {
            FusetraderError::invalid("backtest", "stop_method", "expected atr or fixed")
        })?,
    };

    let mode = match config
        .get_string("execution", "mode")
        .map(|m| m.trim().to_lowercase())
        .as_deref()
    {
        None | Some("bar_close") => ExecutionMode::BarClose,
        Some("twap") => ExecutionMode::Twap {
            slices: get_usize(config, "execution", "twap_slices", DEFAULT_TWAP_SLICES)?,
            ticks_per_bar: get_usize(config, "execution", "ticks_per_bar", DEFAULT_TICKS_PER_BAR)?,
            spread: config.get_double("execution", "spread", DEFAULT_SPREAD),
        },
        Some(other) => {
            return Err(FusetraderError::invalid(
                "execution",
                "mode",
                format!("unknown mode '{other}', expected bar_close or twap"),
            ));
        }
    };

    Ok(BacktestConfig {
        initial_capital: config.get_double("backtest", "initial_capital", d.initial_capital),
        execution: ExecutionConfig {
            commission_per_trade: config.get_double(
                "backtest",
                "commission_per_trade",
                d.execution.commission_per_trade,
            ),
            commission_pct: config.get_double(
                "backtest",
                "commission_pct",
                d.execution.commission_pct,
            ),
            slippage_pct: config.get_double("backtest", "slippage_pct", d.execution.slippage_pct),
            lot_size: config.get_double("backtest", "lot_size", d.execution.lot_size),
        },
        risk_free_rate: config.get_double("backtest", "risk_free_rate", d.risk_free_rate),
        atr_period: get_usize(config, "backtest", "atr_period", d.atr_period)?,
        entry_threshold: get_i32(config, "backtest", "entry_threshold", d.entry_threshold)?,
        exit_threshold: get_i32(config, "backtest", "exit_threshold", d.exit_threshold)?,
        stop_method,
        mode,
    })
}

/// `[execution] ticks_per_bar` and `spread`, read whatever the mode.
pub fn build_tick_settings(config: &dyn ConfigPort) -> Result<(usize, TickConfig), FusetraderError> {
    let ticks_per_bar = get_usize(config, "execution", "ticks_per_bar", DEFAULT_TICKS_PER_BAR)?;
    if ticks_per_bar == 0 {
        return Err(FusetraderError::invalid(
            "execution",
            "ticks_per_bar",
            "ticks_per_bar must be positive",
        ));
    }
    let spread = config.get_double("execution", "spread", DEFAULT_SPREAD);
    if !(0.0..1.0).contains(&spread) {
        return Err(FusetraderError::invalid(
            "execution",
            "spread",
            "spread must be in [0, 1)",
        ));
    }
    Ok((
        ticks_per_bar,
        TickConfig {
            spread,
            ..TickConfig::default()
        },
    ))
}

/// Which symbols to replay, with which strategy, over which dates.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSettings {
    pub symbols: Vec<String>,
    pub strategy: String,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

/// `[backtest] symbols`, `strategy`, `start_date`, `end_date`.
///
/// An empty symbol list is allowed here; the caller decides whether a
/// command-line override supplies one.
pub fn build_run_settings(config: &dyn ConfigPort) -> Result<RunSettings, FusetraderError> {
    let symbols = match config.get_string("backtest", "symbols") {
        Some(raw) if !raw.trim().is_empty() => parse_codes(&raw)?,
        _ => Vec::new(),
    };
    let strategy = config
        .get_string("backtest", "strategy")
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| DEFAULT_STRATEGY.to_string());

    Ok(RunSettings {
        symbols,
        strategy,
        start_date: get_date(config, "backtest", "start_date")?,
        end_date: get_date(config, "backtest", "end_date")?,
    })
}

/// `[batch] max_concurrency`.
pub fn build_max_concurrency(config: &dyn ConfigPort) -> Result<usize, FusetraderError> {
    get_usize(config, "batch", "max_concurrency", DEFAULT_MAX_CONCURRENCY)
}

fn get_usize(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
    default: usize,
) -> Result<usize, FusetraderError> {
    let value = config.get_int(section, key, default as i64);
    usize::try_from(value)
        .map_err(|_| FusetraderError::invalid(section, key, format!("{key} must be non-negative")))
}

fn get_i32(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
    default: i32,
) -> Result<i32, FusetraderError> {
    let value = config.get_int(section, key, i64::from(default));
    i32::try_from(value)
        .map_err(|_| FusetraderError::invalid(section, key, format!("{key} is out of range")))
}

fn get_date(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
) -> Result<Option<NaiveDate>, FusetraderError> {
    match config.get_string(section, key) {
        None => Ok(None),
        Some(raw) if raw.trim().is_empty() => Ok(None),
        Some(raw) => NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
            .map(Some)
            .map_err(|_| {
                FusetraderError::invalid(section, key, "invalid date format (expected YYYY-MM-DD)")
            }),
    }
}

fn parse_weights(raw: &str) -> Result<Vec<f64>, FusetraderError> {
    raw.split(',')
        .map(|token| {
            token.trim().parse::<f64>().map_err(|_| {
                FusetraderError::invalid(
                    "signals",
                    "weights",
                    format!("'{}' is not a number", token.trim()),
                )
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::file_config_adapter::FileConfigAdapter;

    fn adapter(content: &str) -> FileConfigAdapter {
        FileConfigAdapter::from_string(content).unwrap()
    }

    #[test]
    fn empty_config_yields_defaults() {
        let config = adapter("");
        assert_eq!(
            SignalParameters::from_config(&config).unwrap(),
            SignalParameters::default()
        );
        assert_eq!(
            build_risk_parameters(&config).unwrap(),
            RiskParameters::default()
        );
        assert_eq!(
            build_backtest_config(&config).unwrap(),
            BacktestConfig::default()
        );
        assert_eq!(build_max_concurrency(&config).unwrap(), DEFAULT_MAX_CONCURRENCY);
    }

    #[test]
    fn unknown_keys_are_ignored() {
        let config = adapter(
            "[signals]\nnot_a_key = 12\nrsi_period = 7\n\n[mystery]\nanything = goes\n",
        );
        let params = SignalParameters::from_config(&config).unwrap();
        assert_eq!(params.rsi_period, 7);
        assert_eq!(params.ma_slow_period, 20);
    }

    #[test]
    fn signal_overrides_and_tie_break() {
        let config = adapter(
            "[signals]\nconfluence_threshold = 4\nzigzag_pct = 3.5\nzigzag_tie_break = last\nweights = 0.5, 0.25,0.25\n",
        );
        let params = SignalParameters::from_config(&config).unwrap();
        assert_eq!(params.confluence_threshold, 4);
        assert!((params.zigzag_pct - 3.5).abs() < f64::EPSILON);
        assert_eq!(params.zigzag_tie_break, TieBreak::LastOccurrence);
        assert_eq!(params.weights, Some(vec![0.5, 0.25, 0.25]));
    }

    #[test]
    fn bad_tie_break_is_config_invalid() {
        let config = adapter("[signals]\nzigzag_tie_break = middle\n");
        let err = SignalParameters::from_config(&config).unwrap_err();
        assert!(matches!(err, FusetraderError::ConfigInvalid { ref key, .. } if key == "zigzag_tie_break"));
    }

    #[test]
    fn bad_weight_token_is_config_invalid() {
        let config = adapter("[signals]\nweights = 1.0, abc\n");
        assert!(SignalParameters::from_config(&config).unwrap_err().is_config());
    }

    #[test]
    fn negative_period_is_config_invalid() {
        let config = adapter("[signals]\nrsi_period = -3\n");
        assert!(SignalParameters::from_config(&config).unwrap_err().is_config());
    }

    #[test]
    fn risk_section_overrides() {
        let config = adapter(
            "[risk]\nmax_drawdown = 0.2\nposition_size_method = fixed\nposition_size_fixed = 0.1\nmax_concurrent_positions = 2\n",
        );
        let risk = build_risk_parameters(&config).unwrap();
        assert!((risk.max_drawdown - 0.2).abs() < f64::EPSILON);
        assert_eq!(risk.position_size_method, SizingMethod::Fixed);
        assert!((risk.position_size_fixed - 0.1).abs() < f64::EPSILON);
        assert_eq!(risk.max_concurrent_positions, 2);
        assert!((risk.kelly_win_rate - 0.55).abs() < f64::EPSILON);
    }

    #[test]
    fn period_guards_are_off_unless_configured() {
        let risk = build_risk_parameters(&adapter("[risk]\nmax_drawdown = 0.2\n")).unwrap();
        assert_eq!(risk.min_yearly_return, None);
        assert_eq!(risk.max_monthly_drawdown, None);

        let risk = build_risk_parameters(&adapter(
            "[risk]\nposition_size_method = volatility\nmin_yearly_return = 0\nmax_monthly_drawdown = 0.02\n",
        ))
        .unwrap();
        assert_eq!(risk.position_size_method, SizingMethod::Volatility);
        assert_eq!(risk.min_yearly_return, Some(0.0));
        assert_eq!(risk.max_monthly_drawdown, Some(0.02));

        let err = build_risk_parameters(&adapter("[risk]\nmax_monthly_drawdown = lots\n"))
            .unwrap_err();
        assert!(err.is_config());
    }

    #[test]
    fn unknown_sizing_method_is_rejected() {
        let config = adapter("[risk]\nposition_size_method = martingale\n");
        assert!(build_risk_parameters(&config).is_err());
    }

    #[test]
    fn twap_mode_reads_execution_section() {
        let config = adapter(
            "[backtest]\ninitial_capital = 50000\nlot_size = 10\n\n[execution]\nmode = twap\ntwap_slices = 5\nticks_per_bar = 20\n",
        );
        let bt = build_backtest_config(&config).unwrap();
        assert!((bt.initial_capital - 50_000.0).abs() < f64::EPSILON);
        assert!((bt.execution.lot_size - 10.0).abs() < f64::EPSILON);
        assert_eq!(
            bt.mode,
            ExecutionMode::Twap {
                slices: 5,
                ticks_per_bar: 20,
                spread: DEFAULT_SPREAD,
            }
        );
    }

    #[test]
    fn unknown_execution_mode_is_rejected() {
        let config = adapter("[execution]\nmode = iceberg\n");
        let err = build_backtest_config(&config).unwrap_err();
        assert!(matches!(err, FusetraderError::ConfigInvalid { ref section, .. } if section == "execution"));
    }

    #[test]
    fn run_settings_parse_symbols_and_dates() {
        let config = adapter(
            "[backtest]\nsymbols = btcusdt, ETHUSDT\nstrategy = macd\nstart_date = 2024-01-01\n",
        );
        let run = build_run_settings(&config).unwrap();
        assert_eq!(run.symbols, vec!["BTCUSDT", "ETHUSDT"]);
        assert_eq!(run.strategy, "macd");
        assert_eq!(run.start_date, NaiveDate::from_ymd_opt(2024, 1, 1));
        assert_eq!(run.end_date, None);
    }

    #[test]
    fn run_settings_default_strategy() {
        let run = build_run_settings(&adapter("")).unwrap();
        assert!(run.symbols.is_empty());
        assert_eq!(run.strategy, DEFAULT_STRATEGY);
    }

    #[test]
    fn bad_date_is_config_invalid() {
        let config = adapter("[backtest]\nend_date = 01/02/2024\n");
        let err = build_run_settings(&config).unwrap_err();
        assert!(matches!(err, FusetraderError::ConfigInvalid { ref key, .. } if key == "end_date"));
    }

    #[test]
    fn duplicate_symbols_are_config_invalid() {
        let config = adapter("[backtest]\nsymbols = AAA, aaa\n");
        assert!(build_run_settings(&config).unwrap_err().is_config());
    }

    #[test]
    fn tick_settings_ignore_mode() {
        let config = adapter("[execution]\nmode = bar_close\nticks_per_bar = 8\nspread = 0.002\n");
        let (ticks, tick_config) = build_tick_settings(&config).unwrap();
        assert_eq!(ticks, 8);
        assert!((tick_config.spread - 0.002).abs() < f64::EPSILON);

        let config = adapter("[execution]\nticks_per_bar = 0\n");
        assert!(build_tick_settings(&config).unwrap_err().is_config());
    }
}
