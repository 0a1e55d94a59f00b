//! Batch and engine integration tests over an in-memory data port.
//!
//! Tests cover:
//! - Per-symbol isolation of data errors, short histories and panics
//! - Cooperative cancellation
//! - History caching across batches
//! - Profitable replay of a monotonic series
//! - Full allocations under slippage and commission
//! - Determinism across threads and repeated runs

mod common;

use common::*;
use fusetrader::domain::backtest::{BacktestConfig, BacktestEngine, ExecutionMode};
use fusetrader::domain::batch::{run_batch, BatchRequest, CancelToken};
use fusetrader::domain::context::EngineContext;
use fusetrader::domain::error::FusetraderError;
use fusetrader::domain::execution::ExecutionConfig;
use fusetrader::domain::params::SignalParameters;
use fusetrader::domain::position::Side;
use fusetrader::domain::risk::{RiskParameters, SizingMethod};
use fusetrader::domain::strategy::StrategyRegistry;

fn fixed_risk() -> RiskParameters {
    RiskParameters {
        position_size_method: SizingMethod::Fixed,
        position_size_fixed: 0.5,
        take_profit_atr_multiplier: 100.0,
        ..RiskParameters::default()
    }
}

fn request(symbols: &[&str], strategy: &str) -> BatchRequest {
    BatchRequest {
        symbols: symbols.iter().map(|s| s.to_string()).collect(),
        strategy: strategy.to_string(),
        signals: SignalParameters::default(),
        backtest: BacktestConfig::default(),
        risk: fixed_risk(),
        start_date: None,
        end_date: None,
    }
}

fn context(threads: usize) -> EngineContext {
    EngineContext::new(StrategyRegistry::with_builtins(), threads)
}

mod batch_isolation {
    use super::*;

    #[test]
    fn failing_symbols_do_not_abort_siblings() {
        let data = MockDataPort::new()
            .with_bars("AAA", rising("AAA", 60, 100.0, 1.0))
            .with_bars("CCC", wavy("CCC", 80))
            .with_bars("SHORT", rising("SHORT", 5, 100.0, 1.0))
            .with_error("BAD", "connection reset");

        let results = run_batch(
            &context(2),
            &data,
            &request(&["AAA", "BAD", "CCC", "SHORT", "MISSING"], "ma_crossover"),
            &CancelToken::new(),
        )
        .unwrap();

        assert_eq!(results.len(), 5);
        assert!(results["AAA"].is_ok());
        assert!(results["CCC"].is_ok());

        for (symbol, needle) in [
            ("BAD", "connection reset"),
            ("SHORT", "insufficient data"),
            ("MISSING", "no data"),
        ] {
            match &results[symbol] {
                Err(FusetraderError::BatchSymbolFailure { symbol: s, reason }) => {
                    assert_eq!(s, symbol);
                    assert!(reason.contains(needle), "{symbol}: {reason}");
                }
                other => panic!("{symbol}: expected failure, got {other:?}"),
            }
        }
    }

    #[test]
    fn panicking_symbol_is_contained() {
        let data = MockDataPort::new()
            .with_bars("AAA", rising("AAA", 60, 100.0, 1.0))
            .with_panic("BOOM");

        let results = run_batch(
            &context(2),
            &data,
            &request(&["AAA", "BOOM"], "ma_crossover"),
            &CancelToken::new(),
        )
        .unwrap();

        assert!(results["AAA"].is_ok());
        match &results["BOOM"] {
            Err(FusetraderError::BatchSymbolFailure { reason, .. }) => {
                assert!(reason.starts_with("panicked"), "{reason}");
                assert!(reason.contains("exploded"), "{reason}");
            }
            other => panic!("expected panic failure, got {other:?}"),
        }
    }

    #[test]
    fn unknown_strategy_fails_whole_batch() {
        let data = MockDataPort::new().with_bars("AAA", rising("AAA", 60, 100.0, 1.0));
        let err = run_batch(
            &context(1),
            &data,
            &request(&["AAA"], "does_not_exist"),
            &CancelToken::new(),
        )
        .unwrap_err();
        assert!(matches!(err, FusetraderError::UnknownStrategy { ref id } if id == "does_not_exist"));
    }
}

mod cancellation {
    use super::*;

    #[test]
    fn cancelled_token_stops_every_symbol() {
        let data = MockDataPort::new()
            .with_bars("AAA", rising("AAA", 60, 100.0, 1.0))
            .with_bars("BBB", rising("BBB", 60, 50.0, 0.5));
        let cancel = CancelToken::new();
        cancel.cancel();

        let results = run_batch(
            &context(2),
            &data,
            &request(&["AAA", "BBB"], "ma_crossover"),
            &cancel,
        )
        .unwrap();

        for outcome in results.values() {
            assert!(matches!(outcome, Err(FusetraderError::Cancelled { .. })));
        }
        assert_eq!(data.fetch_count(), 0);
    }

    #[test]
    fn cancelling_mid_run_stops_the_engine() {
        let strategy = StrategyRegistry::with_builtins()
            .build("ma_crossover", &SignalParameters::default())
            .unwrap();
        let engine =
            BacktestEngine::new(BacktestConfig::default(), &strategy, fixed_risk()).unwrap();
        let cancel = CancelToken::new();
        let clone = cancel.clone();
        clone.cancel();

        let err = engine
            .run_with_cancel("AAA", &rising("AAA", 60, 100.0, 1.0), &cancel)
            .unwrap_err();
        assert!(matches!(err, FusetraderError::Cancelled { ref symbol } if symbol == "AAA"));
    }
}

mod caching {
    use super::*;

    #[test]
    fn second_batch_reuses_fetched_history() {
        let data = MockDataPort::new().with_bars("AAA", rising("AAA", 60, 100.0, 1.0));
        let ctx = context(2);
        let req = request(&["AAA"], "ma_crossover");

        let first = run_batch(&ctx, &data, &req, &CancelToken::new()).unwrap();
        let second = run_batch(&ctx, &data, &req, &CancelToken::new()).unwrap();

        assert_eq!(data.fetch_count(), 1);
        assert_eq!(
            first["AAA"].as_ref().unwrap(),
            second["AAA"].as_ref().unwrap()
        );
    }

    #[test]
    fn failed_fetch_is_retried_next_batch() {
        let data = MockDataPort::new().with_error("BAD", "timeout");
        let ctx = context(1);
        let req = request(&["BAD"], "ma_crossover");

        run_batch(&ctx, &data, &req, &CancelToken::new()).unwrap();
        run_batch(&ctx, &data, &req, &CancelToken::new()).unwrap();

        assert_eq!(data.fetch_count(), 2);
        assert!(ctx.cache.is_empty());
    }
}

mod replay {
    use super::*;

    #[test]
    fn monotonic_rise_is_profitable() {
        let strategy = StrategyRegistry::with_builtins()
            .build("ma_crossover", &SignalParameters::default())
            .unwrap();
        let engine =
            BacktestEngine::new(BacktestConfig::default(), &strategy, fixed_risk()).unwrap();
        let bars = rising("AAA", 60, 100.0, 1.0);

        let result = engine.run("AAA", &bars).unwrap();

        assert_eq!(result.equity_curve.len(), bars.len());
        assert!(result.trades.iter().any(|t| t.side == Side::Buy));
        assert!(result.final_equity > BacktestConfig::default().initial_capital);
        assert!(result.metrics.total_return > 0.0);
        assert!(result.metrics.max_drawdown.abs() < 1e-9);
    }

    #[test]
    fn twap_mode_enters_on_the_following_bar() {
        let strategy = StrategyRegistry::with_builtins()
            .build("ma_crossover", &SignalParameters::default())
            .unwrap();
        let config = BacktestConfig {
            mode: ExecutionMode::Twap {
                slices: 4,
                ticks_per_bar: 16,
                spread: 0.001,
            },
            ..BacktestConfig::default()
        };
        let engine = BacktestEngine::new(config, &strategy, fixed_risk()).unwrap();
        let bars = rising("AAA", 60, 100.0, 1.0);

        let result = engine.run("AAA", &bars).unwrap();

        let buys: Vec<_> = result.trades.iter().filter(|t| t.side == Side::Buy).collect();
        assert_eq!(buys.len(), 4);
        assert!(buys.iter().all(|t| t.time >= bars[20].time));
        assert!(result.open_position.is_some());
    }
}

mod costs {
    use super::*;

    fn all_in() -> RiskParameters {
        RiskParameters {
            position_size_fixed: 1.0,
            ..fixed_risk()
        }
    }

    fn with_costs(mode: ExecutionMode) -> BacktestConfig {
        BacktestConfig {
            execution: ExecutionConfig {
                commission_per_trade: 1.0,
                commission_pct: 0.1,
                slippage_pct: 0.1,
                lot_size: 1.0,
            },
            mode,
            ..BacktestConfig::default()
        }
    }

    #[test]
    fn full_allocation_enters_when_the_signal_fires() {
        let strategy = StrategyRegistry::with_builtins()
            .build("ma_crossover", &SignalParameters::default())
            .unwrap();
        let bars = rising("AAA", 60, 100.0, 1.0);
        let initial = BacktestConfig::default().initial_capital;

        let free = BacktestEngine::new(BacktestConfig::default(), &strategy, all_in())
            .unwrap()
            .run("AAA", &bars)
            .unwrap();
        let costly = BacktestEngine::new(with_costs(ExecutionMode::BarClose), &strategy, all_in())
            .unwrap()
            .run("AAA", &bars)
            .unwrap();

        let entry = &costly.trades[0];
        assert_eq!(entry.side, Side::Buy);
        assert_eq!(entry.time, free.trades[0].time);
        assert!(entry.price > bars.iter().find(|b| b.time == entry.time).unwrap().close);

        let position = costly.open_position.as_ref().unwrap();
        let cash = initial - entry.price * entry.quantity - entry.commission;
        assert!(cash >= 0.0);
        assert_eq!(position.quantity, entry.quantity);
        let last_close = bars.last().unwrap().close;
        let last = costly.equity_curve.last().unwrap();
        assert!((last.value - (cash + position.quantity * last_close)).abs() < 1e-6);
        assert!(costly.final_equity < free.final_equity);
    }

    #[test]
    fn twap_slices_never_overdraw_cash() {
        let strategy = StrategyRegistry::with_builtins()
            .build("ma_crossover", &SignalParameters::default())
            .unwrap();
        let mode = ExecutionMode::Twap {
            slices: 4,
            ticks_per_bar: 16,
            spread: 0.002,
        };
        let bars = rising("AAA", 60, 100.0, 1.0);

        let result = BacktestEngine::new(with_costs(mode), &strategy, all_in())
            .unwrap()
            .run("AAA", &bars)
            .unwrap();

        let buys: Vec<_> = result.trades.iter().filter(|t| t.side == Side::Buy).collect();
        assert!(!buys.is_empty());
        assert!(buys.iter().all(|t| t.time >= bars[20].time && t.time < bars[21].time));
        let spent: f64 = buys.iter().map(|t| t.price * t.quantity + t.commission).sum();
        assert!(spent <= BacktestConfig::default().initial_capital);
    }
}

mod determinism {
    use super::*;

    #[test]
    fn identical_inputs_give_identical_results() {
        let symbols = ["AAA", "BBB", "CCC", "DDD"];
        let mut data = MockDataPort::new();
        for (i, s) in symbols.iter().enumerate() {
            let mut bars = wavy(s, 120);
            for bar in &mut bars {
                bar.close += i as f64;
                bar.open += i as f64;
                bar.high += i as f64;
                bar.low += i as f64;
            }
            data = data.with_bars(s, bars);
        }
        let req = request(&symbols, "seven_signal");

        let serial = run_batch(&context(1), &data, &req, &CancelToken::new()).unwrap();
        let parallel = run_batch(&context(4), &data, &req, &CancelToken::new()).unwrap();

        for s in symbols {
            let a = serial[s].as_ref().unwrap();
            let b = parallel[s].as_ref().unwrap();
            assert_eq!(a, b, "{s} differs between runs");
        }
    }
}
