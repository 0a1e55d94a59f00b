//! Multi-symbol batch runs on a bounded worker pool.
//!
//! Each symbol is an independent single-threaded run. A failing or panicking
//! symbol is recorded against that symbol and never aborts its siblings.

use chrono::NaiveDate;
use rayon::prelude::*;
use std::any::Any;
use std::collections::BTreeMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

use super::backtest::{BacktestConfig, BacktestEngine, BacktestResult};
use super::context::EngineContext;
use super::error::FusetraderError;
use super::history_cache::HistoryKey;
use super::params::SignalParameters;
use super::risk::RiskParameters;
use crate::ports::data_port::DataPort;

/// Cooperative cancellation flag shared between a caller and its runs.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        CancelToken::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Clone)]
pub struct BatchRequest {
    pub symbols: Vec<String>,
    pub strategy: String,
    pub signals: SignalParameters,
    pub backtest: BacktestConfig,
    pub risk: RiskParameters,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

pub type BatchResults = BTreeMap<String, Result<BacktestResult, FusetraderError>>;

/// Run `request.symbols` on a pool of `context.max_concurrency` threads.
///
/// The outer error is reserved for problems shared by every symbol (unknown
/// strategy, invalid configuration, pool construction).
pub fn run_batch(
    context: &EngineContext,
    data: &dyn DataPort,
    request: &BatchRequest,
    cancel: &CancelToken,
) -> Result<BatchResults, FusetraderError> {
    let strategy = context.registry.build(&request.strategy, &request.signals)?;
    let engine = BacktestEngine::new(request.backtest.clone(), &strategy, request.risk.clone())?;
    let threads = context.max_concurrency.max(1);
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build()
        .map_err(|e| FusetraderError::invalid("batch", "max_concurrency", e.to_string()))?;

    info!(
        symbols = request.symbols.len(),
        strategy = %request.strategy,
        threads,
        "batch started"
    );

    let outcomes: Vec<(String, Result<BacktestResult, FusetraderError>)> = pool.install(|| {
        request
            .symbols
            .par_iter()
            .map(|symbol| {
                let outcome = run_symbol(context, data, &engine, request, symbol, cancel);
                (symbol.clone(), outcome)
            })
            .collect()
    });

    let results: BatchResults = outcomes.into_iter().collect();
    let failed = results.values().filter(|r| r.is_err()).count();
    info!(
        succeeded = results.len() - failed,
        failed, "batch finished"
    );
    Ok(results)
}

fn run_symbol(
    context: &EngineContext,
    data: &dyn DataPort,
    engine: &BacktestEngine<'_>,
    request: &BatchRequest,
    symbol: &str,
    cancel: &CancelToken,
) -> Result<BacktestResult, FusetraderError> {
    if cancel.is_cancelled() {
        return Err(FusetraderError::Cancelled {
            symbol: symbol.to_string(),
        });
    }

    let key = HistoryKey::new(symbol, request.start_date, request.end_date);
    let outcome = catch_unwind(AssertUnwindSafe(|| {
        let bars = context.cache.get_or_fetch(&key, || {
            data.fetch_bars(symbol, request.start_date, request.end_date)
        })?;
        engine.run_with_cancel(symbol, &bars, cancel)
    }));

    match outcome {
        Ok(Ok(result)) => Ok(result),
        Ok(Err(e @ FusetraderError::Cancelled { .. })) => Err(e),
        Ok(Err(e)) => {
            warn!(symbol, error = %e, "skipping symbol");
            Err(FusetraderError::BatchSymbolFailure {
                symbol: symbol.to_string(),
                reason: e.to_string(),
            })
        }
        Err(payload) => {
            let reason = format!("panicked: {}", panic_message(payload.as_ref()));
            warn!(symbol, %reason, "symbol run panicked");
            Err(FusetraderError::BatchSymbolFailure {
                symbol: symbol.to_string(),
                reason,
            })
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
