//! Engine context: everything a batch run shares, built once by the caller.

use super::error::FusetraderError;
use super::history_cache::HistoryCache;
use super::params::{build_max_concurrency, DEFAULT_MAX_CONCURRENCY};
use super::strategy::StrategyRegistry;
use crate::ports::config_port::ConfigPort;

#[derive(Debug)]
pub struct EngineContext {
    pub registry: StrategyRegistry,
    pub cache: HistoryCache,
    /// Worker threads for batch runs.
    pub max_concurrency: usize,
}

impl EngineContext {
    pub fn new(registry: StrategyRegistry, max_concurrency: usize) -> Self {
        EngineContext {
            registry,
            cache: HistoryCache::new(),
            max_concurrency: max_concurrency.max(1),
        }
    }

    /// Built-in strategies, `[batch] max_concurrency` from `config`.
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, FusetraderError> {
        let max_concurrency = build_max_concurrency(config)?;
        if max_concurrency == 0 {
            return Err(FusetraderError::invalid(
                "batch",
                "max_concurrency",
                "max_concurrency must be at least 1",
            ));
        }
        Ok(EngineContext::new(
            StrategyRegistry::with_builtins(),
            max_concurrency,
        ))
    }
}

impl Default for EngineContext {
    fn default() -> Self {
        EngineContext::new(StrategyRegistry::with_builtins(), DEFAULT_MAX_CONCURRENCY)
    }
}
