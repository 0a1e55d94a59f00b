//! Single-flight cache of fetched bar history.
//!
//! Concurrent requests for the same key share one fetch: the first caller runs
//! it and the rest block on the same slot until it completes. A failed fetch is
//! reported to every caller waiting on it, then evicted so the next request
//! retries.

use chrono::NaiveDate;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};
use tracing::debug;

use super::error::FusetraderError;
use super::ohlcv::OhlcvBar;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct HistoryKey {
    pub symbol: String,
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

impl HistoryKey {
    pub fn new(symbol: &str, start: Option<NaiveDate>, end: Option<NaiveDate>) -> Self {
        HistoryKey {
            symbol: symbol.to_string(),
            start,
            end,
        }
    }
}

pub type History = Arc<Vec<OhlcvBar>>;

type Outcome = Result<History, Arc<FusetraderError>>;
type Slot = Arc<OnceLock<Outcome>>;

#[derive(Debug, Default)]
pub struct HistoryCache {
    slots: Mutex<BTreeMap<HistoryKey, Slot>>,
}

impl HistoryCache {
    pub fn new() -> Self {
        HistoryCache::default()
    }

    fn slots(&self) -> MutexGuard<'_, BTreeMap<HistoryKey, Slot>> {
        // the map is never left half-updated, so a poisoned lock is still usable
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Cached history for `key`, running `fetch` only if no fetch for it has
    /// completed or is in flight.
    pub fn get_or_fetch<F>(&self, key: &HistoryKey, fetch: F) -> Result<History, FusetraderError>
    where
        F: FnOnce() -> Result<Vec<OhlcvBar>, FusetraderError>,
    {
        let slot = Arc::clone(self.slots().entry(key.clone()).or_default());

        let outcome = slot.get_or_init(|| {
            debug!(symbol = %key.symbol, "fetching history");
            fetch().map(Arc::new).map_err(Arc::new)
        });

        match outcome {
            Ok(bars) => Ok(Arc::clone(bars)),
            Err(e) => {
                let mut slots = self.slots();
                if slots.get(key).is_some_and(|current| Arc::ptr_eq(current, &slot)) {
                    slots.remove(key);
                }
                Err(replay(e))
            }
        }
    }

    pub fn contains(&self, key: &HistoryKey) -> bool {
        self.slots()
            .get(key)
            .is_some_and(|slot| matches!(slot.get(), Some(Ok(_))))
    }

    pub fn len(&self) -> usize {
        self.slots().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.slots().clear();
    }
}

/// Rebuild a shared failure for one more caller.
fn replay(err: &FusetraderError) -> FusetraderError {
    match err {
        FusetraderError::NoData { symbol } => FusetraderError::NoData {
            symbol: symbol.clone(),
        },
        FusetraderError::InsufficientData {
            symbol,
            bars,
            minimum,
        } => FusetraderError::InsufficientData {
            symbol: symbol.clone(),
            bars: *bars,
            minimum: *minimum,
        },
        FusetraderError::DataSource { reason } => FusetraderError::DataSource {
            reason: reason.clone(),
        },
        other => FusetraderError::DataSource {
            reason: other.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::signal::test_bars::from_closes;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Barrier;
    use std::thread;
    use std::time::Duration;

    fn key(symbol: &str) -> HistoryKey {
        HistoryKey::new(symbol, None, None)
    }

    #[test]
    fn second_call_hits_cache() {
        let cache = HistoryCache::new();
        let calls = AtomicUsize::new(0);
        let fetch = || {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(from_closes(&[1.0, 2.0, 3.0]))
        };
        let a = cache.get_or_fetch(&key("AAA"), fetch).unwrap();
        let b = cache
            .get_or_fetch(&key("AAA"), || {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(Vec::new())
            })
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(Arc::ptr_eq(&a, &b));
        assert!(cache.contains(&key("AAA")));
    }

    #[test]
    fn distinct_ranges_are_distinct_keys() {
        let cache = HistoryCache::new();
        let ranged = HistoryKey::new("AAA", NaiveDate::from_ymd_opt(2024, 1, 1), None);
        cache.get_or_fetch(&key("AAA"), || Ok(from_closes(&[1.0]))).unwrap();
        cache.get_or_fetch(&ranged, || Ok(from_closes(&[2.0]))).unwrap();
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn concurrent_callers_share_one_fetch() {
        let cache = HistoryCache::new();
        let calls = AtomicUsize::new(0);
        let barrier = Barrier::new(8);

        let results: Vec<History> = thread::scope(|s| {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    s.spawn(|| {
                        barrier.wait();
                        cache
                            .get_or_fetch(&key("AAA"), || {
                                calls.fetch_add(1, Ordering::SeqCst);
                                thread::sleep(Duration::from_millis(50));
                                Ok(from_closes(&[1.0, 2.0]))
                            })
                            .unwrap()
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(results.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
    }

    #[test]
    fn failure_is_evicted_and_retried() {
        let cache = HistoryCache::new();
        let err = cache
            .get_or_fetch(&key("AAA"), || {
                Err(FusetraderError::NoData {
                    symbol: "AAA".into(),
                })
            })
            .unwrap_err();
        assert!(matches!(err, FusetraderError::NoData { .. }));
        assert!(cache.is_empty());

        let bars = cache
            .get_or_fetch(&key("AAA"), || Ok(from_closes(&[5.0])))
            .unwrap();
        assert_eq!(bars.len(), 1);
    }

    #[test]
    fn clear_empties_cache() {
        let cache = HistoryCache::new();
        cache.get_or_fetch(&key("AAA"), || Ok(from_closes(&[1.0]))).unwrap();
        cache.clear();
        assert!(cache.is_empty());
    }
}
