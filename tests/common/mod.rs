#![allow(dead_code)]

use chrono::{Duration, NaiveDate, NaiveDateTime};
use fusetrader::domain::error::FusetraderError;
pub use fusetrader::domain::ohlcv::OhlcvBar;
use fusetrader::ports::data_port::DataPort;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};

/// In-memory data port. Symbols can be made to fail or panic on fetch.
pub struct MockDataPort {
    pub data: HashMap<String, Vec<OhlcvBar>>,
    pub errors: HashMap<String, String>,
    pub panics: HashSet<String>,
    pub fetches: AtomicUsize,
}

impl MockDataPort {
    pub fn new() -> Self {
        Self {
            data: HashMap::new(),
            errors: HashMap::new(),
            panics: HashSet::new(),
            fetches: AtomicUsize::new(0),
        }
    }

    pub fn with_bars(mut self, symbol: &str, bars: Vec<OhlcvBar>) -> Self {
        self.data.insert(symbol.to_string(), bars);
        self
    }

    pub fn with_error(mut self, symbol: &str, reason: &str) -> Self {
        self.errors.insert(symbol.to_string(), reason.to_string());
        self
    }

    pub fn with_panic(mut self, symbol: &str) -> Self {
        self.panics.insert(symbol.to_string());
        self
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

impl DataPort for MockDataPort {
    fn fetch_bars(
        &self,
        symbol: &str,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<Vec<OhlcvBar>, FusetraderError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if self.panics.contains(symbol) {
            panic!("feed for {symbol} exploded");
        }
        if let Some(reason) = self.errors.get(symbol) {
            return Err(FusetraderError::DataSource {
                reason: reason.clone(),
            });
        }
        let bars: Vec<OhlcvBar> = self
            .data
            .get(symbol)
            .map(|bars| {
                bars.iter()
                    .filter(|b| start.is_none_or(|s| b.time.date() >= s))
                    .filter(|b| end.is_none_or(|e| b.time.date() <= e))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        if bars.is_empty() {
            return Err(FusetraderError::NoData {
                symbol: symbol.to_string(),
            });
        }
        Ok(bars)
    }

    fn list_symbols(&self) -> Result<Vec<String>, FusetraderError> {
        let mut symbols: Vec<String> = self.data.keys().cloned().collect();
        symbols.sort();
        Ok(symbols)
    }

    fn get_data_range(
        &self,
        symbol: &str,
    ) -> Result<Option<(NaiveDate, NaiveDate, usize)>, FusetraderError> {
        if let Some(reason) = self.errors.get(symbol) {
            return Err(FusetraderError::DataSource {
                reason: reason.clone(),
            });
        }
        Ok(self.data.get(symbol).and_then(|bars| {
            let first = bars.first()?.time.date();
            let last = bars.last()?.time.date();
            Some((first, last, bars.len()))
        }))
    }
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn start_time() -> NaiveDateTime {
    date(2024, 1, 1).and_hms_opt(0, 0, 0).unwrap()
}

/// Daily bars with a one-unit range around each close.
pub fn bars_from_closes(symbol: &str, closes: &[f64]) -> Vec<OhlcvBar> {
    closes
        .iter()
        .enumerate()
        .map(|(i, &c)| OhlcvBar {
            symbol: symbol.to_string(),
            time: start_time() + Duration::days(i as i64),
            open: c,
            high: c + 0.5,
            low: c - 0.5,
            close: c,
            volume: 1000.0,
        })
        .collect()
}

/// Strictly rising closes: `start`, `start + step`, ...
pub fn rising(symbol: &str, n: usize, start: f64, step: f64) -> Vec<OhlcvBar> {
    let closes: Vec<f64> = (0..n).map(|i| start + step * i as f64).collect();
    bars_from_closes(symbol, &closes)
}

/// A deterministic oscillating series with drift, for exercising every generator.
pub fn wavy(symbol: &str, n: usize) -> Vec<OhlcvBar> {
    let closes: Vec<f64> = (0..n)
        .map(|i| {
            let x = i as f64;
            100.0 + 0.05 * x + 8.0 * (x / 7.0).sin() + 3.0 * (x / 3.0).cos()
        })
        .collect();
    bars_from_closes(symbol, &closes)
}

pub fn write_temp_ini(content: &str) -> tempfile::NamedTempFile {
    use std::io::Write;
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}
