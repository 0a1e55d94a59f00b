//! CSV file market-data adapter.
//!
//! One file per symbol, `<dir>/<SYMBOL>.csv`, with the header
//! `date,open,high,low,close,volume`. Dates are `%Y-%m-%d` or
//! `%Y-%m-%d %H:%M:%S`.

use crate::domain::error::FusetraderError;
use crate::domain::ohlcv::OhlcvBar;
use crate::ports::data_port::DataPort;
use chrono::{NaiveDate, NaiveDateTime};
use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;

const DATE_FORMAT: &str = "%Y-%m-%d";
const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const HEADER: [&str; 6] = ["date", "open", "high", "low", "close", "volume"];

pub struct CsvAdapter {
    base_path: PathBuf,
}

impl CsvAdapter {
    pub fn new(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    fn csv_path(&self, symbol: &str) -> PathBuf {
        self.base_path.join(format!("{symbol}.csv"))
    }

    /// Every bar in the symbol's file, ascending by time.
    fn load(&self, symbol: &str) -> Result<Vec<OhlcvBar>, FusetraderError> {
        let path = self.csv_path(symbol);
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(FusetraderError::NoData {
                    symbol: symbol.to_string(),
                });
            }
            Err(e) => {
                return Err(FusetraderError::DataSource {
                    reason: format!("failed to read {}: {}", path.display(), e),
                });
            }
        };

        let mut rdr = csv::Reader::from_reader(content.as_bytes());
        let mut bars = Vec::new();

        for (row, result) in rdr.records().enumerate() {
            let record = result.map_err(|e| FusetraderError::DataSource {
                reason: format!("{}: CSV parse error: {}", path.display(), e),
            })?;
            let line = row + 2;

            let time = parse_time(field(&record, 0, "date", line)?).ok_or_else(|| {
                FusetraderError::DataSource {
                    reason: format!("{}:{line}: invalid date", path.display()),
                }
            })?;
            let open = number(&record, 1, "open", line)?;
            let high = number(&record, 2, "high", line)?;
            let low = number(&record, 3, "low", line)?;
            let close = number(&record, 4, "close", line)?;
            let volume = number(&record, 5, "volume", line)?;

            if high < low {
                return Err(FusetraderError::DataSource {
                    reason: format!("{}:{line}: high below low", path.display()),
                });
            }

            bars.push(OhlcvBar {
                symbol: symbol.to_string(),
                time,
                open,
                high,
                low,
                close,
                volume,
            });
        }

        bars.sort_by_key(|b| b.time);
        if bars.windows(2).any(|w| w[0].time == w[1].time) {
            return Err(FusetraderError::DataSource {
                reason: format!("{}: duplicate timestamps", path.display()),
            });
        }
        Ok(bars)
    }

    /// Write `bars` to the symbol's file, replacing it.
    pub fn write_bars(&self, symbol: &str, bars: &[OhlcvBar]) -> Result<(), FusetraderError> {
        let path = self.csv_path(symbol);
        let mut wtr = csv::Writer::from_path(&path).map_err(|e| FusetraderError::DataSource {
            reason: format!("failed to create {}: {}", path.display(), e),
        })?;
        let to_err = |e: csv::Error| FusetraderError::DataSource {
            reason: format!("failed to write {}: {}", path.display(), e),
        };

        wtr.write_record(HEADER).map_err(to_err)?;
        for bar in bars {
            wtr.write_record([
                bar.time.format(DATETIME_FORMAT).to_string(),
                bar.open.to_string(),
                bar.high.to_string(),
                bar.low.to_string(),
                bar.close.to_string(),
                bar.volume.to_string(),
            ])
            .map_err(to_err)?;
        }
        wtr.flush()?;
        Ok(())
    }
}

fn parse_time(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    NaiveDateTime::parse_from_str(raw, DATETIME_FORMAT)
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(raw, DATE_FORMAT)
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

fn field<'r>(
    record: &'r csv::StringRecord,
    index: usize,
    name: &str,
    line: usize,
) -> Result<&'r str, FusetraderError> {
    record.get(index).ok_or_else(|| FusetraderError::DataSource {
        reason: format!("line {line}: missing {name} column"),
    })
}

fn number(
    record: &csv::StringRecord,
    index: usize,
    name: &str,
    line: usize,
) -> Result<f64, FusetraderError> {
    let raw = field(record, index, name, line)?;
    match raw.trim().parse::<f64>() {
        Ok(v) if v.is_finite() => Ok(v),
        _ => Err(FusetraderError::DataSource {
            reason: format!("line {line}: invalid {name} value '{raw}'"),
        }),
    }
}

impl DataPort for CsvAdapter {
    fn fetch_bars(
        &self,
        symbol: &str,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<Vec<OhlcvBar>, FusetraderError> {
        let bars: Vec<OhlcvBar> = self
            .load(symbol)?
            .into_iter()
            .filter(|b| start.is_none_or(|s| b.time.date() >= s))
            .filter(|b| end.is_none_or(|e| b.time.date() <= e))
            .collect();

        if bars.is_empty() {
            return Err(FusetraderError::NoData {
                symbol: symbol.to_string(),
            });
        }
        Ok(bars)
    }

    fn list_symbols(&self) -> Result<Vec<String>, FusetraderError> {
        let entries = fs::read_dir(&self.base_path).map_err(|e| FusetraderError::DataSource {
            reason: format!(
                "failed to read directory {}: {}",
                self.base_path.display(),
                e
            ),
        })?;

        let mut symbols = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| FusetraderError::DataSource {
                reason: format!("directory entry error: {}", e),
            })?;
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "csv") {
                if let Some(stem) = path.file_stem() {
                    symbols.push(stem.to_string_lossy().into_owned());
                }
            }
        }

        symbols.sort();
        Ok(symbols)
    }

    fn get_data_range(
        &self,
        symbol: &str,
    ) -> Result<Option<(NaiveDate, NaiveDate, usize)>, FusetraderError> {
        let bars = match self.load(symbol) {
            Ok(bars) => bars,
            Err(FusetraderError::NoData { .. }) => return Ok(None),
            Err(e) => return Err(e),
        };
        Ok(match (bars.first(), bars.last()) {
            (Some(first), Some(last)) => Some((first.time.date(), last.time.date(), bars.len())),
            _ => None,
        })
    }
}
