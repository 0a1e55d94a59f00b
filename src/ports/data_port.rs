//! Market-data provider port.

use crate::domain::error::FusetraderError;
use crate::domain::ohlcv::OhlcvBar;
use chrono::NaiveDate;

/// Source of ordered OHLCV history. Shared across batch workers.
pub trait DataPort: Send + Sync {
    /// Bars for `symbol` in ascending time order, optionally restricted to
    /// `[start, end]` (inclusive, by date). An empty selection is `NoData`.
    fn fetch_bars(
        &self,
        symbol: &str,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<Vec<OhlcvBar>, FusetraderError>;

    fn list_symbols(&self) -> Result<Vec<String>, FusetraderError>;

    /// First date, last date and bar count, or `None` if the symbol is unknown.
    fn get_data_range(
        &self,
        symbol: &str,
    ) -> Result<Option<(NaiveDate, NaiveDate, usize)>, FusetraderError>;
}
