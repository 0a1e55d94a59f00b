//! Results sink port.

use crate::domain::backtest::BacktestResult;
use crate::domain::batch::BatchResults;
use crate::domain::error::FusetraderError;

pub trait ReportPort {
    fn write(&self, result: &BacktestResult, output_path: &str) -> Result<(), FusetraderError>;

    fn write_batch(&self, results: &BatchResults, output_path: &str)
        -> Result<(), FusetraderError>;
}
