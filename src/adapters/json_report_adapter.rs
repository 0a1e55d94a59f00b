//! JSON report adapter implementing [`ReportPort`].

use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use crate::domain::backtest::BacktestResult;
use crate::domain::batch::BatchResults;
use crate::domain::error::FusetraderError;
use crate::ports::report_port::ReportPort;

/// One symbol's entry in a batch report.
#[derive(Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
enum SymbolReport<'a> {
    Ok { result: &'a BacktestResult },
    Error { error: String },
}

#[derive(Serialize)]
struct BatchSummary {
    succeeded: usize,
    failed: usize,
    total_trades: usize,
    total_final_equity: f64,
}

#[derive(Serialize)]
struct BatchReport<'a> {
    summary: BatchSummary,
    results: BTreeMap<&'a str, SymbolReport<'a>>,
}

impl<'a> BatchReport<'a> {
    fn new(results: &'a BatchResults) -> Self {
        let mut summary = BatchSummary {
            succeeded: 0,
            failed: 0,
            total_trades: 0,
            total_final_equity: 0.0,
        };
        let results = results
            .iter()
            .map(|(symbol, outcome)| {
                let entry = match outcome {
                    Ok(result) => {
                        summary.succeeded += 1;
                        summary.total_trades += result.closed_trades.len();
                        summary.total_final_equity += result.final_equity;
                        SymbolReport::Ok { result }
                    }
                    Err(e) => {
                        summary.failed += 1;
                        SymbolReport::Error {
                            error: e.to_string(),
                        }
                    }
                };
                (symbol.as_str(), entry)
            })
            .collect();
        BatchReport { summary, results }
    }
}

#[derive(Debug, Default)]
pub struct JsonReportAdapter;

impl JsonReportAdapter {
    pub fn new() -> Self {
        Self
    }

    fn write_json<T: Serialize>(value: &T, output_path: &str) -> Result<(), FusetraderError> {
        let json = serde_json::to_string_pretty(value)?;
        let path = Path::new(output_path);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, json)?;
        Ok(())
    }
}

impl ReportPort for JsonReportAdapter {
    fn write(&self, result: &BacktestResult, output_path: &str) -> Result<(), FusetraderError> {
        Self::write_json(result, output_path)
    }

    fn write_batch(
        &self,
        results: &BatchResults,
        output_path: &str,
    ) -> Result<(), FusetraderError> {
        Self::write_json(&BatchReport::new(results), output_path)
    }
}
