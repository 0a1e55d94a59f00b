//! Symbol universe for batch backtests.
//!
//! Parses symbol lists from configuration and screens each symbol for enough
//! history before any replay is scheduled.

use crate::domain::error::FusetraderError;
use crate::ports::data_port::DataPort;
use std::collections::HashSet;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UniverseError {
    #[error("empty token in symbol list")]
    EmptyToken,

    #[error("duplicate symbol: {0}")]
    DuplicateSymbol(String),
}

impl From<UniverseError> for FusetraderError {
    fn from(err: UniverseError) -> Self {
        FusetraderError::invalid("backtest", "symbols", err.to_string())
    }
}

/// Comma-separated, case-insensitive symbol list. Order is preserved.
pub fn parse_codes(input: &str) -> Result<Vec<String>, UniverseError> {
    let mut symbols = Vec::new();
    let mut seen = HashSet::new();

    for token in input.split(',') {
        let trimmed = token.trim();
        if trimmed.is_empty() {
            return Err(UniverseError::EmptyToken);
        }
        let symbol = trimmed.to_uppercase();
        if !seen.insert(symbol.clone()) {
            return Err(UniverseError::DuplicateSymbol(symbol));
        }
        symbols.push(symbol);
    }

    Ok(symbols)
}

#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    NoData,
    InsufficientBars { bars: usize },
    Unavailable { reason: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct SkippedSymbol {
    pub symbol: String,
    pub reason: SkipReason,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UniverseValidation {
    pub symbols: Vec<String>,
    pub skipped: Vec<SkippedSymbol>,
}

/// Keep the symbols whose stored history has at least `minimum` bars.
///
/// Uses the provider's range summary, so no bars are loaded. Fails with
/// `InsufficientData` when every symbol is skipped.
pub fn validate_universe(
    data_port: &dyn DataPort,
    symbols: Vec<String>,
    minimum: usize,
) -> Result<UniverseValidation, FusetraderError> {
    let total = symbols.len();
    let mut valid = Vec::with_capacity(total);
    let mut skipped = Vec::new();

    for symbol in symbols {
        let reason = match data_port.get_data_range(&symbol) {
            Err(e) => Some(SkipReason::Unavailable {
                reason: e.to_string(),
            }),
            Ok(None) => Some(SkipReason::NoData),
            Ok(Some((_, _, bars))) if bars == 0 => Some(SkipReason::NoData),
            Ok(Some((_, _, bars))) if bars < minimum => {
                Some(SkipReason::InsufficientBars { bars })
            }
            Ok(Some(_)) => None,
        };

        match reason {
            Some(reason) => {
                warn!(symbol = %symbol, ?reason, minimum, "skipping symbol");
                skipped.push(SkippedSymbol { symbol, reason });
            }
            None => valid.push(symbol),
        }
    }

    if valid.is_empty() {
        return Err(FusetraderError::InsufficientData {
            symbol: "all".to_string(),
            bars: 0,
            minimum,
        });
    }
    if !skipped.is_empty() {
        info!(kept = valid.len(), total, "universe screened");
    }

    Ok(UniverseValidation {
        symbols: valid,
        skipped,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ohlcv::OhlcvBar;
    use chrono::NaiveDate;
    use std::collections::BTreeMap;

    struct RangeOnly(BTreeMap<String, usize>);

    impl DataPort for RangeOnly {
        fn fetch_bars(
            &self,
            symbol: &str,
            _start: Option<NaiveDate>,
            _end: Option<NaiveDate>,
        ) -> Result<Vec<OhlcvBar>, FusetraderError> {
            Err(FusetraderError::NoData {
                symbol: symbol.to_string(),
            })
        }

        fn list_symbols(&self) -> Result<Vec<String>, FusetraderError> {
            Ok(self.0.keys().cloned().collect())
        }

        fn get_data_range(
            &self,
            symbol: &str,
        ) -> Result<Option<(NaiveDate, NaiveDate, usize)>, FusetraderError> {
            if symbol == "BROKEN" {
                return Err(FusetraderError::DataSource {
                    reason: "unreadable".into(),
                });
            }
            let day = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
            Ok(self.0.get(symbol).map(|&n| (day, day, n)))
        }
    }

    fn port() -> RangeOnly {
        RangeOnly(BTreeMap::from([
            ("AAA".to_string(), 100),
            ("BBB".to_string(), 5),
            ("EMPTY".to_string(), 0),
        ]))
    }

    #[test]
    fn parse_codes_basic() {
        assert_eq!(
            parse_codes("BTCUSDT,ETHUSDT,SOLUSDT").unwrap(),
            vec!["BTCUSDT", "ETHUSDT", "SOLUSDT"]
        );
    }

    #[test]
    fn parse_codes_trims_and_uppercases() {
        assert_eq!(
            parse_codes("  btcusdt , EthUsdt ").unwrap(),
            vec!["BTCUSDT", "ETHUSDT"]
        );
    }

    #[test]
    fn parse_codes_empty_token() {
        assert_eq!(parse_codes("AAA,,BBB"), Err(UniverseError::EmptyToken));
    }

    #[test]
    fn parse_codes_duplicate() {
        assert!(matches!(
            parse_codes("AAA,BBB,aaa"),
            Err(UniverseError::DuplicateSymbol(s)) if s == "AAA"
        ));
    }

    #[test]
    fn universe_error_is_config_error() {
        let err: FusetraderError = UniverseError::EmptyToken.into();
        assert!(err.is_config());
    }

    #[test]
    fn screens_short_missing_and_broken_symbols() {
        let symbols = vec![
            "AAA".to_string(),
            "BBB".to_string(),
            "EMPTY".to_string(),
            "MISSING".to_string(),
            "BROKEN".to_string(),
        ];
        let result = validate_universe(&port(), symbols, 30).unwrap();
        assert_eq!(result.symbols, vec!["AAA"]);
        assert_eq!(result.skipped.len(), 4);
        assert_eq!(
            result.skipped[0].reason,
            SkipReason::InsufficientBars { bars: 5 }
        );
        assert_eq!(result.skipped[1].reason, SkipReason::NoData);
        assert_eq!(result.skipped[2].reason, SkipReason::NoData);
        assert!(matches!(
            result.skipped[3].reason,
            SkipReason::Unavailable { .. }
        ));
    }

    #[test]
    fn all_skipped_is_insufficient_data() {
        let err = validate_universe(&port(), vec!["BBB".to_string()], 30).unwrap_err();
        assert!(matches!(err, FusetraderError::InsufficientData { minimum: 30, .. }));
    }
}
