//! Domain error types.

/// Top-level error type for fusetrader.
#[derive(Debug, thiserror::Error)]
pub enum FusetraderError {
    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error("unknown strategy: {id}")]
    UnknownStrategy { id: String },

    #[error("data source error: {reason}")]
    DataSource { reason: String },

    #[error("no data for {symbol}")]
    NoData { symbol: String },

    #[error("insufficient data for {symbol}: have {bars} bars, need {minimum}")]
    InsufficientData {
        symbol: String,
        bars: usize,
        minimum: usize,
    },

    #[error("invalid order: {reason}")]
    InvalidOrder { reason: String },

    #[error("backtest failed for {symbol}: {reason}")]
    BatchSymbolFailure { symbol: String, reason: String },

    #[error("run cancelled for {symbol}")]
    Cancelled { symbol: String },

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl FusetraderError {
    /// Shorthand for the common `ConfigInvalid` construction.
    pub fn invalid(section: &str, key: &str, reason: impl Into<String>) -> Self {
        FusetraderError::ConfigInvalid {
            section: section.to_string(),
            key: key.to_string(),
            reason: reason.into(),
        }
    }

    pub fn is_config(&self) -> bool {
        matches!(
            self,
            FusetraderError::ConfigParse { .. }
                | FusetraderError::ConfigMissing { .. }
                | FusetraderError::ConfigInvalid { .. }
        )
    }
}

impl From<&FusetraderError> for std::process::ExitCode {
    fn from(err: &FusetraderError) -> Self {
        let code: u8 = match err {
            FusetraderError::Io(_) | FusetraderError::Json(_) => 1,
            FusetraderError::ConfigParse { .. }
            | FusetraderError::ConfigMissing { .. }
            | FusetraderError::ConfigInvalid { .. } => 2,
            FusetraderError::UnknownStrategy { .. } => 3,
            FusetraderError::DataSource { .. }
            | FusetraderError::NoData { .. }
            | FusetraderError::InsufficientData { .. } => 5,
            FusetraderError::InvalidOrder { .. }
            | FusetraderError::BatchSymbolFailure { .. }
            | FusetraderError::Cancelled { .. } => 6,
        };
        std::process::ExitCode::from(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_helper_builds_config_error() {
        let err = FusetraderError::invalid("risk", "max_drawdown", "must be positive");
        assert!(err.is_config());
        assert_eq!(
            err.to_string(),
            "invalid config value [risk] max_drawdown: must be positive"
        );
    }

    #[test]
    fn insufficient_data_message() {
        let err = FusetraderError::InsufficientData {
            symbol: "BTCUSDT".into(),
            bars: 12,
            minimum: 30,
        };
        assert_eq!(
            err.to_string(),
            "insufficient data for BTCUSDT: have 12 bars, need 30"
        );
        assert!(!err.is_config());
    }
}
