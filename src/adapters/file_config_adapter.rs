//! INI file implementation of [`ConfigPort`].
//!
//! Section and key names are case-insensitive; values keep their case. Blank
//! values read as missing.

use crate::domain::error::FusetraderError;
use crate::ports::config_port::ConfigPort;
use configparser::ini::Ini;
use std::path::Path;

#[derive(Debug)]
pub struct FileConfigAdapter {
    ini: Ini,
}

impl FileConfigAdapter {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, FusetraderError> {
        let path = path.as_ref();
        let mut ini = Ini::new();
        ini.load(path).map_err(|reason| FusetraderError::ConfigParse {
            file: path.display().to_string(),
            reason,
        })?;
        Ok(Self { ini })
    }

    pub fn from_string(content: &str) -> Result<Self, FusetraderError> {
        let mut ini = Ini::new();
        ini.read(content.to_string())
            .map_err(|reason| FusetraderError::ConfigParse {
                file: "<inline>".into(),
                reason,
            })?;
        Ok(Self { ini })
    }

    /// No sections at all; every getter returns its default.
    pub fn empty() -> Self {
        Self { ini: Ini::new() }
    }

    fn value(&self, section: &str, key: &str) -> Option<String> {
        self.ini
            .get(section, key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Some(true),
        "false" | "no" | "off" | "0" => Some(false),
        _ => None,
    }
}

impl ConfigPort for FileConfigAdapter {
    fn get_string(&self, section: &str, key: &str) -> Option<String> {
        self.value(section, key)
    }

    fn get_int(&self, section: &str, key: &str, default: i64) -> i64 {
        self.value(section, key)
            .and_then(|v| v.parse().ok())
            .unwrap_or(default)
    }

    fn get_double(&self, section: &str, key: &str, default: f64) -> f64 {
        self.value(section, key)
            .and_then(|v| v.parse::<f64>().ok())
            .filter(|v| v.is_finite())
            .unwrap_or(default)
    }

    fn get_bool(&self, section: &str, key: &str, default: bool) -> bool {
        self.value(section, key)
            .and_then(|v| parse_bool(&v))
            .unwrap_or(default)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_temp_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{}", content).unwrap();
        file
    }

    #[test]
    fn from_string_parses_config() {
        let content = r#"
[data]
directory = /var/lib/fusetrader/bars

[backtest]
symbols = BTCUSDT, ETHUSDT
strategy = seven_signal

[signals]
ma_fast = 10
"#;
        let adapter = FileConfigAdapter::from_string(content).unwrap();
        assert_eq!(
            adapter.get_string("data", "directory"),
            Some("/var/lib/fusetrader/bars".to_string())
        );
        assert_eq!(
            adapter.get_string("backtest", "symbols"),
            Some("BTCUSDT, ETHUSDT".to_string())
        );
        assert_eq!(adapter.get_int("signals", "ma_fast", 0), 10);
    }

    #[test]
    fn section_and_key_names_are_case_insensitive() {
        let adapter = FileConfigAdapter::from_string("[Risk]\nMax_Drawdown = 0.2\n").unwrap();
        assert_eq!(adapter.get_double("risk", "max_drawdown", 0.0), 0.2);
    }

    #[test]
    fn get_string_returns_none_for_missing_key() {
        let adapter =
            FileConfigAdapter::from_string("[backtest]\ninitial_capital = 100\n").unwrap();
        assert_eq!(adapter.get_string("backtest", "missing"), None);
        assert_eq!(adapter.get_string("missing_section", "key"), None);
    }

    #[test]
    fn get_int_returns_value_or_default() {
        let adapter =
            FileConfigAdapter::from_string("[execution]\ntwap_slices = 6\nticks_per_bar = many\n")
                .unwrap();
        assert_eq!(adapter.get_int("execution", "twap_slices", 0), 6);
        assert_eq!(adapter.get_int("execution", "ticks_per_bar", 16), 16);
        assert_eq!(adapter.get_int("execution", "missing", 42), 42);
    }

    #[test]
    fn get_double_returns_value_or_default() {
        let adapter = FileConfigAdapter::from_string(
            "[backtest]\ninitial_capital = 100000.5\nslippage_pct = lots\n",
        )
        .unwrap();
        assert_eq!(
            adapter.get_double("backtest", "initial_capital", 0.0),
            100000.5
        );
        assert_eq!(adapter.get_double("backtest", "slippage_pct", 99.9), 99.9);
        assert_eq!(adapter.get_double("backtest", "missing", 1.5), 1.5);
    }

    #[test]
    fn get_bool_accepts_common_spellings() {
        let adapter = FileConfigAdapter::from_string(
            "[risk]\na = true\nb = yes\nc = on\nd = false\ne = no\nf = 0\ng = maybe\n",
        )
        .unwrap();
        assert!(adapter.get_bool("risk", "a", false));
        assert!(adapter.get_bool("risk", "b", false));
        assert!(adapter.get_bool("risk", "c", false));
        assert!(!adapter.get_bool("risk", "d", true));
        assert!(!adapter.get_bool("risk", "e", true));
        assert!(!adapter.get_bool("risk", "f", true));
        assert!(adapter.get_bool("risk", "g", true));
        assert!(!adapter.get_bool("risk", "missing", false));
    }

    #[test]
    fn from_file_reads_config() {
        let file = create_temp_config("[batch]\nmax_concurrency = 8\n");
        let adapter = FileConfigAdapter::from_file(file.path()).unwrap();
        assert_eq!(adapter.get_int("batch", "max_concurrency", 0), 8);
    }

    #[test]
    fn from_file_returns_error_for_missing_file() {
        let err = FileConfigAdapter::from_file("/nonexistent/path/config.ini").unwrap_err();
        assert!(matches!(err, FusetraderError::ConfigParse { ref file, .. } if file.ends_with("config.ini")));
    }

    #[test]
    fn blank_values_read_as_missing() {
        let adapter =
            FileConfigAdapter::from_string("[backtest]\nsymbols =\ninitial_capital =  \n").unwrap();
        assert_eq!(adapter.get_string("backtest", "symbols"), None);
        assert_eq!(adapter.get_double("backtest", "initial_capital", 7.0), 7.0);
        assert_eq!(FileConfigAdapter::empty().get_int("batch", "max_concurrency", 4), 4);
    }
}
