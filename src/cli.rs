//! CLI definition and dispatch.
//!
//! Each subcommand has a `*_command` function that does the work and returns
//! a typed result; [`run`] prints summaries to stderr and maps errors to exit
//! codes.

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use crate::adapters::csv_adapter::CsvAdapter;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::adapters::json_report_adapter::JsonReportAdapter;
use crate::domain::algo::{drive, AlgoFill, ExecutionAlgorithm, Grid, GridConfig, Twap, TwapConfig};
use crate::domain::backtest::ExecutionMode;
use crate::domain::batch::{run_batch, BatchRequest, BatchResults, CancelToken};
use crate::domain::config_validation::validate_config;
use crate::domain::context::EngineContext;
use crate::domain::error::FusetraderError;
use crate::domain::fusion::FusedSignal;
use crate::domain::order_book::OrderBook;
use crate::domain::params::{
    build_backtest_config, build_risk_parameters, build_run_settings, build_tick_settings,
    RunSettings, SignalParameters, DEFAULT_TWAP_SLICES,
};
use crate::domain::position::Side;
use crate::domain::strategy::StrategyRegistry;
use crate::domain::tick::{bar_duration, ticks_for_bars};
use crate::domain::universe::{parse_codes, validate_universe};
use crate::ports::config_port::ConfigPort;
use crate::ports::data_port::DataPort;
use crate::ports::report_port::ReportPort;

const DEFAULT_REPORT_PATH: &str = "report.json";

#[derive(Parser, Debug)]
#[command(
    name = "fusetrader",
    about = "Signal fusion backtester and execution simulator"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Backtest a strategy over a symbol universe
    Backtest(BacktestArgs),
    /// Print the fused signal for a symbol's latest bar
    Signal(SignalArgs),
    /// Simulate an execution algorithm over a symbol's bars
    Execute(ExecuteArgs),
    /// Validate a configuration file
    Validate {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// List registered strategies
    Strategies,
}

#[derive(Args, Debug, Clone)]
pub struct BacktestArgs {
    #[arg(short, long)]
    pub config: PathBuf,
    /// Comma-separated symbols, replacing `[backtest] symbols`
    #[arg(long)]
    pub symbols: Option<String>,
    #[arg(long)]
    pub strategy: Option<String>,
    /// Directory of `<SYMBOL>.csv` files, replacing `[data] directory`
    #[arg(long)]
    pub data_dir: Option<PathBuf>,
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct SignalArgs {
    #[arg(short, long)]
    pub config: Option<PathBuf>,
    #[arg(long)]
    pub symbol: String,
    #[arg(long)]
    pub strategy: Option<String>,
    #[arg(long)]
    pub data_dir: Option<PathBuf>,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlgoKind {
    Twap,
    Grid,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SideArg {
    Buy,
    Sell,
}

impl From<SideArg> for Side {
    fn from(side: SideArg) -> Self {
        match side {
            SideArg::Buy => Side::Buy,
            SideArg::Sell => Side::Sell,
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct ExecuteArgs {
    #[arg(short, long)]
    pub config: Option<PathBuf>,
    #[arg(long)]
    pub symbol: String,
    #[arg(long, value_enum)]
    pub algo: AlgoKind,
    #[arg(long)]
    pub data_dir: Option<PathBuf>,
    /// TWAP: total quantity to work
    #[arg(long, default_value_t = 100.0)]
    pub quantity: f64,
    #[arg(long, value_enum, default_value_t = SideArg::Buy)]
    pub side: SideArg,
    /// TWAP: number of slices (defaults to `[execution] twap_slices`)
    #[arg(long)]
    pub slices: Option<usize>,
    /// Grid: lowest price line
    #[arg(long)]
    pub lower: Option<f64>,
    /// Grid: highest price line
    #[arg(long)]
    pub upper: Option<f64>,
    #[arg(long, default_value_t = 10)]
    pub grids: usize,
    #[arg(long, default_value_t = 1000.0)]
    pub capital_per_grid: f64,
}

pub fn run(cli: Cli) -> ExitCode {
    let outcome = match cli.command {
        Command::Backtest(args) => backtest_command(&args).map(|results| {
            print_batch_summary(&results);
            batch_exit_code(&results)
        }),
        Command::Signal(args) => signal_command(&args).and_then(|signal| {
            println!("{}", serde_json::to_string_pretty(&signal)?);
            Ok(ExitCode::SUCCESS)
        }),
        Command::Execute(args) => execute_command(&args).and_then(|fills| {
            println!("{}", serde_json::to_string_pretty(&fills)?);
            print_fill_summary(&fills);
            Ok(ExitCode::SUCCESS)
        }),
        Command::Validate { config } => validate_command(&config).map(|()| {
            eprintln!("Configuration is valid.");
            ExitCode::SUCCESS
        }),
        Command::Strategies => {
            for (id, description) in StrategyRegistry::with_builtins().list() {
                println!("{id:<16} {description}");
            }
            Ok(ExitCode::SUCCESS)
        }
    };

    outcome.unwrap_or_else(|e| {
        eprintln!("error: {e}");
        ExitCode::from(&e)
    })
}

pub fn load_config(path: &Path) -> Result<FileConfigAdapter, FusetraderError> {
    FileConfigAdapter::from_file(path)
}

fn load_optional_config(path: Option<&PathBuf>) -> Result<FileConfigAdapter, FusetraderError> {
    match path {
        Some(p) => load_config(p),
        None => Ok(FileConfigAdapter::empty()),
    }
}

/// `--data-dir` if given, otherwise `[data] directory`.
pub fn resolve_data_dir(
    flag: Option<&PathBuf>,
    config: &dyn ConfigPort,
) -> Result<PathBuf, FusetraderError> {
    if let Some(dir) = flag {
        return Ok(dir.clone());
    }
    config
        .get_string("data", "directory")
        .map(|d| d.trim().to_string())
        .filter(|d| !d.is_empty())
        .map(PathBuf::from)
        .ok_or_else(|| FusetraderError::ConfigMissing {
            section: "data".into(),
            key: "directory".into(),
        })
}

/// Run settings with command-line overrides applied. At least one symbol
/// must remain.
pub fn resolve_run_settings(
    config: &dyn ConfigPort,
    symbols: Option<&str>,
    strategy: Option<&str>,
) -> Result<RunSettings, FusetraderError> {
    let mut run = build_run_settings(config)?;
    if let Some(raw) = symbols {
        run.symbols = parse_codes(raw)?;
    }
    if let Some(id) = strategy {
        run.strategy = id.trim().to_string();
    }
    if run.symbols.is_empty() {
        return Err(FusetraderError::ConfigMissing {
            section: "backtest".into(),
            key: "symbols".into(),
        });
    }
    Ok(run)
}

/// Assemble a batch request from configuration plus overrides.
pub fn build_batch_request(
    config: &dyn ConfigPort,
    symbols: Option<&str>,
    strategy: Option<&str>,
) -> Result<BatchRequest, FusetraderError> {
    let run = resolve_run_settings(config, symbols, strategy)?;
    Ok(BatchRequest {
        symbols: run.symbols,
        strategy: run.strategy,
        signals: SignalParameters::from_config(config)?,
        backtest: build_backtest_config(config)?,
        risk: build_risk_parameters(config)?,
        start_date: run.start_date,
        end_date: run.end_date,
    })
}

pub fn backtest_command(args: &BacktestArgs) -> Result<BatchResults, FusetraderError> {
    eprintln!("Loading config from {}", args.config.display());
    let config = load_config(&args.config)?;
    validate_config(&config, &StrategyRegistry::with_builtins())?;

    let context = EngineContext::from_config(&config)?;
    let mut request =
        build_batch_request(&config, args.symbols.as_deref(), args.strategy.as_deref())?;
    let data = CsvAdapter::new(resolve_data_dir(args.data_dir.as_ref(), &config)?);

    let minimum = context
        .registry
        .build(&request.strategy, &request.signals)?
        .lookback()
        .max(1);
    eprintln!(
        "Validating {} symbols (need {} bars each)...",
        request.symbols.len(),
        minimum
    );
    let screened = validate_universe(&data, std::mem::take(&mut request.symbols), minimum)?;
    for skipped in &screened.skipped {
        eprintln!("  skipped {}: {:?}", skipped.symbol, skipped.reason);
    }
    request.symbols = screened.symbols;

    eprintln!(
        "Running {} on {} symbols with {} threads",
        request.strategy,
        request.symbols.len(),
        context.max_concurrency
    );
    let results = run_batch(&context, &data, &request, &CancelToken::new())?;

    let output = args
        .output
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_REPORT_PATH));
    JsonReportAdapter::new().write_batch(&results, &output.to_string_lossy())?;
    eprintln!("Report written to: {}", output.display());

    Ok(results)
}

pub fn signal_command(args: &SignalArgs) -> Result<FusedSignal, FusetraderError> {
    let config = load_optional_config(args.config.as_ref())?;
    let run = build_run_settings(&config)?;
    let strategy_id = args.strategy.as_deref().unwrap_or(&run.strategy);
    let strategy =
        StrategyRegistry::with_builtins().build(strategy_id, &SignalParameters::from_config(&config)?)?;

    let symbol = args.symbol.trim().to_uppercase();
    let data = CsvAdapter::new(resolve_data_dir(args.data_dir.as_ref(), &config)?);
    let bars = data.fetch_bars(&symbol, run.start_date, run.end_date)?;

    let minimum = strategy.lookback().max(1);
    if bars.len() < minimum {
        return Err(FusetraderError::InsufficientData {
            symbol,
            bars: bars.len(),
            minimum,
        });
    }
    Ok(strategy.decide(&symbol, &bars))
}

pub fn execute_command(args: &ExecuteArgs) -> Result<Vec<AlgoFill>, FusetraderError> {
    let config = load_optional_config(args.config.as_ref())?;
    let run = build_run_settings(&config)?;
    let symbol = args.symbol.trim().to_uppercase();
    let data = CsvAdapter::new(resolve_data_dir(args.data_dir.as_ref(), &config)?);
    let bars = data.fetch_bars(&symbol, run.start_date, run.end_date)?;
    let (Some(first), Some(last)) = (bars.first(), bars.last()) else {
        return Err(FusetraderError::NoData { symbol });
    };

    let (ticks_per_bar, tick_config) = build_tick_settings(&config)?;
    let ticks = ticks_for_bars(&bars, ticks_per_bar, tick_config)?;
    let mut book = OrderBook::new();

    let mut algo: Box<dyn ExecutionAlgorithm> = match args.algo {
        AlgoKind::Twap => {
            let slices = match args.slices {
                Some(n) => n,
                None => match build_backtest_config(&config)?.mode {
                    ExecutionMode::Twap { slices, .. } => slices,
                    ExecutionMode::BarClose => DEFAULT_TWAP_SLICES,
                },
            };
            Box::new(Twap::new(TwapConfig {
                total_quantity: args.quantity,
                side: args.side.into(),
                start_time: first.time,
                end_time: last.time + bar_duration(&bars, bars.len() - 1),
                slice_count: slices,
            })?)
        }
        AlgoKind::Grid => {
            let lower = args.lower.ok_or_else(|| FusetraderError::ConfigMissing {
                section: "grid".into(),
                key: "lower_limit".into(),
            })?;
            let upper = args.upper.ok_or_else(|| FusetraderError::ConfigMissing {
                section: "grid".into(),
                key: "upper_limit".into(),
            })?;
            Box::new(Grid::new(
                GridConfig {
                    lower_limit: lower,
                    upper_limit: upper,
                    grid_count: args.grids,
                    capital_per_grid: args.capital_per_grid,
                },
                first.open,
            )?)
        }
    };

    drive(algo.as_mut(), &mut book, ticks);
    Ok(algo.fills().to_vec())
}

pub fn validate_command(config_path: &Path) -> Result<(), FusetraderError> {
    eprintln!("Validating config: {}", config_path.display());
    let config = load_config(config_path)?;
    let registry = StrategyRegistry::with_builtins();
    validate_config(&config, &registry)?;

    let run = build_run_settings(&config)?;
    eprintln!("  strategy: {}", run.strategy);
    if run.symbols.is_empty() {
        eprintln!("  symbols:  (none configured, pass --symbols)");
    } else {
        eprintln!("  symbols:  {}", run.symbols.join(", "));
    }
    Ok(())
}

fn print_batch_summary(results: &BatchResults) {
    eprintln!("\n=== Results ===");
    for (symbol, outcome) in results {
        match outcome {
            Ok(r) => eprintln!(
                "  {:<10} {:>4} trades  return {:>7.2}%  sharpe {:>5.2}  max dd -{:.1}%",
                symbol,
                r.metrics.total_trades,
                r.metrics.total_return * 100.0,
                r.metrics.sharpe_ratio,
                r.metrics.max_drawdown * 100.0,
            ),
            Err(e) => eprintln!("  {symbol:<10} failed: {e}"),
        }
    }
}

/// Success when at least one symbol completed.
fn batch_exit_code(results: &BatchResults) -> ExitCode {
    if results.values().any(|r| r.is_ok()) {
        return ExitCode::SUCCESS;
    }
    match results.values().find_map(|r| r.as_ref().err()) {
        Some(e) => ExitCode::from(e),
        None => ExitCode::SUCCESS,
    }
}

fn print_fill_summary(fills: &[AlgoFill]) {
    let bought: f64 = fills
        .iter()
        .filter(|f| f.side == Side::Buy)
        .map(|f| f.quantity)
        .sum();
    let sold: f64 = fills
        .iter()
        .filter(|f| f.side == Side::Sell)
        .map(|f| f.quantity)
        .sum();
    let notional: f64 = fills.iter().map(|f| f.price * f.quantity).sum();
    let volume = bought + sold;
    eprintln!(
        "{} fills, bought {:.4}, sold {:.4}, average price {:.4}",
        fills.len(),
        bought,
        sold,
        if volume > 0.0 { notional / volume } else { 0.0 }
    );
}
