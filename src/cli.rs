//! CLI definition and dispatch.

use clap::{Parser, Subcommand};
use serde::Serialize;
use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use crate::adapters::csv_adapter::CsvAdapter;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::adapters::json_report_adapter::JsonReportAdapter;
use crate::adapters::strategy_file_store::StrategyFileStore;
use crate::domain::config::EngineConfig;
use crate::domain::error::QuantgateError;
use crate::domain::executor::Executor;
use crate::domain::progressive::{BatchReport, ProgressiveRunner};
use crate::domain::scorer::{StrategyRanking, top_combinations};
use crate::domain::strategy::{StrategyParams, load_deployed};
use crate::domain::validator::{ValidationRequest, Validator};
use crate::ports::data_port::DataPort;
use crate::ports::report_port::ReportPort;
use crate::ports::strategy_port::DeploymentStore;

#[derive(Parser, Debug)]
#[command(
    name = "quantgate",
    about = "Strategy backtest scoring and A/B validation"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run one deployed strategy on one symbol
    Run {
        #[arg(short, long)]
        config: Option<PathBuf>,
        #[arg(short, long)]
        strategy: String,
        #[arg(long)]
        symbol: String,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Run every strategy on every symbol and write the full report
    Batch {
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Comma-separated strategy names (default: all deployed)
        #[arg(long, value_delimiter = ',')]
        strategies: Vec<String>,
        /// Comma-separated symbols (default: all with data)
        #[arg(long, value_delimiter = ',')]
        symbols: Vec<String>,
    },
    /// Compare a new strategy version against the old one
    Validate {
        #[arg(short, long)]
        config: Option<PathBuf>,
        #[arg(short, long)]
        strategy: String,
        /// Old version source (default: the deployed file)
        #[arg(long)]
        old: Option<PathBuf>,
        #[arg(long)]
        new: PathBuf,
        #[arg(long, value_delimiter = ',')]
        symbols: Vec<String>,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Show the last batch report and progress
    Report {
        #[arg(short, long)]
        config: Option<PathBuf>,
        #[arg(long, default_value_t = 10)]
        top: usize,
    },
    /// List deployed strategies
    ListStrategies {
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// List symbols with candle data
    ListSymbols {
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

pub fn run(cli: Cli) -> ExitCode {
    match cli.command {
        Command::Run {
            config,
            strategy,
            symbol,
            output,
        } => run_single(config.as_ref(), &strategy, &symbol, output.as_ref()),
        Command::Batch {
            config,
            strategies,
            symbols,
        } => run_batch(config.as_ref(), strategies, symbols),
        Command::Validate {
            config,
            strategy,
            old,
            new,
            symbols,
            output,
        } => run_validate(
            config.as_ref(),
            &strategy,
            old.as_ref(),
            &new,
            symbols,
            output.as_ref(),
        ),
        Command::Report { config, top } => run_report(config.as_ref(), top),
        Command::ListStrategies { config } => run_list_strategies(config.as_ref()),
        Command::ListSymbols { config } => run_list_symbols(config.as_ref()),
    }
}

fn fail(err: QuantgateError) -> ExitCode {
    eprintln!("error: {err}");
    (&err).into()
}

pub fn load_config(path: &PathBuf) -> Result<FileConfigAdapter, ExitCode> {
    FileConfigAdapter::from_file(path).map_err(|e| {
        fail(QuantgateError::ConfigParse {
            file: path.display().to_string(),
            reason: e.to_string(),
        })
    })
}

/// Engine config from `path`, or the defaults when no file is given.
pub fn load_engine_config(path: Option<&PathBuf>) -> Result<EngineConfig, ExitCode> {
    let adapter = match path {
        Some(p) => {
            eprintln!("Loading config from {}", p.display());
            load_config(p)?
        }
        None => FileConfigAdapter::empty(),
    };
    EngineConfig::from_config(&adapter).map_err(fail)
}

fn executor(config: &EngineConfig) -> Executor {
    Executor::new(config.initial_capital, config.run_timeout)
        .with_params(StrategyParams {
            timeframe: config.timeframe.clone(),
            ..StrategyParams::default()
        })
        .with_normalizer(config.normalizer.clone())
}

fn write_json<T: Serialize>(value: &T, output: Option<&PathBuf>) -> Result<(), QuantgateError> {
    let json = serde_json::to_string_pretty(value)?;
    match output {
        Some(path) => {
            fs::write(path, json)?;
            eprintln!("\nWritten to: {}", path.display());
        }
        None => println!("{json}"),
    }
    Ok(())
}

fn print_rankings(rankings: &[StrategyRanking]) {
    eprintln!("\n=== Strategy Rankings ===");
    for (i, r) in rankings.iter().enumerate() {
        eprintln!(
            "  {}. {:<16} score {:>8.2}  {}/{} assets  avg profit {:.2}%  avg win {:.1}%  avg dd {:.1}%  {:?}",
            i + 1,
            r.strategy,
            r.final_score,
            r.valid_assets,
            r.total_assets,
            r.avg_profit,
            r.avg_win_rate * 100.0,
            r.avg_drawdown * 100.0,
            r.status,
        );
    }
}

fn print_report(report: &BatchReport, top: usize) {
    let (ok, failed) = report.run_counts();
    eprintln!(
        "Report {}: {} strategies x {} assets, {} runs ok, {} failed",
        report.timestamp.to_rfc3339(),
        report.strategies.len(),
        report.assets.len(),
        ok,
        failed,
    );
    print_rankings(&report.strategy_rankings);

    let combos = top_combinations(&report.detailed_results, top);
    if !combos.is_empty() {
        eprintln!("\n=== Top Combinations ===");
        for c in &combos {
            eprintln!(
                "  {} / {}: score {:.2}, profit {:.2}%, win {:.1}%, dd {:.1}%{}",
                c.strategy,
                c.symbol,
                c.score,
                c.profit_pct,
                c.win_rate * 100.0,
                c.max_drawdown * 100.0,
                if c.drawdown_acceptable() { "" } else { " (drawdown above limit)" },
            );
        }
    }
}

fn run_single(
    config_path: Option<&PathBuf>,
    strategy_name: &str,
    symbol: &str,
    output: Option<&PathBuf>,
) -> ExitCode {
    let config = match load_engine_config(config_path) {
        Ok(c) => c,
        Err(code) => return code,
    };
    let store = StrategyFileStore::new(config.strategies_dir.clone());
    let data = CsvAdapter::new(config.data_dir.clone());

    let strategy = match load_deployed(&store, &store, strategy_name) {
        Ok(s) => s,
        Err(e) => return fail(e),
    };
    eprintln!("Running {} on {} ({})", strategy_name, symbol, config.timeframe);

    let outcome = match executor(&config).execute(&strategy, &data, symbol) {
        Ok(o) => o,
        Err(e) => return fail(e),
    };

    let record = &outcome.record;
    eprintln!("\n=== Results ===");
    eprintln!("Capital:          {:.2} -> {:.2}", record.capital_start, record.capital_end);
    eprintln!("Profit:           {:.2}%", record.profit_pct);
    eprintln!("Trades:           {}", record.trade_count);
    eprintln!("Win Rate:         {:.1}%", record.win_rate * 100.0);
    eprintln!("Max Drawdown:     -{:.1}%", record.max_drawdown * 100.0);
    eprintln!("Profit Factor:    {:.2}", record.profit_factor);
    eprintln!("Sharpe Ratio:     {:.2}", record.sharpe_ratio);

    let written = match &outcome.backtest {
        Some(backtest) => write_json(backtest, output),
        None => write_json(record, output),
    };
    match written {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => fail(e),
    }
}

fn run_batch(
    config_path: Option<&PathBuf>,
    strategies: Vec<String>,
    symbols: Vec<String>,
) -> ExitCode {
    let config = match load_engine_config(config_path) {
        Ok(c) => c,
        Err(code) => return code,
    };
    let store = Arc::new(StrategyFileStore::new(config.strategies_dir.clone()));
    let runner = ProgressiveRunner::new(
        executor(&config),
        Arc::new(CsvAdapter::new(config.data_dir.clone())),
        Arc::new(JsonReportAdapter::new(config.reports_dir.clone())),
        store.clone(),
        store,
    );

    let (all_strategies, all_symbols) = match runner.discover() {
        Ok(found) => found,
        Err(e) => return fail(e),
    };
    let strategies = if strategies.is_empty() { all_strategies } else { strategies };
    let symbols = if symbols.is_empty() { all_symbols } else { symbols };
    if strategies.is_empty() || symbols.is_empty() {
        eprintln!("error: nothing to run ({} strategies, {} symbols)", strategies.len(), symbols.len());
        return ExitCode::from(5);
    }

    eprintln!(
        "Running {} strategies x {} symbols = {} backtests",
        strategies.len(),
        symbols.len(),
        strategies.len() * symbols.len()
    );
    match runner.run(&strategies, &symbols, &AtomicBool::new(false)) {
        Ok(Some(report)) => {
            print_report(&report, 10);
            eprintln!("\nReport written to: {}", config.full_report_path().display());
            ExitCode::SUCCESS
        }
        Ok(None) => {
            eprintln!("Batch cancelled");
            ExitCode::from(1)
        }
        Err(e) => fail(e),
    }
}

fn run_validate(
    config_path: Option<&PathBuf>,
    strategy_name: &str,
    old_path: Option<&PathBuf>,
    new_path: &PathBuf,
    symbols: Vec<String>,
    output: Option<&PathBuf>,
) -> ExitCode {
    let config = match load_engine_config(config_path) {
        Ok(c) => c,
        Err(code) => return code,
    };
    let store = Arc::new(StrategyFileStore::new(config.strategies_dir.clone()));
    let data = Arc::new(CsvAdapter::new(config.data_dir.clone()));

    let read = |path: &PathBuf| {
        fs::read_to_string(path).map_err(|e| {
            fail(QuantgateError::ConfigParse {
                file: path.display().to_string(),
                reason: e.to_string(),
            })
        })
    };
    let new_code = match read(new_path) {
        Ok(code) => code,
        Err(code) => return code,
    };
    let old_code = match old_path {
        Some(path) => match read(path) {
            Ok(code) => code,
            Err(code) => return code,
        },
        None => match store.snapshot(strategy_name) {
            Ok(Some(bytes)) => String::from_utf8_lossy(&bytes).into_owned(),
            Ok(None) => {
                eprintln!("error: {strategy_name} is not deployed; pass --old");
                return ExitCode::from(2);
            }
            Err(e) => return fail(e),
        },
    };
    let symbols = if symbols.is_empty() {
        match data.list_symbols() {
            Ok(s) => s,
            Err(e) => return fail(e),
        }
    } else {
        symbols
    };

    eprintln!(
        "Validating {}: {} symbols, {}, capital {}",
        strategy_name,
        symbols.len(),
        config.timeframe,
        config.initial_capital
    );
    let mut validator = Validator::new(data, store.clone(), store, config.validator_timeout)
        .with_normalizer(config.normalizer.clone());
    let request = ValidationRequest {
        strategy_name: strategy_name.to_string(),
        old_code,
        new_code,
        symbols,
        timeframe: config.timeframe.clone(),
        initial_capital: config.initial_capital,
    };
    let report = match validator.validate(&request) {
        Ok(r) => r,
        Err(e) => return fail(e),
    };

    let old = &report.old_metrics;
    let new = &report.new_metrics;
    eprintln!("\n=== Comparison (old -> new) ===");
    eprintln!("Win Rate:         {:.1}% -> {:.1}%", old.win_rate * 100.0, new.win_rate * 100.0);
    eprintln!("Profit:           {:.2}% -> {:.2}%", old.profit_pct, new.profit_pct);
    eprintln!("Drawdown:         {:.1}% -> {:.1}%", old.max_drawdown * 100.0, new.max_drawdown * 100.0);
    eprintln!("Trades:           {:.0} -> {:.0}", old.trade_count, new.trade_count);
    eprintln!("Score:            {:.1} -> {:.1}", old.approval_score, new.approval_score);
    eprintln!(
        "\n{} ({:+.2}%, {} runs)",
        if report.approved { "APPROVED" } else { "REJECTED" },
        report.improvement_pct,
        report.tests_run
    );

    match write_json(&report, output) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => fail(e),
    }
}

fn run_report(config_path: Option<&PathBuf>, top: usize) -> ExitCode {
    let config = match load_engine_config(config_path) {
        Ok(c) => c,
        Err(code) => return code,
    };
    let reports = JsonReportAdapter::new(config.reports_dir.clone());

    match reports.read_progress() {
        Ok(Some(p)) => eprintln!(
            "Progress: {:?} {}/{} ({}%){}",
            p.status,
            p.current,
            p.total,
            p.percentage,
            p.current_strategy
                .as_deref()
                .map(|s| format!(", strategy {s}"))
                .unwrap_or_default()
        ),
        Ok(None) => eprintln!("Progress: no batch has run"),
        Err(e) => return fail(e),
    }

    match reports.read_report() {
        Ok(Some(report)) => {
            print_report(&report, top);
            ExitCode::SUCCESS
        }
        Ok(None) => {
            eprintln!("No report at {}", config.full_report_path().display());
            ExitCode::from(1)
        }
        Err(e) => fail(e),
    }
}

fn run_list_strategies(config_path: Option<&PathBuf>) -> ExitCode {
    let config = match load_engine_config(config_path) {
        Ok(c) => c,
        Err(code) => return code,
    };
    let store = StrategyFileStore::new(config.strategies_dir.clone());
    let names = match store.list() {
        Ok(n) => n,
        Err(e) => return fail(e),
    };

    if names.is_empty() {
        eprintln!("No strategies in {}", config.strategies_dir.display());
        return ExitCode::SUCCESS;
    }
    for name in &names {
        match load_deployed(&store, &store, name) {
            Ok(_) => println!("{name}"),
            Err(e) => println!("{name}\t(invalid: {e})"),
        }
    }
    eprintln!("{} strategies found", names.len());
    ExitCode::SUCCESS
}

fn run_list_symbols(config_path: Option<&PathBuf>) -> ExitCode {
    let config = match load_engine_config(config_path) {
        Ok(c) => c,
        Err(code) => return code,
    };
    let symbols = match CsvAdapter::new(config.data_dir.clone()).list_symbols() {
        Ok(s) => s,
        Err(e) => return fail(e),
    };

    if symbols.is_empty() {
        eprintln!("No symbols found in {}", config.data_dir.display());
    } else {
        for symbol in &symbols {
            println!("{}", symbol);
        }
        eprintln!("{} symbols found", symbols.len());
    }
    ExitCode::SUCCESS
}
