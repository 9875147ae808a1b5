use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use ivspread_alpaca::AlpacaClient;
use ivspread_backtest::{
    write_rows_csv, write_samples_csv, BacktestEngine, HistoricalIvProvider, SummaryFormatter,
    SyntheticConfig, SyntheticIvGenerator,
};
use ivspread_core::{AppConfig, ConfigLoader, IvSample, SignalRecord};
use ivspread_signals::{IvSampleAggregator, LiveSignalAdapter};
use ivspread_trader::{LiveTrader, PaperBroker, SimulatedMarket, SimulatedMarketConfig};
use rust_decimal::Decimal;

#[derive(Parser)]
#[command(name = "ivspread")]
#[command(about = "25-delta IV skew spread signals, backtests and live trading", long_about = None)]
struct Cli {
    /// Config file path
    #[arg(short, long, global = true, default_value = "config/Config.toml")]
    config: String,

    /// Profile overlay (loads Config.{profile}.toml beside --config on top)
    #[arg(long, global = true, env = "IVSPREAD_PROFILE")]
    profile: Option<String>,

    /// Optional log file path (appends instead of logging to stderr)
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a backtest over historical or synthetic IV samples
    Backtest {
        /// Historical samples CSV (timestamp, call_iv, put_iv, call_delta, put_delta, underlying_price)
        #[arg(short, long, conflicts_with = "synthetic")]
        data: Option<PathBuf>,
        /// Use generated samples instead of a CSV
        #[arg(long)]
        synthetic: bool,
        /// Rows to generate with --synthetic
        #[arg(long, default_value_t = 500)]
        rows: usize,
        /// RNG seed for --synthetic
        #[arg(long, default_value_t = 42)]
        seed: u64,
        /// Write the full row table to this CSV
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Write synthetic IV samples to a CSV
    GenerateData {
        #[arg(long, default_value_t = 500)]
        rows: usize,
        #[arg(long, default_value_t = 42)]
        seed: u64,
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Print the signal for the most recent sample in a CSV
    Signal {
        #[arg(short, long)]
        data: PathBuf,
    },
    /// Run the live polling loop
    Live {
        /// Simulated market and in-memory broker instead of Alpaca
        #[arg(long)]
        paper: bool,
        /// Starting cash for --paper
        #[arg(long, default_value = "100000")]
        paper_cash: Decimal,
        /// Override the configured symbol
        #[arg(long)]
        symbol: Option<String>,
        /// Stop after this many cycles (runs until interrupted otherwise)
        #[arg(long)]
        max_cycles: Option<u64>,
    },
    /// Print the effective configuration with secrets redacted
    ShowConfig,
}

fn init_logging(log_file: Option<&Path>) -> anyhow::Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    match log_file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(std::sync::Mutex::new(file))
                .init();
        }
        None => {
            tracing_subscriber::fmt().with_env_filter(filter).init();
        }
    }
    Ok(())
}

fn load_config(path: &str, profile: Option<&str>) -> anyhow::Result<AppConfig> {
    match profile {
        Some(profile) => ConfigLoader::load_with_profile(path, profile),
        None => ConfigLoader::load_from(path),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_file.as_deref())?;

    let config = load_config(&cli.config, cli.profile.as_deref())?;

    match cli.command {
        Commands::Backtest {
            data,
            synthetic,
            rows,
            seed,
            output,
        } => {
            let samples = if synthetic {
                synthetic_samples(rows, seed)
            } else {
                let path = data.context("Pass --data <CSV> or --synthetic")?;
                HistoricalIvProvider::from_csv(&path)?.into_samples()
            };
            run_backtest(&config, &samples, output.as_deref())?;
        }
        Commands::GenerateData { rows, seed, output } => {
            let samples = synthetic_samples(rows, seed);
            write_samples_csv(&output, &samples)?;
            tracing::info!(rows = samples.len(), path = %output.display(), "Synthetic samples written");
        }
        Commands::Signal { data } => {
            let samples = HistoricalIvProvider::from_csv(&data)?.into_samples();
            let record = latest_signal(&config, &samples)?;
            println!("{}", serde_json::to_string_pretty(&record)?);
        }
        Commands::Live {
            paper,
            paper_cash,
            symbol,
            max_cycles,
        } => {
            let mut config = config;
            if let Some(symbol) = symbol {
                config.trading.symbol = symbol;
            }
            run_live(&config, paper, paper_cash, max_cycles).await?;
        }
        Commands::ShowConfig => {
            println!("{}", serde_json::to_string_pretty(&redacted(config))?);
        }
    }

    Ok(())
}

fn synthetic_samples(rows: usize, seed: u64) -> Vec<IvSample> {
    let config = SyntheticConfig::default().with_rows(rows).with_seed(seed);
    SyntheticIvGenerator::new(config).generate()
}

fn run_backtest(
    config: &AppConfig,
    samples: &[IvSample],
    output: Option<&Path>,
) -> anyhow::Result<()> {
    tracing::info!(samples = samples.len(), "Running backtest");

    let report = BacktestEngine::new(config.strategy.clone()).run(samples)?;
    println!("{}", SummaryFormatter::format(&report));

    if let Some(path) = output {
        write_rows_csv(path, &report.rows)?;
        tracing::info!(rows = report.rows.len(), path = %path.display(), "Row table written");
    }
    Ok(())
}

/// Replays the samples through the live adapter and returns its last record.
fn latest_signal(config: &AppConfig, samples: &[IvSample]) -> anyhow::Result<SignalRecord> {
    let seeds = IvSampleAggregator::new(&config.strategy).aggregate(samples)?;
    let mut adapter = LiveSignalAdapter::new(config.strategy.clone());
    let mut record = SignalRecord::insufficient(None, 0.0);
    for seed in seeds {
        record = adapter.on_sample(Some(seed));
    }
    Ok(record)
}

async fn run_live(
    config: &AppConfig,
    paper: bool,
    paper_cash: Decimal,
    max_cycles: Option<u64>,
) -> anyhow::Result<()> {
    let mut trader = if paper {
        tracing::info!(symbol = %config.trading.symbol, cash = %paper_cash, "Paper mode");
        let market = Arc::new(SimulatedMarket::new(
            SimulatedMarketConfig::default()
                .with_symbol(config.trading.symbol.clone())
                .with_start_price(config.fallback.price)
                .with_seed(config.fallback.seed),
        ));
        let broker = Arc::new(PaperBroker::new(paper_cash).with_price_source(market.clone()));
        LiveTrader::new(config, market.clone(), market, broker)?
    } else {
        let client = Arc::new(AlpacaClient::from_config(&config.alpaca)?);
        tracing::info!(
            symbol = %config.trading.symbol,
            trading_url = client.trading_url(),
            "Connected to Alpaca"
        );
        LiveTrader::new(config, client.clone(), client.clone(), client)?
    };

    tokio::select! {
        () = trader.run(max_cycles) => {}
        result = tokio::signal::ctrl_c() => {
            result.context("Failed to listen for Ctrl+C")?;
            tracing::info!("Received Ctrl+C, stopping live trader");
        }
    }
    Ok(())
}

fn redacted(mut config: AppConfig) -> AppConfig {
    const MASK: &str = "********";
    if config.alpaca.api_key.is_some() {
        config.alpaca.api_key = Some(MASK.to_string());
    }
    if config.alpaca.secret_key.is_some() {
        config.alpaca.secret_key = Some(MASK.to_string());
    }
    config
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_backtest() {
        let cli = Cli::try_parse_from(["ivspread", "backtest", "--synthetic", "--rows", "250"]).unwrap();
        match cli.command {
            Commands::Backtest { synthetic, rows, .. } => {
                assert!(synthetic);
                assert_eq!(rows, 250);
            }
            _ => panic!("expected backtest"),
        }
        assert_eq!(cli.config, "config/Config.toml");
    }

    #[test]
    fn test_data_and_synthetic_conflict() {
        assert!(Cli::try_parse_from([
            "ivspread",
            "backtest",
            "--synthetic",
            "--data",
            "samples.csv"
        ])
        .is_err());
    }

    #[test]
    fn test_live_flags() {
        let cli = Cli::try_parse_from([
            "ivspread",
            "live",
            "--paper",
            "--max-cycles",
            "3",
            "--log-file",
            "trading.log",
        ])
        .unwrap();
        assert_eq!(cli.log_file, Some(PathBuf::from("trading.log")));
        match cli.command {
            Commands::Live {
                paper,
                paper_cash,
                max_cycles,
                ..
            } => {
                assert!(paper);
                assert_eq!(paper_cash, Decimal::from(100_000));
                assert_eq!(max_cycles, Some(3));
            }
            _ => panic!("expected live"),
        }
    }

    #[test]
    fn test_redaction_hides_keys() {
        let mut config = AppConfig::default();
        config.alpaca.api_key = Some("real-key".to_string());
        let shown = serde_json::to_string(&redacted(config)).unwrap();
        assert!(!shown.contains("real-key"));
        assert!(shown.contains("********"));
    }

    #[test]
    fn test_latest_signal_on_short_history_is_insufficient() {
        let config = AppConfig::default();
        let record = latest_signal(&config, &synthetic_samples(10, 7)).unwrap();
        assert_eq!(record.reason, SignalRecord::REASON_INSUFFICIENT);
        assert_eq!(record.signal, 0);
    }
}
