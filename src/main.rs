use alpha_engine::{
    commands::{
        backtest::{self, BacktestOverrides, BacktestRequest},
        download_data::{self, DownloadOptions, DEFAULT_INDEX_SYMBOL, DEFAULT_YEARS_OF_HISTORY},
        export_market_data, list_factors,
        market_data_snapshot::ensure_market_data_file,
        setup_database,
    },
    context::{AppContext, MarketDataFilters},
    factors::FactorOptions,
    rebalance::RebalanceFrequency,
};
use anyhow::{anyhow, Result};
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use log::info;
use std::env;
use std::path::PathBuf;

const DEFAULT_MARKET_DATA_FILE: &str = "data/market-data.bin";

#[derive(Parser)]
#[command(name = "alpha-engine")]
#[command(about = "Cross-sectional factor research and long/short backtesting")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the securities, daily price and index tables
    SetupDatabase,
    /// Download index constituents, daily prices and index levels into the database
    DownloadData {
        /// Years of history to fetch
        #[arg(long, default_value_t = DEFAULT_YEARS_OF_HISTORY)]
        years: u32,
        /// Fetch only the first N constituents
        #[arg(long)]
        limit: Option<usize>,
        /// Index symbol stored alongside the constituents
        #[arg(long = "index", default_value = DEFAULT_INDEX_SYMBOL)]
        index_symbol: String,
    },
    /// Export adjusted closes from the database into a snapshot file
    ExportMarketData {
        /// Destination file for the snapshot
        #[arg(short, long = "output", value_name = "PATH")]
        output: Option<PathBuf>,
        #[arg(long)]
        start_date: Option<NaiveDate>,
        #[arg(long)]
        end_date: Option<NaiveDate>,
    },
    /// List the available factors with their default parameters
    ListFactors,
    /// Run a long/short backtest for one factor
    Backtest(BacktestArgs),
}

#[derive(Args)]
struct BacktestArgs {
    /// Factor to rank by (see `list-factors`)
    #[arg(long, default_value = "momentum")]
    factor: String,
    /// Read prices from a snapshot file instead of the database
    #[arg(long = "data-file", value_name = "PATH")]
    data_file: Option<PathBuf>,
    #[arg(long)]
    lookback_days: Option<usize>,
    #[arg(long)]
    skip_days: Option<usize>,
    /// zscore, rank or demean
    #[arg(long)]
    normalize: Option<String>,
    /// Disable outlier clipping before normalization
    #[arg(long)]
    no_winsorize: bool,
    /// daily, weekly, monthly or quarterly
    #[arg(long)]
    frequency: Option<RebalanceFrequency>,
    #[arg(long)]
    long_pct: Option<f64>,
    #[arg(long)]
    short_pct: Option<f64>,
    #[arg(long)]
    commission: Option<f64>,
    #[arg(long)]
    capital: Option<f64>,
    #[arg(long)]
    start_date: Option<NaiveDate>,
    #[arg(long)]
    end_date: Option<NaiveDate>,
    /// Write a JSON report of the run to this file
    #[arg(long, value_name = "PATH")]
    report: Option<PathBuf>,
}

impl BacktestArgs {
    fn into_request(self) -> BacktestRequest {
        BacktestRequest {
            factor: self.factor,
            factor_options: FactorOptions {
                lookback_days: self.lookback_days,
                skip_days: self.skip_days,
                normalize_method: self.normalize,
                winsorize: self.no_winsorize.then_some(false),
                winsorize_limits: None,
            },
            overrides: BacktestOverrides {
                rebalance_frequency: self.frequency,
                long_pct: self.long_pct,
                short_pct: self.short_pct,
                commission_pct: self.commission,
                initial_capital: self.capital,
                start_date: self.start_date,
                end_date: self.end_date,
            },
            data_file: self.data_file,
            report_path: self.report,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let Cli { command } = cli;

    let database_url = env::var("DATABASE_URL").ok();
    if database_url.is_none() && command_requires_database(&command) {
        return Err(anyhow!(
            "DATABASE_URL must be set for this command. For offline backtests, pass --data-file with a market data snapshot."
        ));
    }
    let app_context = AppContext::new(database_url);
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    info!("Starting alpha-engine. Research tool only, not investment advice.");

    match command {
        Commands::SetupDatabase => {
            setup_database::run(&app_context).await?;
        }
        Commands::DownloadData {
            years,
            limit,
            index_symbol,
        } => {
            let options = DownloadOptions {
                years,
                limit,
                index_symbol,
            };
            download_data::run(&app_context, &options).await?;
        }
        Commands::ExportMarketData {
            output,
            start_date,
            end_date,
        } => {
            let output_path = resolve_market_data_path(output);
            let filters = MarketDataFilters {
                start_date,
                end_date,
            };
            export_market_data::run(&app_context, &output_path, filters).await?;
        }
        Commands::ListFactors => {
            list_factors::run()?;
        }
        Commands::Backtest(args) => {
            if let Some(path) = &args.data_file {
                ensure_market_data_file(path).await?;
            }
            backtest::run(&app_context, &args.into_request()).await?;
        }
    }

    Ok(())
}

fn resolve_market_data_path(cli_value: Option<PathBuf>) -> PathBuf {
    if let Some(path) = cli_value {
        return path;
    }

    PathBuf::from(DEFAULT_MARKET_DATA_FILE)
}

fn command_requires_database(command: &Commands) -> bool {
    match command {
        Commands::Backtest(args) => args.data_file.is_none(),
        Commands::ListFactors => false,
        Commands::SetupDatabase
        | Commands::DownloadData { .. }
        | Commands::ExportMarketData { .. } => true,
    }
}
