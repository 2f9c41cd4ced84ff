//! quantsig CLI: train, retrain, predict, explain and version commands.
//!
//! Commands:
//! - `train`: walk-forward training over one or more symbols, stores a new version
//! - `retrain`: incremental retrain of the active version on recent bars
//! - `predict`: fused BUY/SELL/HOLD signal for one symbol
//! - `predict-batch`: signals for several symbols, failures reported per symbol
//! - `evaluate`: accuracy of the active version on a symbol's test tail
//! - `explain`: ranked feature importance of the active version
//! - `versions`: list stored model versions
//! - `config`: print the effective configuration as TOML
//!
//! Price history comes from CSV files under `--data-dir`, or from a seeded
//! random walk with `--synthetic <BARS>`. Logs go to stderr (`RUST_LOG`),
//! results to stdout as JSON.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tracing::{info, Level};
use tracing_subscriber::prelude::*;

use quantsig_core::domain::Bar;
use quantsig_runner::{
    CsvSource, EngineConfig, EngineContext, ExplainRequest, FsModelStore, Interval,
    PredictionRequest, PriceHistorySource, ResponseStatus, SyntheticSource, TrainingRequest,
};

#[derive(Parser)]
#[command(
    name = "quantsig",
    about = "quantsig: trading signal engine: walk-forward training, ensemble prediction"
)]
struct Cli {
    /// Engine configuration (TOML). Defaults apply when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Model store directory.
    #[arg(long, global = true, default_value = "models")]
    models: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Where bars come from.
#[derive(Args)]
struct DataArgs {
    /// Directory of `<SYMBOL>.csv` / `<SYMBOL>_<interval>.csv` files.
    #[arg(long, default_value = "data")]
    data_dir: PathBuf,

    /// Bar interval (1m, 5m, 15m, 1h, 1d, 1wk).
    #[arg(long, default_value = "1d")]
    interval: String,

    /// Generate this many random-walk bars per symbol instead of reading CSV.
    #[arg(long)]
    synthetic: Option<usize>,
}

#[derive(Subcommand)]
enum Commands {
    /// Train a new model version with walk-forward validation.
    Train {
        /// Symbols to train on (e.g., SPY QQQ AAPL).
        #[arg(required = true)]
        symbols: Vec<String>,

        /// Override `training.epochs`.
        #[arg(long)]
        epochs: Option<usize>,

        #[command(flatten)]
        data: DataArgs,
    },
    /// Incrementally retrain the active version on recent bars.
    Retrain {
        #[arg(required = true)]
        symbols: Vec<String>,

        #[command(flatten)]
        data: DataArgs,
    },
    /// Predict the next signal for a symbol.
    Predict {
        symbol: String,

        /// Model version to use. Defaults to the latest.
        #[arg(long)]
        version: Option<String>,

        #[command(flatten)]
        data: DataArgs,
    },
    /// Predict the next signal for several symbols.
    PredictBatch {
        #[arg(required = true)]
        symbols: Vec<String>,

        #[arg(long)]
        version: Option<String>,

        #[command(flatten)]
        data: DataArgs,
    },
    /// Accuracy of a model version on the trailing test range of a symbol.
    Evaluate {
        symbol: String,

        #[arg(long)]
        version: Option<String>,

        #[command(flatten)]
        data: DataArgs,
    },
    /// Rank features by importance in the active version.
    Explain {
        /// Number of features to show. Defaults to `serving.top_n`.
        #[arg(long)]
        top_n: Option<usize>,

        #[arg(long)]
        version: Option<String>,
    },
    /// List stored model versions, oldest first.
    Versions,
    /// Print the effective configuration.
    Config,
}

fn main() -> Result<()> {
    init_logging();
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => EngineConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => EngineConfig::default(),
    };

    match cli.command {
        Commands::Train {
            symbols,
            epochs,
            data,
        } => run_train(config, cli.models, symbols, epochs, &data),
        Commands::Retrain { symbols, data } => run_retrain(config, cli.models, symbols, &data),
        Commands::Predict {
            symbol,
            version,
            data,
        } => run_predict(config, cli.models, symbol, version, &data),
        Commands::PredictBatch {
            symbols,
            version,
            data,
        } => run_predict_batch(config, cli.models, symbols, version, &data),
        Commands::Evaluate {
            symbol,
            version,
            data,
        } => run_evaluate(config, cli.models, symbol, version, &data),
        Commands::Explain { top_n, version } => run_explain(config, cli.models, top_n, version),
        Commands::Versions => run_versions(config, cli.models),
        Commands::Config => {
            print!("{}", config.to_toml()?);
            Ok(())
        }
    }
}

fn init_logging() {
    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false);

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .with(stderr_layer)
        .init();
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn open_engine(config: EngineConfig, models: PathBuf) -> Result<EngineContext> {
    EngineContext::open(config, Box::new(FsModelStore::new(&models)))
        .with_context(|| format!("opening model store {}", models.display()))
}

/// Open the store and activate `version`, or keep the latest.
fn open_version(
    config: EngineConfig,
    models: PathBuf,
    version: Option<String>,
) -> Result<EngineContext> {
    let mut engine = open_engine(config, models)?;
    if let Some(tag) = version {
        engine
            .activate_version(&tag)
            .with_context(|| format!("activating version {tag}"))?;
    }
    Ok(engine)
}

fn load_symbols(
    data: &DataArgs,
    seed: u64,
    symbols: &[String],
) -> Result<Vec<(String, Vec<Bar>)>> {
    let interval: Interval = data.interval.parse()?;
    let source: Box<dyn PriceHistorySource> = match data.synthetic {
        Some(bars) => Box::new(SyntheticSource::new(seed, bars)),
        None => Box::new(CsvSource::new(&data.data_dir)),
    };

    symbols
        .iter()
        .map(|symbol| {
            let bars = source
                .fetch(symbol, interval)
                .with_context(|| format!("loading {symbol} ({interval})"))?;
            info!(symbol = %symbol, bars = bars.len(), "price history loaded");
            Ok((symbol.clone(), bars))
        })
        .collect()
}

fn run_train(
    config: EngineConfig,
    models: PathBuf,
    symbols: Vec<String>,
    epochs: Option<usize>,
    data: &DataArgs,
) -> Result<()> {
    let symbols = load_symbols(data, config.training.seed, &symbols)?;
    let mut engine = open_engine(config, models)?;

    let response = engine.train(&TrainingRequest { symbols, epochs }, None);
    print_json(&response)?;
    if response.status == ResponseStatus::Error {
        bail!(
            "training failed: {}",
            response.error.as_deref().unwrap_or("unknown error")
        );
    }
    Ok(())
}

fn run_retrain(
    config: EngineConfig,
    models: PathBuf,
    symbols: Vec<String>,
    data: &DataArgs,
) -> Result<()> {
    let symbols = load_symbols(data, config.training.seed, &symbols)?;
    let mut engine = open_engine(config, models)?;
    if engine.active_version().is_none() {
        bail!("no stored model version to retrain; run `quantsig train` first");
    }

    let response = engine.retrain(&symbols, None);
    print_json(&response)?;
    if response.status == ResponseStatus::Error {
        bail!(
            "retrain failed: {}",
            response.error.as_deref().unwrap_or("unknown error")
        );
    }
    Ok(())
}

fn run_predict(
    config: EngineConfig,
    models: PathBuf,
    symbol: String,
    version: Option<String>,
    data: &DataArgs,
) -> Result<()> {
    let mut symbols = load_symbols(data, config.training.seed, std::slice::from_ref(&symbol))?;
    let engine = open_version(config, models, version)?;

    let (symbol, bars) = symbols.remove(0);
    let response = engine.predict(&PredictionRequest {
        symbol,
        bars,
        features: None,
    })?;
    print_json(&response)
}

fn run_predict_batch(
    config: EngineConfig,
    models: PathBuf,
    symbols: Vec<String>,
    version: Option<String>,
    data: &DataArgs,
) -> Result<()> {
    let symbols = load_symbols(data, config.training.seed, &symbols)?;
    let engine = open_version(config, models, version)?;
    let requests: Vec<PredictionRequest> = symbols
        .into_iter()
        .map(|(symbol, bars)| PredictionRequest {
            symbol,
            bars,
            features: None,
        })
        .collect();
    print_json(&engine.predict_batch(&requests))
}

fn run_evaluate(
    config: EngineConfig,
    models: PathBuf,
    symbol: String,
    version: Option<String>,
    data: &DataArgs,
) -> Result<()> {
    let mut symbols = load_symbols(data, config.training.seed, std::slice::from_ref(&symbol))?;
    let engine = open_version(config, models, version)?;
    let (symbol, bars) = symbols.remove(0);
    let evaluation = engine.evaluate(&symbol, &bars)?;
    print_json(&evaluation)
}

fn run_explain(
    config: EngineConfig,
    models: PathBuf,
    top_n: Option<usize>,
    version: Option<String>,
) -> Result<()> {
    let engine = open_version(config, models, version)?;
    let explanation = engine.explain(&ExplainRequest {
        features: None,
        top_n,
    })?;
    print_json(&explanation)
}

fn run_versions(config: EngineConfig, models: PathBuf) -> Result<()> {
    let engine = EngineContext::new(config, Box::new(FsModelStore::new(&models)))?;
    let versions = engine.list_versions()?;
    if versions.is_empty() {
        println!("No model versions in {}", models.display());
        return Ok(());
    }
    let latest = versions.len() - 1;
    for (i, tag) in versions.iter().enumerate() {
        let marker = if i == latest { " (latest)" } else { "" };
        println!("{tag}{marker}");
    }
    Ok(())
}
