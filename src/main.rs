use ai_score::{
    commands::{fine_tune, select_features, warm_start},
    config::{ModelConfig, PipelineSettings},
    context::AppContext,
    selection::{DEFAULT_CORRELATION_THRESHOLD, DEFAULT_TOP_N},
    universe::parse_symbol_list,
};
use anyhow::Result;
use clap::{Parser, Subcommand};
use log::info;

#[derive(Parser)]
#[command(name = "ai-score")]
#[command(about = "Fundamental and price based 1-10 scores from a warm-started boosted classifier")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Train the shared warm-start model over a broad universe
    WarmStart {
        /// Comma separated symbols (defaults to the built-in large-cap list)
        #[arg(long, value_delimiter = ',')]
        symbols: Option<Vec<String>>,
        /// Use cached datasets only
        #[arg(long)]
        skip_downloading: bool,
        /// Tickers fetched concurrently per chunk
        #[arg(long)]
        chunk_size: Option<usize>,
        /// Trees added per training call
        #[arg(long)]
        n_estimators: Option<usize>,
        /// Learning rate
        #[arg(long)]
        learning_rate: Option<f64>,
    },
    /// Fine-tune a copy of the warm-start model per ticker and publish scores
    FineTune {
        /// Comma separated symbols (defaults to the database universe)
        #[arg(long, value_delimiter = ',')]
        symbols: Option<Vec<String>>,
        /// Use cached datasets only
        #[arg(long)]
        skip_downloading: bool,
        /// Trees added per training call
        #[arg(long)]
        n_estimators: Option<usize>,
        /// Learning rate
        #[arg(long)]
        learning_rate: Option<f64>,
    },
    /// Rank one ticker's engineered features
    SelectFeatures {
        ticker: String,
        #[arg(long, value_enum, default_value_t = select_features::SelectionStrategy::Correlation)]
        strategy: select_features::SelectionStrategy,
        /// Number of features to keep
        #[arg(long, default_value_t = DEFAULT_TOP_N)]
        top_n: usize,
        /// Maximum absolute correlation between kept features
        #[arg(long, default_value_t = DEFAULT_CORRELATION_THRESHOLD)]
        threshold: f64,
        /// Use cached datasets only
        #[arg(long)]
        skip_downloading: bool,
    },
}

fn normalize_symbols(symbols: Option<Vec<String>>) -> Option<Vec<String>> {
    symbols
        .map(|symbols| parse_symbol_list(&symbols.join(",")))
        .filter(|symbols| !symbols.is_empty())
}

fn model_config(n_estimators: Option<usize>, learning_rate: Option<f64>) -> ModelConfig {
    let mut config = ModelConfig::default();
    if let Some(n_estimators) = n_estimators {
        config.boosting.n_estimators = n_estimators;
    }
    if let Some(learning_rate) = learning_rate {
        config.boosting.learning_rate = learning_rate;
    }
    config
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    dotenvy::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let settings = PipelineSettings::from_env()?;

    match cli.command {
        Commands::WarmStart {
            symbols,
            skip_downloading,
            chunk_size,
            n_estimators,
            learning_rate,
        } => {
            let app = AppContext::new(settings, model_config(n_estimators, learning_rate));
            warm_start::run(&app, normalize_symbols(symbols), skip_downloading, chunk_size).await?;
        }
        Commands::FineTune {
            symbols,
            skip_downloading,
            n_estimators,
            learning_rate,
        } => {
            let app = AppContext::new(settings, model_config(n_estimators, learning_rate));
            fine_tune::run(&app, normalize_symbols(symbols), skip_downloading).await?;
        }
        Commands::SelectFeatures {
            ticker,
            strategy,
            top_n,
            threshold,
            skip_downloading,
        } => {
            let app = AppContext::new(settings, ModelConfig::default());
            let ticker = ticker.trim().to_ascii_uppercase();
            let selected =
                select_features::run(&app, &ticker, strategy, top_n, threshold, skip_downloading)
                    .await?;
            info!("{}: selected {} features", ticker, selected.len());
        }
    }

    Ok(())
}
