//! Headless driver for the swipeduel client services.
//!
//! Loads configuration the same way the client does, then walks the supply
//! queue or inspects the auxiliary caches against a live backend.

mod commands;

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use swipeduel_core::{ClientConfig, ConfigSource};
use swipeduel_model::Gender;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "swipeduelctl")]
#[command(about = "Drive the swipeduel image supply queue and caches")]
struct Cli {
    /// Config file (TOML or JSON). Overrides $SWIPEDUEL_CONFIG_PATH.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// API root URL (overrides config)
    #[arg(long, global = true, env = "SWIPEDUEL_SERVER_URL")]
    server: Option<String>,

    /// Bearer token for authenticated endpoints
    #[arg(long, global = true, env = "SWIPEDUEL_TOKEN", hide_env_values = true)]
    token: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Initialize the queue and walk through image pairs
    Swipe {
        /// Gender filter for the fetched blocks (male or female)
        #[arg(long)]
        gender: Gender,

        /// Number of pairs to walk
        #[arg(long, default_value_t = 10)]
        pairs: usize,

        /// Submit a vote for the left image of every pair
        #[arg(long)]
        vote: bool,
    },
    /// Refresh expired caches and print their status
    Status {
        /// Only report; skip the refresh
        #[arg(long)]
        no_refresh: bool,
    },
    /// Remove the persisted queue snapshot and drop cached data
    Clear,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env_file_loaded = dotenvy::dotenv().map(|_| true).or_else(|err| match err {
        dotenvy::Error::Io(_) => Ok(false),
        other => Err(other),
    })?;

    let cli = Cli::parse();
    init_tracing();
    if env_file_loaded {
        info!("loaded .env file");
    }

    let (config, source) = load_config(&cli)?;
    match &source {
        ConfigSource::Default => info!("using default client config"),
        ConfigSource::EnvInline => {
            info!("client config loaded from inline environment json")
        }
        ConfigSource::EnvPath(path) | ConfigSource::File(path) => {
            info!(path = %path.display(), "client config loaded from file")
        }
    }

    match cli.command {
        Command::Swipe {
            gender,
            pairs,
            vote,
        } => commands::swipe(&config, gender, pairs, vote).await,
        Command::Status { no_refresh } => {
            commands::status(&config, !no_refresh).await
        }
        Command::Clear => commands::clear(&config).await,
    }
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,swipeduel_core=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn load_config(cli: &Cli) -> anyhow::Result<(ClientConfig, ConfigSource)> {
    let (config, source) = match &cli.config {
        Some(path) => {
            let config = ClientConfig::load_from_file(path)?;
            (config, ConfigSource::File(path.clone()))
        }
        None => ClientConfig::load_from_env()?,
    };

    let config = config.with_overrides(cli.server.clone(), cli.token.clone());
    config.validate().context("invalid client config")?;
    Ok((config, source))
}
