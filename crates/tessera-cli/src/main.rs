//! Tessera command-line tool

use clap::Parser;
use std::path::PathBuf;
use tessera_cli::{execute, CliConfig, Command};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "tessera")]
#[command(about = "Inspect content-defined chunking, structural sharing and diffs")]
#[command(version)]
struct Args {
    /// Configuration file (defaults to ./tessera.toml when present)
    #[arg(short, long, global = true, env = "TESSERA_CONFIG")]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true, env = "TESSERA_DEBUG")]
    debug: bool,

    /// Print JSON instead of text
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let args = Args::parse();

    // Logs go to stderr so reports stay pipeable
    let log_level = if args.debug { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("tessera={}", log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = CliConfig::load(args.config.as_deref())?;
    tracing::debug!(?config, "loaded configuration");

    let output = execute(&args.command, &config, args.json || config.json).await?;
    println!("{output}");

    Ok(())
}
