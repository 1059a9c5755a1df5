use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

pub mod chat;
pub mod query;

use crate::core::AppConfig;

#[derive(Subcommand)]
enum Command {
    /// Start an interactive chat session
    Chat {},
    /// Query the retrieval index and print the best-matching document
    Query {
        #[arg(long)]
        term: String,
    },
}

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

pub async fn run() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("{}=info", env!("CARGO_CRATE_NAME")).into()),
        )
        .init();

    let args = Cli::parse();

    // Configuration and corpus problems are fatal before any input is
    // accepted.
    let config = AppConfig::from_env().context("Configuration failed")?;

    // Chat is the default when no subcommand is given
    match args.command {
        Some(Command::Query { term }) => {
            query::run(term, &config).await?;
        }
        Some(Command::Chat {}) | None => {
            chat::run(&config).await?;
        }
    }

    Ok(())
}
