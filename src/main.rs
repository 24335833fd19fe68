mod cli;
mod commands;
mod config;
mod error;
mod indexing;
mod model;
mod providers;
mod rag;
mod semantic;
mod server;
mod util;

use anyhow::Result;
use clap::Parser;
use tracing::error;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Commands};
use crate::config::AppConfig;

#[tokio::main]
async fn main() {
    init_tracing();

    if let Err(err) = run().await {
        error!(error = %err, "command failed");
        for cause in err.chain().skip(1) {
            error!(cause = %cause, "caused by");
        }
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    let mut config = AppConfig::load(cli.config.as_deref())?;
    cli.apply_overrides(&mut config);
    config.validate()?;

    match cli.command {
        Commands::Ask(args) => commands::ask::run(&config, args).await,
        Commands::Serve(_) => commands::serve::run(&config).await,
        Commands::Upload(args) => commands::upload::run(&config, args).await,
        Commands::Clear(args) => commands::clear::run(&config, args).await,
        Commands::Status(args) => commands::status::run(&config, args).await,
    }
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
