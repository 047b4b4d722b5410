//! CLI argument parsing and command dispatch.

pub mod args;
pub mod commands;

use anyhow::{Context as _, Result};
use args::{Cli, Commands};
use clap::Parser;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use v2x_trust::TestbedConfig;

/// Run the CLI application.
pub async fn run() -> Result<()> {
    let cli = Cli::parse();

    init_logging(&cli.log_level);

    let config = TestbedConfig::load(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;

    let ctx = commands::Context {
        config,
        output: cli.output,
    };

    match cli.command {
        Commands::Query(args) => commands::query::execute(ctx, args).await,
        Commands::Respond(args) => commands::respond::execute(ctx, args).await,
        Commands::Pki(args) => commands::pki::execute(ctx, args),
        Commands::Filter(args) => commands::filter::execute(ctx, args),
    }
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false).with_writer(std::io::stderr))
        .init();
}
