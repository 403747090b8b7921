//! Gleaner CLI - batch text extraction from question images.

use clap::Parser;
use gleaner_cli::commands;
use gleaner_cli::{Cli, Command, Config, Formatter};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Logs go to stderr; RUST_LOG overrides -v
    let level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "warn,gleaner={level},gleaner_cli={level},gleaner_dispatch={level},gleaner_provider={level}"
        ))
    });
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .with_target(false)
        .init();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> gleaner_cli::Result<()> {
    let config_path = match &cli.config {
        Some(path) => path.clone(),
        None => Config::path()?,
    };
    let config = Config::load_from(&config_path)?;

    // Determine output format
    let format = cli
        .format
        .map(Into::into)
        .unwrap_or(config.settings.format);
    let color_enabled = !cli.no_color && config.settings.color;
    let formatter = Formatter::new(format, color_enabled);

    // Ctrl+C stops new dispatches; in-flight requests finish
    let cancel = CancellationToken::new();
    let signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Shutdown signal received, finishing in-flight requests");
            signal.cancel();
        }
    });

    match cli.command {
        Command::Extract(args) => {
            commands::execute_extract(args, &config, &formatter, cancel).await?;
        }
        Command::Reconcile(args) => {
            commands::execute_reconcile(args, &config, &formatter, cancel).await?;
        }
        Command::Join(args) => {
            commands::execute_join(args, &formatter)?;
        }
        Command::Config(args) => {
            commands::execute_config(args, &config, &config_path, &formatter)?;
        }
    }

    Ok(())
}
