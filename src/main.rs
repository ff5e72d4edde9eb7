//! Canopy - typed, reactive cache over a hierarchical store
//!
//! CLI entry point that dispatches to subcommands.

use canopy::cli::{Cli, Commands};
use canopy::config::{Config, ConfigManager, LogFormat};
use canopy::error::CanopyResult;
use clap::Parser;
use console::style;
use std::process::ExitCode;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", style("Error:").red().bold(), e);
            if let Some(hint) = e.hint() {
                eprintln!("{} {}", style("Hint:").yellow(), hint);
            }
            ExitCode::FAILURE
        }
    }
}

async fn run() -> CanopyResult<()> {
    let cli = Cli::parse();

    let config_manager = ConfigManager::from_override(cli.config.clone());
    let config = config_manager.load().await?;

    init_logging(cli.verbose, &config);
    debug!("Using config at {}", config_manager.path().display());

    match cli.command {
        Commands::Demo(args) => canopy::cli::commands::demo(args, &config).await,
        Commands::Config(args) => {
            canopy::cli::commands::config(args, &config, &config_manager).await
        }
    }
}

/// 0 = warn, 1 = info, 2+ = debug; `general.verbose` counts as one level
fn init_logging(verbose: u8, config: &Config) {
    let level = verbose.max(u8::from(config.general.verbose));
    let filter = match level {
        0 => EnvFilter::new("canopy=warn"),
        1 => EnvFilter::new("canopy=info"),
        _ => EnvFilter::new("canopy=debug"),
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);

    if config.general.log_format == LogFormat::Json {
        builder.json().init();
    } else {
        builder.without_time().init();
    }
}
