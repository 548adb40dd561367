//! Pitchlab CLI
//!
//! Command-line interface for offline rendering with the Pitchlab engine.

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use pitchlab::cli::{commands, Cli, Commands};

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // RUST_LOG wins over the -v default
    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    info!("Pitchlab v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Commands::Render {
            input,
            output,
            settings,
            config,
            overrides,
        } => {
            commands::render(
                &input,
                &output,
                settings.as_deref(),
                config.as_deref(),
                &overrides,
            )
            .with_context(|| format!("failed to render {}", input.display()))?;
        }
        Commands::Info { input } => {
            commands::info(&input).with_context(|| format!("failed to read {}", input.display()))?;
        }
    }

    Ok(())
}
