// src/main.rs

use anyhow::{Context, Result};
use clap::Parser;
use romforge::{CancelToken, ForgeConfig, PackageMode};
use std::io::IsTerminal;
use tracing::{debug, warn};

mod cli;
mod commands;

use cli::{Cli, Commands};

fn main() -> Result<()> {
    let cli = Cli::parse();

    // RUST_LOG wins; otherwise --verbose selects debug
    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = ForgeConfig::discover(cli.config.as_deref()).context("Failed to load configuration")?;
    let cancel = CancelToken::new();
    let show_progress = !cli.no_progress && !cli.verbose && std::io::stderr().is_terminal();

    match cli.command {
        Commands::Super { input, output } => {
            listen_for_interrupt(cancel.clone());
            commands::cmd_convert(&config, PackageMode::Super, &input, &output, cancel, show_progress)
        }
        Commands::Hybrid { input, output } => {
            listen_for_interrupt(cancel.clone());
            commands::cmd_convert(&config, PackageMode::Hybrid, &input, &output, cancel, show_progress)
        }
        Commands::Recovery { input, output } => {
            listen_for_interrupt(cancel.clone());
            commands::cmd_convert(&config, PackageMode::Recovery, &input, &output, cancel, show_progress)
        }
        Commands::Detect { bundle } => {
            listen_for_interrupt(cancel.clone());
            commands::cmd_detect(&config, &bundle, &cancel)
        }
        Commands::Info { input } => commands::cmd_info(&input),
        Commands::Tools => commands::cmd_tools(&config),
    }
}

/// Cancel `cancel` on Ctrl-C so the running job can remove its working directory
fn listen_for_interrupt(cancel: CancelToken) {
    std::thread::spawn(move || {
        let rt = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
            Ok(rt) => rt,
            Err(e) => {
                debug!("Interrupt listener unavailable: {}", e);
                return;
            }
        };
        rt.block_on(async {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupt received, cancelling");
                cancel.cancel();
            }
        });
    });
}
