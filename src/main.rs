// Tabport - Parallel table export and import with checksum verification
// Copyright (c) 2025 Tabport Contributors
// Licensed under the MIT License

use clap::Parser;
use std::process;
use tabport::cli::commands::{exit_code, resolve_config};
use tabport::cli::{Cli, Commands};
use tabport::config::{LoggingConfig, TabportConfig};
use tabport::logging::{init_logging, LoggingGuard};
use tokio::sync::watch;

#[tokio::main]
async fn main() {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(wait_for_shutdown(shutdown_tx));

    let exit_code = match execute_command(&cli, shutdown_rx).await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!(error = %e, "Command execution failed");
            eprintln!("Error: {e}");
            exit_code::FATAL
        }
    };

    process::exit(exit_code);
}

/// Execute the CLI command
async fn execute_command(cli: &Cli, shutdown_signal: watch::Receiver<bool>) -> anyhow::Result<i32> {
    if let Commands::ValidateConfig(args) = &cli.command {
        let level = cli.log_level.as_deref().unwrap_or("info");
        let _guard = start_logging(level, &LoggingConfig::default())?;
        return args.execute(&cli.config).await;
    }

    let resolved = resolve_config(&cli.config, |config| match &cli.command {
        Commands::Export(args) => args.apply_overrides(config),
        Commands::Import(args) => args.apply_overrides(config),
        Commands::ValidateConfig(_) => Ok(()),
    });
    let config: TabportConfig = match resolved {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e}");
            return Ok(exit_code::CONFIGURATION);
        }
    };

    let level = match (&cli.log_level, cli.command.verbose()) {
        (Some(level), _) => level.clone(),
        (None, true) => "debug".to_string(),
        (None, false) => config.application.log_level.clone(),
    };
    let _guard = start_logging(&level, &config.logging)?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        "Tabport - parallel table export and import"
    );

    match &cli.command {
        Commands::Export(args) => args.execute(config, shutdown_signal).await,
        Commands::Import(args) => args.execute(config, shutdown_signal).await,
        Commands::ValidateConfig(_) => Ok(exit_code::SUCCESS),
    }
}

fn start_logging(level: &str, config: &LoggingConfig) -> anyhow::Result<LoggingGuard> {
    init_logging(level, config).map_err(|e| anyhow::anyhow!("Failed to initialize logging: {e}"))
}

/// Flip the shutdown flag on SIGINT or SIGTERM
async fn wait_for_shutdown(shutdown_tx: watch::Sender<bool>) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {
                        tracing::info!("Received SIGINT (Ctrl+C), initiating graceful shutdown...");
                    }
                    _ = sigterm.recv() => {
                        tracing::info!("Received SIGTERM, initiating graceful shutdown...");
                    }
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to install SIGTERM handler");
                if let Err(e) = tokio::signal::ctrl_c().await {
                    tracing::error!(error = %e, "Failed to listen for Ctrl+C");
                    return;
                }
                tracing::info!("Received SIGINT (Ctrl+C), initiating graceful shutdown...");
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            return;
        }
        tracing::info!("Received SIGINT (Ctrl+C), initiating graceful shutdown...");
    }

    eprintln!("\nShutdown signal received, finishing in-flight batches...");
    let _ = shutdown_tx.send(true);
}
