//! Archiver - Main entry point

use anyhow::{Context, Result};
use archiver_common::logging::{init_logging, LogConfig, LogLevel};
use archiver_service::{config::Config, service::Archiver, ServiceError};
use clap::Parser;
use std::process::ExitCode;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Archive subscription messages into a storage bucket
#[derive(Parser, Debug)]
#[command(name = "archiver")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Run the connectivity check and exit
    #[arg(long)]
    check: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // `.env` feeds the LOG_* overrides below as well as the service config
    dotenvy::dotenv().ok();

    let log_config = LogConfig::builder()
        .level(if cli.verbose { LogLevel::Debug } else { LogLevel::Info })
        .log_file_prefix("archiver")
        .filter_directives(if cli.verbose {
            "archiver_service=debug,archiver_common=debug,aws_config=info"
        } else {
            "archiver_service=info,archiver_common=info,aws_config=warn,aws_smithy_runtime=warn"
        })
        .build();

    // Environment variables take precedence
    let log_config = match log_config.merge_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", ServiceError::Logging(e));
            return ExitCode::FAILURE;
        }
    };

    let _guard = match init_logging(&log_config) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Error: {}", ServiceError::Logging(e));
            return ExitCode::FAILURE;
        }
    };

    match execute(&cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %format!("{:#}", e), "Archiver failed");
            eprintln!("Error: {:#}", e);
            let code = e
                .downcast_ref::<ServiceError>()
                .map(ServiceError::exit_code)
                .unwrap_or(1);
            ExitCode::from(code)
        }
    }
}

async fn execute(cli: &Cli) -> Result<()> {
    info!("Starting archiver");

    let config = Config::load().context("Failed to load configuration")?;
    info!(
        subscription = %config.subscription.name,
        project = %config.subscription.project_id,
        bucket = %config.storage.bucket,
        max_messages = config.pipeline.max_messages,
        "Configuration loaded"
    );

    let archiver = Archiver::from_config(config).await;

    if cli.check {
        if archiver.health().check().await {
            return Ok(());
        }
        return Err(ServiceError::Connectivity("health check failed".to_string()).into());
    }

    let ct = CancellationToken::new();
    tokio::spawn({
        let ct = ct.clone();
        async move {
            shutdown_signal().await;
            ct.cancel();
        }
    });

    archiver.run(ct).await.context("Ingestion stopped")?;

    info!("Archiver shut down gracefully");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, starting graceful shutdown");
        },
        _ = terminate => {
            info!("Received terminate signal, starting graceful shutdown");
        },
    }
}
