//! FESL backend server.
//!
//! Loads `config.ron`, applies CLI overrides, initializes logging, and serves
//! the transaction catalog until ctrl-c.

mod startup;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use fesl_config::{CliArgs, Config};
use fesl_net::{FeslServer, SharedIdentity};

#[tokio::main]
async fn main() -> ExitCode {
    let args = CliArgs::parse();

    let config_dir = match args.config.clone() {
        Some(dir) => dir,
        None => Config::default_dir().unwrap_or_else(|e| {
            eprintln!("{e}; using ./fesl");
            PathBuf::from("fesl")
        }),
    };

    let mut config = Config::load_or_create(&config_dir).unwrap_or_else(|e| {
        eprintln!("Failed to load config: {e}, using defaults");
        Config::default()
    });
    config.apply_cli_overrides(&args);

    let log_dir = config_dir.join("logs");
    fesl_log::init_logging(Some(&log_dir), Some(&config));

    let server_config = match startup::server_config(&config) {
        Ok(server_config) => server_config,
        Err(e) => {
            tracing::error!("{e}");
            return ExitCode::FAILURE;
        }
    };

    let router = fesl_handlers::router();
    tracing::info!("Registered {} transactions", router.len());
    for (kind, txn) in router.registered() {
        tracing::trace!("  {kind}/{txn}");
    }
    tracing::info!(
        "Theater at {}:{}, standing in for {}",
        config.fesl.theater_address,
        config.fesl.theater_port,
        config.fesl.upstream_host
    );

    let server = Arc::new(FeslServer::new(
        server_config,
        Arc::new(SharedIdentity::new()),
        Arc::new(router),
        Arc::new(startup::service_settings(&config)),
    ));

    let shutdown = Arc::clone(&server);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::info!("Ctrl-C received");
                shutdown.shutdown();
            }
            Err(e) => tracing::error!("Cannot listen for ctrl-c: {e}"),
        }
    });

    if let Err(e) = server.run().await {
        tracing::error!("Server failed: {e}");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}
