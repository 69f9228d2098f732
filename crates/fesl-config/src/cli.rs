//! Command-line argument parsing.

use std::path::PathBuf;

use clap::Parser;

use crate::Config;

/// FESL server command-line arguments.
///
/// CLI values override settings loaded from `config.ron`.
#[derive(Parser, Debug, Default)]
#[command(name = "fesl-server", about = "FESL game backend")]
pub struct CliArgs {
    /// Interface to bind.
    #[arg(long)]
    pub bind: Option<String>,

    /// FESL port.
    #[arg(long)]
    pub port: Option<u16>,

    /// Maximum concurrent connections.
    #[arg(long)]
    pub max_connections: Option<usize>,

    /// Theater address announced to clients.
    #[arg(long)]
    pub theater_address: Option<String>,

    /// Theater port announced to clients.
    #[arg(long)]
    pub theater_port: Option<u16>,

    /// Retail host this server stands in for.
    #[arg(long)]
    pub upstream_host: Option<String>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(long)]
    pub log_level: Option<String>,

    /// Path to config directory (overrides default location).
    #[arg(long)]
    pub config: Option<PathBuf>,
}

impl Config {
    /// Apply CLI overrides to a loaded config.
    pub fn apply_cli_overrides(&mut self, args: &CliArgs) {
        if let Some(ref bind) = args.bind {
            self.server.bind_address = bind.clone();
        }
        if let Some(port) = args.port {
            self.server.port = port;
        }
        if let Some(max) = args.max_connections {
            self.server.max_connections = max;
        }
        if let Some(ref addr) = args.theater_address {
            self.fesl.theater_address = addr.clone();
        }
        if let Some(port) = args.theater_port {
            self.fesl.theater_port = port;
        }
        if let Some(ref host) = args.upstream_host {
            self.fesl.upstream_host = host.clone();
        }
        if let Some(ref level) = args.log_level {
            self.logging.log_level = level.clone();
        }
    }
}
