//! Configuration for the FESL server.
//!
//! Settings persist to disk as a RON file and can be overridden from the
//! command line via clap. Unknown fields are ignored and missing ones take
//! their defaults, so older and newer config files both load.

mod cli;
mod config;
mod error;

pub use cli::CliArgs;
pub use config::{Config, FeslConfig, LoggingConfig, ServerSection};
pub use error::ConfigError;
