//! Configuration structs with sensible defaults and RON persistence.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Top-level server configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Listener settings.
    pub server: ServerSection,
    /// Values announced to clients.
    pub fesl: FeslConfig,
    /// Log output settings.
    pub logging: LoggingConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerSection {
    /// Interface to bind.
    pub bind_address: String,
    /// FESL port.
    pub port: u16,
    /// Maximum concurrent connections.
    pub max_connections: usize,
    /// Largest accepted packet in bytes, header included.
    pub max_packet_size: u32,
}

/// Values handed to clients during the handshake and login.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FeslConfig {
    /// `domainPartition.domain`.
    pub domain: String,
    /// `domainPartition.subDomain`.
    pub sub_domain: String,
    /// Theater (lobby) service address.
    pub theater_address: String,
    /// Theater service port.
    pub theater_port: u16,
    /// Messenger service address.
    pub messenger_address: String,
    /// Messenger service port (0 disables messaging).
    pub messenger_port: u16,
    /// Address of the single advertised ping site.
    pub ping_site_address: String,
    /// Host of the retail service this server stands in for.
    pub upstream_host: String,
}

/// Log output configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter level (e.g., "debug", "info", "warn").
    pub log_level: String,
    /// Also write JSON logs to a file in the log directory.
    pub json_file: bool,
}

impl ServerSection {
    /// Combine bind address and port.
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        let text = format!("{}:{}", self.bind_address, self.port);
        text.parse()
            .map_err(|_| ConfigError::InvalidAddress(text))
    }
}

// --- Default implementations ---

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: 18_800,
            max_connections: 256,
            max_packet_size: 65_536,
        }
    }
}

impl Default for FeslConfig {
    fn default() -> Self {
        Self {
            domain: "ps3".to_string(),
            sub_domain: "BEACH".to_string(),
            theater_address: "127.0.0.1".to_string(),
            theater_port: 18_805,
            messenger_address: "127.0.0.1".to_string(),
            messenger_port: 0,
            ping_site_address: "127.0.0.1".to_string(),
            upstream_host: "beach-ps3.fesl.ea.com".to_string(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_file: false,
        }
    }
}

// --- Load / Save / Reload ---

impl Config {
    /// Platform config directory for the server, e.g. `~/.config/fesl`.
    pub fn default_dir() -> Result<PathBuf, ConfigError> {
        dirs::config_dir()
            .map(|dir| dir.join("fesl"))
            .ok_or(ConfigError::NoConfigDir)
    }

    /// Load config from the given directory, or create a default config file.
    pub fn load_or_create(config_dir: &Path) -> Result<Self, ConfigError> {
        let config_path = config_dir.join("config.ron");

        if config_path.exists() {
            let contents = std::fs::read_to_string(&config_path).map_err(ConfigError::ReadError)?;
            let config: Config = ron::from_str(&contents).map_err(ConfigError::ParseError)?;
            log::info!("Loaded config from {}", config_path.display());
            Ok(config)
        } else {
            let config = Config::default();
            config.save(config_dir)?;
            log::info!("Created default config at {}", config_path.display());
            Ok(config)
        }
    }

    /// Save config to the given directory as `config.ron`.
    pub fn save(&self, config_dir: &Path) -> Result<(), ConfigError> {
        std::fs::create_dir_all(config_dir).map_err(ConfigError::WriteError)?;

        let config_path = config_dir.join("config.ron");
        let pretty = ron::ser::PrettyConfig::new()
            .depth_limit(3)
            .enumerate_arrays(false);

        let serialized =
            ron::ser::to_string_pretty(self, pretty).map_err(ConfigError::SerializeError)?;

        std::fs::write(&config_path, serialized).map_err(ConfigError::WriteError)?;
        Ok(())
    }

    /// Re-read the file: `Some(new_config)` if it changed, `None` otherwise.
    pub fn reload(&self, config_dir: &Path) -> Result<Option<Self>, ConfigError> {
        let config_path = config_dir.join("config.ron");
        let contents = std::fs::read_to_string(&config_path).map_err(ConfigError::ReadError)?;
        let new_config: Config = ron::from_str(&contents).map_err(ConfigError::ParseError)?;

        if &new_config != self {
            log::info!("Config reloaded with changes");
            Ok(Some(new_config))
        } else {
            Ok(None)
        }
    }
}
