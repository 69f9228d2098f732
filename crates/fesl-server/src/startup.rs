//! Translation from the persisted configuration to runtime settings.

use fesl_config::{Config, ConfigError};
use fesl_net::{FrameConfig, ServerConfig, ServiceSettings};

pub fn server_config(config: &Config) -> Result<ServerConfig, ConfigError> {
    Ok(ServerConfig {
        bind_addr: config.server.socket_addr()?,
        max_connections: config.server.max_connections,
        frame: FrameConfig {
            max_packet_size: config.server.max_packet_size,
        },
    })
}

pub fn service_settings(config: &Config) -> ServiceSettings {
    let fesl = &config.fesl;
    ServiceSettings {
        domain: fesl.domain.clone(),
        sub_domain: fesl.sub_domain.clone(),
        theater_address: fesl.theater_address.clone(),
        theater_port: fesl.theater_port,
        messenger_address: fesl.messenger_address.clone(),
        messenger_port: fesl.messenger_port,
        ping_site_address: fesl.ping_site_address.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_runtime_defaults() {
        let config = Config::default();
        assert_eq!(service_settings(&config), ServiceSettings::default());

        let server = server_config(&config).unwrap();
        assert_eq!(server.bind_addr, ServerConfig::default().bind_addr);
        assert_eq!(server.max_connections, 256);
        assert_eq!(server.frame.max_packet_size, 65_536);
    }

    #[test]
    fn test_overrides_flow_through() {
        let mut config = Config::default();
        config.server.bind_address = "127.0.0.1".to_string();
        config.server.port = 18_900;
        config.fesl.theater_port = 18_905;
        config.fesl.sub_domain = "RACE".to_string();

        let server = server_config(&config).unwrap();
        assert_eq!(server.bind_addr.to_string(), "127.0.0.1:18900");

        let settings = service_settings(&config);
        assert_eq!(settings.theater_port, 18_905);
        assert_eq!(settings.partition(), "/ps3/RACE");
    }

    #[test]
    fn test_bad_bind_address_is_an_error() {
        let mut config = Config::default();
        config.server.bind_address = "localhost:1".to_string();
        assert!(matches!(
            server_config(&config),
            Err(ConfigError::InvalidAddress(_))
        ));
    }
}
