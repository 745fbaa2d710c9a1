use std::env;

/// Relay server configuration.
///
/// Defaults match the original deployment: port 3001, overridable through
/// the `PORT` environment variable (or `BIND_ADDR` for the full address).
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address the WebSocket listener binds to.
    pub bind_addr: String,
    /// Hard cap on concurrent transport connections.
    pub max_connections: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:3001".to_owned(),
            max_connections: 4096,
        }
    }
}

impl ServerConfig {
    /// Build a config from the environment, falling back to defaults for
    /// anything unset or unparsable.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(port) = env::var("PORT").ok().and_then(|p| p.parse::<u16>().ok()) {
            config.bind_addr = format!("0.0.0.0:{port}");
        }
        if let Ok(addr) = env::var("BIND_ADDR") {
            config.bind_addr = addr;
        }
        if let Some(max) = env::var("MAX_CONNECTIONS")
            .ok()
            .and_then(|m| m.parse::<usize>().ok())
        {
            config.max_connections = max;
        }
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.bind_addr, "0.0.0.0:3001");
        assert_eq!(config.max_connections, 4096);
    }
}
