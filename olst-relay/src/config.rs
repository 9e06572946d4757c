//! TOML file configuration.
//!
//! These structs directly map to the `olst-config.toml` file format.

use alloy_primitives::Address;
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::Path;
use url::Url;

/// Root configuration structure as read from the TOML file.
#[derive(Debug, Clone, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub server: ServerConfig,
    pub chain: ChainConfig,
}

/// Server configuration section.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// The address and port to listen on (e.g., "0.0.0.0:8080").
    #[serde(default = "default_listen_addr")]
    pub listen: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen_addr(),
        }
    }
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8080))
}

/// Chain connectivity section.
#[derive(Debug, Clone, Deserialize)]
pub struct ChainConfig {
    /// JSON-RPC endpoint of the node to poll.
    pub rpc_url: Url,
    /// Address of the lottery contract.
    pub contract_address: Address,
    /// Seconds between log polls.
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    /// Block to start watching from on a cold start.
    #[serde(default)]
    pub start_block: u64,
}

fn default_poll_interval_secs() -> u64 {
    5
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Read(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&contents)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_config() {
        let toml_str = r#"
[server]
listen = "127.0.0.1:3000"

[chain]
rpc_url = "https://rpc.example.com"
contract_address = "0x5FbDB2315678afecb367f032d93F642f64180aa3"
poll_interval_secs = 10
start_block = 1200
"#;
        let config: FileConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.server.listen.port(), 3000);
        assert_eq!(config.chain.poll_interval_secs, 10);
        assert_eq!(config.chain.start_block, 1200);
    }

    #[test]
    fn server_section_is_optional() {
        let toml_str = r#"
[chain]
rpc_url = "https://rpc.example.com"
contract_address = "0x5FbDB2315678afecb367f032d93F642f64180aa3"
"#;
        let config: FileConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.server.listen.port(), 8080);
        assert_eq!(config.chain.poll_interval_secs, 5);
        assert_eq!(config.chain.start_block, 0);
    }
}
