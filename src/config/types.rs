//! Core configuration types and loading.

use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

use super::limits::LimitsConfig;
use super::links::LinkBlock;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Server identity.
    pub server: ServerConfig,
    /// Optional modules to load in addition to the core set.
    #[serde(default)]
    pub modules: ModulesConfig,
    /// Mode engine limits.
    #[serde(default)]
    pub limits: LimitsConfig,
    /// Key-value storage location.
    #[serde(default)]
    pub storage: StorageConfig,
    /// Link blocks for server peering.
    #[serde(default)]
    pub links: Vec<LinkBlock>,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse configuration from TOML text.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }

    /// Find the link block for a server name.
    pub fn link(&self, name: &str) -> Option<&LinkBlock> {
        self.links.iter().find(|l| l.name == name)
    }
}

/// Server identity configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Server name (e.g., "irc.example.net"). Must contain a dot.
    pub name: String,
    /// Server ID (3 characters, first a digit).
    pub sid: String,
    /// Server description.
    #[serde(default)]
    pub description: String,
}

/// Module load list.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ModulesConfig {
    /// Non-core modules by name. Core modules always load.
    #[serde(default)]
    pub load: Vec<String>,
}

/// Storage configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StorageConfig {
    /// JSON file backing the key-value store. In-memory when absent.
    pub path: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = r#"
[server]
name = "irc.example.net"
sid = "1AA"
description = "Example server"

[modules]
load = ["ChannelOpAccess"]

[limits]
list_capacity = 50

[[links]]
name = "hub.example.net"
address = "10.0.0.1"
incoming_password = "in"
outgoing_password = "out"
"#;

    #[test]
    fn parse_full_config() {
        let config = Config::parse(SAMPLE).unwrap();
        assert_eq!(config.server.sid, "1AA");
        assert_eq!(config.modules.load, vec!["ChannelOpAccess"]);
        assert_eq!(config.limits.list_capacity, 50);
        assert_eq!(config.limits.list_param_length, 250);
        assert_eq!(config.limits.max_mode_changes, 20);
        assert!(config.storage.path.is_none());
        let link = config.link("hub.example.net").unwrap();
        assert_eq!(link.address.as_deref(), Some("10.0.0.1"));
        assert!(config.link("leaf.example.net").is_none());
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();
        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.server.name, "irc.example.net");
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = Config::load("/nonexistent/meshircd.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
