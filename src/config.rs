//! Configuration file parsing
//!
//! Parses the optional TOML configuration for a peer node. Every field has
//! a default, so an empty file (or none at all) yields a working node.

use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Top-level configuration file layout
#[derive(Debug, Clone, Default, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    node: NodeConfig,
}

/// Node settings
#[derive(Debug, Clone, Deserialize)]
pub struct NodeConfig {
    /// Listen address for inbound peers
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Stable node identifier; a random one is generated when unset
    #[serde(default)]
    pub node_id: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// How long an outbound block request waits for a reply, in milliseconds
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

fn default_bind_addr() -> String {
    "127.0.0.1:9400".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_request_timeout_ms() -> u64 {
    5_000
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            node_id: None,
            log_level: default_log_level(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

impl NodeConfig {
    /// Load node settings from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let file: ConfigFile = toml::from_str(&content)?;
        file.node.validate()?;
        Ok(file.node)
    }

    /// Validate field constraints
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bind_addr.is_empty() {
            return Err(ConfigError::Invalid("bind_addr must not be empty".to_string()));
        }
        if self.request_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "request_timeout_ms must be positive".to_string(),
            ));
        }
        if let Some(id) = &self.node_id {
            if id.is_empty() {
                return Err(ConfigError::Invalid("node_id must not be empty".to_string()));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = NodeConfig::default();
        assert_eq!(config.bind_addr, "127.0.0.1:9400");
        assert_eq!(config.log_level, "info");
        assert_eq!(config.request_timeout_ms, 5_000);
        assert!(config.node_id.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_partial_file() {
        let toml = r#"
            [node]
            bind_addr = "0.0.0.0:7000"
            node_id = "peer-alpha"
        "#;
        let file: ConfigFile = toml::from_str(toml).unwrap();
        let config = file.node;
        assert_eq!(config.bind_addr, "0.0.0.0:7000");
        assert_eq!(config.node_id.as_deref(), Some("peer-alpha"));
        // Untouched fields keep their defaults
        assert_eq!(config.request_timeout_ms, 5_000);
    }

    #[test]
    fn test_empty_file_is_valid() {
        let file: ConfigFile = toml::from_str("").unwrap();
        assert!(file.node.validate().is_ok());
    }

    #[test]
    fn test_rejects_zero_timeout() {
        let config = NodeConfig {
            request_timeout_ms: 0,
            ..NodeConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }
}
