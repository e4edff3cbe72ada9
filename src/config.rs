//! Top-level client configuration.
//!
//! ```json
//! {
//!   "pluginDirectory": "/usr/lib/slircbot",
//!   "networks": [
//!     {
//!       "name": "libera",
//!       "connection": { "type": "tls", "config": { "hostname": "irc.libera.chat" } },
//!       "protocol": { "type": "irc", "config": { "nickname": "slircbot", "channels": ["#bots"] } }
//!     }
//!   ],
//!   "modules": [ { "type": "ping" } ]
//! }
//! ```

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde_json::Value;

use crate::error::ConfigError;
use crate::plugin::PluginLoader;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientConfig {
    /// Where plugin libraries live; defaults to the executable's directory.
    #[serde(default)]
    pub plugin_directory: Option<PathBuf>,
    #[serde(default)]
    pub networks: Vec<NetworkConfig>,
    #[serde(default)]
    pub modules: Vec<ComponentConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NetworkConfig {
    /// Defaults to `network<N>`, counting from 1.
    #[serde(default)]
    pub name: Option<String>,
    pub connection: ComponentConfig,
    pub protocol: ComponentConfig,
}

impl NetworkConfig {
    /// Name of the network at `index` in the list.
    pub fn name(&self, index: usize) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| format!("network{}", index + 1))
    }
}

/// A named component and its own configuration document.
#[derive(Debug, Clone, Deserialize)]
pub struct ComponentConfig {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub config: Value,
}

impl ClientConfig {
    /// Load configuration from a JSON file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        content.parse()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut names = HashSet::new();
        for (index, network) in self.networks.iter().enumerate() {
            if network.connection.kind.is_empty() {
                return Err(ConfigError::invalid("networks.connection.type", "must not be empty"));
            }
            if network.protocol.kind.is_empty() {
                return Err(ConfigError::invalid("networks.protocol.type", "must not be empty"));
            }
            let name = network.name(index);
            if !names.insert(name.clone()) {
                let reason = format!("duplicate network `{name}`");
                return Err(ConfigError::invalid("networks.name", reason));
            }
        }
        if self.modules.iter().any(|module| module.kind.is_empty()) {
            return Err(ConfigError::invalid("modules.type", "must not be empty"));
        }
        Ok(())
    }

    pub fn plugin_directory(&self) -> PathBuf {
        self.plugin_directory
            .clone()
            .unwrap_or_else(PluginLoader::default_directory)
    }
}

impl std::str::FromStr for ClientConfig {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let config: ClientConfig = serde_json::from_str(s)?;
        config.validate()?;
        Ok(config)
    }
}
