//! IRC protocol configuration.

use serde::Deserialize;
use serde_json::Value;

use crate::error::ConfigError;
use crate::validation::{validate_nickname, validate_target};

/// Settings recognized by the `irc` protocol.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct IrcConfig {
    /// Nickname to register with.
    pub nickname: String,
    /// Username (ident); defaults to the nickname.
    #[serde(default)]
    pub username: Option<String>,
    /// Real name / GECOS; defaults to the nickname.
    #[serde(default)]
    pub realname: Option<String>,
    /// Server password, sent as PASS when present.
    #[serde(default)]
    pub password: Option<String>,
    /// Channels joined once registration completes.
    #[serde(default)]
    pub channels: Vec<String>,
    /// User mode requested once registration completes, e.g. `+B`.
    #[serde(default)]
    pub mode: Option<String>,
    /// How many times the nickname is mutated after a collision before
    /// giving up.
    #[serde(default = "default_nickname_retries")]
    pub nickname_retries: u32,
    /// Capabilities requested when the server advertises them.
    #[serde(default = "default_capabilities")]
    pub capabilities: Vec<String>,
    /// Seconds to wait for a CAP reply before registering anyway.
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout: u64,
    /// Seconds allowed for registration before quitting.
    #[serde(default = "default_registration_timeout")]
    pub registration_timeout: u64,
    /// CTCP VERSION reply.
    #[serde(default = "default_version")]
    pub version: String,
}

fn default_nickname_retries() -> u32 {
    3
}

fn default_capabilities() -> Vec<String> {
    vec![crate::caps::MESSAGE_TAGS.to_string()]
}

fn default_probe_timeout() -> u64 {
    10
}

fn default_registration_timeout() -> u64 {
    60
}

fn default_version() -> String {
    concat!(env!("CARGO_PKG_NAME"), " ", env!("CARGO_PKG_VERSION")).to_string()
}

impl IrcConfig {
    /// Configuration with defaults for everything but the nickname.
    pub fn new(nickname: impl Into<String>) -> Self {
        Self {
            nickname: nickname.into(),
            username: None,
            realname: None,
            password: None,
            channels: Vec::new(),
            mode: None,
            nickname_retries: default_nickname_retries(),
            capabilities: default_capabilities(),
            probe_timeout: default_probe_timeout(),
            registration_timeout: default_registration_timeout(),
            version: default_version(),
        }
    }

    /// Parse and validate a configuration document.
    pub fn from_value(value: &Value) -> Result<Self, ConfigError> {
        let config = Self::deserialize(value)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_nickname(&self.nickname)
            .map_err(|e| ConfigError::invalid("nickname", e.to_string()))?;
        if let Some(username) = &self.username {
            validate_target(username)
                .map_err(|e| ConfigError::invalid("username", e.to_string()))?;
        }
        for channel in &self.channels {
            validate_target(channel)
                .map_err(|e| ConfigError::invalid("channels", e.to_string()))?;
        }
        if let Some(mode) = &self.mode {
            validate_target(mode)
                .map_err(|e| ConfigError::invalid("mode", e.to_string()))?;
        }
        for (field, value) in [("realname", &self.realname), ("password", &self.password)] {
            if value.as_deref().map_or(false, |v| v.contains(['\r', '\n'])) {
                return Err(ConfigError::invalid(field, "must not contain line breaks"));
            }
        }
        Ok(())
    }

    pub fn username(&self) -> &str {
        self.username.as_deref().unwrap_or(&self.nickname)
    }

    pub fn realname(&self) -> &str {
        self.realname.as_deref().unwrap_or(&self.nickname)
    }
}
