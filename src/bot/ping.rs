use std::sync::Arc;

use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use super::{BotModule, ClientHandle};
use crate::error::ConfigError;

/// Answers `!ping [text]` with `pong [text]`.
#[derive(Debug)]
pub struct PingModule {
    reply: Arc<Mutex<String>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PingConfig {
    #[serde(default = "default_reply")]
    reply: String,
}

fn default_reply() -> String {
    "pong".to_string()
}

impl PingModule {
    pub fn new() -> Self {
        Self {
            reply: Arc::new(Mutex::new(default_reply())),
        }
    }
}

impl Default for PingModule {
    fn default() -> Self {
        Self::new()
    }
}

impl BotModule for PingModule {
    fn attach(&self, client: ClientHandle) {
        let reply = Arc::clone(&self.reply);
        let sender = client.clone();
        let result = client.register_bot_command("!ping", move |_, parameters, message| {
            let word = reply.lock().clone();
            let text = if parameters.is_empty() {
                word
            } else {
                format!("{word} {parameters}")
            };
            match message.reply(text) {
                Some(answer) => {
                    sender.send_message(&answer);
                }
                None => debug!("ping without reply target"),
            }
        });
        if let Err(e) = result {
            warn!(error = %e, "cannot register !ping");
        }
    }

    fn set_config(&self, config: &Value) -> Result<(), ConfigError> {
        let config = if config.is_null() {
            PingConfig {
                reply: default_reply(),
            }
        } else {
            PingConfig::deserialize(config)?
        };
        if config.reply.is_empty() || config.reply.contains(['\r', '\n']) {
            return Err(ConfigError::invalid("reply", "must be a non-empty single line"));
        }
        *self.reply.lock() = config.reply;
        Ok(())
    }
}
