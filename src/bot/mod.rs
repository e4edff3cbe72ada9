//! The bot client and its modules.
//!
//! A [`BotClient`] owns one protocol per network and a set of
//! [`BotModule`]s. Modules register prefixed commands through a
//! [`ClientHandle`]; inbound `message` chat messages whose text starts with
//! a registered prefix and command word run the matching handler.
//!
//! ```
//! use slirc_bot::bot::BotClient;
//! use slirc_bot::chat::ChatMessage;
//!
//! let client = BotClient::new();
//! client
//!     .register_bot_command("!hello", |_command, parameters, _message| {
//!         assert_eq!(parameters, "world");
//!     })
//!     .unwrap();
//! client.on_message(&ChatMessage::to("#rust", "!hello world"));
//! ```

mod client;
mod commands;
mod ping;

use serde_json::Value;

use crate::error::ConfigError;

pub use self::client::{BotClient, ClientHandle};
pub use self::commands::{split_command, CommandHandler, CommandTable, Invocation};
pub use self::ping::PingModule;

/// A pluggable piece of bot behavior.
pub trait BotModule: Send + Sync {
    /// Called once with the client the module belongs to. Commands are
    /// registered here.
    fn attach(&self, client: ClientHandle);

    /// Apply module configuration. On error the previous configuration
    /// stays in effect.
    fn set_config(&self, config: &Value) -> Result<(), ConfigError>;
}
