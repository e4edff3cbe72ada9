//! # slirc-bot
//!
//! An extensible IRC bot framework. Bytes flow from a pluggable
//! [`connection`] into the [`protocol`] layer, which frames and parses them,
//! drives registration and capability negotiation, and hands chat messages to
//! the [`bot`] client. The client routes prefixed commands to bot modules,
//! which answer through the same path in reverse. Connections, protocols and
//! bot modules are resolved by name through the [`plugin`] loader, either
//! from built-ins or from shared libraries.
//!
//! ## Features
//!
//! - TCP, TLS and WebSocket transports behind one [`Connection`] trait
//! - IRCv3 capability negotiation, message tags and ISUPPORT tracking
//! - A sans-IO session state machine ([`state::IrcMachine`])
//! - CTCP queries, formatting removal and line limit aware truncation
//! - Native and C ABI plugins with per-component reference counts
//!
//! ## Quick Start
//!
//! ```no_run
//! use slirc_bot::bot::BotClient;
//! use slirc_bot::config::ClientConfig;
//! use slirc_bot::plugin::PluginLoader;
//!
//! # async fn run() -> anyhow::Result<()> {
//! let config = ClientConfig::load("slircbot.json")?;
//! let loader = PluginLoader::with_builtins(config.plugin_directory());
//! let client = BotClient::from_config(&config, &loader);
//! client.run().await;
//! tokio::signal::ctrl_c().await?;
//! client.shutdown().await;
//! # Ok(())
//! # }
//! ```
//!
//! ### Parsing IRC Messages
//!
//! ```rust
//! use slirc_bot::RawMessage;
//!
//! let message = RawMessage::parse("@id=123 :nick!user@host PRIVMSG #chan :hello world").unwrap();
//! assert_eq!(message.command, "PRIVMSG");
//! assert_eq!(message.source_nick(), Some("nick"));
//! assert_eq!(message.parameters, ["#chan", "hello world"]);
//! ```

#![deny(clippy::all)]

pub mod bot;
pub mod caps;
pub mod chat;
pub mod colors;
pub mod config;
pub mod connection;
pub mod ctcp;
pub mod error;
pub mod isupport;
pub mod line;
pub mod message;
pub mod plugin;
pub mod protocol;
pub mod response;
pub mod state;
pub mod timer;
pub mod util;
pub mod validation;

pub use self::bot::{BotClient, BotModule, ClientHandle};
pub use self::caps::Capabilities;
pub use self::chat::ChatMessage;
pub use self::colors::FormattedStringExt;
pub use self::connection::{Connection, ConnectionHandler, StreamConnection, TransportKind};
pub use self::ctcp::Ctcp;
pub use self::error::{CommandError, ConfigError, ConnectError, MessageParseError, PluginError};
pub use self::isupport::{ChanModes, Features};
pub use self::line::LineBuffer;
pub use self::message::{RawMessage, Source, Tag};
pub use self::plugin::{Component, ComponentKind, Instance, PluginLoader};
pub use self::protocol::{IrcProtocol, MessageSink, Protocol};
pub use self::response::Response;
pub use self::state::{IrcMachine, RegistrationState};
