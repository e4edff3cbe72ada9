//! Chat protocols layered over a [`Connection`].
//!
//! A protocol turns the connection's bytes into [`ChatMessage`]s for its
//! [`MessageSink`] and turns outbound chat messages back into wire lines.

pub mod config;
mod irc;

use std::sync::{Arc, Weak};

use async_trait::async_trait;
use serde_json::Value;

use crate::chat::ChatMessage;
use crate::connection::Connection;
use crate::error::{ConfigError, ConnectError};

pub use self::irc::IrcProtocol;

/// Receiver of inbound chat messages.
pub trait MessageSink: Send + Sync {
    fn on_message(&self, message: ChatMessage);
}

/// A chat protocol driving one connection.
#[async_trait]
pub trait Protocol: Send + Sync {
    /// Apply a configuration document. On error the previous configuration
    /// stays in effect.
    fn set_config(&self, config: &Value) -> Result<(), ConfigError>;

    /// Take the connection this protocol speaks over and register as its
    /// handler.
    fn attach(&self, connection: Arc<dyn Connection>);

    /// Where inbound chat messages go.
    fn set_sink(&self, sink: Weak<dyn MessageSink>);

    async fn connect(&self) -> Result<(), ConnectError>;

    async fn disconnect(&self);

    /// Send a chat message. Messages that cannot be expressed on the wire
    /// are dropped.
    fn send_message(&self, message: &ChatMessage);
}
