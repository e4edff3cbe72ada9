//! Key/value chat messages exchanged between protocols and bot modules.
//!
//! Inbound messages carry:
//!
//! | key            | value                                          |
//! |----------------|------------------------------------------------|
//! | `network`      | network name the message arrived on            |
//! | `type`         | `message`, `notice` or `action`                |
//! | `sender`       | sender nickname                                |
//! | `sender/user`  | sender username, when known                    |
//! | `sender/host`  | sender hostname, when known                    |
//! | `target`       | channel or nickname the message was sent to    |
//! | `target/type`  | `channel` or `user`                            |
//! | `text/plain`   | body with formatting removed                   |
//! | `text/irc`     | body as received                               |
//! | `tag/<key>`    | one entry per message tag                      |
//!
//! Outbound messages need `target` and `text/plain`, with optional `type`
//! and `network`.

use std::collections::BTreeMap;

pub const NETWORK: &str = "network";
pub const TYPE: &str = "type";
pub const SENDER: &str = "sender";
pub const SENDER_USER: &str = "sender/user";
pub const SENDER_HOST: &str = "sender/host";
pub const TARGET: &str = "target";
pub const TARGET_TYPE: &str = "target/type";
pub const TEXT_PLAIN: &str = "text/plain";
pub const TEXT_IRC: &str = "text/irc";
pub const TAG_PREFIX: &str = "tag/";

pub const TYPE_MESSAGE: &str = "message";
pub const TYPE_NOTICE: &str = "notice";
pub const TYPE_ACTION: &str = "action";

pub const TARGET_CHANNEL: &str = "channel";
pub const TARGET_USER: &str = "user";

/// A chat message as a flat string map.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChatMessage {
    fields: BTreeMap<String, String>,
}

impl ChatMessage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Outbound message of type `message` to `target`.
    pub fn to(target: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new()
            .with(TYPE, TYPE_MESSAGE)
            .with(TARGET, target)
            .with(TEXT_PLAIN, text)
    }

    /// Builder-style insert.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.fields.insert(key.into(), value.into())
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.fields.remove(key)
    }

    /// Message type, `message` when absent.
    pub fn kind(&self) -> &str {
        self.get(TYPE).unwrap_or(TYPE_MESSAGE)
    }

    pub fn network(&self) -> Option<&str> {
        self.get(NETWORK)
    }

    pub fn sender(&self) -> Option<&str> {
        self.get(SENDER)
    }

    pub fn target(&self) -> Option<&str> {
        self.get(TARGET)
    }

    pub fn text(&self) -> Option<&str> {
        self.get(TEXT_PLAIN)
    }

    pub fn is_channel_message(&self) -> bool {
        self.get(TARGET_TYPE) == Some(TARGET_CHANNEL)
    }

    /// Where a reply to this message should go: the channel it was sent to,
    /// or the sender for private messages.
    pub fn reply_target(&self) -> Option<&str> {
        if self.is_channel_message() {
            self.target()
        } else {
            self.sender()
        }
    }

    /// Build a reply on the same network.
    ///
    /// Returns `None` when the message has no sender or target to answer.
    pub fn reply(&self, text: impl Into<String>) -> Option<ChatMessage> {
        let target = self.reply_target()?;
        let mut reply = ChatMessage::to(target, text);
        if let Some(network) = self.network() {
            reply.insert(NETWORK, network);
        }
        Some(reply)
    }

    pub fn tag(&self, key: &str) -> Option<&str> {
        self.fields
            .get(&format!("{TAG_PREFIX}{key}"))
            .map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for ChatMessage {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            fields: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}
