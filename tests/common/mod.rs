//! Shared fixtures: a recording connection and a collecting message sink.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use slirc_bot::chat::ChatMessage;
use slirc_bot::connection::{Connection, ConnectionHandler};
use slirc_bot::error::{ConfigError, ConnectError};
use slirc_bot::protocol::MessageSink;

/// Connection that records outbound bytes and lets tests inject inbound
/// data.
#[derive(Default)]
pub struct MockConnection {
    sent: Mutex<Vec<u8>>,
    handler: Mutex<Option<Weak<dyn ConnectionHandler>>>,
    connected: AtomicBool,
    pub connects: AtomicUsize,
}

impl MockConnection {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn handler(&self) -> Option<Arc<dyn ConnectionHandler>> {
        self.handler.lock().as_ref().and_then(Weak::upgrade)
    }

    /// Deliver bytes as if read from the socket.
    pub fn receive(&self, data: &[u8]) {
        if let Some(handler) = self.handler() {
            handler.on_data(data);
        }
    }

    pub fn receive_line(&self, line: &str) {
        self.receive(format!("{line}\r\n").as_bytes());
    }

    /// Simulate the peer closing the connection.
    pub fn drop_connection(&self) {
        if self.connected.swap(false, Ordering::SeqCst) {
            if let Some(handler) = self.handler() {
                handler.on_disconnected();
            }
        }
    }

    /// Every line written so far, terminators removed.
    pub fn lines(&self) -> Vec<String> {
        String::from_utf8_lossy(&self.sent.lock())
            .split_terminator("\r\n")
            .map(str::to_owned)
            .collect()
    }

    pub fn raw(&self) -> Vec<u8> {
        self.sent.lock().clone()
    }

    pub fn clear(&self) {
        self.sent.lock().clear();
    }

    pub fn position(&self, line: &str) -> Option<usize> {
        self.lines().iter().position(|l| l == line)
    }
}

#[async_trait]
impl Connection for MockConnection {
    fn set_config(&self, _config: &Value) -> Result<(), ConfigError> {
        Ok(())
    }

    fn set_handler(&self, handler: Weak<dyn ConnectionHandler>) {
        *self.handler.lock() = Some(handler);
    }

    async fn connect(&self) -> Result<(), ConnectError> {
        if self.connected.swap(true, Ordering::SeqCst) {
            return Err(ConnectError::AlreadyConnected);
        }
        self.connects.fetch_add(1, Ordering::SeqCst);
        let handler = self.handler().ok_or(ConnectError::NoHandler)?;
        handler.on_connected();
        Ok(())
    }

    fn send(&self, data: &[u8]) {
        if self.connected.load(Ordering::SeqCst) {
            self.sent.lock().extend_from_slice(data);
        }
    }

    async fn disconnect(&self) {
        self.drop_connection();
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

/// Sink collecting every delivered chat message.
#[derive(Default)]
pub struct Inbox {
    messages: Mutex<Vec<ChatMessage>>,
}

impl Inbox {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn messages(&self) -> Vec<ChatMessage> {
        self.messages.lock().clone()
    }

    pub fn weak(self: &Arc<Self>) -> Weak<dyn MessageSink> {
        let weak: Weak<Inbox> = Arc::downgrade(self);
        weak
    }
}

impl MessageSink for Inbox {
    fn on_message(&self, message: ChatMessage) {
        self.messages.lock().push(message);
    }
}
