//! Byte transports between the bot and an IRC server.
//!
//! Every transport satisfies the same [`Connection`] contract. The variant
//! is picked by [`TransportKind`], keyed by the type string used in the
//! client configuration:
//!
//! | type  | transport                         | default port |
//! |-------|-----------------------------------|--------------|
//! | `tcp` | plain TCP                         | 6667         |
//! | `tls` | TLS over TCP                      | 6697         |
//! | `ws`  | WebSocket (`text.ircv3.net`)      | 80           |
//! | `wss` | WebSocket over TLS                | 443          |
//!
//! Inbound bytes are handed to the attached [`ConnectionHandler`] from the
//! connection's receive task. WebSocket transports deliver one complete
//! CR LF terminated line per frame; stream transports deliver arbitrary
//! chunks.

mod session;
mod tcp;
mod tls;
mod websocket;

use std::fmt;
use std::sync::Weak;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info};

use crate::error::{ConfigError, ConnectError};

use self::session::Session;

pub use self::websocket::SUBPROTOCOL;

/// A byte channel to a server.
#[async_trait]
pub trait Connection: Send + Sync {
    /// Apply a configuration document. On error the previous configuration
    /// stays in effect.
    fn set_config(&self, config: &Value) -> Result<(), ConfigError>;

    /// Attach the receiver of connection events.
    fn set_handler(&self, handler: Weak<dyn ConnectionHandler>);

    /// Establish the connection, then call
    /// [`ConnectionHandler::on_connected`].
    async fn connect(&self) -> Result<(), ConnectError>;

    /// Queue bytes for writing. Never blocks; data sent while disconnected
    /// is dropped.
    fn send(&self, data: &[u8]);

    /// Close the connection and wait for its tasks to finish.
    async fn disconnect(&self);

    fn is_connected(&self) -> bool;
}

/// Receiver of connection events, implemented by protocols.
///
/// `on_data` and `on_disconnected` run on the connection's receive task.
pub trait ConnectionHandler: Send + Sync {
    fn on_connected(&self);

    fn on_data(&self, data: &[u8]);

    /// Called exactly once per established connection, whether the peer
    /// closed, a read failed or [`Connection::disconnect`] was called.
    fn on_disconnected(&self);
}

/// Which transport a [`StreamConnection`] uses.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TransportKind {
    Tcp,
    Tls,
    WebSocket,
    WebSocketTls,
}

impl TransportKind {
    pub const ALL: [TransportKind; 4] = [
        TransportKind::Tcp,
        TransportKind::Tls,
        TransportKind::WebSocket,
        TransportKind::WebSocketTls,
    ];

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.name() == name)
    }

    /// Type string used in configuration.
    pub fn name(self) -> &'static str {
        match self {
            Self::Tcp => "tcp",
            Self::Tls => "tls",
            Self::WebSocket => "ws",
            Self::WebSocketTls => "wss",
        }
    }

    pub fn is_secure(self) -> bool {
        matches!(self, Self::Tls | Self::WebSocketTls)
    }

    pub fn is_websocket(self) -> bool {
        matches!(self, Self::WebSocket | Self::WebSocketTls)
    }

    pub fn default_port(self) -> u16 {
        match self {
            Self::Tcp => 6667,
            Self::Tls => 6697,
            Self::WebSocket => 80,
            Self::WebSocketTls => 443,
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Settings shared by all transports.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionConfig {
    pub hostname: String,
    /// Defaults to [`TransportKind::default_port`].
    #[serde(default)]
    pub port: Option<u16>,
    /// Accept any server certificate.
    #[serde(default)]
    pub ignore_invalid_certificate: bool,
    /// Accepted for compatibility; TLS below 1.2 is never negotiated.
    #[serde(default)]
    pub ignore_insecure_protocol: bool,
    /// WebSocket request path.
    #[serde(default = "default_path")]
    pub path: String,
}

fn default_path() -> String {
    "/".to_string()
}

impl ConnectionConfig {
    pub fn new(hostname: impl Into<String>) -> Self {
        Self {
            hostname: hostname.into(),
            port: None,
            ignore_invalid_certificate: false,
            ignore_insecure_protocol: false,
            path: default_path(),
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    pub fn from_value(value: &Value) -> Result<Self, ConfigError> {
        let config = Self::deserialize(value)?;
        if config.hostname.is_empty() {
            return Err(ConfigError::invalid("hostname", "must not be empty"));
        }
        if config.hostname.contains(char::is_whitespace) {
            return Err(ConfigError::invalid("hostname", "must not contain whitespace"));
        }
        if config.port == Some(0) {
            return Err(ConfigError::invalid("port", "must not be zero"));
        }
        if !config.path.starts_with('/') {
            return Err(ConfigError::invalid("path", "must start with `/`"));
        }
        Ok(config)
    }

    pub fn port_for(&self, kind: TransportKind) -> u16 {
        self.port.unwrap_or_else(|| kind.default_port())
    }
}

/// A [`Connection`] over one of the built-in transports.
pub struct StreamConnection {
    kind: TransportKind,
    config: Mutex<Option<ConnectionConfig>>,
    handler: Mutex<Option<Weak<dyn ConnectionHandler>>>,
    session: Mutex<Option<Session>>,
}

impl StreamConnection {
    pub fn new(kind: TransportKind) -> Self {
        Self {
            kind,
            config: Mutex::new(None),
            handler: Mutex::new(None),
            session: Mutex::new(None),
        }
    }

    pub fn kind(&self) -> TransportKind {
        self.kind
    }

    pub fn config(&self) -> Option<ConnectionConfig> {
        self.config.lock().clone()
    }

    async fn open(
        &self,
        config: &ConnectionConfig,
        handler: Weak<dyn ConnectionHandler>,
    ) -> Result<Session, ConnectError> {
        let port = config.port_for(self.kind);
        let stream = tcp::dial(&config.hostname, port).await?;
        let session = match self.kind {
            TransportKind::Tcp => Session::stream(stream, handler),
            TransportKind::Tls => Session::stream(tls::handshake(stream, config).await?, handler),
            TransportKind::WebSocket => {
                let ws = websocket::handshake(stream, config, port, false).await?;
                Session::websocket(ws, handler)
            }
            TransportKind::WebSocketTls => {
                let tls = tls::handshake(stream, config).await?;
                let ws = websocket::handshake(tls, config, port, true).await?;
                Session::websocket(ws, handler)
            }
        };
        Ok(session)
    }
}

impl fmt::Debug for StreamConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamConnection")
            .field("kind", &self.kind)
            .field("config", &*self.config.lock())
            .field("connected", &self.is_connected())
            .finish()
    }
}

#[async_trait]
impl Connection for StreamConnection {
    fn set_config(&self, config: &Value) -> Result<(), ConfigError> {
        let config = ConnectionConfig::from_value(config)?;
        debug!(
            transport = %self.kind,
            host = %config.hostname,
            port = config.port_for(self.kind),
            "configured"
        );
        *self.config.lock() = Some(config);
        Ok(())
    }

    fn set_handler(&self, handler: Weak<dyn ConnectionHandler>) {
        *self.handler.lock() = Some(handler);
    }

    async fn connect(&self) -> Result<(), ConnectError> {
        if self.is_connected() {
            return Err(ConnectError::AlreadyConnected);
        }
        let config = self.config().ok_or(ConnectError::NotConfigured)?;
        let handler = self.handler.lock().clone().ok_or(ConnectError::NoHandler)?;

        let port = config.port_for(self.kind);
        info!(transport = %self.kind, host = %config.hostname, port, "connecting");
        let session = self.open(&config, handler.clone()).await?;
        {
            let mut slot = self.session.lock();
            if slot.as_ref().map_or(false, Session::is_active) {
                return Err(ConnectError::AlreadyConnected);
            }
            *slot = Some(session);
        }
        info!(transport = %self.kind, host = %config.hostname, port, "connected");

        // Reading starts only after the handler has seen the connection, so
        // no data arrives before `on_connected`.
        if let Some(handler) = handler.upgrade() {
            handler.on_connected();
        }
        if let Some(session) = self.session.lock().as_mut() {
            session.start();
        }
        Ok(())
    }

    fn send(&self, data: &[u8]) {
        match self.session.lock().as_ref() {
            Some(session) => session.send(data),
            None => debug!(len = data.len(), "not connected, dropping outbound data"),
        }
    }

    async fn disconnect(&self) {
        let session = self.session.lock().take();
        match session {
            Some(session) => {
                session.close().await;
                info!(transport = %self.kind, "disconnected");
            }
            None => debug!(transport = %self.kind, "disconnect while not connected"),
        }
    }

    fn is_connected(&self) -> bool {
        self.session.lock().as_ref().map_or(false, Session::is_active)
    }
}
