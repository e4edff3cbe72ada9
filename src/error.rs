//! Error types for the bot framework.
//!
//! Each concern gets its own enum: configuration, connection establishment,
//! plugin resolution, line parsing and bot command registration. Protocol
//! anomalies on an established session are never surfaced as errors; they
//! are logged and dropped by the protocol layer.

use thiserror::Error;

/// Errors produced while applying a configuration document to a component.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// The document could not be deserialized.
    #[error("malformed configuration: {0}")]
    Parse(#[from] serde_json::Error),

    /// A field was present but unusable.
    #[error("invalid configuration field `{field}`: {reason}")]
    Invalid {
        /// Name of the offending field.
        field: &'static str,
        /// Why it was rejected.
        reason: String,
    },

    /// The configuration file could not be read.
    #[error("cannot read configuration: {0}")]
    Io(#[from] std::io::Error),

    /// The component needs to be attached to a client before configuring.
    #[error("component is not attached to a client")]
    NotAttached,
}

impl ConfigError {
    /// Shorthand for [`ConfigError::Invalid`].
    pub fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field,
            reason: reason.into(),
        }
    }

    /// Negative status code reported across the C plugin boundary.
    pub fn status(&self) -> i32 {
        match self {
            Self::Parse(_) => -1,
            Self::Invalid { .. } => -2,
            Self::Io(_) => -3,
            Self::NotAttached => -4,
        }
    }
}

/// Errors produced while establishing a connection.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConnectError {
    /// `connect` was called before a usable configuration was applied.
    #[error("connection is not configured")]
    NotConfigured,

    /// The connection is already established.
    #[error("connection is already active")]
    AlreadyConnected,

    /// No protocol handler has been attached.
    #[error("no protocol attached to connection")]
    NoHandler,

    /// The protocol has no connection to drive.
    #[error("no connection attached to protocol")]
    NoConnection,

    /// DNS resolution or TCP connect failed.
    #[error("cannot connect to {address}: {source}")]
    Io {
        /// The `host:port` that was dialed.
        address: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The TLS handshake or TLS setup failed.
    #[error("tls error: {0}")]
    Tls(String),

    /// The WebSocket handshake failed.
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
}

/// Errors produced while resolving a named component.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum PluginError {
    /// The shared library could not be loaded.
    #[error("cannot load plugin `{name}` from {path}: {source}")]
    Load {
        /// Component name.
        name: String,
        /// Library path that was tried.
        path: String,
        /// Platform error text.
        #[source]
        source: libloading::Error,
    },

    /// A required entry point is missing from the library.
    #[error("plugin `{name}` is missing symbol `{symbol}`: {source}")]
    MissingSymbol {
        /// Component name.
        name: String,
        /// Symbol that failed to resolve.
        symbol: &'static str,
        /// Platform error text.
        #[source]
        source: libloading::Error,
    },

    /// The plugin advertises an ABI this host does not speak.
    #[error("plugin `{name}` uses unsupported abi kind {kind} version {version}")]
    UnsupportedAbi {
        /// Component name.
        name: String,
        /// Advertised ABI kind.
        kind: u32,
        /// Advertised ABI version.
        version: u32,
    },

    /// The component exists but provides a different capability.
    #[error("component `{name}` is a {actual}, not a {expected}")]
    KindMismatch {
        /// Component name.
        name: String,
        /// Requested kind.
        expected: &'static str,
        /// Kind actually provided.
        actual: &'static str,
    },

    /// The plugin constructor returned no instance.
    #[error("plugin `{0}` failed to construct an instance")]
    NullInstance(String),
}

/// Errors encountered when parsing a single IRC line.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum MessageParseError {
    /// The line was empty.
    #[error("empty message")]
    EmptyMessage,

    /// No command token was present.
    #[error("missing command")]
    MissingCommand,

    /// The command token was not a word or a three digit numeric.
    #[error("invalid command: {0}")]
    InvalidCommand(String),
}

/// Errors produced when registering a bot command.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum CommandError {
    /// The command string does not start with a punctuation prefix.
    #[error("command `{0}` has no prefix")]
    MissingPrefix(String),

    /// The command string has a prefix but no command word.
    #[error("command `{0}` has no command word")]
    MissingWord(String),

    /// The command word contains whitespace.
    #[error("command `{0}` contains whitespace")]
    Whitespace(String),

    /// The bot client the handle refers to is gone.
    #[error("bot client no longer exists")]
    Detached,
}
