use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};
use tracing::{debug, error, info, warn};

use super::commands::{CommandHandler, CommandTable};
use super::BotModule;
use crate::chat::{ChatMessage, NETWORK};
use crate::config::ClientConfig;
use crate::connection::Connection;
use crate::error::{CommandError, PluginError};
use crate::plugin::PluginLoader;
use crate::protocol::{MessageSink, Protocol};

struct Network {
    name: String,
    protocol: Arc<dyn Protocol>,
    // Referenced weakly by the protocol.
    _sink: Arc<NetworkSink>,
}

#[derive(Default)]
struct ClientInner {
    commands: Mutex<CommandTable>,
    networks: RwLock<Vec<Network>>,
}

impl ClientInner {
    fn dispatch(&self, message: &ChatMessage) {
        let invocations = self.commands.lock().matches(message);
        for invocation in invocations {
            debug!(
                network = message.network().unwrap_or_default(),
                command = %invocation.command,
                sender = message.sender().unwrap_or_default(),
                "bot command"
            );
            (invocation.handler)(&invocation.command, &invocation.parameters, message);
        }
    }

    fn protocol_for(&self, message: &ChatMessage) -> Option<Arc<dyn Protocol>> {
        let networks = self.networks.read();
        let network = match message.network() {
            Some(name) => networks.iter().find(|network| network.name == name),
            None => networks.first(),
        };
        network.map(|network| Arc::clone(&network.protocol))
    }

    fn send_message(&self, message: &ChatMessage) -> bool {
        match self.protocol_for(message) {
            Some(protocol) => {
                protocol.send_message(message);
                true
            }
            None => {
                warn!(
                    network = message.network().unwrap_or_default(),
                    "no such network, message dropped"
                );
                false
            }
        }
    }
}

/// Stamps inbound messages with their network before dispatch.
struct NetworkSink {
    name: String,
    client: Weak<ClientInner>,
}

impl MessageSink for NetworkSink {
    fn on_message(&self, mut message: ChatMessage) {
        message.insert(NETWORK, self.name.as_str());
        if let Some(client) = self.client.upgrade() {
            client.dispatch(&message);
        }
    }
}

/// What bot modules hold on to: command registration and message sending.
///
/// The handle does not keep the client alive.
#[derive(Clone, Default)]
pub struct ClientHandle {
    inner: Weak<ClientInner>,
}

impl ClientHandle {
    /// A handle to no client.
    pub fn detached() -> Self {
        Self::default()
    }

    /// Register a handler for a prefixed command such as `!quote`.
    /// A later registration of the same command replaces this one.
    pub fn register_bot_command<F>(&self, command: &str, handler: F) -> Result<(), CommandError>
    where
        F: Fn(&str, &str, &ChatMessage) + Send + Sync + 'static,
    {
        self.register_handler(command, Arc::new(handler))
    }

    pub fn register_handler(
        &self,
        command: &str,
        handler: CommandHandler,
    ) -> Result<(), CommandError> {
        let inner = self.inner.upgrade().ok_or(CommandError::Detached)?;
        let replaced = inner.commands.lock().register(command, handler)?;
        if replaced {
            debug!(%command, "bot command replaced");
        } else {
            debug!(%command, "bot command registered");
        }
        Ok(())
    }

    /// Send through the message's `network`, or the first network when
    /// unset. Returns false when there is nowhere to send.
    pub fn send_message(&self, message: &ChatMessage) -> bool {
        self.inner
            .upgrade()
            .map_or(false, |inner| inner.send_message(message))
    }

    pub fn is_attached(&self) -> bool {
        self.inner.strong_count() > 0
    }
}

impl std::fmt::Debug for ClientHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientHandle")
            .field("attached", &self.is_attached())
            .finish()
    }
}

/// Owns the networks and bot modules and routes commands between them.
pub struct BotClient {
    inner: Arc<ClientInner>,
    modules: Vec<(String, Arc<dyn BotModule>)>,
}

impl BotClient {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(ClientInner::default()),
            modules: Vec::new(),
        }
    }

    /// Build a client from configuration, resolving every component
    /// through `loader`.
    ///
    /// Networks and modules that fail to resolve or configure are logged
    /// and skipped.
    pub fn from_config(config: &ClientConfig, loader: &PluginLoader) -> Self {
        let mut client = Self::new();
        for (index, network) in config.networks.iter().enumerate() {
            let name = network.name(index);
            let result = client.build_network(&name, network, loader);
            if let Err(e) = result {
                error!(network = %name, error = %e, "network skipped");
            }
        }
        for module in &config.modules {
            let instance = match loader.resolve_bot_module(&module.kind) {
                Ok(instance) => instance,
                Err(e) => {
                    error!(module = %module.kind, error = %e, "bot module skipped");
                    continue;
                }
            };
            client.add_module(&module.kind, Arc::new(instance));
            let Some((_, added)) = client.modules.last() else {
                continue;
            };
            if let Err(e) = added.set_config(&module.config) {
                error!(
                    module = %module.kind,
                    error = %e,
                    status = e.status(),
                    "bot module configuration rejected"
                );
            }
        }
        client
    }

    fn build_network(
        &mut self,
        name: &str,
        network: &crate::config::NetworkConfig,
        loader: &PluginLoader,
    ) -> Result<(), NetworkError> {
        let connection = loader.resolve_connection(&network.connection.kind)?;
        connection.set_config(&network.connection.config)?;
        let protocol = loader.resolve_protocol(&network.protocol.kind)?;
        protocol.set_config(&network.protocol.config)?;
        self.add_network(name, Arc::new(connection), Arc::new(protocol));
        Ok(())
    }

    /// Wire `protocol` over `connection` as network `name`.
    pub fn add_network(
        &mut self,
        name: &str,
        connection: Arc<dyn Connection>,
        protocol: Arc<dyn Protocol>,
    ) {
        let sink = Arc::new(NetworkSink {
            name: name.to_string(),
            client: Arc::downgrade(&self.inner),
        });
        protocol.attach(connection);
        let weak: Weak<NetworkSink> = Arc::downgrade(&sink);
        protocol.set_sink(weak);
        self.inner.networks.write().push(Network {
            name: name.to_string(),
            protocol,
            _sink: sink,
        });
        debug!(network = %name, "network added");
    }

    /// Attach a bot module to this client.
    pub fn add_module(&mut self, name: &str, module: Arc<dyn BotModule>) {
        module.attach(self.handle());
        self.modules.push((name.to_string(), module));
        debug!(module = %name, "bot module attached");
    }

    pub fn handle(&self) -> ClientHandle {
        ClientHandle {
            inner: Arc::downgrade(&self.inner),
        }
    }

    pub fn network_names(&self) -> Vec<String> {
        self.inner
            .networks
            .read()
            .iter()
            .map(|network| network.name.clone())
            .collect()
    }

    pub fn module_names(&self) -> Vec<&str> {
        self.modules.iter().map(|(name, _)| name.as_str()).collect()
    }

    fn protocols(&self) -> Vec<(String, Arc<dyn Protocol>)> {
        self.inner
            .networks
            .read()
            .iter()
            .map(|network| (network.name.clone(), Arc::clone(&network.protocol)))
            .collect()
    }

    /// Connect every network. Returns how many connected.
    pub async fn run(&self) -> usize {
        let mut connected = 0;
        for (name, protocol) in self.protocols() {
            match protocol.connect().await {
                Ok(()) => {
                    info!(network = %name, "network connected");
                    connected += 1;
                }
                Err(e) => error!(network = %name, error = %e, "connect failed"),
            }
        }
        connected
    }

    /// Disconnect every network.
    pub async fn shutdown(&self) {
        for (name, protocol) in self.protocols() {
            protocol.disconnect().await;
            debug!(network = %name, "network shut down");
        }
    }

    /// Route an inbound message to matching commands.
    pub fn on_message(&self, message: &ChatMessage) {
        self.inner.dispatch(message);
    }

    pub fn register_bot_command<F>(&self, command: &str, handler: F) -> Result<(), CommandError>
    where
        F: Fn(&str, &str, &ChatMessage) + Send + Sync + 'static,
    {
        self.handle().register_bot_command(command, handler)
    }

    pub fn send_message(&self, message: &ChatMessage) -> bool {
        self.inner.send_message(message)
    }
}

impl Default for BotClient {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for BotClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BotClient")
            .field("networks", &self.network_names())
            .field("modules", &self.module_names())
            .field("commands", &*self.inner.commands.lock())
            .finish()
    }
}

#[derive(Debug, thiserror::Error)]
enum NetworkError {
    #[error(transparent)]
    Plugin(#[from] PluginError),
    #[error(transparent)]
    Config(#[from] crate::error::ConfigError),
}
