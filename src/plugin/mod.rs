//! Named component resolution.
//!
//! A [`PluginLoader`] maps component names to constructors. Built-in
//! components are registered up front; any other name is looked up as a
//! shared library in the plugin directory on first use:
//!
//! ```text
//! <pluginDirectory>/libslircbot_<category>_<name>.so     (Linux)
//! <pluginDirectory>/slircbot_<category>_<name>.dll       (Windows)
//! ```
//!
//! where `<category>` is `connection`, `protocol` or `botmodule`. Libraries
//! export `create_instance` and `destroy_instance`, and optionally
//! `plugin_info` describing their ABI (see [`abi`]). Without `plugin_info`
//! the native ABI is assumed.
//!
//! Every instance holds a lease on its registry entry, so
//! [`PluginLoader::refcount`] reports how many are alive.

pub mod abi;
pub mod cabi;
mod instance;

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::ptr::NonNull;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use libloading::Library;
use parking_lot::Mutex;
use tracing::{debug, info};

use crate::bot::{BotModule, PingModule};
use crate::connection::{Connection, StreamConnection, TransportKind};
use crate::error::PluginError;
use crate::protocol::{IrcProtocol, Protocol};

pub use self::abi::{PluginAbi, PluginInfo};
pub use self::cabi::CBotModule;
pub use self::instance::Instance;

use self::abi::{
    NativeCreate, NativeDestroy, PluginInfoFn, ABI_KIND_C, ABI_KIND_NATIVE, C_ABI_VERSION,
    NATIVE_ABI_VERSION, SYMBOL_CREATE, SYMBOL_DESTROY, SYMBOL_INFO,
};
use self::cabi::{CCreate, CDestroy};
use self::instance::Lease;

/// Prefix of plugin library names.
pub const LIBRARY_PREFIX: &str = "slircbot";

/// Capability a component provides.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ComponentKind {
    Connection,
    Protocol,
    BotModule,
}

impl ComponentKind {
    /// Category used in library names.
    pub fn category(self) -> &'static str {
        match self {
            Self::Connection => "connection",
            Self::Protocol => "protocol",
            Self::BotModule => "botmodule",
        }
    }

    fn label(self) -> &'static str {
        match self {
            Self::Connection => "connection",
            Self::Protocol => "protocol",
            Self::BotModule => "bot module",
        }
    }
}

impl fmt::Display for ComponentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A resolved component, tagged with its capability.
#[derive(Debug)]
pub enum Component {
    Connection(Instance<dyn Connection>),
    Protocol(Instance<dyn Protocol>),
    BotModule(Instance<dyn BotModule>),
}

impl Component {
    pub fn kind(&self) -> ComponentKind {
        match self {
            Self::Connection(_) => ComponentKind::Connection,
            Self::Protocol(_) => ComponentKind::Protocol,
            Self::BotModule(_) => ComponentKind::BotModule,
        }
    }
}

pub type ConnectionFactory = Arc<dyn Fn() -> Box<dyn Connection> + Send + Sync>;
pub type ProtocolFactory = Arc<dyn Fn() -> Box<dyn Protocol> + Send + Sync>;
pub type BotModuleFactory = Arc<dyn Fn() -> Box<dyn BotModule> + Send + Sync>;

enum Constructor {
    Connection(ConnectionFactory),
    Protocol(ProtocolFactory),
    BotModule(BotModuleFactory),
    Native { create: NativeCreate, destroy: NativeDestroy },
    C { create: CCreate, destroy: CDestroy },
}

struct Entry {
    kind: ComponentKind,
    constructor: Constructor,
    library: Option<Arc<Library>>,
    refcount: Arc<AtomicUsize>,
}

impl Entry {
    fn new(kind: ComponentKind, constructor: Constructor, library: Option<Arc<Library>>) -> Self {
        Self {
            kind,
            constructor,
            library,
            refcount: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn instantiate(&self, name: &str) -> Result<Component, PluginError> {
        let lease = Lease::new(&self.refcount, self.library.clone());
        let component = match (&self.constructor, self.kind) {
            (Constructor::Connection(factory), _) => {
                Component::Connection(Instance::from_box(factory(), lease))
            }
            (Constructor::Protocol(factory), _) => {
                Component::Protocol(Instance::from_box(factory(), lease))
            }
            (Constructor::BotModule(factory), _) => {
                Component::BotModule(Instance::from_box(factory(), lease))
            }
            (Constructor::Native { create, destroy }, ComponentKind::Connection) => {
                Component::Connection(native(name, *create, *destroy, lease)?)
            }
            (Constructor::Native { create, destroy }, ComponentKind::Protocol) => {
                Component::Protocol(native(name, *create, *destroy, lease)?)
            }
            (Constructor::Native { create, destroy }, ComponentKind::BotModule) => {
                Component::BotModule(native(name, *create, *destroy, lease)?)
            }
            (Constructor::C { create, destroy }, _) => {
                let module: Box<dyn BotModule> = Box::new(CBotModule::new(name, *create, *destroy));
                Component::BotModule(Instance::from_box(module, lease))
            }
        };
        Ok(component)
    }
}

fn native<T: ?Sized>(
    name: &str,
    create: NativeCreate,
    destroy: NativeDestroy,
    lease: Lease,
) -> Result<Instance<T>, PluginError> {
    // SAFETY: native plugins return a leaked `Box<Box<dyn Trait>>` for the
    // category they were loaded as.
    let raw = unsafe { create() };
    let value = NonNull::new(raw.cast::<Box<T>>())
        .ok_or_else(|| PluginError::NullInstance(name.to_string()))?;
    Ok(unsafe { Instance::from_plugin(value, destroy, lease) })
}

/// Resolves component names to instances and caches loaded libraries.
pub struct PluginLoader {
    directory: PathBuf,
    entries: Mutex<HashMap<String, Entry>>,
}

impl PluginLoader {
    /// An empty registry loading libraries from `directory`.
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// A registry with the built-in components: `tcp`, `tls`, `ws` and `wss`
    /// connections, the `irc` protocol and the `ping` bot module.
    pub fn with_builtins(directory: impl Into<PathBuf>) -> Self {
        let loader = Self::new(directory);
        for kind in TransportKind::ALL {
            loader.register_connection(kind.name(), move || Box::new(StreamConnection::new(kind)));
        }
        loader.register_protocol("irc", || Box::new(IrcProtocol::new()));
        loader.register_bot_module("ping", || Box::new(PingModule::new()));
        loader
    }

    /// The directory holding the running executable.
    pub fn default_directory() -> PathBuf {
        std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(Path::to_path_buf))
            .unwrap_or_else(|| PathBuf::from("."))
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn register_connection<F>(&self, name: &str, factory: F)
    where
        F: Fn() -> Box<dyn Connection> + Send + Sync + 'static,
    {
        self.register(name, ComponentKind::Connection, Constructor::Connection(Arc::new(factory)));
    }

    pub fn register_protocol<F>(&self, name: &str, factory: F)
    where
        F: Fn() -> Box<dyn Protocol> + Send + Sync + 'static,
    {
        self.register(name, ComponentKind::Protocol, Constructor::Protocol(Arc::new(factory)));
    }

    pub fn register_bot_module<F>(&self, name: &str, factory: F)
    where
        F: Fn() -> Box<dyn BotModule> + Send + Sync + 'static,
    {
        self.register(name, ComponentKind::BotModule, Constructor::BotModule(Arc::new(factory)));
    }

    /// Register a C ABI bot module from its entry points.
    pub fn register_c_bot_module(&self, name: &str, create: CCreate, destroy: CDestroy) {
        self.register(name, ComponentKind::BotModule, Constructor::C { create, destroy });
    }

    fn register(&self, name: &str, kind: ComponentKind, constructor: Constructor) {
        let previous = self
            .entries
            .lock()
            .insert(name.to_string(), Entry::new(kind, constructor, None));
        if previous.is_some() {
            debug!(%name, %kind, "replaced registered component");
        }
    }

    /// Library file that would provide `name` as a `kind`.
    pub fn library_path(&self, kind: ComponentKind, name: &str) -> PathBuf {
        let stem = format!("{LIBRARY_PREFIX}_{}_{name}", kind.category());
        self.directory.join(libloading::library_filename(stem))
    }

    /// Create an instance of `name`, loading its library on first use.
    pub fn resolve(&self, name: &str, kind: ComponentKind) -> Result<Component, PluginError> {
        let mut entries = self.entries.lock();
        if !entries.contains_key(name) {
            let entry = self.load(name, kind)?;
            entries.insert(name.to_string(), entry);
        }
        let Some(entry) = entries.get(name) else {
            return Err(PluginError::NullInstance(name.to_string()));
        };
        if entry.kind != kind {
            return Err(PluginError::KindMismatch {
                name: name.to_string(),
                expected: kind.label(),
                actual: entry.kind.label(),
            });
        }
        let component = entry.instantiate(name)?;
        let refcount = entry.refcount.load(Ordering::Acquire);
        debug!(%name, %kind, refcount, "resolved component");
        Ok(component)
    }

    pub fn resolve_connection(&self, name: &str) -> Result<Instance<dyn Connection>, PluginError> {
        match self.resolve(name, ComponentKind::Connection)? {
            Component::Connection(instance) => Ok(instance),
            other => Err(mismatch(name, ComponentKind::Connection, &other)),
        }
    }

    pub fn resolve_protocol(&self, name: &str) -> Result<Instance<dyn Protocol>, PluginError> {
        match self.resolve(name, ComponentKind::Protocol)? {
            Component::Protocol(instance) => Ok(instance),
            other => Err(mismatch(name, ComponentKind::Protocol, &other)),
        }
    }

    pub fn resolve_bot_module(&self, name: &str) -> Result<Instance<dyn BotModule>, PluginError> {
        match self.resolve(name, ComponentKind::BotModule)? {
            Component::BotModule(instance) => Ok(instance),
            other => Err(mismatch(name, ComponentKind::BotModule, &other)),
        }
    }

    /// Live instances of `name`, or `None` if it was never resolved or
    /// registered.
    pub fn refcount(&self, name: &str) -> Option<usize> {
        self.entries
            .lock()
            .get(name)
            .map(|entry| entry.refcount.load(Ordering::Acquire))
    }

    /// Whether `name` is backed by a loaded library.
    pub fn is_loaded(&self, name: &str) -> bool {
        self.entries
            .lock()
            .get(name)
            .map_or(false, |entry| entry.library.is_some())
    }

    fn load(&self, name: &str, kind: ComponentKind) -> Result<Entry, PluginError> {
        let path = self.library_path(kind, name);
        debug!(%name, path = %path.display(), "loading plugin");

        // SAFETY: loading runs the library's initializers; plugins are
        // trusted code from the configured directory.
        let library = unsafe { Library::new(&path) }.map_err(|source| PluginError::Load {
            name: name.to_string(),
            path: path.display().to_string(),
            source,
        })?;

        let info = unsafe { library.get::<PluginInfoFn>(SYMBOL_INFO.as_bytes()) }
            .ok()
            .and_then(|probe| unsafe { probe().as_ref().copied() });
        let abi = info.map_or(PluginAbi::NATIVE, |info| info.abi);

        let constructor = match (abi.kind, abi.version) {
            (ABI_KIND_NATIVE, NATIVE_ABI_VERSION) => Constructor::Native {
                create: symbol::<NativeCreate>(&library, name, SYMBOL_CREATE)?,
                destroy: symbol::<NativeDestroy>(&library, name, SYMBOL_DESTROY)?,
            },
            (ABI_KIND_C, C_ABI_VERSION) if kind == ComponentKind::BotModule => Constructor::C {
                create: symbol::<CCreate>(&library, name, SYMBOL_CREATE)?,
                destroy: symbol::<CDestroy>(&library, name, SYMBOL_DESTROY)?,
            },
            (kind, version) => {
                return Err(PluginError::UnsupportedAbi {
                    name: name.to_string(),
                    kind,
                    version,
                })
            }
        };

        match info {
            Some(info) => info!(
                %name,
                plugin = %info.name(),
                description = %info.description(),
                abi = abi.kind,
                "loaded plugin"
            ),
            None => info!(%name, path = %path.display(), "loaded plugin"),
        }
        Ok(Entry::new(kind, constructor, Some(Arc::new(library))))
    }
}

impl fmt::Debug for PluginLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let entries = self.entries.lock();
        let mut names: Vec<&str> = entries.keys().map(String::as_str).collect();
        names.sort_unstable();
        f.debug_struct("PluginLoader")
            .field("directory", &self.directory)
            .field("components", &names)
            .finish()
    }
}

fn symbol<T: Copy>(library: &Library, name: &str, symbol: &'static str) -> Result<T, PluginError> {
    // SAFETY: the symbol types are fixed by the plugin ABI. The library is
    // kept loaded as long as the returned pointer may be called.
    unsafe { library.get::<T>(symbol.as_bytes()) }
        .map(|sym| *sym)
        .map_err(|source| PluginError::MissingSymbol {
            name: name.to_string(),
            symbol,
            source,
        })
}

fn mismatch(name: &str, expected: ComponentKind, actual: &Component) -> PluginError {
    PluginError::KindMismatch {
        name: name.to_string(),
        expected: expected.label(),
        actual: actual.kind().label(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_library_path() {
        let loader = PluginLoader::new("/opt/slircbot");
        let path = loader.library_path(ComponentKind::BotModule, "quote");
        let file = path.file_name().unwrap().to_string_lossy().into_owned();
        assert!(file.contains("slircbot_botmodule_quote"));
        assert!(path.starts_with("/opt/slircbot"));
    }

    #[test]
    fn test_builtins_resolve() {
        let loader = PluginLoader::with_builtins(".");
        for name in ["tcp", "tls", "ws", "wss"] {
            assert!(loader.resolve_connection(name).is_ok());
        }
        assert!(loader.resolve_protocol("irc").is_ok());
        assert!(loader.resolve_bot_module("ping").is_ok());
        assert!(!loader.is_loaded("irc"));
    }

    #[test]
    fn test_refcount_follows_instances() {
        let loader = PluginLoader::with_builtins(".");
        assert_eq!(loader.refcount("tcp"), Some(0));
        let a = loader.resolve_connection("tcp").unwrap();
        let b = loader.resolve_connection("tcp").unwrap();
        assert_eq!(loader.refcount("tcp"), Some(2));
        drop(a);
        assert_eq!(loader.refcount("tcp"), Some(1));
        drop(b);
        assert_eq!(loader.refcount("tcp"), Some(0));
    }

    #[test]
    fn test_kind_mismatch() {
        let loader = PluginLoader::with_builtins(".");
        let err = loader.resolve_protocol("tcp").unwrap_err();
        assert!(matches!(
            err,
            PluginError::KindMismatch {
                expected: "protocol",
                actual: "connection",
                ..
            }
        ));
        assert_eq!(loader.refcount("tcp"), Some(0));
    }

    #[test]
    fn test_missing_library() {
        let dir = tempfile::tempdir().unwrap();
        let loader = PluginLoader::new(dir.path());
        let err = loader.resolve_bot_module("quote").unwrap_err();
        assert!(matches!(err, PluginError::Load { .. }));
        assert!(err.to_string().contains("quote"));
        assert_eq!(loader.refcount("quote"), None);
    }

    #[test]
    fn test_default_directory_exists() {
        assert!(PluginLoader::default_directory().is_dir());
    }
}
