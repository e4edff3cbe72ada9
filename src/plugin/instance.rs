//! Component instances leased from the plugin registry.

use std::ops::Deref;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use libloading::Library;
use serde_json::Value;

use super::abi::NativeDestroy;
use crate::bot::{BotModule, ClientHandle};
use crate::chat::ChatMessage;
use crate::connection::{Connection, ConnectionHandler};
use crate::error::{ConfigError, ConnectError};
use crate::protocol::{MessageSink, Protocol};

/// One reference on a registry entry. Keeps the entry's library loaded.
#[derive(Debug)]
pub(crate) struct Lease {
    refcount: Arc<AtomicUsize>,
    _library: Option<Arc<Library>>,
}

impl Lease {
    pub(crate) fn new(refcount: &Arc<AtomicUsize>, library: Option<Arc<Library>>) -> Self {
        refcount.fetch_add(1, Ordering::AcqRel);
        Self {
            refcount: Arc::clone(refcount),
            _library: library,
        }
    }
}

impl Drop for Lease {
    fn drop(&mut self) {
        self.refcount.fetch_sub(1, Ordering::AcqRel);
    }
}

/// A component owned by its requester.
///
/// Dropping it destroys the component through the module that created it
/// and releases its reference on the registry entry.
pub struct Instance<T: ?Sized> {
    value: NonNull<Box<T>>,
    destroy: Option<NativeDestroy>,
    _lease: Lease,
}

// SAFETY: an instance is a uniquely owned `Box<T>`.
unsafe impl<T: ?Sized + Send> Send for Instance<T> {}
unsafe impl<T: ?Sized + Sync> Sync for Instance<T> {}

impl<T: ?Sized> Instance<T> {
    pub(crate) fn from_box(value: Box<T>, lease: Lease) -> Self {
        Self {
            value: NonNull::from(Box::leak(Box::new(value))),
            destroy: None,
            _lease: lease,
        }
    }

    /// Wrap a pointer produced by a plugin's native constructor.
    ///
    /// # Safety
    ///
    /// `value` must point to a live `Box<T>` that `destroy` frees.
    pub(crate) unsafe fn from_plugin(
        value: NonNull<Box<T>>,
        destroy: NativeDestroy,
        lease: Lease,
    ) -> Self {
        Self {
            value,
            destroy: Some(destroy),
            _lease: lease,
        }
    }
}

impl<T: ?Sized> Deref for Instance<T> {
    type Target = T;

    fn deref(&self) -> &T {
        // SAFETY: `value` stays valid until drop.
        unsafe { self.value.as_ref() }
    }
}

impl<T: ?Sized> Drop for Instance<T> {
    fn drop(&mut self) {
        // SAFETY: the pointer is released exactly once, by its allocator. The
        // lease, and with it the library, outlives this call.
        unsafe {
            match self.destroy {
                Some(destroy) => destroy(self.value.as_ptr().cast()),
                None => drop(Box::from_raw(self.value.as_ptr())),
            }
        }
    }
}

impl<T: ?Sized> std::fmt::Debug for Instance<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Instance")
            .field("plugin", &self.destroy.is_some())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl<T: Connection + ?Sized> Connection for Instance<T> {
    fn set_config(&self, config: &Value) -> Result<(), ConfigError> {
        (**self).set_config(config)
    }

    fn set_handler(&self, handler: Weak<dyn ConnectionHandler>) {
        (**self).set_handler(handler)
    }

    async fn connect(&self) -> Result<(), ConnectError> {
        (**self).connect().await
    }

    fn send(&self, data: &[u8]) {
        (**self).send(data)
    }

    async fn disconnect(&self) {
        (**self).disconnect().await
    }

    fn is_connected(&self) -> bool {
        (**self).is_connected()
    }
}

#[async_trait]
impl<T: Protocol + ?Sized> Protocol for Instance<T> {
    fn set_config(&self, config: &Value) -> Result<(), ConfigError> {
        (**self).set_config(config)
    }

    fn attach(&self, connection: Arc<dyn Connection>) {
        (**self).attach(connection)
    }

    fn set_sink(&self, sink: Weak<dyn MessageSink>) {
        (**self).set_sink(sink)
    }

    async fn connect(&self) -> Result<(), ConnectError> {
        (**self).connect().await
    }

    async fn disconnect(&self) {
        (**self).disconnect().await
    }

    fn send_message(&self, message: &ChatMessage) {
        (**self).send_message(message)
    }
}

impl<T: BotModule + ?Sized> BotModule for Instance<T> {
    fn attach(&self, client: ClientHandle) {
        (**self).attach(client)
    }

    fn set_config(&self, config: &Value) -> Result<(), ConfigError> {
        (**self).set_config(config)
    }
}
