//! Flat C interface for bot modules written in other languages.
//!
//! The host hands the plugin a [`BotClientApi`] table when the module is
//! attached; the plugin answers with its [`BotModuleApi`] table. Chat
//! messages cross the boundary as [`KeyValue`] arrays terminated by a NULL
//! key.

use std::ffi::{c_char, c_int, c_void, CStr, CString};
use std::mem::size_of;
use std::ptr::{self, NonNull};
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;
use tracing::{debug, error, warn};

use crate::bot::{BotModule, ClientHandle};
use crate::chat::ChatMessage;
use crate::error::ConfigError;

#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub struct KeyValue {
    pub key: *const c_char,
    pub value: *const c_char,
}

impl KeyValue {
    /// Array terminator.
    pub const END: KeyValue = KeyValue {
        key: ptr::null(),
        value: ptr::null(),
    };
}

/// Invoked for a registered command with the command word, its parameters
/// and the triggering message.
pub type BotCommandCallback = unsafe extern "C" fn(
    client: *mut c_void,
    command: *const c_char,
    parameters: *const c_char,
    message: *const KeyValue,
) -> c_int;

pub type BotModuleSetConfig =
    unsafe extern "C" fn(module: *mut BotModuleApi, json: *const c_char) -> c_int;

/// Table exported by the plugin.
#[repr(C)]
#[derive(Debug)]
pub struct BotModuleApi {
    pub size: usize,
    pub set_config: Option<BotModuleSetConfig>,
}

/// Table supplied by the host.
#[repr(C)]
#[derive(Debug)]
pub struct BotClientApi {
    pub size: usize,
    pub client: *mut c_void,
    pub register_bot_command: unsafe extern "C" fn(
        client: *mut c_void,
        command: *const c_char,
        callback: BotCommandCallback,
    ) -> c_int,
    pub send_message: unsafe extern "C" fn(client: *mut c_void, message: *const KeyValue) -> c_int,
}

pub type CCreate = unsafe extern "C" fn(api: *const BotClientApi) -> *mut BotModuleApi;
pub type CDestroy = unsafe extern "C" fn(module: *mut BotModuleApi);

/// A chat message laid out as a NULL-key terminated [`KeyValue`] array.
///
/// The pointers stay valid while this value lives.
#[derive(Debug)]
pub struct KeyValueArray {
    _strings: Vec<CString>,
    pairs: Vec<KeyValue>,
}

impl KeyValueArray {
    pub fn new(message: &ChatMessage) -> Self {
        let mut strings = Vec::with_capacity(message.len() * 2);
        for (key, value) in message.iter() {
            match (CString::new(key), CString::new(value)) {
                (Ok(key), Ok(value)) => {
                    strings.push(key);
                    strings.push(value);
                }
                _ => debug!(%key, "entry with NUL byte skipped"),
            }
        }
        let mut pairs: Vec<KeyValue> = strings
            .chunks_exact(2)
            .map(|pair| KeyValue {
                key: pair[0].as_ptr(),
                value: pair[1].as_ptr(),
            })
            .collect();
        pairs.push(KeyValue::END);
        Self {
            _strings: strings,
            pairs,
        }
    }

    pub fn as_ptr(&self) -> *const KeyValue {
        self.pairs.as_ptr()
    }

    /// Entries, not counting the terminator.
    pub fn len(&self) -> usize {
        self.pairs.len() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Read a NULL-key terminated array. A NULL value reads as empty.
///
/// # Safety
///
/// `pairs` must be NULL or point to a terminated array of valid C strings.
pub unsafe fn read_key_values(pairs: *const KeyValue) -> ChatMessage {
    let mut message = ChatMessage::new();
    if pairs.is_null() {
        return message;
    }
    let mut cursor = pairs;
    while !(*cursor).key.is_null() {
        let entry = *cursor;
        let value = if entry.value.is_null() {
            String::new()
        } else {
            CStr::from_ptr(entry.value).to_string_lossy().into_owned()
        };
        message.insert(CStr::from_ptr(entry.key).to_string_lossy().into_owned(), value);
        cursor = cursor.add(1);
    }
    message
}

unsafe fn client_from<'a>(client: *mut c_void) -> Option<&'a ClientHandle> {
    client.cast::<ClientHandle>().cast_const().as_ref()
}

unsafe extern "C" fn host_register_bot_command(
    client: *mut c_void,
    command: *const c_char,
    callback: BotCommandCallback,
) -> c_int {
    let Some(handle) = client_from(client) else {
        return -1;
    };
    if command.is_null() {
        return -1;
    }
    let Ok(command) = CStr::from_ptr(command).to_str() else {
        return -1;
    };

    // Each registered handler keeps the bridge alive for the callback.
    let bridge = {
        let raw = client.cast::<ClientHandle>().cast_const();
        Arc::increment_strong_count(raw);
        Arc::from_raw(raw)
    };
    let handler = move |word: &str, parameters: &str, message: &ChatMessage| {
        let (Ok(word), Ok(parameters)) = (CString::new(word), CString::new(parameters)) else {
            return;
        };
        let pairs = KeyValueArray::new(message);
        let client = Arc::as_ptr(&bridge).cast_mut().cast::<c_void>();
        let status = callback(client, word.as_ptr(), parameters.as_ptr(), pairs.as_ptr());
        if status < 0 {
            debug!(status, command = ?word, "plugin command handler failed");
        }
    };
    match handle.register_bot_command(command, handler) {
        Ok(()) => 0,
        Err(e) => {
            warn!(%command, error = %e, "plugin command rejected");
            -2
        }
    }
}

unsafe extern "C" fn host_send_message(client: *mut c_void, message: *const KeyValue) -> c_int {
    let Some(handle) = client_from(client) else {
        return -1;
    };
    if message.is_null() {
        return -1;
    }
    if handle.send_message(&read_key_values(message)) {
        0
    } else {
        -2
    }
}

struct Attached {
    module: NonNull<BotModuleApi>,
    // The plugin may keep pointers into both for the module's lifetime.
    _api: Box<BotClientApi>,
    _bridge: Arc<ClientHandle>,
}

/// A C ABI bot module.
///
/// The plugin's `create_instance` runs when the module is attached to a
/// client, since it needs the host table.
pub struct CBotModule {
    name: String,
    create: CCreate,
    destroy: CDestroy,
    attached: Mutex<Option<Attached>>,
}

// SAFETY: the module table is only touched under the mutex.
unsafe impl Send for CBotModule {}
unsafe impl Sync for CBotModule {}

impl CBotModule {
    pub fn new(name: impl Into<String>, create: CCreate, destroy: CDestroy) -> Self {
        Self {
            name: name.into(),
            create,
            destroy,
            attached: Mutex::new(None),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_attached(&self) -> bool {
        self.attached.lock().is_some()
    }
}

impl std::fmt::Debug for CBotModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CBotModule")
            .field("name", &self.name)
            .field("attached", &self.is_attached())
            .finish()
    }
}

impl BotModule for CBotModule {
    fn attach(&self, client: ClientHandle) {
        let mut attached = self.attached.lock();
        if attached.is_some() {
            warn!(plugin = %self.name, "module already attached");
            return;
        }
        let bridge = Arc::new(client);
        let api = Box::new(BotClientApi {
            size: size_of::<BotClientApi>(),
            client: Arc::as_ptr(&bridge).cast_mut().cast(),
            register_bot_command: host_register_bot_command,
            send_message: host_send_message,
        });
        // SAFETY: `api` outlives the module; it is dropped after `destroy`.
        let module = unsafe { (self.create)(&*api) };
        match NonNull::new(module) {
            Some(module) => {
                *attached = Some(Attached {
                    module,
                    _api: api,
                    _bridge: bridge,
                })
            }
            None => error!(plugin = %self.name, "plugin failed to construct an instance"),
        }
    }

    fn set_config(&self, config: &Value) -> Result<(), ConfigError> {
        let attached = self.attached.lock();
        let module = attached.as_ref().ok_or(ConfigError::NotAttached)?.module.as_ptr();
        let json = CString::new(config.to_string())
            .map_err(|_| ConfigError::invalid("config", "contains a NUL byte"))?;

        // SAFETY: `module` is live until `destroy`; `size` guards the read of
        // fields an older plugin may not have.
        let set_config = unsafe {
            if (*module).size >= size_of::<BotModuleApi>() {
                (*module).set_config
            } else {
                None
            }
        };
        let Some(set_config) = set_config else {
            debug!(plugin = %self.name, "plugin takes no configuration");
            return Ok(());
        };
        let status = unsafe { set_config(module, json.as_ptr()) };
        if status < 0 {
            return Err(ConfigError::invalid(
                "config",
                format!("plugin `{}` rejected configuration with status {status}", self.name),
            ));
        }
        Ok(())
    }
}

impl Drop for CBotModule {
    fn drop(&mut self) {
        if let Some(attached) = self.attached.get_mut().take() {
            // SAFETY: created by this module's `create` and released once.
            unsafe { (self.destroy)(attached.module.as_ptr()) };
        }
    }
}
