//! Entry points and descriptors shared by every plugin library.

use std::ffi::{c_char, c_void};

/// Rust trait objects built with the same toolchain as the host.
pub const ABI_KIND_NATIVE: u32 = 0;
/// Flat C structures, usable from any language.
pub const ABI_KIND_C: u32 = 1;

pub const NATIVE_ABI_VERSION: u32 = 1;
pub const C_ABI_VERSION: u32 = 1;

pub const SYMBOL_CREATE: &str = "create_instance";
pub const SYMBOL_DESTROY: &str = "destroy_instance";
pub const SYMBOL_INFO: &str = "plugin_info";

/// Native constructor: returns a leaked `Box<Box<dyn Trait>>`.
pub type NativeCreate = unsafe extern "C" fn() -> *mut c_void;
/// Native destructor for pointers returned by [`NativeCreate`].
pub type NativeDestroy = unsafe extern "C" fn(*mut c_void);
/// Optional ABI probe.
pub type PluginInfoFn = unsafe extern "C" fn() -> *const PluginInfo;

#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PluginAbi {
    pub kind: u32,
    pub version: u32,
}

impl PluginAbi {
    pub const NATIVE: PluginAbi = PluginAbi {
        kind: ABI_KIND_NATIVE,
        version: NATIVE_ABI_VERSION,
    };

    pub const C: PluginAbi = PluginAbi {
        kind: ABI_KIND_C,
        version: C_ABI_VERSION,
    };
}

/// Descriptor returned by `plugin_info`.
#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub struct PluginInfo {
    pub name: [c_char; 32],
    pub description: [c_char; 128],
    pub abi: PluginAbi,
}

impl PluginInfo {
    /// Build a descriptor, truncating the strings to fit with a NUL.
    pub const fn new(name: &str, description: &str, abi: PluginAbi) -> Self {
        Self {
            name: fixed(name.as_bytes()),
            description: fixed(description.as_bytes()),
            abi,
        }
    }

    pub fn name(&self) -> String {
        from_fixed(&self.name)
    }

    pub fn description(&self) -> String {
        from_fixed(&self.description)
    }
}

const fn fixed<const N: usize>(bytes: &[u8]) -> [c_char; N] {
    let mut out = [0; N];
    let mut i = 0;
    while i < bytes.len() && i + 1 < N && bytes[i] != 0 {
        out[i] = bytes[i] as c_char;
        i += 1;
    }
    out
}

fn from_fixed(chars: &[c_char]) -> String {
    let bytes: Vec<u8> = chars
        .iter()
        .take_while(|&&c| c != 0)
        .map(|&c| c as u8)
        .collect();
    String::from_utf8_lossy(&bytes).into_owned()
}

/// Export the native entry points for a plugin type.
///
/// `$trait` is one of `Connection`, `Protocol` or `BotModule` from this
/// crate; `$constructor` builds the instance.
///
/// ```ignore
/// slirc_bot::export_plugin!(
///     slirc_bot::bot::BotModule,
///     "quote",
///     "Replies with a random quote",
///     QuoteModule::default()
/// );
/// ```
#[macro_export]
macro_rules! export_plugin {
    ($trait:path, $name:expr, $description:expr, $constructor:expr) => {
        #[no_mangle]
        pub extern "C" fn plugin_info() -> *const $crate::plugin::PluginInfo {
            static INFO: $crate::plugin::PluginInfo = $crate::plugin::PluginInfo::new(
                $name,
                $description,
                $crate::plugin::PluginAbi::NATIVE,
            );
            &INFO
        }

        #[no_mangle]
        pub extern "C" fn create_instance() -> *mut ::std::ffi::c_void {
            let instance: ::std::boxed::Box<dyn $trait> = ::std::boxed::Box::new($constructor);
            ::std::boxed::Box::into_raw(::std::boxed::Box::new(instance)).cast()
        }

        /// # Safety
        ///
        /// `instance` must come from `create_instance` and not be used again.
        #[no_mangle]
        pub unsafe extern "C" fn destroy_instance(instance: *mut ::std::ffi::c_void) {
            if !instance.is_null() {
                drop(::std::boxed::Box::from_raw(
                    instance.cast::<::std::boxed::Box<dyn $trait>>(),
                ));
            }
        }
    };
}
