//! A plugin declaring a native interface revision the host does not know.

use std::ffi::c_void;

use slirc_bot::plugin::abi::{ABI_KIND_NATIVE, NATIVE_ABI_VERSION};
use slirc_bot::plugin::{PluginAbi, PluginInfo};

#[no_mangle]
pub extern "C" fn plugin_info() -> *const PluginInfo {
    static INFO: PluginInfo = PluginInfo::new(
        "future",
        "Built against a newer plugin interface",
        PluginAbi {
            kind: ABI_KIND_NATIVE,
            version: NATIVE_ABI_VERSION + 1,
        },
    );
    &INFO
}

#[no_mangle]
pub extern "C" fn create_instance() -> *mut c_void {
    std::ptr::null_mut()
}

/// # Safety
///
/// Never called: the host refuses this plugin before creating instances.
#[no_mangle]
pub unsafe extern "C" fn destroy_instance(_instance: *mut c_void) {}
