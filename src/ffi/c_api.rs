//! # C API for Native Callbacks
//!
//! Native plugins complete pending results by calling these functions with
//! the handle they were given. Payloads are limited to types with a stable
//! C representation; strings are copied into an owned `String`.
//!
//! Every function reports a status code instead of failing, and none of them
//! unwind across the boundary.

use crate::registry::{CallbackHandle, CallbackRegistry};
use std::ffi::CStr;
use std::os::raw::{c_char, c_int};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, OnceLock};
use tracing::{debug, warn};

/// Process-wide registry reachable from native code
static NATIVE_REGISTRY: OnceLock<Arc<CallbackRegistry>> = OnceLock::new();

pub const STATUS_RESOLVED: c_int = 1;
pub const STATUS_UNKNOWN_HANDLE: c_int = 0;
pub const STATUS_TYPE_MISMATCH: c_int = -1;
pub const STATUS_CONSUMER_DROPPED: c_int = -2;
pub const STATUS_UNAVAILABLE: c_int = -3;
pub const STATUS_INVALID_INPUT: c_int = -4;
pub const STATUS_INTERNAL_PANIC: c_int = -5;

/// Install the registry native callbacks resolve against
///
/// Only the first installation takes effect; returns whether this call won.
pub fn install_native_registry(registry: Arc<CallbackRegistry>) -> bool {
    let installed = NATIVE_REGISTRY.set(registry).is_ok();
    if installed {
        debug!("Native callback registry installed");
    } else {
        warn!("Native callback registry already installed - keeping the existing one");
    }
    installed
}

pub fn native_registry() -> Option<&'static Arc<CallbackRegistry>> {
    NATIVE_REGISTRY.get()
}

fn with_registry(operation: impl FnOnce(&CallbackRegistry) -> c_int) -> c_int {
    let Some(registry) = NATIVE_REGISTRY.get() else {
        return STATUS_UNAVAILABLE;
    };
    catch_unwind(AssertUnwindSafe(|| operation(registry))).unwrap_or_else(|payload| {
        let error = crate::error::DispatchError::from_panic(payload);
        warn!(error = %error, "Panic caught at the native boundary");
        STATUS_INTERNAL_PANIC
    })
}

fn resolve_native<T: Send + 'static>(handle: c_int, value: T) -> c_int {
    with_registry(|registry| {
        registry
            .resolve(CallbackHandle::from_raw(handle), value)
            .status_code()
    })
}

/// Resolve a `bool` callback
#[no_mangle]
pub extern "C" fn engine_bridge_resolve_bool(handle: c_int, value: bool) -> c_int {
    resolve_native(handle, value)
}

/// Resolve an `i32` callback
#[no_mangle]
pub extern "C" fn engine_bridge_resolve_i32(handle: c_int, value: i32) -> c_int {
    resolve_native(handle, value)
}

/// Resolve an `i64` callback
#[no_mangle]
pub extern "C" fn engine_bridge_resolve_i64(handle: c_int, value: i64) -> c_int {
    resolve_native(handle, value)
}

/// Resolve an `f64` callback
#[no_mangle]
pub extern "C" fn engine_bridge_resolve_f64(handle: c_int, value: f64) -> c_int {
    resolve_native(handle, value)
}

/// Resolve a `String` callback from a nul-terminated UTF-8 string
///
/// # Safety
///
/// - `value` must be null or a valid nul-terminated C string
/// - The string is copied; the caller keeps ownership of `value`
#[no_mangle]
pub unsafe extern "C" fn engine_bridge_resolve_string(handle: c_int, value: *const c_char) -> c_int {
    if value.is_null() {
        return STATUS_INVALID_INPUT;
    }

    // SAFETY: Caller guarantees value is a valid null-terminated C string
    let owned = match unsafe { CStr::from_ptr(value) }.to_str() {
        Ok(s) => s.to_owned(),
        Err(_) => return STATUS_INVALID_INPUT,
    };

    resolve_native(handle, owned)
}

/// Drop a pending callback without completing it
///
/// Returns 1 if an entry was removed, 0 if the handle was unknown.
#[no_mangle]
pub extern "C" fn engine_bridge_abandon(handle: c_int) -> c_int {
    with_registry(|registry| c_int::from(registry.abandon(CallbackHandle::from_raw(handle))))
}

/// Number of callbacks still waiting for resolution
#[no_mangle]
pub extern "C" fn engine_bridge_pending_count() -> c_int {
    with_registry(|registry| c_int::try_from(registry.len()).unwrap_or(c_int::MAX))
}
