//! DAG-ops sub-facade (feature `dag-ops`): the part of the stable ABI an
//! actor body uses to extend the graph rather than just move bytes through
//! it (tool-call loop unrolling, `spec.md` §9).

use std::collections::HashMap;
use std::ffi::CStr;
use std::os::raw::c_char;
use std::sync::Arc;

use skein_core::{Errno, Handle};
use skein_dag::NodeRef;

use crate::context::with_current;

const NO_CONTEXT: i64 = -(Errno::Ebadf as i64);

unsafe fn str_from_raw(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    CStr::from_ptr(ptr).to_str().ok().map(str::to_owned)
}

/// Creates a value node holding `bytes[..len]`, already `finished`. Returns
/// its raw handle, or a negative errno.
///
/// # Safety
/// `bytes` must point to at least `len` readable bytes; `explain` must be a
/// valid NUL-terminated C string or null.
#[no_mangle]
pub unsafe extern "C" fn skein_dag_value_node(bytes: *const u8, len: u32, explain: *const c_char) -> i64 {
    if bytes.is_null() && len != 0 {
        return -(Errno::Einval as i64);
    }
    let data = if len == 0 { &[][..] } else { std::slice::from_raw_parts(bytes, len as usize) };
    let explain = str_from_raw(explain);
    with_current(|rt| rt.value_node(data.to_vec(), explain).as_u32() as i64).unwrap_or(NO_CONTEXT)
}

/// Appends `node` (a raw handle) as a target of alias `name`, creating the
/// alias if it doesn't exist yet. Returns 0 on success, or a negative
/// errno.
///
/// # Safety
/// `name` must be a valid, NUL-terminated C string.
#[no_mangle]
pub unsafe extern "C" fn skein_dag_alias(name: *const c_char, node: u32) -> i32 {
    let Some(name) = str_from_raw(name) else {
        return -(Errno::Einval as i32);
    };
    let Some(target) = Handle::from_raw(node) else {
        return -(Errno::Einval as i32);
    };
    with_current(|rt| match rt.alias(name, Some(target)) {
        Ok(()) => 0,
        Err(_) => -(Errno::Einval as i32),
    })
    .unwrap_or(-(Errno::Ebadf as i32))
}

/// Freezes every current dependent of alias `name` onto its present
/// resolution. Returns 0 on success, or a negative errno.
///
/// # Safety
/// `name` must be a valid, NUL-terminated C string.
#[no_mangle]
pub unsafe extern "C" fn skein_dag_detach_from_alias(name: *const c_char) -> i32 {
    let Some(name) = str_from_raw(name) else {
        return -(Errno::Einval as i32);
    };
    with_current(|rt| match rt.detach_from_alias(&name) {
        Ok(()) => 0,
        Err(_) => -(Errno::Einval as i32),
    })
    .unwrap_or(-(Errno::Ebadf as i32))
}

/// Grafts the named workflow template, wiring `deps_json` (a flat JSON
/// object mapping parameter name to a raw node handle) as its inputs.
/// Returns the template's sink node's raw handle, or a negative errno.
///
/// # Safety
/// `workflow` and `deps_json` must be valid, NUL-terminated C strings.
#[no_mangle]
pub unsafe extern "C" fn skein_dag_instantiate_with_deps(workflow: *const c_char, deps_json: *const c_char) -> i64 {
    let Some(workflow) = str_from_raw(workflow) else {
        return -(Errno::Einval as i64);
    };
    let Some(deps_json) = str_from_raw(deps_json) else {
        return -(Errno::Einval as i64);
    };
    let parsed: serde_json::Value = match serde_json::from_str(&deps_json) {
        Ok(v) => v,
        Err(_) => return -(Errno::Einval as i64),
    };
    let Some(object) = parsed.as_object() else {
        return -(Errno::Einval as i64);
    };
    let mut deps: HashMap<Arc<str>, NodeRef> = HashMap::with_capacity(object.len());
    for (param, value) in object {
        let Some(raw) = value.as_u64().and_then(|v| u32::try_from(v).ok()) else {
            return -(Errno::Einval as i64);
        };
        let Some(handle) = Handle::from_raw(raw) else {
            return -(Errno::Einval as i64);
        };
        deps.insert(Arc::from(param.as_str()), NodeRef::Node(handle));
    }
    with_current(|rt| match rt.instantiate_with_deps(&workflow, deps) {
        Ok(sink) => sink.as_u32() as i64,
        Err(_) => -(Errno::Einval as i64),
    })
    .unwrap_or(NO_CONTEXT)
}

/// Creates a value-like node the guest can stream bytes into directly.
/// Returns the fd bound to it, or a negative errno.
///
/// # Safety
/// `explain` must be a valid NUL-terminated C string or null.
#[no_mangle]
pub unsafe extern "C" fn skein_open_write_pipe(explain: *const c_char) -> i32 {
    let explain = str_from_raw(explain);
    with_current(|rt| match rt.open_write_pipe(explain) {
        Ok(fd) => fd,
        Err(err) => -i32::from(err.errno()),
    })
    .unwrap_or(-(Errno::Ebadf as i32))
}

/// Binds `fd` to alias `name`: a live pipe keeps streaming through the
/// alias, a closed one is captured as a fresh value node (`spec.md` §9).
/// Returns 0 on success, or a negative errno.
///
/// # Safety
/// `name` must be a valid, NUL-terminated C string.
#[no_mangle]
pub unsafe extern "C" fn skein_alias_fd(fd: i32, name: *const c_char) -> i32 {
    let Some(name) = str_from_raw(name) else {
        return -(Errno::Einval as i32);
    };
    with_current(|rt| match rt.alias_fd(fd, &name) {
        Ok(()) => 0,
        Err(err) => -i32::from(err.errno()),
    })
    .unwrap_or(-(Errno::Ebadf as i32))
}
