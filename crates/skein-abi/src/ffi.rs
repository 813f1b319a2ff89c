use std::ffi::CStr;
use std::os::raw::c_char;

use skein_core::Errno;

use crate::context::with_current;

/// Standard descriptors every actor body gets without calling `open_*`
/// (`spec.md` §4.5).
pub const STDIN: i32 = 0;
pub const STDOUT: i32 = 1;
pub const LOG: i32 = 2;
pub const ENV: i32 = 3;
pub const METRICS: i32 = 4;
pub const TRACE: i32 = 5;

/// No runtime is bound to this thread (the host called into the guest
/// outside a `context::scoped` block). Surfaced as `EBADF` since every
/// other ABI error already has a dedicated errno and this one is, from the
/// guest's point of view, indistinguishable from "nothing at that fd".
const NO_CONTEXT: i32 = -(Errno::Ebadf as i32);

unsafe fn key_from_raw(key: *const c_char) -> Option<String> {
    if key.is_null() {
        return None;
    }
    CStr::from_ptr(key).to_str().ok().map(str::to_owned)
}

/// Opens the next unread dependency node under `key` (an empty `key` is the
/// positional parameter). Returns a non-negative fd, or a negative errno.
///
/// # Safety
/// `key` must be a valid, NUL-terminated C string for the duration of the
/// call, or null.
#[no_mangle]
pub unsafe extern "C" fn skein_open_read(key: *const c_char, idx: u32) -> i32 {
    let Some(key) = key_from_raw(key) else {
        return -(Errno::Einval as i32);
    };
    with_current(|rt| match rt.open_read(&key, idx as usize) {
        Ok(fd) => fd,
        Err(err) => -i32::from(err.errno()),
    })
    .unwrap_or(NO_CONTEXT)
}

/// Opens a write descriptor for `key` (currently only `""`/`"stdout"`
/// resolve to anything; any other name is `EINVAL`).
///
/// # Safety
/// `key` must be a valid, NUL-terminated C string for the duration of the
/// call, or null.
#[no_mangle]
pub unsafe extern "C" fn skein_open_write(key: *const c_char) -> i32 {
    let Some(key) = key_from_raw(key) else {
        return -(Errno::Einval as i32);
    };
    with_current(|rt| match rt.open_write(&key) {
        Ok(fd) => fd,
        Err(err) => -i32::from(err.errno()),
    })
    .unwrap_or(NO_CONTEXT)
}

/// Reads up to `n` bytes of `fd` into `buf`. Returns the byte count read
/// (0 at end-of-stream), or a negative errno.
///
/// # Safety
/// `buf` must point to at least `n` writable bytes.
#[no_mangle]
pub unsafe extern "C" fn skein_aread(fd: i32, buf: *mut u8, n: u32) -> i32 {
    if buf.is_null() {
        return -(Errno::Einval as i32);
    }
    let out = std::slice::from_raw_parts_mut(buf, n as usize);
    with_current(|rt| match rt.read(fd, out) {
        Ok(read) => read as i32,
        Err(err) => -i32::from(err.errno()),
    })
    .unwrap_or(NO_CONTEXT)
}

/// Writes `n` bytes from `buf` to `fd`. Returns the byte count written, or a
/// negative errno.
///
/// # Safety
/// `buf` must point to at least `n` readable bytes.
#[no_mangle]
pub unsafe extern "C" fn skein_awrite(fd: i32, buf: *const u8, n: u32) -> i32 {
    if buf.is_null() {
        return -(Errno::Einval as i32);
    }
    let data = std::slice::from_raw_parts(buf, n as usize);
    with_current(|rt| match rt.write(fd, data) {
        Ok(written) => written as i32,
        Err(err) => -i32::from(err.errno()),
    })
    .unwrap_or(NO_CONTEXT)
}

/// Closes `fd`. Returns 0 on success, or a negative errno.
#[no_mangle]
pub extern "C" fn skein_aclose(fd: i32) -> i32 {
    with_current(|rt| match rt.close(fd) {
        Ok(()) => 0,
        Err(err) => -i32::from(err.errno()),
    })
    .unwrap_or(NO_CONTEXT)
}

/// The POSIX-compatible errno left by the last failing call on this thread's
/// bound runtime, or 0 if no call has failed yet (or no runtime is bound).
#[no_mangle]
pub extern "C" fn skein_get_errno() -> i32 {
    with_current(|rt| rt.get_errno()).unwrap_or(0)
}
