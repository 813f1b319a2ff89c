//! The stable actor runtime ABI (`spec.md` §6): `extern "C"` entry points
//! over [`skein_runtime::NodeRuntime`], callable from a WebAssembly guest or
//! any other FFI host. Errno values match their POSIX namesakes
//! (`skein_core::Errno`) and are part of this stable surface.

mod context;
mod ffi;

#[cfg(feature = "dag-ops")]
mod dag;

pub use context::scoped;
pub use ffi::{skein_aclose, skein_aread, skein_awrite, skein_get_errno, skein_open_read, skein_open_write};
pub use ffi::{ENV, LOG, METRICS, STDIN, STDOUT, TRACE};

#[cfg(feature = "dag-ops")]
pub use dag::{
    skein_alias_fd, skein_dag_alias, skein_dag_detach_from_alias, skein_dag_instantiate_with_deps,
    skein_dag_value_node, skein_open_write_pipe,
};
