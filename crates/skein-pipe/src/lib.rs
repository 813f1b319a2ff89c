//! Broadcast byte pipe (component C2): one writer, many readers, late-join
//! at offset 0, poison propagation on upstream failure.

mod config;
mod pipe;

pub use config::PipeConfig;
pub use pipe::{Pipe, PipeReader, PipeWriter};
