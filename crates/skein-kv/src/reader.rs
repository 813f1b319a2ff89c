use std::sync::atomic::{AtomicUsize, Ordering};

use bytes::Bytes;
use skein_core::{IoError, NodeError};
use skein_pipe::PipeReader;

/// A reader over either a live pipe or a literal value. `put_value` entries
/// behave like a pipe that was already written and closed once: every
/// `read` call returns the remaining bytes and then 0, never suspending.
pub enum KvReader {
    Pipe(PipeReader),
    Value { bytes: Bytes, position: AtomicUsize },
}

impl KvReader {
    pub(crate) fn value(bytes: Bytes) -> Self {
        KvReader::Value {
            bytes,
            position: AtomicUsize::new(0),
        }
    }

    pub fn read(&self, out: &mut [u8]) -> Result<usize, IoError> {
        match self {
            KvReader::Pipe(reader) => reader.read(out),
            KvReader::Value { bytes, position } => {
                if out.is_empty() {
                    return Ok(0);
                }
                let pos = position.load(Ordering::Acquire);
                let n = (bytes.len() - pos).min(out.len());
                out[..n].copy_from_slice(&bytes[pos..pos + n]);
                position.fetch_add(n, Ordering::AcqRel);
                Ok(n)
            }
        }
    }

    /// Whether the underlying stream's writer failed. Always `None` for a
    /// literal value (those are never poisoned, only ever fully written).
    pub fn poisoned(&self) -> Option<NodeError> {
        match self {
            KvReader::Pipe(reader) => reader.poison(),
            KvReader::Value { .. } => None,
        }
    }
}
