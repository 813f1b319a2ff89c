use std::sync::Arc;

use bytes::Bytes;
use dashmap::DashMap;
use parking_lot::Mutex;
use skein_core::IoError;
use skein_pipe::{Pipe, PipeWriter};

use crate::reader::KvReader;

enum Slot {
    Pipe {
        pipe: Arc<Pipe>,
        writer: Mutex<Option<PipeWriter>>,
    },
    Value(Bytes),
}

/// A flat map from UTF-8 key to either a broadcast pipe or a literal value
/// (component C3). Keys carry no directory structure; any `/`-separated
/// convention is an actor-level naming choice, not something this store
/// interprets.
#[derive(Default)]
pub struct KeyStreamStore {
    slots: DashMap<Arc<str>, Slot>,
}

impl KeyStreamStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Associates `key` with an already-created pipe, taking ownership of
    /// its writer. Overwrites any existing entry at that key.
    pub fn put_pipe(&self, key: impl Into<Arc<str>>, pipe: Arc<Pipe>, writer: PipeWriter) {
        self.slots.insert(
            key.into(),
            Slot::Pipe {
                pipe,
                writer: Mutex::new(Some(writer)),
            },
        );
    }

    /// Associates `key` with literal bytes, equivalent to a pipe that was
    /// written once and closed immediately.
    pub fn put_value(&self, key: impl Into<Arc<str>>, bytes: impl Into<Bytes>) {
        self.slots.insert(key.into(), Slot::Value(bytes.into()));
    }

    /// Associates `key` with a pipe whose writer the caller is keeping for
    /// itself (e.g. a node's auxiliary `log`/`metrics`/`trace` streams,
    /// where the owning actor writes directly over its own fd). `open_write`
    /// on this key always fails with `Einval`, the same as for a value key.
    pub fn put_pipe_reader_only(&self, key: impl Into<Arc<str>>, pipe: Arc<Pipe>) {
        self.slots.insert(
            key.into(),
            Slot::Pipe {
                pipe,
                writer: Mutex::new(None),
            },
        );
    }

    pub fn exists(&self, key: &str) -> bool {
        self.slots.contains_key(key)
    }

    pub fn delete(&self, key: &str) -> bool {
        self.slots.remove(key).is_some()
    }

    /// Opens a new reader over `key`. Any number of readers may be opened
    /// on the same key, each starting from its own offset 0 (pipes late-join;
    /// values simply reread from the start).
    pub fn open_read(&self, key: &str) -> Result<KvReader, IoError> {
        let slot = self.slots.get(key).ok_or(IoError::Ebadf)?;
        match slot.value() {
            Slot::Pipe { pipe, .. } => Ok(KvReader::Pipe(pipe.open_reader())),
            Slot::Value(bytes) => Ok(KvReader::value(bytes.clone())),
        }
    }

    /// Takes the writer for `key`. Only the first caller succeeds; a second
    /// call, or any call against a literal-value key, fails with `Einval`.
    pub fn open_write(&self, key: &str) -> Result<PipeWriter, IoError> {
        let slot = self.slots.get(key).ok_or(IoError::Ebadf)?;
        match slot.value() {
            Slot::Pipe { writer, .. } => writer.lock().take().ok_or(IoError::Einval),
            Slot::Value(_) => Err(IoError::Einval),
        }
    }
}
