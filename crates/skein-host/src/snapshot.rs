use bytes::Bytes;
use dashmap::DashMap;

/// Where an `Environment`'s finished value nodes get persisted across
/// restarts. Keyed by node name, the same names the key-stream store already
/// uses, so `snapshot`/`restore` never need a separate naming scheme.
pub trait SnapshotStore: Send + Sync {
    fn save(&self, key: &str, bytes: Bytes);
    fn load(&self, key: &str) -> Option<Bytes>;
    fn keys(&self) -> Vec<String>;
}

/// An in-memory `SnapshotStore`, useful for tests and for a process that
/// only needs to survive an in-process `Environment` rebuild (a real
/// deployment would back this with a file or object store instead).
#[derive(Default)]
pub struct Dict {
    entries: DashMap<String, Bytes>,
}

impl Dict {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SnapshotStore for Dict {
    fn save(&self, key: &str, bytes: Bytes) {
        self.entries.insert(key.to_string(), bytes);
    }

    fn load(&self, key: &str) -> Option<Bytes> {
        self.entries.get(key).map(|entry| entry.value().clone())
    }

    fn keys(&self) -> Vec<String> {
        self.entries.iter().map(|entry| entry.key().clone()).collect()
    }
}
