//! Key-stream store (component C3): a flat map from UTF-8 key to either a
//! broadcast pipe or a literal byte value.

mod reader;
mod store;

pub use reader::KvReader;
pub use store::KeyStreamStore;
