use std::collections::HashMap;
use std::sync::Arc;

use crate::actor::Actor;

/// Builds a fresh [`Actor`] body for one node. Registered once per workflow
/// kind name (e.g. `gpt.messages_to_query`); the scheduler calls it once per
/// node of that kind, since a body is single-use and moves into its own
/// worker thread.
pub trait ActorFactory: Send + Sync {
    fn create(&self) -> Box<dyn Actor>;
}

impl<F> ActorFactory for F
where
    F: Fn() -> Box<dyn Actor> + Send + Sync,
{
    fn create(&self) -> Box<dyn Actor> {
        self()
    }
}

/// The scheduler's lookup table from a node's `Actor(kind)` name to the
/// factory that builds its body. Unknown kinds fail the node at spawn time
/// rather than panicking the scheduler thread.
#[derive(Default, Clone)]
pub struct ActorRegistry {
    factories: HashMap<Arc<str>, Arc<dyn ActorFactory>>,
}

impl ActorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, kind: impl Into<Arc<str>>, factory: impl ActorFactory + 'static) {
        self.factories.insert(kind.into(), Arc::new(factory));
    }

    pub fn create(&self, kind: &str) -> Option<Box<dyn Actor>> {
        self.factories.get(kind).map(|f| f.create())
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.factories.contains_key(kind)
    }
}
