use std::sync::Arc;

use skein_core::Cancellation;
use skein_dag::{DagStore, EmptyPluginTable, PluginTable};
use skein_kv::KeyStreamStore;
use skein_notify::NotificationQueue;
use skein_runtime::{ActorFactory, ActorRegistry, Scheduler};

use crate::config::EnvironmentConfig;
use crate::environment::{Environment, SEEDED_ALIASES};

/// Assembles an [`Environment`] one piece at a time: register the actor
/// kinds a deployment knows about, plug in a workflow-template resolver if
/// it uses `instantiate_with_deps`, then `build`.
pub struct EnvironmentBuilder {
    config: EnvironmentConfig,
    plugins: Arc<dyn PluginTable>,
    registry: ActorRegistry,
    end_alias: Arc<str>,
}

impl Default for EnvironmentBuilder {
    fn default() -> Self {
        Self {
            config: EnvironmentConfig::default(),
            plugins: Arc::new(EmptyPluginTable),
            registry: ActorRegistry::new(),
            end_alias: Arc::from(".end"),
        }
    }
}

impl EnvironmentBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(mut self, config: EnvironmentConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_plugin_table(mut self, plugins: Arc<dyn PluginTable>) -> Self {
        self.plugins = plugins;
        self
    }

    /// Registers the actor body factory for one workflow kind name (e.g.
    /// `gpt.messages_to_query`). The scheduler looks this up every time it
    /// spawns a node of that kind.
    pub fn with_actor(mut self, kind: impl Into<Arc<str>>, factory: impl ActorFactory + 'static) -> Self {
        self.registry.register(kind, factory);
        self
    }

    /// Overrides which alias the scheduler treats as the run's sink.
    /// Defaults to `.end`.
    pub fn with_end_alias(mut self, name: impl Into<Arc<str>>) -> Self {
        self.end_alias = name.into();
        self
    }

    pub fn build(self) -> Environment {
        skein_otel::install();

        let queue = NotificationQueue::with_limits(self.config.queue_limits);
        let kv = Arc::new(KeyStreamStore::new());
        let dag = Arc::new(DagStore::new(queue.clone(), kv.clone(), self.plugins));

        for alias in SEEDED_ALIASES {
            dag.alias(alias, None).expect("seeding an alias never creates a cycle");
        }
        dag.alias(self.end_alias.clone(), None)
            .expect("seeding an alias never creates a cycle");

        let cancel = Cancellation::new();
        let registry = Arc::new(self.registry);
        let scheduler = Arc::new(Scheduler::new(
            dag.clone(),
            kv.clone(),
            queue.clone(),
            registry.clone(),
            cancel.clone(),
            self.end_alias.clone(),
            self.config.scheduler_config(),
        ));

        Environment {
            queue,
            kv,
            dag,
            registry,
            scheduler,
            cancel,
            config: self.config,
            end_alias: self.end_alias,
        }
    }
}
