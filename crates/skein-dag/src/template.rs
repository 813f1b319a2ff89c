use std::collections::HashMap;
use std::sync::Arc;

use skein_core::{GraphError, Handle};

use crate::store::DagStore;
use crate::types::NodeRef;

/// A sub-DAG template resolved by workflow name through a [`PluginTable`].
/// `graft` builds the template's nodes directly inside `dag` (through its
/// normal `add_node`/`add_value_node`/`alias` API, so the usual cycle check
/// applies to every edge it creates) and wires the template's named inputs
/// to `deps`.
pub trait WorkflowTemplate: Send + Sync {
    fn graft(
        &self,
        dag: &DagStore,
        deps: &HashMap<Arc<str>, NodeRef>,
    ) -> Result<Handle, GraphError>;
}

/// Resolves a workflow name to a template. Supplied by the Environment
/// (`skein-host`), which owns the registry of actor kinds and sub-DAG
/// templates available in a given run.
pub trait PluginTable: Send + Sync {
    fn resolve(&self, workflow_name: &str) -> Option<Arc<dyn WorkflowTemplate>>;
}

/// A `PluginTable` with nothing registered; useful for tests and for a
/// `DagStore` that only ever runs nodes added directly, never through
/// `instantiate_with_deps`.
#[derive(Default)]
pub struct EmptyPluginTable;

impl PluginTable for EmptyPluginTable {
    fn resolve(&self, _workflow_name: &str) -> Option<Arc<dyn WorkflowTemplate>> {
        None
    }
}
