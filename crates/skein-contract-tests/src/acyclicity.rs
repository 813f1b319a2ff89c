use skein_core::GraphError;
use skein_dag::{DagStore, NodeRef};

/// P2 — acyclicity: asserts that aliasing `alias_name` to `target` is
/// rejected with `WouldCreateCycle` rather than silently closing a loop
/// through any node that already depends on `alias_name`.
pub fn assert_alias_rejects_cycle(dag: &DagStore, alias_name: &str, target: NodeRef) {
    match dag.alias(alias_name, Some(target)) {
        Err(GraphError::WouldCreateCycle { .. }) => {}
        Err(other) => panic!("expected WouldCreateCycle, got a different error: {other}"),
        Ok(()) => panic!("alias({alias_name:?}, ..) closed a cycle without being rejected"),
    }
}

/// P2, positive case: asserts that wiring `target` onto `alias_name`
/// succeeds, i.e. the DAG store did not mistake a legitimate DAG edge for a
/// cycle.
pub fn assert_alias_accepts(dag: &DagStore, alias_name: &str, target: NodeRef) {
    dag.alias(alias_name, Some(target))
        .unwrap_or_else(|err| panic!("expected alias({alias_name:?}, ..) to succeed, got {err}"));
}
