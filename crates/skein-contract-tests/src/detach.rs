use skein_dag::{DagStore, NodeRef};
use skein_core::Handle;

/// P6 — detach snapshot: asserts that `dependent`'s dependency on
/// `alias_name` still resolves to exactly `expected_before_detach`, even
/// after the caller has (by the time this runs) appended new targets to
/// `alias_name` following a `detach_from_alias` call.
pub fn assert_detach_snapshot_unaffected(dag: &DagStore, dependent: Handle, expected_before_detach: &[Handle]) {
    let node = dag.node(dependent).expect("dependent node must still exist");
    let frozen: Vec<Handle> = node
        .dependencies
        .iter()
        .flat_map(|dep| match &dep.source {
            NodeRef::Frozen(ids) => ids.clone(),
            _ => Vec::new(),
        })
        .collect();
    assert_eq!(
        frozen, expected_before_detach,
        "a detached dependent must keep seeing its pre-detach resolution, not later alias targets"
    );
}
