//! Environment assembly (component C7): wires the notification queue,
//! key-stream store, DAG, scheduler, and ambient logging into one running
//! actor graph, and the snapshot/restore seam for its conversation state.

mod builder;
mod config;
mod environment;
mod snapshot;

pub use builder::EnvironmentBuilder;
pub use config::EnvironmentConfig;
pub use environment::{Environment, SEEDED_ALIASES};
pub use snapshot::{Dict, SnapshotStore};

#[cfg(test)]
mod tests {
    use super::*;
    use skein_dag::NodeRef;
    use skein_runtime::{Actor, ActorError, NodeRuntime, STDOUT};
    use std::sync::Arc;

    #[test]
    fn snapshot_then_restore_round_trips_bytes() {
        let env = EnvironmentBuilder::new().build();
        let value = env.dag().add_value_node("hello", None);
        env.dag().alias(".prompt", Some(NodeRef::Node(value))).unwrap();

        let dict = Dict::new();
        env.snapshot(&dict).unwrap();
        assert!(!dict.keys().is_empty());

        let restored_env = EnvironmentBuilder::new().build();
        let restored = restored_env.restore(&dict);
        assert_eq!(restored.len(), dict.keys().len());

        let (_, id) = &restored[0];
        let node = restored_env.dag().node(*id).unwrap();
        let reader = restored_env.kv().open_read(&node.name).unwrap();
        let mut buf = [0u8; 16];
        let n = reader.read(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"hello");
    }

    #[test]
    fn end_to_end_run_through_a_built_environment() {
        let env = EnvironmentBuilder::new()
            .with_actor("echo", || {
                let body: Box<dyn Actor> = Box::new(|mut rt: NodeRuntime| -> Result<(), ActorError> {
                    rt.write(STDOUT, b"done")?;
                    rt.close(STDOUT)?;
                    Ok(())
                });
                body
            })
            .build();

        let id = env
            .dag()
            .add_node("only", skein_dag::NodeKind::Actor(Arc::from("echo")), Vec::new(), None, true);
        env.dag().alias(".end", Some(NodeRef::Node(id))).unwrap();

        env.run();

        assert_eq!(env.dag().node(id).unwrap().state, skein_core::NodeState::Finished);
    }
}
