//! The node runtime and scheduler (components C5 and C6): the per-actor
//! POSIX-like fd facade, the trait actor bodies implement, and the
//! cooperative scheduler that drives the DAG from `not_started` to
//! terminal.

mod actor;
mod fd;
mod node_runtime;
mod registry;
mod scheduler;

pub use actor::{Actor, ActorError};
pub use fd::{ENV, LOG, METRICS, STDIN, STDOUT, TRACE};
pub use node_runtime::NodeRuntime;
pub use registry::{ActorFactory, ActorRegistry};
pub use scheduler::{Scheduler, SchedulerConfig, StepOutcome};

#[cfg(test)]
mod tests {
    use super::*;
    use skein_core::{Cancellation, NodeState};
    use skein_dag::{DagStore, Dependency, EmptyPluginTable, NodeKind, NodeRef};
    use skein_kv::KeyStreamStore;
    use skein_notify::NotificationQueue;
    use skein_pipe::PipeConfig;
    use std::sync::Arc;
    use std::time::Duration;

    /// End-to-end smoke test: a source actor writes bytes to stdout, a
    /// downstream actor reads them positionally and writes its own output,
    /// `.end` is aliased to the sink, and the scheduler runs the whole graph
    /// to completion.
    #[test]
    fn two_node_pipeline_runs_to_completion() {
        let queue = NotificationQueue::new();
        let kv = Arc::new(KeyStreamStore::new());
        let dag = Arc::new(DagStore::new(queue.clone(), kv.clone(), Arc::new(EmptyPluginTable)));

        let source = dag.add_node("source", NodeKind::Actor(Arc::from("upper")), Vec::new(), None, true);
        let sink = dag.add_node(
            "sink",
            NodeKind::Actor(Arc::from("upper")),
            vec![Dependency {
                param: Arc::from(""),
                source: NodeRef::Node(source),
            }],
            None,
            true,
        );
        dag.alias(".end", Some(NodeRef::Node(sink))).unwrap();

        let mut registry = ActorRegistry::new();
        registry.register("upper", || {
            let body: Box<dyn Actor> = Box::new(|mut rt: NodeRuntime| -> Result<(), ActorError> {
                let mut buf = [0u8; 64];
                let mut input = Vec::new();
                if let Ok(fd) = rt.open_read("", 0) {
                    loop {
                        let n = rt.read(fd, &mut buf)?;
                        if n == 0 {
                            break;
                        }
                        input.extend_from_slice(&buf[..n]);
                    }
                } else {
                    input.extend_from_slice(b"seed");
                }
                let upper: Vec<u8> = input.iter().map(|b| b.to_ascii_uppercase()).collect();
                rt.write(STDOUT, &upper)?;
                rt.close(STDOUT)?;
                Ok(())
            });
            body
        });

        let scheduler = Scheduler::new(
            dag.clone(),
            kv.clone(),
            queue,
            Arc::new(registry),
            Cancellation::new(),
            ".end",
            SchedulerConfig {
                idle_poll: Duration::from_millis(5),
                max_concurrent_actors: None,
                pipe_config: PipeConfig::unbounded(),
            },
        );

        for _ in 0..500 {
            if scheduler.is_terminated() {
                break;
            }
            scheduler.one_step();
        }

        assert!(scheduler.is_terminated());
        assert_eq!(dag.node(sink).unwrap().state, NodeState::Finished);

        let reader = kv.open_read("sink").unwrap();
        let mut out = Vec::new();
        let mut buf = [0u8; 64];
        loop {
            let n = reader.read(&mut buf).unwrap();
            if n == 0 {
                break;
            }
            out.extend_from_slice(&buf[..n]);
        }
        assert_eq!(out, b"SEED");
    }
}
