//! The six worked walkthroughs a prompt-to-markdown deployment exercises:
//! the basic pipeline, streaming visibility across a pipe, a tool-call loop
//! unrolling itself into a second round, failure propagating as `EIO` to a
//! streaming reader, a conversation's prompt surviving a snapshot/restore
//! round trip, and the scheduler noticing graph mutations it wasn't
//! explicitly driven to look at. Every actor body here is a plain top-level
//! `fn`, boxed directly as `Box<dyn Actor>` with no closure needed unless it
//! has to capture test-local state.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use skein_core::{GraphError, Handle, IoError, NodeState};
use skein_dag::{DagStore, Dependency, NodeKind, NodeRef, PluginTable, WorkflowTemplate};
use skein_host::{Dict, Environment, EnvironmentBuilder};
use skein_runtime::{Actor, ActorError, NodeRuntime, STDIN, STDOUT, TRACE};

fn dep(source: NodeRef) -> Dependency {
    Dependency { param: Arc::from(""), source }
}

fn read_to_end(rt: &mut NodeRuntime, fd: i32) -> Result<Vec<u8>, ActorError> {
    let mut out = Vec::new();
    let mut buf = [0u8; 256];
    loop {
        let n = rt.read(fd, &mut buf)?;
        if n == 0 {
            break;
        }
        out.extend_from_slice(&buf[..n]);
    }
    Ok(out)
}

/// Reads a terminal node's full published bytes back out of the store.
/// Every fixture in this file only ever writes UTF-8 text.
fn read_node_text(env: &Environment, id: Handle) -> String {
    let node = env.dag().node(id).expect("node must exist");
    let reader = env.kv().open_read(&node.name).expect("a terminal node is always readable");
    let mut out = Vec::new();
    let mut buf = [0u8; 256];
    loop {
        let n = reader.read(&mut buf).expect("reading a finished node cannot fail");
        if n == 0 {
            break;
        }
        out.extend_from_slice(&buf[..n]);
    }
    String::from_utf8(out).expect("fixtures only ever write UTF-8")
}

/// Pulls the value of a `"content":"..."` field out of a fixture payload by
/// plain substring search, with a minimal backslash-escape unwind. Good
/// enough for this file's own hand-built JSON-shaped fixtures; a real
/// deployment's `response_to_messages` would lean on a proper JSON crate,
/// which none of these test bodies need.
fn extract_content(text: &str) -> String {
    let marker = "\"content\":\"";
    let Some(start) = text.find(marker) else {
        return String::new();
    };
    let rest = &text[start + marker.len()..];
    let mut content = String::new();
    let mut chars = rest.chars();
    while let Some(c) = chars.next() {
        match c {
            '"' => break,
            '\\' => {
                if let Some(escaped) = chars.next() {
                    content.push(escaped);
                }
            }
            _ => content.push(c),
        }
    }
    content
}

fn prompt_to_messages(mut rt: NodeRuntime) -> Result<(), ActorError> {
    let prompt = read_to_end(&mut rt, STDIN)?;
    let text = String::from_utf8_lossy(&prompt);
    let messages = format!("[{{\"role\":\"user\",\"content\":{:?}}}]", text.as_ref());
    rt.write(STDOUT, messages.as_bytes())?;
    rt.close(STDOUT)?;
    Ok(())
}

fn messages_to_query(mut rt: NodeRuntime) -> Result<(), ActorError> {
    let body = read_to_end(&mut rt, STDIN)?;
    rt.write(STDOUT, &body)?;
    rt.close(STDOUT)?;
    Ok(())
}

/// Either unrolls a tool-call payload into a second round, grafted through
/// `gpt.messages_to_query`, or extracts the model's own reply as an
/// assistant message (`SPEC_FULL.md` §9's tool-call loop unrolling).
fn response_to_messages(mut rt: NodeRuntime) -> Result<(), ActorError> {
    let response = read_to_end(&mut rt, STDIN)?;
    let text = String::from_utf8_lossy(&response).into_owned();

    if text.contains("\"tool_calls\"") {
        rt.detach_from_alias(".chat_messages")?;
        let tool_call = rt.value_node(text.into_bytes(), Some("tool call payload".to_string()));
        let mut deps = HashMap::new();
        deps.insert(Arc::from(""), NodeRef::Node(tool_call));
        let sink = rt.instantiate_with_deps("gpt.messages_to_query", deps)?;
        rt.alias(".end", Some(sink))?;
        rt.close(STDOUT)?;
        return Ok(());
    }

    let content = extract_content(&text);
    let messages = format!("[{{\"role\":\"assistant\",\"content\":{:?}}}]", content);
    rt.write(STDOUT, messages.as_bytes())?;
    rt.close(STDOUT)?;
    Ok(())
}

fn messages_to_markdown(mut rt: NodeRuntime) -> Result<(), ActorError> {
    let response = read_to_end(&mut rt, STDIN)?;
    let text = String::from_utf8_lossy(&response);
    let content = extract_content(&text);
    rt.write(STDOUT, format!("{content}\n").as_bytes())?;
    rt.close(STDOUT)?;
    Ok(())
}

/// Grafts a fresh `messages_to_query -> query -> response_to_messages ->
/// messages_to_markdown` chain for the second round of a tool-call loop.
/// Shaped directly on `skein-dag`'s own `EchoTemplate` test fixture: read
/// the positional dependency out of `deps`, build the sub-chain with plain
/// `DagStore::add_node` calls, return the sink.
struct ToolLoopTemplate;

impl WorkflowTemplate for ToolLoopTemplate {
    fn graft(&self, dag: &DagStore, deps: &HashMap<Arc<str>, NodeRef>) -> Result<Handle, GraphError> {
        let input = deps
            .get("")
            .cloned()
            .ok_or_else(|| GraphError::UnknownNode("missing positional input".to_string()))?;
        let query_request = dag.add_node(
            "messages_to_query",
            NodeKind::Actor(Arc::from("messages_to_query")),
            vec![dep(input)],
            None,
            true,
        );
        let query = dag.add_node(
            "query",
            NodeKind::Actor(Arc::from("query_after_tool_call")),
            vec![dep(NodeRef::Node(query_request))],
            None,
            true,
        );
        let response = dag.add_node(
            "response_to_messages",
            NodeKind::Actor(Arc::from("response_to_messages")),
            vec![dep(NodeRef::Node(query))],
            None,
            true,
        );
        let markdown = dag.add_node(
            "messages_to_markdown",
            NodeKind::Actor(Arc::from("messages_to_markdown")),
            vec![dep(NodeRef::Node(response))],
            None,
            true,
        );
        Ok(markdown)
    }
}

struct ToolLoopPluginTable;

impl PluginTable for ToolLoopPluginTable {
    fn resolve(&self, workflow_name: &str) -> Option<Arc<dyn WorkflowTemplate>> {
        (workflow_name == "gpt.messages_to_query").then(|| Arc::new(ToolLoopTemplate) as Arc<dyn WorkflowTemplate>)
    }
}

/// Builds the standard `prompt_to_messages -> messages_to_query -> query ->
/// response_to_messages -> messages_to_markdown` chain for the prompt
/// `"Hello!"`, with a `query` stub that always answers `"Hi!"`. Shared by
/// the basic end-to-end scenario and the save/restore scenario, which needs
/// a pipeline to have actually produced a prompt node before it snapshots.
fn build_basic_pipeline() -> (Environment, Handle) {
    let env = EnvironmentBuilder::new()
        .with_actor("prompt_to_messages", || Box::new(prompt_to_messages) as Box<dyn Actor>)
        .with_actor("messages_to_query", || Box::new(messages_to_query) as Box<dyn Actor>)
        .with_actor("query", || {
            Box::new(|mut rt: NodeRuntime| -> Result<(), ActorError> {
                let _ = read_to_end(&mut rt, STDIN)?;
                rt.write(STDOUT, br#"{"choices":[{"message":{"content":"Hi!"}}]}"#)?;
                rt.close(STDOUT)?;
                Ok(())
            }) as Box<dyn Actor>
        })
        .with_actor("response_to_messages", || Box::new(response_to_messages) as Box<dyn Actor>)
        .with_actor("messages_to_markdown", || Box::new(messages_to_markdown) as Box<dyn Actor>)
        .build();

    let prompt = env.dag().add_value_node("Hello!", None);
    env.dag().alias(".prompt", Some(NodeRef::Node(prompt))).unwrap();

    let n1 = env.dag().add_node(
        "prompt_to_messages",
        NodeKind::Actor(Arc::from("prompt_to_messages")),
        vec![dep(NodeRef::Alias(Arc::from(".prompt")))],
        None,
        true,
    );
    let n2 = env.dag().add_node(
        "messages_to_query",
        NodeKind::Actor(Arc::from("messages_to_query")),
        vec![dep(NodeRef::Node(n1))],
        None,
        true,
    );
    let n3 = env.dag().add_node("query", NodeKind::Actor(Arc::from("query")), vec![dep(NodeRef::Node(n2))], None, true);
    let n4 = env.dag().add_node(
        "response_to_messages",
        NodeKind::Actor(Arc::from("response_to_messages")),
        vec![dep(NodeRef::Node(n3))],
        None,
        true,
    );
    let n5 = env.dag().add_node(
        "messages_to_markdown",
        NodeKind::Actor(Arc::from("messages_to_markdown")),
        vec![dep(NodeRef::Node(n4))],
        None,
        true,
    );
    env.dag().alias(".end", Some(NodeRef::Node(n5))).unwrap();

    (env, n5)
}

#[test]
fn scenario_prompt_through_model_to_markdown() {
    let (env, markdown) = build_basic_pipeline();

    env.run();

    assert_eq!(env.dag().node(markdown).unwrap().state, NodeState::Finished);
    assert_eq!(read_node_text(&env, markdown), "Hi!\n");
}

#[test]
fn scenario_streaming_visibility_before_the_producer_finishes() {
    let events: Arc<Mutex<Vec<(Instant, u8)>>> = Arc::new(Mutex::new(Vec::new()));
    let events_for_registry = events.clone();

    let env = EnvironmentBuilder::new()
        .with_actor("chunky_query", || {
            Box::new(|mut rt: NodeRuntime| -> Result<(), ActorError> {
                rt.write(STDOUT, b"abcd")?;
                std::thread::sleep(Duration::from_millis(60));
                rt.write(STDOUT, b"efgh")?;
                rt.close(STDOUT)?;
                Ok(())
            }) as Box<dyn Actor>
        })
        .with_actor("byte_at_a_time_reader", move || {
            let events = events_for_registry.clone();
            Box::new(move |mut rt: NodeRuntime| -> Result<(), ActorError> {
                let mut buf = [0u8; 1];
                loop {
                    let n = rt.read(STDIN, &mut buf)?;
                    if n == 0 {
                        break;
                    }
                    events.lock().unwrap().push((Instant::now(), buf[0]));
                }
                Ok(())
            }) as Box<dyn Actor>
        })
        .build();

    let producer = env.dag().add_node("query", NodeKind::Actor(Arc::from("chunky_query")), Vec::new(), None, true);
    let consumer = env.dag().add_node(
        "messages_to_markdown",
        NodeKind::Actor(Arc::from("byte_at_a_time_reader")),
        vec![dep(NodeRef::Node(producer))],
        None,
        true,
    );
    env.dag().alias(".end", Some(NodeRef::Node(consumer))).unwrap();

    env.run();

    assert_eq!(env.dag().node(consumer).unwrap().state, NodeState::Finished);

    let observed = events.lock().unwrap();
    assert_eq!(observed.len(), 8);
    assert_eq!(observed.iter().map(|(_, b)| *b).collect::<Vec<_>>(), b"abcdefgh".to_vec());

    // The first chunk must be visible to the reader well before the
    // producer's sleep-gated second write, not held back until the whole
    // stream closes.
    let first_chunk_span = observed[3].0.duration_since(observed[0].0);
    assert!(first_chunk_span < Duration::from_millis(40), "first chunk took {first_chunk_span:?} to stream through");

    let full_span = observed[7].0.duration_since(observed[0].0);
    assert!(full_span >= Duration::from_millis(50), "second chunk arrived before the producer's sleep elapsed: {full_span:?}");
}

#[test]
fn scenario_tool_call_loop_unrolls_into_a_second_round() {
    let env = EnvironmentBuilder::new()
        .with_plugin_table(Arc::new(ToolLoopPluginTable))
        .with_actor("prompt_to_messages", || Box::new(prompt_to_messages) as Box<dyn Actor>)
        .with_actor("messages_to_query", || Box::new(messages_to_query) as Box<dyn Actor>)
        .with_actor("query_with_tool_call", || {
            Box::new(|mut rt: NodeRuntime| -> Result<(), ActorError> {
                let _ = read_to_end(&mut rt, STDIN)?;
                rt.write(
                    STDOUT,
                    br#"{"choices":[{"message":{"tool_calls":[{"name":"search","arguments":"ailets"}]}}]}"#,
                )?;
                rt.close(STDOUT)?;
                Ok(())
            }) as Box<dyn Actor>
        })
        .with_actor("response_to_messages", || Box::new(response_to_messages) as Box<dyn Actor>)
        .with_actor("query_after_tool_call", || {
            Box::new(|mut rt: NodeRuntime| -> Result<(), ActorError> {
                let _ = read_to_end(&mut rt, STDIN)?;
                rt.write(STDOUT, br#"{"choices":[{"message":{"content":"the ailets query finished"}}]}"#)?;
                rt.close(STDOUT)?;
                Ok(())
            }) as Box<dyn Actor>
        })
        .with_actor("messages_to_markdown", || Box::new(messages_to_markdown) as Box<dyn Actor>)
        .build();

    let prompt = env.dag().add_value_node("search for something", None);
    env.dag().alias(".prompt", Some(NodeRef::Node(prompt))).unwrap();

    let n1 = env.dag().add_node(
        "prompt_to_messages",
        NodeKind::Actor(Arc::from("prompt_to_messages")),
        vec![dep(NodeRef::Alias(Arc::from(".prompt")))],
        None,
        true,
    );
    let n2 = env.dag().add_node(
        "messages_to_query",
        NodeKind::Actor(Arc::from("messages_to_query")),
        vec![dep(NodeRef::Node(n1))],
        None,
        true,
    );
    let n3 = env.dag().add_node(
        "query",
        NodeKind::Actor(Arc::from("query_with_tool_call")),
        vec![dep(NodeRef::Node(n2))],
        None,
        true,
    );
    let n4 = env.dag().add_node(
        "response_to_messages",
        NodeKind::Actor(Arc::from("response_to_messages")),
        vec![dep(NodeRef::Node(n3))],
        None,
        true,
    );
    env.dag().alias(".end", Some(NodeRef::Node(n4))).unwrap();

    env.run();

    assert_eq!(env.dag().node(n4).unwrap().state, NodeState::Finished);

    let end_targets = env.dag().resolve(&NodeRef::Alias(Arc::from(".end"))).unwrap();
    assert!(end_targets.len() >= 2, "response_to_messages must have appended a second-round sink to .end");

    let mut combined = String::new();
    for id in end_targets {
        let node = env.dag().node(id).unwrap();
        if node.state == NodeState::Finished {
            combined.push_str(&read_node_text(&env, id));
        }
    }
    assert!(combined.contains("ailets"), "the second round's output must reach the final markdown: {combined:?}");
}

#[test]
fn scenario_failure_propagates_as_eio_to_a_streaming_reader() {
    let observed_eio: Arc<Mutex<bool>> = Arc::new(Mutex::new(false));
    let observed_for_registry = observed_eio.clone();

    let env = EnvironmentBuilder::new()
        .with_actor("query_failing", || {
            Box::new(|mut rt: NodeRuntime| -> Result<(), ActorError> {
                rt.write(STDOUT, b"partial response before the model call fails")?;
                Err(ActorError::new("upstream model call failed"))
            }) as Box<dyn Actor>
        })
        .with_actor("markdown_reader", move || {
            let observed = observed_for_registry.clone();
            Box::new(move |mut rt: NodeRuntime| -> Result<(), ActorError> {
                // A read landing exactly as the pipe closes can see a plain
                // `Ok(0)` moments before the scheduler's poison call lands;
                // a short bounded retry closes that window instead of
                // mistaking an ordinary close raced against the poison for
                // one that never poisoned at all.
                let mut buf = [0u8; 1];
                let mut zero_streak = 0;
                loop {
                    match rt.read(STDIN, &mut buf) {
                        Ok(0) => {
                            zero_streak += 1;
                            if zero_streak > 25 {
                                break;
                            }
                            std::thread::sleep(Duration::from_millis(2));
                        }
                        Ok(_) => zero_streak = 0,
                        Err(e) => {
                            *observed.lock().unwrap() = matches!(e, IoError::Eio);
                            break;
                        }
                    }
                }
                Ok(())
            }) as Box<dyn Actor>
        })
        .with_actor("tracer", || {
            Box::new(|mut rt: NodeRuntime| -> Result<(), ActorError> {
                rt.write(TRACE, b"trace-ok")?;
                rt.close(TRACE)?;
                Ok(())
            }) as Box<dyn Actor>
        })
        .build();

    let query = env.dag().add_node("query", NodeKind::Actor(Arc::from("query_failing")), Vec::new(), None, true);
    let markdown = env.dag().add_node(
        "messages_to_markdown",
        NodeKind::Actor(Arc::from("markdown_reader")),
        vec![dep(NodeRef::Node(query))],
        None,
        true,
    );
    // An independent branch writing to `trace` completes normally: the
    // query's failure only ever reaches nodes that actually depend on it.
    let tracer = env.dag().add_node("tracer", NodeKind::Actor(Arc::from("tracer")), Vec::new(), None, true);

    env.dag().alias(".end", Some(NodeRef::Node(markdown))).unwrap();
    env.dag().alias(".end", Some(NodeRef::Node(tracer))).unwrap();

    env.run();

    assert_eq!(env.dag().node(query).unwrap().state, NodeState::Failed);
    assert_eq!(env.dag().node(markdown).unwrap().state, NodeState::Finished);
    assert_eq!(env.dag().node(tracer).unwrap().state, NodeState::Finished);
    assert!(*observed_eio.lock().unwrap(), "messages_to_markdown must observe EIO once query fails");
}

#[test]
fn scenario_save_and_restore_round_trips_the_prompt_as_a_dry_run_ready_value() {
    let (env, markdown) = build_basic_pipeline();
    env.run();
    assert_eq!(read_node_text(&env, markdown), "Hi!\n");

    let dict = Dict::new();
    env.snapshot(&dict).unwrap();
    assert_eq!(dict.keys().len(), 6, "every finished node in the pipeline is captured, not just the seeded .prompt alias's target");

    let restored_env = EnvironmentBuilder::new().build();
    let restored = restored_env.restore(&dict);
    assert_eq!(restored.len(), 6);

    let (_, prompt_id) = restored.iter().find(|(key, _)| key == "value").expect("the prompt value node was snapshotted under its node name");
    let tree = restored_env.dag().dependency_tree(*prompt_id);
    assert_eq!(tree.nodes.len(), 1, "a restored value node has no dependencies of its own");
    assert_eq!(tree.nodes[0].kind, "value");
    assert!(tree.all_finished(), "restore always produces an already-finished node, ready for a dry run");
    assert_eq!(read_node_text(&restored_env, *prompt_id), "Hello!");
}

#[test]
fn scenario_scheduler_notices_a_dynamically_added_node_without_being_driven_by_hand() {
    let env = EnvironmentBuilder::new()
        .with_actor("producer", || {
            Box::new(|mut rt: NodeRuntime| -> Result<(), ActorError> {
                rt.write(STDOUT, b"x")?;
                // Never closes and never returns: `blocker` is left
                // suspended reading a pipe nobody writes to again.
                loop {
                    std::thread::park();
                }
            }) as Box<dyn Actor>
        })
        .with_actor("blocker", || {
            Box::new(|mut rt: NodeRuntime| -> Result<(), ActorError> {
                let mut buf = [0u8; 1];
                let _ = rt.read(STDIN, &mut buf)?;
                let _ = rt.read(STDIN, &mut buf);
                Ok(())
            }) as Box<dyn Actor>
        })
        .with_actor("ticker", || {
            Box::new(|mut rt: NodeRuntime| -> Result<(), ActorError> {
                rt.write(STDOUT, b"tick")?;
                rt.close(STDOUT)?;
                Ok(())
            }) as Box<dyn Actor>
        })
        .with_end_alias(".ticker_end")
        .build();

    let producer = env.dag().add_node("producer", NodeKind::Actor(Arc::from("producer")), Vec::new(), None, true);
    env.dag()
        .add_node("blocker", NodeKind::Actor(Arc::from("blocker")), vec![dep(NodeRef::Node(producer))], None, true);

    let dag = env.dag().clone();
    // `.ticker_end` never resolves to `blocker`, so the run loop stays alive
    // on its own thread forever; that's fine, the test just leaves it
    // running rather than joining it.
    let _scheduler_thread = std::thread::spawn(move || env.run());

    std::thread::sleep(Duration::from_millis(30));

    let ticker = dag.add_node("ticker", NodeKind::Actor(Arc::from("ticker")), Vec::new(), None, true);
    dag.alias(".ticker_end", Some(NodeRef::Node(ticker))).unwrap();

    let deadline = Instant::now() + Duration::from_secs(2);
    loop {
        if dag.node(ticker).unwrap().state == NodeState::Finished {
            break;
        }
        assert!(
            Instant::now() < deadline,
            "a node added after the graph went idle must still be picked up within a bounded number of idle-poll intervals"
        );
        std::thread::sleep(Duration::from_millis(5));
    }
}
