//! End-to-end properties of the graph core, exercised with synthetic nodes.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;

use retort_core::error::{Result, RetortError};
use retort_core::types::Message;
use retort_graph::{
    passthrough, ConditionalArm, FnNode, Graph, Node, NodeOutput, State, StateSchema, StateUpdate,
};

/// A generator that sleeps, then appends a uniquely tagged answer. The delay
/// lets tests invert completion order relative to declaration order.
struct DelayedTagger {
    name: String,
    delay: Duration,
}

impl Node for DelayedTagger {
    fn name(&self) -> &str {
        &self.name
    }

    fn run(&self, _state: &State) -> BoxFuture<'_, Result<NodeOutput>> {
        Box::pin(async move {
            tokio::time::sleep(self.delay).await;
            let msg = Message::assistant(format!("answer from {}", self.name)).named(&self.name);
            Ok(NodeOutput::follow(
                StateUpdate::new()
                    .message(msg.clone())
                    .set_messages("answers", vec![msg]),
            ))
        })
    }
}

#[tokio::test]
async fn fan_out_join_runs_once_after_all_branches() {
    let n = 5;
    let joined = Arc::new(AtomicUsize::new(0));
    let joined_in_node = joined.clone();

    let mut builder = Graph::builder()
        .schema(StateSchema::new().append_field("answers"))
        .entry("start")
        .node(passthrough("start"))
        .node(FnNode::new("professor", move |state: &State| {
            joined_in_node.fetch_add(1, Ordering::SeqCst);
            let answers = state.get_messages("answers");
            assert_eq!(answers.len(), 5, "join must see every branch update");
            Ok(NodeOutput::end(
                StateUpdate::new().message(Message::assistant("synthesis").named("professor")),
            ))
        }))
        .fan_out("start", (0..n).map(|i| format!("student_{i}")))
        .fan_in((0..n).map(|i| format!("student_{i}")), "professor");

    // Later-declared branches finish first.
    for i in 0..n {
        builder = builder.node(DelayedTagger {
            name: format!("student_{i}"),
            delay: Duration::from_millis(((n - i) * 20) as u64),
        });
    }

    let graph = builder.compile().unwrap();
    let outcome = graph
        .run(State::seeded(&retort_graph::RunInput::question("q")), 50)
        .await
        .unwrap();

    assert!(outcome.converged());
    assert_eq!(joined.load(Ordering::SeqCst), 1);

    // Merge order follows declaration order, not completion order.
    let answers = outcome.state.get_messages("answers");
    let names: Vec<&str> = answers.iter().filter_map(|m| m.name.as_deref()).collect();
    assert_eq!(
        names,
        ["student_0", "student_1", "student_2", "student_3", "student_4"]
    );
    assert_eq!(outcome.final_text(), "synthesis");
    // start + 5 students + professor
    assert_eq!(outcome.steps, 7);
}

#[tokio::test]
async fn generator_critic_loop_is_bounded() {
    const K: u64 = 3;
    let generate_calls = Arc::new(AtomicUsize::new(0));
    let calls = generate_calls.clone();

    let graph = Graph::builder()
        .entry("generate")
        .node(FnNode::new("generate", move |state: &State| {
            calls.fetch_add(1, Ordering::SeqCst);
            let generations = state.get_u64("generations") + 1;
            Ok(NodeOutput::follow(
                StateUpdate::new()
                    .message(Message::assistant(format!("draft {generations}")).named("generate"))
                    .set("generations", generations.into()),
            ))
        }))
        .node(FnNode::new("reflect", |_: &State| {
            Ok(NodeOutput::follow(
                StateUpdate::new().message(Message::user("critique").named("reflect")),
            ))
        }))
        .node(FnNode::new("answer", |_: &State| {
            Ok(NodeOutput::end(
                StateUpdate::new().message(Message::assistant("final").named("answer")),
            ))
        }))
        .conditional(
            "generate",
            vec![ConditionalArm::new("reflect", |s: &State| {
                s.get_u64("generations") < K
            })],
            "answer",
        )
        .edge("reflect", "generate")
        .compile()
        .unwrap();

    let outcome = graph.run(State::new(), 50).await.unwrap();
    assert!(outcome.converged());
    assert_eq!(generate_calls.load(Ordering::SeqCst), 3);
    assert_eq!(outcome.state.get_u64("generations"), 3);
    assert_eq!(outcome.final_text(), "final");
}

#[tokio::test]
async fn step_budget_stops_unconditional_backward_edge() {
    // Pathological graph: a <-> b forever.
    let graph = Graph::builder()
        .entry("a")
        .node(FnNode::new("a", |_: &State| {
            Ok(NodeOutput::follow(StateUpdate::new()))
        }))
        .node(FnNode::new("b", |_: &State| {
            Ok(NodeOutput::follow(StateUpdate::new()))
        }))
        .edge("a", "b")
        .edge("b", "a")
        .compile()
        .unwrap();

    let outcome = graph.run(State::new(), 9).await.unwrap();
    assert!(!outcome.converged());
    assert_eq!(outcome.verdict, retort_graph::Verdict::BudgetExhausted);
    assert_eq!(outcome.steps, 9);
}

#[tokio::test]
async fn fan_out_larger_than_remaining_budget_is_not_dispatched() {
    let ran = Arc::new(AtomicUsize::new(0));

    let mut builder = Graph::builder()
        .schema(StateSchema::new().append_field("answers"))
        .entry("start")
        .node(passthrough("start"))
        .node(FnNode::new("professor", |_: &State| {
            Ok(NodeOutput::end(StateUpdate::new()))
        }))
        .fan_out("start", (0..3).map(|i| format!("student_{i}")))
        .fan_in((0..3).map(|i| format!("student_{i}")), "professor");
    for i in 0..3 {
        let ran = ran.clone();
        builder = builder.node(FnNode::new(format!("student_{i}"), move |_: &State| {
            ran.fetch_add(1, Ordering::SeqCst);
            Ok(NodeOutput::follow(StateUpdate::new()))
        }));
    }

    // Budget of 3: start takes one step, the three branches need three more.
    let graph = builder.compile().unwrap();
    let outcome = graph.run(State::new(), 3).await.unwrap();

    assert!(!outcome.converged());
    assert_eq!(outcome.steps, 1);
    assert_eq!(ran.load(Ordering::SeqCst), 0, "no branch may run past the budget");
}

#[tokio::test]
async fn delegation_handover_carries_task() {
    let graph = Graph::builder()
        .entry("researcher")
        .node(FnNode::new("researcher", |_: &State| {
            Ok(NodeOutput::goto(
                StateUpdate::new()
                    .message(Message::tool("Command: Asking chemist for help."))
                    .set_str("task", "compute the molar mass"),
                "chemist",
            ))
        }))
        .node(FnNode::new("chemist", |state: &State| {
            assert_eq!(state.get_str("task"), "compute the molar mass");
            Ok(NodeOutput::end(
                StateUpdate::new().message(Message::assistant("180.16 g/mol").named("chemist")),
            ))
        }))
        .compile()
        .unwrap();

    let outcome = graph.run(State::new(), 10).await.unwrap();
    assert!(outcome.converged());
    assert_eq!(outcome.final_text(), "180.16 g/mol");
}

#[tokio::test]
async fn node_error_aborts_run_and_preserves_partial_state() {
    let graph = Graph::builder()
        .entry("first")
        .node(FnNode::new("first", |_: &State| {
            Ok(NodeOutput::follow(
                StateUpdate::new().message(Message::assistant("progress").named("first")),
            ))
        }))
        .node(FnNode::new("boom", |_: &State| {
            Err(RetortError::CompletionRequest("connection refused".into()))
        }))
        .edge("first", "boom")
        .compile()
        .unwrap();

    let failure = graph.run(State::new(), 10).await.unwrap_err();
    assert_eq!(failure.node, "boom");
    // The update from the first node survives for diagnostics.
    assert_eq!(failure.state.messages().len(), 1);
    assert_eq!(failure.state.messages()[0].content, "progress");
}

#[tokio::test]
async fn unknown_delegation_target_is_a_run_failure() {
    let graph = Graph::builder()
        .entry("only")
        .node(FnNode::new("only", |_: &State| {
            Ok(NodeOutput::goto(StateUpdate::new(), "nowhere"))
        }))
        .compile()
        .unwrap();

    let failure = graph.run(State::new(), 10).await.unwrap_err();
    assert!(matches!(failure.error, RetortError::UnknownRoute(_)));
}

#[test]
fn fan_out_with_two_different_joins_fails_at_compile_time() {
    let noop = |name: &str| {
        let name = name.to_string();
        FnNode::new(name, |_: &State| Ok(NodeOutput::follow(StateUpdate::new())))
    };

    let err = Graph::builder()
        .entry("start")
        .node(noop("start"))
        .node(noop("s0"))
        .node(noop("s1"))
        .node(noop("join_a"))
        .node(noop("join_b"))
        .fan_out("start", ["s0".to_string(), "s1".to_string()])
        .fan_in(["s0".to_string()], "join_a")
        .fan_in(["s1".to_string()], "join_b")
        .terminal("join_a")
        .terminal("join_b")
        .compile()
        .unwrap_err();

    assert!(matches!(err, RetortError::GraphCompile(_)));
    assert!(err.to_string().contains("join"));
}

#[test]
fn edge_to_undeclared_node_fails_at_compile_time() {
    let err = Graph::builder()
        .entry("a")
        .node(FnNode::new("a", |_: &State| {
            Ok(NodeOutput::follow(StateUpdate::new()))
        }))
        .edge("a", "ghost")
        .compile()
        .unwrap_err();
    assert!(matches!(err, RetortError::GraphCompile(_)));
}

#[test]
fn two_routing_strategies_on_one_node_fail_at_compile_time() {
    let noop = |name: &str| {
        let name = name.to_string();
        FnNode::new(name, |_: &State| Ok(NodeOutput::follow(StateUpdate::new())))
    };
    let err = Graph::builder()
        .entry("a")
        .node(noop("a"))
        .node(noop("b"))
        .node(noop("c"))
        .edge("a", "b")
        .conditional("a", vec![], "c")
        .compile()
        .unwrap_err();
    assert!(err.to_string().contains("more than one routing strategy"));
}

#[test]
fn undeclared_entry_fails_at_compile_time() {
    let err = Graph::builder()
        .entry("missing")
        .node(FnNode::new("a", |_: &State| {
            Ok(NodeOutput::follow(StateUpdate::new()))
        }))
        .compile()
        .unwrap_err();
    assert!(matches!(err, RetortError::GraphCompile(_)));
}

#[tokio::test]
async fn branch_chains_accumulate_locally_before_join() {
    // Each branch is student -> verifier; the verifier must see its own
    // student's answer but not the sibling branch's.
    let schema = StateSchema::new()
        .append_field("verified_answers")
        .append_field("answers");

    let student = |i: usize| {
        let name = format!("student_{i}");
        let tag = name.clone();
        FnNode::new(name, move |_: &State| {
            let msg = Message::assistant(format!("answer {tag}")).named(&tag);
            Ok(NodeOutput::follow(
                StateUpdate::new().set_messages("answers", vec![msg]),
            ))
        })
    };
    let verifier = |i: usize| {
        FnNode::new(format!("verifier_{i}"), move |state: &State| {
            let answers = state.get_messages("answers");
            assert_eq!(answers.len(), 1, "branch sees only its own update");
            assert_eq!(answers[0].name.as_deref(), Some(format!("student_{i}").as_str()));
            Ok(NodeOutput::follow(
                StateUpdate::new().set_messages("verified_answers", answers),
            ))
        })
    };

    let graph = Graph::builder()
        .schema(schema)
        .entry("start")
        .node(passthrough("start"))
        .node(student(0))
        .node(student(1))
        .node(verifier(0))
        .node(verifier(1))
        .node(FnNode::new("professor", |state: &State| {
            assert_eq!(state.get_messages("verified_answers").len(), 2);
            Ok(NodeOutput::end(StateUpdate::new()))
        }))
        .fan_out("start", ["student_0".to_string(), "student_1".to_string()])
        .edge("student_0", "verifier_0")
        .edge("student_1", "verifier_1")
        .fan_in(["verifier_0".to_string(), "verifier_1".to_string()], "professor")
        .compile()
        .unwrap();

    let outcome = graph.run(State::new(), 20).await.unwrap();
    assert!(outcome.converged());
    // After the join merge, the main state holds both branches' answers.
    assert_eq!(outcome.state.get_messages("answers").len(), 2);
}
