use futures::future::BoxFuture;

use retort_core::error::Result;

use crate::state::{State, StateUpdate};

/// Where control goes after a node returns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// Defer to the edge compiled for this node (fixed, conditional, or
    /// fan-out).
    Follow,
    /// Delegation override: hand control to a named peer. The target must be
    /// a declared node.
    To(String),
    /// Terminal sentinel: the run is complete.
    End,
}

/// A node's result: a partial state update plus a routing directive.
#[derive(Debug, Clone)]
pub struct NodeOutput {
    pub update: StateUpdate,
    pub route: Route,
}

impl NodeOutput {
    pub fn follow(update: StateUpdate) -> Self {
        Self {
            update,
            route: Route::Follow,
        }
    }

    pub fn goto(update: StateUpdate, target: impl Into<String>) -> Self {
        Self {
            update,
            route: Route::To(target.into()),
        }
    }

    pub fn end(update: StateUpdate) -> Self {
        Self {
            update,
            route: Route::End,
        }
    }
}

/// A named unit of work in the graph.
///
/// A node reads the shared state, optionally calls external collaborators
/// (completion service, tools), and returns exactly one output. Nodes hold no
/// memory between invocations beyond what they write into the state, and the
/// executor never re-invokes a node after it has returned; any retry around a
/// flaky collaborator is the node's own policy.
pub trait Node: Send + Sync + 'static {
    fn name(&self) -> &str;

    fn run(&self, state: &State) -> BoxFuture<'_, Result<NodeOutput>>;
}

/// Adapter for nodes that are a plain function of the state. Used for
/// pass-through entry points and synthetic test nodes.
pub struct FnNode<F> {
    name: String,
    f: F,
}

impl<F> FnNode<F>
where
    F: Fn(&State) -> Result<NodeOutput> + Send + Sync + 'static,
{
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }
}

impl<F> Node for FnNode<F>
where
    F: Fn(&State) -> Result<NodeOutput> + Send + Sync + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn run(&self, state: &State) -> BoxFuture<'_, Result<NodeOutput>> {
        let output = (self.f)(state);
        Box::pin(async move { output })
    }
}

/// A node that forwards the state unchanged. The ensemble pipelines use one
/// as the fan-out entry point.
pub fn passthrough(name: impl Into<String>) -> FnNode<impl Fn(&State) -> Result<NodeOutput>> {
    FnNode::new(name, |_state| Ok(NodeOutput::follow(StateUpdate::new())))
}
