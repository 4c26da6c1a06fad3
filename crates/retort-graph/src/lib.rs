//! Agent routing graph: the state-machine core the pipelines run on.
//!
//! A pipeline is a directed graph of [`Node`]s over a shared [`State`]: an
//! ordered message log plus auxiliary fields with declared merge policies.
//! Each node returns a partial update and a routing directive; the executor
//! applies merges, follows compiled edges (fixed, conditional, fan-out/join),
//! and stops at a terminal directive or when the step budget runs out.

pub mod executor;
pub mod graph;
pub mod node;
pub mod state;

pub use executor::{RunFailure, RunOutcome, Verdict};
pub use graph::{ConditionalArm, Graph, GraphBuilder, Predicate};
pub use node::{passthrough, FnNode, Node, NodeOutput, Route};
pub use state::{MergePolicy, RunInput, State, StateSchema, StateUpdate, ANSWER_STRUCTURE};
