//! Agent nodes and pipeline graph builders.
//!
//! Every node here follows the same shape: collaborator handles (completion
//! client, tools) injected at construction, one [`retort_graph::Node`]
//! implementation, and state communicated exclusively through the shared
//! [`retort_graph::State`].

pub mod answerer;
pub mod collaborator;
pub mod ensemble;
pub mod generator;
pub mod pipelines;
pub mod planner;
pub mod prompts;
pub mod researcher;
pub mod validator;

#[cfg(test)]
pub(crate) mod test_support;

pub use answerer::AnswererNode;
pub use collaborator::{CollaboratorDecision, CollaboratorNode, InitNode};
pub use ensemble::{AnswerSource, ProfessorNode, StudentNode, VerifierNode};
pub use generator::{GenerateNode, ReflectNode};
pub use pipelines::Pipeline;
pub use planner::PlannerNode;
pub use researcher::ResearcherNode;
pub use validator::ValidatorNode;

/// Auxiliary state field names shared across the pipelines.
pub mod keys {
    /// Current delegated task, set on handover and cleared on answer.
    pub const TASK: &str = "task";
    /// Generate rounds completed in the reasoning loop.
    pub const GENERATIONS: &str = "generations";
    /// Research rounds completed.
    pub const RESEARCHES: &str = "researches";
    /// arXiv queries already issued this run (append field, read as a set).
    pub const ARXIV_QUERIES: &str = "arxiv_queries";
    /// Last research digest, verbatim.
    pub const RESEARCH: &str = "research";
    /// Student answers awaiting synthesis (append field).
    pub const ANSWERS: &str = "answers";
    /// Student answers a verifier judged correct (append field).
    pub const VERIFIED_ANSWERS: &str = "verified_answers";
    /// Student answers a verifier judged incorrect (append field).
    pub const UNVERIFIED_ANSWERS: &str = "unverified_answers";
    /// Tasks the planner has already handed out (append field).
    pub const PAST_TASKS: &str = "past_tasks";
    /// The planner's stated reason for its last routing decision.
    pub const REASON: &str = "reason";
}

use retort_core::types::Message;
use retort_graph::State;

/// Prepend a system prompt to the run's message log.
pub(crate) fn with_system(prompt: impl Into<String>, state: &State) -> Vec<Message> {
    let mut messages = Vec::with_capacity(state.messages().len() + 1);
    messages.push(Message::system(prompt.into()));
    messages.extend(state.messages().iter().cloned());
    messages
}

/// Append the run's answer-format hint to a prompt, if one was given.
pub(crate) fn with_answer_format(prompt: &str, state: &State) -> String {
    match state.get_opt_str(retort_graph::ANSWER_STRUCTURE) {
        Some(format) => format!("{prompt}\n{format}"),
        None => prompt.to_string(),
    }
}
