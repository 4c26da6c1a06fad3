use std::sync::Arc;

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};

use retort_core::config::ModelConfig;
use retort_core::error::{Result, RetortError};
use retort_core::traits::CompletionClient;
use retort_core::types::Message;
use retort_graph::{Node, NodeOutput, State, StateUpdate};

use crate::{prompts, with_system};

/// The four criteria a run must satisfy before the validator lets it
/// proceed. All of them must hold.
#[derive(Debug, Serialize, Deserialize)]
pub struct Checklist {
    pub is_information_based_on_facts: bool,
    pub is_enough_research_done: bool,
    pub is_user_question_answerable: bool,
    pub have_all_collaborators_validated: bool,
}

impl Checklist {
    pub fn all_hold(&self) -> bool {
        self.is_information_based_on_facts
            && self.is_enough_research_done
            && self.is_user_question_answerable
            && self.have_all_collaborators_validated
    }
}

fn checklist_schema() -> serde_json::Value {
    json!({
        "type": "object",
        "properties": {
            "is_information_based_on_facts": { "type": "boolean" },
            "is_enough_research_done": { "type": "boolean" },
            "is_user_question_answerable": { "type": "boolean" },
            "have_all_collaborators_validated": { "type": "boolean" }
        },
        "required": [
            "is_information_based_on_facts",
            "is_enough_research_done",
            "is_user_question_answerable",
            "have_all_collaborators_validated"
        ],
        "additionalProperties": false
    })
}

/// Gate between the collaborators and the answerer.
///
/// An ungrounded conversation (no tool evidence in the log) is bounced
/// backward immediately, without spending a completion call. Otherwise the
/// checklist verdict decides the direction.
pub struct ValidatorNode {
    client: Arc<dyn CompletionClient>,
    model: ModelConfig,
    backward: String,
    forward: String,
}

impl ValidatorNode {
    pub fn new(
        client: Arc<dyn CompletionClient>,
        model: ModelConfig,
        backward: impl Into<String>,
        forward: impl Into<String>,
    ) -> Self {
        Self {
            client,
            model,
            backward: backward.into(),
            forward: forward.into(),
        }
    }
}

impl Node for ValidatorNode {
    fn name(&self) -> &str {
        "validator"
    }

    fn run(&self, state: &State) -> BoxFuture<'_, Result<NodeOutput>> {
        if !state.has_tool_evidence() {
            warn!("No tool evidence in the message log");
            let update = StateUpdate::new().message(
                Message::user("No tool messages found. Please ground your answer using the tools.")
                    .named("validator"),
            );
            return Box::pin(async move { Ok(NodeOutput::goto(update, &self.backward)) });
        }

        let messages = with_system(prompts::VALIDATOR, state);
        Box::pin(async move {
            let value = self
                .client
                .complete_structured(&self.model, messages, &checklist_schema())
                .await?;
            let checklist: Checklist = serde_json::from_value(value)
                .map_err(|e| RetortError::StructuredOutput(e.to_string()))?;

            let target = if checklist.all_hold() {
                &self.forward
            } else {
                &self.backward
            };
            info!(target, "Validator verdict");

            let note = serde_json::to_string(&checklist)
                .map_err(|e| RetortError::StructuredOutput(e.to_string()))?;
            let update = StateUpdate::new().message(Message::user(note).named("validator"));
            Ok(NodeOutput::goto(update, target))
        })
    }
}
