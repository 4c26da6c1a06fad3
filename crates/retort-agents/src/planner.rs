use std::sync::Arc;

use futures::future::BoxFuture;
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use retort_core::config::ModelConfig;
use retort_core::error::{Result, RetortError};
use retort_core::traits::CompletionClient;
use retort_core::types::Message;
use retort_graph::{Node, NodeOutput, State, StateUpdate};

use crate::keys::{PAST_TASKS, REASON, TASK};
use crate::{prompts, with_system};

#[derive(Debug, Deserialize)]
struct Plan {
    next: String,
    #[serde(default)]
    current_task: Option<String>,
    #[serde(default)]
    reason: Option<String>,
}

fn plan_schema(targets: &[String]) -> serde_json::Value {
    json!({
        "type": "object",
        "properties": {
            "next": {
                "type": "string",
                "enum": targets,
                "description": "The worker to engage next, or the end node when the log holds enough to answer."
            },
            "current_task": {
                "type": ["string", "null"],
                "description": "The concrete task for the chosen worker. Null when routing to the end node."
            },
            "reason": {
                "type": ["string", "null"],
                "description": "Why this worker and this task, given what has been tried."
            }
        },
        "required": ["next", "current_task", "reason"]
    })
}

/// Central dispatcher for the planned pipeline.
///
/// Each visit it reads the full log plus the record of past tasks, picks the
/// next worker and a concrete task for it, and routes there by name. Control
/// returns here after every worker, so the planner sees its own history and
/// avoids re-issuing tasks that already ran.
pub struct PlannerNode {
    client: Arc<dyn CompletionClient>,
    model: ModelConfig,
    options: Vec<String>,
    end_node: String,
}

impl PlannerNode {
    pub fn new(
        client: Arc<dyn CompletionClient>,
        model: ModelConfig,
        options: Vec<String>,
        end_node: impl Into<String>,
    ) -> Self {
        Self {
            client,
            model,
            options,
            end_node: end_node.into(),
        }
    }

    fn system_prompt(&self, state: &State) -> String {
        let past = state
            .get_str_set(PAST_TASKS)
            .into_iter()
            .collect::<Vec<_>>()
            .join("\n- ");
        let mut prompt = format!(
            "{}\nYour workers: {}.\nWhen the conversation holds enough information, route to {}.",
            prompts::PLANNER,
            self.options.join(", "),
            self.end_node,
        );
        if !past.is_empty() {
            prompt.push_str(&format!(
                "\nTasks already dispatched, do not repeat them:\n- {past}"
            ));
        }
        prompt
    }
}

impl Node for PlannerNode {
    fn name(&self) -> &str {
        "planner"
    }

    fn run(&self, state: &State) -> BoxFuture<'_, Result<NodeOutput>> {
        let messages = with_system(self.system_prompt(state), state);
        let mut targets = self.options.clone();
        targets.push(self.end_node.clone());
        let schema = plan_schema(&targets);
        Box::pin(async move {
            let value = self
                .client
                .complete_structured(&self.model, messages, &schema)
                .await?;
            let plan: Plan = serde_json::from_value(value.clone())
                .map_err(|e| RetortError::StructuredOutput(e.to_string()))?;

            if !targets.iter().any(|t| *t == plan.next) {
                return Err(RetortError::UnknownRoute(plan.next));
            }
            info!(next = %plan.next, task = ?plan.current_task, "Planner dispatch");

            let mut update = StateUpdate::new()
                .message(Message::user(value.to_string()).named("planner"));
            update = match &plan.current_task {
                Some(task) => update
                    .set_str(TASK, task.clone())
                    .set(PAST_TASKS, json!([task])),
                None => update.set(TASK, serde_json::Value::Null),
            };
            if let Some(reason) = plan.reason {
                update = update.set_str(REASON, reason);
            }
            Ok(NodeOutput::goto(update, plan.next))
        })
    }
}
