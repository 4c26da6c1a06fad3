use std::sync::Arc;

use futures::future::BoxFuture;
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};

use retort_core::config::ModelConfig;
use retort_core::error::{Result, RetortError};
use retort_core::traits::CompletionClient;
use retort_core::types::Message;
use retort_graph::{Node, NodeOutput, State, StateUpdate};
use retort_tools::ToolRegistry;

use crate::keys::TASK;
use crate::{prompts, with_system};

/// Tool rounds a collaborator may spend before it is forced onward.
const MAX_TOOL_ROUNDS: usize = 5;

/// The closed set of moves a collaborator can make each round.
#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum CollaboratorDecision {
    /// Gather more evidence with one of the registered tools.
    UseTool { tool: String, input: String },
    /// Hand the conversation to a colleague, with a summary and a task.
    Handover {
        state: String,
        task: String,
        next: String,
    },
    /// Stop collecting and pass the findings to an answer node.
    Answer { next: String, answer: String },
}

fn decision_schema(
    tools: &[String],
    colleagues: &[String],
    answer_nodes: &[String],
) -> serde_json::Value {
    let handover_targets: Vec<&String> = colleagues.iter().chain(answer_nodes).collect();
    json!({
        "type": "object",
        "anyOf": [
            {
                "properties": {
                    "action": { "const": "use_tool" },
                    "tool": { "type": "string", "enum": tools },
                    "input": { "type": "string" }
                },
                "required": ["action", "tool", "input"]
            },
            {
                "properties": {
                    "action": { "const": "handover" },
                    "state": {
                        "type": "string",
                        "description": "The current state of the task, with all information needed to continue."
                    },
                    "task": { "type": "string", "description": "The task for the colleague." },
                    "next": { "type": "string", "enum": handover_targets }
                },
                "required": ["action", "state", "task", "next"]
            },
            {
                "properties": {
                    "action": { "const": "answer" },
                    "next": { "type": "string", "enum": answer_nodes },
                    "answer": {
                        "type": "string",
                        "description": "The answer with all details extracted from the tools."
                    }
                },
                "required": ["action", "next", "answer"]
            }
        ]
    })
}

/// A peer agent with its own charter and tools.
///
/// Runs an internal decision loop: use a tool (the result lands in the log as
/// evidence), hand over to a colleague, or pass the findings onward. The peer
/// and answer-node lists are fixed at graph build.
pub struct CollaboratorNode {
    name: String,
    charter: String,
    client: Arc<dyn CompletionClient>,
    model: ModelConfig,
    tools: Arc<ToolRegistry>,
    colleagues: Vec<String>,
    answer_nodes: Vec<String>,
}

impl CollaboratorNode {
    pub fn new(
        name: impl Into<String>,
        charter: impl Into<String>,
        client: Arc<dyn CompletionClient>,
        model: ModelConfig,
        tools: Arc<ToolRegistry>,
        answer_nodes: Vec<String>,
    ) -> Self {
        Self {
            name: name.into(),
            charter: charter.into(),
            client,
            model,
            tools,
            colleagues: Vec::new(),
            answer_nodes,
        }
    }

    /// Wire the colleague list. Done once at graph build; a collaborator
    /// never appears in its own list.
    pub fn with_colleagues(mut self, colleagues: impl IntoIterator<Item = String>) -> Self {
        self.colleagues = colleagues
            .into_iter()
            .filter(|c| *c != self.name)
            .collect();
        self
    }

    fn system_prompt(&self, state: &State) -> String {
        let mut tools = self.tools.descriptions();
        tools.sort_unstable();
        let tool_lines = tools
            .iter()
            .map(|(name, description)| format!("- {name}: {description}"))
            .collect::<Vec<_>>()
            .join("\n");
        let mut prompt = format!(
            "{}\nThese are your colleagues: {}.\n\
             Use the provided tools to progress towards answering the question:\n{}\n\
             You MUST not use the same tool with the same input twice.\n\
             You MUST not provide an answer, only collect information and pass it on.\n\
             When you can't progress further or need help, ask your colleagues or proceed to {}.",
            self.charter,
            self.colleagues.join(", "),
            tool_lines,
            self.answer_nodes.join(", "),
        );
        if let Some(task) = state.get_opt_str(TASK) {
            prompt.push_str(&format!("\nYour Task: {task}"));
        }
        prompt
    }

    fn is_known_target(&self, next: &str) -> bool {
        self.colleagues.iter().any(|c| c == next)
            || self.answer_nodes.iter().any(|a| a == next)
    }
}

impl Node for CollaboratorNode {
    fn name(&self) -> &str {
        &self.name
    }

    fn run(&self, state: &State) -> BoxFuture<'_, Result<NodeOutput>> {
        let mut log = with_system(self.system_prompt(state), state);
        let schema = decision_schema(
            &self.tools.list().iter().map(|s| s.to_string()).collect::<Vec<_>>(),
            &self.colleagues,
            &self.answer_nodes,
        );
        Box::pin(async move {
            let mut update = StateUpdate::new();
            for _ in 0..MAX_TOOL_ROUNDS {
                let value = self
                    .client
                    .complete_structured(&self.model, log.clone(), &schema)
                    .await?;
                let decision: CollaboratorDecision = serde_json::from_value(value)
                    .map_err(|e| RetortError::StructuredOutput(e.to_string()))?;

                match decision {
                    CollaboratorDecision::UseTool { tool, input } => {
                        info!(collaborator = %self.name, tool, "Tool call");
                        let output = match self.tools.invoke(&tool, &input).await {
                            Ok(output) => output,
                            // Unknown tool or timeout goes back to the model
                            // as text; the run itself keeps going.
                            Err(e) => format!("Error: {e}"),
                        };
                        let msg = Message::tool(output).named(&tool);
                        log.push(msg.clone());
                        update = update.message(msg);
                    }
                    CollaboratorDecision::Handover { state, task, next } => {
                        if !self.is_known_target(&next) {
                            return Err(RetortError::UnknownRoute(next));
                        }
                        info!(collaborator = %self.name, target = %next, "Handover");
                        update = update
                            .message(Message::assistant(state).named(&self.name))
                            .message(
                                Message::tool(format!("Command: Asking {next} for help."))
                                    .named(&self.name),
                            )
                            .set_str(TASK, task);
                        return Ok(NodeOutput::goto(update, next));
                    }
                    CollaboratorDecision::Answer { next, answer } => {
                        if !self.answer_nodes.iter().any(|a| a == &next) {
                            return Err(RetortError::UnknownRoute(next));
                        }
                        info!(collaborator = %self.name, target = %next, "Findings passed on");
                        update = update
                            .message(Message::assistant(answer).named(&self.name))
                            .message(
                                Message::tool("Command: Task completed.").named(&self.name),
                            )
                            .set(TASK, serde_json::Value::Null);
                        return Ok(NodeOutput::goto(update, next));
                    }
                }
            }

            // Rounds exhausted without a routing decision.
            warn!(collaborator = %self.name, "Tool budget spent, moving on");
            match self.answer_nodes.first() {
                Some(next) => Ok(NodeOutput::goto(
                    update.set(TASK, serde_json::Value::Null),
                    next.clone(),
                )),
                None => Ok(NodeOutput::follow(update)),
            }
        })
    }
}

/// Entry node for the collaboration pipelines: collects initial thoughts and
/// seeds the first research task without attempting a solution.
pub struct InitNode {
    client: Arc<dyn CompletionClient>,
    model: ModelConfig,
}

impl InitNode {
    pub fn new(client: Arc<dyn CompletionClient>, model: ModelConfig) -> Self {
        Self { client, model }
    }
}

impl Node for InitNode {
    fn name(&self) -> &str {
        "init"
    }

    fn run(&self, state: &State) -> BoxFuture<'_, Result<NodeOutput>> {
        let messages = with_system(prompts::INIT, state);
        Box::pin(async move {
            let text = self.client.complete(&self.model, messages).await?;
            let update = StateUpdate::new()
                .message(Message::assistant(text).named("init"))
                .set_str(
                    TASK,
                    "Research resources that verify these thoughts, and all other \
                     resources required to solve the task.",
                );
            Ok(NodeOutput::follow(update))
        })
    }
}
