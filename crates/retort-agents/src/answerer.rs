use std::sync::Arc;

use futures::future::BoxFuture;

use retort_core::config::ModelConfig;
use retort_core::error::Result;
use retort_core::traits::CompletionClient;
use retort_core::types::Message;
use retort_graph::{Node, NodeOutput, State, StateUpdate};

use crate::{prompts, with_answer_format, with_system};

/// Composes the final reply from everything the other nodes produced.
///
/// Terminal in every pipeline that uses it. Honors the run's answer-format
/// hint and never introduces new results of its own.
pub struct AnswererNode {
    client: Arc<dyn CompletionClient>,
    model: ModelConfig,
    short: bool,
}

impl AnswererNode {
    pub fn new(client: Arc<dyn CompletionClient>, model: ModelConfig) -> Self {
        Self {
            client,
            model,
            short: false,
        }
    }

    /// Short mode: terse, precise answers instead of a detailed write-up.
    pub fn short(mut self) -> Self {
        self.short = true;
        self
    }
}

impl Node for AnswererNode {
    fn name(&self) -> &str {
        "answerer"
    }

    fn run(&self, state: &State) -> BoxFuture<'_, Result<NodeOutput>> {
        let base = if self.short {
            prompts::ANSWERER_SHORT
        } else {
            prompts::ANSWERER_LONG
        };
        let prompt = with_answer_format(base, state);
        let messages = with_system(prompt, state);
        Box::pin(async move {
            let text = self.client.complete(&self.model, messages).await?;
            let update = StateUpdate::new().message(Message::assistant(text).named("answerer"));
            Ok(NodeOutput::end(update))
        })
    }
}
